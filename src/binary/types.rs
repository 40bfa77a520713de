//! The binary-dialect AST. Symbolic names have already been resolved:
//! every reference between entities is a numeric index.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

use crate::opcode::Opcode;
use crate::span::{At, OptAt};
use crate::types::{
    EventAttribute, ExternalKind, HeapKind, Index, Limits, Mutability, NumericType,
    Null, ReferenceKind, SegmentType, ShuffleImmediate,
};
use crate::v128::V128;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum HeapType {
    Kind(HeapKind),
    Index(At<Index>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RefType {
    pub heap_type: At<HeapType>,
    pub null: Null,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ReferenceType {
    Kind(ReferenceKind),
    Ref(RefType),
}

impl ReferenceType {
    pub fn funcref() -> Self {
        Self::Kind(ReferenceKind::Funcref)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ValueType {
    Numeric(NumericType),
    Reference(ReferenceType),
}

impl ValueType {
    pub const I32: ValueType = ValueType::Numeric(NumericType::I32);
    pub const I64: ValueType = ValueType::Numeric(NumericType::I64);
    pub const F32: ValueType = ValueType::Numeric(NumericType::F32);
    pub const F64: ValueType = ValueType::Numeric(NumericType::F64);
    pub const V128: ValueType = ValueType::Numeric(NumericType::V128);
}

pub type ValueTypeList = Vec<At<ValueType>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum BlockType {
    Value(ValueType),
    Void,
    Index(Index),
}

/// Known section ids, in canonical order. The `DataCount` section sorts
/// between `Element` and `Code` on the wire despite its id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
    DataCount = 12,
    Event = 13,
}

impl SectionId {
    /// Position in the required section ordering of the module.
    pub fn order(self) -> u8 {
        match self {
            SectionId::Custom => 0,
            SectionId::Type => 1,
            SectionId::Import => 2,
            SectionId::Function => 3,
            SectionId::Table => 4,
            SectionId::Memory => 5,
            SectionId::Global => 6,
            SectionId::Event => 7,
            SectionId::Export => 8,
            SectionId::Start => 9,
            SectionId::Element => 10,
            SectionId::DataCount => 11,
            SectionId::Code => 12,
            SectionId::Data => 13,
        }
    }
}

pub type IndexList = Vec<At<Index>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomSection {
    pub name: At<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BrOnExnImmediate {
    pub target: At<Index>,
    pub event_index: At<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BrTableImmediate {
    pub targets: IndexList,
    pub default_target: At<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CallIndirectImmediate {
    pub type_index: At<Index>,
    pub table_index: At<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CopyImmediate {
    pub dst_index: At<Index>,
    pub src_index: At<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InitImmediate {
    pub segment_index: At<Index>,
    pub dst_index: At<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Locals {
    pub count: At<Index>,
    pub value_type: At<ValueType>,
}

pub type LocalsList = Vec<At<Locals>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LetImmediate {
    pub block_type: At<BlockType>,
    pub locals: LocalsList,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MemArgImmediate {
    pub align_log2: At<u32>,
    pub offset: At<u32>,
}

pub type SelectImmediate = ValueTypeList;
pub type SimdLaneImmediate = u8;

#[derive(Debug, Clone, Serialize)]
pub enum Immediate {
    None,
    S32(At<i32>),
    S64(At<i64>),
    F32(At<f32>),
    F64(At<f64>),
    V128(At<V128>),
    Index(At<Index>),
    BlockType(At<BlockType>),
    BrOnExn(At<BrOnExnImmediate>),
    BrTable(At<BrTableImmediate>),
    CallIndirect(At<CallIndirectImmediate>),
    Copy(At<CopyImmediate>),
    Init(At<InitImmediate>),
    Let(At<LetImmediate>),
    MemArg(At<MemArgImmediate>),
    HeapType(At<HeapType>),
    Select(At<SelectImmediate>),
    Shuffle(At<ShuffleImmediate>),
    SimdLane(At<SimdLaneImmediate>),
}

// Floats compare by bit pattern so that NaN payloads survive equality
// checks and round-trip assertions.
impl PartialEq for Immediate {
    fn eq(&self, other: &Self) -> bool {
        use Immediate::*;
        match (self, other) {
            (None, None) => true,
            (S32(a), S32(b)) => a == b,
            (S64(a), S64(b)) => a == b,
            (F32(a), F32(b)) => a.value.to_bits() == b.value.to_bits(),
            (F64(a), F64(b)) => a.value.to_bits() == b.value.to_bits(),
            (V128(a), V128(b)) => a == b,
            (Index(a), Index(b)) => a == b,
            (BlockType(a), BlockType(b)) => a == b,
            (BrOnExn(a), BrOnExn(b)) => a == b,
            (BrTable(a), BrTable(b)) => a == b,
            (CallIndirect(a), CallIndirect(b)) => a == b,
            (Copy(a), Copy(b)) => a == b,
            (Init(a), Init(b)) => a == b,
            (Let(a), Let(b)) => a == b,
            (MemArg(a), MemArg(b)) => a == b,
            (HeapType(a), HeapType(b)) => a == b,
            (Select(a), Select(b)) => a == b,
            (Shuffle(a), Shuffle(b)) => a == b,
            (SimdLane(a), SimdLane(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Immediate {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub opcode: At<Opcode>,
    pub immediate: Immediate,
}

impl Instruction {
    pub fn new(opcode: At<Opcode>) -> Self {
        Self {
            opcode,
            immediate: Immediate::None,
        }
    }

    pub fn with_immediate(opcode: At<Opcode>, immediate: Immediate) -> Self {
        Self { opcode, immediate }
    }
}

pub type InstructionList = Vec<At<Instruction>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionType {
    pub param_types: ValueTypeList,
    pub result_types: ValueTypeList,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeEntry {
    pub ty: At<FunctionType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableType {
    pub limits: At<Limits>,
    pub elemtype: At<ReferenceType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MemoryType {
    pub limits: At<Limits>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GlobalType {
    pub valtype: At<ValueType>,
    pub mutability: At<Mutability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EventType {
    pub attribute: At<EventAttribute>,
    pub type_index: At<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ImportDesc {
    Function(At<Index>),
    Table(At<TableType>),
    Memory(At<MemoryType>),
    Global(At<GlobalType>),
    Event(At<EventType>),
}

impl ImportDesc {
    pub fn kind(&self) -> ExternalKind {
        match self {
            ImportDesc::Function(_) => ExternalKind::Function,
            ImportDesc::Table(_) => ExternalKind::Table,
            ImportDesc::Memory(_) => ExternalKind::Memory,
            ImportDesc::Global(_) => ExternalKind::Global,
            ImportDesc::Event(_) => ExternalKind::Event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Import {
    pub module: At<String>,
    pub name: At<String>,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Function {
    pub type_index: At<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Table {
    pub table_type: At<TableType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Memory {
    pub memory_type: At<MemoryType>,
}

/// An `end`-terminated instruction sequence in a constant position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstantExpression {
    pub instructions: InstructionList,
}

impl ConstantExpression {
    pub fn new(instruction: At<Instruction>) -> Self {
        Self {
            instructions: vec![instruction],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Global {
    pub global_type: At<GlobalType>,
    pub init: At<ConstantExpression>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Export {
    pub kind: At<ExternalKind>,
    pub name: At<String>,
    pub index: At<Index>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Start {
    pub func_index: At<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementExpression {
    pub instructions: InstructionList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementListWithExpressions {
    pub elemtype: At<ReferenceType>,
    pub list: Vec<At<ElementExpression>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ElementListWithIndexes {
    pub kind: At<ExternalKind>,
    pub list: IndexList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ElementList {
    Indexes(ElementListWithIndexes),
    Expressions(ElementListWithExpressions),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementSegment {
    pub segment_type: SegmentType,
    pub table_index: OptAt<Index>,
    pub offset: OptAt<ConstantExpression>,
    pub elements: ElementList,
}

impl ElementSegment {
    pub fn active(
        table_index: At<Index>,
        offset: At<ConstantExpression>,
        elements: ElementList,
    ) -> Self {
        Self {
            segment_type: SegmentType::Active,
            table_index: Some(table_index),
            offset: Some(offset),
            elements,
        }
    }

    pub fn passive(segment_type: SegmentType, elements: ElementList) -> Self {
        Self {
            segment_type,
            table_index: None,
            offset: None,
            elements,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSegment {
    pub segment_type: SegmentType,
    pub memory_index: OptAt<Index>,
    pub offset: OptAt<ConstantExpression>,
    pub init: Vec<u8>,
}

impl DataSegment {
    pub fn active(memory_index: At<Index>, offset: At<ConstantExpression>, init: Vec<u8>) -> Self {
        Self {
            segment_type: SegmentType::Active,
            memory_index: Some(memory_index),
            offset: Some(offset),
            init,
        }
    }

    pub fn passive(init: Vec<u8>) -> Self {
        Self {
            segment_type: SegmentType::Passive,
            memory_index: None,
            offset: None,
            init,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DataCount {
    pub count: At<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Event {
    pub event_type: At<EventType>,
}

/// A function body, locals still run-length encoded and instructions
/// fully decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnpackedCode {
    pub locals: LocalsList,
    pub body: InstructionList,
}

/// A decoded module. Custom sections remember the known section that
/// preceded them so an encode can reproduce the original interleave.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Module {
    pub types: Vec<At<TypeEntry>>,
    pub imports: Vec<At<Import>>,
    pub functions: Vec<At<Function>>,
    pub tables: Vec<At<Table>>,
    pub memories: Vec<At<Memory>>,
    pub globals: Vec<At<Global>>,
    pub events: Vec<At<Event>>,
    pub exports: Vec<At<Export>>,
    pub start: OptAt<Start>,
    pub element_segments: Vec<At<ElementSegment>>,
    pub data_count: OptAt<DataCount>,
    pub codes: Vec<At<UnpackedCode>>,
    pub data_segments: Vec<At<DataSegment>>,
    pub custom_sections: Vec<(Option<SectionId>, At<CustomSection>)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_immediates_compare_by_bits() {
        let nan_a = Immediate::F32(At::synthetic(f32::from_bits(0x7fc0_0000)));
        let nan_b = Immediate::F32(At::synthetic(f32::from_bits(0x7fc0_0000)));
        let nan_c = Immediate::F32(At::synthetic(f32::from_bits(0x7fc0_0001)));
        assert_eq!(nan_a, nan_b);
        assert_ne!(nan_a, nan_c);
    }

    #[test]
    fn section_order_places_data_count_before_code() {
        assert!(SectionId::DataCount.order() > SectionId::Element.order());
        assert!(SectionId::DataCount.order() < SectionId::Code.order());
    }
}
