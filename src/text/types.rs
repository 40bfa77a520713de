//! The text-dialect AST. References between entities are still symbolic:
//! a [`Var`] is either a numeric index or a `$name` to be resolved by the
//! converter. Script commands layer on top of modules.

use serde::Serialize;

use crate::opcode::Opcode;
use crate::span::{At, OptAt};
use crate::types::{
    EventAttribute, ExternalKind, HeapKind, Limits, Mutability, Null, NumericType, ReferenceKind,
    SegmentType,
};
use crate::v128::V128;

/// A binding occurrence of an identifier (`$name`, without the sigil
/// stripped).
pub type BindVar = String;

/// A use occurrence: either an index or a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Var {
    Index(u32),
    Name(String),
}

pub type VarList = Vec<At<Var>>;

/// A string literal's decoded bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Text {
    pub bytes: Vec<u8>,
}

impl Text {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn from_str(s: &str) -> Self {
        Self {
            bytes: s.as_bytes().to_vec(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

pub type TextList = Vec<At<Text>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum HeapType {
    Kind(HeapKind),
    Var(At<Var>),
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

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ValueType {
    Numeric(NumericType),
    Reference(ReferenceType),
}

pub type ValueTypeList = Vec<At<ValueType>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionType {
    pub params: ValueTypeList,
    pub results: ValueTypeList,
}

/// A parameter or local, possibly named. Names are consumed by the name
/// maps; the converter drops them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BoundValueType {
    pub name: Option<At<BindVar>>,
    pub value_type: At<ValueType>,
}

pub type BoundValueTypeList = Vec<At<BoundValueType>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct BoundFunctionType {
    pub params: BoundValueTypeList,
    pub results: ValueTypeList,
}

impl BoundFunctionType {
    /// Structural view with parameter names discarded.
    pub fn to_unbound(&self) -> FunctionType {
        FunctionType {
            params: self
                .params
                .iter()
                .map(|p| p.value.value_type.clone())
                .collect(),
            results: self.results.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.results.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeEntry {
    pub bind_var: Option<At<BindVar>>,
    pub ty: At<BoundFunctionType>,
}

/// `(type $T)?` optionally followed by inline `(param ..) (result ..)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionTypeUse {
    pub type_use: OptAt<Var>,
    pub ty: At<FunctionType>,
}

impl FunctionTypeUse {
    pub fn is_empty(&self) -> bool {
        self.type_use.is_none() && self.ty.value.params.is_empty() && self.ty.value.results.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct BlockImmediate {
    pub label: Option<At<BindVar>>,
    pub ty: FunctionTypeUse,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BrOnExnImmediate {
    pub target: At<Var>,
    pub event: At<Var>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BrTableImmediate {
    pub targets: VarList,
    pub default_target: At<Var>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct CallIndirectImmediate {
    pub table: OptAt<Var>,
    pub ty: FunctionTypeUse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct CopyImmediate {
    pub dst: OptAt<Var>,
    pub src: OptAt<Var>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InitImmediate {
    pub segment: At<Var>,
    pub dst: OptAt<Var>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct LetImmediate {
    pub block: BlockImmediate,
    pub locals: BoundValueTypeList,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct MemArgImmediate {
    pub align: OptAt<u32>,
    pub offset: OptAt<u32>,
}

pub type SelectImmediate = ValueTypeList;
pub type ShuffleImmediate = crate::types::ShuffleImmediate;

#[derive(Debug, Clone, Serialize)]
pub enum Immediate {
    None,
    S32(At<i32>),
    S64(At<i64>),
    F32(At<f32>),
    F64(At<f64>),
    V128(At<V128>),
    Var(At<Var>),
    Block(At<BlockImmediate>),
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
    SimdLane(At<u8>),
}

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
            (Var(a), Var(b)) => a == b,
            (Block(a), Block(b)) => a == b,
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstantExpression {
    pub instructions: InstructionList,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InlineImport {
    pub module: At<Text>,
    pub name: At<Text>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InlineExport {
    pub name: At<Text>,
}

pub type InlineExportList = Vec<At<InlineExport>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionDesc {
    pub name: Option<At<BindVar>>,
    pub type_use: OptAt<Var>,
    pub ty: At<BoundFunctionType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Function {
    pub desc: FunctionDesc,
    pub locals: BoundValueTypeList,
    pub instructions: InstructionList,
    pub import: Option<At<InlineImport>>,
    pub exports: InlineExportList,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableType {
    pub limits: At<Limits>,
    pub elemtype: At<ReferenceType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableDesc {
    pub name: Option<At<BindVar>>,
    pub ty: At<TableType>,
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
pub struct ElementListWithVars {
    pub kind: At<ExternalKind>,
    pub list: VarList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ElementList {
    Vars(ElementListWithVars),
    Expressions(ElementListWithExpressions),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub desc: TableDesc,
    pub import: Option<At<InlineImport>>,
    pub exports: InlineExportList,
    /// Inline `(elem ...)`; desugared by the converter into an active
    /// segment at offset 0.
    pub elements: Option<ElementList>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MemoryType {
    pub limits: At<Limits>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MemoryDesc {
    pub name: Option<At<BindVar>>,
    pub ty: At<MemoryType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Memory {
    pub desc: MemoryDesc,
    pub import: Option<At<InlineImport>>,
    pub exports: InlineExportList,
    /// Inline `(data ...)`.
    pub data: Option<TextList>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GlobalType {
    pub valtype: At<ValueType>,
    pub mutability: At<Mutability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GlobalDesc {
    pub name: Option<At<BindVar>>,
    pub ty: At<GlobalType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Global {
    pub desc: GlobalDesc,
    pub init: OptAt<ConstantExpression>,
    pub import: Option<At<InlineImport>>,
    pub exports: InlineExportList,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct EventType {
    pub attribute: Option<At<EventAttribute>>,
    pub ty: FunctionTypeUse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct EventDesc {
    pub name: Option<At<BindVar>>,
    pub ty: At<EventType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Event {
    pub desc: EventDesc,
    pub import: Option<At<InlineImport>>,
    pub exports: InlineExportList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImportDesc {
    Function(FunctionDesc),
    Table(TableDesc),
    Memory(MemoryDesc),
    Global(GlobalDesc),
    Event(EventDesc),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Import {
    pub module: At<Text>,
    pub name: At<Text>,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Export {
    pub kind: At<ExternalKind>,
    pub name: At<Text>,
    pub var: At<Var>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Start {
    pub var: At<Var>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementSegment {
    pub name: Option<At<BindVar>>,
    pub segment_type: SegmentType,
    pub table_use: OptAt<Var>,
    pub offset: OptAt<ConstantExpression>,
    pub elements: ElementList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSegment {
    pub name: Option<At<BindVar>>,
    pub segment_type: SegmentType,
    pub memory_use: OptAt<Var>,
    pub offset: OptAt<ConstantExpression>,
    pub data: TextList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ModuleItem {
    DefinedType(At<TypeEntry>),
    Import(At<Import>),
    Function(At<Function>),
    Table(At<Table>),
    Memory(At<Memory>),
    Global(At<Global>),
    Export(At<Export>),
    Start(At<Start>),
    ElementSegment(At<ElementSegment>),
    DataSegment(At<DataSegment>),
    Event(At<Event>),
}

pub type Module = Vec<At<ModuleItem>>;

// --- Script layer ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScriptModuleKind {
    Text(Module),
    Binary(TextList),
    Quote(TextList),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptModule {
    pub name: Option<At<BindVar>>,
    pub kind: ScriptModuleKind,
}

#[derive(Debug, Clone, Serialize)]
pub enum Const {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    V128(V128),
    RefNull,
    RefExtern(u32),
}

impl PartialEq for Const {
    fn eq(&self, other: &Self) -> bool {
        use Const::*;
        match (self, other) {
            (I32(a), I32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (F32(a), F32(b)) => a.to_bits() == b.to_bits(),
            (F64(a), F64(b)) => a.to_bits() == b.to_bits(),
            (V128(a), V128(b)) => a == b,
            (RefNull, RefNull) => true,
            (RefExtern(a), RefExtern(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Const {}

pub type ConstList = Vec<At<Const>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvokeAction {
    pub module: OptAt<BindVar>,
    pub name: At<Text>,
    pub consts: ConstList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetAction {
    pub module: OptAt<BindVar>,
    pub name: At<Text>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Action {
    Invoke(InvokeAction),
    Get(GetAction),
}

#[derive(Debug, Clone, Copy, Serialize)]
pub enum FloatResult<T> {
    Value(T),
    NanCanonical,
    NanArithmetic,
}

impl PartialEq for FloatResult<f32> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FloatResult::Value(a), FloatResult::Value(b)) => a.to_bits() == b.to_bits(),
            (FloatResult::NanCanonical, FloatResult::NanCanonical) => true,
            (FloatResult::NanArithmetic, FloatResult::NanArithmetic) => true,
            _ => false,
        }
    }
}

impl Eq for FloatResult<f32> {}

impl PartialEq for FloatResult<f64> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FloatResult::Value(a), FloatResult::Value(b)) => a.to_bits() == b.to_bits(),
            (FloatResult::NanCanonical, FloatResult::NanCanonical) => true,
            (FloatResult::NanArithmetic, FloatResult::NanArithmetic) => true,
            _ => false,
        }
    }
}

impl Eq for FloatResult<f64> {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReturnResult {
    Const(Const),
    F32(FloatResult<f32>),
    F64(FloatResult<f64>),
    F32X4([FloatResult<f32>; 4]),
    F64X2([FloatResult<f64>; 2]),
}

pub type ReturnResultList = Vec<At<ReturnResult>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Assertion {
    Malformed {
        module: At<ScriptModule>,
        message: At<Text>,
    },
    Invalid {
        module: At<ScriptModule>,
        message: At<Text>,
    },
    Unlinkable {
        module: At<ScriptModule>,
        message: At<Text>,
    },
    ActionTrap {
        action: At<Action>,
        message: At<Text>,
    },
    Return {
        action: At<Action>,
        results: ReturnResultList,
    },
    Exhaustion {
        action: At<Action>,
        message: At<Text>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Register {
    pub name: At<Text>,
    pub module: OptAt<BindVar>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Command {
    ScriptModule(At<ScriptModule>),
    Action(At<Action>),
    Assertion(At<Assertion>),
    Register(At<Register>),
}

pub type Script = Vec<At<Command>>;
