//! Feature-aware typed decoders for every binary AST node.
//!
//! Each reader takes the primitive [`Reader`] plus the unit's [`ReadCtx`];
//! on failure it reports into the error sink and returns `None`, leaving
//! the enclosing production to abandon or skip.

use crate::error::{ErrorKind, Errors};
use crate::features::Features;
use crate::opcode::{ImmediateKind, Opcode};
use crate::span::At;
use crate::types::{
    EventAttribute, ExternalKind, HeapKind, Limits, Mutability, Null, ReferenceKind, SegmentType,
};

use super::encoding::{
    DecodedDataSegmentFlags, DecodedElemSegmentFlags, DecodedLimitsFlags, BLOCK_TYPE_VOID,
};
use super::reader::Reader;
use super::types::*;

/// Per-compilation-unit state for binary decoding.
#[derive(Debug, Default)]
pub struct ReadCtx {
    pub features: Features,
    pub errors: Errors,
}

impl ReadCtx {
    pub fn new(features: Features) -> Self {
        Self {
            features,
            errors: Errors::new(),
        }
    }
}

fn read_vec<'a, T>(
    r: &mut Reader<'a>,
    ctx: &mut ReadCtx,
    mut f: impl FnMut(&mut Reader<'a>, &mut ReadCtx) -> Option<At<T>>,
) -> Option<Vec<At<T>>> {
    let count = r.read_count(&mut ctx.errors)?;
    let mut out = Vec::with_capacity(count.value as usize);
    for _ in 0..count.value {
        out.push(f(r, ctx)?);
    }
    Some(out)
}

pub fn read_value_type(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<ValueType>> {
    let byte = r.read_u8(&mut ctx.errors)?;
    let start = byte.loc.unwrap().start;
    if let Some(numeric) = crate::types::NumericType::from_raw(byte.value, ctx.features) {
        return Some(At::new(byte.loc.unwrap(), ValueType::Numeric(numeric)));
    }
    let reference = read_reference_type_from_byte(r, ctx, byte, false)?;
    Some(At::new(
        r.loc_from(start),
        ValueType::Reference(reference.value),
    ))
}

pub fn read_reference_type(
    r: &mut Reader,
    ctx: &mut ReadCtx,
    allow_funcref: bool,
) -> Option<At<ReferenceType>> {
    let byte = r.read_u8(&mut ctx.errors)?;
    read_reference_type_from_byte(r, ctx, byte, allow_funcref)
}

/// Continues a reference type whose first byte has already been consumed.
fn read_reference_type_from_byte(
    r: &mut Reader,
    ctx: &mut ReadCtx,
    byte: At<u8>,
    allow_funcref: bool,
) -> Option<At<ReferenceType>> {
    let start = byte.loc.unwrap().start;
    let long_form = ctx.features.contains(Features::FUNCTION_REFERENCES)
        && (byte.value == 0x6b || byte.value == 0x6c);
    if long_form {
        let null = if byte.value == 0x6c { Null::Yes } else { Null::No };
        let heap_type = read_heap_type(r, ctx)?;
        return Some(At::new(
            r.loc_from(start),
            ReferenceType::Ref(RefType { heap_type, null }),
        ));
    }
    match ReferenceKind::from_raw(byte.value, ctx.features, allow_funcref) {
        Some(kind) => Some(At::new(byte.loc.unwrap(), ReferenceType::Kind(kind))),
        None => {
            ctx.errors.report(
                byte.loc,
                ErrorKind::InvalidType,
                format!("invalid type encoding: 0x{:02x}", byte.value),
            );
            None
        }
    }
}

pub fn read_heap_type(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<HeapType>> {
    let value = r.read_s64_leb(&mut ctx.errors)?;
    let loc = value.loc.unwrap();
    if value.value >= 0 {
        match u32::try_from(value.value) {
            Ok(index) => Some(At::new(loc, HeapType::Index(At::new(loc, index)))),
            Err(_) => {
                ctx.errors
                    .report_kind(Some(loc), ErrorKind::LengthOutOfBounds);
                None
            }
        }
    } else {
        let byte = (value.value as u32 & 0x7f) as u8;
        match HeapKind::from_raw(byte, ctx.features) {
            Some(kind) => Some(At::new(loc, HeapType::Kind(kind))),
            None => {
                ctx.errors.report(
                    Some(loc),
                    ErrorKind::InvalidType,
                    format!("invalid heap type encoding: 0x{byte:02x}"),
                );
                None
            }
        }
    }
}

pub fn read_block_type(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<BlockType>> {
    let value = r.read_s64_leb(&mut ctx.errors)?;
    let loc = value.loc.unwrap();
    if value.value >= 0 {
        if !ctx.features.contains(Features::MULTI_VALUE) {
            ctx.errors.report(
                Some(loc),
                ErrorKind::FeatureDisabled,
                "block type index requires the multi-value feature",
            );
        }
        match u32::try_from(value.value) {
            Ok(index) => Some(At::new(loc, BlockType::Index(index))),
            Err(_) => {
                ctx.errors
                    .report_kind(Some(loc), ErrorKind::LengthOutOfBounds);
                None
            }
        }
    } else {
        let byte = (value.value as u32 & 0x7f) as u8;
        if byte == BLOCK_TYPE_VOID {
            return Some(At::new(loc, BlockType::Void));
        }
        if let Some(numeric) = crate::types::NumericType::from_raw(byte, ctx.features) {
            return Some(At::new(loc, BlockType::Value(ValueType::Numeric(numeric))));
        }
        if let Some(kind) = ReferenceKind::from_raw(byte, ctx.features, false) {
            return Some(At::new(
                loc,
                BlockType::Value(ValueType::Reference(ReferenceType::Kind(kind))),
            ));
        }
        ctx.errors.report(
            Some(loc),
            ErrorKind::InvalidType,
            format!("invalid block type encoding: {}", value.value),
        );
        None
    }
}

pub fn read_limits(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Limits>> {
    let flags = r.read_u8(&mut ctx.errors)?;
    let start = flags.loc.unwrap().start;
    let decoded = match DecodedLimitsFlags::decode(flags.value, ctx.features) {
        Some(decoded) => decoded,
        None => {
            ctx.errors.report(
                flags.loc,
                ErrorKind::InvalidFlags,
                format!("invalid limits flags: 0x{:02x}", flags.value),
            );
            return None;
        }
    };
    let min = r.read_u32_leb(&mut ctx.errors)?;
    let max = if decoded.has_max {
        Some(r.read_u32_leb(&mut ctx.errors)?)
    } else {
        None
    };
    Some(At::new(
        r.loc_from(start),
        Limits {
            min,
            max,
            shared: At::new(flags.loc.unwrap(), decoded.shared),
        },
    ))
}

pub fn read_function_type(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<FunctionType>> {
    let start = r.offset();
    let param_types = read_vec(r, ctx, read_value_type)?;
    let result_types = read_vec(r, ctx, read_value_type)?;
    if result_types.len() > 1 && !ctx.features.contains(Features::MULTI_VALUE) {
        ctx.errors.report(
            Some(r.loc_from(start)),
            ErrorKind::FeatureDisabled,
            "multiple results require the multi-value feature",
        );
    }
    Some(At::new(
        r.loc_from(start),
        FunctionType {
            param_types,
            result_types,
        },
    ))
}

pub fn read_type_entry(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<TypeEntry>> {
    let form = r.read_u8(&mut ctx.errors)?;
    if form.value != 0x60 {
        ctx.errors.report(
            form.loc,
            ErrorKind::InvalidType,
            format!("invalid function type form: 0x{:02x}", form.value),
        );
        return None;
    }
    let start = form.loc.unwrap().start;
    let ty = read_function_type(r, ctx)?;
    Some(At::new(r.loc_from(start), TypeEntry { ty }))
}

pub fn read_table_type(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<TableType>> {
    let start = r.offset();
    let elemtype = read_reference_type(r, ctx, true)?;
    let limits = read_limits(r, ctx)?;
    Some(At::new(r.loc_from(start), TableType { limits, elemtype }))
}

pub fn read_memory_type(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<MemoryType>> {
    let limits = read_limits(r, ctx)?;
    Some(At::new(limits.loc.unwrap(), MemoryType { limits }))
}

pub fn read_global_type(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<GlobalType>> {
    let start = r.offset();
    let valtype = read_value_type(r, ctx)?;
    let mutability = read_mutability(r, ctx)?;
    Some(At::new(
        r.loc_from(start),
        GlobalType {
            valtype,
            mutability,
        },
    ))
}

fn read_mutability(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Mutability>> {
    let byte = r.read_u8(&mut ctx.errors)?;
    match Mutability::try_from(byte.value) {
        Ok(mutability) => Some(At::new(byte.loc.unwrap(), mutability)),
        Err(_) => {
            ctx.errors.report(
                byte.loc,
                ErrorKind::InvalidFlags,
                format!("invalid mutability: {}", byte.value),
            );
            None
        }
    }
}

pub fn read_event_type(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<EventType>> {
    let start = r.offset();
    let attr = r.read_u32_leb(&mut ctx.errors)?;
    let attribute = match u8::try_from(attr.value)
        .ok()
        .and_then(|v| EventAttribute::try_from(v).ok())
    {
        Some(attribute) => At::new(attr.loc.unwrap(), attribute),
        None => {
            ctx.errors.report(
                attr.loc,
                ErrorKind::InvalidFlags,
                format!("invalid event attribute: {}", attr.value),
            );
            return None;
        }
    };
    let type_index = r.read_index(&mut ctx.errors)?;
    Some(At::new(
        r.loc_from(start),
        EventType {
            attribute,
            type_index,
        },
    ))
}

fn read_external_kind(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<ExternalKind>> {
    let byte = r.read_u8(&mut ctx.errors)?;
    match ExternalKind::from_raw(byte.value, ctx.features) {
        Some(kind) => Some(At::new(byte.loc.unwrap(), kind)),
        None => {
            ctx.errors.report(
                byte.loc,
                ErrorKind::InvalidFlags,
                format!("invalid external kind: {}", byte.value),
            );
            None
        }
    }
}

pub fn read_import(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Import>> {
    let start = r.offset();
    let module = r.read_string(&mut ctx.errors)?;
    let name = r.read_string(&mut ctx.errors)?;
    let kind = read_external_kind(r, ctx)?;
    let desc = match kind.value {
        ExternalKind::Function => ImportDesc::Function(r.read_index(&mut ctx.errors)?),
        ExternalKind::Table => ImportDesc::Table(read_table_type(r, ctx)?),
        ExternalKind::Memory => ImportDesc::Memory(read_memory_type(r, ctx)?),
        ExternalKind::Global => ImportDesc::Global(read_global_type(r, ctx)?),
        ExternalKind::Event => ImportDesc::Event(read_event_type(r, ctx)?),
    };
    Some(At::new(
        r.loc_from(start),
        Import { module, name, desc },
    ))
}

pub fn read_function(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Function>> {
    let type_index = r.read_index(&mut ctx.errors)?;
    Some(At::new(type_index.loc.unwrap(), Function { type_index }))
}

pub fn read_table(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Table>> {
    let table_type = read_table_type(r, ctx)?;
    Some(At::new(table_type.loc.unwrap(), Table { table_type }))
}

pub fn read_memory(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Memory>> {
    let memory_type = read_memory_type(r, ctx)?;
    Some(At::new(memory_type.loc.unwrap(), Memory { memory_type }))
}

pub fn read_global(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Global>> {
    let start = r.offset();
    let global_type = read_global_type(r, ctx)?;
    let init = read_constant_expression(r, ctx)?;
    Some(At::new(r.loc_from(start), Global { global_type, init }))
}

pub fn read_event(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Event>> {
    let event_type = read_event_type(r, ctx)?;
    Some(At::new(event_type.loc.unwrap(), Event { event_type }))
}

pub fn read_export(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Export>> {
    let start = r.offset();
    let name = r.read_string(&mut ctx.errors)?;
    let kind = read_external_kind(r, ctx)?;
    let index = r.read_index(&mut ctx.errors)?;
    Some(At::new(r.loc_from(start), Export { kind, name, index }))
}

pub fn read_start(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Start>> {
    let func_index = r.read_index(&mut ctx.errors)?;
    Some(At::new(func_index.loc.unwrap(), Start { func_index }))
}

pub fn read_data_count(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<DataCount>> {
    let count = r.read_index(&mut ctx.errors)?;
    Some(At::new(count.loc.unwrap(), DataCount { count }))
}

pub fn read_element_expression(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<ElementExpression>> {
    let start = r.offset();
    let instructions = read_expression(r, ctx)?;
    Some(At::new(
        r.loc_from(start),
        ElementExpression { instructions },
    ))
}

pub fn read_element_segment(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<ElementSegment>> {
    let start = r.offset();
    let flags = r.read_u32_leb(&mut ctx.errors)?;
    let decoded = match DecodedElemSegmentFlags::decode(flags.value, ctx.features) {
        Some(decoded) => decoded,
        None => {
            ctx.errors.report(
                flags.loc,
                ErrorKind::InvalidFlags,
                format!("invalid element segment flags: {}", flags.value),
            );
            return None;
        }
    };

    let table_index = if decoded.has_non_zero_index {
        Some(r.read_index(&mut ctx.errors)?)
    } else if decoded.segment_type == SegmentType::Active {
        Some(At::synthetic(0))
    } else {
        None
    };
    let offset = if decoded.segment_type == SegmentType::Active {
        Some(read_constant_expression(r, ctx)?)
    } else {
        None
    };

    let elements = if decoded.has_expressions {
        let elemtype = if decoded.is_legacy_active() {
            At::synthetic(ReferenceType::funcref())
        } else {
            read_reference_type(r, ctx, true)?
        };
        let list = read_vec(r, ctx, read_element_expression)?;
        ElementList::Expressions(ElementListWithExpressions { elemtype, list })
    } else {
        let kind = if decoded.is_legacy_active() {
            At::synthetic(ExternalKind::Function)
        } else {
            read_external_kind(r, ctx)?
        };
        let list = read_vec(r, ctx, |r, ctx| r.read_index(&mut ctx.errors))?;
        ElementList::Indexes(ElementListWithIndexes { kind, list })
    };

    Some(At::new(
        r.loc_from(start),
        ElementSegment {
            segment_type: decoded.segment_type,
            table_index,
            offset,
            elements,
        },
    ))
}

pub fn read_data_segment(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<DataSegment>> {
    let start = r.offset();
    let flags = r.read_u32_leb(&mut ctx.errors)?;
    let decoded = match DecodedDataSegmentFlags::decode(flags.value) {
        Some(decoded) => decoded,
        None => {
            ctx.errors.report(
                flags.loc,
                ErrorKind::InvalidFlags,
                format!("invalid data segment flags: {}", flags.value),
            );
            return None;
        }
    };
    if decoded.segment_type == SegmentType::Passive
        && !ctx.features.contains(Features::BULK_MEMORY)
    {
        ctx.errors.report(
            flags.loc,
            ErrorKind::FeatureDisabled,
            "passive data segments require the bulk-memory feature",
        );
    }
    let memory_index = if decoded.has_non_zero_index {
        Some(r.read_index(&mut ctx.errors)?)
    } else if decoded.segment_type == SegmentType::Active {
        Some(At::synthetic(0))
    } else {
        None
    };
    let offset = if decoded.segment_type == SegmentType::Active {
        Some(read_constant_expression(r, ctx)?)
    } else {
        None
    };
    let init = r.read_byte_vec(&mut ctx.errors)?;
    Some(At::new(
        r.loc_from(start),
        DataSegment {
            segment_type: decoded.segment_type,
            memory_index,
            offset,
            init: init.value.to_vec(),
        },
    ))
}

pub fn read_locals(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Locals>> {
    let start = r.offset();
    let count = r.read_index(&mut ctx.errors)?;
    let value_type = read_value_type(r, ctx)?;
    Some(At::new(r.loc_from(start), Locals { count, value_type }))
}

pub fn read_unpacked_code(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<UnpackedCode>> {
    let start = r.offset();
    let size = r.read_count(&mut ctx.errors)?;
    let mut body_reader = r.sub_reader(size.value as usize, &mut ctx.errors)?;
    let locals = read_vec(&mut body_reader, ctx, read_locals)?;
    let body = read_expression(&mut body_reader, ctx)?;
    if !body_reader.is_empty() {
        ctx.errors.report(
            Some(body_reader.loc_from(body_reader.offset())),
            ErrorKind::SectionSizeMismatch,
            format!(
                "code body size mismatch: {} unread bytes",
                body_reader.remaining()
            ),
        );
        return None;
    }
    Some(At::new(r.loc_from(start), UnpackedCode { locals, body }))
}

pub fn read_constant_expression(
    r: &mut Reader,
    ctx: &mut ReadCtx,
) -> Option<At<ConstantExpression>> {
    let start = r.offset();
    let instructions = read_expression(r, ctx)?;
    Some(At::new(
        r.loc_from(start),
        ConstantExpression { instructions },
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    Open(Opcode),
    AfterElse,
    Catching,
}

/// Reads instructions until the `end` that terminates the whole
/// expression; the terminating `end` is consumed but not included.
///
/// Inner `else`/`catch`/`end` must respect the per-label state machine:
/// `Open -> AfterElse` only from `if`, `Open -> Catching` only from `try`,
/// anything else is "unexpected else/catch/end".
pub fn read_expression(r: &mut Reader, ctx: &mut ReadCtx) -> Option<InstructionList> {
    let mut stack: Vec<BlockState> = Vec::new();
    let mut list = InstructionList::new();
    loop {
        let instr = read_instruction(r, ctx)?;
        match instr.opcode.value {
            Opcode::Block | Opcode::Loop | Opcode::If | Opcode::Try | Opcode::Let => {
                stack.push(BlockState::Open(instr.opcode.value));
            }
            Opcode::Else => match stack.last() {
                Some(BlockState::Open(Opcode::If)) => {
                    *stack.last_mut().unwrap() = BlockState::AfterElse;
                }
                _ => {
                    ctx.errors.report(
                        instr.opcode.loc,
                        ErrorKind::UnexpectedToken,
                        "unexpected else",
                    );
                    return None;
                }
            },
            Opcode::Catch => match stack.last() {
                Some(BlockState::Open(Opcode::Try)) => {
                    *stack.last_mut().unwrap() = BlockState::Catching;
                }
                _ => {
                    ctx.errors.report(
                        instr.opcode.loc,
                        ErrorKind::UnexpectedToken,
                        "unexpected catch",
                    );
                    return None;
                }
            },
            Opcode::End => {
                if stack.is_empty() {
                    return Some(list);
                }
                stack.pop();
            }
            _ => {}
        }
        list.push(instr);
    }
}

pub fn read_opcode(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Opcode>> {
    let byte = r.read_u8(&mut ctx.errors)?;
    let start = byte.loc.unwrap().start;
    if Opcode::is_prefix_byte(byte.value, ctx.features) {
        let code = r.read_u32_leb(&mut ctx.errors)?;
        match Opcode::decode_prefixed(byte.value, code.value, ctx.features) {
            Some(op) => Some(At::new(r.loc_from(start), op)),
            None => {
                ctx.errors.report(
                    Some(r.loc_from(start)),
                    ErrorKind::UnknownOpcode,
                    format!("unknown opcode: 0x{:02x} {}", byte.value, code.value),
                );
                None
            }
        }
    } else {
        match Opcode::decode(byte.value, ctx.features) {
            Some(op) => Some(At::new(byte.loc.unwrap(), op)),
            None => {
                ctx.errors.report(
                    byte.loc,
                    ErrorKind::UnknownOpcode,
                    format!("unknown opcode: 0x{:02x}", byte.value),
                );
                None
            }
        }
    }
}

pub fn read_instruction(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Instruction>> {
    let opcode = read_opcode(r, ctx)?;
    let start = opcode.loc.unwrap().start;
    let immediate = match opcode.value.immediate_kind() {
        ImmediateKind::None => Immediate::None,
        ImmediateKind::S32 => Immediate::S32(r.read_s32_leb(&mut ctx.errors)?),
        ImmediateKind::S64 => Immediate::S64(r.read_s64_leb(&mut ctx.errors)?),
        ImmediateKind::F32 => Immediate::F32(r.read_f32(&mut ctx.errors)?),
        ImmediateKind::F64 => Immediate::F64(r.read_f64(&mut ctx.errors)?),
        ImmediateKind::V128 => Immediate::V128(r.read_v128(&mut ctx.errors)?),
        ImmediateKind::Index => Immediate::Index(r.read_index(&mut ctx.errors)?),
        ImmediateKind::BlockType => Immediate::BlockType(read_block_type(r, ctx)?),
        ImmediateKind::BrOnExn => {
            let imm_start = r.offset();
            let target = r.read_index(&mut ctx.errors)?;
            let event_index = r.read_index(&mut ctx.errors)?;
            Immediate::BrOnExn(At::new(
                r.loc_from(imm_start),
                BrOnExnImmediate {
                    target,
                    event_index,
                },
            ))
        }
        ImmediateKind::BrTable => {
            let imm_start = r.offset();
            let targets = read_vec(r, ctx, |r, ctx| r.read_index(&mut ctx.errors))?;
            let default_target = r.read_index(&mut ctx.errors)?;
            Immediate::BrTable(At::new(
                r.loc_from(imm_start),
                BrTableImmediate {
                    targets,
                    default_target,
                },
            ))
        }
        ImmediateKind::CallIndirect => {
            let imm_start = r.offset();
            let type_index = r.read_index(&mut ctx.errors)?;
            let table_index = r.read_index(&mut ctx.errors)?;
            if table_index.value != 0 && !ctx.features.contains(Features::REFERENCE_TYPES) {
                ctx.errors.report(
                    table_index.loc,
                    ErrorKind::FeatureDisabled,
                    "call_indirect table index requires the reference-types feature",
                );
            }
            Immediate::CallIndirect(At::new(
                r.loc_from(imm_start),
                CallIndirectImmediate {
                    type_index,
                    table_index,
                },
            ))
        }
        ImmediateKind::Copy => {
            let imm_start = r.offset();
            let dst_index = r.read_index(&mut ctx.errors)?;
            let src_index = r.read_index(&mut ctx.errors)?;
            Immediate::Copy(At::new(
                r.loc_from(imm_start),
                CopyImmediate {
                    dst_index,
                    src_index,
                },
            ))
        }
        ImmediateKind::Init => {
            let imm_start = r.offset();
            let segment_index = r.read_index(&mut ctx.errors)?;
            let dst_index = r.read_index(&mut ctx.errors)?;
            Immediate::Init(At::new(
                r.loc_from(imm_start),
                InitImmediate {
                    segment_index,
                    dst_index,
                },
            ))
        }
        ImmediateKind::Let => {
            let imm_start = r.offset();
            let block_type = read_block_type(r, ctx)?;
            let locals = read_vec(r, ctx, read_locals)?;
            Immediate::Let(At::new(
                r.loc_from(imm_start),
                LetImmediate { block_type, locals },
            ))
        }
        ImmediateKind::MemArg => {
            let imm_start = r.offset();
            let align_log2 = r.read_u32_leb(&mut ctx.errors)?;
            let offset = r.read_u32_leb(&mut ctx.errors)?;
            Immediate::MemArg(At::new(
                r.loc_from(imm_start),
                MemArgImmediate { align_log2, offset },
            ))
        }
        ImmediateKind::HeapType => Immediate::HeapType(read_heap_type(r, ctx)?),
        ImmediateKind::Select => {
            let types = read_vec(r, ctx, read_value_type)?;
            Immediate::Select(At::new(r.loc_from(start), types))
        }
        ImmediateKind::Shuffle => {
            let bytes = r.read_bytes(16, &mut ctx.errors)?;
            let lanes: ShuffleImmediateArray = bytes.value.try_into().unwrap();
            Immediate::Shuffle(At::new(bytes.loc.unwrap(), lanes))
        }
        ImmediateKind::SimdLane => {
            let lane = r.read_u8(&mut ctx.errors)?;
            Immediate::SimdLane(lane)
        }
    };
    Some(At::new(
        r.loc_from(start),
        Instruction {
            opcode,
            immediate,
        },
    ))
}

type ShuffleImmediateArray = crate::types::ShuffleImmediate;

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(features: Features) -> ReadCtx {
        ReadCtx::new(features)
    }

    fn decode_instr(bytes: &[u8], features: Features) -> Option<Instruction> {
        let mut ctx = ctx_with(features);
        let mut r = Reader::new(bytes);
        read_instruction(&mut r, &mut ctx).map(|at| at.value)
    }

    #[test]
    fn decodes_i32_const() {
        let instr = decode_instr(&[0x41, 0x2a], Features::none()).unwrap();
        assert_eq!(instr.opcode.value, Opcode::I32Const);
        assert_eq!(instr.immediate, Immediate::S32(At::synthetic(42)));
    }

    #[test]
    fn decodes_memarg() {
        let instr = decode_instr(&[0x28, 0x02, 0x08], Features::none()).unwrap();
        assert_eq!(instr.opcode.value, Opcode::I32Load);
        assert_eq!(
            instr.immediate,
            Immediate::MemArg(At::synthetic(MemArgImmediate {
                align_log2: At::synthetic(2),
                offset: At::synthetic(8),
            }))
        );
    }

    #[test]
    fn rejects_gated_opcode() {
        assert_eq!(decode_instr(&[0xc0], Features::none()), None);
        assert!(decode_instr(&[0xc0], Features::none().with(Features::SIGN_EXTENSION)).is_some());
    }

    #[test]
    fn expression_state_machine_accepts_if_else_end() {
        // if (void) nop else nop end; end
        let bytes = [0x04, 0x40, 0x01, 0x05, 0x01, 0x0b, 0x0b];
        let mut ctx = ctx_with(Features::none());
        let mut r = Reader::new(&bytes);
        let list = read_expression(&mut r, &mut ctx).unwrap();
        // The expression's own terminating end is consumed, not listed.
        assert_eq!(list.len(), 5);
        assert!(ctx.errors.is_empty());
    }

    #[test]
    fn expression_rejects_stray_else() {
        let bytes = [0x02, 0x40, 0x05, 0x0b, 0x0b];
        let mut ctx = ctx_with(Features::none());
        let mut r = Reader::new(&bytes);
        assert!(read_expression(&mut r, &mut ctx).is_none());
        assert!(ctx.errors.has_kind(ErrorKind::UnexpectedToken));
    }

    #[test]
    fn reads_legacy_element_segment() {
        // flags=0, offset = i32.const 0; end, two function indexes
        let bytes = [0x00, 0x41, 0x00, 0x0b, 0x02, 0x01, 0x02];
        let mut ctx = ctx_with(Features::none());
        let mut r = Reader::new(&bytes);
        let segment = read_element_segment(&mut r, &mut ctx).unwrap();
        assert_eq!(segment.segment_type, SegmentType::Active);
        assert_eq!(segment.table_index, Some(At::synthetic(0)));
        match &segment.elements {
            ElementList::Indexes(list) => {
                assert_eq!(list.kind.value, ExternalKind::Function);
                assert_eq!(list.list.len(), 2);
            }
            _ => panic!("expected index list"),
        }
    }

    #[test]
    fn reads_declared_element_segment() {
        // flags=3, elemkind=0 (func), one index
        let bytes = [0x03, 0x00, 0x01, 0x05];
        let mut ctx = ctx_with(Features::none().with(Features::REFERENCE_TYPES));
        let mut r = Reader::new(&bytes);
        let segment = read_element_segment(&mut r, &mut ctx).unwrap();
        assert_eq!(segment.segment_type, SegmentType::Declared);
        match &segment.elements {
            ElementList::Indexes(list) => assert_eq!(list.list[0].value, 5),
            _ => panic!("expected index list"),
        }
    }

    #[test]
    fn reads_passive_data_segment() {
        let bytes = [0x01, 0x03, 0xaa, 0xbb, 0xcc];
        let mut ctx = ctx_with(Features::none().with(Features::BULK_MEMORY));
        let mut r = Reader::new(&bytes);
        let segment = read_data_segment(&mut r, &mut ctx).unwrap();
        assert_eq!(segment.segment_type, SegmentType::Passive);
        assert_eq!(segment.init, vec![0xaa, 0xbb, 0xcc]);
        assert!(ctx.errors.is_empty());
    }

    #[test]
    fn code_size_mismatch_is_reported() {
        // declared size 5, but body is locals=0, end (2 bytes) + 3 garbage
        let bytes = [0x05, 0x00, 0x0b, 0x01, 0x01, 0x01];
        let mut ctx = ctx_with(Features::none());
        let mut r = Reader::new(&bytes);
        assert!(read_unpacked_code(&mut r, &mut ctx).is_none());
    }
}
