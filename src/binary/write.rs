//! Binary encoder: the inverse of the decoders. Writes minimal-length
//! LEB128 so that encoding a decoded module reproduces the input bytes.

use crate::opcode::Opcode;
use crate::span::At;
use crate::types::{Limits, SegmentType};
use crate::v128::V128;

use super::encoding::{
    DecodedDataSegmentFlags, DecodedElemSegmentFlags, DecodedLimitsFlags, BLOCK_TYPE_VOID,
};
use super::lazy::{MAGIC, VERSION};
use super::types::*;

pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub fn write_u32_leb(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn write_u64_leb(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn write_s32_leb(out: &mut Vec<u8>, value: i32) {
    write_s64_leb(out, i64::from(value));
}

pub fn write_s64_leb(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let sign_clear = byte & 0x40 == 0;
        if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Fixed five-byte u32 LEB128, for patching a size slot after the content
/// following it has been emitted.
pub fn write_u32_leb_fixed(out: &mut Vec<u8>, mut value: u32) {
    for _ in 0..4 {
        out.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    out.push((value & 0x7f) as u8);
}

pub fn write_index(out: &mut Vec<u8>, value: u32) {
    write_u32_leb(out, value);
}

pub fn write_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_v128(out: &mut Vec<u8>, value: V128) {
    out.extend_from_slice(&value.into_raw());
}

pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u32_leb(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

pub fn write_string(out: &mut Vec<u8>, s: &str) {
    write_bytes(out, s.as_bytes());
}

pub fn write_vec<T>(out: &mut Vec<u8>, items: &[At<T>], mut f: impl FnMut(&mut Vec<u8>, &T)) {
    write_u32_leb(out, items.len() as u32);
    for item in items {
        f(out, &item.value);
    }
}

pub fn write_heap_type(out: &mut Vec<u8>, heap_type: &HeapType) {
    match heap_type {
        HeapType::Kind(kind) => {
            out.push(kind.into_raw());
        }
        HeapType::Index(index) => write_s64_leb(out, i64::from(index.value)),
    }
}

pub fn write_reference_type(out: &mut Vec<u8>, reference: &ReferenceType) {
    match reference {
        ReferenceType::Kind(kind) => out.push(kind.into_raw()),
        ReferenceType::Ref(ref_type) => {
            out.push(match ref_type.null {
                crate::types::Null::Yes => 0x6c,
                crate::types::Null::No => 0x6b,
            });
            write_heap_type(out, &ref_type.heap_type.value);
        }
    }
}

pub fn write_value_type(out: &mut Vec<u8>, value_type: &ValueType) {
    match value_type {
        ValueType::Numeric(numeric) => out.push(numeric.into_raw()),
        ValueType::Reference(reference) => write_reference_type(out, reference),
    }
}

pub fn write_block_type(out: &mut Vec<u8>, block_type: &BlockType) {
    match block_type {
        BlockType::Void => out.push(BLOCK_TYPE_VOID),
        BlockType::Value(value_type) => write_value_type(out, value_type),
        BlockType::Index(index) => write_s64_leb(out, i64::from(*index)),
    }
}

pub fn write_limits(out: &mut Vec<u8>, limits: &Limits) {
    let flags = DecodedLimitsFlags {
        has_max: limits.max.is_some(),
        shared: limits.shared.value,
    };
    out.push(flags.encode());
    write_u32_leb(out, limits.min.value);
    if let Some(max) = &limits.max {
        write_u32_leb(out, max.value);
    }
}

pub fn write_function_type(out: &mut Vec<u8>, ty: &FunctionType) {
    write_vec(out, &ty.param_types, write_value_type);
    write_vec(out, &ty.result_types, write_value_type);
}

pub fn write_type_entry(out: &mut Vec<u8>, entry: &TypeEntry) {
    out.push(0x60);
    write_function_type(out, &entry.ty.value);
}

pub fn write_table_type(out: &mut Vec<u8>, ty: &TableType) {
    write_reference_type(out, &ty.elemtype.value);
    write_limits(out, &ty.limits.value);
}

pub fn write_memory_type(out: &mut Vec<u8>, ty: &MemoryType) {
    write_limits(out, &ty.limits.value);
}

pub fn write_global_type(out: &mut Vec<u8>, ty: &GlobalType) {
    write_value_type(out, &ty.valtype.value);
    out.push(ty.mutability.value.into());
}

pub fn write_event_type(out: &mut Vec<u8>, ty: &EventType) {
    write_u32_leb(out, u32::from(u8::from(ty.attribute.value)));
    write_index(out, ty.type_index.value);
}

pub fn write_import(out: &mut Vec<u8>, import: &Import) {
    write_string(out, &import.module.value);
    write_string(out, &import.name.value);
    out.push(import.desc.kind().into_raw());
    match &import.desc {
        ImportDesc::Function(index) => write_index(out, index.value),
        ImportDesc::Table(ty) => write_table_type(out, &ty.value),
        ImportDesc::Memory(ty) => write_memory_type(out, &ty.value),
        ImportDesc::Global(ty) => write_global_type(out, &ty.value),
        ImportDesc::Event(ty) => write_event_type(out, &ty.value),
    }
}

pub fn write_export(out: &mut Vec<u8>, export: &Export) {
    write_string(out, &export.name.value);
    out.push(export.kind.value.into_raw());
    write_index(out, export.index.value);
}

pub fn write_locals(out: &mut Vec<u8>, locals: &Locals) {
    write_u32_leb(out, locals.count.value);
    write_value_type(out, &locals.value_type.value);
}

pub fn write_instruction(out: &mut Vec<u8>, instr: &Instruction) {
    let (prefix, code) = instr.opcode.value.encode();
    match prefix {
        Some(prefix) => {
            out.push(prefix);
            write_u32_leb(out, code);
        }
        None => out.push(code as u8),
    }
    match &instr.immediate {
        Immediate::None => {}
        Immediate::S32(v) => write_s32_leb(out, v.value),
        Immediate::S64(v) => write_s64_leb(out, v.value),
        Immediate::F32(v) => write_f32(out, v.value),
        Immediate::F64(v) => write_f64(out, v.value),
        Immediate::V128(v) => write_v128(out, v.value),
        Immediate::Index(v) => write_index(out, v.value),
        Immediate::BlockType(v) => write_block_type(out, &v.value),
        Immediate::BrOnExn(v) => {
            write_index(out, v.target.value);
            write_index(out, v.event_index.value);
        }
        Immediate::BrTable(v) => {
            write_vec(out, &v.targets, |out, target| write_index(out, *target));
            write_index(out, v.default_target.value);
        }
        Immediate::CallIndirect(v) => {
            write_index(out, v.type_index.value);
            write_index(out, v.table_index.value);
        }
        Immediate::Copy(v) => {
            write_index(out, v.dst_index.value);
            write_index(out, v.src_index.value);
        }
        Immediate::Init(v) => {
            write_index(out, v.segment_index.value);
            write_index(out, v.dst_index.value);
        }
        Immediate::Let(v) => {
            write_block_type(out, &v.block_type.value);
            write_vec(out, &v.locals, write_locals);
        }
        Immediate::MemArg(v) => {
            write_u32_leb(out, v.align_log2.value);
            write_u32_leb(out, v.offset.value);
        }
        Immediate::HeapType(v) => write_heap_type(out, &v.value),
        Immediate::Select(v) => write_vec(out, &v.value, write_value_type),
        Immediate::Shuffle(v) => out.extend_from_slice(&v.value),
        Immediate::SimdLane(v) => out.push(v.value),
    }
}

/// Writes an instruction list followed by the terminating `end`.
pub fn write_expression(out: &mut Vec<u8>, instructions: &InstructionList) {
    for instr in instructions {
        write_instruction(out, &instr.value);
    }
    let (_, end) = Opcode::End.encode();
    out.push(end as u8);
}

pub fn write_constant_expression(out: &mut Vec<u8>, expr: &ConstantExpression) {
    write_expression(out, &expr.instructions);
}

pub fn write_element_expression(out: &mut Vec<u8>, expr: &ElementExpression) {
    write_expression(out, &expr.instructions);
}

pub fn write_code(out: &mut Vec<u8>, code: &UnpackedCode) {
    let mut body = Vec::new();
    write_vec(&mut body, &code.locals, write_locals);
    write_expression(&mut body, &code.body);
    write_bytes(out, &body);
}

fn elem_segment_flags(segment: &ElementSegment) -> DecodedElemSegmentFlags {
    DecodedElemSegmentFlags {
        segment_type: segment.segment_type,
        has_non_zero_index: segment.segment_type == SegmentType::Active
            && segment.table_index.as_ref().is_some_and(|i| i.value != 0),
        has_expressions: matches!(segment.elements, ElementList::Expressions(_)),
    }
}

pub fn write_element_segment(out: &mut Vec<u8>, segment: &ElementSegment) {
    let flags = elem_segment_flags(segment);
    write_u32_leb(out, u32::from(flags.encode()));
    if flags.has_non_zero_index {
        write_index(out, segment.table_index.as_ref().unwrap().value);
    }
    if let Some(offset) = &segment.offset {
        write_constant_expression(out, &offset.value);
    }
    match &segment.elements {
        ElementList::Indexes(list) => {
            if !flags.is_legacy_active() {
                out.push(list.kind.value.into_raw());
            }
            write_vec(out, &list.list, |out, index| write_index(out, *index));
        }
        ElementList::Expressions(list) => {
            if !flags.is_legacy_active() {
                write_reference_type(out, &list.elemtype.value);
            }
            write_vec(out, &list.list, write_element_expression);
        }
    }
}

pub fn write_data_segment(out: &mut Vec<u8>, segment: &DataSegment) {
    let flags = DecodedDataSegmentFlags {
        segment_type: segment.segment_type,
        has_non_zero_index: segment.segment_type == SegmentType::Active
            && segment.memory_index.as_ref().is_some_and(|i| i.value != 0),
    };
    write_u32_leb(out, u32::from(flags.encode()));
    if flags.has_non_zero_index {
        write_index(out, segment.memory_index.as_ref().unwrap().value);
    }
    if let Some(offset) = &segment.offset {
        write_constant_expression(out, &offset.value);
    }
    write_bytes(out, &segment.init);
}

fn write_section(out: &mut Vec<u8>, id: SectionId, payload: &[u8]) {
    out.push(u8::from(id));
    write_bytes(out, payload);
}

fn write_vec_section<T>(
    out: &mut Vec<u8>,
    id: SectionId,
    items: &[At<T>],
    f: impl FnMut(&mut Vec<u8>, &T),
) {
    if items.is_empty() {
        return;
    }
    let mut payload = Vec::new();
    write_vec(&mut payload, items, f);
    write_section(out, id, &payload);
}

pub fn write_custom_section(out: &mut Vec<u8>, custom: &CustomSection) {
    let mut payload = Vec::new();
    write_string(&mut payload, &custom.name.value);
    payload.extend_from_slice(&custom.data);
    write_section(out, SectionId::Custom, &payload);
}

/// Encodes a whole module in canonical section order, re-interleaving
/// custom sections after the known section they followed on decode.
pub fn write_module(module: &Module) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(VERSION);

    let mut custom_written = vec![false; module.custom_sections.len()];
    let mut write_customs_after = |out: &mut Vec<u8>, after: Option<SectionId>| {
        for (i, (placement, custom)) in module.custom_sections.iter().enumerate() {
            if !custom_written[i] && *placement == after {
                custom_written[i] = true;
                write_custom_section(out, &custom.value);
            }
        }
    };

    write_customs_after(&mut out, None);
    write_vec_section(&mut out, SectionId::Type, &module.types, write_type_entry);
    if !module.types.is_empty() {
        write_customs_after(&mut out, Some(SectionId::Type));
    }
    write_vec_section(&mut out, SectionId::Import, &module.imports, write_import);
    if !module.imports.is_empty() {
        write_customs_after(&mut out, Some(SectionId::Import));
    }
    write_vec_section(&mut out, SectionId::Function, &module.functions, |out, f| {
        write_index(out, f.type_index.value)
    });
    if !module.functions.is_empty() {
        write_customs_after(&mut out, Some(SectionId::Function));
    }
    write_vec_section(&mut out, SectionId::Table, &module.tables, |out, t| {
        write_table_type(out, &t.table_type.value)
    });
    if !module.tables.is_empty() {
        write_customs_after(&mut out, Some(SectionId::Table));
    }
    write_vec_section(&mut out, SectionId::Memory, &module.memories, |out, m| {
        write_memory_type(out, &m.memory_type.value)
    });
    if !module.memories.is_empty() {
        write_customs_after(&mut out, Some(SectionId::Memory));
    }
    write_vec_section(&mut out, SectionId::Global, &module.globals, |out, g| {
        write_global_type(out, &g.global_type.value);
        write_constant_expression(out, &g.init.value);
    });
    if !module.globals.is_empty() {
        write_customs_after(&mut out, Some(SectionId::Global));
    }
    write_vec_section(&mut out, SectionId::Event, &module.events, |out, e| {
        write_event_type(out, &e.event_type.value)
    });
    if !module.events.is_empty() {
        write_customs_after(&mut out, Some(SectionId::Event));
    }
    write_vec_section(&mut out, SectionId::Export, &module.exports, write_export);
    if !module.exports.is_empty() {
        write_customs_after(&mut out, Some(SectionId::Export));
    }
    if let Some(start) = &module.start {
        let mut payload = Vec::new();
        write_index(&mut payload, start.func_index.value);
        write_section(&mut out, SectionId::Start, &payload);
        write_customs_after(&mut out, Some(SectionId::Start));
    }
    write_vec_section(
        &mut out,
        SectionId::Element,
        &module.element_segments,
        write_element_segment,
    );
    if !module.element_segments.is_empty() {
        write_customs_after(&mut out, Some(SectionId::Element));
    }
    if let Some(data_count) = &module.data_count {
        let mut payload = Vec::new();
        write_index(&mut payload, data_count.count.value);
        write_section(&mut out, SectionId::DataCount, &payload);
        write_customs_after(&mut out, Some(SectionId::DataCount));
    }
    write_vec_section(&mut out, SectionId::Code, &module.codes, write_code);
    if !module.codes.is_empty() {
        write_customs_after(&mut out, Some(SectionId::Code));
    }
    write_vec_section(
        &mut out,
        SectionId::Data,
        &module.data_segments,
        write_data_segment,
    );
    if !module.data_segments.is_empty() {
        write_customs_after(&mut out, Some(SectionId::Data));
    }

    // Custom sections whose anchor section was not emitted go last.
    for (i, (_, custom)) in module.custom_sections.iter().enumerate() {
        if !custom_written[i] {
            write_custom_section(&mut out, &custom.value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Errors;
    use crate::binary::reader::Reader;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(127)]
    #[case(128)]
    #[case(624_485)]
    #[case(u32::MAX)]
    fn u32_leb_round_trip(#[case] value: u32) {
        let mut out = Vec::new();
        write_u32_leb(&mut out, value);
        let mut errors = Errors::new();
        let mut r = Reader::new(&out);
        assert_eq!(r.read_u32_leb(&mut errors).unwrap().value, value);
        assert!(r.is_empty());
    }

    #[rstest]
    #[case(0)]
    #[case(63)]
    #[case(64)]
    #[case(-1)]
    #[case(-64)]
    #[case(-65)]
    #[case(i32::MAX)]
    #[case(i32::MIN)]
    fn s32_leb_round_trip(#[case] value: i32) {
        let mut out = Vec::new();
        write_s32_leb(&mut out, value);
        let mut errors = Errors::new();
        let mut r = Reader::new(&out);
        assert_eq!(r.read_s32_leb(&mut errors).unwrap().value, value);
        assert!(r.is_empty());
    }

    #[test]
    fn leb_encodings_are_minimal() {
        let mut out = Vec::new();
        write_u32_leb(&mut out, 127);
        assert_eq!(out, [0x7f]);
        out.clear();
        write_u32_leb(&mut out, 128);
        assert_eq!(out, [0x80, 0x01]);
        out.clear();
        write_s32_leb(&mut out, -64);
        assert_eq!(out, [0x40]);
        out.clear();
        write_s32_leb(&mut out, -65);
        assert_eq!(out, [0xbf, 0x7f]);
    }

    #[test]
    fn fixed_leb_is_five_bytes_and_decodes() {
        let mut out = Vec::new();
        write_u32_leb_fixed(&mut out, 3);
        assert_eq!(out, [0x83, 0x80, 0x80, 0x80, 0x00]);
        let mut errors = Errors::new();
        let mut r = Reader::new(&out);
        // A padded encoding is still "out of range" by the strict reader
        // only when unused bits are set; zero padding is well-formed.
        assert_eq!(r.read_u32_leb(&mut errors).unwrap().value, 3);
    }

    #[test]
    fn value_types_encode_as_sleb_bytes() {
        let mut out = Vec::new();
        write_value_type(&mut out, &ValueType::I32);
        write_value_type(&mut out, &ValueType::F64);
        assert_eq!(out, [0x7f, 0x7c]);
    }

    #[test]
    fn block_type_index_uses_sleb() {
        let mut out = Vec::new();
        write_block_type(&mut out, &BlockType::Index(5));
        assert_eq!(out, [0x05]);
        out.clear();
        write_block_type(&mut out, &BlockType::Void);
        assert_eq!(out, [0x40]);
    }

    #[test]
    fn empty_module_is_magic_and_version() {
        let bytes = write_module(&Module::default());
        assert_eq!(bytes, b"\0asm\x01\0\0\0");
    }
}
