//! Declarative opcode catalog.
//!
//! Every opcode is listed exactly once, with its wire encoding (plain byte
//! or prefix + u32), its textual spelling, the proposal that gates it, and
//! the immediate form it carries. Everything else in the crate (binary
//! decode/encode, the tokenizer keyword table, the converter's alignment
//! lookup) is derived from this table.

use serde::Serialize;

use crate::features::Features;

/// Which immediate payload follows an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImmediateKind {
    None,
    S32,
    S64,
    F32,
    F64,
    V128,
    Index,
    BlockType,
    BrOnExn,
    BrTable,
    CallIndirect,
    Copy,
    Init,
    Let,
    MemArg,
    HeapType,
    Select,
    Shuffle,
    SimdLane,
}

macro_rules! feat {
    (MVP) => {
        Features::empty()
    };
    (SAT) => {
        Features::SATURATING_FLOAT_TO_INT
    };
    (SIGN_EXT) => {
        Features::SIGN_EXTENSION
    };
    (SIMD) => {
        Features::SIMD
    };
    (THREADS) => {
        Features::THREADS
    };
    (EXC) => {
        Features::EXCEPTIONS
    };
    (BULK) => {
        Features::BULK_MEMORY
    };
    (REF) => {
        Features::REFERENCE_TYPES
    };
    (FUNC_REF) => {
        Features::FUNCTION_REFERENCES
    };
    (TAIL) => {
        Features::TAIL_CALL
    };
}

macro_rules! with_opcodes {
    ($cb:ident) => {
        $cb! {
            plain {
                Unreachable: 0x00, "unreachable", MVP, None;
                Nop: 0x01, "nop", MVP, None;
                Block: 0x02, "block", MVP, BlockType;
                Loop: 0x03, "loop", MVP, BlockType;
                If: 0x04, "if", MVP, BlockType;
                Else: 0x05, "else", MVP, None;
                Try: 0x06, "try", EXC, BlockType;
                Catch: 0x07, "catch", EXC, None;
                Throw: 0x08, "throw", EXC, Index;
                Rethrow: 0x09, "rethrow", EXC, None;
                BrOnExn: 0x0a, "br_on_exn", EXC, BrOnExn;
                End: 0x0b, "end", MVP, None;
                Br: 0x0c, "br", MVP, Index;
                BrIf: 0x0d, "br_if", MVP, Index;
                BrTable: 0x0e, "br_table", MVP, BrTable;
                Return: 0x0f, "return", MVP, None;
                Call: 0x10, "call", MVP, Index;
                CallIndirect: 0x11, "call_indirect", MVP, CallIndirect;
                ReturnCall: 0x12, "return_call", TAIL, Index;
                ReturnCallIndirect: 0x13, "return_call_indirect", TAIL, CallIndirect;
                CallRef: 0x14, "call_ref", FUNC_REF, None;
                ReturnCallRef: 0x15, "return_call_ref", FUNC_REF, None;
                FuncBind: 0x16, "func.bind", FUNC_REF, Index;
                Let: 0x17, "let", FUNC_REF, Let;
                Drop: 0x1a, "drop", MVP, None;
                Select: 0x1b, "select", MVP, None;
                SelectT: 0x1c, "select", REF, Select;
                LocalGet: 0x20, "local.get", MVP, Index;
                LocalSet: 0x21, "local.set", MVP, Index;
                LocalTee: 0x22, "local.tee", MVP, Index;
                GlobalGet: 0x23, "global.get", MVP, Index;
                GlobalSet: 0x24, "global.set", MVP, Index;
                TableGet: 0x25, "table.get", REF, Index;
                TableSet: 0x26, "table.set", REF, Index;
                I32Load: 0x28, "i32.load", MVP, MemArg;
                I64Load: 0x29, "i64.load", MVP, MemArg;
                F32Load: 0x2a, "f32.load", MVP, MemArg;
                F64Load: 0x2b, "f64.load", MVP, MemArg;
                I32Load8S: 0x2c, "i32.load8_s", MVP, MemArg;
                I32Load8U: 0x2d, "i32.load8_u", MVP, MemArg;
                I32Load16S: 0x2e, "i32.load16_s", MVP, MemArg;
                I32Load16U: 0x2f, "i32.load16_u", MVP, MemArg;
                I64Load8S: 0x30, "i64.load8_s", MVP, MemArg;
                I64Load8U: 0x31, "i64.load8_u", MVP, MemArg;
                I64Load16S: 0x32, "i64.load16_s", MVP, MemArg;
                I64Load16U: 0x33, "i64.load16_u", MVP, MemArg;
                I64Load32S: 0x34, "i64.load32_s", MVP, MemArg;
                I64Load32U: 0x35, "i64.load32_u", MVP, MemArg;
                I32Store: 0x36, "i32.store", MVP, MemArg;
                I64Store: 0x37, "i64.store", MVP, MemArg;
                F32Store: 0x38, "f32.store", MVP, MemArg;
                F64Store: 0x39, "f64.store", MVP, MemArg;
                I32Store8: 0x3a, "i32.store8", MVP, MemArg;
                I32Store16: 0x3b, "i32.store16", MVP, MemArg;
                I64Store8: 0x3c, "i64.store8", MVP, MemArg;
                I64Store16: 0x3d, "i64.store16", MVP, MemArg;
                I64Store32: 0x3e, "i64.store32", MVP, MemArg;
                MemorySize: 0x3f, "memory.size", MVP, Index;
                MemoryGrow: 0x40, "memory.grow", MVP, Index;
                I32Const: 0x41, "i32.const", MVP, S32;
                I64Const: 0x42, "i64.const", MVP, S64;
                F32Const: 0x43, "f32.const", MVP, F32;
                F64Const: 0x44, "f64.const", MVP, F64;
                I32Eqz: 0x45, "i32.eqz", MVP, None;
                I32Eq: 0x46, "i32.eq", MVP, None;
                I32Ne: 0x47, "i32.ne", MVP, None;
                I32LtS: 0x48, "i32.lt_s", MVP, None;
                I32LtU: 0x49, "i32.lt_u", MVP, None;
                I32GtS: 0x4a, "i32.gt_s", MVP, None;
                I32GtU: 0x4b, "i32.gt_u", MVP, None;
                I32LeS: 0x4c, "i32.le_s", MVP, None;
                I32LeU: 0x4d, "i32.le_u", MVP, None;
                I32GeS: 0x4e, "i32.ge_s", MVP, None;
                I32GeU: 0x4f, "i32.ge_u", MVP, None;
                I64Eqz: 0x50, "i64.eqz", MVP, None;
                I64Eq: 0x51, "i64.eq", MVP, None;
                I64Ne: 0x52, "i64.ne", MVP, None;
                I64LtS: 0x53, "i64.lt_s", MVP, None;
                I64LtU: 0x54, "i64.lt_u", MVP, None;
                I64GtS: 0x55, "i64.gt_s", MVP, None;
                I64GtU: 0x56, "i64.gt_u", MVP, None;
                I64LeS: 0x57, "i64.le_s", MVP, None;
                I64LeU: 0x58, "i64.le_u", MVP, None;
                I64GeS: 0x59, "i64.ge_s", MVP, None;
                I64GeU: 0x5a, "i64.ge_u", MVP, None;
                F32Eq: 0x5b, "f32.eq", MVP, None;
                F32Ne: 0x5c, "f32.ne", MVP, None;
                F32Lt: 0x5d, "f32.lt", MVP, None;
                F32Gt: 0x5e, "f32.gt", MVP, None;
                F32Le: 0x5f, "f32.le", MVP, None;
                F32Ge: 0x60, "f32.ge", MVP, None;
                F64Eq: 0x61, "f64.eq", MVP, None;
                F64Ne: 0x62, "f64.ne", MVP, None;
                F64Lt: 0x63, "f64.lt", MVP, None;
                F64Gt: 0x64, "f64.gt", MVP, None;
                F64Le: 0x65, "f64.le", MVP, None;
                F64Ge: 0x66, "f64.ge", MVP, None;
                I32Clz: 0x67, "i32.clz", MVP, None;
                I32Ctz: 0x68, "i32.ctz", MVP, None;
                I32Popcnt: 0x69, "i32.popcnt", MVP, None;
                I32Add: 0x6a, "i32.add", MVP, None;
                I32Sub: 0x6b, "i32.sub", MVP, None;
                I32Mul: 0x6c, "i32.mul", MVP, None;
                I32DivS: 0x6d, "i32.div_s", MVP, None;
                I32DivU: 0x6e, "i32.div_u", MVP, None;
                I32RemS: 0x6f, "i32.rem_s", MVP, None;
                I32RemU: 0x70, "i32.rem_u", MVP, None;
                I32And: 0x71, "i32.and", MVP, None;
                I32Or: 0x72, "i32.or", MVP, None;
                I32Xor: 0x73, "i32.xor", MVP, None;
                I32Shl: 0x74, "i32.shl", MVP, None;
                I32ShrS: 0x75, "i32.shr_s", MVP, None;
                I32ShrU: 0x76, "i32.shr_u", MVP, None;
                I32Rotl: 0x77, "i32.rotl", MVP, None;
                I32Rotr: 0x78, "i32.rotr", MVP, None;
                I64Clz: 0x79, "i64.clz", MVP, None;
                I64Ctz: 0x7a, "i64.ctz", MVP, None;
                I64Popcnt: 0x7b, "i64.popcnt", MVP, None;
                I64Add: 0x7c, "i64.add", MVP, None;
                I64Sub: 0x7d, "i64.sub", MVP, None;
                I64Mul: 0x7e, "i64.mul", MVP, None;
                I64DivS: 0x7f, "i64.div_s", MVP, None;
                I64DivU: 0x80, "i64.div_u", MVP, None;
                I64RemS: 0x81, "i64.rem_s", MVP, None;
                I64RemU: 0x82, "i64.rem_u", MVP, None;
                I64And: 0x83, "i64.and", MVP, None;
                I64Or: 0x84, "i64.or", MVP, None;
                I64Xor: 0x85, "i64.xor", MVP, None;
                I64Shl: 0x86, "i64.shl", MVP, None;
                I64ShrS: 0x87, "i64.shr_s", MVP, None;
                I64ShrU: 0x88, "i64.shr_u", MVP, None;
                I64Rotl: 0x89, "i64.rotl", MVP, None;
                I64Rotr: 0x8a, "i64.rotr", MVP, None;
                F32Abs: 0x8b, "f32.abs", MVP, None;
                F32Neg: 0x8c, "f32.neg", MVP, None;
                F32Ceil: 0x8d, "f32.ceil", MVP, None;
                F32Floor: 0x8e, "f32.floor", MVP, None;
                F32Trunc: 0x8f, "f32.trunc", MVP, None;
                F32Nearest: 0x90, "f32.nearest", MVP, None;
                F32Sqrt: 0x91, "f32.sqrt", MVP, None;
                F32Add: 0x92, "f32.add", MVP, None;
                F32Sub: 0x93, "f32.sub", MVP, None;
                F32Mul: 0x94, "f32.mul", MVP, None;
                F32Div: 0x95, "f32.div", MVP, None;
                F32Min: 0x96, "f32.min", MVP, None;
                F32Max: 0x97, "f32.max", MVP, None;
                F32Copysign: 0x98, "f32.copysign", MVP, None;
                F64Abs: 0x99, "f64.abs", MVP, None;
                F64Neg: 0x9a, "f64.neg", MVP, None;
                F64Ceil: 0x9b, "f64.ceil", MVP, None;
                F64Floor: 0x9c, "f64.floor", MVP, None;
                F64Trunc: 0x9d, "f64.trunc", MVP, None;
                F64Nearest: 0x9e, "f64.nearest", MVP, None;
                F64Sqrt: 0x9f, "f64.sqrt", MVP, None;
                F64Add: 0xa0, "f64.add", MVP, None;
                F64Sub: 0xa1, "f64.sub", MVP, None;
                F64Mul: 0xa2, "f64.mul", MVP, None;
                F64Div: 0xa3, "f64.div", MVP, None;
                F64Min: 0xa4, "f64.min", MVP, None;
                F64Max: 0xa5, "f64.max", MVP, None;
                F64Copysign: 0xa6, "f64.copysign", MVP, None;
                I32WrapI64: 0xa7, "i32.wrap_i64", MVP, None;
                I32TruncF32S: 0xa8, "i32.trunc_f32_s", MVP, None;
                I32TruncF32U: 0xa9, "i32.trunc_f32_u", MVP, None;
                I32TruncF64S: 0xaa, "i32.trunc_f64_s", MVP, None;
                I32TruncF64U: 0xab, "i32.trunc_f64_u", MVP, None;
                I64ExtendI32S: 0xac, "i64.extend_i32_s", MVP, None;
                I64ExtendI32U: 0xad, "i64.extend_i32_u", MVP, None;
                I64TruncF32S: 0xae, "i64.trunc_f32_s", MVP, None;
                I64TruncF32U: 0xaf, "i64.trunc_f32_u", MVP, None;
                I64TruncF64S: 0xb0, "i64.trunc_f64_s", MVP, None;
                I64TruncF64U: 0xb1, "i64.trunc_f64_u", MVP, None;
                F32ConvertI32S: 0xb2, "f32.convert_i32_s", MVP, None;
                F32ConvertI32U: 0xb3, "f32.convert_i32_u", MVP, None;
                F32ConvertI64S: 0xb4, "f32.convert_i64_s", MVP, None;
                F32ConvertI64U: 0xb5, "f32.convert_i64_u", MVP, None;
                F32DemoteF64: 0xb6, "f32.demote_f64", MVP, None;
                F64ConvertI32S: 0xb7, "f64.convert_i32_s", MVP, None;
                F64ConvertI32U: 0xb8, "f64.convert_i32_u", MVP, None;
                F64ConvertI64S: 0xb9, "f64.convert_i64_s", MVP, None;
                F64ConvertI64U: 0xba, "f64.convert_i64_u", MVP, None;
                F64PromoteF32: 0xbb, "f64.promote_f32", MVP, None;
                I32ReinterpretF32: 0xbc, "i32.reinterpret_f32", MVP, None;
                I64ReinterpretF64: 0xbd, "i64.reinterpret_f64", MVP, None;
                F32ReinterpretI32: 0xbe, "f32.reinterpret_i32", MVP, None;
                F64ReinterpretI64: 0xbf, "f64.reinterpret_i64", MVP, None;
                I32Extend8S: 0xc0, "i32.extend8_s", SIGN_EXT, None;
                I32Extend16S: 0xc1, "i32.extend16_s", SIGN_EXT, None;
                I64Extend8S: 0xc2, "i64.extend8_s", SIGN_EXT, None;
                I64Extend16S: 0xc3, "i64.extend16_s", SIGN_EXT, None;
                I64Extend32S: 0xc4, "i64.extend32_s", SIGN_EXT, None;
                RefNull: 0xd0, "ref.null", REF, HeapType;
                RefIsNull: 0xd1, "ref.is_null", REF, None;
                RefFunc: 0xd2, "ref.func", REF, Index;
                RefAsNonNull: 0xd3, "ref.as_non_null", FUNC_REF, None;
                BrOnNull: 0xd4, "br_on_null", FUNC_REF, Index;
            }
            prefixed {
                I32TruncSatF32S: 0xfc, 0x00, "i32.trunc_sat_f32_s", SAT, None;
                I32TruncSatF32U: 0xfc, 0x01, "i32.trunc_sat_f32_u", SAT, None;
                I32TruncSatF64S: 0xfc, 0x02, "i32.trunc_sat_f64_s", SAT, None;
                I32TruncSatF64U: 0xfc, 0x03, "i32.trunc_sat_f64_u", SAT, None;
                I64TruncSatF32S: 0xfc, 0x04, "i64.trunc_sat_f32_s", SAT, None;
                I64TruncSatF32U: 0xfc, 0x05, "i64.trunc_sat_f32_u", SAT, None;
                I64TruncSatF64S: 0xfc, 0x06, "i64.trunc_sat_f64_s", SAT, None;
                I64TruncSatF64U: 0xfc, 0x07, "i64.trunc_sat_f64_u", SAT, None;
                MemoryInit: 0xfc, 0x08, "memory.init", BULK, Init;
                DataDrop: 0xfc, 0x09, "data.drop", BULK, Index;
                MemoryCopy: 0xfc, 0x0a, "memory.copy", BULK, Copy;
                MemoryFill: 0xfc, 0x0b, "memory.fill", BULK, Index;
                TableInit: 0xfc, 0x0c, "table.init", BULK, Init;
                ElemDrop: 0xfc, 0x0d, "elem.drop", BULK, Index;
                TableCopy: 0xfc, 0x0e, "table.copy", BULK, Copy;
                TableGrow: 0xfc, 0x0f, "table.grow", REF, Index;
                TableSize: 0xfc, 0x10, "table.size", REF, Index;
                TableFill: 0xfc, 0x11, "table.fill", REF, Index;
                V128Load: 0xfd, 0x00, "v128.load", SIMD, MemArg;
                V128Load8X8S: 0xfd, 0x01, "v128.load8x8_s", SIMD, MemArg;
                V128Load8X8U: 0xfd, 0x02, "v128.load8x8_u", SIMD, MemArg;
                V128Load16X4S: 0xfd, 0x03, "v128.load16x4_s", SIMD, MemArg;
                V128Load16X4U: 0xfd, 0x04, "v128.load16x4_u", SIMD, MemArg;
                V128Load32X2S: 0xfd, 0x05, "v128.load32x2_s", SIMD, MemArg;
                V128Load32X2U: 0xfd, 0x06, "v128.load32x2_u", SIMD, MemArg;
                V128Load8Splat: 0xfd, 0x07, "v128.load8_splat", SIMD, MemArg;
                V128Load16Splat: 0xfd, 0x08, "v128.load16_splat", SIMD, MemArg;
                V128Load32Splat: 0xfd, 0x09, "v128.load32_splat", SIMD, MemArg;
                V128Load64Splat: 0xfd, 0x0a, "v128.load64_splat", SIMD, MemArg;
                V128Store: 0xfd, 0x0b, "v128.store", SIMD, MemArg;
                V128Const: 0xfd, 0x0c, "v128.const", SIMD, V128;
                I8X16Shuffle: 0xfd, 0x0d, "i8x16.shuffle", SIMD, Shuffle;
                I8X16Swizzle: 0xfd, 0x0e, "i8x16.swizzle", SIMD, None;
                I8X16Splat: 0xfd, 0x0f, "i8x16.splat", SIMD, None;
                I16X8Splat: 0xfd, 0x10, "i16x8.splat", SIMD, None;
                I32X4Splat: 0xfd, 0x11, "i32x4.splat", SIMD, None;
                I64X2Splat: 0xfd, 0x12, "i64x2.splat", SIMD, None;
                F32X4Splat: 0xfd, 0x13, "f32x4.splat", SIMD, None;
                F64X2Splat: 0xfd, 0x14, "f64x2.splat", SIMD, None;
                I8X16ExtractLaneS: 0xfd, 0x15, "i8x16.extract_lane_s", SIMD, SimdLane;
                I8X16ExtractLaneU: 0xfd, 0x16, "i8x16.extract_lane_u", SIMD, SimdLane;
                I8X16ReplaceLane: 0xfd, 0x17, "i8x16.replace_lane", SIMD, SimdLane;
                I16X8ExtractLaneS: 0xfd, 0x18, "i16x8.extract_lane_s", SIMD, SimdLane;
                I16X8ExtractLaneU: 0xfd, 0x19, "i16x8.extract_lane_u", SIMD, SimdLane;
                I16X8ReplaceLane: 0xfd, 0x1a, "i16x8.replace_lane", SIMD, SimdLane;
                I32X4ExtractLane: 0xfd, 0x1b, "i32x4.extract_lane", SIMD, SimdLane;
                I32X4ReplaceLane: 0xfd, 0x1c, "i32x4.replace_lane", SIMD, SimdLane;
                I64X2ExtractLane: 0xfd, 0x1d, "i64x2.extract_lane", SIMD, SimdLane;
                I64X2ReplaceLane: 0xfd, 0x1e, "i64x2.replace_lane", SIMD, SimdLane;
                F32X4ExtractLane: 0xfd, 0x1f, "f32x4.extract_lane", SIMD, SimdLane;
                F32X4ReplaceLane: 0xfd, 0x20, "f32x4.replace_lane", SIMD, SimdLane;
                F64X2ExtractLane: 0xfd, 0x21, "f64x2.extract_lane", SIMD, SimdLane;
                F64X2ReplaceLane: 0xfd, 0x22, "f64x2.replace_lane", SIMD, SimdLane;
                I8X16Eq: 0xfd, 0x23, "i8x16.eq", SIMD, None;
                I8X16Ne: 0xfd, 0x24, "i8x16.ne", SIMD, None;
                I8X16LtS: 0xfd, 0x25, "i8x16.lt_s", SIMD, None;
                I8X16LtU: 0xfd, 0x26, "i8x16.lt_u", SIMD, None;
                I8X16GtS: 0xfd, 0x27, "i8x16.gt_s", SIMD, None;
                I8X16GtU: 0xfd, 0x28, "i8x16.gt_u", SIMD, None;
                I8X16LeS: 0xfd, 0x29, "i8x16.le_s", SIMD, None;
                I8X16LeU: 0xfd, 0x2a, "i8x16.le_u", SIMD, None;
                I8X16GeS: 0xfd, 0x2b, "i8x16.ge_s", SIMD, None;
                I8X16GeU: 0xfd, 0x2c, "i8x16.ge_u", SIMD, None;
                I16X8Eq: 0xfd, 0x2d, "i16x8.eq", SIMD, None;
                I16X8Ne: 0xfd, 0x2e, "i16x8.ne", SIMD, None;
                I16X8LtS: 0xfd, 0x2f, "i16x8.lt_s", SIMD, None;
                I16X8LtU: 0xfd, 0x30, "i16x8.lt_u", SIMD, None;
                I16X8GtS: 0xfd, 0x31, "i16x8.gt_s", SIMD, None;
                I16X8GtU: 0xfd, 0x32, "i16x8.gt_u", SIMD, None;
                I16X8LeS: 0xfd, 0x33, "i16x8.le_s", SIMD, None;
                I16X8LeU: 0xfd, 0x34, "i16x8.le_u", SIMD, None;
                I16X8GeS: 0xfd, 0x35, "i16x8.ge_s", SIMD, None;
                I16X8GeU: 0xfd, 0x36, "i16x8.ge_u", SIMD, None;
                I32X4Eq: 0xfd, 0x37, "i32x4.eq", SIMD, None;
                I32X4Ne: 0xfd, 0x38, "i32x4.ne", SIMD, None;
                I32X4LtS: 0xfd, 0x39, "i32x4.lt_s", SIMD, None;
                I32X4LtU: 0xfd, 0x3a, "i32x4.lt_u", SIMD, None;
                I32X4GtS: 0xfd, 0x3b, "i32x4.gt_s", SIMD, None;
                I32X4GtU: 0xfd, 0x3c, "i32x4.gt_u", SIMD, None;
                I32X4LeS: 0xfd, 0x3d, "i32x4.le_s", SIMD, None;
                I32X4LeU: 0xfd, 0x3e, "i32x4.le_u", SIMD, None;
                I32X4GeS: 0xfd, 0x3f, "i32x4.ge_s", SIMD, None;
                I32X4GeU: 0xfd, 0x40, "i32x4.ge_u", SIMD, None;
                F32X4Eq: 0xfd, 0x41, "f32x4.eq", SIMD, None;
                F32X4Ne: 0xfd, 0x42, "f32x4.ne", SIMD, None;
                F32X4Lt: 0xfd, 0x43, "f32x4.lt", SIMD, None;
                F32X4Gt: 0xfd, 0x44, "f32x4.gt", SIMD, None;
                F32X4Le: 0xfd, 0x45, "f32x4.le", SIMD, None;
                F32X4Ge: 0xfd, 0x46, "f32x4.ge", SIMD, None;
                F64X2Eq: 0xfd, 0x47, "f64x2.eq", SIMD, None;
                F64X2Ne: 0xfd, 0x48, "f64x2.ne", SIMD, None;
                F64X2Lt: 0xfd, 0x49, "f64x2.lt", SIMD, None;
                F64X2Gt: 0xfd, 0x4a, "f64x2.gt", SIMD, None;
                F64X2Le: 0xfd, 0x4b, "f64x2.le", SIMD, None;
                F64X2Ge: 0xfd, 0x4c, "f64x2.ge", SIMD, None;
                V128Not: 0xfd, 0x4d, "v128.not", SIMD, None;
                V128And: 0xfd, 0x4e, "v128.and", SIMD, None;
                V128Andnot: 0xfd, 0x4f, "v128.andnot", SIMD, None;
                V128Or: 0xfd, 0x50, "v128.or", SIMD, None;
                V128Xor: 0xfd, 0x51, "v128.xor", SIMD, None;
                V128Bitselect: 0xfd, 0x52, "v128.bitselect", SIMD, None;
                V128AnyTrue: 0xfd, 0x53, "v128.any_true", SIMD, None;
                V128Load32Zero: 0xfd, 0x5c, "v128.load32_zero", SIMD, MemArg;
                V128Load64Zero: 0xfd, 0x5d, "v128.load64_zero", SIMD, MemArg;
                F32X4DemoteF64X2Zero: 0xfd, 0x5e, "f32x4.demote_f64x2_zero", SIMD, None;
                F64X2PromoteLowF32X4: 0xfd, 0x5f, "f64x2.promote_low_f32x4", SIMD, None;
                I8X16Abs: 0xfd, 0x60, "i8x16.abs", SIMD, None;
                I8X16Neg: 0xfd, 0x61, "i8x16.neg", SIMD, None;
                I8X16Popcnt: 0xfd, 0x62, "i8x16.popcnt", SIMD, None;
                I8X16AllTrue: 0xfd, 0x63, "i8x16.all_true", SIMD, None;
                I8X16Bitmask: 0xfd, 0x64, "i8x16.bitmask", SIMD, None;
                I8X16NarrowI16X8S: 0xfd, 0x65, "i8x16.narrow_i16x8_s", SIMD, None;
                I8X16NarrowI16X8U: 0xfd, 0x66, "i8x16.narrow_i16x8_u", SIMD, None;
                F32X4Ceil: 0xfd, 0x67, "f32x4.ceil", SIMD, None;
                F32X4Floor: 0xfd, 0x68, "f32x4.floor", SIMD, None;
                F32X4Trunc: 0xfd, 0x69, "f32x4.trunc", SIMD, None;
                F32X4Nearest: 0xfd, 0x6a, "f32x4.nearest", SIMD, None;
                I8X16Shl: 0xfd, 0x6b, "i8x16.shl", SIMD, None;
                I8X16ShrS: 0xfd, 0x6c, "i8x16.shr_s", SIMD, None;
                I8X16ShrU: 0xfd, 0x6d, "i8x16.shr_u", SIMD, None;
                I8X16Add: 0xfd, 0x6e, "i8x16.add", SIMD, None;
                I8X16AddSatS: 0xfd, 0x6f, "i8x16.add_sat_s", SIMD, None;
                I8X16AddSatU: 0xfd, 0x70, "i8x16.add_sat_u", SIMD, None;
                I8X16Sub: 0xfd, 0x71, "i8x16.sub", SIMD, None;
                I8X16SubSatS: 0xfd, 0x72, "i8x16.sub_sat_s", SIMD, None;
                I8X16SubSatU: 0xfd, 0x73, "i8x16.sub_sat_u", SIMD, None;
                F64X2Ceil: 0xfd, 0x74, "f64x2.ceil", SIMD, None;
                F64X2Floor: 0xfd, 0x75, "f64x2.floor", SIMD, None;
                I8X16MinS: 0xfd, 0x76, "i8x16.min_s", SIMD, None;
                I8X16MinU: 0xfd, 0x77, "i8x16.min_u", SIMD, None;
                I8X16MaxS: 0xfd, 0x78, "i8x16.max_s", SIMD, None;
                I8X16MaxU: 0xfd, 0x79, "i8x16.max_u", SIMD, None;
                F64X2Trunc: 0xfd, 0x7a, "f64x2.trunc", SIMD, None;
                I8X16AvgrU: 0xfd, 0x7b, "i8x16.avgr_u", SIMD, None;
                I16X8ExtaddPairwiseI8X16S: 0xfd, 0x7c, "i16x8.extadd_pairwise_i8x16_s", SIMD, None;
                I16X8ExtaddPairwiseI8X16U: 0xfd, 0x7d, "i16x8.extadd_pairwise_i8x16_u", SIMD, None;
                I32X4ExtaddPairwiseI16X8S: 0xfd, 0x7e, "i32x4.extadd_pairwise_i16x8_s", SIMD, None;
                I32X4ExtaddPairwiseI16X8U: 0xfd, 0x7f, "i32x4.extadd_pairwise_i16x8_u", SIMD, None;
                I16X8Abs: 0xfd, 0x80, "i16x8.abs", SIMD, None;
                I16X8Neg: 0xfd, 0x81, "i16x8.neg", SIMD, None;
                I16X8Q15MulrSatS: 0xfd, 0x82, "i16x8.q15mulr_sat_s", SIMD, None;
                I16X8AllTrue: 0xfd, 0x83, "i16x8.all_true", SIMD, None;
                I16X8Bitmask: 0xfd, 0x84, "i16x8.bitmask", SIMD, None;
                I16X8NarrowI32X4S: 0xfd, 0x85, "i16x8.narrow_i32x4_s", SIMD, None;
                I16X8NarrowI32X4U: 0xfd, 0x86, "i16x8.narrow_i32x4_u", SIMD, None;
                I16X8ExtendLowI8X16S: 0xfd, 0x87, "i16x8.extend_low_i8x16_s", SIMD, None;
                I16X8ExtendHighI8X16S: 0xfd, 0x88, "i16x8.extend_high_i8x16_s", SIMD, None;
                I16X8ExtendLowI8X16U: 0xfd, 0x89, "i16x8.extend_low_i8x16_u", SIMD, None;
                I16X8ExtendHighI8X16U: 0xfd, 0x8a, "i16x8.extend_high_i8x16_u", SIMD, None;
                I16X8Shl: 0xfd, 0x8b, "i16x8.shl", SIMD, None;
                I16X8ShrS: 0xfd, 0x8c, "i16x8.shr_s", SIMD, None;
                I16X8ShrU: 0xfd, 0x8d, "i16x8.shr_u", SIMD, None;
                I16X8Add: 0xfd, 0x8e, "i16x8.add", SIMD, None;
                I16X8AddSatS: 0xfd, 0x8f, "i16x8.add_sat_s", SIMD, None;
                I16X8AddSatU: 0xfd, 0x90, "i16x8.add_sat_u", SIMD, None;
                I16X8Sub: 0xfd, 0x91, "i16x8.sub", SIMD, None;
                I16X8SubSatS: 0xfd, 0x92, "i16x8.sub_sat_s", SIMD, None;
                I16X8SubSatU: 0xfd, 0x93, "i16x8.sub_sat_u", SIMD, None;
                F64X2Nearest: 0xfd, 0x94, "f64x2.nearest", SIMD, None;
                I16X8Mul: 0xfd, 0x95, "i16x8.mul", SIMD, None;
                I16X8MinS: 0xfd, 0x96, "i16x8.min_s", SIMD, None;
                I16X8MinU: 0xfd, 0x97, "i16x8.min_u", SIMD, None;
                I16X8MaxS: 0xfd, 0x98, "i16x8.max_s", SIMD, None;
                I16X8MaxU: 0xfd, 0x99, "i16x8.max_u", SIMD, None;
                I16X8AvgrU: 0xfd, 0x9b, "i16x8.avgr_u", SIMD, None;
                I16X8ExtmulLowI8X16S: 0xfd, 0x9c, "i16x8.extmul_low_i8x16_s", SIMD, None;
                I16X8ExtmulHighI8X16S: 0xfd, 0x9d, "i16x8.extmul_high_i8x16_s", SIMD, None;
                I16X8ExtmulLowI8X16U: 0xfd, 0x9e, "i16x8.extmul_low_i8x16_u", SIMD, None;
                I16X8ExtmulHighI8X16U: 0xfd, 0x9f, "i16x8.extmul_high_i8x16_u", SIMD, None;
                I32X4Abs: 0xfd, 0xa0, "i32x4.abs", SIMD, None;
                I32X4Neg: 0xfd, 0xa1, "i32x4.neg", SIMD, None;
                I32X4AllTrue: 0xfd, 0xa3, "i32x4.all_true", SIMD, None;
                I32X4Bitmask: 0xfd, 0xa4, "i32x4.bitmask", SIMD, None;
                I32X4ExtendLowI16X8S: 0xfd, 0xa7, "i32x4.extend_low_i16x8_s", SIMD, None;
                I32X4ExtendHighI16X8S: 0xfd, 0xa8, "i32x4.extend_high_i16x8_s", SIMD, None;
                I32X4ExtendLowI16X8U: 0xfd, 0xa9, "i32x4.extend_low_i16x8_u", SIMD, None;
                I32X4ExtendHighI16X8U: 0xfd, 0xaa, "i32x4.extend_high_i16x8_u", SIMD, None;
                I32X4Shl: 0xfd, 0xab, "i32x4.shl", SIMD, None;
                I32X4ShrS: 0xfd, 0xac, "i32x4.shr_s", SIMD, None;
                I32X4ShrU: 0xfd, 0xad, "i32x4.shr_u", SIMD, None;
                I32X4Add: 0xfd, 0xae, "i32x4.add", SIMD, None;
                I32X4Sub: 0xfd, 0xb1, "i32x4.sub", SIMD, None;
                I32X4Mul: 0xfd, 0xb5, "i32x4.mul", SIMD, None;
                I32X4MinS: 0xfd, 0xb6, "i32x4.min_s", SIMD, None;
                I32X4MinU: 0xfd, 0xb7, "i32x4.min_u", SIMD, None;
                I32X4MaxS: 0xfd, 0xb8, "i32x4.max_s", SIMD, None;
                I32X4MaxU: 0xfd, 0xb9, "i32x4.max_u", SIMD, None;
                I32X4DotI16X8S: 0xfd, 0xba, "i32x4.dot_i16x8_s", SIMD, None;
                I32X4ExtmulLowI16X8S: 0xfd, 0xbc, "i32x4.extmul_low_i16x8_s", SIMD, None;
                I32X4ExtmulHighI16X8S: 0xfd, 0xbd, "i32x4.extmul_high_i16x8_s", SIMD, None;
                I32X4ExtmulLowI16X8U: 0xfd, 0xbe, "i32x4.extmul_low_i16x8_u", SIMD, None;
                I32X4ExtmulHighI16X8U: 0xfd, 0xbf, "i32x4.extmul_high_i16x8_u", SIMD, None;
                I64X2Abs: 0xfd, 0xc0, "i64x2.abs", SIMD, None;
                I64X2Neg: 0xfd, 0xc1, "i64x2.neg", SIMD, None;
                I64X2AllTrue: 0xfd, 0xc3, "i64x2.all_true", SIMD, None;
                I64X2Bitmask: 0xfd, 0xc4, "i64x2.bitmask", SIMD, None;
                I64X2ExtendLowI32X4S: 0xfd, 0xc7, "i64x2.extend_low_i32x4_s", SIMD, None;
                I64X2ExtendHighI32X4S: 0xfd, 0xc8, "i64x2.extend_high_i32x4_s", SIMD, None;
                I64X2ExtendLowI32X4U: 0xfd, 0xc9, "i64x2.extend_low_i32x4_u", SIMD, None;
                I64X2ExtendHighI32X4U: 0xfd, 0xca, "i64x2.extend_high_i32x4_u", SIMD, None;
                I64X2Shl: 0xfd, 0xcb, "i64x2.shl", SIMD, None;
                I64X2ShrS: 0xfd, 0xcc, "i64x2.shr_s", SIMD, None;
                I64X2ShrU: 0xfd, 0xcd, "i64x2.shr_u", SIMD, None;
                I64X2Add: 0xfd, 0xce, "i64x2.add", SIMD, None;
                I64X2Sub: 0xfd, 0xd1, "i64x2.sub", SIMD, None;
                I64X2Mul: 0xfd, 0xd5, "i64x2.mul", SIMD, None;
                I64X2Eq: 0xfd, 0xd6, "i64x2.eq", SIMD, None;
                I64X2Ne: 0xfd, 0xd7, "i64x2.ne", SIMD, None;
                I64X2LtS: 0xfd, 0xd8, "i64x2.lt_s", SIMD, None;
                I64X2GtS: 0xfd, 0xd9, "i64x2.gt_s", SIMD, None;
                I64X2LeS: 0xfd, 0xda, "i64x2.le_s", SIMD, None;
                I64X2GeS: 0xfd, 0xdb, "i64x2.ge_s", SIMD, None;
                I64X2ExtmulLowI32X4S: 0xfd, 0xdc, "i64x2.extmul_low_i32x4_s", SIMD, None;
                I64X2ExtmulHighI32X4S: 0xfd, 0xdd, "i64x2.extmul_high_i32x4_s", SIMD, None;
                I64X2ExtmulLowI32X4U: 0xfd, 0xde, "i64x2.extmul_low_i32x4_u", SIMD, None;
                I64X2ExtmulHighI32X4U: 0xfd, 0xdf, "i64x2.extmul_high_i32x4_u", SIMD, None;
                F32X4Abs: 0xfd, 0xe0, "f32x4.abs", SIMD, None;
                F32X4Neg: 0xfd, 0xe1, "f32x4.neg", SIMD, None;
                F32X4Sqrt: 0xfd, 0xe3, "f32x4.sqrt", SIMD, None;
                F32X4Add: 0xfd, 0xe4, "f32x4.add", SIMD, None;
                F32X4Sub: 0xfd, 0xe5, "f32x4.sub", SIMD, None;
                F32X4Mul: 0xfd, 0xe6, "f32x4.mul", SIMD, None;
                F32X4Div: 0xfd, 0xe7, "f32x4.div", SIMD, None;
                F32X4Min: 0xfd, 0xe8, "f32x4.min", SIMD, None;
                F32X4Max: 0xfd, 0xe9, "f32x4.max", SIMD, None;
                F32X4Pmin: 0xfd, 0xea, "f32x4.pmin", SIMD, None;
                F32X4Pmax: 0xfd, 0xeb, "f32x4.pmax", SIMD, None;
                F64X2Abs: 0xfd, 0xec, "f64x2.abs", SIMD, None;
                F64X2Neg: 0xfd, 0xed, "f64x2.neg", SIMD, None;
                F64X2Sqrt: 0xfd, 0xef, "f64x2.sqrt", SIMD, None;
                F64X2Add: 0xfd, 0xf0, "f64x2.add", SIMD, None;
                F64X2Sub: 0xfd, 0xf1, "f64x2.sub", SIMD, None;
                F64X2Mul: 0xfd, 0xf2, "f64x2.mul", SIMD, None;
                F64X2Div: 0xfd, 0xf3, "f64x2.div", SIMD, None;
                F64X2Min: 0xfd, 0xf4, "f64x2.min", SIMD, None;
                F64X2Max: 0xfd, 0xf5, "f64x2.max", SIMD, None;
                F64X2Pmin: 0xfd, 0xf6, "f64x2.pmin", SIMD, None;
                F64X2Pmax: 0xfd, 0xf7, "f64x2.pmax", SIMD, None;
                I32X4TruncSatF32X4S: 0xfd, 0xf8, "i32x4.trunc_sat_f32x4_s", SIMD, None;
                I32X4TruncSatF32X4U: 0xfd, 0xf9, "i32x4.trunc_sat_f32x4_u", SIMD, None;
                F32X4ConvertI32X4S: 0xfd, 0xfa, "f32x4.convert_i32x4_s", SIMD, None;
                F32X4ConvertI32X4U: 0xfd, 0xfb, "f32x4.convert_i32x4_u", SIMD, None;
                I32X4TruncSatF64X2SZero: 0xfd, 0xfc, "i32x4.trunc_sat_f64x2_s_zero", SIMD, None;
                I32X4TruncSatF64X2UZero: 0xfd, 0xfd, "i32x4.trunc_sat_f64x2_u_zero", SIMD, None;
                F64X2ConvertLowI32X4S: 0xfd, 0xfe, "f64x2.convert_low_i32x4_s", SIMD, None;
                F64X2ConvertLowI32X4U: 0xfd, 0xff, "f64x2.convert_low_i32x4_u", SIMD, None;
                MemoryAtomicNotify: 0xfe, 0x00, "memory.atomic.notify", THREADS, MemArg;
                MemoryAtomicWait32: 0xfe, 0x01, "memory.atomic.wait32", THREADS, MemArg;
                MemoryAtomicWait64: 0xfe, 0x02, "memory.atomic.wait64", THREADS, MemArg;
                AtomicFence: 0xfe, 0x03, "atomic.fence", THREADS, Index;
                I32AtomicLoad: 0xfe, 0x10, "i32.atomic.load", THREADS, MemArg;
                I64AtomicLoad: 0xfe, 0x11, "i64.atomic.load", THREADS, MemArg;
                I32AtomicLoad8U: 0xfe, 0x12, "i32.atomic.load8_u", THREADS, MemArg;
                I32AtomicLoad16U: 0xfe, 0x13, "i32.atomic.load16_u", THREADS, MemArg;
                I64AtomicLoad8U: 0xfe, 0x14, "i64.atomic.load8_u", THREADS, MemArg;
                I64AtomicLoad16U: 0xfe, 0x15, "i64.atomic.load16_u", THREADS, MemArg;
                I64AtomicLoad32U: 0xfe, 0x16, "i64.atomic.load32_u", THREADS, MemArg;
                I32AtomicStore: 0xfe, 0x17, "i32.atomic.store", THREADS, MemArg;
                I64AtomicStore: 0xfe, 0x18, "i64.atomic.store", THREADS, MemArg;
                I32AtomicStore8: 0xfe, 0x19, "i32.atomic.store8", THREADS, MemArg;
                I32AtomicStore16: 0xfe, 0x1a, "i32.atomic.store16", THREADS, MemArg;
                I64AtomicStore8: 0xfe, 0x1b, "i64.atomic.store8", THREADS, MemArg;
                I64AtomicStore16: 0xfe, 0x1c, "i64.atomic.store16", THREADS, MemArg;
                I64AtomicStore32: 0xfe, 0x1d, "i64.atomic.store32", THREADS, MemArg;
                I32AtomicRmwAdd: 0xfe, 0x1e, "i32.atomic.rmw.add", THREADS, MemArg;
                I64AtomicRmwAdd: 0xfe, 0x1f, "i64.atomic.rmw.add", THREADS, MemArg;
                I32AtomicRmw8AddU: 0xfe, 0x20, "i32.atomic.rmw8.add_u", THREADS, MemArg;
                I32AtomicRmw16AddU: 0xfe, 0x21, "i32.atomic.rmw16.add_u", THREADS, MemArg;
                I64AtomicRmw8AddU: 0xfe, 0x22, "i64.atomic.rmw8.add_u", THREADS, MemArg;
                I64AtomicRmw16AddU: 0xfe, 0x23, "i64.atomic.rmw16.add_u", THREADS, MemArg;
                I64AtomicRmw32AddU: 0xfe, 0x24, "i64.atomic.rmw32.add_u", THREADS, MemArg;
                I32AtomicRmwSub: 0xfe, 0x25, "i32.atomic.rmw.sub", THREADS, MemArg;
                I64AtomicRmwSub: 0xfe, 0x26, "i64.atomic.rmw.sub", THREADS, MemArg;
                I32AtomicRmw8SubU: 0xfe, 0x27, "i32.atomic.rmw8.sub_u", THREADS, MemArg;
                I32AtomicRmw16SubU: 0xfe, 0x28, "i32.atomic.rmw16.sub_u", THREADS, MemArg;
                I64AtomicRmw8SubU: 0xfe, 0x29, "i64.atomic.rmw8.sub_u", THREADS, MemArg;
                I64AtomicRmw16SubU: 0xfe, 0x2a, "i64.atomic.rmw16.sub_u", THREADS, MemArg;
                I64AtomicRmw32SubU: 0xfe, 0x2b, "i64.atomic.rmw32.sub_u", THREADS, MemArg;
                I32AtomicRmwAnd: 0xfe, 0x2c, "i32.atomic.rmw.and", THREADS, MemArg;
                I64AtomicRmwAnd: 0xfe, 0x2d, "i64.atomic.rmw.and", THREADS, MemArg;
                I32AtomicRmw8AndU: 0xfe, 0x2e, "i32.atomic.rmw8.and_u", THREADS, MemArg;
                I32AtomicRmw16AndU: 0xfe, 0x2f, "i32.atomic.rmw16.and_u", THREADS, MemArg;
                I64AtomicRmw8AndU: 0xfe, 0x30, "i64.atomic.rmw8.and_u", THREADS, MemArg;
                I64AtomicRmw16AndU: 0xfe, 0x31, "i64.atomic.rmw16.and_u", THREADS, MemArg;
                I64AtomicRmw32AndU: 0xfe, 0x32, "i64.atomic.rmw32.and_u", THREADS, MemArg;
                I32AtomicRmwOr: 0xfe, 0x33, "i32.atomic.rmw.or", THREADS, MemArg;
                I64AtomicRmwOr: 0xfe, 0x34, "i64.atomic.rmw.or", THREADS, MemArg;
                I32AtomicRmw8OrU: 0xfe, 0x35, "i32.atomic.rmw8.or_u", THREADS, MemArg;
                I32AtomicRmw16OrU: 0xfe, 0x36, "i32.atomic.rmw16.or_u", THREADS, MemArg;
                I64AtomicRmw8OrU: 0xfe, 0x37, "i64.atomic.rmw8.or_u", THREADS, MemArg;
                I64AtomicRmw16OrU: 0xfe, 0x38, "i64.atomic.rmw16.or_u", THREADS, MemArg;
                I64AtomicRmw32OrU: 0xfe, 0x39, "i64.atomic.rmw32.or_u", THREADS, MemArg;
                I32AtomicRmwXor: 0xfe, 0x3a, "i32.atomic.rmw.xor", THREADS, MemArg;
                I64AtomicRmwXor: 0xfe, 0x3b, "i64.atomic.rmw.xor", THREADS, MemArg;
                I32AtomicRmw8XorU: 0xfe, 0x3c, "i32.atomic.rmw8.xor_u", THREADS, MemArg;
                I32AtomicRmw16XorU: 0xfe, 0x3d, "i32.atomic.rmw16.xor_u", THREADS, MemArg;
                I64AtomicRmw8XorU: 0xfe, 0x3e, "i64.atomic.rmw8.xor_u", THREADS, MemArg;
                I64AtomicRmw16XorU: 0xfe, 0x3f, "i64.atomic.rmw16.xor_u", THREADS, MemArg;
                I64AtomicRmw32XorU: 0xfe, 0x40, "i64.atomic.rmw32.xor_u", THREADS, MemArg;
                I32AtomicRmwXchg: 0xfe, 0x41, "i32.atomic.rmw.xchg", THREADS, MemArg;
                I64AtomicRmwXchg: 0xfe, 0x42, "i64.atomic.rmw.xchg", THREADS, MemArg;
                I32AtomicRmw8XchgU: 0xfe, 0x43, "i32.atomic.rmw8.xchg_u", THREADS, MemArg;
                I32AtomicRmw16XchgU: 0xfe, 0x44, "i32.atomic.rmw16.xchg_u", THREADS, MemArg;
                I64AtomicRmw8XchgU: 0xfe, 0x45, "i64.atomic.rmw8.xchg_u", THREADS, MemArg;
                I64AtomicRmw16XchgU: 0xfe, 0x46, "i64.atomic.rmw16.xchg_u", THREADS, MemArg;
                I64AtomicRmw32XchgU: 0xfe, 0x47, "i64.atomic.rmw32.xchg_u", THREADS, MemArg;
                I32AtomicRmwCmpxchg: 0xfe, 0x48, "i32.atomic.rmw.cmpxchg", THREADS, MemArg;
                I64AtomicRmwCmpxchg: 0xfe, 0x49, "i64.atomic.rmw.cmpxchg", THREADS, MemArg;
                I32AtomicRmw8CmpxchgU: 0xfe, 0x4a, "i32.atomic.rmw8.cmpxchg_u", THREADS, MemArg;
                I32AtomicRmw16CmpxchgU: 0xfe, 0x4b, "i32.atomic.rmw16.cmpxchg_u", THREADS, MemArg;
                I64AtomicRmw8CmpxchgU: 0xfe, 0x4c, "i64.atomic.rmw8.cmpxchg_u", THREADS, MemArg;
                I64AtomicRmw16CmpxchgU: 0xfe, 0x4d, "i64.atomic.rmw16.cmpxchg_u", THREADS, MemArg;
                I64AtomicRmw32CmpxchgU: 0xfe, 0x4e, "i64.atomic.rmw32.cmpxchg_u", THREADS, MemArg;
            }
        }
    };
}

macro_rules! define_opcodes {
    (
        plain { $($pname:ident: $pcode:literal, $ptext:literal, $pfeat:ident, $pimm:ident;)* }
        prefixed { $($qname:ident: $qprefix:literal, $qcode:literal, $qtext:literal, $qfeat:ident, $qimm:ident;)* }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum Opcode {
            $($pname,)*
            $($qname,)*
        }

        impl Opcode {
            /// Wire encoding: `(prefix, code)`. Plain opcodes fit in the
            /// code byte and carry no prefix.
            pub fn encode(self) -> (Option<u8>, u32) {
                match self {
                    $(Self::$pname => (None, $pcode),)*
                    $(Self::$qname => (Some($qprefix), $qcode),)*
                }
            }

            pub fn features(self) -> Features {
                match self {
                    $(Self::$pname => feat!($pfeat),)*
                    $(Self::$qname => feat!($qfeat),)*
                }
            }

            pub fn text(self) -> &'static str {
                match self {
                    $(Self::$pname => $ptext,)*
                    $(Self::$qname => $qtext,)*
                }
            }

            pub fn immediate_kind(self) -> ImmediateKind {
                match self {
                    $(Self::$pname => ImmediateKind::$pimm,)*
                    $(Self::$qname => ImmediateKind::$qimm,)*
                }
            }

            /// Decode a plain (non-prefixed) opcode byte.
            pub fn decode(code: u8, features: Features) -> Option<Self> {
                #[allow(unreachable_patterns)]
                match u32::from(code) {
                    $($pcode if features.contains(feat!($pfeat)) => Some(Self::$pname),)*
                    _ => Option::None,
                }
            }

            /// Decode a prefixed opcode (`prefix` one of 0xfb/0xfc/0xfd/0xfe).
            pub fn decode_prefixed(prefix: u8, code: u32, features: Features) -> Option<Self> {
                #[allow(unreachable_patterns)]
                match (prefix, code) {
                    $(($qprefix, $qcode) if features.contains(feat!($qfeat)) => {
                        Some(Self::$qname)
                    })*
                    _ => Option::None,
                }
            }

            /// Primary spelling lookup; legacy synonyms are handled by
            /// [`Opcode::from_text`].
            fn from_primary_text(text: &str) -> Option<Self> {
                #[allow(unreachable_patterns)]
                match text {
                    $($ptext => Some(Self::$pname),)*
                    $($qtext => Some(Self::$qname),)*
                    _ => Option::None,
                }
            }
        }
    };
}

with_opcodes!(define_opcodes);

/// Deprecated spellings still accepted on read. The encoder and printer
/// only ever produce the primary spelling.
pub const LEGACY_SPELLINGS: &[(&str, Opcode)] = &[
    ("get_local", Opcode::LocalGet),
    ("set_local", Opcode::LocalSet),
    ("tee_local", Opcode::LocalTee),
    ("get_global", Opcode::GlobalGet),
    ("set_global", Opcode::GlobalSet),
    ("current_memory", Opcode::MemorySize),
    ("grow_memory", Opcode::MemoryGrow),
    ("i32.wrap/i64", Opcode::I32WrapI64),
    ("i32.trunc_s/f32", Opcode::I32TruncF32S),
    ("i32.trunc_u/f32", Opcode::I32TruncF32U),
    ("i32.trunc_s/f64", Opcode::I32TruncF64S),
    ("i32.trunc_u/f64", Opcode::I32TruncF64U),
    ("i64.extend_s/i32", Opcode::I64ExtendI32S),
    ("i64.extend_u/i32", Opcode::I64ExtendI32U),
    ("i64.trunc_s/f32", Opcode::I64TruncF32S),
    ("i64.trunc_u/f32", Opcode::I64TruncF32U),
    ("i64.trunc_s/f64", Opcode::I64TruncF64S),
    ("i64.trunc_u/f64", Opcode::I64TruncF64U),
    ("f32.convert_s/i32", Opcode::F32ConvertI32S),
    ("f32.convert_u/i32", Opcode::F32ConvertI32U),
    ("f32.convert_s/i64", Opcode::F32ConvertI64S),
    ("f32.convert_u/i64", Opcode::F32ConvertI64U),
    ("f32.demote/f64", Opcode::F32DemoteF64),
    ("f64.convert_s/i32", Opcode::F64ConvertI32S),
    ("f64.convert_u/i32", Opcode::F64ConvertI32U),
    ("f64.convert_s/i64", Opcode::F64ConvertI64S),
    ("f64.convert_u/i64", Opcode::F64ConvertI64U),
    ("f64.promote/f32", Opcode::F64PromoteF32),
    ("i32.reinterpret/f32", Opcode::I32ReinterpretF32),
    ("i64.reinterpret/f64", Opcode::I64ReinterpretF64),
    ("f32.reinterpret/i32", Opcode::F32ReinterpretI32),
    ("f64.reinterpret/i64", Opcode::F64ReinterpretI64),
];

impl Opcode {
    pub fn from_text(text: &str) -> Option<Self> {
        Self::from_primary_text(text).or_else(|| {
            LEGACY_SPELLINGS
                .iter()
                .find(|(spelling, _)| *spelling == text)
                .map(|&(_, op)| op)
        })
    }

    pub fn is_legacy_spelling(text: &str) -> bool {
        LEGACY_SPELLINGS.iter().any(|(spelling, _)| *spelling == text)
    }

    /// Whether `code` introduces a multi-byte opcode under the active
    /// feature set.
    pub fn is_prefix_byte(code: u8, features: Features) -> bool {
        match code {
            0xfb => features.contains(Features::GC),
            0xfc => {
                features.intersects(
                    Features::SATURATING_FLOAT_TO_INT
                        | Features::BULK_MEMORY
                        | Features::REFERENCE_TYPES,
                )
            }
            0xfd => features.contains(Features::SIMD),
            0xfe => features.contains(Features::THREADS),
            _ => false,
        }
    }

    /// log2 of the natural alignment of a memory-access opcode, keyed by
    /// the width of its widest accessed operand.
    pub fn natural_align_log2(self) -> Option<u32> {
        use Opcode::*;
        Some(match self {
            I32Load8S | I32Load8U | I64Load8S | I64Load8U | I32Store8 | I64Store8
            | V128Load8Splat | I32AtomicLoad8U | I64AtomicLoad8U | I32AtomicStore8
            | I64AtomicStore8 | I32AtomicRmw8AddU | I64AtomicRmw8AddU | I32AtomicRmw8SubU
            | I64AtomicRmw8SubU | I32AtomicRmw8AndU | I64AtomicRmw8AndU | I32AtomicRmw8OrU
            | I64AtomicRmw8OrU | I32AtomicRmw8XorU | I64AtomicRmw8XorU | I32AtomicRmw8XchgU
            | I64AtomicRmw8XchgU | I32AtomicRmw8CmpxchgU | I64AtomicRmw8CmpxchgU => 0,

            I32Load16S | I32Load16U | I64Load16S | I64Load16U | I32Store16 | I64Store16
            | V128Load16Splat | I32AtomicLoad16U | I64AtomicLoad16U | I32AtomicStore16
            | I64AtomicStore16 | I32AtomicRmw16AddU | I64AtomicRmw16AddU
            | I32AtomicRmw16SubU | I64AtomicRmw16SubU | I32AtomicRmw16AndU
            | I64AtomicRmw16AndU | I32AtomicRmw16OrU | I64AtomicRmw16OrU
            | I32AtomicRmw16XorU | I64AtomicRmw16XorU | I32AtomicRmw16XchgU
            | I64AtomicRmw16XchgU | I32AtomicRmw16CmpxchgU | I64AtomicRmw16CmpxchgU => 1,

            I32Load | F32Load | I64Load32S | I64Load32U | I32Store | F32Store | I64Store32
            | V128Load32Splat | V128Load32Zero | MemoryAtomicNotify | MemoryAtomicWait32
            | I32AtomicLoad | I64AtomicLoad32U | I32AtomicStore | I64AtomicStore32
            | I32AtomicRmwAdd | I64AtomicRmw32AddU | I32AtomicRmwSub | I64AtomicRmw32SubU
            | I32AtomicRmwAnd | I64AtomicRmw32AndU | I32AtomicRmwOr | I64AtomicRmw32OrU
            | I32AtomicRmwXor | I64AtomicRmw32XorU | I32AtomicRmwXchg | I64AtomicRmw32XchgU
            | I32AtomicRmwCmpxchg | I64AtomicRmw32CmpxchgU => 2,

            I64Load | F64Load | I64Store | F64Store | V128Load64Splat | V128Load64Zero
            | V128Load8X8S | V128Load8X8U | V128Load16X4S | V128Load16X4U | V128Load32X2S
            | V128Load32X2U | MemoryAtomicWait64 | I64AtomicLoad | I64AtomicStore
            | I64AtomicRmwAdd | I64AtomicRmwSub | I64AtomicRmwAnd | I64AtomicRmwOr
            | I64AtomicRmwXor | I64AtomicRmwXchg | I64AtomicRmwCmpxchg => 3,

            V128Load | V128Store => 4,

            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_encode_decode() {
        assert_eq!(Opcode::I32Add.encode(), (None, 0x6a));
        assert_eq!(Opcode::decode(0x6a, Features::none()), Some(Opcode::I32Add));
        assert_eq!(Opcode::decode(0x6a, Features::all()), Some(Opcode::I32Add));
    }

    #[test]
    fn prefixed_encode_decode() {
        assert_eq!(Opcode::MemoryCopy.encode(), (Some(0xfc), 0x0a));
        assert_eq!(
            Opcode::decode_prefixed(0xfc, 0x0a, Features::none().with(Features::BULK_MEMORY)),
            Some(Opcode::MemoryCopy)
        );
        assert_eq!(Opcode::decode_prefixed(0xfc, 0x0a, Features::none()), None);
    }

    #[test]
    fn feature_gating() {
        assert_eq!(Opcode::decode(0xc0, Features::none()), None);
        assert_eq!(
            Opcode::decode(0xc0, Features::none().with(Features::SIGN_EXTENSION)),
            Some(Opcode::I32Extend8S)
        );
        assert_eq!(Opcode::decode(0xd0, Features::none()), None);
        assert_eq!(
            Opcode::decode(0xd0, Features::none().with(Features::REFERENCE_TYPES)),
            Some(Opcode::RefNull)
        );
    }

    #[test]
    fn spelling_round_trip() {
        assert_eq!(Opcode::from_text("i32.add"), Some(Opcode::I32Add));
        assert_eq!(Opcode::I32Add.text(), "i32.add");
        assert_eq!(Opcode::from_text("no.such.op"), None);
    }

    #[test]
    fn legacy_spellings_resolve() {
        assert_eq!(Opcode::from_text("get_local"), Some(Opcode::LocalGet));
        assert_eq!(Opcode::from_text("current_memory"), Some(Opcode::MemorySize));
        assert_eq!(Opcode::from_text("i32.trunc_s/f32"), Some(Opcode::I32TruncF32S));
        assert!(Opcode::is_legacy_spelling("grow_memory"));
        assert!(!Opcode::is_legacy_spelling("memory.grow"));
    }

    #[test]
    fn select_spellings_share_text() {
        // Typed select is only reachable through the reader, never through
        // the keyword table.
        assert_eq!(Opcode::from_text("select"), Some(Opcode::Select));
        assert_eq!(Opcode::SelectT.text(), "select");
    }

    #[test]
    fn natural_alignment_classes() {
        assert_eq!(Opcode::I32Load8U.natural_align_log2(), Some(0));
        assert_eq!(Opcode::I32Load16S.natural_align_log2(), Some(1));
        assert_eq!(Opcode::I32Load.natural_align_log2(), Some(2));
        assert_eq!(Opcode::I64Load.natural_align_log2(), Some(3));
        assert_eq!(Opcode::V128Load.natural_align_log2(), Some(4));
        assert_eq!(Opcode::I32Add.natural_align_log2(), None);
    }

    #[test]
    fn prefix_bytes_follow_features() {
        assert!(!Opcode::is_prefix_byte(0xfd, Features::none()));
        assert!(Opcode::is_prefix_byte(0xfd, Features::none().with(Features::SIMD)));
        assert!(Opcode::is_prefix_byte(
            0xfc,
            Features::none().with(Features::BULK_MEMORY)
        ));
        assert!(!Opcode::is_prefix_byte(0x6a, Features::all()));
    }
}
