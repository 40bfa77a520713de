//! Recursive descent reader over the token stream, two tokens of
//! lookahead. Produces the text AST; symbolic variables stay unresolved
//! and the name maps in [`ReadCtx`] record every binding for the
//! converter.

use log::warn;

use crate::error::ErrorKind;
use crate::features::Features;
use crate::opcode::{ImmediateKind, Opcode};
use crate::span::{At, OptAt};
use crate::types::{
    EventAttribute, ExternalKind, HeapKind, Limits, Mutability, Null, NumericType, SegmentType,
    Shared,
};
use crate::v128::V128;

use super::context::ReadCtx;
use super::lexer::Tokenizer;
use super::numeric;
use super::tokens::{SimdShape, Token, TokenType};
use super::types::*;

fn expect<'a>(t: &mut Tokenizer<'a>, ctx: &mut ReadCtx, ty: TokenType) -> Option<Token<'a>> {
    let token = t.peek(0, &mut ctx.errors);
    if token.ty == ty {
        Some(t.read(&mut ctx.errors))
    } else {
        ctx.errors.report(
            Some(token.loc),
            ErrorKind::UnexpectedToken,
            format!("expected {ty:?}, got {:?}", token.span),
        );
        None
    }
}

fn expect_lpar(t: &mut Tokenizer, ctx: &mut ReadCtx, ty: TokenType) -> Option<()> {
    expect(t, ctx, TokenType::Lpar)?;
    expect(t, ctx, ty)?;
    Some(())
}

fn expect_rpar(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<Token<'static>> {
    expect(t, ctx, TokenType::Rpar).map(|tok| Token::new(tok.loc, "", TokenType::Rpar))
}

/// Skips tokens until the unbalanced `)` that closes the current form,
/// so one bad item doesn't cascade.
fn sync_to_rpar(t: &mut Tokenizer, ctx: &mut ReadCtx) {
    let mut depth = 0usize;
    loop {
        let token = t.peek(0, &mut ctx.errors);
        match token.ty {
            TokenType::Eof => return,
            TokenType::Lpar => depth += 1,
            TokenType::Rpar => {
                let _ = t.read(&mut ctx.errors);
                if depth == 0 {
                    return;
                }
                depth -= 1;
                continue;
            }
            _ => {}
        }
        let _ = t.read(&mut ctx.errors);
    }
}

// --- Numbers, vars, text ---

pub fn read_nat32(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<u32>> {
    let token = expect(t, ctx, TokenType::Nat)?;
    let info = token.literal_info()?;
    match numeric::str_to_nat::<u32>(info, token.span) {
        Some(value) => Some(At::new(token.loc, value)),
        None => {
            ctx.errors.report(
                Some(token.loc),
                ErrorKind::LiteralOutOfRange,
                format!("invalid natural number: {}", token.span),
            );
            None
        }
    }
}

fn read_int_token<'a>(t: &mut Tokenizer<'a>, ctx: &mut ReadCtx) -> Option<Token<'a>> {
    let token = t.peek(0, &mut ctx.errors);
    if matches!(token.ty, TokenType::Nat | TokenType::Int) {
        Some(t.read(&mut ctx.errors))
    } else {
        ctx.errors.report(
            Some(token.loc),
            ErrorKind::UnexpectedToken,
            format!("expected an integer, got {:?}", token.span),
        );
        None
    }
}

pub fn read_s32(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<i32>> {
    let token = read_int_token(t, ctx)?;
    match numeric::str_to_s32(token.literal_info()?, token.span) {
        Some(value) => Some(At::new(token.loc, value)),
        None => {
            ctx.errors.report(
                Some(token.loc),
                ErrorKind::LiteralOutOfRange,
                format!("invalid integer: {}", token.span),
            );
            None
        }
    }
}

pub fn read_s64(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<i64>> {
    let token = read_int_token(t, ctx)?;
    match numeric::str_to_s64(token.literal_info()?, token.span) {
        Some(value) => Some(At::new(token.loc, value)),
        None => {
            ctx.errors.report(
                Some(token.loc),
                ErrorKind::LiteralOutOfRange,
                format!("invalid integer: {}", token.span),
            );
            None
        }
    }
}

fn read_float_token<'a>(t: &mut Tokenizer<'a>, ctx: &mut ReadCtx) -> Option<Token<'a>> {
    let token = t.peek(0, &mut ctx.errors);
    if matches!(token.ty, TokenType::Nat | TokenType::Int | TokenType::Float) {
        Some(t.read(&mut ctx.errors))
    } else {
        ctx.errors.report(
            Some(token.loc),
            ErrorKind::UnexpectedToken,
            format!("expected a float, got {:?}", token.span),
        );
        None
    }
}

fn report_bad_float(ctx: &mut ReadCtx, token: &Token) {
    let kind = match token.literal_info().map(|info| info.kind) {
        Some(super::tokens::LiteralKind::NanPayload) => ErrorKind::InvalidNanPayload,
        _ => ErrorKind::LiteralOutOfRange,
    };
    ctx.errors.report(
        Some(token.loc),
        kind,
        format!("invalid float: {}", token.span),
    );
}

pub fn read_f32(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<f32>> {
    let token = read_float_token(t, ctx)?;
    match numeric::str_to_f32(token.literal_info()?, token.span) {
        Some(value) => Some(At::new(token.loc, value)),
        None => {
            report_bad_float(ctx, &token);
            None
        }
    }
}

pub fn read_f64(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<f64>> {
    let token = read_float_token(t, ctx)?;
    match numeric::str_to_f64(token.literal_info()?, token.span) {
        Some(value) => Some(At::new(token.loc, value)),
        None => {
            report_bad_float(ctx, &token);
            None
        }
    }
}

pub fn read_var_opt(t: &mut Tokenizer, ctx: &mut ReadCtx) -> OptAt<Var> {
    let token = t.peek(0, &mut ctx.errors);
    match token.ty {
        TokenType::Id => {
            let token = t.read(&mut ctx.errors);
            Some(At::new(token.loc, Var::Name(token.span.to_owned())))
        }
        TokenType::Nat => {
            let nat = read_nat32(t, ctx)?;
            Some(nat.map(Var::Index))
        }
        _ => None,
    }
}

pub fn read_var(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Var>> {
    match read_var_opt(t, ctx) {
        Some(var) => Some(var),
        None => {
            let token = t.peek(0, &mut ctx.errors);
            ctx.errors.report(
                Some(token.loc),
                ErrorKind::UnexpectedToken,
                format!("expected a variable, got {:?}", token.span),
            );
            None
        }
    }
}

pub fn read_var_list(t: &mut Tokenizer, ctx: &mut ReadCtx) -> VarList {
    let mut list = VarList::new();
    while let Some(var) = read_var_opt(t, ctx) {
        list.push(var);
    }
    list
}

pub fn read_bind_var_opt(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<BindVar>> {
    let token = t.peek(0, &mut ctx.errors);
    if token.ty == TokenType::Id {
        let token = t.read(&mut ctx.errors);
        Some(At::new(token.loc, token.span.to_owned()))
    } else {
        None
    }
}

pub fn read_text(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Text>> {
    let token = expect(t, ctx, TokenType::Text)?;
    Some(At::new(token.loc, Text::new(token.decode_text())))
}

pub fn read_utf8_text(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Text>> {
    let text = read_text(t, ctx)?;
    if text.value.as_str().is_none() {
        ctx.errors
            .report_kind(text.loc, ErrorKind::InvalidUtf8);
        return None;
    }
    Some(text)
}

pub fn read_text_list(t: &mut Tokenizer, ctx: &mut ReadCtx) -> TextList {
    let mut list = TextList::new();
    while t.peek(0, &mut ctx.errors).ty == TokenType::Text {
        if let Some(text) = read_text(t, ctx) {
            list.push(text);
        }
    }
    list
}

// --- Types ---

pub fn read_value_type(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<ValueType>> {
    let token = t.peek(0, &mut ctx.errors);
    match token.ty {
        TokenType::NumericType => {
            let token = t.read(&mut ctx.errors);
            let numeric = token.numeric_type()?;
            if numeric == NumericType::V128 && !ctx.features.contains(Features::SIMD) {
                ctx.errors.report(
                    Some(token.loc),
                    ErrorKind::FeatureDisabled,
                    "v128 requires the simd feature",
                );
            }
            Some(At::new(token.loc, ValueType::Numeric(numeric)))
        }
        _ => {
            let reference = read_reference_type(t, ctx)?;
            Some(reference.map(ValueType::Reference))
        }
    }
}

pub fn read_reference_type(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<ReferenceType>> {
    let token = t.peek(0, &mut ctx.errors);
    match token.ty {
        TokenType::ReferenceKind => {
            let token = t.read(&mut ctx.errors);
            let kind = token.reference_kind()?;
            if token.span == "anyfunc" {
                warn!("anyfunc is a deprecated spelling of funcref");
            }
            let required = match kind {
                crate::types::ReferenceKind::Funcref => Features::empty(),
                crate::types::ReferenceKind::Externref => Features::REFERENCE_TYPES,
                crate::types::ReferenceKind::Exnref => Features::EXCEPTIONS,
            };
            if !ctx.features.contains(required) {
                ctx.errors.report(
                    Some(token.loc),
                    ErrorKind::FeatureDisabled,
                    format!("{} requires feature {required:?}", token.span),
                );
            }
            Some(At::new(token.loc, ReferenceType::Kind(kind)))
        }
        TokenType::Lpar if t.peek(1, &mut ctx.errors).ty == TokenType::Ref => {
            let start = token.loc;
            expect_lpar(t, ctx, TokenType::Ref)?;
            let null = if t.match_type(TokenType::Null, &mut ctx.errors).is_some() {
                Null::Yes
            } else {
                Null::No
            };
            let heap_type = read_heap_type(t, ctx)?;
            let end = expect_rpar(t, ctx)?;
            Some(At::new(
                start.merge(end.loc),
                ReferenceType::Ref(RefType { heap_type, null }),
            ))
        }
        _ => {
            ctx.errors.report(
                Some(token.loc),
                ErrorKind::UnexpectedToken,
                format!("expected a reference type, got {:?}", token.span),
            );
            None
        }
    }
}

pub fn read_heap_type(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<HeapType>> {
    let token = t.peek(0, &mut ctx.errors);
    match token.ty {
        TokenType::Func => {
            let token = t.read(&mut ctx.errors);
            Some(At::new(token.loc, HeapType::Kind(HeapKind::Func)))
        }
        TokenType::HeapKind => {
            let token = t.read(&mut ctx.errors);
            Some(At::new(token.loc, HeapType::Kind(token.heap_kind()?)))
        }
        _ => {
            let var = read_var(t, ctx)?;
            let loc = var.loc;
            Some(At::new(loc.unwrap(), HeapType::Var(var)))
        }
    }
}

fn read_unbound_value_type_list(
    t: &mut Tokenizer,
    ctx: &mut ReadCtx,
    list_type: TokenType,
) -> ValueTypeList {
    let mut list = ValueTypeList::new();
    while t.match_lpar(list_type, &mut ctx.errors).is_some() {
        while t.peek(0, &mut ctx.errors).ty != TokenType::Rpar {
            match read_value_type(t, ctx) {
                Some(ty) => list.push(ty),
                None => break,
            }
        }
        if expect(t, ctx, TokenType::Rpar).is_none() {
            break;
        }
    }
    list
}

pub fn read_param_list(t: &mut Tokenizer, ctx: &mut ReadCtx) -> ValueTypeList {
    read_unbound_value_type_list(t, ctx, TokenType::Param)
}

pub fn read_result_list(t: &mut Tokenizer, ctx: &mut ReadCtx) -> ValueTypeList {
    read_unbound_value_type_list(t, ctx, TokenType::Result)
}

/// `(param $x i32)` binds a name; `(param i32 i64)` declares a list.
/// `name_map` receives one entry per declared value either way.
fn read_bound_value_type_list(
    t: &mut Tokenizer,
    ctx: &mut ReadCtx,
    list_type: TokenType,
    bind_into_locals: bool,
) -> BoundValueTypeList {
    let mut list = BoundValueTypeList::new();
    while t.match_lpar(list_type, &mut ctx.errors).is_some() {
        let bind = read_bind_var_opt(t, ctx);
        if let Some(name) = bind {
            if bind_into_locals && !ctx.local_names.new_bound(name.value.clone()) {
                ctx.errors.report(
                    name.loc,
                    ErrorKind::DuplicateIdentifier,
                    format!("duplicate identifier {}", name.value),
                );
            }
            if let Some(value_type) = read_value_type(t, ctx) {
                list.push(At::synthetic(BoundValueType {
                    name: Some(name),
                    value_type,
                }));
            }
        } else {
            while t.peek(0, &mut ctx.errors).ty != TokenType::Rpar {
                match read_value_type(t, ctx) {
                    Some(value_type) => {
                        if bind_into_locals {
                            ctx.local_names.new_unbound();
                        }
                        list.push(At::synthetic(BoundValueType {
                            name: None,
                            value_type,
                        }));
                    }
                    None => break,
                }
            }
        }
        if expect(t, ctx, TokenType::Rpar).is_none() {
            break;
        }
    }
    list
}

pub fn read_bound_function_type(
    t: &mut Tokenizer,
    ctx: &mut ReadCtx,
    bind_params: bool,
) -> At<BoundFunctionType> {
    let params = read_bound_value_type_list(t, ctx, TokenType::Param, bind_params);
    let results = read_result_list(t, ctx);
    At::synthetic(BoundFunctionType { params, results })
}

pub fn read_function_type(t: &mut Tokenizer, ctx: &mut ReadCtx) -> At<FunctionType> {
    let params = read_param_list(t, ctx);
    let results = read_result_list(t, ctx);
    At::synthetic(FunctionType { params, results })
}

pub fn read_type_use_opt(t: &mut Tokenizer, ctx: &mut ReadCtx) -> OptAt<Var> {
    if t.peek(0, &mut ctx.errors).ty == TokenType::Lpar
        && t.peek(1, &mut ctx.errors).ty == TokenType::Type
    {
        expect_lpar(t, ctx, TokenType::Type)?;
        let var = read_var(t, ctx)?;
        expect(t, ctx, TokenType::Rpar)?;
        Some(var)
    } else {
        None
    }
}

/// `(type $T)?` with optional inline `(param ..) (result ..)`. When both
/// forms appear they must agree with the referenced definition.
pub fn read_function_type_use(t: &mut Tokenizer, ctx: &mut ReadCtx) -> FunctionTypeUse {
    let type_use = read_type_use_opt(t, ctx);
    let ty = read_function_type(t, ctx);
    let use_ = FunctionTypeUse {
        type_use: type_use.clone(),
        ty,
    };
    if let Some(var) = &type_use {
        if !use_.ty.value.params.is_empty() || !use_.ty.value.results.is_empty() {
            let index = match &var.value {
                Var::Index(index) => Some(*index),
                Var::Name(name) => ctx.type_names.get(name),
            };
            if let Some(defined) = index.and_then(|i| ctx.function_type_map.get(i)) {
                if *defined != use_.ty.value {
                    ctx.errors.report(
                        var.loc,
                        ErrorKind::InvalidType,
                        "inline parameters and results must match the referenced type",
                    );
                }
            }
        }
    }
    use_
}

fn record_type_use(ctx: &mut ReadCtx, use_: &FunctionTypeUse) {
    let bound = BoundFunctionType {
        params: use_
            .ty
            .value
            .params
            .iter()
            .map(|p| {
                At::synthetic(BoundValueType {
                    name: None,
                    value_type: p.clone(),
                })
            })
            .collect(),
        results: use_.ty.value.results.clone(),
    };
    ctx.function_type_map.use_type(&use_.type_use, &bound);
}

pub fn read_type_entry(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<TypeEntry>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Type)?;
    let bind_var = read_bind_var_opt(t, ctx);
    if let Some(name) = &bind_var {
        if !ctx.type_names.new_bound(name.value.clone()) {
            ctx.errors.report(
                name.loc,
                ErrorKind::DuplicateIdentifier,
                format!("duplicate identifier {}", name.value),
            );
        }
    } else {
        ctx.type_names.new_unbound();
    }
    expect_lpar(t, ctx, TokenType::Func)?;
    let ty = read_bound_function_type(t, ctx, false);
    expect(t, ctx, TokenType::Rpar)?;
    let end = expect_rpar(t, ctx)?;
    ctx.function_type_map.define(&ty.value);
    Some(At::new(
        start.merge(end.loc),
        TypeEntry { bind_var, ty },
    ))
}

// --- Limits, entity types ---

pub fn read_limits(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Limits>> {
    let min = read_nat32(t, ctx)?;
    let start = min.loc.unwrap();
    let max = if t.peek(0, &mut ctx.errors).ty == TokenType::Nat {
        Some(read_nat32(t, ctx)?)
    } else {
        None
    };
    let shared = if t.peek(0, &mut ctx.errors).ty == TokenType::Shared {
        let token = t.read(&mut ctx.errors);
        if !ctx.features.contains(Features::THREADS) {
            ctx.errors.report(
                Some(token.loc),
                ErrorKind::FeatureDisabled,
                "shared limits require the threads feature",
            );
        }
        At::new(token.loc, Shared::Yes)
    } else {
        At::synthetic(Shared::No)
    };
    Some(At::new(start, Limits { min, max, shared }))
}

pub fn read_table_type(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<TableType>> {
    let limits = read_limits(t, ctx)?;
    let elemtype = read_reference_type(t, ctx)?;
    Some(At::synthetic(TableType { limits, elemtype }))
}

pub fn read_memory_type(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<MemoryType>> {
    let limits = read_limits(t, ctx)?;
    Some(At::synthetic(MemoryType { limits }))
}

pub fn read_global_type(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<GlobalType>> {
    if t.peek(0, &mut ctx.errors).ty == TokenType::Lpar
        && t.peek(1, &mut ctx.errors).ty == TokenType::Mut
    {
        expect_lpar(t, ctx, TokenType::Mut)?;
        let valtype = read_value_type(t, ctx)?;
        expect(t, ctx, TokenType::Rpar)?;
        return Some(At::synthetic(GlobalType {
            valtype,
            mutability: At::synthetic(Mutability::Var),
        }));
    }
    let valtype = read_value_type(t, ctx)?;
    Some(At::synthetic(GlobalType {
        valtype,
        mutability: At::synthetic(Mutability::Const),
    }))
}

pub fn read_event_type(t: &mut Tokenizer, ctx: &mut ReadCtx) -> At<EventType> {
    let ty = read_function_type_use(t, ctx);
    record_type_use(ctx, &ty);
    At::synthetic(EventType {
        attribute: Some(At::synthetic(EventAttribute::Exception)),
        ty,
    })
}

// --- Inline import/export ---

pub fn read_inline_import_opt(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<InlineImport>> {
    if t.peek(0, &mut ctx.errors).ty != TokenType::Lpar
        || t.peek(1, &mut ctx.errors).ty != TokenType::Import
    {
        return None;
    }
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Import)?;
    if ctx.seen_non_import {
        ctx.errors.report(
            Some(start),
            ErrorKind::ImportAfterNonImport,
            "Imports must occur before all non-import definitions",
        );
    }
    let module = read_utf8_text(t, ctx)?;
    let name = read_utf8_text(t, ctx)?;
    let end = expect_rpar(t, ctx)?;
    Some(At::new(
        start.merge(end.loc),
        InlineImport { module, name },
    ))
}

pub fn read_inline_export_list(t: &mut Tokenizer, ctx: &mut ReadCtx) -> InlineExportList {
    let mut list = InlineExportList::new();
    while t.peek(0, &mut ctx.errors).ty == TokenType::Lpar
        && t.peek(1, &mut ctx.errors).ty == TokenType::Export
    {
        let start = t.peek(0, &mut ctx.errors).loc;
        if expect_lpar(t, ctx, TokenType::Export).is_none() {
            break;
        }
        let Some(name) = read_utf8_text(t, ctx) else {
            break;
        };
        let Some(end) = expect_rpar(t, ctx) else { break };
        list.push(At::new(start.merge(end.loc), InlineExport { name }));
    }
    list
}

// --- Instructions ---

fn check_opcode_enabled(token: &Token, ctx: &mut ReadCtx) {
    let Some(info) = token.opcode_info() else {
        return;
    };
    if !ctx.features.contains(info.features) {
        // Reported, then parsed anyway: best-effort recovery keeps the
        // rest of the module readable.
        ctx.errors.report(
            Some(token.loc),
            ErrorKind::FeatureDisabled,
            format!(
                "instruction {} requires feature {:?}",
                token.span, info.features
            ),
        );
    }
    if Opcode::is_legacy_spelling(token.span) {
        warn!(
            "{} is a deprecated spelling of {}",
            token.span,
            info.opcode.text()
        );
    }
}

fn read_align_opt(t: &mut Tokenizer, ctx: &mut ReadCtx) -> OptAt<u32> {
    let token = t.match_type(TokenType::AlignEqNat, &mut ctx.errors)?;
    let span = &token.span[token.span.find('=').unwrap() + 1..];
    let value = numeric::str_to_nat::<u32>(token.literal_info()?, span)?;
    if !value.is_power_of_two() {
        ctx.errors.report(
            Some(token.loc),
            ErrorKind::InvalidAlignment,
            format!("alignment must be a power of two, got {value}"),
        );
    }
    Some(At::new(token.loc, value))
}

fn read_offset_opt(t: &mut Tokenizer, ctx: &mut ReadCtx) -> OptAt<u32> {
    let token = t.match_type(TokenType::OffsetEqNat, &mut ctx.errors)?;
    let span = &token.span[token.span.find('=').unwrap() + 1..];
    let value = numeric::str_to_nat::<u32>(token.literal_info()?, span)?;
    Some(At::new(token.loc, value))
}

fn read_simd_lane(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<u8>> {
    let token = expect(t, ctx, TokenType::Nat)?;
    match numeric::str_to_nat::<u8>(token.literal_info()?, token.span) {
        Some(lane) => Some(At::new(token.loc, lane)),
        None => {
            ctx.errors.report(
                Some(token.loc),
                ErrorKind::LiteralOutOfRange,
                format!("invalid lane index: {}", token.span),
            );
            None
        }
    }
}

fn read_simd_const(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<V128>> {
    let shape_token = expect(t, ctx, TokenType::SimdShape)?;
    let shape = shape_token.simd_shape()?;
    macro_rules! lanes {
        ($read:ident, $from:ident, $n:literal, $ty:ty) => {{
            let mut lanes = [<$ty>::default(); $n];
            for lane in &mut lanes {
                *lane = $read(t, ctx)?.value as $ty;
            }
            V128::$from(lanes)
        }};
    }
    let value = match shape {
        SimdShape::I8X16 => lanes!(read_s32, from_i8x16, 16, i8),
        SimdShape::I16X8 => lanes!(read_s32, from_i16x8, 8, i16),
        SimdShape::I32X4 => lanes!(read_s32, from_i32x4, 4, i32),
        SimdShape::I64X2 => lanes!(read_s64, from_i64x2, 2, i64),
        SimdShape::F32X4 => lanes!(read_f32, from_f32x4, 4, f32),
        SimdShape::F64X2 => lanes!(read_f64, from_f64x2, 2, f64),
    };
    Some(At::new(shape_token.loc, value))
}

/// The per-opcode text immediate grammar. Immediates that are implicit in
/// text (memory/table index 0) come back as `None`/empty and the
/// converter fills in the defaults.
fn read_plain_immediate(
    t: &mut Tokenizer,
    ctx: &mut ReadCtx,
    opcode: Opcode,
) -> Option<Immediate> {
    use Opcode::*;
    // Text leaves these implicit even though the wire format carries an
    // index.
    if matches!(opcode, MemorySize | MemoryGrow | MemoryFill | AtomicFence) {
        return Some(Immediate::None);
    }
    match opcode {
        TableGet | TableSet | TableGrow | TableSize | TableFill => {
            Some(Immediate::Var(read_var(t, ctx)?))
        }
        MemoryCopy => Some(Immediate::Copy(At::synthetic(CopyImmediate::default()))),
        TableCopy => {
            let dst = read_var_opt(t, ctx);
            let src = if dst.is_some() { read_var_opt(t, ctx) } else { None };
            Some(Immediate::Copy(At::synthetic(CopyImmediate { dst, src })))
        }
        MemoryInit | TableInit => {
            let first = read_var(t, ctx)?;
            match read_var_opt(t, ctx) {
                Some(second) => Some(Immediate::Init(At::synthetic(InitImmediate {
                    dst: Some(first),
                    segment: second,
                }))),
                None => Some(Immediate::Init(At::synthetic(InitImmediate {
                    segment: first,
                    dst: None,
                }))),
            }
        }
        CallIndirect | ReturnCallIndirect => {
            // An explicit table operand is only grammatical under
            // reference-types.
            let table = if ctx.features.contains(Features::REFERENCE_TYPES) {
                read_var_opt(t, ctx)
            } else {
                None
            };
            let ty = read_function_type_use(t, ctx);
            record_type_use(ctx, &ty);
            Some(Immediate::CallIndirect(At::synthetic(
                CallIndirectImmediate { table, ty },
            )))
        }
        FuncBind => {
            let ty = read_function_type_use(t, ctx);
            record_type_use(ctx, &ty);
            Some(Immediate::CallIndirect(At::synthetic(
                CallIndirectImmediate { table: None, ty },
            )))
        }
        BrTable => {
            let mut targets = read_var_list(t, ctx);
            if targets.is_empty() {
                let token = t.peek(0, &mut ctx.errors);
                ctx.errors.report(
                    Some(token.loc),
                    ErrorKind::UnexpectedToken,
                    "br_table requires at least one target",
                );
                return None;
            }
            let default_target = targets.pop().unwrap();
            Some(Immediate::BrTable(At::synthetic(BrTableImmediate {
                targets,
                default_target,
            })))
        }
        BrOnExn => {
            let target = read_var(t, ctx)?;
            let event = read_var(t, ctx)?;
            Some(Immediate::BrOnExn(At::synthetic(BrOnExnImmediate {
                target,
                event,
            })))
        }
        Select => {
            // Typed select is the same keyword plus (result ..) clauses.
            let types = read_result_list(t, ctx);
            if types.is_empty() {
                Some(Immediate::None)
            } else {
                Some(Immediate::Select(At::synthetic(types)))
            }
        }
        _ => match opcode.immediate_kind() {
            ImmediateKind::None => Some(Immediate::None),
            ImmediateKind::S32 => Some(Immediate::S32(read_s32(t, ctx)?)),
            ImmediateKind::S64 => Some(Immediate::S64(read_s64(t, ctx)?)),
            ImmediateKind::F32 => Some(Immediate::F32(read_f32(t, ctx)?)),
            ImmediateKind::F64 => Some(Immediate::F64(read_f64(t, ctx)?)),
            ImmediateKind::V128 => Some(Immediate::V128(read_simd_const(t, ctx)?)),
            ImmediateKind::Index => Some(Immediate::Var(read_var(t, ctx)?)),
            ImmediateKind::MemArg => {
                let offset = read_offset_opt(t, ctx);
                let align = read_align_opt(t, ctx);
                Some(Immediate::MemArg(At::synthetic(MemArgImmediate {
                    align,
                    offset,
                })))
            }
            ImmediateKind::HeapType => Some(Immediate::HeapType(read_heap_type(t, ctx)?)),
            ImmediateKind::Shuffle => {
                let mut lanes = [0u8; 16];
                for lane in &mut lanes {
                    let value = read_simd_lane(t, ctx)?;
                    if value.value >= 32 {
                        ctx.errors.report(
                            value.loc,
                            ErrorKind::LiteralOutOfRange,
                            format!("shuffle lane index too large: {}", value.value),
                        );
                    }
                    *lane = value.value;
                }
                Some(Immediate::Shuffle(At::synthetic(lanes)))
            }
            ImmediateKind::SimdLane => Some(Immediate::SimdLane(read_simd_lane(t, ctx)?)),
            // Block-related kinds never reach plain parsing.
            _ => Some(Immediate::None),
        },
    }
}

pub fn read_plain_instruction(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Instruction>> {
    let token = t.read(&mut ctx.errors);
    check_opcode_enabled(&token, ctx);
    let info = token.opcode_info()?;
    let mut opcode = info.opcode;
    let immediate = read_plain_immediate(t, ctx, opcode)?;
    if opcode == Opcode::Select && matches!(immediate, Immediate::Select(_)) {
        opcode = Opcode::SelectT;
    }
    Some(At::new(
        token.loc,
        Instruction::with_immediate(At::new(token.loc, opcode), immediate),
    ))
}

pub fn read_block_immediate(t: &mut Tokenizer, ctx: &mut ReadCtx) -> At<BlockImmediate> {
    let label = read_bind_var_opt(t, ctx);
    let ty = read_function_type_use(t, ctx);
    // A bare or single-result block type encodes directly; anything else
    // needs a type entry.
    if !ty.ty.value.params.is_empty() || ty.ty.value.results.len() > 1 {
        record_type_use(ctx, &ty);
    }
    At::synthetic(BlockImmediate { label, ty })
}

fn read_end_label_opt(t: &mut Tokenizer, ctx: &mut ReadCtx, label: &Option<At<BindVar>>) {
    if let Some(token) = t.match_type(TokenType::Id, &mut ctx.errors) {
        match label {
            Some(expected) if expected.value == token.span => {}
            Some(expected) => {
                ctx.errors.report(
                    Some(token.loc),
                    ErrorKind::UnexpectedToken,
                    format!("Expected label {}, got {}", expected.value, token.span),
                );
            }
            None => {
                ctx.errors.report(
                    Some(token.loc),
                    ErrorKind::UnexpectedToken,
                    format!("unexpected label {}", token.span),
                );
            }
        }
    }
}

/// Plain-form block instruction: keyword, immediates, body, `end`, with
/// `else`/`catch` arms where the opener allows them.
fn read_block_instruction(
    t: &mut Tokenizer,
    ctx: &mut ReadCtx,
    instrs: &mut InstructionList,
) -> Option<()> {
    let token = t.read(&mut ctx.errors);
    check_opcode_enabled(&token, ctx);
    let info = token.opcode_info()?;
    let opcode = info.opcode;
    let block = read_block_immediate(t, ctx);
    let label = block.value.label.clone();
    ctx.begin_block(label.clone());

    let immediate = if opcode == Opcode::Let {
        let locals = read_bound_value_type_list(t, ctx, TokenType::Local, true);
        Immediate::Let(At::synthetic(LetImmediate {
            block: block.value,
            locals,
        }))
    } else {
        Immediate::Block(block)
    };
    instrs.push(At::new(
        token.loc,
        Instruction::with_immediate(At::new(token.loc, opcode), immediate),
    ));

    read_instruction_list(t, ctx, instrs)?;

    match opcode {
        Opcode::If => {
            if let Some(else_token) = t.match_type(TokenType::Else, &mut ctx.errors) {
                read_end_label_opt(t, ctx, &label);
                instrs.push(At::new(
                    else_token.loc,
                    Instruction::new(At::new(else_token.loc, Opcode::Else)),
                ));
                read_instruction_list(t, ctx, instrs)?;
            }
        }
        Opcode::Try => {
            let catch_token = expect(t, ctx, TokenType::Catch)?;
            instrs.push(At::new(
                catch_token.loc,
                Instruction::new(At::new(catch_token.loc, Opcode::Catch)),
            ));
            read_instruction_list(t, ctx, instrs)?;
        }
        _ => {}
    }

    let end = expect(t, ctx, TokenType::End)?;
    read_end_label_opt(t, ctx, &label);
    instrs.push(At::new(end.loc, Instruction::new(At::new(end.loc, Opcode::End))));
    ctx.end_block();
    Some(())
}

fn is_instruction_token(ty: TokenType) -> bool {
    matches!(ty, TokenType::PlainInstr | TokenType::BlockInstr)
}

fn is_expression_start(t: &mut Tokenizer, ctx: &mut ReadCtx) -> bool {
    t.peek(0, &mut ctx.errors).ty == TokenType::Lpar
        && is_instruction_token(t.peek(1, &mut ctx.errors).ty)
}

/// Reads plain, block, and folded instructions until a token that cannot
/// start one.
pub fn read_instruction_list(
    t: &mut Tokenizer,
    ctx: &mut ReadCtx,
    instrs: &mut InstructionList,
) -> Option<()> {
    loop {
        let ty = t.peek(0, &mut ctx.errors).ty;
        if ty == TokenType::PlainInstr {
            let instr = read_plain_instruction(t, ctx)?;
            instrs.push(instr);
        } else if ty == TokenType::BlockInstr {
            read_block_instruction(t, ctx, instrs)?;
        } else if is_expression_start(t, ctx) {
            read_expression(t, ctx, instrs)?;
        } else {
            return Some(());
        }
    }
}

/// Folded form: `(op imm.. expr*)`. Sub-expressions are read first and
/// the operator instruction appended after them, yielding the same linear
/// list as the plain form.
pub fn read_expression(
    t: &mut Tokenizer,
    ctx: &mut ReadCtx,
    instrs: &mut InstructionList,
) -> Option<()> {
    expect(t, ctx, TokenType::Lpar)?;
    let token = t.peek(0, &mut ctx.errors);
    match token.ty {
        TokenType::PlainInstr => {
            let instr = read_plain_instruction(t, ctx)?;
            // Operands are nested expressions; they execute first.
            read_expression_list(t, ctx, instrs)?;
            instrs.push(instr);
            expect(t, ctx, TokenType::Rpar)?;
        }
        TokenType::BlockInstr => {
            let token = t.read(&mut ctx.errors);
            check_opcode_enabled(&token, ctx);
            let opcode = token.opcode_info()?.opcode;
            let block = read_block_immediate(t, ctx);
            let label = block.value.label.clone();
            ctx.begin_block(label);

            match opcode {
                Opcode::If => {
                    // Condition expressions come before the `(then ...)`.
                    while !(t.peek(0, &mut ctx.errors).ty == TokenType::Lpar
                        && t.peek(1, &mut ctx.errors).ty == TokenType::Then)
                    {
                        if !is_expression_start(t, ctx) {
                            break;
                        }
                        read_expression(t, ctx, instrs)?;
                    }
                    instrs.push(At::new(
                        token.loc,
                        Instruction::with_immediate(
                            At::new(token.loc, opcode),
                            Immediate::Block(block),
                        ),
                    ));
                    expect_lpar(t, ctx, TokenType::Then)?;
                    read_instruction_list(t, ctx, instrs)?;
                    expect(t, ctx, TokenType::Rpar)?;
                    if t.peek(0, &mut ctx.errors).ty == TokenType::Lpar
                        && t.peek(1, &mut ctx.errors).ty == TokenType::Else
                    {
                        let _ = t.read(&mut ctx.errors);
                        let else_token = t.read(&mut ctx.errors);
                        instrs.push(At::new(
                            else_token.loc,
                            Instruction::new(At::new(else_token.loc, Opcode::Else)),
                        ));
                        read_instruction_list(t, ctx, instrs)?;
                        expect(t, ctx, TokenType::Rpar)?;
                    }
                }
                Opcode::Try => {
                    instrs.push(At::new(
                        token.loc,
                        Instruction::with_immediate(
                            At::new(token.loc, opcode),
                            Immediate::Block(block),
                        ),
                    ));
                    expect_lpar(t, ctx, TokenType::Do)?;
                    read_instruction_list(t, ctx, instrs)?;
                    expect(t, ctx, TokenType::Rpar)?;
                    expect(t, ctx, TokenType::Lpar)?;
                    let catch_token = expect(t, ctx, TokenType::Catch)?;
                    instrs.push(At::new(
                        catch_token.loc,
                        Instruction::new(At::new(catch_token.loc, Opcode::Catch)),
                    ));
                    read_instruction_list(t, ctx, instrs)?;
                    expect(t, ctx, TokenType::Rpar)?;
                }
                Opcode::Let => {
                    let locals = read_bound_value_type_list(t, ctx, TokenType::Local, true);
                    instrs.push(At::new(
                        token.loc,
                        Instruction::with_immediate(
                            At::new(token.loc, opcode),
                            Immediate::Let(At::synthetic(LetImmediate {
                                block: block.value,
                                locals,
                            })),
                        ),
                    ));
                    read_instruction_list(t, ctx, instrs)?;
                }
                _ => {
                    instrs.push(At::new(
                        token.loc,
                        Instruction::with_immediate(
                            At::new(token.loc, opcode),
                            Immediate::Block(block),
                        ),
                    ));
                    read_instruction_list(t, ctx, instrs)?;
                }
            }

            let end = expect(t, ctx, TokenType::Rpar)?;
            instrs.push(At::new(
                end.loc,
                Instruction::new(At::new(end.loc, Opcode::End)),
            ));
            ctx.end_block();
        }
        _ => {
            ctx.errors.report(
                Some(token.loc),
                ErrorKind::UnexpectedToken,
                format!("expected an instruction, got {:?}", token.span),
            );
            return None;
        }
    }
    Some(())
}

pub fn read_expression_list(
    t: &mut Tokenizer,
    ctx: &mut ReadCtx,
    instrs: &mut InstructionList,
) -> Option<()> {
    while is_expression_start(t, ctx) {
        read_expression(t, ctx, instrs)?;
    }
    Some(())
}

fn read_constant_expression(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<ConstantExpression>> {
    let mut instrs = InstructionList::new();
    read_instruction_list(t, ctx, &mut instrs)?;
    Some(At::synthetic(ConstantExpression {
        instructions: instrs,
    }))
}

// --- Module items ---

fn bind_name(map_duplicate: bool, ctx: &mut ReadCtx, name: &Option<At<BindVar>>) {
    if let Some(name) = name {
        if !map_duplicate {
            ctx.errors.report(
                name.loc,
                ErrorKind::DuplicateIdentifier,
                format!("duplicate identifier {}", name.value),
            );
        }
    }
}

macro_rules! bind_into {
    ($ctx:expr, $map:ident, $name:expr) => {{
        let ok = match &$name {
            Some(name) => $ctx.$map.new_bound(name.value.clone()),
            None => {
                $ctx.$map.new_unbound();
                true
            }
        };
        bind_name(ok, $ctx, &$name);
    }};
}

fn mark_non_import(ctx: &mut ReadCtx, import: &Option<At<InlineImport>>) {
    if import.is_none() {
        ctx.seen_non_import = true;
    }
}

pub fn read_import(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Import>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Import)?;
    if ctx.seen_non_import {
        ctx.errors.report(
            Some(start),
            ErrorKind::ImportAfterNonImport,
            "Imports must occur before all non-import definitions",
        );
    }
    let module = read_utf8_text(t, ctx)?;
    let name = read_utf8_text(t, ctx)?;
    expect(t, ctx, TokenType::Lpar)?;
    let kind_token = t.read(&mut ctx.errors);
    let desc = match kind_token.ty {
        TokenType::Func => {
            let bind = read_bind_var_opt(t, ctx);
            bind_into!(ctx, function_names, bind);
            let type_use = read_type_use_opt(t, ctx);
            let ty = read_bound_function_type(t, ctx, false);
            let use_ = FunctionTypeUse {
                type_use: type_use.clone(),
                ty: At::synthetic(ty.value.to_unbound()),
            };
            record_type_use(ctx, &use_);
            ImportDesc::Function(FunctionDesc {
                name: bind,
                type_use,
                ty,
            })
        }
        TokenType::Table => {
            let bind = read_bind_var_opt(t, ctx);
            bind_into!(ctx, table_names, bind);
            let ty = read_table_type(t, ctx)?;
            ImportDesc::Table(TableDesc { name: bind, ty })
        }
        TokenType::Memory => {
            let bind = read_bind_var_opt(t, ctx);
            bind_into!(ctx, memory_names, bind);
            let ty = read_memory_type(t, ctx)?;
            ImportDesc::Memory(MemoryDesc { name: bind, ty })
        }
        TokenType::Global => {
            let bind = read_bind_var_opt(t, ctx);
            bind_into!(ctx, global_names, bind);
            let ty = read_global_type(t, ctx)?;
            ImportDesc::Global(GlobalDesc { name: bind, ty })
        }
        TokenType::Event => {
            let bind = read_bind_var_opt(t, ctx);
            bind_into!(ctx, event_names, bind);
            let ty = read_event_type(t, ctx);
            ImportDesc::Event(EventDesc { name: bind, ty })
        }
        _ => {
            ctx.errors.report(
                Some(kind_token.loc),
                ErrorKind::UnexpectedToken,
                format!("expected an import kind, got {:?}", kind_token.span),
            );
            return None;
        }
    };
    expect(t, ctx, TokenType::Rpar)?;
    let end = expect_rpar(t, ctx)?;
    Some(At::new(
        start.merge(end.loc),
        Import { module, name, desc },
    ))
}

pub fn read_function(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Function>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Func)?;
    let name = read_bind_var_opt(t, ctx);
    bind_into!(ctx, function_names, name);
    let exports = read_inline_export_list(t, ctx);
    let import = read_inline_import_opt(t, ctx);
    mark_non_import(ctx, &import);

    ctx.begin_function();
    let type_use = read_type_use_opt(t, ctx);
    let ty = read_bound_function_type(t, ctx, import.is_none());
    let use_ = FunctionTypeUse {
        type_use: type_use.clone(),
        ty: At::synthetic(ty.value.to_unbound()),
    };
    record_type_use(ctx, &use_);

    let (locals, instructions) = if import.is_none() {
        let locals = read_bound_value_type_list(t, ctx, TokenType::Local, true);
        let mut instrs = InstructionList::new();
        read_instruction_list(t, ctx, &mut instrs)?;
        (locals, instrs)
    } else {
        (BoundValueTypeList::new(), InstructionList::new())
    };

    let end = expect_rpar(t, ctx)?;
    Some(At::new(
        start.merge(end.loc),
        Function {
            desc: FunctionDesc {
                name,
                type_use,
                ty,
            },
            locals,
            instructions,
            import,
            exports,
        },
    ))
}

fn read_element_list(t: &mut Tokenizer, ctx: &mut ReadCtx, legacy_active: bool) -> Option<ElementList> {
    let token = t.peek(0, &mut ctx.errors);
    match token.ty {
        TokenType::Func => {
            let _ = t.read(&mut ctx.errors);
            let list = read_var_list(t, ctx);
            Some(ElementList::Vars(ElementListWithVars {
                kind: At::synthetic(ExternalKind::Function),
                list,
            }))
        }
        TokenType::Id | TokenType::Nat | TokenType::Rpar if legacy_active => {
            let list = read_var_list(t, ctx);
            Some(ElementList::Vars(ElementListWithVars {
                kind: At::synthetic(ExternalKind::Function),
                list,
            }))
        }
        _ => {
            let elemtype = read_reference_type(t, ctx)?;
            let mut list = Vec::new();
            loop {
                let next = t.peek(0, &mut ctx.errors);
                if next.ty != TokenType::Lpar {
                    break;
                }
                let mut instrs = InstructionList::new();
                if t.peek(1, &mut ctx.errors).ty == TokenType::Item {
                    expect_lpar(t, ctx, TokenType::Item)?;
                    read_instruction_list(t, ctx, &mut instrs)?;
                    expect(t, ctx, TokenType::Rpar)?;
                } else {
                    read_expression(t, ctx, &mut instrs)?;
                }
                list.push(At::synthetic(ElementExpression {
                    instructions: instrs,
                }));
            }
            Some(ElementList::Expressions(ElementListWithExpressions {
                elemtype,
                list,
            }))
        }
    }
}

fn read_offset_expression_opt(
    t: &mut Tokenizer,
    ctx: &mut ReadCtx,
) -> Option<At<ConstantExpression>> {
    if t.peek(0, &mut ctx.errors).ty != TokenType::Lpar {
        return None;
    }
    if t.peek(1, &mut ctx.errors).ty == TokenType::Offset {
        expect_lpar(t, ctx, TokenType::Offset)?;
        let mut instrs = InstructionList::new();
        read_instruction_list(t, ctx, &mut instrs)?;
        expect(t, ctx, TokenType::Rpar)?;
        return Some(At::synthetic(ConstantExpression {
            instructions: instrs,
        }));
    }
    if is_instruction_token(t.peek(1, &mut ctx.errors).ty) {
        let mut instrs = InstructionList::new();
        read_expression(t, ctx, &mut instrs)?;
        return Some(At::synthetic(ConstantExpression {
            instructions: instrs,
        }));
    }
    None
}

pub fn read_element_segment(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<ElementSegment>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Elem)?;
    ctx.seen_non_import = true;
    let name = read_bind_var_opt(t, ctx);
    bind_into!(ctx, element_segment_names, name);

    if t.match_type(TokenType::Declare, &mut ctx.errors).is_some() {
        let elements = read_element_list(t, ctx, false)?;
        let end = expect_rpar(t, ctx)?;
        return Some(At::new(
            start.merge(end.loc),
            ElementSegment {
                name,
                segment_type: SegmentType::Declared,
                table_use: None,
                offset: None,
                elements,
            },
        ));
    }

    let table_use = if t.peek(0, &mut ctx.errors).ty == TokenType::Lpar
        && t.peek(1, &mut ctx.errors).ty == TokenType::Table
    {
        expect_lpar(t, ctx, TokenType::Table)?;
        let var = read_var(t, ctx)?;
        expect(t, ctx, TokenType::Rpar)?;
        Some(var)
    } else {
        None
    };

    let offset = read_offset_expression_opt(t, ctx);
    let segment_type = if offset.is_some() {
        SegmentType::Active
    } else {
        SegmentType::Passive
    };
    let legacy_active = offset.is_some() && table_use.is_none();
    let elements = read_element_list(t, ctx, legacy_active)?;
    let end = expect_rpar(t, ctx)?;
    Some(At::new(
        start.merge(end.loc),
        ElementSegment {
            name,
            segment_type,
            table_use,
            offset,
            elements,
        },
    ))
}

pub fn read_table(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Table>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Table)?;
    let name = read_bind_var_opt(t, ctx);
    bind_into!(ctx, table_names, name);
    let exports = read_inline_export_list(t, ctx);
    let import = read_inline_import_opt(t, ctx);
    mark_non_import(ctx, &import);

    let next = t.peek(0, &mut ctx.errors);
    let (ty, elements) = if next.ty == TokenType::Nat {
        // Explicit limits.
        (read_table_type(t, ctx)?, None)
    } else {
        // Element type followed by an inline segment; limits are inferred
        // from the element count.
        let elemtype = read_reference_type(t, ctx)?;
        expect_lpar(t, ctx, TokenType::Elem)?;
        ctx.element_segment_names.new_unbound();
        let elements = read_element_list(t, ctx, true)?;
        expect(t, ctx, TokenType::Rpar)?;
        let count = match &elements {
            ElementList::Vars(vars) => vars.list.len() as u32,
            ElementList::Expressions(exprs) => exprs.list.len() as u32,
        };
        let limits = At::synthetic(Limits::with_max(
            At::synthetic(count),
            Some(At::synthetic(count)),
        ));
        (
            At::synthetic(TableType { limits, elemtype }),
            Some(elements),
        )
    };

    let end = expect_rpar(t, ctx)?;
    Some(At::new(
        start.merge(end.loc),
        Table {
            desc: TableDesc { name, ty },
            import,
            exports,
            elements,
        },
    ))
}

pub fn read_memory(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Memory>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Memory)?;
    let name = read_bind_var_opt(t, ctx);
    bind_into!(ctx, memory_names, name);
    let exports = read_inline_export_list(t, ctx);
    let import = read_inline_import_opt(t, ctx);
    mark_non_import(ctx, &import);

    let next = t.peek(0, &mut ctx.errors);
    let (ty, data) = if next.ty == TokenType::Lpar && t.peek(1, &mut ctx.errors).ty == TokenType::Data
    {
        expect_lpar(t, ctx, TokenType::Data)?;
        ctx.data_segment_names.new_unbound();
        let data = read_text_list(t, ctx);
        expect(t, ctx, TokenType::Rpar)?;
        // Page count inferred from the byte size.
        let byte_len: usize = data.iter().map(|text| text.value.bytes.len()).sum();
        let pages = byte_len.div_ceil(65536) as u32;
        let limits = At::synthetic(Limits::with_max(
            At::synthetic(pages),
            Some(At::synthetic(pages)),
        ));
        (At::synthetic(MemoryType { limits }), Some(data))
    } else {
        (read_memory_type(t, ctx)?, None)
    };

    let end = expect_rpar(t, ctx)?;
    Some(At::new(
        start.merge(end.loc),
        Memory {
            desc: MemoryDesc { name, ty },
            import,
            exports,
            data,
        },
    ))
}

pub fn read_global(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Global>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Global)?;
    let name = read_bind_var_opt(t, ctx);
    bind_into!(ctx, global_names, name);
    let exports = read_inline_export_list(t, ctx);
    let import = read_inline_import_opt(t, ctx);
    mark_non_import(ctx, &import);

    let ty = read_global_type(t, ctx)?;
    let init = if import.is_none() {
        read_constant_expression(t, ctx)
    } else {
        None
    };

    let end = expect_rpar(t, ctx)?;
    Some(At::new(
        start.merge(end.loc),
        Global {
            desc: GlobalDesc { name, ty },
            init,
            import,
            exports,
        },
    ))
}

pub fn read_event(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Event>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Event)?;
    if !ctx.features.contains(Features::EXCEPTIONS) {
        ctx.errors.report(
            Some(start),
            ErrorKind::FeatureDisabled,
            "events require the exceptions feature",
        );
    }
    let name = read_bind_var_opt(t, ctx);
    bind_into!(ctx, event_names, name);
    let exports = read_inline_export_list(t, ctx);
    let import = read_inline_import_opt(t, ctx);
    mark_non_import(ctx, &import);
    let ty = read_event_type(t, ctx);

    let end = expect_rpar(t, ctx)?;
    Some(At::new(
        start.merge(end.loc),
        Event {
            desc: EventDesc { name, ty },
            import,
            exports,
        },
    ))
}

pub fn read_export(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Export>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Export)?;
    ctx.seen_non_import = true;
    let name = read_utf8_text(t, ctx)?;
    expect(t, ctx, TokenType::Lpar)?;
    let kind_token = t.read(&mut ctx.errors);
    let kind = match kind_token.ty {
        TokenType::Func => ExternalKind::Function,
        TokenType::Table => ExternalKind::Table,
        TokenType::Memory => ExternalKind::Memory,
        TokenType::Global => ExternalKind::Global,
        TokenType::Event => ExternalKind::Event,
        _ => {
            ctx.errors.report(
                Some(kind_token.loc),
                ErrorKind::UnexpectedToken,
                format!("expected an export kind, got {:?}", kind_token.span),
            );
            return None;
        }
    };
    let var = read_var(t, ctx)?;
    expect(t, ctx, TokenType::Rpar)?;
    let end = expect_rpar(t, ctx)?;
    Some(At::new(
        start.merge(end.loc),
        Export {
            kind: At::new(kind_token.loc, kind),
            name,
            var,
        },
    ))
}

pub fn read_start(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Start>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Start)?;
    ctx.seen_non_import = true;
    if ctx.seen_start {
        ctx.errors.report(
            Some(start),
            ErrorKind::MultipleStart,
            "multiple start functions",
        );
    }
    ctx.seen_start = true;
    let var = read_var(t, ctx)?;
    let end = expect_rpar(t, ctx)?;
    Some(At::new(start.merge(end.loc), Start { var }))
}

pub fn read_data_segment(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<DataSegment>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Data)?;
    ctx.seen_non_import = true;
    let name = read_bind_var_opt(t, ctx);
    bind_into!(ctx, data_segment_names, name);

    let memory_use = if t.peek(0, &mut ctx.errors).ty == TokenType::Lpar
        && t.peek(1, &mut ctx.errors).ty == TokenType::Memory
    {
        expect_lpar(t, ctx, TokenType::Memory)?;
        let var = read_var(t, ctx)?;
        expect(t, ctx, TokenType::Rpar)?;
        Some(var)
    } else {
        None
    };

    let offset = read_offset_expression_opt(t, ctx);
    let segment_type = if offset.is_some() {
        SegmentType::Active
    } else {
        if !ctx.features.contains(Features::BULK_MEMORY) {
            ctx.errors.report(
                Some(start),
                ErrorKind::FeatureDisabled,
                "passive data segments require the bulk-memory feature",
            );
        }
        SegmentType::Passive
    };
    let data = read_text_list(t, ctx);
    let end = expect_rpar(t, ctx)?;
    Some(At::new(
        start.merge(end.loc),
        DataSegment {
            name,
            segment_type,
            memory_use,
            offset,
            data,
        },
    ))
}

pub fn read_module_item(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<ModuleItem>> {
    let head = t.peek(1, &mut ctx.errors);
    let item = match head.ty {
        TokenType::Type => read_type_entry(t, ctx).map(|x| { let loc = x.loc; x.map(|v| ModuleItem::DefinedType(At { value: v, loc })) }),
        TokenType::Import => read_import(t, ctx).map(|x| { let loc = x.loc; x.map(|v| ModuleItem::Import(At { value: v, loc })) }),
        TokenType::Func => read_function(t, ctx).map(|x| { let loc = x.loc; x.map(|v| ModuleItem::Function(At { value: v, loc })) }),
        TokenType::Table => read_table(t, ctx).map(|x| { let loc = x.loc; x.map(|v| ModuleItem::Table(At { value: v, loc })) }),
        TokenType::Memory => read_memory(t, ctx).map(|x| { let loc = x.loc; x.map(|v| ModuleItem::Memory(At { value: v, loc })) }),
        TokenType::Global => read_global(t, ctx).map(|x| { let loc = x.loc; x.map(|v| ModuleItem::Global(At { value: v, loc })) }),
        TokenType::Export => read_export(t, ctx).map(|x| { let loc = x.loc; x.map(|v| ModuleItem::Export(At { value: v, loc })) }),
        TokenType::Start => read_start(t, ctx).map(|x| { let loc = x.loc; x.map(|v| ModuleItem::Start(At { value: v, loc })) }),
        TokenType::Elem => read_element_segment(t, ctx).map(|x| { let loc = x.loc; x.map(|v| ModuleItem::ElementSegment(At { value: v, loc })) }),
        TokenType::Data => read_data_segment(t, ctx).map(|x| { let loc = x.loc; x.map(|v| ModuleItem::DataSegment(At { value: v, loc })) }),
        TokenType::Event => read_event(t, ctx).map(|x| { let loc = x.loc; x.map(|v| ModuleItem::Event(At { value: v, loc })) }),
        _ => {
            ctx.errors.report(
                Some(head.loc),
                ErrorKind::UnexpectedToken,
                format!("expected a module item, got {:?}", head.span),
            );
            None
        }
    };
    if item.is_none() {
        sync_to_rpar(t, ctx);
    }
    item
}

fn is_module_item_head(ty: TokenType) -> bool {
    matches!(
        ty,
        TokenType::Type
            | TokenType::Import
            | TokenType::Func
            | TokenType::Table
            | TokenType::Memory
            | TokenType::Global
            | TokenType::Export
            | TokenType::Start
            | TokenType::Elem
            | TokenType::Data
            | TokenType::Event
    )
}

/// Reads module items until the closing `)` (or EOF for a bare module).
pub fn read_module_items(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Module {
    let mut items = Module::new();
    loop {
        let token = t.peek(0, &mut ctx.errors);
        if token.ty != TokenType::Lpar {
            break;
        }
        if !is_module_item_head(t.peek(1, &mut ctx.errors).ty) {
            break;
        }
        if let Some(item) = read_module_item(t, ctx) {
            items.push(item);
        }
    }
    items
}

/// `(module $name? item*)` or a bare item sequence.
pub fn read_module(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<Module> {
    ctx.begin_module();
    if t.peek(0, &mut ctx.errors).ty == TokenType::Lpar
        && t.peek(1, &mut ctx.errors).ty == TokenType::Module
    {
        expect_lpar(t, ctx, TokenType::Module)?;
        if let Some(name) = read_bind_var_opt(t, ctx) {
            ctx.module_names.new_bound(name.value);
        }
        let items = read_module_items(t, ctx);
        expect(t, ctx, TokenType::Rpar)?;
        Some(items)
    } else {
        Some(read_module_items(t, ctx))
    }
}

// --- Script layer ---

pub fn read_script_module(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<ScriptModule>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Module)?;
    let name = read_bind_var_opt(t, ctx);
    if let Some(name) = &name {
        ctx.module_names.new_bound(name.value.clone());
    } else {
        ctx.module_names.new_unbound();
    }
    let kind = match t.peek(0, &mut ctx.errors).ty {
        TokenType::Binary => {
            let _ = t.read(&mut ctx.errors);
            ScriptModuleKind::Binary(read_text_list(t, ctx))
        }
        TokenType::Quote => {
            let _ = t.read(&mut ctx.errors);
            ScriptModuleKind::Quote(read_text_list(t, ctx))
        }
        _ => {
            ctx.begin_module();
            ScriptModuleKind::Text(read_module_items(t, ctx))
        }
    };
    let end = expect_rpar(t, ctx)?;
    Some(At::new(start.merge(end.loc), ScriptModule { name, kind }))
}

fn read_const(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Const>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect(t, ctx, TokenType::Lpar)?;
    let token = t.read(&mut ctx.errors);
    let value = match (token.ty, token.opcode_info().map(|i| i.opcode)) {
        (TokenType::PlainInstr, Some(Opcode::I32Const)) => Const::I32(read_s32(t, ctx)?.value),
        (TokenType::PlainInstr, Some(Opcode::I64Const)) => Const::I64(read_s64(t, ctx)?.value),
        (TokenType::PlainInstr, Some(Opcode::F32Const)) => Const::F32(read_f32(t, ctx)?.value),
        (TokenType::PlainInstr, Some(Opcode::F64Const)) => Const::F64(read_f64(t, ctx)?.value),
        (TokenType::PlainInstr, Some(Opcode::V128Const)) => {
            Const::V128(read_simd_const(t, ctx)?.value)
        }
        (TokenType::PlainInstr, Some(Opcode::RefNull)) => {
            // The script grammar allows a bare `(ref.null)`.
            if t.peek(0, &mut ctx.errors).ty != TokenType::Rpar {
                let _ = read_heap_type(t, ctx);
            }
            Const::RefNull
        }
        (TokenType::RefExtern, _) => Const::RefExtern(read_nat32(t, ctx)?.value),
        _ => {
            ctx.errors.report(
                Some(token.loc),
                ErrorKind::UnexpectedToken,
                format!("expected a constant, got {:?}", token.span),
            );
            return None;
        }
    };
    let end = expect_rpar(t, ctx)?;
    Some(At::new(start.merge(end.loc), value))
}

fn read_const_list(t: &mut Tokenizer, ctx: &mut ReadCtx) -> ConstList {
    let mut list = ConstList::new();
    while t.peek(0, &mut ctx.errors).ty == TokenType::Lpar {
        match read_const(t, ctx) {
            Some(value) => list.push(value),
            None => break,
        }
    }
    list
}

pub fn read_action(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Action>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect(t, ctx, TokenType::Lpar)?;
    let token = t.read(&mut ctx.errors);
    let action = match token.ty {
        TokenType::Invoke => {
            let module = read_bind_var_opt(t, ctx);
            let name = read_utf8_text(t, ctx)?;
            let consts = read_const_list(t, ctx);
            Action::Invoke(InvokeAction {
                module,
                name,
                consts,
            })
        }
        TokenType::Get => {
            let module = read_bind_var_opt(t, ctx);
            let name = read_utf8_text(t, ctx)?;
            Action::Get(GetAction { module, name })
        }
        _ => {
            ctx.errors.report(
                Some(token.loc),
                ErrorKind::UnexpectedToken,
                format!("expected an action, got {:?}", token.span),
            );
            return None;
        }
    };
    let end = expect_rpar(t, ctx)?;
    Some(At::new(start.merge(end.loc), action))
}

fn read_float_result_f32(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<FloatResult<f32>> {
    match t.peek(0, &mut ctx.errors).ty {
        TokenType::NanCanonical => {
            let _ = t.read(&mut ctx.errors);
            Some(FloatResult::NanCanonical)
        }
        TokenType::NanArithmetic => {
            let _ = t.read(&mut ctx.errors);
            Some(FloatResult::NanArithmetic)
        }
        _ => Some(FloatResult::Value(read_f32(t, ctx)?.value)),
    }
}

fn read_float_result_f64(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<FloatResult<f64>> {
    match t.peek(0, &mut ctx.errors).ty {
        TokenType::NanCanonical => {
            let _ = t.read(&mut ctx.errors);
            Some(FloatResult::NanCanonical)
        }
        TokenType::NanArithmetic => {
            let _ = t.read(&mut ctx.errors);
            Some(FloatResult::NanArithmetic)
        }
        _ => Some(FloatResult::Value(read_f64(t, ctx)?.value)),
    }
}

fn read_return_result(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<ReturnResult>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect(t, ctx, TokenType::Lpar)?;
    let token = t.read(&mut ctx.errors);
    let result = match (token.ty, token.opcode_info().map(|i| i.opcode)) {
        (TokenType::PlainInstr, Some(Opcode::I32Const)) => {
            ReturnResult::Const(Const::I32(read_s32(t, ctx)?.value))
        }
        (TokenType::PlainInstr, Some(Opcode::I64Const)) => {
            ReturnResult::Const(Const::I64(read_s64(t, ctx)?.value))
        }
        (TokenType::PlainInstr, Some(Opcode::F32Const)) => {
            ReturnResult::F32(read_float_result_f32(t, ctx)?)
        }
        (TokenType::PlainInstr, Some(Opcode::F64Const)) => {
            ReturnResult::F64(read_float_result_f64(t, ctx)?)
        }
        (TokenType::PlainInstr, Some(Opcode::V128Const)) => {
            let shape_token = expect(t, ctx, TokenType::SimdShape)?;
            match shape_token.simd_shape()? {
                SimdShape::F32X4 => {
                    let mut lanes = [FloatResult::Value(0f32); 4];
                    for lane in &mut lanes {
                        *lane = read_float_result_f32(t, ctx)?;
                    }
                    ReturnResult::F32X4(lanes)
                }
                SimdShape::F64X2 => {
                    let mut lanes = [FloatResult::Value(0f64); 2];
                    for lane in &mut lanes {
                        *lane = read_float_result_f64(t, ctx)?;
                    }
                    ReturnResult::F64X2(lanes)
                }
                SimdShape::I8X16 => {
                    let mut lanes = [0i8; 16];
                    for lane in &mut lanes {
                        *lane = read_s32(t, ctx)?.value as i8;
                    }
                    ReturnResult::Const(Const::V128(V128::from_i8x16(lanes)))
                }
                SimdShape::I16X8 => {
                    let mut lanes = [0i16; 8];
                    for lane in &mut lanes {
                        *lane = read_s32(t, ctx)?.value as i16;
                    }
                    ReturnResult::Const(Const::V128(V128::from_i16x8(lanes)))
                }
                SimdShape::I32X4 => {
                    let mut lanes = [0i32; 4];
                    for lane in &mut lanes {
                        *lane = read_s32(t, ctx)?.value;
                    }
                    ReturnResult::Const(Const::V128(V128::from_i32x4(lanes)))
                }
                SimdShape::I64X2 => {
                    let mut lanes = [0i64; 2];
                    for lane in &mut lanes {
                        *lane = read_s64(t, ctx)?.value;
                    }
                    ReturnResult::Const(Const::V128(V128::from_i64x2(lanes)))
                }
            }
        }
        (TokenType::PlainInstr, Some(Opcode::RefNull)) => {
            if t.peek(0, &mut ctx.errors).ty != TokenType::Rpar {
                let _ = read_heap_type(t, ctx);
            }
            ReturnResult::Const(Const::RefNull)
        }
        (TokenType::RefExtern, _) => {
            ReturnResult::Const(Const::RefExtern(read_nat32(t, ctx)?.value))
        }
        _ => {
            ctx.errors.report(
                Some(token.loc),
                ErrorKind::UnexpectedToken,
                format!("expected a result, got {:?}", token.span),
            );
            return None;
        }
    };
    let end = expect_rpar(t, ctx)?;
    Some(At::new(start.merge(end.loc), result))
}

pub fn read_assertion(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Assertion>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect(t, ctx, TokenType::Lpar)?;
    let token = t.read(&mut ctx.errors);
    let assertion = match token.ty {
        TokenType::AssertMalformed => {
            let module = read_script_module(t, ctx)?;
            let message = read_utf8_text(t, ctx)?;
            Assertion::Malformed { module, message }
        }
        TokenType::AssertInvalid => {
            let module = read_script_module(t, ctx)?;
            let message = read_utf8_text(t, ctx)?;
            Assertion::Invalid { module, message }
        }
        TokenType::AssertUnlinkable => {
            let module = read_script_module(t, ctx)?;
            let message = read_utf8_text(t, ctx)?;
            Assertion::Unlinkable { module, message }
        }
        TokenType::AssertTrap => {
            let action = read_action(t, ctx)?;
            let message = read_utf8_text(t, ctx)?;
            Assertion::ActionTrap { action, message }
        }
        TokenType::AssertReturn => {
            let action = read_action(t, ctx)?;
            let mut results = ReturnResultList::new();
            while t.peek(0, &mut ctx.errors).ty == TokenType::Lpar {
                match read_return_result(t, ctx) {
                    Some(result) => results.push(result),
                    None => break,
                }
            }
            Assertion::Return { action, results }
        }
        TokenType::AssertExhaustion => {
            let action = read_action(t, ctx)?;
            let message = read_utf8_text(t, ctx)?;
            Assertion::Exhaustion { action, message }
        }
        _ => {
            ctx.errors.report(
                Some(token.loc),
                ErrorKind::UnexpectedToken,
                format!("expected an assertion, got {:?}", token.span),
            );
            return None;
        }
    };
    let end = expect_rpar(t, ctx)?;
    Some(At::new(start.merge(end.loc), assertion))
}

pub fn read_register(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Register>> {
    let start = t.peek(0, &mut ctx.errors).loc;
    expect_lpar(t, ctx, TokenType::Register)?;
    let name = read_utf8_text(t, ctx)?;
    let module = read_bind_var_opt(t, ctx);
    let end = expect_rpar(t, ctx)?;
    Some(At::new(start.merge(end.loc), Register { name, module }))
}

pub fn read_command(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Option<At<Command>> {
    let head = t.peek(1, &mut ctx.errors);
    match head.ty {
        TokenType::Module => read_script_module(t, ctx).map(|x| { let loc = x.loc; x.map(|v| Command::ScriptModule(At { value: v, loc })) }),
        TokenType::Invoke | TokenType::Get => read_action(t, ctx).map(|x| { let loc = x.loc; x.map(|v| Command::Action(At { value: v, loc })) }),
        TokenType::Register => read_register(t, ctx).map(|x| { let loc = x.loc; x.map(|v| Command::Register(At { value: v, loc })) }),
        TokenType::AssertMalformed
        | TokenType::AssertInvalid
        | TokenType::AssertUnlinkable
        | TokenType::AssertTrap
        | TokenType::AssertReturn
        | TokenType::AssertExhaustion => read_assertion(t, ctx).map(|x| { let loc = x.loc; x.map(|v| Command::Assertion(At { value: v, loc })) }),
        _ if is_module_item_head(head.ty) => {
            // A bare module at the top of a script.
            ctx.begin_module();
            let items = read_module_items(t, ctx);
            ctx.module_names.new_unbound();
            Some(At::synthetic(Command::ScriptModule(At::synthetic(
                ScriptModule {
                    name: None,
                    kind: ScriptModuleKind::Text(items),
                },
            ))))
        }
        _ => {
            ctx.errors.report(
                Some(head.loc),
                ErrorKind::UnexpectedToken,
                format!("expected a command, got {:?}", head.span),
            );
            None
        }
    }
}

pub fn read_script(t: &mut Tokenizer, ctx: &mut ReadCtx) -> Script {
    let mut commands = Script::new();
    while t.peek(0, &mut ctx.errors).ty == TokenType::Lpar {
        match read_command(t, ctx) {
            Some(command) => commands.push(command),
            None => sync_to_rpar(t, ctx),
        }
    }
    commands
}
