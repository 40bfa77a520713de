use crate::binary;
use crate::binary::types::{BlockType, ElementList, Immediate, Module};
use crate::convert;
use crate::features::Features;
use crate::opcode::Opcode;
use crate::text;
use crate::text::lexer::Tokenizer;
use crate::types::SegmentType;

fn read_text_module(source: &str, features: Features) -> (text::types::Module, text::ReadCtx) {
    let mut ctx = text::ReadCtx::new(features);
    let mut tokenizer = Tokenizer::new(source);
    let module = text::read::read_module(&mut tokenizer, &mut ctx).unwrap();
    assert!(
        ctx.errors.is_empty(),
        "unexpected errors: {:?}",
        ctx.errors.iter().collect::<Vec<_>>()
    );
    (module, ctx)
}

fn text_to_binary(source: &str, features: Features) -> Module {
    let (module, mut ctx) = read_text_module(source, features);
    let binary = convert::to_binary(&module, &mut ctx);
    assert!(
        ctx.errors.is_empty(),
        "unexpected errors: {:?}",
        ctx.errors.iter().collect::<Vec<_>>()
    );
    binary
}

fn decode(bytes: &[u8], features: Features) -> Module {
    let mut ctx = binary::ReadCtx::new(features);
    let module = binary::read_module(bytes, &mut ctx).unwrap();
    assert!(
        ctx.errors.is_empty(),
        "unexpected errors: {:?}",
        ctx.errors.iter().collect::<Vec<_>>()
    );
    module
}

#[test]
fn empty_module_round_trip() {
    let binary = text_to_binary("(module)", Features::default());
    assert_eq!(binary, Module::default());

    let bytes = binary::write_module(&binary);
    assert_eq!(bytes, b"\0asm\x01\0\0\0");

    let decoded = decode(&bytes, Features::default());
    assert_eq!(decoded, binary);
}

const ADD_MODULE_TEXT: &str = r#"(module
  (func (export "add") (param i32 i32) (result i32)
    local.get 0
    local.get 1
    i32.add))"#;

const ADD_MODULE_BYTES: &[u8] = &[
    0x00, 0x61, 0x73, 0x6d, // magic
    0x01, 0x00, 0x00, 0x00, // version
    0x01, 0x07, // type section
    0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f, // [(i32, i32) -> (i32)]
    0x03, 0x02, // function section
    0x01, 0x00, // [type 0]
    0x07, 0x07, // export section
    0x01, 0x03, 0x61, 0x64, 0x64, 0x00, 0x00, // [("add", func, 0)]
    0x0a, 0x09, // code section
    0x01, 0x07, 0x00, // one body, no locals
    0x20, 0x00, // local.get 0
    0x20, 0x01, // local.get 1
    0x6a, // i32.add
    0x0b, // end
];

#[test]
fn single_function_encodes_to_expected_bytes() {
    let binary = text_to_binary(ADD_MODULE_TEXT, Features::default());
    assert_eq!(binary.types.len(), 1);
    assert_eq!(binary.functions.len(), 1);
    assert_eq!(binary.functions[0].type_index.value, 0);
    assert_eq!(binary.exports[0].name.value, "add");

    let bytes = binary::write_module(&binary);
    assert_eq!(bytes, ADD_MODULE_BYTES);
}

#[test]
fn binary_round_trip_is_byte_exact() {
    let decoded = decode(ADD_MODULE_BYTES, Features::default());
    let encoded = binary::write_module(&decoded);
    assert_eq!(encoded, ADD_MODULE_BYTES);
}

#[test]
fn cross_dialect_equality() {
    // decode(encode(convert(read(T)))) must be structurally equal to
    // convert(read(T)); locations never participate in equality.
    let converted = text_to_binary(ADD_MODULE_TEXT, Features::default());
    let decoded = decode(&binary::write_module(&converted), Features::default());
    assert_eq!(converted, decoded);
}

#[test]
fn folded_and_plain_forms_are_equivalent() {
    let plain = text_to_binary(
        "(module (func (result i32) i32.const 1 i32.const 2 i32.add))",
        Features::default(),
    );
    let folded = text_to_binary(
        "(module (func (result i32) (i32.add (i32.const 1) (i32.const 2))))",
        Features::default(),
    );
    assert_eq!(plain, folded);
}

#[test]
fn folded_if_reorders_condition() {
    let folded = text_to_binary(
        "(module (func (if (i32.const 1) (then nop) (else nop))))",
        Features::default(),
    );
    let plain = text_to_binary(
        "(module (func i32.const 1 if nop else nop end))",
        Features::default(),
    );
    assert_eq!(folded, plain);
}

#[test]
fn block_type_multi_value_uses_type_index() {
    let binary = text_to_binary(
        "(module
          (type $t (func (param i32) (result i32 i32)))
          (func (param i32)
            local.get 0
            block (type $t)
              drop
            end
            drop))",
        Features::default(),
    );
    let block = binary.codes[0]
        .body
        .iter()
        .find(|instr| instr.opcode.value == Opcode::Block)
        .unwrap();
    assert_eq!(
        block.immediate,
        Immediate::BlockType(crate::span::At::synthetic(BlockType::Index(0)))
    );
}

#[test]
fn block_with_single_result_uses_value_encoding() {
    let binary = text_to_binary(
        "(module (func (result i32) block (result i32) i32.const 1 end))",
        Features::default(),
    );
    let block = binary.codes[0]
        .body
        .iter()
        .find(|instr| instr.opcode.value == Opcode::Block)
        .unwrap();
    assert_eq!(
        block.immediate,
        Immediate::BlockType(crate::span::At::synthetic(BlockType::Value(
            binary::types::ValueType::I32
        )))
    );
}

#[test]
fn declared_element_segment() {
    let features = Features::default().with(Features::REFERENCE_TYPES);
    let binary = text_to_binary("(module (func $f) (elem declare func $f))", features);
    let segment = &binary.element_segments[0].value;
    assert_eq!(segment.segment_type, SegmentType::Declared);
    match &segment.elements {
        ElementList::Indexes(list) => {
            assert_eq!(list.list.len(), 1);
            assert_eq!(list.list[0].value, 0);
        }
        _ => panic!("expected index list"),
    }

    // Declared segments survive a binary round trip.
    let bytes = binary::write_module(&binary);
    let mut ctx = binary::ReadCtx::new(features);
    let decoded = binary::read_module(&bytes, &mut ctx).unwrap();
    assert!(ctx.errors.is_empty());
    assert_eq!(decoded, binary);
}

#[test]
fn nan_payload_and_canonical_nan_encode_identically() {
    let payload = text_to_binary(
        "(module (func (result f32) f32.const nan:0x400000))",
        Features::default(),
    );
    let canonical = text_to_binary(
        "(module (func (result f32) f32.const nan))",
        Features::default(),
    );
    let payload_bytes = binary::write_module(&payload);
    let canonical_bytes = binary::write_module(&canonical);
    assert_eq!(payload_bytes, canonical_bytes);

    let needle: &[u8] = &[0x43, 0x00, 0x00, 0xc0, 0x7f];
    assert!(
        payload_bytes.windows(needle.len()).any(|w| w == needle),
        "f32.const nan:0x400000 must encode as 43 00 00 c0 7f"
    );
}

#[test]
fn nan_payload_round_trips_through_binary() {
    let binary = text_to_binary(
        "(module (func (result f32) f32.const nan:0x123456))",
        Features::default(),
    );
    let bytes = binary::write_module(&binary);
    let decoded = decode(&bytes, Features::default());
    assert_eq!(decoded, binary);
}

#[test]
fn inline_table_element_segment_desugars() {
    let binary = text_to_binary(
        "(module (func $f) (table $t funcref (elem $f $f)))",
        Features::default(),
    );
    assert_eq!(binary.tables.len(), 1);
    let limits = &binary.tables[0].table_type.limits.value;
    assert_eq!(limits.min.value, 2);
    assert_eq!(limits.max.as_ref().unwrap().value, 2);

    let segment = &binary.element_segments[0].value;
    assert_eq!(segment.segment_type, SegmentType::Active);
    assert_eq!(segment.table_index.as_ref().unwrap().value, 0);
    match &segment.elements {
        ElementList::Indexes(list) => assert_eq!(list.list.len(), 2),
        _ => panic!("expected index list"),
    }
}

#[test]
fn inline_memory_data_desugars() {
    let binary = text_to_binary(r#"(module (memory (data "hello")))"#, Features::default());
    assert_eq!(binary.memories.len(), 1);
    assert_eq!(
        binary.memories[0].memory_type.limits.min.value, 1,
        "five bytes round up to one page"
    );
    assert_eq!(binary.data_segments[0].init, b"hello");
}

#[test]
fn inline_imports_desugar_to_imports() {
    let binary = text_to_binary(
        r#"(module (func $f (import "env" "f") (param i32)))"#,
        Features::default(),
    );
    assert!(binary.functions.is_empty());
    assert_eq!(binary.imports.len(), 1);
    assert_eq!(binary.imports[0].module.value, "env");
    assert_eq!(binary.imports[0].name.value, "f");
}

#[test]
fn import_after_non_import_is_reported_but_processed() {
    let mut ctx = text::ReadCtx::new(Features::default());
    let mut tokenizer = Tokenizer::new(r#"(module (func) (import "env" "f" (func)))"#);
    let module = text::read::read_module(&mut tokenizer, &mut ctx).unwrap();
    assert!(ctx.errors.has_kind(crate::ErrorKind::ImportAfterNonImport));
    // The import was still recorded.
    assert_eq!(module.len(), 2);
}

#[test]
fn multiple_start_sections_are_reported() {
    let mut ctx = text::ReadCtx::new(Features::default());
    let mut tokenizer = Tokenizer::new("(module (func $f) (start $f) (start $f))");
    let _ = text::read::read_module(&mut tokenizer, &mut ctx);
    assert!(ctx.errors.has_kind(crate::ErrorKind::MultipleStart));
}

#[test]
fn end_label_mismatch_is_reported() {
    let mut ctx = text::ReadCtx::new(Features::default());
    let mut tokenizer = Tokenizer::new("(module (func block $a nop end $b))");
    let _ = text::read::read_module(&mut tokenizer, &mut ctx);
    assert!(ctx.errors.has_kind(crate::ErrorKind::UnexpectedToken));
}

#[test]
fn labels_resolve_to_block_depth() {
    let binary = text_to_binary(
        "(module (func
          block $outer
            block $inner
              br $outer
              br $inner
            end
          end))",
        Features::default(),
    );
    let branches: Vec<u32> = binary.codes[0]
        .body
        .iter()
        .filter(|instr| instr.opcode.value == Opcode::Br)
        .map(|instr| match &instr.immediate {
            Immediate::Index(index) => index.value,
            _ => panic!("expected an index"),
        })
        .collect();
    assert_eq!(branches, vec![1, 0]);
}

#[test]
fn memarg_defaults_to_natural_alignment() {
    let binary = text_to_binary(
        "(module (memory 1) (func
          i32.const 0
          i32.load
          drop
          i32.const 0
          i32.load8_u offset=4
          drop
          i32.const 0
          i32.load align=1
          drop))",
        Features::default(),
    );
    let memargs: Vec<(u32, u32)> = binary.codes[0]
        .body
        .iter()
        .filter_map(|instr| match &instr.immediate {
            Immediate::MemArg(memarg) => Some((memarg.align_log2.value, memarg.offset.value)),
            _ => None,
        })
        .collect();
    // i32.load natural align 4 (log2 2); i32.load8_u natural 1 (log2 0);
    // explicit align=1 is log2 0.
    assert_eq!(memargs, vec![(2, 0), (0, 4), (0, 0)]);
}

#[test]
fn locals_are_run_length_encoded() {
    let binary = text_to_binary(
        "(module (func (local $a i32) (local $b i32) (local f32)))",
        Features::default(),
    );
    let locals = &binary.codes[0].locals;
    assert_eq!(locals.len(), 2);
    assert_eq!(locals[0].count.value, 2);
    assert_eq!(locals[1].count.value, 1);
}

#[test]
fn named_locals_resolve_through_name_map() {
    let binary = text_to_binary(
        "(module (func (param $x i32) (local $y i32)
          local.get $x
          local.get $y
          drop
          drop))",
        Features::default(),
    );
    let gets: Vec<u32> = binary.codes[0]
        .body
        .iter()
        .filter(|instr| instr.opcode.value == Opcode::LocalGet)
        .map(|instr| match &instr.immediate {
            Immediate::Index(index) => index.value,
            _ => panic!("expected an index"),
        })
        .collect();
    assert_eq!(gets, vec![0, 1]);
}

#[test]
fn deferred_types_number_after_explicit_ones() {
    let binary = text_to_binary(
        "(module
          (type (func))
          (func (param i32))
          (func))",
        Features::default(),
    );
    // (func) matches the explicit ()->() type; (param i32) defers.
    assert_eq!(binary.types.len(), 2);
    assert_eq!(binary.functions[0].type_index.value, 1);
    assert_eq!(binary.functions[1].type_index.value, 0);
}

#[test]
fn typed_select_switches_opcode() {
    let features = Features::default().with(Features::REFERENCE_TYPES);
    let binary = text_to_binary(
        "(module (func (result i32) i32.const 1 i32.const 2 i32.const 0 select (result i32)))",
        features,
    );
    let select = binary.codes[0]
        .body
        .iter()
        .find(|instr| matches!(instr.opcode.value, Opcode::Select | Opcode::SelectT))
        .unwrap();
    assert_eq!(select.opcode.value, Opcode::SelectT);
}

#[test]
fn script_with_module_and_assertions() {
    let source = r#"
        (module
          (func (export "three") (result i32)
            i32.const 3))
        (assert_return (invoke "three") (i32.const 3))
        (assert_malformed (module quote "(func") "unexpected end")
    "#;
    let mut ctx = text::ReadCtx::new(Features::default());
    let mut tokenizer = Tokenizer::new(source);
    let script = text::read::read_script(&mut tokenizer, &mut ctx);
    assert!(
        ctx.errors.is_empty(),
        "unexpected errors: {:?}",
        ctx.errors.iter().collect::<Vec<_>>()
    );
    assert_eq!(script.len(), 3);
    assert!(matches!(
        script[0].value,
        text::types::Command::ScriptModule(_)
    ));
    assert!(matches!(script[1].value, text::types::Command::Assertion(_)));
    assert!(matches!(script[2].value, text::types::Command::Assertion(_)));
}

#[test]
fn custom_sections_survive_round_trip() {
    // A custom section between two known sections.
    let mut bytes = b"\0asm\x01\0\0\0".to_vec();
    bytes.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]); // type section
    bytes.extend_from_slice(&[0x00, 0x03, 0x01, b'x', 0xff]); // custom "x"
    bytes.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]); // function section
    bytes.extend_from_slice(&[0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b]); // code section

    let decoded = decode(&bytes, Features::default());
    assert_eq!(decoded.custom_sections.len(), 1);
    let encoded = binary::write_module(&decoded);
    assert_eq!(encoded, bytes);
}

#[test]
fn feature_gated_text_instruction_reports_but_parses() {
    let mut ctx = text::ReadCtx::new(Features::none());
    let mut tokenizer = Tokenizer::new("(module (func i32.extend8_s))");
    let module = text::read::read_module(&mut tokenizer, &mut ctx).unwrap();
    assert!(ctx.errors.has_kind(crate::ErrorKind::FeatureDisabled));
    // Best-effort recovery: the instruction is still present.
    match &module[0].value {
        text::types::ModuleItem::Function(func) => {
            assert_eq!(func.value.instructions.len(), 1);
        }
        _ => panic!("expected a function"),
    }
}

#[test]
fn table_ops_require_a_table_operand() {
    let features = Features::default().with(Features::REFERENCE_TYPES);

    // A bare table.get is a parse error, unlike memory.size.
    let mut ctx = text::ReadCtx::new(features);
    let mut tokenizer = Tokenizer::new("(module (table $t 1 funcref) (func table.get))");
    let _ = text::read::read_module(&mut tokenizer, &mut ctx);
    assert!(ctx.errors.has_kind(crate::ErrorKind::UnexpectedToken));

    let binary = text_to_binary(
        "(module (table $t 1 funcref) (func (param i32)
          local.get 0
          table.get $t
          drop))",
        features,
    );
    let get = binary.codes[0]
        .body
        .iter()
        .find(|instr| instr.opcode.value == Opcode::TableGet)
        .unwrap();
    assert_eq!(
        get.immediate,
        Immediate::Index(crate::span::At::synthetic(0))
    );
}

#[test]
fn call_indirect_table_operand_is_gated_on_reference_types() {
    // Under MVP features the table operand is not grammatical, so the
    // stray token trips the enclosing parser.
    let mut ctx = text::ReadCtx::new(Features::default());
    let mut tokenizer =
        Tokenizer::new("(module (table 1 funcref) (func i32.const 0 call_indirect 0))");
    let _ = text::read::read_module(&mut tokenizer, &mut ctx);
    assert!(ctx.errors.has_kind(crate::ErrorKind::UnexpectedToken));

    // With reference-types enabled the same text parses and resolves.
    let features = Features::default().with(Features::REFERENCE_TYPES);
    let binary = text_to_binary(
        "(module (table 1 funcref) (func i32.const 0 call_indirect 0))",
        features,
    );
    let call = binary.codes[0]
        .body
        .iter()
        .find(|instr| instr.opcode.value == Opcode::CallIndirect)
        .unwrap();
    match &call.immediate {
        Immediate::CallIndirect(imm) => assert_eq!(imm.table_index.value, 0),
        _ => panic!("expected a call_indirect immediate"),
    }
}

#[test]
fn legacy_spellings_parse_to_canonical_opcodes() {
    let legacy = text_to_binary(
        "(module (func (param i32) (result i32) get_local 0))",
        Features::default(),
    );
    let canonical = text_to_binary(
        "(module (func (param i32) (result i32) local.get 0))",
        Features::default(),
    );
    assert_eq!(legacy, canonical);
}
