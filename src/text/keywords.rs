//! Keyword classification for the tokenizer. Structural and script
//! keywords live in a static perfect-hash table; instruction spellings
//! come from the opcode catalog; numeric types, reference kinds, heap
//! kinds, and SIMD shapes are enumerated here.

use phf::phf_map;

use crate::opcode::Opcode;
use crate::types::{HeapKind, NumericType, ReferenceKind};

use super::tokens::{OpcodeInfo, SimdShape, TokenImmediate, TokenType};

static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "module" => TokenType::Module,
    "func" => TokenType::Func,
    "type" => TokenType::Type,
    "param" => TokenType::Param,
    "result" => TokenType::Result,
    "local" => TokenType::Local,
    "global" => TokenType::Global,
    "table" => TokenType::Table,
    "memory" => TokenType::Memory,
    "elem" => TokenType::Elem,
    "data" => TokenType::Data,
    "event" => TokenType::Event,
    "import" => TokenType::Import,
    "export" => TokenType::Export,
    "start" => TokenType::Start,
    "offset" => TokenType::Offset,
    "item" => TokenType::Item,
    "declare" => TokenType::Declare,
    "shared" => TokenType::Shared,
    "mut" => TokenType::Mut,
    "then" => TokenType::Then,
    "do" => TokenType::Do,
    "ref" => TokenType::Ref,
    "null" => TokenType::Null,
    "binary" => TokenType::Binary,
    "quote" => TokenType::Quote,
    "register" => TokenType::Register,
    "invoke" => TokenType::Invoke,
    "get" => TokenType::Get,
    "assert_malformed" => TokenType::AssertMalformed,
    "assert_invalid" => TokenType::AssertInvalid,
    "assert_unlinkable" => TokenType::AssertUnlinkable,
    "assert_trap" => TokenType::AssertTrap,
    "assert_return" => TokenType::AssertReturn,
    "assert_exhaustion" => TokenType::AssertExhaustion,
    "nan:canonical" => TokenType::NanCanonical,
    "nan:arithmetic" => TokenType::NanArithmetic,
    "ref.extern" => TokenType::RefExtern,
};

fn opcode_token_type(opcode: Opcode) -> TokenType {
    match opcode {
        Opcode::Block | Opcode::Loop | Opcode::If | Opcode::Try | Opcode::Let => {
            TokenType::BlockInstr
        }
        Opcode::Else => TokenType::Else,
        Opcode::End => TokenType::End,
        Opcode::Catch => TokenType::Catch,
        _ => TokenType::PlainInstr,
    }
}

/// Classifies a bare word. Returns `None` when the word is not a keyword
/// of any kind (the tokenizer then tries numeric literal syntax).
pub fn classify(word: &str) -> Option<(TokenType, TokenImmediate)> {
    if let Some(&ty) = KEYWORDS.get(word) {
        return Some((ty, TokenImmediate::None));
    }

    if let Some(opcode) = Opcode::from_text(word) {
        return Some((
            opcode_token_type(opcode),
            TokenImmediate::Opcode(OpcodeInfo {
                opcode,
                features: opcode.features(),
            }),
        ));
    }

    let numeric = match word {
        "i32" => Some(NumericType::I32),
        "i64" => Some(NumericType::I64),
        "f32" => Some(NumericType::F32),
        "f64" => Some(NumericType::F64),
        "v128" => Some(NumericType::V128),
        _ => None,
    };
    if let Some(ty) = numeric {
        return Some((TokenType::NumericType, TokenImmediate::NumericType(ty)));
    }

    let reference = match word {
        "funcref" => Some(ReferenceKind::Funcref),
        // Deprecated pre-reference-types spelling.
        "anyfunc" => Some(ReferenceKind::Funcref),
        "externref" => Some(ReferenceKind::Externref),
        "exnref" => Some(ReferenceKind::Exnref),
        _ => None,
    };
    if let Some(kind) = reference {
        return Some((TokenType::ReferenceKind, TokenImmediate::ReferenceKind(kind)));
    }

    let heap = match word {
        "extern" => Some(HeapKind::Extern),
        "exn" => Some(HeapKind::Exn),
        _ => None,
    };
    if let Some(kind) = heap {
        return Some((TokenType::HeapKind, TokenImmediate::HeapKind(kind)));
    }

    let shape = match word {
        "i8x16" => Some(SimdShape::I8X16),
        "i16x8" => Some(SimdShape::I16X8),
        "i32x4" => Some(SimdShape::I32X4),
        "i64x2" => Some(SimdShape::I64X2),
        "f32x4" => Some(SimdShape::F32X4),
        "f64x2" => Some(SimdShape::F64X2),
        _ => None,
    };
    if let Some(shape) = shape {
        return Some((TokenType::SimdShape, TokenImmediate::SimdShape(shape)));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Features;

    #[test]
    fn structural_keywords() {
        assert_eq!(classify("module"), Some((TokenType::Module, TokenImmediate::None)));
        assert_eq!(classify("func"), Some((TokenType::Func, TokenImmediate::None)));
        assert_eq!(classify("not_a_keyword"), None);
    }

    #[test]
    fn instruction_keywords_carry_opcode() {
        let (ty, imm) = classify("i32.add").unwrap();
        assert_eq!(ty, TokenType::PlainInstr);
        assert_eq!(
            imm,
            TokenImmediate::Opcode(OpcodeInfo {
                opcode: Opcode::I32Add,
                features: Features::empty(),
            })
        );

        let (ty, _) = classify("block").unwrap();
        assert_eq!(ty, TokenType::BlockInstr);
        let (ty, _) = classify("end").unwrap();
        assert_eq!(ty, TokenType::End);
    }

    #[test]
    fn legacy_instruction_spellings_classify() {
        let (ty, imm) = classify("get_local").unwrap();
        assert_eq!(ty, TokenType::PlainInstr);
        match imm {
            TokenImmediate::Opcode(info) => assert_eq!(info.opcode, Opcode::LocalGet),
            _ => panic!("expected opcode immediate"),
        }
    }

    #[test]
    fn type_words() {
        assert_eq!(
            classify("i32"),
            Some((TokenType::NumericType, TokenImmediate::NumericType(NumericType::I32)))
        );
        assert_eq!(
            classify("anyfunc"),
            Some((
                TokenType::ReferenceKind,
                TokenImmediate::ReferenceKind(ReferenceKind::Funcref)
            ))
        );
        assert_eq!(
            classify("i8x16"),
            Some((TokenType::SimdShape, TokenImmediate::SimdShape(SimdShape::I8X16)))
        );
    }
}
