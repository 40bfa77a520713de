use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

use crate::features::Features;
use crate::span::{At, OptAt};

/// Index into one of a module's index spaces.
pub type Index = u32;

/// Lane selectors of `i8x16.shuffle`.
pub type ShuffleImmediate = [u8; 16];

/// The non-reference value types. The wire value is the low 7 bits of the
/// SLEB128 encoding (e.g. `i32` = -0x01 = 0x7f).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NumericType {
    I32,
    I64,
    F32,
    F64,
    V128,
}

impl NumericType {
    pub fn from_raw(value: u8, features: Features) -> Option<Self> {
        match value {
            0x7f => Some(Self::I32),
            0x7e => Some(Self::I64),
            0x7d => Some(Self::F32),
            0x7c => Some(Self::F64),
            0x7b if features.contains(Features::SIMD) => Some(Self::V128),
            _ => None,
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            Self::I32 => 0x7f,
            Self::I64 => 0x7e,
            Self::F32 => 0x7d,
            Self::F64 => 0x7c,
            Self::V128 => 0x7b,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::V128 => "v128",
        }
    }
}

/// Abbreviated reference types (`funcref` etc.), as opposed to the long
/// `(ref null? <heaptype>)` form of the function-references proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReferenceKind {
    Funcref,
    Externref,
    Exnref,
}

impl ReferenceKind {
    /// `allow_funcref` covers positions that accepted `funcref` before the
    /// reference-types proposal (table element types).
    pub fn from_raw(value: u8, features: Features, allow_funcref: bool) -> Option<Self> {
        match value {
            0x70 if allow_funcref || features.contains(Features::REFERENCE_TYPES) => {
                Some(Self::Funcref)
            }
            0x6f if features.contains(Features::REFERENCE_TYPES) => Some(Self::Externref),
            0x68 if features.contains(Features::EXCEPTIONS) => Some(Self::Exnref),
            _ => None,
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            Self::Funcref => 0x70,
            Self::Externref => 0x6f,
            Self::Exnref => 0x68,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::Funcref => "funcref",
            Self::Externref => "externref",
            Self::Exnref => "exnref",
        }
    }
}

/// Heap type kinds of the function-references proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HeapKind {
    Func,
    Extern,
    Exn,
}

impl HeapKind {
    pub fn from_raw(value: u8, features: Features) -> Option<Self> {
        match value {
            0x70 => Some(Self::Func),
            0x6f if features.contains(Features::REFERENCE_TYPES) => Some(Self::Extern),
            0x68 if features.contains(Features::EXCEPTIONS) => Some(Self::Exn),
            _ => None,
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            Self::Func => 0x70,
            Self::Extern => 0x6f,
            Self::Exn => 0x68,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::Func => "func",
            Self::Extern => "extern",
            Self::Exn => "exn",
        }
    }
}

/// Packed storage types of the GC proposal. Only spellable in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PackedType {
    I8,
    I16,
}

impl PackedType {
    pub fn text(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
        }
    }
}

/// What an import/export refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExternalKind {
    Function,
    Table,
    Memory,
    Global,
    Event,
}

impl ExternalKind {
    pub fn from_raw(value: u8, features: Features) -> Option<Self> {
        match value {
            0 => Some(Self::Function),
            1 => Some(Self::Table),
            2 => Some(Self::Memory),
            3 => Some(Self::Global),
            4 if features.contains(Features::EXCEPTIONS) => Some(Self::Event),
            _ => None,
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            Self::Function => 0,
            Self::Table => 1,
            Self::Memory => 2,
            Self::Global => 3,
            Self::Event => 4,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::Function => "func",
            Self::Table => "table",
            Self::Memory => "memory",
            Self::Global => "global",
            Self::Event => "event",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum Mutability {
    Const = 0,
    Var = 1,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum EventAttribute {
    Exception = 0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SegmentType {
    Active,
    Passive,
    Declared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Shared {
    No,
    Yes,
}

/// Nullability of a long-form reference type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Null {
    No,
    Yes,
}

/// Table and memory size bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Limits {
    pub min: At<u32>,
    pub max: OptAt<u32>,
    pub shared: At<Shared>,
}

impl Limits {
    pub fn new(min: At<u32>) -> Self {
        Self {
            min,
            max: None,
            shared: At::synthetic(Shared::No),
        }
    }

    pub fn with_max(min: At<u32>, max: OptAt<u32>) -> Self {
        Self {
            min,
            max,
            shared: At::synthetic(Shared::No),
        }
    }

    pub fn shared(min: At<u32>, max: OptAt<u32>, shared: At<Shared>) -> Self {
        Self { min, max, shared }
    }
}
