//! Wire-level flag byte tables and their inverses. Kept separate from the
//! readers so the encoder shares the exact same tables.

use crate::features::Features;
use crate::types::{SegmentType, Shared};

use super::types::SectionId;

/// `i32` value of a one-byte SLEB128 encoding (e.g. 0x40 encodes -64).
pub fn sleb_byte_to_s32(byte: u8) -> i32 {
    ((byte as i32) << 25) >> 25
}

/// Low seven bits of the SLEB128 encoding of a small negative value.
pub fn s32_to_sleb_byte(value: i32) -> u8 {
    (value as u32 & 0x7f) as u8
}

/// The one-byte block type encoding for "no result".
pub const BLOCK_TYPE_VOID: u8 = 0x40;

pub mod limits_flags {
    pub const NO_MAX: u8 = 0;
    pub const HAS_MAX: u8 = 1;
    pub const HAS_MAX_AND_SHARED: u8 = 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedLimitsFlags {
    pub has_max: bool,
    pub shared: Shared,
}

impl DecodedLimitsFlags {
    pub fn decode(flags: u8, features: Features) -> Option<Self> {
        match flags {
            limits_flags::NO_MAX => Some(Self {
                has_max: false,
                shared: Shared::No,
            }),
            limits_flags::HAS_MAX => Some(Self {
                has_max: true,
                shared: Shared::No,
            }),
            limits_flags::HAS_MAX_AND_SHARED if features.contains(Features::THREADS) => {
                Some(Self {
                    has_max: true,
                    shared: Shared::Yes,
                })
            }
            _ => None,
        }
    }

    pub fn encode(self) -> u8 {
        match (self.has_max, self.shared) {
            (false, _) => limits_flags::NO_MAX,
            (true, Shared::No) => limits_flags::HAS_MAX,
            (true, Shared::Yes) => limits_flags::HAS_MAX_AND_SHARED,
        }
    }
}

pub mod data_segment_flags {
    pub const ACTIVE_INDEX0: u32 = 0;
    pub const PASSIVE: u32 = 1;
    pub const ACTIVE_WITH_INDEX: u32 = 2;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedDataSegmentFlags {
    pub segment_type: SegmentType,
    pub has_non_zero_index: bool,
}

impl DecodedDataSegmentFlags {
    pub fn mvp() -> Self {
        Self {
            segment_type: SegmentType::Active,
            has_non_zero_index: false,
        }
    }

    pub fn decode(flags: u32) -> Option<Self> {
        match flags {
            data_segment_flags::ACTIVE_INDEX0 => Some(Self::mvp()),
            data_segment_flags::PASSIVE => Some(Self {
                segment_type: SegmentType::Passive,
                has_non_zero_index: false,
            }),
            data_segment_flags::ACTIVE_WITH_INDEX => Some(Self {
                segment_type: SegmentType::Active,
                has_non_zero_index: true,
            }),
            _ => None,
        }
    }

    pub fn encode(self) -> u8 {
        match self.segment_type {
            SegmentType::Active if self.has_non_zero_index => {
                data_segment_flags::ACTIVE_WITH_INDEX as u8
            }
            SegmentType::Active => data_segment_flags::ACTIVE_INDEX0 as u8,
            _ => data_segment_flags::PASSIVE as u8,
        }
    }
}

pub mod elem_segment_flags {
    pub const PASSIVE: u32 = 1;
    pub const HAS_NON_ZERO_INDEX: u32 = 2;
    pub const DECLARED: u32 = 3;
    pub const HAS_EXPRESSIONS: u32 = 4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedElemSegmentFlags {
    pub segment_type: SegmentType,
    pub has_non_zero_index: bool,
    pub has_expressions: bool,
}

impl DecodedElemSegmentFlags {
    pub fn mvp() -> Self {
        Self {
            segment_type: SegmentType::Active,
            has_non_zero_index: false,
            has_expressions: false,
        }
    }

    /// The MVP `(table 0, funcref index list)` shape.
    pub fn is_legacy_active(self) -> bool {
        self.segment_type == SegmentType::Active && !self.has_non_zero_index
    }

    pub fn decode(flags: u32, features: Features) -> Option<Self> {
        use elem_segment_flags::*;
        let decoded = match flags {
            0 => Self::mvp(),
            PASSIVE => Self {
                segment_type: SegmentType::Passive,
                has_non_zero_index: false,
                has_expressions: false,
            },
            HAS_NON_ZERO_INDEX => Self {
                segment_type: SegmentType::Active,
                has_non_zero_index: true,
                has_expressions: false,
            },
            DECLARED => Self {
                segment_type: SegmentType::Declared,
                has_non_zero_index: false,
                has_expressions: false,
            },
            HAS_EXPRESSIONS => Self {
                segment_type: SegmentType::Active,
                has_non_zero_index: false,
                has_expressions: true,
            },
            f if f == PASSIVE | HAS_EXPRESSIONS => Self {
                segment_type: SegmentType::Passive,
                has_non_zero_index: false,
                has_expressions: true,
            },
            f if f == HAS_NON_ZERO_INDEX | HAS_EXPRESSIONS => Self {
                segment_type: SegmentType::Active,
                has_non_zero_index: true,
                has_expressions: true,
            },
            f if f == DECLARED | HAS_EXPRESSIONS => Self {
                segment_type: SegmentType::Declared,
                has_non_zero_index: false,
                has_expressions: true,
            },
            _ => return None,
        };
        if decoded.segment_type == SegmentType::Declared
            && !features.contains(Features::REFERENCE_TYPES)
        {
            return None;
        }
        Some(decoded)
    }

    pub fn encode(self) -> u8 {
        use elem_segment_flags::*;
        let mut result = 0;
        match self.segment_type {
            SegmentType::Active => {}
            SegmentType::Passive => result |= PASSIVE,
            SegmentType::Declared => result |= DECLARED,
        }
        if self.has_non_zero_index {
            result |= HAS_NON_ZERO_INDEX;
        }
        if self.has_expressions {
            result |= HAS_EXPRESSIONS;
        }
        result as u8
    }
}

impl SectionId {
    pub fn decode(value: u32, features: Features) -> Option<Self> {
        let id = u8::try_from(value).ok()?;
        let id = SectionId::try_from(id).ok()?;
        match id {
            SectionId::DataCount if !features.contains(Features::BULK_MEMORY) => None,
            SectionId::Event if !features.contains(Features::EXCEPTIONS) => None,
            _ => Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleb_byte_conversions() {
        assert_eq!(sleb_byte_to_s32(0x40), -64);
        assert_eq!(sleb_byte_to_s32(0x7f), -1);
        assert_eq!(s32_to_sleb_byte(-64), 0x40);
        assert_eq!(s32_to_sleb_byte(-1), 0x7f);
    }

    #[test]
    fn limits_flags_table() {
        let mvp = Features::none();
        let threads = Features::none().with(Features::THREADS);
        assert_eq!(
            DecodedLimitsFlags::decode(0, mvp),
            Some(DecodedLimitsFlags {
                has_max: false,
                shared: Shared::No
            })
        );
        assert_eq!(DecodedLimitsFlags::decode(3, mvp), None);
        let shared = DecodedLimitsFlags::decode(3, threads).unwrap();
        assert_eq!(shared.shared, Shared::Yes);
        assert_eq!(shared.encode(), 3);
        assert_eq!(DecodedLimitsFlags::decode(2, threads), None);
    }

    #[test]
    fn data_segment_flags_round_trip() {
        for flags in 0..3u32 {
            let decoded = DecodedDataSegmentFlags::decode(flags).unwrap();
            assert_eq!(u32::from(decoded.encode()), flags);
        }
        assert_eq!(DecodedDataSegmentFlags::decode(3), None);
    }

    #[test]
    fn elem_segment_flags_round_trip() {
        let features = Features::none().with(Features::REFERENCE_TYPES);
        for flags in 0..8u32 {
            let decoded = DecodedElemSegmentFlags::decode(flags, features).unwrap();
            assert_eq!(u32::from(decoded.encode()), flags);
        }
        assert_eq!(DecodedElemSegmentFlags::decode(8, features), None);
        // Declared segments need reference-types.
        assert_eq!(DecodedElemSegmentFlags::decode(3, Features::none()), None);
    }

    #[test]
    fn section_id_gating() {
        assert_eq!(
            SectionId::decode(1, Features::none()),
            Some(SectionId::Type)
        );
        assert_eq!(SectionId::decode(12, Features::none()), None);
        assert_eq!(
            SectionId::decode(12, Features::none().with(Features::BULK_MEMORY)),
            Some(SectionId::DataCount)
        );
        assert_eq!(SectionId::decode(14, Features::all()), None);
    }
}
