use std::fmt;

use serde::Serialize;

/// 128-bit SIMD value, stored as its little-endian byte image.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct V128(pub [u8; 16]);

macro_rules! v128_lanes {
    ($from:ident, $as:ident, $ty:ty, $lanes:literal) => {
        pub fn $from(lanes: [$ty; $lanes]) -> Self {
            let mut bytes = [0u8; 16];
            let size = std::mem::size_of::<$ty>();
            for (i, lane) in lanes.iter().enumerate() {
                bytes[i * size..(i + 1) * size].copy_from_slice(&lane.to_le_bytes());
            }
            Self(bytes)
        }

        pub fn $as(&self) -> [$ty; $lanes] {
            let mut lanes = [<$ty>::default(); $lanes];
            let size = std::mem::size_of::<$ty>();
            for (i, lane) in lanes.iter_mut().enumerate() {
                *lane = <$ty>::from_le_bytes(
                    self.0[i * size..(i + 1) * size].try_into().unwrap(),
                );
            }
            lanes
        }
    };
}

impl V128 {
    pub fn from_raw(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn into_raw(self) -> [u8; 16] {
        self.0
    }

    v128_lanes!(from_i8x16, as_i8x16, i8, 16);
    v128_lanes!(from_u8x16, as_u8x16, u8, 16);
    v128_lanes!(from_i16x8, as_i16x8, i16, 8);
    v128_lanes!(from_i32x4, as_i32x4, i32, 4);
    v128_lanes!(from_i64x2, as_i64x2, i64, 2);
    v128_lanes!(from_f32x4, as_f32x4, f32, 4);
    v128_lanes!(from_f64x2, as_f64x2, f64, 2);
}

impl fmt::Debug for V128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [lo, hi] = self.as_i64x2();
        write!(f, "V128(0x{:016x}_{:016x})", hi as u64, lo as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_round_trip() {
        let v = V128::from_i32x4([1, -2, 3, -4]);
        assert_eq!(v.as_i32x4(), [1, -2, 3, -4]);

        let v = V128::from_f64x2([1.5, -0.25]);
        assert_eq!(v.as_f64x2(), [1.5, -0.25]);
    }

    #[test]
    fn byte_order_is_little_endian() {
        let v = V128::from_i32x4([0x0403_0201, 0, 0, 0]);
        assert_eq!(&v.into_raw()[..4], &[1, 2, 3, 4]);
    }
}
