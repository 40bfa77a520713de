//! Numeric literal conversion at the lexer/reader boundary: radix integer
//! decoding with underscore stripping and range checks, and float decoding
//! with a correctly-rounded hex-float path, explicit NaN payloads, and
//! infinities.

use num_traits::{PrimInt, Unsigned};

use super::tokens::{Base, LiteralInfo, LiteralKind, Sign};

fn digit_value(byte: u8) -> u32 {
    (byte as char).to_digit(16).unwrap_or(0)
}

fn is_digit(byte: u8, base: u32) -> bool {
    match base {
        10 => byte.is_ascii_digit(),
        16 => byte.is_ascii_hexdigit(),
        _ => false,
    }
}

/// Accumulates digits in `base`, skipping underscores, failing on
/// overflow: `value > max/base`, or `value == max/base` with a digit
/// greater than `max % base`.
fn accumulate<T: PrimInt + Unsigned>(span: &str, base: u32) -> Option<T> {
    let base_t = T::from(base)?;
    let max_div_base = T::max_value() / base_t;
    let max_mod_base = T::max_value() % base_t;
    let mut value = T::zero();
    let mut any = false;
    for &byte in span.as_bytes() {
        if byte == b'_' {
            continue;
        }
        if !is_digit(byte, base) {
            return None;
        }
        let digit = T::from(digit_value(byte))?;
        if value > max_div_base || (value == max_div_base && digit > max_mod_base) {
            return None;
        }
        value = value * base_t + digit;
        any = true;
    }
    any.then_some(value)
}

fn strip_sign(span: &str, sign: Sign) -> &str {
    if sign == Sign::None {
        span
    } else {
        &span[1..]
    }
}

fn strip_hex_prefix(span: &str) -> &str {
    span.strip_prefix("0x")
        .or_else(|| span.strip_prefix("0X"))
        .unwrap_or(span)
}

/// Unsigned decode of a `Nat` literal.
pub fn str_to_nat<T: PrimInt + Unsigned>(info: LiteralInfo, span: &str) -> Option<T> {
    match info.base {
        Base::Decimal => accumulate(span, 10),
        Base::Hex => accumulate(strip_hex_prefix(span), 16),
    }
}

macro_rules! str_to_int {
    ($name:ident, $uty:ty, $sty:ty) => {
        /// Signed/unsigned decode into the target's bit pattern. Unsigned
        /// spellings use the full unsigned range; signed spellings are
        /// bounded by the signed range (`|min|` for negatives, one larger
        /// than the positive max).
        pub fn $name(info: LiteralInfo, span: &str) -> Option<$uty> {
            let span = strip_sign(span, info.sign);
            let value: $uty = str_to_nat(info, span)?;
            if info.sign == Sign::None {
                return Some(value);
            }
            let max = <$sty>::MAX as $uty + if info.sign == Sign::Minus { 1 } else { 0 };
            if value > max {
                return None;
            }
            if info.sign == Sign::Minus {
                Some(value.wrapping_neg())
            } else {
                Some(value)
            }
        }
    };
}

str_to_int!(str_to_u8_bits, u8, i8);
str_to_int!(str_to_u32_bits, u32, i32);
str_to_int!(str_to_u64_bits, u64, i64);

pub fn str_to_s32(info: LiteralInfo, span: &str) -> Option<i32> {
    str_to_u32_bits(info, span).map(|bits| bits as i32)
}

pub fn str_to_s64(info: LiteralInfo, span: &str) -> Option<i64> {
    str_to_u64_bits(info, span).map(|bits| bits as i64)
}

struct FloatSpec {
    mantissa_bits: u32,
    exp_bias: i32,
    exp_max: i32,
}

const F32_SPEC: FloatSpec = FloatSpec {
    mantissa_bits: 23,
    exp_bias: 127,
    exp_max: 127,
};

const F64_SPEC: FloatSpec = FloatSpec {
    mantissa_bits: 52,
    exp_bias: 1023,
    exp_max: 1023,
};

/// Composes `(-1)^sign * 1.sig * 2^e` (or a subnormal) into IEEE-754 bits
/// with round-to-nearest-even. `sig` holds the full significand with its
/// top bit at an arbitrary position; `exp` is the power of two of the
/// significand's least significant bit; `sticky` records truncated
/// non-zero bits below `sig`.
fn compose_bits(spec: &FloatSpec, negative: bool, sig: u128, exp: i32, sticky: bool) -> Option<u64> {
    let sign_bit = if negative {
        1u64 << (spec.mantissa_bits + if spec.mantissa_bits == 23 { 8 } else { 11 })
    } else {
        0
    };
    if sig == 0 {
        return Some(sign_bit);
    }

    let msb = 127 - sig.leading_zeros() as i32;
    // Binary exponent of the leading bit.
    let e = msb + exp;
    let exp_min = 1 - spec.exp_bias;

    // How many low bits must be dropped to leave mantissa_bits fractional
    // bits (normal) or fit the subnormal window.
    let drop = if e >= exp_min {
        msb - spec.mantissa_bits as i32
    } else {
        msb - spec.mantissa_bits as i32 + (exp_min - e)
    };

    let (mut kept, guard, low_sticky) = if drop <= 0 {
        (sig << (-drop) as u32, false, false)
    } else if drop as u32 >= 128 {
        (0, false, sig != 0)
    } else {
        let kept = sig >> drop as u32;
        let guard = (sig >> (drop - 1) as u32) & 1 == 1;
        let below_mask = (1u128 << (drop - 1) as u32) - 1;
        (kept, guard, sig & below_mask != 0)
    };
    let sticky = sticky || low_sticky;

    if guard && (sticky || kept & 1 == 1) {
        kept += 1;
    }

    let mantissa_mask = (1u64 << spec.mantissa_bits) - 1;
    let mut e = e;
    let kept64 = if kept >> (spec.mantissa_bits + 1) != 0 {
        // Rounding carried into a new leading bit.
        e += 1;
        (kept >> 1) as u64
    } else {
        kept as u64
    };

    if e >= exp_min && kept64 >> spec.mantissa_bits == 1 {
        if e > spec.exp_max {
            return None;
        }
        let biased = (e + spec.exp_bias) as u64;
        Some(sign_bit | biased << spec.mantissa_bits | (kept64 & mantissa_mask))
    } else {
        // Subnormal (or rounded up into the smallest normal).
        if kept64 >> spec.mantissa_bits == 1 {
            let biased = 1u64;
            return Some(sign_bit | biased << spec.mantissa_bits | (kept64 & mantissa_mask));
        }
        Some(sign_bit | kept64)
    }
}

/// Correctly-rounded hex float (`0x1.8p3` form) to target bits.
fn parse_hex_float(spec: &FloatSpec, negative: bool, span: &str) -> Option<u64> {
    let span = strip_hex_prefix(span);
    let bytes = span.as_bytes();
    let mut sig: u128 = 0;
    let mut sticky = false;
    let mut exp: i32 = 0;
    let mut seen_dot = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'_' => i += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                i += 1;
            }
            b if b.is_ascii_hexdigit() => {
                let digit = digit_value(b) as u128;
                if sig >> 112 == 0 {
                    sig = sig << 4 | digit;
                    if seen_dot {
                        exp -= 4;
                    }
                } else {
                    // No room; the digit only affects sticky/exponent.
                    sticky |= digit != 0;
                    if !seen_dot {
                        exp += 4;
                    }
                }
                i += 1;
            }
            b'p' | b'P' => {
                let exp_span = &span[i + 1..];
                let (exp_sign, digits) = match exp_span.as_bytes().first() {
                    Some(b'+') => (1i64, &exp_span[1..]),
                    Some(b'-') => (-1i64, &exp_span[1..]),
                    _ => (1, exp_span),
                };
                let raw: u64 = accumulate(digits, 10)?;
                let p = exp_sign * i64::from(u32::try_from(raw.min(1 << 20)).unwrap());
                exp = exp.saturating_add(p as i32);
                i = bytes.len();
            }
            _ => return None,
        }
    }

    compose_bits(spec, negative, sig, exp, sticky)
}

fn canonical_nan_bits(spec: &FloatSpec, negative: bool) -> u64 {
    let exp_field = ((spec.exp_max + spec.exp_bias) as u64 + 1) << spec.mantissa_bits;
    let payload = 1u64 << (spec.mantissa_bits - 1);
    sign_bits(spec, negative) | exp_field | payload
}

fn sign_bits(spec: &FloatSpec, negative: bool) -> u64 {
    if negative {
        1u64 << (spec.mantissa_bits + if spec.mantissa_bits == 23 { 8 } else { 11 })
    } else {
        0
    }
}

fn infinity_bits(spec: &FloatSpec, negative: bool) -> u64 {
    let exp_field = ((spec.exp_max + spec.exp_bias) as u64 + 1) << spec.mantissa_bits;
    sign_bits(spec, negative) | exp_field
}

fn nan_payload_bits(spec: &FloatSpec, negative: bool, span: &str) -> Option<u64> {
    // Skip "nan:0x".
    let payload_span = &span[6..];
    let payload: u64 = accumulate(payload_span, 16)?;
    let mask = (1u64 << spec.mantissa_bits) - 1;
    // Zero is reserved for infinity.
    if payload == 0 || payload > mask {
        return None;
    }
    let exp_field = ((spec.exp_max + spec.exp_bias) as u64 + 1) << spec.mantissa_bits;
    Some(sign_bits(spec, negative) | exp_field | payload)
}

fn str_to_float_bits(spec: &FloatSpec, info: LiteralInfo, span: &str) -> Option<u64> {
    let negative = info.sign == Sign::Minus;
    let span = strip_sign(span, info.sign);
    match info.kind {
        LiteralKind::Infinity => Some(infinity_bits(spec, negative)),
        LiteralKind::Nan => Some(canonical_nan_bits(spec, negative)),
        LiteralKind::NanPayload => nan_payload_bits(spec, negative, span),
        LiteralKind::Normal => match info.base {
            Base::Hex => parse_hex_float(spec, negative, span),
            Base::Decimal => {
                let cleaned: String = span.chars().filter(|&c| c != '_').collect();
                decimal_to_bits(spec, negative, &cleaned)
            }
        },
    }
}

/// Decimal parse via the standard library's correctly-rounded conversion.
/// Overflow to infinity is a range error, matching the text format's
/// "constant out of range".
fn decimal_to_bits(spec: &FloatSpec, negative: bool, cleaned: &str) -> Option<u64> {
    let bits = if spec.mantissa_bits == 23 {
        let value: f32 = cleaned.parse().ok()?;
        if value.is_infinite() {
            return None;
        }
        u64::from(value.to_bits())
    } else {
        let value: f64 = cleaned.parse().ok()?;
        if value.is_infinite() {
            return None;
        }
        value.to_bits()
    };
    Some(sign_bits(spec, negative) | bits)
}

pub fn str_to_f32(info: LiteralInfo, span: &str) -> Option<f32> {
    str_to_float_bits(&F32_SPEC, info, span).map(|bits| f32::from_bits(bits as u32))
}

pub fn str_to_f64(info: LiteralInfo, span: &str) -> Option<f64> {
    str_to_float_bits(&F64_SPEC, info, span).map(f64::from_bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn nat_info(base: Base) -> LiteralInfo {
        LiteralInfo::nat(base, false)
    }

    fn int_info(sign: Sign, base: Base) -> LiteralInfo {
        LiteralInfo::number(sign, base, false)
    }

    #[rstest]
    #[case("0", 0)]
    #[case("42", 42)]
    #[case("4_2", 42)]
    #[case("4294967295", u32::MAX)]
    fn nat_decimal(#[case] span: &str, #[case] expected: u32) {
        assert_eq!(
            str_to_nat::<u32>(LiteralInfo::nat(Base::Decimal, span.contains('_')), span),
            Some(expected)
        );
    }

    #[rstest]
    #[case("0x0", 0)]
    #[case("0xbeef", 0xbeef)]
    #[case("0xffff_ffff", u32::MAX)]
    fn nat_hex(#[case] span: &str, #[case] expected: u32) {
        assert_eq!(
            str_to_nat::<u32>(LiteralInfo::nat(Base::Hex, span.contains('_')), span),
            Some(expected)
        );
    }

    #[test]
    fn nat_overflow_fails() {
        assert_eq!(str_to_nat::<u32>(nat_info(Base::Decimal), "4294967296"), None);
        assert_eq!(str_to_nat::<u32>(nat_info(Base::Hex), "0x100000000"), None);
    }

    #[test]
    fn signed_ranges() {
        assert_eq!(
            str_to_s32(int_info(Sign::Minus, Base::Decimal), "-2147483648"),
            Some(i32::MIN)
        );
        // One past |min| fails.
        assert_eq!(str_to_s32(int_info(Sign::Minus, Base::Decimal), "-2147483649"), None);
        assert_eq!(
            str_to_s32(int_info(Sign::Plus, Base::Decimal), "+2147483647"),
            Some(i32::MAX)
        );
        assert_eq!(str_to_s32(int_info(Sign::Plus, Base::Decimal), "+2147483648"), None);
        // Unsigned spelling covers the full u32 range.
        assert_eq!(
            str_to_s32(nat_info(Base::Decimal), "4294967295"),
            Some(-1i32)
        );
    }

    #[test]
    fn both_radixes_decode_the_same_value() {
        let dec = str_to_s32(nat_info(Base::Decimal), "3735928559").unwrap();
        let hex = str_to_s32(nat_info(Base::Hex), "0xdeadbeef").unwrap();
        assert_eq!(dec, hex);
    }

    fn float_info() -> LiteralInfo {
        LiteralInfo::number(Sign::None, Base::Decimal, false)
    }

    fn hex_float_info() -> LiteralInfo {
        LiteralInfo::number(Sign::None, Base::Hex, false)
    }

    #[rstest]
    #[case("0x1p0", 1.0)]
    #[case("0x1.8p0", 1.5)]
    #[case("0x1.8p1", 3.0)]
    #[case("0x1p-1", 0.5)]
    #[case("0xf.fp0", 15.9375)]
    #[case("0x1p10", 1024.0)]
    #[case("0x1_0p0", 16.0)]
    fn hex_floats_f64(#[case] span: &str, #[case] expected: f64) {
        let info = LiteralInfo::number(Sign::None, Base::Hex, span.contains('_'));
        assert_eq!(str_to_f64(info, span), Some(expected), "{span}");
    }

    #[test]
    fn hex_float_f32_extremes() {
        assert_eq!(
            str_to_f32(hex_float_info(), "0x1.fffffep127"),
            Some(f32::MAX)
        );
        // Smallest subnormal.
        assert_eq!(
            str_to_f32(hex_float_info(), "0x1p-149").map(f32::to_bits),
            Some(1)
        );
        // Out of range.
        assert_eq!(str_to_f32(hex_float_info(), "0x1p128"), None);
    }

    #[test]
    fn hex_float_rounds_to_nearest_even() {
        // 1 + 2^-24 is exactly halfway between 1.0 and 1.0 + 2^-23; ties
        // go to the even mantissa, 1.0.
        assert_eq!(str_to_f32(hex_float_info(), "0x1.000001p0"), Some(1.0));
        // Anything above the halfway point rounds up.
        assert_eq!(
            str_to_f32(hex_float_info(), "0x1.0000011p0").map(f32::to_bits),
            Some(0x3f80_0001)
        );
    }

    #[test]
    fn decimal_floats_are_correctly_rounded() {
        assert_eq!(str_to_f64(float_info(), "0.1"), Some(0.1));
        assert_eq!(str_to_f32(float_info(), "3.14159"), "3.14159".parse().ok());
        assert_eq!(
            str_to_f64(LiteralInfo::number(Sign::Minus, Base::Decimal, false), "-1.5e3"),
            Some(-1500.0)
        );
    }

    #[test]
    fn decimal_float_overflow_fails() {
        assert_eq!(str_to_f32(float_info(), "1e999"), None);
        assert_eq!(str_to_f64(float_info(), "1e999"), None);
        // Huge hex exponent also fails.
        assert_eq!(str_to_f64(hex_float_info(), "0x1p99999"), None);
    }

    #[test]
    fn infinity_and_nan() {
        let inf = LiteralInfo::infinity(Sign::None);
        assert_eq!(str_to_f32(inf, "inf"), Some(f32::INFINITY));
        let neg_inf = LiteralInfo::infinity(Sign::Minus);
        assert_eq!(str_to_f32(neg_inf, "-inf"), Some(f32::NEG_INFINITY));

        let nan = LiteralInfo::nan(Sign::None);
        assert_eq!(
            str_to_f32(nan, "nan").map(f32::to_bits),
            Some(0x7fc0_0000)
        );
        assert_eq!(
            str_to_f64(nan, "nan").map(f64::to_bits),
            Some(0x7ff8_0000_0000_0000)
        );
    }

    #[test]
    fn nan_payloads() {
        let info = LiteralInfo::nan_payload(Sign::None, false);
        assert_eq!(
            str_to_f32(info, "nan:0x400000").map(f32::to_bits),
            Some(0x7fc0_0000)
        );
        assert_eq!(
            str_to_f32(info, "nan:0x1").map(f32::to_bits),
            Some(0x7f80_0001)
        );
        let neg = LiteralInfo::nan_payload(Sign::Minus, false);
        assert_eq!(
            str_to_f32(neg, "-nan:0x1").map(f32::to_bits),
            Some(0xff80_0001)
        );
    }

    #[test]
    fn nan_payload_zero_is_invalid() {
        let info = LiteralInfo::nan_payload(Sign::None, false);
        assert_eq!(str_to_f32(info, "nan:0x0"), None);
        // Payload must fit the mantissa.
        assert_eq!(str_to_f32(info, "nan:0x800000"), None);
        assert_eq!(str_to_f32(info, "nan:0x7fffff").map(f32::to_bits), Some(0x7fff_ffff));
    }
}
