//! Decimal and 128-bit float value types.

use std::fmt;
use std::str::FromStr;

use crate::error::PofError;

/// Largest unscaled magnitude for each IEEE 754-2008 decimal width.
pub const MAX_DECIMAL32_UNSCALED: i128 = 9_999_999;
pub const MAX_DECIMAL64_UNSCALED: i128 = 9_999_999_999_999_999;
pub const MAX_DECIMAL128_UNSCALED: i128 = 9_999_999_999_999_999_999_999_999_999_999_999;

/// Scale ranges (negated exponent) for each decimal width.
pub const DECIMAL32_SCALE: (i32, i32) = (-90, 101);
pub const DECIMAL64_SCALE: (i32, i32) = (-369, 398);
pub const DECIMAL128_SCALE: (i32, i32) = (-6111, 6176);

/// A decimal number `unscaled × 10^-scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    unscaled: i128,
    scale: i32,
}

impl Decimal {
    pub const ZERO: Decimal = Decimal {
        unscaled: 0,
        scale: 0,
    };

    pub fn new(unscaled: i128, scale: i32) -> Self {
        Self { unscaled, scale }
    }

    pub fn unscaled(&self) -> i128 {
        self.unscaled
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.unscaled == 0
    }

    /// Smallest POF decimal width (4, 8 or 16 bytes) that can hold this value.
    pub fn wire_size(&self) -> Result<usize, PofError> {
        let magnitude = self.unscaled.unsigned_abs();
        let fits = |max: i128, (lo, hi): (i32, i32)| {
            magnitude <= max as u128 && (lo..=hi).contains(&self.scale)
        };
        if fits(MAX_DECIMAL32_UNSCALED, DECIMAL32_SCALE) {
            Ok(4)
        } else if fits(MAX_DECIMAL64_UNSCALED, DECIMAL64_SCALE) {
            Ok(8)
        } else if fits(MAX_DECIMAL128_UNSCALED, DECIMAL128_SCALE) {
            Ok(16)
        } else {
            Err(PofError::InvalidValue(format!(
                "decimal value exceeds IEEE754r 128-bit range: {self}"
            )))
        }
    }

    /// Value truncated toward zero; saturates when the magnitude exceeds `i128`.
    pub fn to_i128(&self) -> i128 {
        if self.scale >= 0 {
            match 10i128.checked_pow(self.scale as u32) {
                Some(divisor) => self.unscaled / divisor,
                None => 0,
            }
        } else {
            10i128
                .checked_pow(self.scale.unsigned_abs())
                .and_then(|m| self.unscaled.checked_mul(m))
                .unwrap_or(if self.unscaled < 0 { i128::MIN } else { i128::MAX })
        }
    }

    /// Nearest `f64`.
    pub fn to_f64(&self) -> f64 {
        format!("{}e{}", self.unscaled, -i64::from(self.scale))
            .parse()
            .unwrap_or(f64::NAN)
    }

    /// Decimal equal to the shortest decimal rendering of `f`.
    pub fn from_f64(f: f64) -> Result<Self, PofError> {
        if !f.is_finite() {
            return Err(PofError::InvalidValue(format!(
                "{f} has no decimal representation"
            )));
        }
        format!("{f}").parse()
    }
}

impl From<i64> for Decimal {
    fn from(n: i64) -> Self {
        Self::new(i128::from(n), 0)
    }
}

impl From<i128> for Decimal {
    fn from(n: i128) -> Self {
        Self::new(n, 0)
    }
}

impl FromStr for Decimal {
    type Err = PofError;

    /// Parses `[-+]digits[.digits][e[-+]digits]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PofError::InvalidValue(format!("invalid decimal literal: {s:?}"));

        let (mantissa, exponent) = match s.find(['e', 'E']) {
            Some(i) => (&s[..i], s[i + 1..].parse::<i32>().map_err(|_| invalid())?),
            None => (s, 0),
        };
        let (negative, mantissa) = match mantissa.as_bytes().first() {
            Some(b'-') => (true, &mantissa[1..]),
            Some(b'+') => (false, &mantissa[1..]),
            _ => (false, mantissa),
        };
        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let mut digits: String = int_part.chars().chain(frac_part.chars()).collect();
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let mut scale = i64::try_from(frac_part.len()).map_err(|_| invalid())? - i64::from(exponent);

        // Fold trailing zeros into the scale only when the digits would not
        // fit otherwise.
        while digits.len() > 38 && digits.ends_with('0') {
            digits.pop();
            scale -= 1;
        }

        let mut unscaled: i128 = 0;
        for b in digits.bytes() {
            unscaled = unscaled
                .checked_mul(10)
                .and_then(|n| n.checked_add(i128::from(b - b'0')))
                .ok_or_else(invalid)?;
        }
        let scale = i32::try_from(scale).map_err(|_| invalid())?;
        Ok(Self::new(if negative { -unscaled } else { unscaled }, scale))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale <= 0 {
            if self.scale == 0 {
                return write!(f, "{}", self.unscaled);
            }
            return write!(f, "{}E+{}", self.unscaled, -i64::from(self.scale));
        }

        let digits = self.unscaled.unsigned_abs().to_string();
        let sign = if self.unscaled < 0 { "-" } else { "" };
        let scale = self.scale as usize;
        if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{sign}{int}.{frac}")
        } else {
            write!(f, "{sign}0.{}{digits}", "0".repeat(scale - digits.len()))
        }
    }
}

/// An IEEE 754 binary128 value kept as its 16 big-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawQuad([u8; 16]);

const QUAD_MANTISSA_BITS: u32 = 112;
const QUAD_EXPONENT_BIAS: i32 = 16383;
const QUAD_MANTISSA_MASK: u128 = (1u128 << QUAD_MANTISSA_BITS) - 1;

impl RawQuad {
    pub const ZERO: RawQuad = RawQuad([0; 16]);

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_bits(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    pub fn from_bits(bits: u128) -> Self {
        Self(bits.to_be_bytes())
    }

    /// Exact widening of an `f64`.
    pub fn from_f64(value: f64) -> Self {
        let bits = value.to_bits();
        let sign = u128::from(bits >> 63) << 127;
        let exponent = ((bits >> 52) & 0x7FF) as i32;
        let mantissa = bits & ((1u64 << 52) - 1);

        let body = match (exponent, mantissa) {
            (0, 0) => 0,
            (0x7FF, m) => (0x7FFFu128 << QUAD_MANTISSA_BITS) | (u128::from(m) << 60),
            (0, m) => {
                // subnormal double: normalize around the highest set bit
                let top = 63 - m.leading_zeros() as i32;
                let e = top - 1074 + QUAD_EXPONENT_BIAS;
                let shifted = (u128::from(m) << (QUAD_MANTISSA_BITS as i32 - top)) & QUAD_MANTISSA_MASK;
                ((e as u128) << QUAD_MANTISSA_BITS) | shifted
            }
            (e, m) => {
                let e = e - 1023 + QUAD_EXPONENT_BIAS;
                ((e as u128) << QUAD_MANTISSA_BITS) | (u128::from(m) << 60)
            }
        };
        Self::from_bits(sign | body)
    }

    /// Nearest-below `f64`; magnitudes beyond the `f64` range become
    /// infinity or zero.
    pub fn to_f64(&self) -> f64 {
        let bits = self.to_bits();
        let negative = bits >> 127 == 1;
        let exponent = ((bits >> QUAD_MANTISSA_BITS) & 0x7FFF) as i32;
        let mantissa = bits & QUAD_MANTISSA_MASK;

        let magnitude = if exponent == 0x7FFF {
            if mantissa == 0 {
                f64::INFINITY
            } else {
                f64::from_bits(0x7FF0_0000_0000_0000 | ((mantissa >> 60) as u64) | (1 << 51))
            }
        } else if exponent == 0 {
            0.0
        } else {
            let e = exponent - QUAD_EXPONENT_BIAS;
            if e > 1023 {
                f64::INFINITY
            } else if e >= -1022 {
                f64::from_bits((((e + 1023) as u64) << 52) | (mantissa >> 60) as u64)
            } else if e >= -1074 {
                let shift = 60 + (-1022 - e) as u32;
                f64::from_bits((((1u128 << QUAD_MANTISSA_BITS) | mantissa) >> shift) as u64)
            } else {
                0.0
            }
        };
        if negative { -magnitude } else { magnitude }
    }
}

impl From<f64> for RawQuad {
    fn from(value: f64) -> Self {
        Self::from_f64(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_display() {
        assert_eq!(dec("123.45"), Decimal::new(12345, 2));
        assert_eq!(dec("-0.005"), Decimal::new(-5, 3));
        assert_eq!(dec("1.5e3"), Decimal::new(15, -2));
        assert_eq!(dec("42"), Decimal::new(42, 0));
        assert_eq!(Decimal::new(12345, 2).to_string(), "123.45");
        assert_eq!(Decimal::new(-5, 3).to_string(), "-0.005");
        assert_eq!(Decimal::new(15, -2).to_string(), "15E+2");
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("".parse::<Decimal>().is_err());
        assert!("12a".parse::<Decimal>().is_err());
    }

    #[test]
    fn wire_sizes() {
        assert_eq!(Decimal::new(9_999_999, 2).wire_size().unwrap(), 4);
        assert_eq!(Decimal::new(10_000_000, 2).wire_size().unwrap(), 8);
        assert_eq!(Decimal::new(1, 101).wire_size().unwrap(), 4);
        assert_eq!(Decimal::new(1, 102).wire_size().unwrap(), 8);
        assert_eq!(Decimal::new(1, -370).wire_size().unwrap(), 16);
        assert_eq!(
            Decimal::new(MAX_DECIMAL128_UNSCALED, 0).wire_size().unwrap(),
            16
        );
        assert!(Decimal::new(MAX_DECIMAL128_UNSCALED + 1, 0).wire_size().is_err());
        assert!(Decimal::new(1, 7000).wire_size().is_err());
    }

    #[test]
    fn conversions() {
        assert_eq!(dec("123.99").to_i128(), 123);
        assert_eq!(dec("-123.99").to_i128(), -123);
        assert_eq!(Decimal::new(7, -3).to_i128(), 7000);
        assert_eq!(Decimal::new(1, -60).to_i128(), i128::MAX);
        assert_eq!(Decimal::new(5, 50).to_i128(), 0);
        assert_eq!(dec("0.25").to_f64(), 0.25);
        assert_eq!(Decimal::from_f64(3.25).unwrap(), Decimal::new(325, 2));
        assert_eq!(Decimal::from_f64(1e300).unwrap().to_f64(), 1e300);
        assert_eq!(Decimal::from_f64(1e-300).unwrap().to_f64(), 1e-300);
        assert!(Decimal::from_f64(f64::NAN).is_err());
    }

    #[test]
    fn quad_from_f64_round_trips() {
        for v in [
            0.0,
            -0.0,
            1.0,
            -2.5,
            f64::MAX,
            f64::MIN_POSITIVE,
            5e-324,
            1e-310,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ] {
            let q = RawQuad::from_f64(v);
            assert_eq!(q.to_f64().to_bits(), v.to_bits(), "{v}");
        }
        assert!(RawQuad::from_f64(f64::NAN).to_f64().is_nan());
    }

    #[test]
    fn quad_layout() {
        // 1.0 in binary128: exponent 0x3FFF, mantissa 0
        let q = RawQuad::from_f64(1.0);
        assert_eq!(q.as_bytes()[..2], [0x3F, 0xFF]);
        assert!(q.as_bytes()[2..].iter().all(|b| *b == 0));
        assert_eq!(RawQuad::from_f64(0.0), RawQuad::ZERO);
    }
}
