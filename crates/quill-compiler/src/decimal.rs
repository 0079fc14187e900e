//! Arbitrary precision decimal numbers.
//!
//! Number literals keep every digit the source wrote. A value is stored as an
//! unscaled [`BigInt`] plus the count of fractional digits, so `12.50` is
//! `1250` with scale `2`.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// An exact decimal number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    unscaled: BigInt,
    scale: u32,
}

/// Returned when text is not a decimal literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid decimal literal '{0}'")]
pub struct ParseDecimalError(pub String);

impl Decimal {
    /// Creates a decimal with no fractional digits.
    pub fn from_integer(value: i64) -> Self {
        Self {
            unscaled: BigInt::from(value),
            scale: 0,
        }
    }

    /// Number of digits after the decimal point.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Returns true when no fractional digits were written.
    pub fn is_integer(&self) -> bool {
        self.scale == 0
    }

    /// The value as an `i64`, if it has no fractional digits and fits.
    pub fn to_i64(&self) -> Option<i64> {
        if self.scale == 0 {
            self.unscaled.to_i64()
        } else {
            None
        }
    }

    /// Nearest `f64`, used by the reference machine.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseDecimalError(s.to_string());
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, fraction) = match body.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (body, ""),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if !fraction.bytes().all(|b| b.is_ascii_digit()) || (body.contains('.') && fraction.is_empty()) {
            return Err(invalid());
        }

        let digits = format!("{whole}{fraction}");
        let mut unscaled = BigInt::from_str(&digits).map_err(|_| invalid())?;
        if negative {
            unscaled = -unscaled;
        }
        Ok(Self {
            unscaled,
            scale: fraction.len() as u32,
        })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.unscaled.is_negative() { "-" } else { "" };
        let digits = self.unscaled.abs().to_string();
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (whole, fraction) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{whole}.{fraction}")
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::from_integer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer() {
        let d: Decimal = "42".parse().unwrap();
        assert!(d.is_integer());
        assert_eq!(d.to_string(), "42");
        assert_eq!(d, Decimal::from_integer(42));
    }

    #[test]
    fn test_parse_fraction_keeps_digits() {
        let d: Decimal = "12.50".parse().unwrap();
        assert_eq!(d.scale(), 2);
        assert_eq!(d.to_string(), "12.50");
        assert_eq!(d.to_f64(), 12.5);
    }

    #[test]
    fn test_to_i64() {
        assert_eq!("7".parse::<Decimal>().unwrap().to_i64(), Some(7));
        assert_eq!("7.0".parse::<Decimal>().unwrap().to_i64(), None);
        assert_eq!("99999999999999999999".parse::<Decimal>().unwrap().to_i64(), None);
    }

    #[test]
    fn test_small_fraction_is_padded() {
        let d: Decimal = "0.005".parse().unwrap();
        assert_eq!(d.to_string(), "0.005");
        let negative: Decimal = "-0.5".parse().unwrap();
        assert_eq!(negative.to_string(), "-0.5");
    }

    #[test]
    fn test_huge_literal_is_exact() {
        let text = "123456789012345678901234567890.000000000000000000001";
        let d: Decimal = text.parse().unwrap();
        assert_eq!(d.to_string(), text);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("".parse::<Decimal>().is_err());
        assert!("1.".parse::<Decimal>().is_err());
        assert!(".5".parse::<Decimal>().is_err());
        assert!("1e5".parse::<Decimal>().is_err());
    }
}
