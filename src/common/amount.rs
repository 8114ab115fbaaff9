//! Fixed-point coin amounts
//!
//! Amounts are integers in the smallest unit (8 implied decimals). Products
//! are widened to u128 and every division truncates toward zero.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{SettlementError, SettlementResult};

/// Number of implied decimal places
pub const DECIMALS: u32 = 8;

/// One whole coin in the smallest unit
pub const ONE: u64 = 100_000_000;

/// A coin amount in the smallest unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(raw: u64) -> Self {
        Amount(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> SettlementResult<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(SettlementError::Overflow)
    }

    pub fn checked_sub(self, other: Amount) -> SettlementResult<Amount> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(SettlementError::Overflow)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// `self - other`, clamped at zero
    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// Parse a whole-coin decimal such as `0.160053` into the smallest unit.
    /// A plain integer is taken as already being in the smallest unit.
    pub fn from_decimal(s: &str) -> SettlementResult<Amount> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some(parts) => parts,
            None => return s.parse(),
        };
        let invalid = || SettlementError::validation(format!("amount {:?} is invalid", s));
        if (whole.is_empty() && frac.is_empty())
            || frac.len() > DECIMALS as usize
            || !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
        let frac: u64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<width$}", frac, width = DECIMALS as usize)
                .parse()
                .map_err(|_| invalid())?
        };
        whole
            .checked_mul(ONE)
            .and_then(|v| v.checked_add(frac))
            .map(Amount)
            .ok_or(SettlementError::Overflow)
    }

    /// `self * numerator / denominator`, rounding down
    pub fn mul_div(self, numerator: u64, denominator: u64) -> SettlementResult<Amount> {
        mul_div_down(self.0 as u128, numerator as u128, denominator as u128)
            .and_then(|v| u64::try_from(v).ok())
            .map(Amount)
            .ok_or(SettlementError::Overflow)
    }
}

/// Multiply two values and divide by a third, rounding DOWN.
/// Returns None on overflow or a zero divisor.
pub fn mul_div_down(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return None;
    }
    a.checked_mul(b)?.checked_div(c)
}

impl From<u64> for Amount {
    fn from(raw: u64) -> Self {
        Amount(raw)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SettlementError::validation(format!("amount {:?} is invalid", s)));
        }
        s.parse::<u64>()
            .map(Amount)
            .map_err(|_| SettlementError::validation(format!("amount {} is out of range", s)))
    }
}

// Amounts travel as decimal strings so JSON consumers never round them.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an unsigned integer amount as a string or number")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                u64::try_from(v)
                    .map(Amount)
                    .map_err(|_| E::custom("amount cannot be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}
