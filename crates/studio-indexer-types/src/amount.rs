//! Arbitrary-precision on-chain amounts.
//!
//! `value`, `gas_price`, and native balances are 256-bit integers on an EVM
//! chain. We keep them as [`alloy_primitives::U256`] in memory and serialize
//! them as canonical decimal strings on the wire and in storage — never as
//! floating point (a `u64`/`f64` cannot round-trip a token transfer of
//! `2^200` wei without loss).

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 256-bit unsigned amount that (de)serializes as a decimal string.
///
/// ```
/// use studio_indexer_types::amount::Amount;
/// let a: Amount = "1000000000000000000".parse().unwrap();
/// assert_eq!(a.to_string(), "1000000000000000000");
/// assert_eq!(serde_json::to_string(&a).unwrap(), "\"1000000000000000000\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(pub U256);

#[derive(Debug, thiserror::Error)]
pub enum AmountParseError {
    #[error("invalid decimal integer: {0}")]
    InvalidFormat(String),
}

impl Amount {
    pub const ZERO: Amount = Amount(U256::ZERO);
    pub const ONE: Amount = Amount(U256::from_limbs([1, 0, 0, 0]));

    pub fn new(value: U256) -> Self {
        Amount(value)
    }

    pub fn inner(&self) -> U256 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Amount(value)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(U256::from(value))
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str(s)
            .map(Amount)
            .map_err(|_| AmountParseError::InvalidFormat(s.to_string()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_string() {
        let a: Amount = "1000000000000000000".parse().unwrap();
        assert_eq!(a.inner(), U256::from(1_000_000_000_000_000_000u128));
    }

    #[test]
    fn rejects_non_decimal() {
        assert!("0xdeadbeef".parse::<Amount>().is_err());
        assert!("not a number".parse::<Amount>().is_err());
    }

    #[test]
    fn roundtrips_through_json() {
        let a = Amount::from(42u64);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"42\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn display_matches_decimal() {
        let a = Amount::from(7u64);
        assert_eq!(a.to_string(), "7");
    }
}
