//! Lowercase-hex identifier newtypes.
//!
//! §3 of the spec requires identifiers to be lowercase hex strings on the
//! wire and in storage. `alloy_primitives::Address`'s `Display` impl emits
//! an EIP-55 checksum (mixed case), so we wrap it rather than reuse it bare
//! for anything that crosses a serialization boundary.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! lowercase_hex_newtype {
    ($name:ident, $inner:ty, $len:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $inner);

        impl $name {
            pub fn inner(&self) -> $inner {
                self.0
            }

            pub fn as_bytes(&self) -> &[u8] {
                self.0.as_slice()
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                $name(value)
            }
        }

        impl FromStr for $name {
            type Err = HexIdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let parsed = <$inner>::from_str(s)
                    .map_err(|_| HexIdParseError::InvalidHex(s.to_string()))?;
                Ok($name(parsed))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0.as_slice()))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                $name::from_str(&s).map_err(serde::de::Error::custom)
            }
        }

        impl $name {
            pub const BYTE_LEN: usize = $len;
        }
    };
}

lowercase_hex_newtype!(Addr, Address, 20);
lowercase_hex_newtype!(Hash32, B256, 32);

#[derive(Debug, thiserror::Error)]
pub enum HexIdParseError {
    #[error("invalid hex identifier: {0}")]
    InvalidHex(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_displays_lowercase() {
        let addr: Addr = "0xAbCdEf0123456789aBcDeF0123456789aBCDeF01"
            .parse()
            .unwrap();
        assert_eq!(
            addr.to_string(),
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
    }

    #[test]
    fn hash_roundtrips_through_json() {
        let hash = Hash32(B256::with_last_byte(1));
        let json = serde_json::to_string(&hash).unwrap();
        let back: Hash32 = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, back);
    }
}
