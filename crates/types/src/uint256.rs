//! Fixed 256-bit identifier used for block hashes.
//!
//! The canonical text form is exactly 64 lowercase hex digits without prefix,
//! with the first two digits encoding the first byte. Ordering is byte-wise
//! and unsigned, most significant byte first, so it matches comparing the hex
//! strings of two values.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of bytes in a [`Uint256`].
pub const UINT256_BYTES: usize = 32;

/// Number of hex digits in the text form of a [`Uint256`].
pub const UINT256_HEX_LEN: usize = 2 * UINT256_BYTES;

/// Errors returned when parsing a [`Uint256`] from hex.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseUint256Error {
    #[error("expected {UINT256_HEX_LEN} hex digits, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex character {character:?} at position {index}")]
    InvalidCharacter { character: char, index: usize },
}

/// A 32-byte value with big-endian hex representation.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uint256([u8; UINT256_BYTES]);

impl Uint256 {
    /// The all-zero value.
    pub const ZERO: Self = Self([0u8; UINT256_BYTES]);

    pub const fn from_bytes(bytes: [u8; UINT256_BYTES]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; UINT256_BYTES] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Parses the canonical hex form. Upper-case digits are accepted.
    pub fn from_hex(hex_str: &str) -> Result<Self, ParseUint256Error> {
        if hex_str.len() != UINT256_HEX_LEN {
            return Err(ParseUint256Error::InvalidLength(hex_str.len()));
        }

        let mut bytes = [0u8; UINT256_BYTES];
        hex::decode_to_slice(hex_str, &mut bytes).map_err(|err| match err {
            hex::FromHexError::InvalidHexCharacter { c, index } => {
                ParseUint256Error::InvalidCharacter {
                    character: c,
                    index,
                }
            }
            // Length was checked above, so only odd-length style errors remain.
            _ => ParseUint256Error::InvalidLength(hex_str.len()),
        })?;

        Ok(Self(bytes))
    }

    /// Lowercase hex encoding, always [`UINT256_HEX_LEN`] characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; UINT256_BYTES]> for Uint256 {
    fn from(bytes: [u8; UINT256_BYTES]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Uint256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Uint256 {
    type Err = ParseUint256Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Uint256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Uint256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uint256({})", self.to_hex())
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use super::{UINT256_BYTES, Uint256};
    use serde::de::{self, Visitor};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;

    // Hex strings in JSON, raw bytes in binary formats.
    impl Serialize for Uint256 {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            if serializer.is_human_readable() {
                serializer.serialize_str(&self.to_hex())
            } else {
                self.0.serialize(serializer)
            }
        }
    }

    impl<'de> Deserialize<'de> for Uint256 {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            if deserializer.is_human_readable() {
                deserializer.deserialize_str(HexVisitor)
            } else {
                <[u8; UINT256_BYTES]>::deserialize(deserializer).map(Uint256)
            }
        }
    }

    struct HexVisitor;

    impl Visitor<'_> for HexVisitor {
        type Value = Uint256;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a 64 character hex string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Uint256::from_hex(v).map_err(E::custom)
        }
    }
}
