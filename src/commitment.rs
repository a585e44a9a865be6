//! Fixed-size commitments embedded in a proof's public output

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{ProofError, Result};

/// Byte length of a commitment.
pub const COMMITMENT_LEN: usize = 32;

/// A commitment as attested by a circuit: a discrete 32-byte value.
///
/// Equality is exact byte equality. Rendered as lowercase hex everywhere
/// (Display, Debug and serde).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Commitment([u8; COMMITMENT_LEN]);

impl Commitment {
    pub const fn from_bytes(bytes: [u8; COMMITMENT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; COMMITMENT_LEN] {
        &self.0
    }

    /// Parse a commitment from a byte slice of exactly `COMMITMENT_LEN` bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; COMMITMENT_LEN] = bytes.try_into().map_err(|_| {
            ProofError::Serialization(format!(
                "Commitment must be {} bytes, got {}",
                COMMITMENT_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed)
            .map_err(|e| ProofError::Serialization(format!("Invalid commitment hex: {}", e)))?;
        Self::from_slice(&bytes)
    }

    /// SHA-256 over a domain tag followed by length-prefixed parts.
    ///
    /// Binders use this to mirror the in-circuit commitment out of circuit.
    pub fn hash_tagged(tag: &[u8], parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((tag.len() as u32).to_be_bytes());
        hasher.update(tag);
        for part in parts {
            hasher.update((part.len() as u32).to_be_bytes());
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl FromStr for Commitment {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
