use serde::{Deserialize, Serialize};

use crate::error::{ProofError, Result};

/// Engine-owned JSON form of an opaque proof handle.
///
/// The wrapper layer never reinterprets it; it only moves it around and
/// compares it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedProof(serde_json::Value);

impl SerializedProof {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Compact JSON bytes. Object keys are emitted in sorted order, so equal
    /// values always produce equal bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.0).map_err(|e| ProofError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map(Self)
            .map_err(|e| ProofError::Serialization(e.to_string()))
    }
}

/// JSON form of a whole wrapper: the claim, its kind tag and the proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofEnvelope<C> {
    pub kind: String,
    pub claim: C,
    pub proof: SerializedProof,
}
