//! Interfaces consumed from the external circuit engine.
//!
//! The engine produces proofs, checks them cryptographically, owns their
//! serialization and transforms proofs of one circuit into proofs of another.
//! This crate only sees those operations through the traits below.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::commitment::Commitment;
use crate::types::SerializedProof;

/// Failure reported by an engine collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An opaque, engine-produced proof.
///
/// Implementations may be expensive to verify (milliseconds to seconds) and
/// are free to suspend while doing so.
#[async_trait]
pub trait ProofHandle: Send + Sync + Sized + 'static {
    /// Cryptographic soundness check.
    async fn verify(&self) -> Result<(), EngineError>;

    /// The commitment the circuit attests to.
    fn public_output(&self) -> Result<Commitment, EngineError>;

    fn to_json(&self) -> Result<SerializedProof, EngineError>;

    fn from_json(json: &SerializedProof) -> Result<Self, EngineError>;

    /// SHA-256 over the canonical JSON bytes of this handle.
    fn fingerprint(&self) -> Result<[u8; 32], EngineError> {
        let json = self.to_json()?;
        let bytes = json
            .to_bytes()
            .map_err(|e| EngineError::new(e.to_string()))?;
        Ok(Sha256::digest(&bytes).into())
    }
}

/// A circuit-specific transformation from proofs of `S` to proofs of
/// `Self::Output`.
#[async_trait]
pub trait CircuitTransform<S: ProofHandle>: Send + Sync {
    type Output: ProofHandle;

    /// Identifier of the circuit the transformation proves with.
    fn circuit_id(&self) -> &str;

    /// Run the transformation. May take much longer than verification.
    async fn transform(&self, source: &S) -> Result<Self::Output, EngineError>;
}
