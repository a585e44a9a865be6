//! Error types for proof wrapping, verification and derivation

use thiserror::Error;

use crate::commitment::Commitment;

/// Result type for proof-layer operations
pub type Result<T> = std::result::Result<T, ProofError>;

/// Failures surfaced by the wrapper layer.
///
/// Trust decisions are binary: every variant is fatal to the operation that
/// produced it and nothing is downgraded or recovered locally.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProofError {
    /// The engine rejected the proof itself (malformed, wrong circuit, tampered).
    #[error("Cryptographic verification failed: {reason}")]
    CryptographicVerificationFailure { reason: String },

    /// The proof is valid but attests to a different value than the one claimed.
    #[error("Claim mismatch for {kind}: expected commitment {expected}, proof embeds {embedded}")]
    ClaimMismatch {
        kind: &'static str,
        expected: Commitment,
        embedded: Commitment,
    },

    /// The engine transformation failed, timed out or was cancelled.
    #[error("Derivation via circuit {circuit} failed: {reason}")]
    DerivationFailure { circuit: String, reason: String },

    /// A proof handle or envelope could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A claim was rejected before any proof work ran.
    #[error("Invalid claim: {0}")]
    InvalidClaim(String),
}

impl ProofError {
    /// Whether retrying the same call can change the outcome.
    ///
    /// Only derivations can fail transiently; a cryptographic fact or a claim
    /// mismatch is the same on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProofError::DerivationFailure { .. })
    }
}
