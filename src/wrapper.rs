//! Proof wrappers: an opaque proof bound to the claim it attests.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::binder::ClaimBinder;
use crate::engine::ProofHandle;
use crate::error::{ProofError, Result};
use crate::types::{ProofEnvelope, SerializedProof};
use crate::verifier::{DirectVerifier, Verify};

static NEXT_WRAPPER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a wrapper instance. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(u64);

impl WrapperId {
    fn next() -> Self {
        Self(NEXT_WRAPPER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WrapperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An opaque proof `P` together with the claim of kind `B` it is said to
/// attest.
///
/// The wrapper is untrusted until [`verify`](Self::verify) succeeds, and the
/// only trusted way to read the claim is [`claim`](Self::claim), which
/// verifies first. The proof and the claim are fixed at construction.
///
/// Wrappers are not `Clone`: every instance has its own
/// [`WrapperId`], which is what the verification cache keys on by default.
pub struct ProofWrapper<B: ClaimBinder, P: ProofHandle> {
    id: WrapperId,
    proof: P,
    claim: B::Claim,
    verifier: Arc<dyn Verify<B, P>>,
    _binder: PhantomData<fn() -> B>,
}

impl<B: ClaimBinder, P: ProofHandle> ProofWrapper<B, P> {
    /// Wrap with a [`DirectVerifier`] (no memoization).
    pub fn new(proof: P, claim: B::Claim) -> Self {
        Self::with_verifier(proof, claim, Arc::new(DirectVerifier))
    }

    /// Wrap with an explicit verification chain, e.g. a shared
    /// [`crate::cache::CachedVerifier`].
    pub fn with_verifier(proof: P, claim: B::Claim, verifier: Arc<dyn Verify<B, P>>) -> Self {
        let id = WrapperId::next();
        tracing::debug!("Wrapped proof kind={} wrapper={}", B::KIND, id);
        Self {
            id,
            proof,
            claim,
            verifier,
            _binder: PhantomData,
        }
    }

    pub fn id(&self) -> WrapperId {
        self.id
    }

    pub fn kind(&self) -> &'static str {
        B::KIND
    }

    pub fn proof(&self) -> &P {
        &self.proof
    }

    pub fn verifier(&self) -> &Arc<dyn Verify<B, P>> {
        &self.verifier
    }

    /// The claimed value as supplied by the caller, NOT verified.
    ///
    /// For diagnostics and for verifiers themselves. Anything that acts on
    /// the claim must go through [`claim`](Self::claim).
    pub fn claim_unverified(&self) -> &B::Claim {
        &self.claim
    }

    /// Run the verification chain: engine check, then claim binding.
    pub async fn verify(&self) -> Result<()> {
        self.verifier.verify(self).await
    }

    /// Verify, then return the claim.
    pub async fn claim(&self) -> Result<&B::Claim> {
        self.verify().await?;
        Ok(&self.claim)
    }

    /// The engine's own serialization of the underlying proof.
    pub fn serialize(&self) -> Result<SerializedProof> {
        self.proof
            .to_json()
            .map_err(|e| ProofError::Serialization(e.to_string()))
    }

    /// Rebuild a proof handle from its serialized form. Does not verify.
    pub fn deserialize(data: &SerializedProof) -> Result<P> {
        P::from_json(data).map_err(|e| ProofError::Serialization(e.to_string()))
    }

    /// Structural equality: same claim commitment and same serialized proof.
    ///
    /// Says nothing about whether either side is valid.
    pub fn equals(&self, other: &Self) -> bool {
        if B::commit(&self.claim) != B::commit(&other.claim) {
            return false;
        }
        match (self.serialize(), other.serialize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    pub fn to_envelope(&self) -> Result<ProofEnvelope<B::Claim>>
    where
        B::Claim: Clone,
    {
        Ok(ProofEnvelope {
            kind: B::KIND.to_string(),
            claim: self.claim.clone(),
            proof: self.serialize()?,
        })
    }

    /// Rebuild a wrapper from its envelope. The result is unverified.
    pub fn from_envelope(
        envelope: ProofEnvelope<B::Claim>,
        verifier: Arc<dyn Verify<B, P>>,
    ) -> Result<Self> {
        if envelope.kind != B::KIND {
            return Err(ProofError::Serialization(format!(
                "Envelope kind mismatch: expected {}, got {}",
                B::KIND,
                envelope.kind
            )));
        }
        let proof = Self::deserialize(&envelope.proof)?;
        Ok(Self::with_verifier(proof, envelope.claim, verifier))
    }

    pub fn to_json(&self) -> Result<serde_json::Value>
    where
        B::Claim: Clone + Serialize,
    {
        serde_json::to_value(self.to_envelope()?)
            .map_err(|e| ProofError::Serialization(e.to_string()))
    }

    pub fn from_json(json: serde_json::Value, verifier: Arc<dyn Verify<B, P>>) -> Result<Self>
    where
        B::Claim: DeserializeOwned,
    {
        let envelope: ProofEnvelope<B::Claim> =
            serde_json::from_value(json).map_err(|e| ProofError::Serialization(e.to_string()))?;
        Self::from_envelope(envelope, verifier)
    }
}

impl<B: ClaimBinder, P: ProofHandle> fmt::Debug for ProofWrapper<B, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofWrapper")
            .field("id", &self.id)
            .field("kind", &B::KIND)
            .finish_non_exhaustive()
    }
}
