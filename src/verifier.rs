//! Verification chains for wrapped proofs.
//!
//! A wrapper delegates `verify()` to a [`Verify`] implementation chosen when
//! it is constructed. [`DirectVerifier`] runs the full chain every time;
//! [`crate::cache::CachedVerifier`] wraps another verifier and memoizes
//! success.

use async_trait::async_trait;

use crate::binder::ClaimBinder;
use crate::engine::ProofHandle;
use crate::error::{ProofError, Result};
use crate::wrapper::ProofWrapper;

/// A verification chain for wrappers of binder `B` over handles `P`.
#[async_trait]
pub trait Verify<B: ClaimBinder, P: ProofHandle>: Send + Sync {
    async fn verify(&self, wrapper: &ProofWrapper<B, P>) -> Result<()>;
}

/// Engine verification followed by claim binding, with no memoization.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectVerifier;

#[async_trait]
impl<B, P> Verify<B, P> for DirectVerifier
where
    B: ClaimBinder,
    P: ProofHandle,
{
    async fn verify(&self, wrapper: &ProofWrapper<B, P>) -> Result<()> {
        tracing::info!("Verifying proof kind={} wrapper={}", B::KIND, wrapper.id());

        wrapper.proof().verify().await.map_err(|e| {
            tracing::warn!(
                "Engine rejected proof kind={} wrapper={}: {}",
                B::KIND,
                wrapper.id(),
                e
            );
            ProofError::CryptographicVerificationFailure {
                reason: e.to_string(),
            }
        })?;

        let embedded = wrapper.proof().public_output().map_err(|e| {
            ProofError::CryptographicVerificationFailure {
                reason: format!("Unreadable public output: {}", e),
            }
        })?;

        if let Err(e) = B::bind(wrapper.claim_unverified(), &embedded) {
            tracing::warn!("Claim binding failed wrapper={}: {}", wrapper.id(), e);
            return Err(e);
        }

        tracing::info!("Proof verified kind={} wrapper={}", B::KIND, wrapper.id());
        Ok(())
    }
}
