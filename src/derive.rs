//! Derivation pipeline: turn a verified proof of one claim into a proof of a
//! related claim by running an engine transformation.
//!
//! Every derivation
//! 1. verifies the source wrapper and aborts if that fails,
//! 2. reads the source claim through the verifying accessor,
//! 3. narrows (or carries over) the claim,
//! 4. runs the circuit transformation on the source proof,
//! 5. wraps the new proof with the new claim.
//!
//! The result is NOT verified. Its own `verify()` runs the full chain for the
//! new circuit and claim. If the derivation future is dropped before the
//! transformation resolves, no wrapper is ever built.

use std::sync::Arc;

use crate::binder::ClaimBinder;
use crate::claims::{GeoPoint, GeoPointBinder, GridCell, GridCellBinder};
use crate::engine::{CircuitTransform, ProofHandle};
use crate::error::{ProofError, Result};
use crate::verifier::Verify;
use crate::wrapper::ProofWrapper;

/// Generic derivation with a caller-supplied narrowing step.
pub async fn derive<SB, SP, T, DB, F>(
    source: &ProofWrapper<SB, SP>,
    transform: &T,
    narrow: F,
    verifier: Arc<dyn Verify<DB, T::Output>>,
) -> Result<ProofWrapper<DB, T::Output>>
where
    SB: ClaimBinder,
    SP: ProofHandle,
    T: CircuitTransform<SP>,
    DB: ClaimBinder,
    F: FnOnce(&SB::Claim) -> Result<DB::Claim> + Send,
{
    let circuit = transform.circuit_id();
    tracing::info!(
        "Deriving {} from {} wrapper={} circuit={}",
        DB::KIND,
        SB::KIND,
        source.id(),
        circuit
    );

    let claim = source.claim().await.map_err(|e| {
        tracing::warn!(
            "Refusing derivation from unverified source wrapper={} circuit={}: {}",
            source.id(),
            circuit,
            e
        );
        e
    })?;
    let derived_claim = narrow(claim)?;

    let proof = transform.transform(source.proof()).await.map_err(|e| {
        tracing::warn!("Transformation failed circuit={}: {}", circuit, e);
        ProofError::DerivationFailure {
            circuit: circuit.to_string(),
            reason: e.to_string(),
        }
    })?;

    let derived = ProofWrapper::with_verifier(proof, derived_claim, verifier);
    tracing::info!(
        "Derived {} wrapper={} from wrapper={} circuit={}",
        DB::KIND,
        derived.id(),
        source.id(),
        circuit
    );
    Ok(derived)
}

/// Re-prove the same claim in another circuit (compression, recursion,
/// wrapping for a different verifier).
pub async fn derive_carried<B, SP, T>(
    source: &ProofWrapper<B, SP>,
    transform: &T,
    verifier: Arc<dyn Verify<B, T::Output>>,
) -> Result<ProofWrapper<B, T::Output>>
where
    B: ClaimBinder,
    B::Claim: Clone,
    SP: ProofHandle,
    T: CircuitTransform<SP>,
{
    derive(source, transform, |claim: &B::Claim| Ok(claim.clone()), verifier).await
}

/// Narrow a point proof into a proof that the point lies in a grid cell.
pub async fn derive_grid_cell<SP, T>(
    source: &ProofWrapper<GeoPointBinder, SP>,
    transform: &T,
    resolution: u8,
    verifier: Arc<dyn Verify<GridCellBinder, T::Output>>,
) -> Result<ProofWrapper<GridCellBinder, T::Output>>
where
    SP: ProofHandle,
    T: CircuitTransform<SP>,
{
    derive(
        source,
        transform,
        |point: &GeoPoint| GridCell::containing(point, resolution),
        verifier,
    )
    .await
}
