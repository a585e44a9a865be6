//! Claim binding: tie an out-of-circuit claim to an in-circuit commitment

use crate::commitment::Commitment;
use crate::error::{ProofError, Result};

/// Per-kind strategy that recomputes the circuit's commitment for a claim.
///
/// `commit` must use the same scheme the circuit uses in-circuit, otherwise
/// every honest proof fails to bind.
pub trait ClaimBinder: Send + Sync + 'static {
    /// The semantic value a proof of this kind attests to.
    type Claim: Send + Sync + 'static;

    /// Stable tag identifying the kind in diagnostics and envelopes.
    const KIND: &'static str;

    fn commit(claim: &Self::Claim) -> Commitment;

    /// Compare the recomputed commitment against the embedded one.
    ///
    /// Only the public output is inspected, so a mismatch report carries the
    /// two commitments and nothing else.
    fn bind(claim: &Self::Claim, embedded: &Commitment) -> Result<()> {
        let expected = Self::commit(claim);
        if expected == *embedded {
            Ok(())
        } else {
            Err(ProofError::ClaimMismatch {
                kind: Self::KIND,
                expected,
                embedded: *embedded,
            })
        }
    }
}
