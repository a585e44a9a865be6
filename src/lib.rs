//! # proofport-claims
//!
//! Claim-bound proof wrappers over an external zero-knowledge engine.
//!
//! The engine produces and checks proofs; this crate decides when a proof may
//! be trusted as evidence for a particular value:
//!
//! - [`ProofWrapper`] binds an opaque proof to the claim it is said to attest.
//!   The claim is only readable through [`ProofWrapper::claim`], which
//!   verifies first.
//! - [`ClaimBinder`] recomputes the circuit's commitment from the claim and
//!   compares it with the commitment in the proof's public output.
//! - [`derive`] turns a verified proof of one claim into an (unverified) proof
//!   of a related, narrower claim via an engine transformation.
//! - [`CachedVerifier`] wraps any [`Verify`] chain and memoizes success so a
//!   repeated `verify()` skips the engine.
//!
//! ```text
//!   handle ──► ProofWrapper ──verify()──► CachedVerifier ──miss──► DirectVerifier
//!                  │                           │ hit                 │ engine verify
//!                  │ claim()                   ▼                     │ ClaimBinder::bind
//!                  └──────────────────────► Ok(&claim) ◄─────────────┘
//! ```
//!
//! ## Feature flags
//!
//! - `noir`: a backend over noir_rs / barretenberg (UltraHonk, Keccak).

pub mod binder;
pub mod cache;
pub mod claims;
pub mod commitment;
pub mod config;
pub mod derive;
pub mod engine;
pub mod error;
pub mod types;
pub mod verifier;
pub mod wrapper;

#[cfg(feature = "noir")]
pub mod circuit;
#[cfg(feature = "noir")]
pub mod prover;

#[cfg(test)]
mod testing;

pub use binder::ClaimBinder;
pub use cache::{CacheKey, CacheStats, CachedVerifier, KeyScope};
pub use claims::{GeoPoint, GeoPointBinder, GridCell, GridCellBinder};
pub use commitment::Commitment;
pub use config::CacheConfig;
pub use derive::{derive, derive_carried, derive_grid_cell};
pub use engine::{CircuitTransform, EngineError, ProofHandle};
pub use error::{ProofError, Result};
pub use types::{ProofEnvelope, SerializedProof};
pub use verifier::{DirectVerifier, Verify};
pub use wrapper::{ProofWrapper, WrapperId};

#[cfg(feature = "noir")]
pub use circuit::{CircuitLayout, CircuitRegistry};
#[cfg(feature = "noir")]
pub use prover::{NoirBackend, NoirProof, NoirTransform};
