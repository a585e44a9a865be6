//! Memoization of successful verifications.
//!
//! [`CachedVerifier`] wraps another [`Verify`] implementation and remembers
//! which keys have verified successfully. Only success is stored: a failure
//! always propagates and the next call runs the full chain again.
//!
//! ## Key scope
//!
//! - [`KeyScope::Instance`] (default): keyed by [`WrapperId`]. Two wrappers
//!   never share an entry, even over byte-identical proofs and claims, so each
//!   one runs its own engine check and claim binding once.
//! - [`KeyScope::ProofBytes`]: keyed by the proof fingerprint plus the claim
//!   commitment. A wrapper rebuilt from the same serialized proof and claim is
//!   trusted because another instance verified. This is a trust relaxation:
//!   only enable it when every wrapper of this kind is built from the same
//!   engine and the same binder, which is what the key encodes.
//!
//! ## Concurrency
//!
//! Each key owns a `tokio::sync::OnceCell`. Concurrent callers on one key run
//! the chain once; racers wait for that outcome and never see a half-finished
//! verification as success. A failed attempt leaves the cell empty; a caller
//! already waiting on it retries on the same cell, and the entry is removed
//! only when no caller holds it any more. Eviction skips entries that callers
//! are still waiting on while an idle entry is available.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::binder::ClaimBinder;
use crate::commitment::Commitment;
use crate::config::CacheConfig;
use crate::engine::ProofHandle;
use crate::error::{ProofError, Result};
use crate::verifier::Verify;
use crate::wrapper::{ProofWrapper, WrapperId};

/// What a cache entry is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyScope {
    #[default]
    Instance,
    ProofBytes,
}

impl fmt::Display for KeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyScope::Instance => write!(f, "instance"),
            KeyScope::ProofBytes => write!(f, "proof-bytes"),
        }
    }
}

impl FromStr for KeyScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "instance" => Ok(KeyScope::Instance),
            "proof-bytes" => Ok(KeyScope::ProofBytes),
            other => Err(format!("unknown key scope: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Instance(WrapperId),
    ProofBytes {
        kind: &'static str,
        proof: [u8; 32],
        claim: Commitment,
    },
}

/// Counters for a [`CachedVerifier`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Calls answered from a completed entry.
    pub hits: u64,
    /// Calls that found no completed entry.
    pub misses: u64,
    /// Runs of the inner chain.
    pub verifications: u64,
    /// Inner runs that failed.
    pub failures: u64,
}

/// A verifier that memoizes success of an inner verifier.
pub struct CachedVerifier<V> {
    inner: V,
    key_scope: KeyScope,
    entries: Mutex<LruCache<CacheKey, Arc<OnceCell<()>>>>,
    stats: Mutex<CacheStats>,
}

impl<V> CachedVerifier<V> {
    pub fn new(inner: V, capacity: NonZeroUsize, key_scope: KeyScope) -> Self {
        Self {
            inner,
            key_scope,
            entries: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn from_config(inner: V, config: &CacheConfig) -> Self {
        Self::new(inner, config.capacity, config.key_scope)
    }

    pub fn key_scope(&self) -> KeyScope {
        self.key_scope
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }

    /// Number of keys holding an entry, completed or in flight.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn key_for<B, P>(&self, wrapper: &ProofWrapper<B, P>) -> Result<CacheKey>
    where
        B: ClaimBinder,
        P: ProofHandle,
    {
        match self.key_scope {
            KeyScope::Instance => Ok(CacheKey::Instance(wrapper.id())),
            KeyScope::ProofBytes => {
                let proof = wrapper
                    .proof()
                    .fingerprint()
                    .map_err(|e| ProofError::Serialization(e.to_string()))?;
                Ok(CacheKey::ProofBytes {
                    kind: B::KIND,
                    proof,
                    claim: B::commit(wrapper.claim_unverified()),
                })
            }
        }
    }

    fn entry(&self, key: &CacheKey) -> Arc<OnceCell<()>> {
        let mut entries = self.entries.lock();
        if let Some(cell) = entries.get(key) {
            return cell.clone();
        }
        if entries.len() == entries.cap().get() {
            // Make room with the least recently used entry nobody is holding.
            // When every entry is in flight the plain LRU victim goes.
            let idle = entries
                .iter()
                .rev()
                .find(|&(_, cell)| Arc::strong_count(cell) == 1)
                .map(|(victim, _)| victim.clone());
            if let Some(idle) = idle {
                entries.pop(&idle);
            }
        }
        let cell = Arc::new(OnceCell::new());
        entries.put(key.clone(), cell.clone());
        cell
    }

    // Drop an entry that never completed once its last holder lets go. The map
    // and the caller each hold one reference; `entry` clones under this lock,
    // so the count cannot grow while it is checked.
    fn release(&self, key: &CacheKey, cell: &Arc<OnceCell<()>>) {
        let mut entries = self.entries.lock();
        let abandoned = entries.peek(key).is_some_and(|current| {
            Arc::ptr_eq(current, cell)
                && !current.initialized()
                && Arc::strong_count(current) == 2
        });
        if abandoned {
            entries.pop(key);
        }
    }
}

// Holds a caller's reference to an entry until its verification settles,
// whether it succeeded, failed or the future was dropped.
struct InFlight<'a, V> {
    cache: &'a CachedVerifier<V>,
    key: CacheKey,
    cell: Arc<OnceCell<()>>,
}

impl<V> Drop for InFlight<'_, V> {
    fn drop(&mut self) {
        self.cache.release(&self.key, &self.cell);
    }
}

#[async_trait]
impl<B, P, V> Verify<B, P> for CachedVerifier<V>
where
    B: ClaimBinder,
    P: ProofHandle,
    V: Verify<B, P>,
{
    async fn verify(&self, wrapper: &ProofWrapper<B, P>) -> Result<()> {
        let key = self.key_for(wrapper)?;
        let cell = self.entry(&key);

        if cell.initialized() {
            self.stats.lock().hits += 1;
            tracing::debug!("Verification cache hit kind={} wrapper={}", B::KIND, wrapper.id());
            return Ok(());
        }
        self.stats.lock().misses += 1;
        tracing::debug!("Verification cache miss kind={} wrapper={}", B::KIND, wrapper.id());

        let entry = InFlight {
            cache: self,
            key,
            cell,
        };
        let outcome = entry
            .cell
            .get_or_try_init(|| async {
                self.stats.lock().verifications += 1;
                self.inner.verify(wrapper).await
            })
            .await;

        match outcome {
            Ok(_) => Ok(()),
            Err(e) => {
                self.stats.lock().failures += 1;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{GeoPoint, GeoPointBinder};
    use crate::testing::{init_tracing, MockProof};
    use crate::verifier::DirectVerifier;
    use std::time::Duration;

    type PointProof = ProofWrapper<GeoPointBinder, MockProof>;

    fn nyc() -> GeoPoint {
        GeoPoint::new(40.0, -74.0).unwrap()
    }

    fn north_of_nyc() -> GeoPoint {
        GeoPoint::new(41.0, -74.0).unwrap()
    }

    fn cached(scope: KeyScope) -> Arc<CachedVerifier<DirectVerifier>> {
        Arc::new(CachedVerifier::new(
            DirectVerifier,
            NonZeroUsize::new(8).unwrap(),
            scope,
        ))
    }

    fn spawn_verify(wrapper: &Arc<PointProof>) -> tokio::task::JoinHandle<Result<()>> {
        let wrapper = wrapper.clone();
        tokio::spawn(async move { wrapper.verify().await })
    }

    #[test]
    fn test_key_scope_parse_and_display() {
        assert_eq!("instance".parse::<KeyScope>().unwrap(), KeyScope::Instance);
        assert_eq!("proof-bytes".parse::<KeyScope>().unwrap(), KeyScope::ProofBytes);
        assert!("bytes".parse::<KeyScope>().is_err());
        assert_eq!(KeyScope::ProofBytes.to_string(), "proof-bytes");
        assert_eq!(
            serde_json::to_value(KeyScope::ProofBytes).unwrap(),
            "proof-bytes"
        );
    }

    #[tokio::test]
    async fn test_second_verify_skips_engine() {
        init_tracing();
        let cache = cached(KeyScope::Instance);
        let proof = MockProof::valid(GeoPointBinder::commit(&nyc()));
        let calls = proof.calls();
        let wrapper = PointProof::with_verifier(proof, nyc(), cache.clone());

        wrapper.verify().await.unwrap();
        wrapper.verify().await.unwrap();
        assert_eq!(*wrapper.claim().await.unwrap(), nyc());

        assert_eq!(calls.verifications(), 1);
        let stats = cache.stats();
        assert_eq!(stats.verifications, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_memoized() {
        let cache = cached(KeyScope::Instance);
        let proof = MockProof::invalid(GeoPointBinder::commit(&nyc()));
        let calls = proof.calls();
        let wrapper = PointProof::with_verifier(proof, nyc(), cache.clone());

        assert!(wrapper.verify().await.is_err());
        assert!(wrapper.verify().await.is_err());
        assert_eq!(calls.verifications(), 2);
        assert_eq!(cache.stats().failures, 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_mismatch_is_not_memoized() {
        let cache = cached(KeyScope::Instance);
        let proof = MockProof::valid(GeoPointBinder::commit(&nyc()));
        let wrapper = PointProof::with_verifier(proof, north_of_nyc(), cache.clone());
        for _ in 0..2 {
            assert!(matches!(
                wrapper.verify().await,
                Err(ProofError::ClaimMismatch { .. })
            ));
        }
        assert_eq!(cache.stats().verifications, 2);
    }

    #[tokio::test]
    async fn test_instance_scope_isolates_identical_wrappers() {
        let cache = cached(KeyScope::Instance);
        let proof = MockProof::valid(GeoPointBinder::commit(&nyc()));
        let calls = proof.calls();
        let a = PointProof::with_verifier(proof.clone(), nyc(), cache.clone());
        let b = PointProof::with_verifier(proof, nyc(), cache.clone());

        a.verify().await.unwrap();
        b.verify().await.unwrap();
        assert_eq!(calls.verifications(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_instance_scope_does_not_leak_to_forged_claim() {
        let cache = cached(KeyScope::Instance);
        let proof = MockProof::valid(GeoPointBinder::commit(&nyc()));
        let honest = PointProof::with_verifier(proof.clone(), nyc(), cache.clone());
        let forged = PointProof::with_verifier(proof, north_of_nyc(), cache.clone());

        honest.verify().await.unwrap();
        assert!(matches!(
            forged.verify().await,
            Err(ProofError::ClaimMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_proof_bytes_scope_shares_identical_wrappers() {
        let cache = cached(KeyScope::ProofBytes);
        let proof = MockProof::valid(GeoPointBinder::commit(&nyc()));
        let calls = proof.calls();
        let a = PointProof::with_verifier(proof.clone(), nyc(), cache.clone());
        let restored = PointProof::deserialize(&a.serialize().unwrap()).unwrap();
        let b = PointProof::with_verifier(restored, nyc(), cache.clone());

        a.verify().await.unwrap();
        b.verify().await.unwrap();
        // b was trusted on a's result; its own handle was never checked.
        assert_eq!(calls.verifications(), 1);
        assert_eq!(b.proof().calls().verifications(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_proof_bytes_scope_still_binds_claim() {
        let cache = cached(KeyScope::ProofBytes);
        let proof = MockProof::valid(GeoPointBinder::commit(&nyc()));
        let honest = PointProof::with_verifier(proof.clone(), nyc(), cache.clone());
        let forged = PointProof::with_verifier(proof, north_of_nyc(), cache.clone());

        honest.verify().await.unwrap();
        assert!(matches!(
            forged.verify().await,
            Err(ProofError::ClaimMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_verify_runs_engine_once() {
        let cache = cached(KeyScope::Instance);
        let proof = MockProof::valid(GeoPointBinder::commit(&nyc()))
            .with_delay(Duration::from_millis(50));
        let calls = proof.calls();
        let wrapper = Arc::new(PointProof::with_verifier(proof, nyc(), cache.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let wrapper = wrapper.clone();
                tokio::spawn(async move { wrapper.verify().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(calls.verifications(), 1);
        assert_eq!(cache.stats().verifications, 1);
    }

    #[tokio::test]
    async fn test_concurrent_independent_wrappers() {
        let cache = cached(KeyScope::Instance);
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let point = GeoPoint::new(10.0 * i as f64, 20.0).unwrap();
                let proof = MockProof::valid(GeoPointBinder::commit(&point))
                    .with_delay(Duration::from_millis(10));
                let wrapper = PointProof::with_verifier(proof, point, cache.clone());
                tokio::spawn(async move { wrapper.claim().await.copied() })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let claim = handle.await.unwrap().unwrap();
            assert_eq!(claim.latitude(), 10.0 * i as f64);
        }
        assert_eq!(cache.stats().verifications, 4);
    }

    #[tokio::test]
    async fn test_waiter_retries_failed_entry_once() {
        init_tracing();
        let cache = cached(KeyScope::Instance);
        let proof = MockProof::valid(GeoPointBinder::commit(&nyc()))
            .rejecting_first(1)
            .with_delay(Duration::from_millis(50));
        let calls = proof.calls();
        let wrapper = Arc::new(PointProof::with_verifier(proof, nyc(), cache.clone()));

        let first = spawn_verify(&wrapper);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = spawn_verify(&wrapper);
        assert!(first.await.unwrap().is_err());

        // second is re-running the check on the entry first left behind.
        let third = spawn_verify(&wrapper);
        second.await.unwrap().unwrap();
        third.await.unwrap().unwrap();

        assert_eq!(calls.verifications(), 2);
        let stats = cache.stats();
        assert_eq!(stats.verifications, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(cache.len(), 1);

        wrapper.verify().await.unwrap();
        assert_eq!(calls.verifications(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_verify_releases_entry() {
        let cache = cached(KeyScope::Instance);
        let proof = MockProof::valid(GeoPointBinder::commit(&nyc()))
            .with_delay(Duration::from_millis(50));
        let calls = proof.calls();
        let wrapper = PointProof::with_verifier(proof, nyc(), cache.clone());

        let cancelled = tokio::time::timeout(Duration::from_millis(5), wrapper.verify()).await;
        assert!(cancelled.is_err());
        assert!(cache.is_empty());

        wrapper.verify().await.unwrap();
        assert_eq!(calls.verifications(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_eviction_spares_in_flight_entry() {
        let cache = Arc::new(CachedVerifier::new(
            DirectVerifier,
            NonZeroUsize::new(2).unwrap(),
            KeyScope::Instance,
        ));
        let commitment = GeoPointBinder::commit(&nyc());
        let slow = MockProof::valid(commitment).with_delay(Duration::from_millis(50));
        let slow_calls = slow.calls();
        let slow = Arc::new(PointProof::with_verifier(slow, nyc(), cache.clone()));

        let first = spawn_verify(&slow);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let quick = PointProof::with_verifier(MockProof::valid(commitment), nyc(), cache.clone());
        quick.verify().await.unwrap();
        // The cache is full; the idle entry makes room, not the in-flight one.
        let other = PointProof::with_verifier(MockProof::valid(commitment), nyc(), cache.clone());
        other.verify().await.unwrap();

        let second = spawn_verify(&slow);
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(slow_calls.verifications(), 1);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_eviction_forces_reverification() {
        let cache = Arc::new(CachedVerifier::new(
            DirectVerifier,
            NonZeroUsize::new(1).unwrap(),
            KeyScope::Instance,
        ));
        let proof = MockProof::valid(GeoPointBinder::commit(&nyc()));
        let calls = proof.calls();
        let a = PointProof::with_verifier(proof.clone(), nyc(), cache.clone());
        let b = PointProof::with_verifier(proof, nyc(), cache.clone());

        a.verify().await.unwrap();
        b.verify().await.unwrap();
        a.verify().await.unwrap();
        assert_eq!(calls.verifications(), 3);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_drops_entries() {
        let cache = cached(KeyScope::Instance);
        let proof = MockProof::valid(GeoPointBinder::commit(&nyc()));
        let wrapper = PointProof::with_verifier(proof, nyc(), cache.clone());
        wrapper.verify().await.unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_from_config() {
        let config = CacheConfig {
            capacity: NonZeroUsize::new(3).unwrap(),
            key_scope: KeyScope::ProofBytes,
        };
        let cache = CachedVerifier::from_config(DirectVerifier, &config);
        assert_eq!(cache.key_scope(), KeyScope::ProofBytes);
        assert!(cache.is_empty());
    }
}
