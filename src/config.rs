use std::num::NonZeroUsize;

use crate::cache::KeyScope;

/// Default number of cached verification outcomes.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

pub const CACHE_CAPACITY_VAR: &str = "PROOF_CACHE_CAPACITY";
pub const CACHE_KEY_SCOPE_VAR: &str = "PROOF_CACHE_KEY_SCOPE";

/// Settings for [`crate::cache::CachedVerifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries kept; least recently used are evicted first.
    ///
    /// Entries with a verification in flight are passed over while an idle
    /// entry is available. Once more keys than this are in flight at the same
    /// time, one of them is evicted and a later caller on that key runs the
    /// check again, so size it above the expected number of concurrent
    /// verifications.
    pub capacity: NonZeroUsize,
    pub key_scope: KeyScope,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            key_scope: KeyScope::Instance,
        }
    }
}

impl CacheConfig {
    /// Read `PROOF_CACHE_CAPACITY` and `PROOF_CACHE_KEY_SCOPE`, falling back
    /// to defaults for anything unset or invalid.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(CACHE_CAPACITY_VAR) {
            match raw.trim().parse::<NonZeroUsize>() {
                Ok(capacity) => config.capacity = capacity,
                Err(e) => tracing::warn!(
                    "Invalid {}={:?} ({}), using {}",
                    CACHE_CAPACITY_VAR,
                    raw,
                    e,
                    config.capacity
                ),
            }
        }

        if let Some(raw) = lookup(CACHE_KEY_SCOPE_VAR) {
            match raw.trim().parse::<KeyScope>() {
                Ok(scope) => config.key_scope = scope,
                Err(e) => tracing::warn!(
                    "Invalid {}={:?} ({}), using {:?}",
                    CACHE_KEY_SCOPE_VAR,
                    raw,
                    e,
                    config.key_scope
                ),
            }
        }

        config
    }
}
