//! OCSP result caching with TTL
//!
//! An optional, caller-attached cache of validated [`CheckResult`]s, keyed by
//! [`CertId`]. Entries live until the response's `nextUpdate`.
//!
//! Only `Good` and `Unknown` results that carry a `nextUpdate` are cached.
//! A revoked certificate stays revoked, but it is never served from cache
//! so callers always see the responder's latest revocation details.
//!
//! # Thread Safety
//!
//! The cache uses DashMap and can be shared across tasks through the `Arc`
//! returned by [`OcspCache::new`] without additional synchronization.
//!
//! # Example
//!
//! ```no_run
//! use ocsp_proto::{OcspCache, OcspClient, OcspConfig};
//!
//! # fn example() -> Result<(), ocsp_proto::OcspError> {
//! let cache = OcspCache::new(1000);
//! let client = OcspClient::new(OcspConfig::default())?.with_cache(cache);
//! # Ok(())
//! # }
//! ```

use crate::request::CertId;
use crate::resolve::CheckResult;
use crate::response::CertStatus;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

/// Cache entry with expiry metadata
#[derive(Debug, Clone)]
struct CachedResult {
    result: CheckResult,

    /// `nextUpdate` of the cached response
    expires_at: DateTime<Utc>,

    /// Insertion time, for eviction order
    cached_at: Instant,
}

impl CachedResult {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe OCSP result cache with TTL and oldest-first eviction
#[derive(Debug)]
pub struct OcspCache {
    cache: DashMap<CertId, CachedResult>,

    /// Maximum number of cache entries
    max_entries: usize,
}

impl OcspCache {
    /// Create a new cache holding at most `max_entries` results
    pub fn new(max_entries: usize) -> Arc<Self> {
        Arc::new(Self {
            cache: DashMap::new(),
            max_entries,
        })
    }

    /// Look up a cached result, dropping it if `nextUpdate` has passed
    pub fn get(&self, cert_id: &CertId) -> Option<CheckResult> {
        self.get_at(cert_id, Utc::now())
    }

    pub(crate) fn get_at(&self, cert_id: &CertId, now: DateTime<Utc>) -> Option<CheckResult> {
        let entry = self.cache.get(cert_id)?;

        if entry.is_expired(now) {
            // Drop the read lock before removing
            drop(entry);
            self.cache.remove(cert_id);
            return None;
        }

        Some(entry.result.clone())
    }

    /// Cache a result if it is cacheable
    ///
    /// Returns whether the result was stored. Revoked results, results
    /// without `nextUpdate` and results already past `nextUpdate` are not.
    pub fn insert(&self, cert_id: CertId, result: &CheckResult) -> bool {
        if matches!(result.status(), CertStatus::Revoked { .. }) {
            return false;
        }
        let Some(expires_at) = result.next_update() else {
            return false;
        };
        if expires_at <= Utc::now() {
            return false;
        }

        if self.max_entries == 0 {
            return false;
        }
        // Evict oldest entry if cache is full
        if self.cache.len() >= self.max_entries && !self.cache.contains_key(&cert_id) {
            self.evict_oldest();
        }

        self.cache.insert(
            cert_id,
            CachedResult {
                result: result.clone(),
                expires_at,
                cached_at: Instant::now(),
            },
        );
        true
    }

    /// Evict the oldest cache entry
    ///
    /// O(n) scan, only run when the cache is full.
    fn evict_oldest(&self) {
        let oldest = self
            .cache
            .iter()
            .min_by_key(|entry| entry.value().cached_at)
            .map(|entry| entry.key().clone());

        if let Some(cert_id) = oldest {
            self.cache.remove(&cert_id);
        }
    }

    /// Remove every expired entry, returning how many were evicted
    pub fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.cache.len();
        self.cache.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.cache.len())
    }

    /// Number of entries currently in cache (including expired)
    pub fn size(&self) -> usize {
        self.cache.len()
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        self.cache.clear();
    }
}
