//! Memoized rule sets with a TTL and explicit invalidation.

use super::config::PathMatchMode;
use super::ip_filter::AllowList;
use super::path_matcher::PathMatcher;
use super::store::RuleStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache key for a rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The allow-list.
    AllowedIps,
    /// The protected-path patterns.
    ProtectedPaths,
}

impl CacheKey {
    /// Key name used in log events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllowedIps => "allowed_ips",
            Self::ProtectedPaths => "protected_paths",
        }
    }
}

/// A cached value and its expiry. `None` never expires.
#[derive(Debug)]
struct CacheEntry<T> {
    value: Arc<T>,
    expires_at: Option<Instant>,
}

/// One cache slot. The whole entry is replaced on refresh so readers see
/// either the old or the new value.
#[derive(Debug)]
struct Slot<T> {
    entry: RwLock<Option<CacheEntry<T>>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            entry: RwLock::new(None),
        }
    }

    fn get(&self, now: Instant) -> Option<Arc<T>> {
        let guard = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|e| e.expires_at.map_or(true, |at| now < at))
            .map(|e| Arc::clone(&e.value))
    }

    fn put(&self, value: Arc<T>, expires_at: Option<Instant>) {
        let mut guard = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(CacheEntry { value, expires_at });
    }

    fn clear(&self) {
        let mut guard = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Reads served from a live entry.
    pub hits: AtomicU64,
    /// Reads that had to resolve.
    pub misses: AtomicU64,
    /// Calls to `invalidate`.
    pub invalidations: AtomicU64,
    /// Resolutions served but not stored (degraded or raced with invalidation).
    pub uncached_resolutions: AtomicU64,
}

/// Process-wide memoized view of the [`RuleStore`].
///
/// Share it via `Arc`. Resolution happens outside the slot locks; a
/// resolution that started before an `invalidate()` is still returned to
/// its caller but is not stored, so the next read re-resolves.
#[derive(Debug)]
pub struct RuleCache {
    store: RuleStore,
    ttl: Duration,
    match_mode: PathMatchMode,
    allowed: Slot<AllowList>,
    protected: Slot<PathMatcher>,
    generation: AtomicU64,
    stats: CacheStats,
}

impl RuleCache {
    /// Create a cache over a store. A zero TTL disables caching.
    #[must_use]
    pub fn new(store: RuleStore, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            match_mode: PathMatchMode::default(),
            allowed: Slot::new(),
            protected: Slot::new(),
            generation: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    /// Set how protected-path patterns are compiled.
    #[must_use]
    pub fn with_match_mode(mut self, mode: PathMatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// The resolved allow-list.
    pub fn allowed_addresses(&self) -> Arc<AllowList> {
        self.get_or_resolve(CacheKey::AllowedIps, &self.allowed, || {
            let resolved = self.store.resolve_allowed_addresses();
            (AllowList::new(resolved.values), resolved.complete)
        })
    }

    /// The resolved protected-path matcher.
    pub fn protected_paths(&self) -> Arc<PathMatcher> {
        self.get_or_resolve(CacheKey::ProtectedPaths, &self.protected, || {
            let resolved = self.store.resolve_protected_patterns();
            (
                PathMatcher::new(&resolved.values, self.match_mode),
                resolved.complete,
            )
        })
    }

    /// Drop both cached entries regardless of TTL.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.store.detach_in_flight();
        self.allowed.clear();
        self.protected.clear();
        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!("rule cache invalidated");
    }

    /// Configured TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// Cache statistics.
    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn get_or_resolve<T>(
        &self,
        key: CacheKey,
        slot: &Slot<T>,
        resolve: impl FnOnce() -> (T, bool),
    ) -> Arc<T> {
        if !self.ttl.is_zero() {
            if let Some(value) = slot.get(Instant::now()) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return value;
            }
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let generation = self.generation.load(Ordering::SeqCst);
        let (value, complete) = resolve();
        let value = Arc::new(value);

        if self.ttl.is_zero() {
            return value;
        }

        if complete && self.generation.load(Ordering::SeqCst) == generation {
            slot.put(Arc::clone(&value), Instant::now().checked_add(self.ttl));
            debug!(key = key.as_str(), ttl_secs = self.ttl.as_secs(), "rule set cached");
        } else {
            self.stats.uncached_resolutions.fetch_add(1, Ordering::Relaxed);
            debug!(key = key.as_str(), complete, "rule set served without caching");
        }

        value
    }
}
