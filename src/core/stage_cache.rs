//! Stage arena: shared ownership of composed stages by identity.
//!
//! Structure: HashMap<StageKey, Weak<Stage>>
//! - Nodes hold a [`StageHandle`] (key + strong reference)
//! - Two nodes resolving to the same key share one `Stage`
//! - When the last handle for a key drops, the entry is evicted
//!
//! The arena never keeps a stage alive by itself.

use log::debug;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::error::ProxyError;
use crate::usd::path::PrimPath;
use crate::usd::stage::Stage;

/// Stage identity: resolved root layer, population mask, session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageKey {
    pub identifier: String,
    pub excludes: Vec<PrimPath>,
    pub session: Option<u64>,
}

impl StageKey {
    pub fn new(identifier: impl Into<String>, mut excludes: Vec<PrimPath>, session: Option<u64>) -> Self {
        excludes.sort();
        excludes.dedup();
        Self {
            identifier: identifier.into(),
            excludes,
            session,
        }
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier)?;
        if !self.excludes.is_empty() {
            write!(f, " excl={}", self.excludes.len())?;
        }
        if let Some(s) = self.session {
            write!(f, " session={}", s)?;
        }
        Ok(())
    }
}

/// Arena statistics
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    compositions: AtomicU64,
    evictions: AtomicU64,
}

/// Copy of the arena counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// Successful stage compositions.
    pub compositions: u64,
    pub evictions: u64,
}

impl CacheStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

struct Inner {
    entries: Mutex<HashMap<StageKey, Weak<Stage>>>,
    stats: CacheStats,
}

static GLOBAL_CACHE: Lazy<StageCache> = Lazy::new(StageCache::new);

/// Process-wide table of shared stages. Cheap to clone.
#[derive(Clone)]
pub struct StageCache {
    inner: Arc<Inner>,
}

impl Default for StageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageCache")
            .field("entries", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl StageCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Arena shared by every node that isn't given its own.
    pub fn global() -> StageCache {
        GLOBAL_CACHE.clone()
    }

    /// Shared stage for `key`, composing it with `open` on a miss.
    pub fn get_or_open(
        &self,
        key: StageKey,
        open: impl FnOnce() -> Result<Stage, ProxyError>,
    ) -> Result<StageHandle, ProxyError> {
        let mut entries = self.inner.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stage) = entries.get(&key).and_then(Weak::upgrade) {
            self.inner.stats.hits.fetch_add(1, Ordering::Relaxed);
            debug!("StageCache hit: {} (stage {})", key, stage.id());
            return Ok(StageHandle::new(key, stage, self.clone()));
        }

        self.inner.stats.misses.fetch_add(1, Ordering::Relaxed);
        let stage = Arc::new(open()?);
        self.inner.stats.compositions.fetch_add(1, Ordering::Relaxed);
        debug!("StageCache composed: {} (stage {})", key, stage.id());
        entries.insert(key.clone(), Arc::downgrade(&stage));
        Ok(StageHandle::new(key, stage, self.clone()))
    }

    /// Look up a live stage without composing.
    pub fn find(&self, key: &StageKey) -> Option<StageHandle> {
        let entries = self.inner.entries.lock().unwrap_or_else(|e| e.into_inner());
        let stage = entries.get(key).and_then(Weak::upgrade)?;
        Some(StageHandle::new(key.clone(), stage, self.clone()))
    }

    /// Forget `key` so the next open composes a fresh stage. Existing
    /// handles keep the old stage alive until they drop.
    pub fn evict(&self, key: &StageKey) -> bool {
        let removed = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some();
        if removed {
            self.inner.stats.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("StageCache evicted: {}", key);
        }
        removed
    }

    /// Drop entries whose stage is gone.
    pub fn purge(&self) -> usize {
        let mut entries = self.inner.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, weak| weak.strong_count() > 0);
        let purged = before - entries.len();
        self.inner.stats.evictions.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    /// Called by a handle about to drop its reference to `stage`.
    fn release(&self, key: &StageKey, stage: &Arc<Stage>) {
        let mut entries = self.inner.entries.lock().unwrap_or_else(|e| e.into_inner());
        let last = entries
            .get(key)
            .map(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(stage)) && Arc::strong_count(stage) == 1)
            .unwrap_or(false);
        if last {
            entries.remove(key);
            self.inner.stats.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("StageCache released: {}", key);
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        let s = &self.inner.stats;
        CacheStatsSnapshot {
            hits: s.hits.load(Ordering::Relaxed),
            misses: s.misses.load(Ordering::Relaxed),
            compositions: s.compositions.load(Ordering::Relaxed),
            evictions: s.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Strong reference to a shared stage plus the key it is filed under.
///
/// Dropping the last handle for a key evicts the arena entry.
pub struct StageHandle {
    key: StageKey,
    stage: Arc<Stage>,
    cache: StageCache,
}

impl StageHandle {
    fn new(key: StageKey, stage: Arc<Stage>, cache: StageCache) -> Self {
        Self {
            key,
            stage,
            cache,
        }
    }

    pub fn key(&self) -> &StageKey {
        &self.key
    }

    pub fn stage(&self) -> &Arc<Stage> {
        &self.stage
    }

    /// Both handles point at the same stage object.
    pub fn same_stage(&self, other: &StageHandle) -> bool {
        Arc::ptr_eq(self.stage(), other.stage())
    }
}

impl Clone for StageHandle {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            stage: Arc::clone(&self.stage),
            cache: self.cache.clone(),
        }
    }
}

impl fmt::Debug for StageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageHandle")
            .field("key", &self.key)
            .field("stage", &self.stage.id())
            .finish()
    }
}

impl Drop for StageHandle {
    fn drop(&mut self) {
        self.cache.release(&self.key, &self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notice_bus::NoticeBus;
    use crate::usd::layer::LayerData;

    fn open_empty(name: &str) -> Result<Stage, ProxyError> {
        Stage::open(name, LayerData::default(), None, vec![], NoticeBus::new())
    }

    #[test]
    fn test_shared_by_key() {
        let cache = StageCache::new();
        let key = StageKey::new("a", vec![], None);
        let h1 = cache.get_or_open(key.clone(), || open_empty("a")).unwrap();
        let h2 = cache.get_or_open(key.clone(), || open_empty("a")).unwrap();
        assert!(h1.same_stage(&h2));
        let stats = cache.stats();
        assert_eq!(stats.compositions, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicted_on_last_drop() {
        let cache = StageCache::new();
        let key = StageKey::new("a", vec![], None);
        let h1 = cache.get_or_open(key.clone(), || open_empty("a")).unwrap();
        let h2 = h1.clone();
        drop(h1);
        assert_eq!(cache.len(), 1);
        drop(h2);
        assert!(cache.is_empty());
        assert!(cache.find(&key).is_none());
    }

    #[test]
    fn test_key_normalizes_excludes() {
        let a = PrimPath::parse("/A").unwrap();
        let b = PrimPath::parse("/B").unwrap();
        assert_eq!(
            StageKey::new("x", vec![b.clone(), a.clone()], None),
            StageKey::new("x", vec![a.clone(), b, a], None)
        );
        assert_ne!(StageKey::new("x", vec![], None), StageKey::new("x", vec![], Some(1)));
    }

    #[test]
    fn test_evict_forces_recompose() {
        let cache = StageCache::new();
        let key = StageKey::new("a", vec![], None);
        let old = cache.get_or_open(key.clone(), || open_empty("a")).unwrap();
        assert!(cache.evict(&key));
        let new = cache.get_or_open(key.clone(), || open_empty("a")).unwrap();
        assert!(!old.same_stage(&new));
        assert_eq!(cache.stats().compositions, 2);
        // Dropping the stale handle must not evict the fresh entry
        drop(old);
        assert!(cache.find(&key).is_some());
    }

    #[test]
    fn test_failed_open_not_cached() {
        let cache = StageCache::new();
        let key = StageKey::new("bad", vec![], None);
        let res = cache.get_or_open(key, || Err(ProxyError::CompositionError("boom".into())));
        assert!(res.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().compositions, 0);
    }
}
