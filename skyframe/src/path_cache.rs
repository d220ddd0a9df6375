use crate::transform::Transform;
use crate::FrameIdString;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A resolved route between two frames together with its folded transform.
#[derive(Clone)]
pub(crate) struct CachedRoute {
    /// Edges along the route, in application order
    pub(crate) path: Arc<[Arc<Transform>]>,
    /// Composite of `path`, `None` for the identity
    pub(crate) composite: Option<Arc<Transform>>,
}

struct CacheEntry {
    route: CachedRoute,
    /// Graph version the route was computed against
    version: u64,
    /// Logical tick of the last hit
    last_access: u64,
}

/// Concurrent cache of routes keyed by (source, target).
///
/// Every mutation of the graph bumps the version and drops all entries, so a
/// route is never served against a topology it was not computed for.
pub(crate) struct PathCache {
    entries: DashMap<(FrameIdString, FrameIdString), CacheEntry>,
    max_size: usize,
    version: AtomicU64,
    tick: AtomicU64,
}

impl PathCache {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(max_size),
            max_size,
            version: AtomicU64::new(0),
            tick: AtomicU64::new(0),
        }
    }

    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Get a cached route if one exists for the current graph version
    pub(crate) fn get(&self, from: &FrameIdString, to: &FrameIdString) -> Option<CachedRoute> {
        let version = self.version();
        let mut entry = self.entries.get_mut(&(*from, *to))?;
        if entry.version != version {
            return None;
        }
        entry.last_access = self.next_tick();
        Some(entry.route.clone())
    }

    /// Add a route computed against `version`. Stale routes are dropped.
    pub(crate) fn insert(
        &self,
        from: &FrameIdString,
        to: &FrameIdString,
        route: CachedRoute,
        version: u64,
    ) {
        if self.max_size == 0 || version != self.version() {
            return;
        }

        // If the cache is at capacity, remove the least recently used entry
        if self.entries.len() >= self.max_size {
            let oldest_key = self
                .entries
                .iter()
                .min_by_key(|entry| entry.last_access)
                .map(|entry| *entry.key());

            if let Some(key_to_remove) = oldest_key {
                self.entries.remove(&key_to_remove);
            }
        }

        self.entries.insert(
            (*from, *to),
            CacheEntry {
                route,
                version,
                last_access: self.next_tick(),
            },
        );
    }

    /// Drops every entry and moves to a new version.
    pub(crate) fn invalidate(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }

    /// Clear all entries without touching the version
    pub(crate) fn clear(&self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
