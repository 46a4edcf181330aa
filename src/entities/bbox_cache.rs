//! Time-keyed bounding volume cache owned by a proxy shape.
//!
//! Entries are never evicted individually: the whole map goes when the
//! stage, the prim or the purpose filter changes.

use std::collections::BTreeMap;

use crate::usd::{BBox3, TimeCode};

/// Cached bounds at one time code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedBounds {
    pub bbox: BBox3,
    /// false when the prim had no extent and `bbox` was seeded.
    pub valid: bool,
}

#[derive(Debug, Default)]
pub struct BoundingBoxCache {
    entries: BTreeMap<TimeCode, CachedBounds>,
    hits: u64,
    misses: u64,
}

impl BoundingBoxCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, time: TimeCode) -> Option<CachedBounds> {
        match self.entries.get(&time) {
            Some(b) => {
                self.hits += 1;
                Some(*b)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Peek without touching hit counters.
    pub fn peek(&self, time: TimeCode) -> Option<&CachedBounds> {
        self.entries.get(&time)
    }

    pub fn insert(&mut self, time: TimeCode, bounds: CachedBounds) {
        self.entries.insert(time, bounds);
    }

    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = TimeCode> + '_ {
        self.entries.keys().copied()
    }

    /// (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
