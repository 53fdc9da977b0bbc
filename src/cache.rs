//! The forward-query result cache: a process-local, best-effort mapping
//! from normalized query string to `(doc-id list, reported-count)` (§3, §5).
//!
//! Implemented as a readers-writer map: many concurrent readers, writers
//! take exclusive access only for the insert. A racing second query for the
//! same key may compute the result twice; that is acceptable (§5).

use rustc_hash::FxHashMap;
use std::sync::RwLock;

/// A cached forward-search result: the full, sorted document id list and
/// the `found` count recorded before truncation.
#[derive(Debug, Clone)]
pub struct CachedResult {
    /// Full sorted document id list (pre-truncation).
    pub doc_ids: Vec<i64>,
    /// `found` count recorded before truncation.
    pub found: usize,
}

/// The result cache. Unbounded unless the engine is configured with
/// caching globally disabled, in which case the cache is never consulted.
#[derive(Default)]
pub struct ResultCache {
    entries: RwLock<FxHashMap<String, CachedResult>>,
}

impl ResultCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a normalized query. Returns a clone of the cached entry.
    pub fn get(&self, normalized_query: &str) -> Option<CachedResult> {
        self.entries.read().unwrap().get(normalized_query).cloned()
    }

    /// Inserts or overwrites the cached entry for a normalized query.
    pub fn insert(&self, normalized_query: String, result: CachedResult) {
        self.entries.write().unwrap().insert(normalized_query, result);
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}
