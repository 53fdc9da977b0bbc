//! The query engine (C7, §4.7): load orchestration plus the `forward`,
//! `reverse` and `node` operations served against the already-resident
//! structures.

use log::{debug, info};

use crate::cache::{CachedResult, ResultCache};
use crate::container::{Container, LoadOptions};
use crate::error::LoadError;
use crate::node::{self, PlaceResult};
use crate::ngram;

const TRIE_BONUS: i32 = 500;
const FUZZY_PENALTY: i32 = -100;
const FUZZY_RESULT_GATE: usize = 10;
const FUZZY_MIN_QUERY_LEN: usize = 2;
const FUZZY_DISTANCE_SHORT: usize = 1;
const FUZZY_DISTANCE_LONG: usize = 2;
const FUZZY_LENGTH_BREAKPOINT: usize = 4;

/// The result of a forward query (§4.7).
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardResult {
    /// Count of matching documents before truncation to `max_results`.
    pub found: usize,
    /// Materialized, ranked results, truncated to the requested size.
    pub results: Vec<PlaceResult>,
    /// Whether this result was served from the cache.
    pub cache_hit: bool,
}

/// An open engine: a loaded [`Container`] plus the process-local result
/// cache. Owned rather than a global singleton, so a process can hold more
/// than one (e.g. two fixtures loaded side by side in a test).
pub struct Engine {
    container: Container,
    cache: ResultCache,
    caching_disabled: bool,
}

impl Engine {
    /// Opens `path` and reconstructs the indexes selected by `options`.
    pub fn open<P: AsRef<std::path::Path>>(path: P, options: LoadOptions) -> Result<Self, LoadError> {
        let container = Container::open(path, options)?;
        info!(
            "loaded database: {} nodes, forward={}, reverse={}",
            container.node_count(),
            container.trie().is_some(),
            container.kdtree().is_some()
        );
        Ok(Self {
            container,
            cache: ResultCache::new(),
            caching_disabled: false,
        })
    }

    /// Disables the result cache entirely; `forward` then never reads or
    /// populates it regardless of the per-call `use_cache` flag.
    pub fn disable_cache(&mut self) {
        self.caching_disabled = true;
    }

    fn materialize(&self, document_id: u32, column: usize) -> Option<PlaceResult> {
        node::materialize(&self.container.node_table(), &self.container.arena(), document_id, column)
            .ok()
            .flatten()
    }

    fn language_column(&self, language: &str) -> usize {
        node::resolve_language_column(self.container.languages(), language)
    }

    /// Normalize → cache lookup → trie → fuzzy → rerank → cache fill →
    /// truncate, per §4.7.
    pub fn forward(&self, query: &str, max_results: i64, use_cache: bool, language: &str) -> ForwardResult {
        debug!("forward query={query:?} max_results={max_results} use_cache={use_cache} language={language}");

        if query.is_empty() {
            return ForwardResult {
                found: 0,
                results: Vec::new(),
                cache_hit: false,
            };
        }

        let column = self.language_column(language);
        let normalized = ngram::normalize(query);
        let cache_active = use_cache && !self.caching_disabled;

        if cache_active {
            if let Some(cached) = self.cache.get(&normalized) {
                let results = self.materialize_ranked(&cached.doc_ids, column, max_results);
                return ForwardResult {
                    found: cached.found,
                    results,
                    cache_hit: true,
                };
            }
        }

        let mut ranked: Vec<(u32, i32)> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        if let Some(trie) = self.container.trie() {
            for doc_id in trie.search(query) {
                let document_id = doc_id as u32;
                if seen.insert(document_id) {
                    let rank = self
                        .materialize(document_id, column)
                        .map(|r| r.rank)
                        .unwrap_or(0)
                        + TRIE_BONUS;
                    ranked.push((document_id, rank));
                }
            }
        }

        if ranked.len() < FUZZY_RESULT_GATE && query.chars().count() > FUZZY_MIN_QUERY_LEN {
            if let Some(ngram_index) = self.container.ngram() {
                let max_distance = if query.chars().count() > FUZZY_LENGTH_BREAKPOINT {
                    FUZZY_DISTANCE_LONG
                } else {
                    FUZZY_DISTANCE_SHORT
                };
                for doc_id in ngram_index.search(query, max_distance) {
                    let document_id = doc_id as u32;
                    if seen.insert(document_id) {
                        let rank = self
                            .materialize(document_id, column)
                            .map(|r| r.rank)
                            .unwrap_or(0)
                            + FUZZY_PENALTY;
                        ranked.push((document_id, rank));
                    }
                }
            }
        }

        let mut named: Vec<(u32, i32, String, i64)> = ranked
            .into_iter()
            .filter_map(|(document_id, rank)| {
                self.materialize(document_id, column)
                    .map(|r| (document_id, rank, r.name, r.id))
            })
            .collect();

        named.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| a.2.cmp(&b.2))
                .then_with(|| a.3.cmp(&b.3))
        });

        let found = named.len();
        let doc_ids: Vec<i64> = named.iter().map(|(document_id, ..)| *document_id as i64).collect();

        if cache_active {
            self.cache.insert(
                normalized,
                CachedResult {
                    doc_ids,
                    found,
                },
            );
        }

        let truncated = if max_results > 0 {
            named.into_iter().take(max_results as usize).collect::<Vec<_>>()
        } else {
            named
        };

        let results = truncated
            .into_iter()
            .filter_map(|(document_id, rank, _, _)| {
                self.materialize(document_id, column).map(|mut r| {
                    r.rank = rank;
                    r
                })
            })
            .collect();

        ForwardResult {
            found,
            results,
            cache_hit: false,
        }
    }

    fn materialize_ranked(&self, doc_ids: &[i64], column: usize, max_results: i64) -> Vec<PlaceResult> {
        let slice: &[i64] = if max_results > 0 {
            let n = (max_results as usize).min(doc_ids.len());
            &doc_ids[..n]
        } else {
            doc_ids
        };
        slice
            .iter()
            .filter_map(|&doc_id| self.materialize(doc_id as u32, column))
            .collect()
    }

    /// Nearest single node to `(lat, lng)`, per §4.7. Out-of-range
    /// coordinates are not special-cased; they simply participate in the
    /// tree search on their raw values.
    pub fn reverse(&self, lat: f32, lng: f32, language: &str) -> Vec<PlaceResult> {
        debug!("reverse lat={lat} lng={lng} language={language}");
        let Some(kdtree) = self.container.kdtree() else {
            return Vec::new();
        };
        let column = self.language_column(language);
        kdtree
            .knn((lat, lng), 1)
            .into_iter()
            .filter_map(|point| self.materialize(point.document_id as u32, column))
            .collect()
    }

    /// Looks up a single node by its external stable id.
    pub fn node(&self, stable_id: i64, language: &str) -> Option<PlaceResult> {
        let document_id = self.container.document_id_for(stable_id)?;
        let column = self.language_column(language);
        self.materialize(document_id, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ContainerBuilder, NodeInput};

    fn sample_engine() -> Engine {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("places.db");

        let mut builder = ContainerBuilder::new(vec!["en".to_string()]);
        let nodes = [
            (1i64, "Berlin", (52.52f32, 13.40f32), 900u16),
            (2, "Berne", (46.95, 7.45), 820),
            (3, "Berkeley", (37.87, -122.27), 800),
        ];
        for (id, name, center, rank) in nodes {
            builder
                .add_node(NodeInput {
                    id,
                    names: vec![name.to_string(), name.to_string()],
                    regions: vec![String::new(); 4],
                    population: 1_000_000,
                    rank,
                    timezone: 0,
                    country: 0,
                    center,
                    bounding_box: (center.0 - 0.1, center.1 - 0.1, center.0 + 0.1, center.1 + 0.1),
                })
                .unwrap();
        }
        builder.write(&path).unwrap();

        // The mmap keeps the inode alive after `dir` drops and unlinks the
        // directory entry, which is safe on the Unix targets this crate
        // supports.
        Engine::open(&path, LoadOptions::default()).unwrap()
    }

    #[test]
    fn prefix_query_ranks_by_rank_descending() {
        let engine = sample_engine();
        let result = engine.forward("Ber", 10, true, "en");
        assert_eq!(result.found, 3);
        let names: Vec<_> = result.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Berlin", "Berne", "Berkeley"]);
    }

    #[test]
    fn fuzzy_query_finds_close_misspelling_with_penalty() {
        let engine = sample_engine();
        let result = engine.forward("berln", 5, true, "en");
        assert!(result.found >= 1);
        let berlin = result.results.iter().find(|r| r.name == "Berlin").unwrap();
        assert!(berlin.rank < 900);
    }

    #[test]
    fn second_identical_query_is_a_cache_hit() {
        let engine = sample_engine();
        let first = engine.forward("Ber", 10, true, "en");
        let second = engine.forward("Ber", 10, true, "en");
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.found, second.found);
        let first_names: Vec<_> = first.results.iter().map(|r| r.name.clone()).collect();
        let second_names: Vec<_> = second.results.iter().map(|r| r.name.clone()).collect();
        assert_eq!(first_names, second_names);
    }

    #[test]
    fn empty_query_short_circuits_without_touching_cache() {
        let engine = sample_engine();
        let result = engine.forward("", 10, true, "en");
        assert_eq!(result.found, 0);
        assert!(result.results.is_empty());
        assert!(!result.cache_hit);
        assert!(engine.cache.is_empty());
    }

    #[test]
    fn reverse_finds_nearest_node() {
        let engine = sample_engine();
        let result = engine.reverse(52.5, 13.4, "en");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 1);
    }

    #[test]
    fn node_lookup_by_stable_id() {
        let engine = sample_engine();
        let place = engine.node(2, "en").unwrap();
        assert_eq!(place.name, "Berne");
        assert!(engine.node(999, "en").is_none());
    }

    #[test]
    fn unknown_language_falls_back_to_canonical_name() {
        let engine = sample_engine();
        let place = engine.node(1, "xx").unwrap();
        assert_eq!(place.name, "Berlin");
    }
}
