//! N-gram candidate generation + bounded Levenshtein verification (C5, §4.5).

use rustc_hash::FxHashMap;
use std::io::{self, Read, Write};

/// Normalizes text for trigram extraction: lower-case, collapse every run of
/// characters outside `[a-z0-9]` into a single space, then trim (§4.5).
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_space = false;
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim().to_string()
}

/// All length-3 windows of `normalized`, as owned strings.
pub fn trigrams(normalized: &str) -> Vec<String> {
    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() < 3 {
        return Vec::new();
    }
    (0..=chars.len() - 3)
        .map(|i| chars[i..i + 3].iter().collect())
        .collect()
}

/// Bounded classical Levenshtein distance (insert/delete/substitute cost 1),
/// with early-exit once the current row's minimum already exceeds `max_distance`.
///
/// Returns `None` if the true distance exceeds `max_distance`.
pub fn bounded_levenshtein(a: &str, b: &str, max_distance: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.len().abs_diff(b.len()) > max_distance {
        return None;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        let mut row_min = curr[0];
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            row_min = row_min.min(curr[j]);
        }
        if row_min > max_distance {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let distance = prev[b.len()];
    (distance <= max_distance).then_some(distance)
}

/// A single `(trigram, sorted-unique doc-id list)` entry (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
struct TrigramEntry {
    trigram: String,
    doc_ids: Vec<i64>,
}

/// A single `(doc-id, normalized text)` record used for verification (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
struct DocText {
    doc_id: i64,
    text: String,
}

/// The serialized, query-ready n-gram index: sorted trigram table plus
/// sorted document-text table, as produced by [`NgramIndexBuilder::optimize`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NgramIndex {
    trigrams: Vec<TrigramEntry>,
    texts: Vec<DocText>,
}

impl NgramIndex {
    /// Candidate generation + bounded-edit-distance verification (§4.5).
    pub fn search(&self, text: &str, max_distance: usize) -> Vec<i64> {
        let normalized_query = normalize(text);
        let query_trigrams = trigrams(&normalized_query);
        if query_trigrams.is_empty() {
            return Vec::new();
        }

        let mut counts: FxHashMap<i64, usize> = FxHashMap::default();
        for tg in &query_trigrams {
            if let Ok(idx) = self.trigrams.binary_search_by(|e| e.trigram.as_str().cmp(tg.as_str())) {
                for &doc_id in &self.trigrams[idx].doc_ids {
                    *counts.entry(doc_id).or_insert(0) += 1;
                }
            }
        }

        let threshold = query_trigrams.len() / 2;
        let mut out = Vec::new();
        for (&doc_id, &count) in &counts {
            if count < threshold {
                continue;
            }
            if let Ok(idx) = self.texts.binary_search_by_key(&doc_id, |d| d.doc_id) {
                if bounded_levenshtein(&normalized_query, &self.texts[idx].text, max_distance).is_some() {
                    out.push(doc_id);
                }
            }
        }
        out
    }

    /// Serializes as §6.8: trigram table then document-text table.
    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&(self.trigrams.len() as u64).to_le_bytes())?;
        for entry in &self.trigrams {
            let bytes = entry.trigram.as_bytes();
            out.write_all(&(bytes.len() as u64).to_le_bytes())?;
            out.write_all(bytes)?;
            out.write_all(&(entry.doc_ids.len() as u64).to_le_bytes())?;
            for id in &entry.doc_ids {
                out.write_all(&id.to_le_bytes())?;
            }
        }

        out.write_all(&(self.texts.len() as u64).to_le_bytes())?;
        for doc in &self.texts {
            out.write_all(&doc.doc_id.to_le_bytes())?;
            let bytes = doc.text.as_bytes();
            out.write_all(&(bytes.len() as u64).to_le_bytes())?;
            out.write_all(bytes)?;
        }
        Ok(())
    }

    /// Deserializes an index previously written by [`NgramIndex::write`].
    pub fn read<R: Read>(input: &mut R) -> io::Result<Self> {
        let trigram_count = read_u64(input)?;
        let mut trigrams = Vec::with_capacity(trigram_count as usize);
        for _ in 0..trigram_count {
            let len = read_u64(input)? as usize;
            let mut buf = vec![0u8; len];
            input.read_exact(&mut buf)?;
            let trigram = String::from_utf8(buf)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "trigram is not valid UTF-8"))?;
            let doc_count = read_u64(input)?;
            let mut doc_ids = Vec::with_capacity(doc_count as usize);
            for _ in 0..doc_count {
                doc_ids.push(read_i64(input)?);
            }
            trigrams.push(TrigramEntry { trigram, doc_ids });
        }

        let text_count = read_u64(input)?;
        let mut texts = Vec::with_capacity(text_count as usize);
        for _ in 0..text_count {
            let doc_id = read_i64(input)?;
            let len = read_u64(input)? as usize;
            let mut buf = vec![0u8; len];
            input.read_exact(&mut buf)?;
            let text = String::from_utf8(buf)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "doc text is not valid UTF-8"))?;
            texts.push(DocText { doc_id, text });
        }

        Ok(Self { trigrams, texts })
    }
}

/// Build-time accumulator for a [`NgramIndex`]. Call [`add`](Self::add) for
/// every document, then [`optimize`](Self::optimize) once before
/// serialization (§4.5).
#[derive(Debug, Default)]
pub struct NgramIndexBuilder {
    trigrams: Vec<TrigramEntry>,
    texts: Vec<DocText>,
}

impl NgramIndexBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one trigram entry per trigram of `text`, and stores the
    /// normalized text under `document_id`.
    pub fn add(&mut self, document_id: i64, text: &str) {
        let normalized = normalize(text);
        for tg in trigrams(&normalized) {
            self.trigrams.push(TrigramEntry {
                trigram: tg,
                doc_ids: vec![document_id],
            });
        }
        self.texts.push(DocText {
            doc_id: document_id,
            text: normalized,
        });
    }

    /// Sorts trigram entries by key and merges runs with the same key
    /// (concatenate, sort, dedup doc ids); sorts and dedups the document
    /// text list by id (§4.5).
    pub fn optimize(mut self) -> NgramIndex {
        self.trigrams.sort_by(|a, b| a.trigram.cmp(&b.trigram));
        let mut merged: Vec<TrigramEntry> = Vec::with_capacity(self.trigrams.len());
        for entry in self.trigrams {
            if let Some(last) = merged.last_mut() {
                if last.trigram == entry.trigram {
                    last.doc_ids.extend(entry.doc_ids);
                    continue;
                }
            }
            merged.push(entry);
        }
        for entry in &mut merged {
            entry.doc_ids.sort_unstable();
            entry.doc_ids.dedup();
        }

        self.texts.sort_by_key(|d| d.doc_id);
        self.texts.dedup_by_key(|d| d.doc_id);

        NgramIndex {
            trigrams: merged,
            texts: self.texts,
        }
    }
}

fn read_u64<R: Read>(input: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64<R: Read>(input: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_punctuation_and_lowercases() {
        assert_eq!(normalize("Saint-Denis!!"), "saint denis");
        assert_eq!(normalize("  Berlin  "), "berlin");
        assert_eq!(normalize("São Paulo"), "s o paulo");
    }

    #[test]
    fn trigrams_of_short_string_is_empty() {
        assert!(trigrams("be").is_empty());
        assert_eq!(trigrams("ber"), vec!["ber".to_string()]);
    }

    #[test]
    fn levenshtein_identical_strings_is_zero() {
        assert_eq!(bounded_levenshtein("berlin", "berlin", 2), Some(0));
    }

    #[test]
    fn levenshtein_one_substitution() {
        assert_eq!(bounded_levenshtein("berlin", "berlan", 2), Some(1));
    }

    #[test]
    fn levenshtein_exceeding_bound_is_none() {
        assert_eq!(bounded_levenshtein("berlin", "completely different", 3), None);
    }

    fn build_sample() -> NgramIndex {
        let mut builder = NgramIndexBuilder::new();
        builder.add(1, "Berlin");
        builder.add(2, "Berne");
        builder.add(3, "Berkeley");
        builder.add(4, "Paris");
        builder.optimize()
    }

    #[test]
    fn fuzzy_search_finds_close_misspelling() {
        let index = build_sample();
        let results = index.search("berln", 1);
        assert!(results.contains(&1), "expected Berlin in {results:?}");
    }

    #[test]
    fn fuzzy_search_respects_max_distance() {
        let index = build_sample();
        let results = index.search("berln", 0);
        assert!(!results.contains(&1));
    }

    #[test]
    fn recall_property_holds_for_close_strings_sharing_trigrams() {
        let index = build_sample();
        let query = "berlin";
        let q_trigrams = trigrams(&normalize(query));
        let threshold = q_trigrams.len() / 2;

        let shared_with_berlin = {
            let doc_trigrams: std::collections::HashSet<_> =
                trigrams(&normalize("Berlin")).into_iter().collect();
            q_trigrams.iter().filter(|t| doc_trigrams.contains(*t)).count()
        };
        assert!(shared_with_berlin >= threshold);
        assert!(bounded_levenshtein(&normalize(query), &normalize("Berlin"), 2).is_some());

        let results = index.search(query, 2);
        assert!(results.contains(&1));
    }

    #[test]
    fn empty_query_returns_no_candidates() {
        let index = build_sample();
        assert!(index.search("", 2).is_empty());
        assert!(index.search("ab", 2).is_empty());
    }

    #[test]
    fn round_trips_through_write_and_read() {
        let index = build_sample();
        let mut bytes = Vec::new();
        index.write(&mut bytes).unwrap();
        let mut cursor = std::io::Cursor::new(bytes);
        let restored = NgramIndex::read(&mut cursor).unwrap();
        assert_eq!(index, restored);
        assert_eq!(index.search("berln", 1), restored.search("berln", 1));
    }

    #[test]
    fn optimize_merges_duplicate_trigram_entries_and_dedups_doc_ids() {
        let mut builder = NgramIndexBuilder::new();
        builder.add(1, "aaa");
        builder.add(1, "aaa");
        builder.add(2, "aaa");
        let index = builder.optimize();
        let results = index.search("aaa", 0);
        let mut sorted = results.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(results.len(), sorted.len(), "doc ids must be deduplicated");
    }
}
