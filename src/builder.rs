//! Builder-side writers (C8, §4.8): byte-exact serializers for the trie,
//! n-gram index, k-d tree and the container that holds them.
//!
//! These types accept already-resolved nodes — one name per configured
//! language, a region pair per language, population/rank/timezone/country
//! indices, a center point and a bounding box — and own only turning that
//! into the documented on-disk format. Resolving administrative polygons,
//! parsing OSM, and computing bounding boxes from geometry is the job of
//! the external ingestion pipeline (§1); this module never reaches the
//! network or a filesystem source format.

use std::io::Write;
use std::path::Path;

use crate::error::BuildError;
use crate::kdtree::{KdTree, Point};
use crate::ngram::NgramIndexBuilder;
use crate::node::NodeRecord;
use crate::trie::Trie;

/// An already-resolved node, ready to be serialized.
///
/// `names` must have exactly `1 + languages.len()` entries (canonical name
/// first); `regions` must have exactly `2 * (1 + languages.len())` entries
/// (`region, sub_region` pairs), per §3.
#[derive(Debug, Clone)]
pub struct NodeInput {
    /// External stable identifier.
    pub id: i64,
    /// Name group: canonical name, then one per configured language.
    pub names: Vec<String>,
    /// Region group: `(region, sub_region)` pairs, canonical then per language.
    pub regions: Vec<String>,
    /// Population, or 0 if unknown.
    pub population: u32,
    /// Build-time relevance score.
    pub rank: u16,
    /// Index into [`crate::tables::TIMEZONES`].
    pub timezone: u16,
    /// Index into [`crate::tables::COUNTRIES`].
    pub country: u8,
    /// `(lat, lng)` center point.
    pub center: (f32, f32),
    /// `(min_lat, min_lng, max_lat, max_lng)` bounding box.
    pub bounding_box: (f32, f32, f32, f32),
}

/// Accumulates nodes and serializes them into the container format in §6.
pub struct ContainerBuilder {
    languages: Vec<String>,
    nodes: Vec<NodeInput>,
}

/// Length-prefixed encoding of a string group, per §3's arena layout.
fn encode_group(strings: &[String], out: &mut Vec<u8>) {
    out.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    for s in strings {
        out.extend_from_slice(&(s.len() as u16).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    }
}

impl ContainerBuilder {
    /// Creates a builder for the given ordered language columns.
    pub fn new(languages: Vec<String>) -> Self {
        Self {
            languages,
            nodes: Vec::new(),
        }
    }

    /// Adds a node, assigning it the next dense document id (insertion
    /// order, §3). Validates that `names`/`regions` have the cardinality
    /// the configured language count requires.
    pub fn add_node(&mut self, node: NodeInput) -> Result<u32, BuildError> {
        let expected_names = 1 + self.languages.len();
        if node.names.len() != expected_names {
            return Err(BuildError::BadGroupArity {
                document_id: self.nodes.len() as u32,
                group: "name",
                actual: node.names.len(),
                expected: expected_names,
            });
        }
        let expected_regions = 2 * (1 + self.languages.len());
        if node.regions.len() != expected_regions {
            return Err(BuildError::BadGroupArity {
                document_id: self.nodes.len() as u32,
                group: "region",
                actual: node.regions.len(),
                expected: expected_regions,
            });
        }
        for s in node.names.iter().chain(node.regions.iter()) {
            if s.len() > u16::MAX as usize {
                return Err(BuildError::StringTooLong { len: s.len() });
            }
        }

        let document_id = self.nodes.len() as u32;
        self.nodes.push(node);
        Ok(document_id)
    }

    /// Number of nodes added so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no nodes have been added.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Assembles every section and writes the container to `path`.
    ///
    /// The file is written to a temporary path in the same directory, then
    /// renamed into place, so a crash mid-write never leaves a partial file
    /// visible at `path` (§7, §9 "mutable-after-build writer API").
    pub fn write(&self, path: &Path) -> Result<(), BuildError> {
        let mut language_table = Vec::new();
        language_table.extend_from_slice(&(self.languages.len() as u64).to_le_bytes());
        for lang in &self.languages {
            language_table.extend_from_slice(&(lang.len() as u64).to_le_bytes());
            language_table.extend_from_slice(lang.as_bytes());
        }

        let mut strings = Vec::new();
        let mut node_records = Vec::with_capacity(self.nodes.len());
        let mut trie = Trie::new();
        let mut ngram_builder = NgramIndexBuilder::new();
        let mut points = Vec::with_capacity(self.nodes.len());

        for (document_id, node) in self.nodes.iter().enumerate() {
            let document_id = document_id as u32;

            let name_offset = strings.len() as u32;
            encode_group(&node.names, &mut strings);
            let region_offset = strings.len() as u32;
            encode_group(&node.regions, &mut strings);

            node_records.push(NodeRecord {
                id: node.id,
                name_offset,
                region_offset,
                population: node.population,
                rank: node.rank,
                timezone: node.timezone,
                country: node.country,
                center: node.center,
                bounding_box: node.bounding_box,
            });

            let mut seen_names = std::collections::HashSet::new();
            for name in &node.names {
                if !name.is_empty() && seen_names.insert(name.as_str()) {
                    trie.insert(document_id as i64, name);
                    ngram_builder.add(document_id as i64, name);
                }
            }

            points.push(Point {
                document_id: document_id as i64,
                lat: node.center.0,
                lng: node.center.1,
            });
        }

        let mut nodes_bytes = Vec::with_capacity(node_records.len() * crate::node::RECORD_SIZE);
        for record in &node_records {
            nodes_bytes.extend_from_slice(&record.encode());
        }

        let mut docmap_bytes = Vec::new();
        docmap_bytes.extend_from_slice(&(self.nodes.len() as i64).to_le_bytes());
        for (document_id, node) in self.nodes.iter().enumerate() {
            docmap_bytes.extend_from_slice(&node.id.to_le_bytes());
            docmap_bytes.extend_from_slice(&(document_id as i32).to_le_bytes());
        }

        let mut trie_bytes = Vec::new();
        trie.write(&mut trie_bytes).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let ngram_index = ngram_builder.optimize();
        let mut ngram_bytes = Vec::new();
        ngram_index.write(&mut ngram_bytes).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let kdtree = KdTree::build(&points);
        let mut kdtree_bytes = Vec::new();
        kdtree.write(&mut kdtree_bytes).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let header_prefix_end = 88u64 + language_table.len() as u64;
        let nodes_off = header_prefix_end;
        let nodes_size = nodes_bytes.len() as u64;
        let strings_off = nodes_off + nodes_size;
        let strings_size = strings.len() as u64;
        let docmap_off = strings_off + strings_size;
        let docmap_size = docmap_bytes.len() as u64;
        let trie_off = docmap_off + docmap_size;
        let trie_size = trie_bytes.len() as u64;
        let index_off = trie_off + trie_size;
        let index_size = ngram_bytes.len() as u64;
        let kdtree_size = kdtree_bytes.len() as u64;

        let mut header = Vec::with_capacity(88);
        for field in [
            nodes_off,
            nodes_size,
            strings_off,
            strings_size,
            docmap_off,
            docmap_size,
            trie_off,
            trie_size,
            index_off,
            index_size,
        ] {
            header.extend_from_slice(&field.to_le_bytes());
        }
        header.extend_from_slice(&kdtree_size.to_le_bytes());

        let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        let mut temp_path = parent.to_path_buf();
        let file_name = path
            .file_name()
            .map(|n| format!(".{}.tmp", n.to_string_lossy()))
            .unwrap_or_else(|| ".placefinder.tmp".to_string());
        temp_path.push(file_name);

        let write_all = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&temp_path)?;
            file.write_all(&header)?;
            file.write_all(&language_table)?;
            file.write_all(&nodes_bytes)?;
            file.write_all(&strings)?;
            file.write_all(&docmap_bytes)?;
            file.write_all(&trie_bytes)?;
            file.write_all(&ngram_bytes)?;
            file.write_all(&kdtree_bytes)?;
            file.sync_all()?;
            Ok(())
        };

        if let Err(source) = write_all() {
            let _ = std::fs::remove_file(&temp_path);
            return Err(BuildError::Io {
                path: path.to_path_buf(),
                source,
            });
        }

        std::fs::rename(&temp_path, path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }
}
