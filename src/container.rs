//! Container loader (C1, §4.1, §6): parses the fixed header, memory-maps
//! the node and string regions, and reconstructs the trie/n-gram/k-d tree
//! from their byte ranges according to configured enablement.
//!
//! Loading is idempotent and side-effect-free beyond memory mapping. Every
//! failure mode here is fatal — the loader returns an error and nothing is
//! partially exposed (§4.1, §7).

use memmap2::Mmap;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::path::Path;

use crate::arena::Arena;
use crate::error::LoadError;
use crate::kdtree::KdTree;
use crate::ngram::NgramIndex;
use crate::node::NodeTable;
use crate::trie::Trie;

/// Byte size of the fixed header plus the k-d tree size field (§6.1–2).
const HEADER_PREFIX_SIZE: u64 = 88;

#[derive(Debug, Clone, Copy)]
struct Header {
    nodes_off: u64,
    nodes_size: u64,
    strings_off: u64,
    strings_size: u64,
    docmap_off: u64,
    docmap_size: u64,
    trie_off: u64,
    trie_size: u64,
    index_off: u64,
    index_size: u64,
    kdtree_size: u64,
}

impl Header {
    fn kdtree_off(&self) -> u64 {
        self.index_off + self.index_size
    }
}

/// Which indexes to load from the container, per §4.1's "forward, reverse,
/// or both" enablement.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Load the prefix trie and n-gram index (C4 + C5).
    pub enable_forward: bool,
    /// Load the k-d tree (C6).
    pub enable_reverse: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            enable_forward: true,
            enable_reverse: true,
        }
    }
}

/// An open, memory-mapped database file with its reconstructed in-memory
/// indexes.
#[derive(Debug)]
pub struct Container {
    mmap: Mmap,
    header: Header,
    languages: Vec<String>,
    document_index: FxHashMap<i64, u32>,
    trie: Option<Trie>,
    ngram: Option<NgramIndex>,
    kdtree: Option<KdTree>,
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

fn check_bounds(name: &'static str, offset: u64, size: u64, file_len: u64) -> Result<(), LoadError> {
    let end = offset
        .checked_add(size)
        .ok_or(LoadError::SectionOutOfBounds { name, offset, size, file_len })?;
    if end > file_len {
        return Err(LoadError::SectionOutOfBounds { name, offset, size, file_len });
    }
    Ok(())
}

impl Container {
    /// Opens and memory-maps `path`, reconstructing the indexes selected by
    /// `options`.
    pub fn open<P: AsRef<Path>>(path: P, options: LoadOptions) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_len = file
            .metadata()
            .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?
            .len();

        if file_len < HEADER_PREFIX_SIZE {
            return Err(LoadError::Truncated {
                expected: HEADER_PREFIX_SIZE,
                found: file_len,
            });
        }

        let mmap = unsafe { Mmap::map(&file) }.map_err(|source| LoadError::Mmap {
            path: path.to_path_buf(),
            source,
        })?;

        let header = Header {
            nodes_off: read_u64(&mmap, 0),
            nodes_size: read_u64(&mmap, 8),
            strings_off: read_u64(&mmap, 16),
            strings_size: read_u64(&mmap, 24),
            docmap_off: read_u64(&mmap, 32),
            docmap_size: read_u64(&mmap, 40),
            trie_off: read_u64(&mmap, 48),
            trie_size: read_u64(&mmap, 56),
            index_off: read_u64(&mmap, 64),
            index_size: read_u64(&mmap, 72),
            kdtree_size: read_u64(&mmap, 80),
        };

        if header.nodes_size % crate::node::RECORD_SIZE as u64 != 0 {
            return Err(LoadError::MisalignedNodes {
                size: header.nodes_size,
                record_size: crate::node::RECORD_SIZE as u64,
            });
        }

        check_bounds("nodes", header.nodes_off, header.nodes_size, file_len)?;
        check_bounds("strings", header.strings_off, header.strings_size, file_len)?;
        check_bounds("docmap", header.docmap_off, header.docmap_size, file_len)?;
        check_bounds("trie", header.trie_off, header.trie_size, file_len)?;
        check_bounds("ngram", header.index_off, header.index_size, file_len)?;
        check_bounds("kdtree", header.kdtree_off(), header.kdtree_size, file_len)?;

        let languages = read_languages(&mmap, file_len)?;

        let document_index = read_document_index(
            &mmap[header.docmap_off as usize..(header.docmap_off + header.docmap_size) as usize],
        )?;

        let trie = if options.enable_forward {
            let bytes = &mmap[header.trie_off as usize..(header.trie_off + header.trie_size) as usize];
            Some(Trie::read(&mut std::io::Cursor::new(bytes)).map_err(|e| LoadError::Malformed {
                section: "trie",
                reason: e.to_string(),
            })?)
        } else {
            None
        };

        let ngram = if options.enable_forward {
            let bytes = &mmap[header.index_off as usize..(header.index_off + header.index_size) as usize];
            Some(NgramIndex::read(&mut std::io::Cursor::new(bytes)).map_err(|e| LoadError::Malformed {
                section: "ngram",
                reason: e.to_string(),
            })?)
        } else {
            None
        };

        let kdtree = if options.enable_reverse {
            let off = header.kdtree_off() as usize;
            let bytes = &mmap[off..off + header.kdtree_size as usize];
            Some(KdTree::read(&mut std::io::Cursor::new(bytes)).map_err(|e| LoadError::Malformed {
                section: "kdtree",
                reason: e.to_string(),
            })?)
        } else {
            None
        };

        Ok(Self {
            mmap,
            header,
            languages,
            document_index,
            trie,
            ngram,
            kdtree,
        })
    }

    /// The configured language columns, in header order.
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Number of nodes in the database.
    pub fn node_count(&self) -> u32 {
        (self.header.nodes_size / crate::node::RECORD_SIZE as u64) as u32
    }

    /// A transient view over the fixed node array.
    pub(crate) fn node_table(&self) -> NodeTable<'_> {
        let start = self.header.nodes_off as usize;
        let end = start + self.header.nodes_size as usize;
        NodeTable::new(&self.mmap[start..end])
    }

    /// A transient view over the string arena.
    pub(crate) fn arena(&self) -> Arena<'_> {
        let start = self.header.strings_off as usize;
        let end = start + self.header.strings_size as usize;
        Arena::new(&self.mmap[start..end])
    }

    /// Translates a stable (external) id to a dense document id.
    pub fn document_id_for(&self, stable_id: i64) -> Option<u32> {
        self.document_index.get(&stable_id).copied()
    }

    /// The prefix trie, if the forward index was loaded.
    pub(crate) fn trie(&self) -> Option<&Trie> {
        self.trie.as_ref()
    }

    /// The n-gram fuzzy index, if the forward index was loaded.
    pub(crate) fn ngram(&self) -> Option<&NgramIndex> {
        self.ngram.as_ref()
    }

    /// The k-d tree, if the reverse index was loaded.
    pub(crate) fn kdtree(&self) -> Option<&KdTree> {
        self.kdtree.as_ref()
    }
}

fn read_languages(mmap: &Mmap, file_len: u64) -> Result<Vec<String>, LoadError> {
    let mut cursor = HEADER_PREFIX_SIZE as usize;
    let read_u64_at = |cursor: usize| -> Result<u64, LoadError> {
        if cursor + 8 > mmap.len() {
            return Err(LoadError::BadLanguageTable {
                index: 0,
                reason: "language count is truncated".to_string(),
            });
        }
        Ok(read_u64(mmap, cursor))
    };

    let count = read_u64_at(cursor)?;
    cursor += 8;

    let mut languages = Vec::with_capacity(count as usize);
    for i in 0..count {
        if cursor as u64 + 8 > file_len {
            return Err(LoadError::BadLanguageTable {
                index: i as usize,
                reason: "length prefix is truncated".to_string(),
            });
        }
        let len = read_u64(mmap, cursor) as usize;
        cursor += 8;
        if cursor as u64 + len as u64 > file_len {
            return Err(LoadError::BadLanguageTable {
                index: i as usize,
                reason: "payload is truncated".to_string(),
            });
        }
        let s = std::str::from_utf8(&mmap[cursor..cursor + len]).map_err(|_| LoadError::BadLanguageTable {
            index: i as usize,
            reason: "not valid UTF-8".to_string(),
        })?;
        languages.push(s.to_string());
        cursor += len;
    }

    Ok(languages)
}

fn read_document_index(bytes: &[u8]) -> Result<FxHashMap<i64, u32>, LoadError> {
    if bytes.len() < 8 {
        return Err(LoadError::Malformed {
            section: "docmap",
            reason: "missing entry count".to_string(),
        });
    }
    let n = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let mut map = FxHashMap::default();
    let mut cursor = 8usize;
    for _ in 0..n {
        let end = cursor + 12;
        if end > bytes.len() {
            return Err(LoadError::Malformed {
                section: "docmap",
                reason: "entry table is truncated".to_string(),
            });
        }
        let stable_id = i64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
        let document_id = i32::from_le_bytes(bytes[cursor + 8..cursor + 12].try_into().unwrap());
        map.insert(stable_id, document_id as u32);
        cursor = end;
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ContainerBuilder;
    use crate::builder::NodeInput;

    fn sample_builder() -> ContainerBuilder {
        let mut builder = ContainerBuilder::new(vec!["en".to_string()]);
        builder.add_node(NodeInput {
            id: 1,
            names: vec!["Berlin".to_string(), "Berlin".to_string()],
            regions: vec!["".to_string(), "".to_string(), "".to_string(), "".to_string()],
            population: 3_700_000,
            rank: 900,
            timezone: 3,
            country: 7,
            center: (52.52, 13.40),
            bounding_box: (52.3, 13.0, 52.7, 13.8),
        });
        builder
    }

    #[test]
    fn opens_a_freshly_built_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("places.db");
        sample_builder().write(&path).unwrap();

        let container = Container::open(&path, LoadOptions::default()).unwrap();
        assert_eq!(container.node_count(), 1);
        assert_eq!(container.languages(), &["en".to_string()]);
        assert_eq!(container.document_id_for(1), Some(0));
    }

    #[test]
    fn truncated_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.db");
        std::fs::write(&path, [0u8; 10]).unwrap();
        let err = Container::open(&path, LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Truncated { .. }));
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = Container::open("/nonexistent/path/db.bin", LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn bad_section_offset_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("places.db");
        sample_builder().write(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        // Corrupt nodes_size (offset 8) to claim a size far past the file end.
        bytes[8..16].copy_from_slice(&u64::to_le_bytes(1_000_000_000));
        std::fs::write(&path, &bytes).unwrap();

        let err = Container::open(&path, LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::SectionOutOfBounds { .. }));
    }

    #[test]
    fn misaligned_nodes_size_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("places.db");
        sample_builder().write(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[8..16].copy_from_slice(&u64::to_le_bytes(63));
        std::fs::write(&path, &bytes).unwrap();

        let err = Container::open(&path, LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::MisalignedNodes { .. }));
    }

    #[test]
    fn disabling_forward_skips_trie_and_ngram() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("places.db");
        sample_builder().write(&path).unwrap();

        let container = Container::open(
            &path,
            LoadOptions {
                enable_forward: false,
                enable_reverse: true,
            },
        )
        .unwrap();
        assert!(container.trie().is_none());
        assert!(container.ngram().is_none());
        assert!(container.kdtree().is_some());
    }
}
