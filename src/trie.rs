//! Prefix trie over lower-cased names (C4, §4.4, §6.7).
//!
//! Each path from the root spells a name inserted at build time. A node is
//! terminal iff some inserted name ends exactly there, and terminal nodes
//! carry the sorted, deduplicated document ids that share that exact name.
//! Children are kept sorted by character so traversal order is stable and
//! the preorder serialization round-trips exactly.

use std::io::{self, Read, Write};

/// One node of the trie.
#[derive(Debug, Default, PartialEq, Eq)]
struct TrieNode {
    /// Children kept sorted by character (binary-search insertion point).
    children: Vec<(char, Box<TrieNode>)>,
    /// Set iff a name ends exactly at this node.
    is_terminal: bool,
    /// Sorted, deduplicated document ids for names ending exactly here.
    doc_ids: Vec<i64>,
}

impl TrieNode {
    fn child_mut(&mut self, c: char) -> &mut TrieNode {
        match self.children.binary_search_by_key(&c, |(ch, _)| *ch) {
            Ok(idx) => &mut self.children[idx].1,
            Err(idx) => {
                self.children.insert(idx, (c, Box::new(TrieNode::default())));
                &mut self.children[idx].1
            }
        }
    }

    fn child(&self, c: char) -> Option<&TrieNode> {
        self.children
            .binary_search_by_key(&c, |(ch, _)| *ch)
            .ok()
            .map(|idx| self.children[idx].1.as_ref())
    }

    fn collect_into(&self, out: &mut Vec<i64>) {
        if self.is_terminal {
            out.extend_from_slice(&self.doc_ids);
        }
        for (_, child) in &self.children {
            child.collect_into(out);
        }
    }
}

/// The prefix trie. Supports insertion at build time and prefix search at
/// query time.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Trie {
    root: TrieNode,
}

impl Trie {
    /// Creates an empty trie.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `document_id` under the lower-cased form of `text` (§4.4).
    pub fn insert(&mut self, document_id: i64, text: &str) {
        let mut node = &mut self.root;
        for c in text.to_lowercase().chars() {
            node = node.child_mut(c);
        }
        node.is_terminal = true;
        match node.doc_ids.binary_search(&document_id) {
            Ok(_) => {}
            Err(idx) => node.doc_ids.insert(idx, document_id),
        }
    }

    /// Returns the document ids of every name whose text is exactly `prefix`
    /// or begins with it, in depth-first traversal order (§4.4).
    ///
    /// Returns an empty vector if no inserted name has `prefix` as a prefix.
    pub fn search(&self, prefix: &str) -> Vec<i64> {
        let lowered = prefix.to_lowercase();
        let mut node = &self.root;
        for c in lowered.chars() {
            match node.child(c) {
                Some(next) => node = next,
                None => return Vec::new(),
            }
        }
        let mut out = Vec::new();
        node.collect_into(&mut out);
        out
    }

    /// Serializes the trie as the preorder format in §6.7:
    /// `int32 codepoint, uint8 is_terminal, uint64 doc_count, doc_count x int64,
    /// uint64 child_count`, then children recursively. The (virtual) root
    /// writes codepoint `-1`.
    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_node(&self.root, -1, out)
    }

    /// Deserializes a trie previously written by [`Trie::write`].
    pub fn read<R: Read>(input: &mut R) -> io::Result<Self> {
        let (root, _codepoint) = read_node(input)?;
        Ok(Self { root })
    }
}

fn write_node<W: Write>(node: &TrieNode, codepoint: i32, out: &mut W) -> io::Result<()> {
    out.write_all(&codepoint.to_le_bytes())?;
    out.write_all(&[node.is_terminal as u8])?;
    out.write_all(&(node.doc_ids.len() as u64).to_le_bytes())?;
    for id in &node.doc_ids {
        out.write_all(&id.to_le_bytes())?;
    }
    out.write_all(&(node.children.len() as u64).to_le_bytes())?;
    for (c, child) in &node.children {
        write_node(child, *c as i32, out)?;
    }
    Ok(())
}

fn read_node<R: Read>(input: &mut R) -> io::Result<(TrieNode, i32)> {
    let codepoint = read_i32(input)?;
    let is_terminal = read_u8(input)? != 0;
    let doc_count = read_u64(input)?;
    let mut doc_ids = Vec::with_capacity(doc_count as usize);
    for _ in 0..doc_count {
        doc_ids.push(read_i64(input)?);
    }
    let child_count = read_u64(input)?;
    let mut children = Vec::with_capacity(child_count as usize);
    for _ in 0..child_count {
        let (child, child_codepoint) = read_node(input)?;
        let c = char::from_u32(child_codepoint as u32).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "trie node has an invalid codepoint")
        })?;
        children.push((c, Box::new(child)));
    }
    Ok((
        TrieNode {
            children,
            is_terminal,
            doc_ids,
        },
        codepoint,
    ))
}

fn read_i32<R: Read>(input: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u8<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
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
