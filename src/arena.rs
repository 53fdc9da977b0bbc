//! String arena: a flat byte region addressed by offset (C2, §4.2).
//!
//! At any valid offset the layout is `uint32 count` followed by `count`
//! items, each `uint16 length` then `length` bytes of UTF-8. Strings are
//! never zero-terminated. Reads are bounds-checked against the arena slice
//! and are O(k) in the size of the group being decoded.

use crate::error::LoadError;

/// A borrowed view over the strings section.
pub struct Arena<'a> {
    data: &'a [u8],
}

impl<'a> Arena<'a> {
    /// Wraps a byte slice as an arena. Does not validate contents eagerly;
    /// validation happens per-group at [`Arena::get`].
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Decodes the string group starting at `offset`.
    ///
    /// Returns an ordered list of borrowed `&str` views. Bounds violations
    /// (truncated count, truncated length prefix, truncated payload, or
    /// invalid UTF-8) are reported as [`LoadError::Malformed`].
    pub fn get(&self, offset: u32) -> Result<Vec<&'a str>, LoadError> {
        let offset = offset as usize;
        let data = self.data;

        let count_end = offset
            .checked_add(4)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| malformed("string group count"))?;
        let count = u32::from_le_bytes(data[offset..count_end].try_into().unwrap()) as usize;

        let mut cursor = count_end;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let len_end = cursor
                .checked_add(2)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| malformed("string length prefix"))?;
            let len = u16::from_le_bytes(data[cursor..len_end].try_into().unwrap()) as usize;

            let payload_end = len_end
                .checked_add(len)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| malformed("string payload"))?;

            let s = std::str::from_utf8(&data[len_end..payload_end])
                .map_err(|_| malformed("string payload is not valid UTF-8"))?;
            out.push(s);
            cursor = payload_end;
        }

        Ok(out)
    }

    /// Total byte length of the underlying arena.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn malformed(reason: &str) -> LoadError {
    LoadError::Malformed {
        section: "strings",
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_group(strings: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        for s in strings {
            out.extend_from_slice(&(s.len() as u16).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        out
    }

    #[test]
    fn decodes_a_name_group() {
        let bytes = encode_group(&["Berlin", "Berlin", "Berlin"]);
        let arena = Arena::new(&bytes);
        assert_eq!(arena.get(0).unwrap(), vec!["Berlin", "Berlin", "Berlin"]);
    }

    #[test]
    fn decodes_empty_group() {
        let bytes = encode_group(&[]);
        let arena = Arena::new(&bytes);
        assert!(arena.get(0).unwrap().is_empty());
    }

    #[test]
    fn multiple_groups_at_different_offsets() {
        let mut bytes = encode_group(&["a", "b"]);
        let second_offset = bytes.len() as u32;
        bytes.extend_from_slice(&encode_group(&["x", "y", "z"]));
        let arena = Arena::new(&bytes);
        assert_eq!(arena.get(0).unwrap(), vec!["a", "b"]);
        assert_eq!(arena.get(second_offset).unwrap(), vec!["x", "y", "z"]);
    }

    #[test]
    fn truncated_count_is_malformed() {
        let bytes = vec![0u8, 0u8];
        let arena = Arena::new(&bytes);
        assert!(arena.get(0).is_err());
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&10u16.to_le_bytes());
        bytes.extend_from_slice(b"short");
        let arena = Arena::new(&bytes);
        assert!(arena.get(0).is_err());
    }

    #[test]
    fn offset_past_end_is_malformed() {
        let bytes = encode_group(&["a"]);
        let arena = Arena::new(&bytes);
        assert!(arena.get(1_000_000).is_err());
    }
}
