//! Two-class error model: fatal load errors and builder errors.
//!
//! Query-level anomalies (missing id, unknown language, empty query) are
//! never errors — they surface as empty results, per the operations in
//! [`crate::engine`].

use std::path::PathBuf;

/// Errors that can occur while opening and memory-mapping a database file.
///
/// Every variant here is fatal: the loader returns before exposing any
/// partially-initialized state.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The database file could not be opened.
    #[error("cannot open database file {path:?}: {source}")]
    Io {
        /// Path that was opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is smaller than the fixed header requires.
    #[error("database file is truncated: expected at least {expected} bytes, found {found}")]
    Truncated {
        /// Minimum required length.
        expected: u64,
        /// Actual file length.
        found: u64,
    },

    /// A section offset and size together overflow or exceed the file length.
    #[error("section {name} at offset {offset} with size {size} exceeds file length {file_len}")]
    SectionOutOfBounds {
        /// Human-readable section name, for diagnostics.
        name: &'static str,
        /// Section start offset.
        offset: u64,
        /// Section size.
        size: u64,
        /// Total file length.
        file_len: u64,
    },

    /// `nodes_size` is not a multiple of the fixed record size.
    #[error("nodes section size {size} is not a multiple of the {record_size}-byte record")]
    MisalignedNodes {
        /// The offending size.
        size: u64,
        /// The required record size (64).
        record_size: u64,
    },

    /// The language table could not be decoded as UTF-8, or its length is inconsistent.
    #[error("language table is corrupt at entry {index}: {reason}")]
    BadLanguageTable {
        /// Index of the offending entry.
        index: usize,
        /// What went wrong.
        reason: String,
    },

    /// A section's byte layout violates the format beyond bounds (bad string length, etc).
    #[error("malformed {section} section: {reason}")]
    Malformed {
        /// Section name.
        section: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// Memory-mapping the file failed.
    #[error("failed to memory-map {path:?}: {source}")]
    Mmap {
        /// Path that was mapped.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the builder (C8) while writing a container file.
///
/// Per §7, build-time errors are fatal for the builder and must leave no
/// valid file at the destination path.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// I/O failure while writing the (temporary) output file.
    #[error("failed to write database to {path:?}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A name or region group did not have the expected cardinality for the
    /// configured language count.
    #[error("node {document_id} has {actual} strings in its {group} group, expected {expected}")]
    BadGroupArity {
        /// Offending document id.
        document_id: u32,
        /// Which group (`"name"` or `"region"`).
        group: &'static str,
        /// Strings actually supplied.
        actual: usize,
        /// Strings required given the configured language count.
        expected: usize,
    },

    /// A string exceeded the 16-bit length prefix used by the arena format.
    #[error("string of {len} bytes exceeds the maximum arena entry length of 65535")]
    StringTooLong {
        /// Offending byte length.
        len: usize,
    },
}

/// Top-level error type for the CLI/server glue.
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    /// Wraps a fatal load error.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Wraps a builder error.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// A requested operation is not implemented by this crate because it
    /// belongs to an out-of-scope external collaborator (e.g. planetary
    /// data ingestion).
    #[error("{0}")]
    Unsupported(&'static str),
}
