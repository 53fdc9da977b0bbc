//! Offline-built, memory-mapped place-name geocoder.
//!
//! Answers forward text queries ("what place is called X?") via a prefix
//! trie plus an n-gram fuzzy index, and reverse coordinate queries ("which
//! place is nearest to `(lat, lng)`?") via a static k-d tree. The database
//! is a single self-contained file, built once and served read-only.
//!
//! # Quick start
//!
//! ```no_run
//! use placefinder::{Engine, LoadOptions};
//!
//! # fn main() -> Result<(), placefinder::GeoError> {
//! let engine = Engine::open("places.db", LoadOptions::default())?;
//! let result = engine.forward("Berlin", 10, true, "en");
//! for place in &result.results {
//!     println!("{} ({})", place.name, place.country);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Building a database is the other half of the contract ([`ContainerBuilder`]);
//! resolving source data (OSM extracts, GeoNames dumps) into [`NodeInput`]
//! records is left to an external ingestion pipeline.

#![warn(missing_docs)]

mod arena;
pub mod builder;
pub mod cache;
pub mod config;
pub mod container;
pub mod engine;
mod error;
mod kdtree;
mod ngram;
mod node;
pub mod tables;
mod trie;

pub use builder::{ContainerBuilder, NodeInput};
pub use cache::{CachedResult, ResultCache};
pub use config::Config;
pub use container::{Container, LoadOptions};
pub use engine::{Engine, ForwardResult};
pub use error::{BuildError, GeoError, LoadError};
pub use node::PlaceResult;
