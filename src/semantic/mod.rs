//! Hybrid semantic + lexical search over the ingredient catalog.
//!
//! Uses fastembed-rs for local embeddings and an in-memory flat index for
//! recall, then re-scores candidates with fuzzy token overlap.
//!
//! # Architecture
//!
//! - `embeddings`: Wraps fastembed for embedding generation
//! - `index`: Embedding store plus flat inner-product and brute-force recall
//! - `storage`: Binary file I/O for embeddings.bin / index.bin
//! - `cache`: Versioned on-disk cache keyed by model and row count
//! - `preprocess`: Text normalization for lexical matching
//! - `lexical`: Token-set fuzzy ratio
//! - `hybrid`: Score blending and per-entity aggregation
//! - `service`: High-level search service

pub mod cache;
pub mod embeddings;
pub mod hybrid;
pub mod index;
pub mod lexical;
pub mod preprocess;
pub mod service;
pub mod storage;

pub use hybrid::SearchHit;
pub use service::{SemanticSearchError, SemanticSearchService};
