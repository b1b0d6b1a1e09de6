//! Shared fixtures: a deterministic embedder and catalog helpers.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::catalog::CatalogRecord;
use crate::config::{SearchConfig, SemanticSearchConfig};
use crate::semantic::cache::CacheOutcome;
use crate::semantic::embeddings::{l2_normalize, Embedder, EmbeddingError};
use crate::semantic::preprocess::normalize;
use crate::semantic::SemanticSearchService;

pub const DIMENSIONS: usize = 64;

/// Embeds text as a bag of hashed character trigrams.
///
/// Texts sharing words land close together, identical normalized texts get
/// identical vectors. No model download needed.
pub struct HashEmbedder {
    name: String,
    batch_calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed_batch` calls so far.
    pub fn calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(hash_embedding(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| hash_embedding(t)).collect())
    }
}

/// Hash embeddings, except queries containing `poison` fail to embed.
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    poison: String,
}

impl FlakyEmbedder {
    pub fn new(name: &str, poison: &str) -> Self {
        Self {
            inner: HashEmbedder::new(name),
            poison: poison.to_string(),
        }
    }
}

impl Embedder for FlakyEmbedder {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.contains(&self.poison) {
            return Err(EmbeddingError::EmbeddingFailed(format!("cannot embed {text:?}")));
        }
        self.inner.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.inner.embed_batch(texts)
    }
}

pub fn hash_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0f32; DIMENSIONS];
    for word in normalize(text).split(' ').filter(|w| !w.is_empty()) {
        let padded: Vec<char> = format!(" {word} ").chars().collect();
        for gram in padded.windows(3) {
            let gram: String = gram.iter().collect();
            v[fnv1a(gram.as_bytes()) as usize % DIMENSIONS] += 1.0;
        }
    }
    l2_normalize(v)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub fn record(id: &str, text: &str, section: &str, canonical: &str) -> CatalogRecord {
    let language = if section.ends_with("_LAT") { "la" } else { "en" };
    CatalogRecord {
        policy_item_id: id.to_string(),
        text: text.to_string(),
        section: section.to_string(),
        language: language.to_string(),
        canonical: canonical.to_string(),
    }
}

/// A small catalog with several entities sharing words.
pub fn sample_catalog() -> Vec<CatalogRecord> {
    vec![
        record("123", "Vitamin C", "CANON_EN", "Ascorbic acid"),
        record("123", "Acidum ascorbicum", "CANON_LAT", "Ascorbic acid"),
        record("123", "Ascorbic acid", "SYN_LAT", "Ascorbic acid"),
        record("456", "Chia seeds", "CANON_EN", "Chia seed"),
        record("456", "Salvia hispanica", "CANON_LAT", "Chia seed"),
        record("789", "Vitamin D2 mushroom powder", "CANON_EN", "Vitamin D2 mushroom powder"),
        record("790", "Sea salt", "COMMON_EN", ""),
        record("791", "Iodised salt", "COMMON_EN", ""),
    ]
}

/// An initialized service over `records`, caching under `dir`.
pub fn service_with(
    dir: &Path,
    records: Vec<CatalogRecord>,
    use_index: bool,
) -> Arc<SemanticSearchService> {
    let (service, _) = service_with_embedder(
        dir,
        records,
        use_index,
        Box::new(HashEmbedder::new("test-model")),
    );
    service
}

/// Like [`service_with`], with a custom embedder; also returns how the cache was used.
pub fn service_with_embedder(
    dir: &Path,
    records: Vec<CatalogRecord>,
    use_index: bool,
    embedder: Box<dyn Embedder>,
) -> (Arc<SemanticSearchService>, CacheOutcome) {
    let semantic = SemanticSearchConfig {
        use_index,
        ..Default::default()
    };
    let service = SemanticSearchService::new(semantic, SearchConfig::default(), dir.to_path_buf());
    let outcome = service.initialize(records, embedder).unwrap();
    (Arc::new(service), outcome)
}
