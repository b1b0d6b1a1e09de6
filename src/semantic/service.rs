//! Hybrid search service over the ingredient catalog.
//!
//! Provides a high-level interface for search operations:
//! - One-shot initialization from the catalog and an embedder (cache aware)
//! - Recall, lexical blending and per-entity aggregation per query
//! - Read-only state after initialization, shared without locks

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crate::catalog::CatalogRecord;
use crate::config::{SearchConfig, SemanticSearchConfig};
use crate::semantic::cache::{CacheError, CacheOptions, CacheOutcome, EmbeddingCache};
use crate::semantic::embeddings::{Embedder, EmbeddingError, EmbeddingModel};
use crate::semantic::hybrid::{aggregate_and_rank, score_candidates, ScoringParams, SearchHit};
use crate::semantic::index::{BruteForceCosine, IndexError, RecallStrategy};
use crate::semantic::preprocess::normalize;

/// Errors that can occur during search operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("Service not initialized")]
    NotInitialized,

    #[error("Service already initialized")]
    AlreadyInitialized,

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Everything a query needs, built once.
struct SearchState {
    embedder: Box<dyn Embedder>,
    recall: Box<dyn RecallStrategy>,
    records: Vec<CatalogRecord>,
    index_available: bool,
}

/// Service for hybrid ingredient search.
///
/// Created uninitialized; [`SemanticSearchService::initialize`] is called
/// once at startup. Searching before that fails with `NotInitialized`.
pub struct SemanticSearchService {
    semantic: SemanticSearchConfig,
    search: SearchConfig,
    scoring: ScoringParams,
    cache_dir: PathBuf,
    state: OnceLock<SearchState>,
}

impl SemanticSearchService {
    /// Create a new search service.
    ///
    /// # Arguments
    /// * `semantic` - Model and cache-build configuration
    /// * `search` - Ranking parameters
    /// * `cache_dir` - Directory for the versioned cache and downloaded models
    pub fn new(semantic: SemanticSearchConfig, search: SearchConfig, cache_dir: PathBuf) -> Self {
        let scoring = search.scoring();
        Self {
            semantic,
            search,
            scoring,
            cache_dir,
            state: OnceLock::new(),
        }
    }

    /// Load the configured fastembed model.
    pub fn load_model(&self) -> Result<EmbeddingModel, SemanticSearchError> {
        log::info!("loading embedding model '{}'", self.semantic.model);
        let timeout = Duration::from_secs(self.semantic.download_timeout_secs);
        Ok(EmbeddingModel::new(
            &self.semantic.model,
            self.cache_dir.clone(),
            Some(timeout),
        )?)
    }

    /// Get the embedding cache used by this service.
    pub fn cache(&self) -> EmbeddingCache {
        EmbeddingCache::new(&self.cache_dir)
    }

    /// Build or load embeddings for `records` and make the service searchable.
    ///
    /// Can only succeed once.
    pub fn initialize(
        &self,
        records: Vec<CatalogRecord>,
        embedder: Box<dyn Embedder>,
    ) -> Result<CacheOutcome, SemanticSearchError> {
        if self.state.get().is_some() {
            return Err(SemanticSearchError::AlreadyInitialized);
        }

        let now = Instant::now();
        let opts = CacheOptions {
            use_index: self.semantic.use_index,
            batch_size: self.semantic.batch_size,
        };
        let cached = self.cache().initialize(records, embedder.as_ref(), &opts)?;

        if cached.embeddings.len() != cached.lookup.len() {
            return Err(SemanticSearchError::Integrity(format!(
                "{} embeddings for {} catalog rows",
                cached.embeddings.len(),
                cached.lookup.len()
            )));
        }

        let index_available = cached.index.is_some();
        let recall: Box<dyn RecallStrategy> = match cached.index {
            Some(index) => Box::new(index),
            None => Box::new(BruteForceCosine::new(Arc::new(cached.embeddings))),
        };

        if recall.len() != cached.lookup.len() {
            return Err(SemanticSearchError::Integrity(format!(
                "index holds {} rows for {} catalog rows",
                recall.len(),
                cached.lookup.len()
            )));
        }

        log::info!(
            "search ready: {} rows, {} recall, model '{}' ({:?})",
            cached.lookup.len(),
            recall.kind(),
            embedder.name(),
            now.elapsed()
        );

        self.state
            .set(SearchState {
                embedder,
                recall,
                records: cached.lookup,
                index_available,
            })
            .map_err(|_| SemanticSearchError::AlreadyInitialized)?;

        Ok(cached.outcome)
    }

    /// Search the catalog.
    ///
    /// # Arguments
    /// * `query` - Free text, any language
    /// * `top_k` - Maximum entities returned; config default if None
    ///
    /// # Returns
    /// At most `top_k` hits, one per entity, highest confidence first.
    pub fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchHit>, SemanticSearchError> {
        let state = self.state.get().ok_or(SemanticSearchError::NotInitialized)?;

        let top_k = top_k.unwrap_or(self.search.top_k_default);
        if state.records.is_empty() || top_k == 0 {
            return Ok(vec![]);
        }

        let now = Instant::now();

        let query_embedding = state.embedder.embed(query)?;
        let recall_k = self.search.recall_k.min(state.records.len());
        let candidates = state.recall.recall(&query_embedding, recall_k)?;

        let query_norm = normalize(query);
        let hits = score_candidates(&query_norm, &candidates, &state.records, &self.scoring);
        let results = aggregate_and_rank(hits, self.scoring.confidence_threshold(), top_k);

        log::debug!(
            "query '{}': {} candidates, {} results in {:?}",
            query,
            candidates.len(),
            results.len(),
            now.elapsed()
        );

        Ok(results)
    }

    /// Check if the service has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    /// True once an embedding model is attached.
    pub fn model_loaded(&self) -> bool {
        self.is_initialized()
    }

    /// True when recall runs on the flat index rather than brute force.
    pub fn index_available(&self) -> bool {
        self.state.get().map(|s| s.index_available).unwrap_or(false)
    }

    /// Get the number of searchable rows.
    ///
    /// Returns 0 if not yet initialized.
    pub fn indexed_count(&self) -> usize {
        self.state.get().map(|s| s.records.len()).unwrap_or(0)
    }

    /// Name of the attached model, if any.
    pub fn model_name(&self) -> Option<&str> {
        self.state.get().map(|s| s.embedder.name())
    }
}
