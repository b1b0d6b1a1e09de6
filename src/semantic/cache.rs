//! On-disk cache of catalog embeddings and the flat index.
//!
//! Layout under `<cache_root>/index_v1/`:
//! - `embeddings.bin`: one unit-length vector per catalog row
//! - `index.bin`: flat inner-product index (only when the index is enabled)
//! - `lookup.csv`: the enriched records the embeddings are aligned with
//! - `meta.json`: `{model_identifier, row_count}`, the cache key
//!
//! The cache is valid iff the metadata matches the configured model and the
//! current catalog size. Any failure to read a claimed hit is a miss and
//! triggers a full rebuild. Rows edited in place without changing the row
//! count are not detected.
//!
//! Nothing here guards against two processes rebuilding the same directory.

use std::path::{Path, PathBuf};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogRecord;
use crate::semantic::embeddings::{model_id_hash, Embedder, EmbeddingError};
use crate::semantic::index::{EmbeddingStore, FlatIpIndex};
use crate::semantic::storage::{VectorFileKind, VectorStorage, VectorStorageError};

/// Versioned cache directory name; bump when the layout changes.
pub const CACHE_VERSION_DIR: &str = "index_v1";

const EMBEDDINGS_FILE: &str = "embeddings.bin";
const INDEX_FILE: &str = "index.bin";
const LOOKUP_FILE: &str = "lookup.csv";
const META_FILE: &str = "meta.json";

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Lookup table error: {0}")]
    Lookup(#[from] csv::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Cache is stale: {0}")]
    Stale(String),

    #[error("Invalid embedding at row {row}: {reason}")]
    InvalidEmbedding { row: usize, reason: String },
}

/// Cache key plus informational fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    #[serde(alias = "model")]
    pub model_identifier: String,
    pub row_count: usize,
    #[serde(default)]
    pub dimensions: usize,
    #[serde(default)]
    pub built_at: Option<String>,
}

impl IndexMetadata {
    /// True when this cache was built for `model` over `row_count` rows.
    pub fn matches(&self, model: &str, row_count: usize) -> bool {
        self.model_identifier == model && self.row_count == row_count
    }
}

/// How the cache should be built.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Build and load the flat inner-product index
    pub use_index: bool,
    /// Texts per embedding call
    pub batch_size: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            use_index: true,
            batch_size: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Rebuilt,
}

/// Everything the search service needs, aligned row for row.
#[derive(Debug)]
pub struct CacheState {
    pub embeddings: EmbeddingStore,
    pub index: Option<FlatIpIndex>,
    pub lookup: Vec<CatalogRecord>,
    pub outcome: CacheOutcome,
}

/// Embedding cache rooted at a versioned directory.
pub struct EmbeddingCache {
    dir: PathBuf,
}

impl EmbeddingCache {
    /// Create a cache manager; nothing is touched on disk until used.
    pub fn new(cache_root: &Path) -> Self {
        Self {
            dir: cache_root.join(CACHE_VERSION_DIR),
        }
    }

    /// Get the versioned cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete every cache artifact.
    pub fn clear(&self) -> Result<(), CacheError> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// Load the cache for `records`, or rebuild it with `embedder`.
    pub fn initialize(
        &self,
        records: Vec<CatalogRecord>,
        embedder: &dyn Embedder,
        opts: &CacheOptions,
    ) -> Result<CacheState, CacheError> {
        let now = Instant::now();

        match self.try_load(embedder.name(), records.len(), opts) {
            Ok(state) => {
                log::info!(
                    "loaded {} cached embeddings from {} in {:?}",
                    state.embeddings.len(),
                    self.dir.display(),
                    now.elapsed()
                );
                return Ok(state);
            }
            Err(CacheError::Stale(reason)) => {
                log::info!("cache miss ({reason}), rebuilding");
            }
            Err(e) => {
                log::warn!("cache error: {e}, rebuilding");
            }
        }

        let state = self.rebuild(records, embedder, opts)?;
        log::info!(
            "built {} embeddings in {:?}",
            state.embeddings.len(),
            now.elapsed()
        );
        Ok(state)
    }

    /// Read the cache metadata, if present.
    pub fn read_metadata(&self) -> Result<IndexMetadata, CacheError> {
        let path = self.dir.join(META_FILE);
        if !path.exists() {
            return Err(CacheError::Stale("no metadata".to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn try_load(
        &self,
        model: &str,
        row_count: usize,
        opts: &CacheOptions,
    ) -> Result<CacheState, CacheError> {
        let meta = self.read_metadata()?;
        if !meta.matches(model, row_count) {
            return Err(CacheError::Stale(format!(
                "cache built for model '{}' with {} rows, need '{}' with {} rows",
                meta.model_identifier, meta.row_count, model, row_count
            )));
        }

        let model_id = model_id_hash(model);
        let embeddings = self.embeddings_storage().load(&model_id, row_count)?;
        if embeddings.len() != row_count {
            return Err(CacheError::Stale(format!(
                "embeddings file holds {} rows, expected {}",
                embeddings.len(),
                row_count
            )));
        }

        let lookup = self.read_lookup()?;
        if lookup.len() != row_count {
            return Err(CacheError::Stale(format!(
                "lookup table has {} rows, expected {}",
                lookup.len(),
                row_count
            )));
        }

        let index = if opts.use_index {
            Some(self.load_or_rebuild_index(&embeddings, &model_id))
        } else {
            None
        };

        Ok(CacheState {
            embeddings,
            index,
            lookup,
            outcome: CacheOutcome::Hit,
        })
    }

    /// The index is derived data: rebuild it from the cached embeddings
    /// instead of re-embedding the catalog.
    fn load_or_rebuild_index(&self, embeddings: &EmbeddingStore, model_id: &[u8; 32]) -> FlatIpIndex {
        let storage = self.index_storage();
        match storage.load(model_id, embeddings.len()) {
            Ok(matrix) if matrix.dimensions() == embeddings.dimensions() => {
                log::info!("flat index loaded");
                return FlatIpIndex::from_store(matrix);
            }
            Ok(_) => log::warn!("flat index dimensions differ from embeddings, rebuilding index"),
            Err(VectorStorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no flat index on disk, building from cached embeddings");
            }
            Err(e) => log::warn!("flat index unreadable ({e}), rebuilding index"),
        }

        let index = FlatIpIndex::build(embeddings);
        if let Err(e) = storage.save(index.matrix(), model_id) {
            log::warn!("failed to persist flat index: {e}");
        }
        index
    }

    fn rebuild(
        &self,
        records: Vec<CatalogRecord>,
        embedder: &dyn Embedder,
        opts: &CacheOptions,
    ) -> Result<CacheState, CacheError> {
        std::fs::create_dir_all(&self.dir)?;

        // drop the key first so a half-written cache never looks valid
        let meta_path = self.dir.join(META_FILE);
        if meta_path.exists() {
            std::fs::remove_file(&meta_path)?;
        }

        let embeddings = embed_records(&records, embedder, opts.batch_size)?;
        let model_id = model_id_hash(embedder.name());

        self.embeddings_storage().save(&embeddings, &model_id)?;
        self.write_lookup(&records)?;

        let index = if opts.use_index {
            let index = FlatIpIndex::build(&embeddings);
            self.index_storage().save(index.matrix(), &model_id)?;
            log::info!("flat index built and saved");
            Some(index)
        } else {
            log::info!("flat index disabled, using brute-force cosine recall");
            None
        };

        let meta = IndexMetadata {
            model_identifier: embedder.name().to_string(),
            row_count: records.len(),
            dimensions: embeddings.dimensions(),
            built_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        self.write_metadata(&meta)?;

        Ok(CacheState {
            embeddings,
            index,
            lookup: records,
            outcome: CacheOutcome::Rebuilt,
        })
    }

    fn write_metadata(&self, meta: &IndexMetadata) -> Result<(), CacheError> {
        let path = self.dir.join(META_FILE);
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, serde_json::to_string_pretty(meta)?)?;
        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn read_lookup(&self) -> Result<Vec<CatalogRecord>, CacheError> {
        let mut reader = csv::Reader::from_path(self.dir.join(LOOKUP_FILE))?;
        let mut records = vec![];
        for record in reader.deserialize() {
            records.push(record?);
        }
        Ok(records)
    }

    fn write_lookup(&self, records: &[CatalogRecord]) -> Result<(), CacheError> {
        let path = self.dir.join(LOOKUP_FILE);
        let temp_path = path.with_extension("tmp");

        let mut writer = csv::Writer::from_path(&temp_path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        drop(writer);

        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn embeddings_storage(&self) -> VectorStorage {
        VectorStorage::new(self.dir.join(EMBEDDINGS_FILE), VectorFileKind::Embeddings)
    }

    fn index_storage(&self) -> VectorStorage {
        VectorStorage::new(self.dir.join(INDEX_FILE), VectorFileKind::FlatIndex)
    }
}

/// Embed every record's text in batches, validating each vector.
fn embed_records(
    records: &[CatalogRecord],
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<EmbeddingStore, CacheError> {
    log::info!(
        "embedding {} texts with model '{}'",
        records.len(),
        embedder.name()
    );

    let progress = ProgressBar::new(records.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} texts")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut store: Option<EmbeddingStore> = None;
    let mut row = 0;

    for chunk in records.chunks(batch_size.max(1)) {
        let texts: Vec<String> = chunk.iter().map(|r| r.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts)?;

        if vectors.len() != texts.len() {
            return Err(CacheError::InvalidEmbedding {
                row,
                reason: format!("{} vectors for {} texts", vectors.len(), texts.len()),
            });
        }

        for vector in vectors {
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(CacheError::InvalidEmbedding {
                    row,
                    reason: "contains NaN or infinity".to_string(),
                });
            }

            let store = store.get_or_insert_with(|| EmbeddingStore::new(vector.len()));
            store.push(&vector).map_err(|e| CacheError::InvalidEmbedding {
                row,
                reason: e.to_string(),
            })?;
            row += 1;
        }

        progress.inc(chunk.len() as u64);
    }

    progress.finish_and_clear();

    Ok(store.unwrap_or_else(|| EmbeddingStore::new(0)))
}
