//! In-memory embedding store and recall strategies.
//!
//! Rows are addressed by their position in the catalog. Two strategies produce
//! recall candidates behind [`RecallStrategy`]:
//! - [`FlatIpIndex`]: dense inner-product index, persisted next to the embeddings
//! - [`BruteForceCosine`]: cosine similarity against every stored embedding
//!
//! Both return candidates sorted by descending score, ties by row order.

use std::sync::Arc;

use rayon::prelude::*;

/// Errors from index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Matrix size mismatch: {rows} rows of {dimensions} dimensions need {expected} values, got {got}")]
    MatrixSize {
        rows: usize,
        dimensions: usize,
        expected: usize,
        got: usize,
    },
}

/// A recalled catalog row with its raw similarity score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Position of the record in the catalog
    pub row: usize,
    /// Inner product / cosine similarity
    pub score: f32,
}

/// Produces the top-k rows for a query embedding.
pub trait RecallStrategy: Send + Sync {
    /// Return at most `k` candidates, best first.
    fn recall(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>, IndexError>;

    /// Number of rows searchable by this strategy.
    fn len(&self) -> usize;

    /// Short label used in logs.
    fn kind(&self) -> &'static str;
}

/// Row-major matrix of catalog embeddings, one row per record.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingStore {
    dimensions: usize,
    data: Vec<f32>,
}

impl EmbeddingStore {
    /// Create an empty store with the given dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            data: Vec::new(),
        }
    }

    /// Build a store from a flat row-major buffer.
    pub fn from_flat(dimensions: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        if dimensions == 0 {
            if !data.is_empty() {
                return Err(IndexError::MatrixSize {
                    rows: 0,
                    dimensions,
                    expected: 0,
                    got: data.len(),
                });
            }
        } else if data.len() % dimensions != 0 {
            let rows = data.len() / dimensions;
            return Err(IndexError::MatrixSize {
                rows,
                dimensions,
                expected: rows * dimensions,
                got: data.len(),
            });
        }
        Ok(Self { dimensions, data })
    }

    /// Build a store from individual vectors, which must all share one length.
    pub fn from_rows(dimensions: usize, rows: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let mut store = Self::new(dimensions);
        store.data.reserve(rows.len() * dimensions);
        for row in rows {
            store.push(&row)?;
        }
        Ok(store)
    }

    /// Append a row.
    pub fn push(&mut self, row: &[f32]) -> Result<(), IndexError> {
        if row.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        if self.dimensions == 0 {
            0
        } else {
            self.data.len() / self.dimensions
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a row by position.
    pub fn row(&self, idx: usize) -> Option<&[f32]> {
        let start = idx.checked_mul(self.dimensions)?;
        self.data.get(start..start + self.dimensions)
    }

    /// Flat row-major view of all values.
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Iterate over rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on zero
        self.data.chunks_exact(self.dimensions.max(1))
    }
}

/// Dense inner-product index over unit-length vectors.
///
/// Keeps its own copy of the matrix, so it can be persisted and loaded
/// independently from the embedding store.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    matrix: EmbeddingStore,
}

impl FlatIpIndex {
    /// Build the index by adding every row of the store.
    pub fn build(store: &EmbeddingStore) -> Self {
        Self {
            matrix: store.clone(),
        }
    }

    /// Wrap an already loaded matrix.
    pub fn from_store(matrix: EmbeddingStore) -> Self {
        Self { matrix }
    }

    pub fn dimensions(&self) -> usize {
        self.matrix.dimensions()
    }

    pub fn matrix(&self) -> &EmbeddingStore {
        &self.matrix
    }
}

impl RecallStrategy for FlatIpIndex {
    fn recall(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>, IndexError> {
        if self.matrix.is_empty() || k == 0 {
            return Ok(vec![]);
        }
        check_query(query, self.matrix.dimensions())?;

        let scores: Vec<f32> = self
            .matrix
            .as_flat()
            .par_chunks_exact(self.matrix.dimensions())
            .map(|row| dot(query, row))
            .collect();

        Ok(top_k(scores, k))
    }

    fn len(&self) -> usize {
        self.matrix.len()
    }

    fn kind(&self) -> &'static str {
        "flat-ip"
    }
}

/// Exhaustive cosine similarity over the shared embedding store.
pub struct BruteForceCosine {
    store: Arc<EmbeddingStore>,
}

impl BruteForceCosine {
    pub fn new(store: Arc<EmbeddingStore>) -> Self {
        Self { store }
    }
}

impl RecallStrategy for BruteForceCosine {
    fn recall(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>, IndexError> {
        if self.store.is_empty() || k == 0 {
            return Ok(vec![]);
        }
        check_query(query, self.store.dimensions())?;

        let query_norm = l2_norm(query);
        let scores: Vec<f32> = self
            .store
            .rows()
            .map(|row| cosine_similarity(query, row, query_norm))
            .collect();

        Ok(top_k(scores, k))
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn kind(&self) -> &'static str {
        "brute-force"
    }
}

fn check_query(query: &[f32], dimensions: usize) -> Result<(), IndexError> {
    if query.len() != dimensions {
        return Err(IndexError::DimensionMismatch {
            expected: dimensions,
            got: query.len(),
        });
    }
    Ok(())
}

/// Best `k` rows by descending score. The sort is stable, so equal scores keep
/// row order; NaN scores sink to the bottom.
fn top_k(scores: Vec<f32>, k: usize) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = scores
        .into_iter()
        .enumerate()
        .map(|(row, score)| Candidate {
            row,
            score: if score.is_nan() { f32::NEG_INFINITY } else { score },
        })
        .collect();

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(k);
    candidates
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute L2 norm of a vector.
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Compute cosine similarity between two vectors.
/// Assumes query_norm is precomputed for efficiency.
fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
    let target_norm = l2_norm(target);
    if target_norm < f32::EPSILON || query_norm < f32::EPSILON {
        return 0.0;
    }

    dot(query, target) / (query_norm * target_norm)
}
