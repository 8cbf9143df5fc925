//! Immutable in-memory vector index with brute-force cosine search.

use super::types::{IndexBuildError, IndexedPassage, Passage};

/// Number of passages retrieved when the caller does not choose.
pub const DEFAULT_TOP_K: usize = 4;

/// A passage returned by [`VectorIndex::search`].
#[derive(Debug, Clone)]
pub struct SearchHit<'a> {
    /// Matched passage.
    pub passage: &'a Passage,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Read-only collection of indexed passages kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Vec<IndexedPassage>,
    dimension: usize,
}

impl VectorIndex {
    /// Assemble an index, checking that every vector shares one non-zero dimension.
    pub fn build(entries: Vec<IndexedPassage>) -> Result<Self, IndexBuildError> {
        let Some(first) = entries.first() else {
            return Ok(Self::default());
        };
        let dimension = first.vector.len();
        if dimension == 0 {
            return Err(IndexBuildError::EmptyVector);
        }
        if let Some(entry) = entries.iter().find(|entry| entry.vector.len() != dimension) {
            return Err(IndexBuildError::InconsistentDimension {
                index: entry.passage.index,
                expected: dimension,
                actual: entry.vector.len(),
            });
        }
        Ok(Self { entries, dimension })
    }

    /// Pair passages with their vectors and build an index.
    pub fn from_parts(
        passages: Vec<Passage>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexBuildError> {
        if passages.len() != vectors.len() {
            return Err(IndexBuildError::CountMismatch {
                passages: passages.len(),
                vectors: vectors.len(),
            });
        }
        Self::build(
            passages
                .into_iter()
                .zip(vectors)
                .map(|(passage, vector)| IndexedPassage { passage, vector })
                .collect(),
        )
    }

    /// Number of indexed passages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no passages.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension, zero for an empty index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Return up to `k` passages, most similar first.
    ///
    /// Equal scores keep insertion order. An empty index, or `k == 0`, yields no hits.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit<'_>> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<SearchHit<'_>> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                passage: &entry.passage,
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();
        // `sort_by` is stable, so ties stay in insertion order.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        hits
    }
}

/// Cosine similarity in `[-1, 1]`; zero for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
