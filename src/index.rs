//! Flat Vector Index
//!
//! Exact brute-force nearest-neighbor search over fixed-dimension
//! embedding vectors, using squared L2 distance. The index is built once
//! by the offline ingestion pipeline and treated as read-only for the
//! lifetime of the serving process.
//!
//! ## Ordering
//!
//! `search` returns results in ascending distance; equal distances are
//! broken by ascending position. The ordering is fully deterministic:
//! identical query against an unchanged index always returns the same
//! result.
//!
//! ## Persistence
//!
//! Two JSON artifacts produced by ingestion and loaded at startup:
//! - the index file (dimension + vectors)
//! - the snippet-text list, position-aligned with the vectors
//!
//! Every vector position has exactly one snippet at the same position.
//! `Corpus::new` checks this invariant and rejects mismatched artifacts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{AppError, AppResult};

/// Exact flat index over fixed-dimension embedding vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    /// Build an index over the given vectors.
    ///
    /// This is the only mutator; once built, the index is immutable. All
    /// vectors must share `dimension`. An empty vector set is valid and
    /// produces an index whose searches return empty results.
    pub fn build(dimension: usize, vectors: Vec<Vec<f32>>) -> AppResult<Self> {
        if dimension == 0 {
            return Err(AppError::validation("index dimension must be at least 1"));
        }
        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(AppError::retrieval(format!(
                    "vector at position {} has dimension {} (index dimension {})",
                    position,
                    vector.len(),
                    dimension
                )));
            }
        }
        Ok(Self { dimension, vectors })
    }

    /// Number of vectors in the index.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Embedding dimension, fixed for the lifetime of the index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Search for the `k` nearest neighbors of `query`.
    ///
    /// Returns `(position, distance)` pairs in ascending squared-L2
    /// distance, ties broken by ascending position, exactly
    /// `min(k, len)` entries. An empty index yields an empty result
    /// rather than an error; a query of the wrong dimensionality is a
    /// fatal configuration error.
    pub fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (position, squared_l2(query, vector)))
            .collect();

        // total_cmp keeps the ordering deterministic even for degenerate
        // float values; position is the explicit tie-break.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Serialize the index to a JSON artifact at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> AppResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(self)?;
        std::fs::write(path, json)?;
        info!(
            path = %path.display(),
            vectors = self.vectors.len(),
            dimension = self.dimension,
            "index artifact written"
        );
        Ok(())
    }

    /// Load an index from a JSON artifact, re-validating its invariants.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| AppError::retrieval(format!("cannot read index artifact {}: {}", path.display(), e)))?;
        let index: FlatIndex = serde_json::from_slice(&bytes)?;
        // Artifacts are external input; re-check what build() guarantees.
        FlatIndex::build(index.dimension, index.vectors)
    }
}

/// Squared L2 distance between two equal-length vectors.
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Corpus: index + position-aligned snippet texts
// ---------------------------------------------------------------------------

/// The serving-time corpus: a flat index plus the snippet texts it was
/// built from, addressed by the same stable positions.
#[derive(Debug, Clone)]
pub struct Corpus {
    index: FlatIndex,
    snippets: Vec<String>,
}

impl Corpus {
    /// Pair an index with its snippet texts, enforcing position alignment.
    pub fn new(index: FlatIndex, snippets: Vec<String>) -> AppResult<Self> {
        if index.len() != snippets.len() {
            return Err(AppError::retrieval(format!(
                "index holds {} vectors but snippet list holds {} texts",
                index.len(),
                snippets.len()
            )));
        }
        Ok(Self { index, snippets })
    }

    /// Load both artifacts produced by ingestion and validate alignment.
    pub fn load(
        index_path: impl AsRef<Path>,
        snippets_path: impl AsRef<Path>,
    ) -> AppResult<Self> {
        let index = FlatIndex::load(index_path)?;
        let snippets_path = snippets_path.as_ref();
        let bytes = std::fs::read(snippets_path).map_err(|e| {
            AppError::retrieval(format!(
                "cannot read snippet artifact {}: {}",
                snippets_path.display(),
                e
            ))
        })?;
        let snippets: Vec<String> = serde_json::from_slice(&bytes)?;
        let corpus = Corpus::new(index, snippets)?;
        info!(
            snippets = corpus.len(),
            dimension = corpus.dimension(),
            "corpus loaded"
        );
        Ok(corpus)
    }

    /// Number of snippets (== number of vectors).
    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    /// Whether the corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Embedding dimension of the underlying index.
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Snippet text at `position`, if in range.
    pub fn snippet(&self, position: usize) -> Option<&str> {
        self.snippets.get(position).map(String::as_str)
    }

    /// Top-`k` snippet texts nearest to `query`, in retrieval order
    /// (nearest first).
    pub fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<String>> {
        let hits = self.index.search(query, k)?;
        Ok(hits
            .into_iter()
            .map(|(position, _)| self.snippets[position].clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
