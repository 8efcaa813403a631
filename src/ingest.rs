//! Offline Ingestion Pipeline
//!
//! Builds the serving artifacts from a directory of raw corpus
//! documents: enumerate `*.txt` files, split each into paragraph
//! snippets on blank-line boundaries, embed every snippet, build a flat
//! index, and write the index plus the position-aligned snippet list.
//!
//! Re-running ingestion is a full replace: it produces an entirely new
//! index. Directory listing order is not a contract, so snippet
//! positions are not guaranteed stable across re-ingestion; only the
//! snippet count and dimension are.

use std::path::Path;
use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{AppError, AppResult};
use crate::index::FlatIndex;

/// Summary of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Number of corpus documents read.
    pub documents: usize,
    /// Number of snippets embedded and indexed.
    pub snippets: usize,
    /// Embedding dimension of the built index.
    pub dimension: usize,
}

/// Split a document into paragraph snippets on blank-line boundaries.
///
/// Fragments that are empty after trimming are dropped; surviving
/// fragments keep their original interior whitespace.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read every `*.txt` document under `corpus_dir` and split it into
/// snippets.
fn collect_snippets(corpus_dir: &Path) -> AppResult<(usize, Vec<String>)> {
    if !corpus_dir.is_dir() {
        return Err(AppError::validation(format!(
            "corpus directory {} does not exist",
            corpus_dir.display()
        )));
    }

    let mut documents = 0;
    let mut snippets = Vec::new();
    for entry in std::fs::read_dir(corpus_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let text = std::fs::read_to_string(&path)?;
        let parts = split_paragraphs(&text);
        debug!(
            document = %path.display(),
            snippets = parts.len(),
            "document split"
        );
        documents += 1;
        snippets.extend(parts);
    }
    Ok((documents, snippets))
}

/// Run the full ingestion pipeline and write both artifacts.
pub async fn run(
    config: &IngestConfig,
    embedder: &dyn EmbeddingProvider,
) -> AppResult<IngestReport> {
    let (documents, snippets) = collect_snippets(&config.corpus_dir)?;
    info!(documents, snippets = snippets.len(), "corpus collected");

    // Embed in provider-sized batches; one vector per snippet, in order.
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(snippets.len());
    let batch_size = embedder.max_batch_size().max(1);
    for chunk in snippets.chunks(batch_size) {
        let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
        let batch = embedder.embed_batch(&refs).await?;
        vectors.extend(batch);
    }

    let index = FlatIndex::build(embedder.dimension(), vectors)?;
    index.save(&config.index_path)?;

    if let Some(parent) = config.snippets_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config.snippets_path, serde_json::to_vec(&snippets)?)?;

    info!(
        index = %config.index_path.display(),
        snippets = %config.snippets_path.display(),
        "ingestion complete"
    );

    Ok(IngestReport {
        documents,
        snippets: snippets.len(),
        dimension: index.dimension(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
