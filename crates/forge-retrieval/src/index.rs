//! In-memory vector index with brute-force cosine similarity search.
//!
//! Entries keep insertion order, which also breaks score ties. Every vector
//! must match the index dimension, fixed at construction or by the first
//! insert.

use std::sync::{Arc, RwLock};

use forge_core::error::ForgeError;
use forge_core::{DocumentChunk, IndexedChunk};
use serde::Serialize;

/// A chunk returned from a search with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f64,
}

#[derive(Debug, Default)]
struct IndexInner {
    /// Dimension requested at construction; survives `clear`.
    configured: Option<usize>,
    dimensions: Option<usize>,
    entries: Vec<IndexedChunk>,
}

impl IndexInner {
    fn check(&self, actual: usize) -> Result<(), ForgeError> {
        match self.dimensions {
            Some(expected) if expected != actual => {
                Err(ForgeError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

/// Thread-safe via interior RwLock; clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    inner: Arc<RwLock<IndexInner>>,
}

fn poisoned(e: impl std::fmt::Display) -> ForgeError {
    ForgeError::Index(format!("Lock poisoned: {}", e))
}

impl VectorIndex {
    /// Index whose dimension is fixed by the first insert.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(IndexInner {
                configured: Some(dimensions),
                dimensions: Some(dimensions),
                entries: Vec::new(),
            })),
        }
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.inner.read().ok().and_then(|i| i.dimensions)
    }

    pub fn insert(&self, chunk: DocumentChunk, embedding: Vec<f32>) -> Result<(), ForgeError> {
        self.extend(vec![IndexedChunk { chunk, embedding }])
    }

    /// Append entries. Nothing is inserted unless every vector fits.
    pub fn extend(&self, items: Vec<IndexedChunk>) -> Result<(), ForgeError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        validate(&inner, &items)?;
        if inner.dimensions.is_none() {
            inner.dimensions = items.first().map(|i| i.embedding.len());
        }
        inner.entries.extend(items);
        Ok(())
    }

    /// Swap the whole contents. On error the index is left as it was.
    pub fn replace(&self, items: Vec<IndexedChunk>) -> Result<(), ForgeError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let probe = IndexInner {
            configured: inner.configured,
            dimensions: inner.configured,
            entries: Vec::new(),
        };
        validate(&probe, &items)?;
        inner.dimensions = inner
            .configured
            .or_else(|| items.first().map(|i| i.embedding.len()));
        inner.entries = items;
        Ok(())
    }

    /// The `k` entries most similar to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, ForgeError> {
        let inner = self.inner.read().map_err(poisoned)?;
        if inner.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        inner.check(query.len())?;

        let mut scored: Vec<ScoredChunk> = inner
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query, &entry.embedding),
            })
            .collect();

        // Stable: equal scores stay in insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn snapshot(&self) -> Result<Vec<IndexedChunk>, ForgeError> {
        Ok(self.inner.read().map_err(poisoned)?.entries.clone())
    }

    pub fn clear(&self) -> Result<(), ForgeError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.entries.clear();
        inner.dimensions = inner.configured;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All items share one dimension, matching the index when it has one.
fn validate(inner: &IndexInner, items: &[IndexedChunk]) -> Result<(), ForgeError> {
    let Some(first) = items.first() else {
        return Ok(());
    };
    let expected = inner.dimensions.unwrap_or(first.embedding.len());
    if expected == 0 {
        return Err(ForgeError::Index("embedding vectors must not be empty".into()));
    }
    for item in items {
        if item.embedding.len() != expected {
            return Err(ForgeError::DimensionMismatch {
                expected,
                actual: item.embedding.len(),
            });
        }
    }
    Ok(())
}

/// Cosine similarity of two vectors.
///
/// Returns 0.0 when the lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
