//! Documentation sections used as retrieval references.

use serde::{Deserialize, Serialize};

/// A chunk of release-note or documentation text with its precomputed embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSection {
    pub id: i64,
    pub content: String,
    pub embedding: Vec<f32>,
}

impl DocSection {
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// A section scored against a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedSection<'a> {
    pub similarity: f32,
    pub section: &'a DocSection,
}

/// Dot product; corpus embeddings are unit length so this is cosine similarity.
///
/// Vectors of different length are compared over their common prefix.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
