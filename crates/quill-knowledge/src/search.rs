//! Exhaustive dot-product ranking over the embedding store.

use crate::store::EmbeddingStore;
use quill_core::error::{QuillError, Result};
use serde::Serialize;

/// A ranked chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult<'a> {
    pub text: &'a str,
    /// Raw dot product with the query.
    pub score: f32,
    /// Insertion position in the store, used to break ties.
    pub position: usize,
}

/// Sum of elementwise products. Vectors are not normalized.
///
/// Both slices must have the same length; extra elements of the longer one
/// are ignored. [`rank`] checks the query dimension before calling this.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Score every stored chunk against `query` and return the best `k`,
/// highest score first, earlier insertion first on equal scores.
/// NaN scores rank below every number.
pub fn rank<'a>(store: &'a EmbeddingStore, query: &[f32], k: usize) -> Result<Vec<SearchResult<'a>>> {
    if let Some(expected) = store.dimension() {
        if query.len() != expected {
            return Err(QuillError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }
    }
    if k == 0 || store.is_empty() {
        return Ok(Vec::new());
    }

    let mut scored: Vec<SearchResult<'a>> = store
        .iter()
        .enumerate()
        .map(|(position, chunk)| SearchResult {
            text: &chunk.text,
            score: dot_product(&chunk.vector, query),
            position,
        })
        .collect();
    scored.sort_by(|a, b| {
        sort_key(b.score)
            .total_cmp(&sort_key(a.score))
            .then_with(|| a.position.cmp(&b.position))
    });
    scored.truncate(k);
    Ok(scored)
}

fn sort_key(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}

/// Texts of the best `k` chunks, most similar first.
pub fn top_k<'a>(store: &'a EmbeddingStore, query: &[f32], k: usize) -> Result<Vec<&'a str>> {
    Ok(rank(store, query, k)?.into_iter().map(|r| r.text).collect())
}

/// Join ranked chunk texts by newlines, ready to paste into a prompt.
pub fn join_context(results: &[SearchResult<'_>]) -> String {
    results
        .iter()
        .map(|r| r.text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Best `k` chunk texts joined by newlines.
pub fn context_for(store: &EmbeddingStore, query: &[f32], k: usize) -> Result<String> {
    Ok(join_context(&rank(store, query, k)?))
}
