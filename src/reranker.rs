//! Reranker trait for re-scoring vector query candidates.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{MetadataValue, VectorMatch};
use crate::error::Result;

/// A candidate re-scored against the original query text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMatch {
    /// The record id of the candidate.
    pub id: String,
    /// Cross-encoder relevance score (higher is more relevant).
    pub relevance_score: f32,
    /// The candidate's metadata.
    pub metadata: HashMap<String, MetadataValue>,
}

/// A reranker that re-scores vector query candidates against the query text.
///
/// Implementations can use cross-encoder models, LLM scoring, or other
/// strategies to improve precision beyond initial vector similarity.
/// Results come back ordered by descending relevance, at most `top_n` long.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank candidates given the original query.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<VectorMatch>,
        top_n: usize,
    ) -> Result<Vec<RankedMatch>>;
}

/// A pass-through reranker that keeps the vector similarity ordering.
///
/// Useful as a default when no cross-encoder backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(
        &self,
        _query: &str,
        candidates: Vec<VectorMatch>,
        top_n: usize,
    ) -> Result<Vec<RankedMatch>> {
        let mut ranked: Vec<RankedMatch> = candidates
            .into_iter()
            .map(|m| RankedMatch { id: m.id, relevance_score: m.score, metadata: m.metadata })
            .collect();
        ranked.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(top_n);
        Ok(ranked)
    }
}
