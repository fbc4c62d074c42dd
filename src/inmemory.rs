//! In-memory vector store using cosine similarity.
//!
//! [`InMemoryVectorStore`] keeps each namespace in a `BTreeMap` keyed by
//! record id, so prefix listings are ordered and cursor pagination is
//! deterministic. Suitable for development and tests; production stores
//! plug in behind the same [`VectorStore`] trait.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{EmbeddingRecord, VectorMatch};
use crate::error::Result;
use crate::vectorstore::{ChunkIdPage, VectorStore};

/// An in-memory, namespace-partitioned vector store.
///
/// Namespaces are created on first upsert. Queries against an unknown
/// namespace return no matches rather than erroring: an owner who has not
/// ingested anything simply has an empty partition.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    namespaces: RwLock<HashMap<String, BTreeMap<String, EmbeddingRecord>>>,
}

impl InMemoryVectorStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a namespace (test and diagnostics helper).
    pub async fn record_count(&self, namespace: &str) -> usize {
        self.namespaces.read().await.get(namespace).map_or(0, BTreeMap::len)
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, namespace: &str, records: &[EmbeddingRecord]) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        let partition = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            partition.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let namespaces = self.namespaces.read().await;
        let Some(partition) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<VectorMatch> = partition
            .values()
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(&record.values, vector),
                metadata: record.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn list_paginated(
        &self,
        namespace: &str,
        prefix: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ChunkIdPage> {
        let namespaces = self.namespaces.read().await;
        let Some(partition) = namespaces.get(namespace) else {
            return Ok(ChunkIdPage { ids: Vec::new(), next_cursor: None });
        };

        // Ids sort lexicographically, so all prefix matches are contiguous.
        // The cursor is the first id of the next page.
        let start = cursor.unwrap_or(prefix).to_string();
        let mut ids = Vec::new();
        let mut next_cursor = None;

        for id in partition
            .range::<String, _>((Bound::Included(&start), Bound::Unbounded))
            .map(|(id, _)| id)
        {
            if !id.starts_with(prefix) {
                break;
            }
            if ids.len() == limit {
                next_cursor = Some(id.clone());
                break;
            }
            ids.push(id.clone());
        }

        Ok(ChunkIdPage { ids, next_cursor })
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        if let Some(partition) = namespaces.get_mut(namespace) {
            for id in ids {
                partition.remove(id);
            }
        }
        Ok(())
    }
}
