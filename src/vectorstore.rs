//! Namespace-scoped vector store trait and the index manager built on it.
//!
//! Every operation takes the namespace (the owner identity) as its first
//! parameter — there is no way to touch the store without naming exactly
//! one namespace, so cross-namespace access is structurally impossible.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::{Document, EmbeddingRecord, VectorMatch};
use crate::error::{PipelineError, Result};

/// Page size used when walking a document's chunk ids for deletion.
const DELETE_PAGE_SIZE: usize = 100;

/// One page of a paginated chunk-id listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkIdPage {
    /// Record ids on this page.
    pub ids: Vec<String>,
    /// Cursor for the next page; `None` when the listing is exhausted.
    pub next_cursor: Option<String>,
}

/// A storage backend for embedding records, partitioned by namespace.
///
/// Upserts are idempotent by record id. Queries return metadata but never
/// raw vector values.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert records into a namespace, creating it if needed.
    async fn upsert(&self, namespace: &str, records: &[EmbeddingRecord]) -> Result<()>;

    /// Return the `top_k` records most similar to the given vector,
    /// ordered by descending score, scoped to one namespace.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>>;

    /// List record ids with the given prefix, one page at a time.
    ///
    /// Pass the previous page's `next_cursor` to advance; `None` starts
    /// from the beginning.
    async fn list_paginated(
        &self,
        namespace: &str,
        prefix: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ChunkIdPage>;

    /// Delete records by id from a namespace.
    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()>;
}

/// Batched upsert and prefix-based bulk deletion over a [`VectorStore`].
pub struct IndexManager {
    store: Arc<dyn VectorStore>,
    batch_size: usize,
}

impl IndexManager {
    /// Create a manager upserting in groups of `batch_size` records.
    pub fn new(store: Arc<dyn VectorStore>, batch_size: usize) -> Self {
        Self { store, batch_size }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Upsert a document's records in bounded batches, sequentially, to
    /// respect the store's payload-size limits. Returns the record count.
    pub async fn upsert_document(
        &self,
        namespace: &str,
        records: &[EmbeddingRecord],
    ) -> Result<usize> {
        for batch in records.chunks(self.batch_size) {
            self.store.upsert(namespace, batch).await?;
        }
        debug!(namespace, records = records.len(), batch_size = self.batch_size, "upserted");
        Ok(records.len())
    }

    /// Query the owner's namespace for the `top_k` nearest records.
    pub async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        self.store.query(namespace, vector, top_k).await
    }

    /// Delete every record belonging to one document by walking its id
    /// prefix with cursor pagination, one page at a time, so memory stays
    /// bounded and the chunk count never needs to be known in advance.
    ///
    /// Returns the number of deleted records.
    pub async fn delete_document(&self, namespace: &str, document: &Document) -> Result<usize> {
        let prefix = document.chunk_prefix();
        let mut cursor: Option<String> = None;
        let mut deleted = 0usize;

        loop {
            let page = self
                .store
                .list_paginated(namespace, &prefix, DELETE_PAGE_SIZE, cursor.as_deref())
                .await
                .map_err(|e| {
                    PipelineError::VectorStoreError {
                        backend: "index".to_string(),
                        message: format!(
                            "failed to list chunks for document {}: {e}",
                            document.id
                        ),
                    }
                })?;

            if !page.ids.is_empty() {
                self.store.delete(namespace, &page.ids).await.map_err(|e| {
                    PipelineError::VectorStoreError {
                        backend: "index".to_string(),
                        message: format!(
                            "failed to delete chunks for document {}: {e}",
                            document.id
                        ),
                    }
                })?;
                deleted += page.ids.len();
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(namespace, document.id = %document.id, deleted, "purged document chunks");
        Ok(deleted)
    }
}
