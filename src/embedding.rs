//! Embedding provider trait and the document/query embedder.
//!
//! [`DocumentEmbedder`] drives an [`EmbeddingProvider`] with a fixed delay
//! between calls to stay under the provider's requests-per-minute ceiling
//! (chunk volume per document is bounded, so a fixed delay is enough — no
//! token bucket). It also owns the vector-record contract: record ids share
//! a per-document prefix, and metadata is normalized to flat values before
//! it reaches the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

use crate::document::{Chunk, Document, EmbeddingRecord, MetadataValue};
use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (OpenAI, local models,
/// test doubles) behind a unified async interface.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Normalize chunk metadata into the flat shape vector stores accept.
///
/// Vector-record metadata fields are flat scalars or string arrays only.
/// Strings and numbers pass through; arrays and nested maps are flattened
/// to `"key:value"` string arrays (array indices serve as keys). This is
/// part of the record contract: stores and retrieval formatting both rely
/// on it.
pub fn flatten_metadata(chunk: &Chunk) -> HashMap<String, MetadataValue> {
    let mut out = HashMap::new();

    let value = match serde_json::to_value(&chunk.metadata) {
        Ok(v) => v,
        Err(_) => return out,
    };
    let serde_json::Value::Object(fields) = value else {
        return out;
    };

    for (key, field) in fields {
        match field {
            serde_json::Value::String(s) => {
                out.insert(key, MetadataValue::Str(s));
            }
            serde_json::Value::Number(n) => {
                if let Some(n) = n.as_f64() {
                    out.insert(key, MetadataValue::Num(n));
                }
            }
            serde_json::Value::Array(items) => {
                let flat = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| match item {
                        serde_json::Value::String(s) => format!("{i}:{s}"),
                        other => format!("{i}:{other}"),
                    })
                    .collect();
                out.insert(key, MetadataValue::StrList(flat));
            }
            serde_json::Value::Object(nested) => {
                let flat = nested.iter().map(|(k, v)| format!("{k}:{v}")).collect();
                out.insert(key, MetadataValue::StrList(flat));
            }
            // Nulls (e.g. a missing page number) are omitted entirely.
            _ => {}
        }
    }

    out.insert("text".to_string(), MetadataValue::Str(chunk.text.clone()));
    out
}

/// Embeds document chunks and query text through a rate-limited provider.
pub struct DocumentEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    delay: Duration,
}

impl DocumentEmbedder {
    /// Create an embedder with the given inter-call delay.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, delay: Duration) -> Self {
        Self { provider, delay }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed every chunk of one document into [`EmbeddingRecord`]s.
    ///
    /// Record ids are `"{ascii(file_name)}#{document_id}#{seq}"` with a
    /// 1-based sequence number, so all of a document's records share the
    /// prefix returned by [`Document::chunk_prefix`]. Calls are spaced by
    /// the configured delay.
    ///
    /// # Errors
    ///
    /// The first failed embedding call aborts the whole document — no
    /// partial record list is ever returned.
    pub async fn embed_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
    ) -> Result<Vec<EmbeddingRecord>> {
        let prefix = document.chunk_prefix();
        let mut records = Vec::with_capacity(chunks.len());

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let values = self.provider.embed(&chunk.text).await.map_err(|e| {
                error!(document.id = %document.id, chunk = %chunk.id, error = %e,
                    "embedding failed, aborting document");
                e
            })?;

            records.push(EmbeddingRecord {
                id: format!("{prefix}#{}", index + 1),
                values,
                metadata: flatten_metadata(chunk),
            });
        }

        debug!(document.id = %document.id, records = records.len(), "embedded document");
        Ok(records)
    }

    /// Embed a query, framed with the owner and current date.
    ///
    /// The query is not chunked; the framing loosely matches the
    /// representation used at ingestion time.
    pub async fn embed_query(&self, owner: &str, text: &str) -> Result<Vec<f32>> {
        let framed =
            format!("Date: {}. User: {owner}. Message: {text}.", Utc::now().to_rfc3339());
        self.provider.embed(&framed).await
    }
}
