//! Query-path retrieval: embed, query, rerank, filter, format.

use std::sync::Arc;

use tracing::info;

use crate::document::MetadataValue;
use crate::embedding::DocumentEmbedder;
use crate::error::Result;
use crate::events::{measured, ProgressSender};
use crate::reranker::{RankedMatch, Reranker};
use crate::vectorstore::IndexManager;

/// Returned instead of an empty context when the vector query has no
/// candidates, so callers can't conflate "no relevant context" with
/// "context not yet computed".
pub const NO_CONTEXT_MESSAGE: &str = "No relevant documents found.";

/// One surviving result of a retrieval, ready for prompt assembly.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// The chunk's record id.
    pub id: String,
    /// The chunk text.
    pub text: String,
    /// Source filename.
    pub file_name: String,
    /// Source page, when the document was paginated.
    pub page_number: Option<u32>,
    /// Cross-encoder relevance score.
    pub relevance_score: f32,
}

/// The outcome of one retrieval: surviving results ordered by descending
/// relevance plus a formatted context block. Ephemeral, never persisted.
#[derive(Debug, Clone)]
pub struct RankedContext {
    /// Results at or above the relevance threshold, descending by score.
    pub results: Vec<ScoredChunk>,
    /// One paragraph per source chunk, or [`NO_CONTEXT_MESSAGE`].
    pub context: String,
}

impl RankedContext {
    fn empty() -> Self {
        Self { results: Vec::new(), context: NO_CONTEXT_MESSAGE.to_string() }
    }
}

/// Retrieves reranked, relevance-filtered context for a query.
pub struct Retriever {
    embedder: Arc<DocumentEmbedder>,
    index: Arc<IndexManager>,
    reranker: Arc<dyn Reranker>,
    top_k: usize,
    top_n: usize,
    relevance_threshold: f32,
}

impl Retriever {
    /// Create a retriever over the given embedder, index, and reranker.
    pub fn new(
        embedder: Arc<DocumentEmbedder>,
        index: Arc<IndexManager>,
        reranker: Arc<dyn Reranker>,
        top_k: usize,
        top_n: usize,
        relevance_threshold: f32,
    ) -> Self {
        Self { embedder, index, reranker, top_k, top_n, relevance_threshold }
    }

    /// Retrieve ranked context for a query in the owner's namespace.
    ///
    /// Embeds the query, fetches the `top_k` nearest candidates, reranks
    /// them to `top_n`, and keeps those with `score >= threshold` (ties at
    /// the threshold included). Zero vector matches skip reranking and
    /// produce the explicit no-context message.
    pub async fn retrieve(
        &self,
        owner: &str,
        query: &str,
        events: &ProgressSender,
    ) -> Result<RankedContext> {
        let vector =
            measured(events, "Embedding", self.embedder.embed_query(owner, query)).await?;

        let matches =
            measured(events, "Querying", self.index.query(owner, &vector, self.top_k)).await?;

        if matches.is_empty() {
            info!(owner, "vector query returned no candidates");
            events.notify("Query results are empty. Reranking skipped");
            return Ok(RankedContext::empty());
        }

        let ranked = measured(
            events,
            "Reranking",
            self.reranker.rerank(query, matches, self.top_n),
        )
        .await?;

        let mut results: Vec<ScoredChunk> = ranked
            .into_iter()
            .filter(|r| r.relevance_score >= self.relevance_threshold)
            .map(scored_chunk)
            .collect();
        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        info!(owner, results = results.len(), "retrieval completed");

        if results.is_empty() {
            return Ok(RankedContext::empty());
        }
        let context = format_context(&results);
        Ok(RankedContext { results, context })
    }
}

/// Pull the formatting-relevant fields out of a ranked match's metadata.
fn scored_chunk(ranked: RankedMatch) -> ScoredChunk {
    let text = ranked
        .metadata
        .get("text")
        .and_then(MetadataValue::as_str)
        .unwrap_or_default()
        .to_string();
    let file_name = ranked
        .metadata
        .get("file_name")
        .and_then(MetadataValue::as_str)
        .unwrap_or_default()
        .to_string();
    let page_number = match ranked.metadata.get("page_number") {
        Some(MetadataValue::Num(n)) => Some(*n as u32),
        _ => None,
    };
    ScoredChunk {
        id: ranked.id,
        text,
        file_name,
        page_number,
        relevance_score: ranked.relevance_score,
    }
}

/// Format surviving results into a context block: one paragraph per chunk.
fn format_context(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .map(|r| {
            let page = r.page_number.map_or_else(|| "-".to_string(), |p| p.to_string());
            format!(
                "Filename: {}. Page: {}. Relevance Score: {:.4}.\n{}",
                r.file_name, page, r.relevance_score, r.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn context_block_lists_one_paragraph_per_chunk() {
        let results = vec![
            ScoredChunk {
                id: "a#1".into(),
                text: "First chunk.".into(),
                file_name: "a.pdf".into(),
                page_number: Some(2),
                relevance_score: 0.91,
            },
            ScoredChunk {
                id: "b#1".into(),
                text: "Second chunk.".into(),
                file_name: "b.txt".into(),
                page_number: None,
                relevance_score: 0.55,
            },
        ];
        let block = format_context(&results);
        let paragraphs: Vec<&str> = block.split("\n\n").collect();
        assert_eq!(paragraphs.len(), 2);
        assert!(paragraphs[0].starts_with("Filename: a.pdf. Page: 2."));
        assert!(paragraphs[0].ends_with("First chunk."));
        assert!(paragraphs[1].contains("Page: -."));
    }

    #[test]
    fn scored_chunk_reads_flat_metadata() {
        let mut metadata = HashMap::new();
        metadata.insert("text".to_string(), MetadataValue::Str("body".to_string()));
        metadata.insert("file_name".to_string(), MetadataValue::Str("x.pdf".to_string()));
        metadata.insert("page_number".to_string(), MetadataValue::Num(7.0));

        let chunk =
            scored_chunk(RankedMatch { id: "x#1".into(), relevance_score: 0.5, metadata });
        assert_eq!(chunk.text, "body");
        assert_eq!(chunk.page_number, Some(7));
    }
}
