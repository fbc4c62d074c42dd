//! Cohere rerank backend.
//!
//! This module is only available when the `cohere` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::document::VectorMatch;
use crate::error::{PipelineError, Result};
use crate::reranker::{RankedMatch, Reranker};

const COHERE_RERANK_URL: &str = "https://api.cohere.com/v1/rerank";

/// The default rerank model.
const DEFAULT_MODEL: &str = "rerank-multilingual-v3.0";

/// Record metadata fields the rerank model scores against, besides the text.
const RANK_FIELDS: [&str; 7] =
    ["text", "file_name", "file_type", "languages", "page_number", "parent_id", "owner"];

/// A [`Reranker`] backed by the Cohere rerank API.
pub struct CohereReranker {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl CohereReranker {
    /// Create a new reranker with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(PipelineError::RerankerError {
                reranker: "cohere".to_string(),
                message: "API key must not be empty".to_string(),
            });
        }
        Ok(Self { client: reqwest::Client::new(), api_key, model: DEFAULT_MODEL.to_string() })
    }

    /// Create a new reranker from the `COHERE_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("COHERE_API_KEY").map_err(|_| PipelineError::RerankerError {
            reranker: "cohere".to_string(),
            message: "COHERE_API_KEY environment variable not set".to_string(),
        })?;
        Self::new(api_key)
    }

    /// Set the rerank model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn provider_err(message: String) -> PipelineError {
        PipelineError::RerankerError { reranker: "cohere".to_string(), message }
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<serde_json::Value>,
    rank_fields: Vec<&'a str>,
    top_n: usize,
    return_documents: bool,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

#[async_trait]
impl Reranker for CohereReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<VectorMatch>,
        top_n: usize,
    ) -> Result<Vec<RankedMatch>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let documents = candidates
            .iter()
            .map(|c| serde_json::to_value(&c.metadata))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Self::provider_err(format!("failed to serialize candidates: {e}")))?;

        debug!(reranker = "cohere", model = %self.model, candidates = candidates.len(), "reranking");

        let request_body = RerankRequest {
            model: &self.model,
            query,
            documents,
            rank_fields: RANK_FIELDS.to_vec(),
            top_n,
            return_documents: false,
        };

        let response = self
            .client
            .post(COHERE_RERANK_URL)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(reranker = "cohere", error = %e, "request failed");
                Self::provider_err(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(reranker = "cohere", %status, "API error");
            return Err(Self::provider_err(format!("API returned {status}: {body}")));
        }

        let parsed: RerankResponse = response.json().await.map_err(|e| {
            error!(reranker = "cohere", error = %e, "failed to parse response");
            Self::provider_err(format!("failed to parse response: {e}"))
        })?;

        // Results come back ordered by descending relevance; map each one
        // back to its candidate by index.
        parsed
            .results
            .into_iter()
            .map(|r| {
                candidates
                    .get(r.index)
                    .map(|c| RankedMatch {
                        id: c.id.clone(),
                        relevance_score: r.relevance_score,
                        metadata: c.metadata.clone(),
                    })
                    .ok_or_else(|| {
                        Self::provider_err(format!("result index {} out of range", r.index))
                    })
            })
            .collect()
    }
}
