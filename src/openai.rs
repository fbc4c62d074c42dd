//! OpenAI embedding backend.
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{PipelineError, Result};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// The default embedding model.
const DEFAULT_MODEL: &str = "text-embedding-3-large";

/// Dimensionality of `text-embedding-3-large`.
const DEFAULT_DIMENSIONS: usize = 3072;

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// Requests are made one input at a time with float encoding; the pipeline
/// paces calls itself (see [`crate::embedding::DocumentEmbedder`]), so no
/// batching happens at this layer.
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimensions: usize,
    request_dimensions: Option<usize>,
}

impl OpenAiEmbedding {
    /// Create a new provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(PipelineError::EmbeddingError {
                provider: "openai".to_string(),
                message: "API key must not be empty".to_string(),
            });
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a new provider from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| PipelineError::EmbeddingError {
                provider: "openai".to_string(),
                message: "OPENAI_API_KEY environment variable not set".to_string(),
            })?;
        Self::new(api_key)
    }

    /// Set the model name (e.g. `text-embedding-3-small`).
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Request Matryoshka-truncated embeddings of the given size.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    fn provider_err(message: String) -> PipelineError {
        PipelineError::EmbeddingError { provider: "openai".to_string(), message }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "openai", model = %self.model, text_len = text.len(), "embedding text");

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: text,
            encoding_format: "float",
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(OPENAI_EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "openai", error = %e, "request failed");
                Self::provider_err(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(provider = "openai", %status, "API error");
            return Err(Self::provider_err(format!("API returned {status}: {detail}")));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "openai", error = %e, "failed to parse response");
            Self::provider_err(format!("failed to parse response: {e}"))
        })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Self::provider_err("API returned empty response".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
