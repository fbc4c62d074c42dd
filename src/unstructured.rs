//! Layout-aware remote parsing via an Unstructured-compatible partition API.
//!
//! This module is only available when the `unstructured` feature is enabled.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};

use crate::document::{Chunk, ChunkMetadata, Document};
use crate::error::{PipelineError, Result};
use crate::parser::DocumentParser;
use crate::storage::{FileHandle, StorageProvider};

/// The default hosted partition endpoint.
const DEFAULT_PARTITION_URL: &str = "https://api.unstructured.io/general/v0/general";

/// A [`DocumentParser`] backed by a remote layout-aware partition service.
///
/// File bytes and chunking parameters are uploaded to the service; the
/// returned elements are already chunked and layout-annotated, so they pass
/// through largely unmodified.
pub struct UnstructuredParser {
    client: reqwest::Client,
    storage: Arc<dyn StorageProvider>,
    api_key: String,
    server_url: String,
    strategy: String,
    max_characters: usize,
    overlap: usize,
}

impl UnstructuredParser {
    /// Create a new parser with the given API key and chunking parameters.
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        api_key: impl Into<String>,
        max_characters: usize,
        overlap: usize,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(PipelineError::ConfigError(
                "unstructured API key must not be empty".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            storage,
            api_key,
            server_url: DEFAULT_PARTITION_URL.to_string(),
            strategy: "auto".to_string(),
            max_characters,
            overlap,
        })
    }

    /// Point at a self-hosted partition endpoint.
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Set the partition strategy (`auto`, `fast`, `hi_res`, ...).
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    fn provider_err(message: String) -> PipelineError {
        PipelineError::ParsingError { provider: "unstructured".to_string(), message }
    }
}

#[derive(Deserialize)]
struct Element {
    text: String,
    #[serde(default)]
    metadata: ElementMetadata,
}

#[derive(Deserialize, Default)]
struct ElementMetadata {
    #[serde(default)]
    page_number: Option<u32>,
    #[serde(default)]
    languages: Vec<String>,
}

#[async_trait]
impl DocumentParser for UnstructuredParser {
    async fn parse(&self, handle: &FileHandle, document: &Document) -> Result<Vec<Chunk>> {
        let bytes = self.storage.read(handle).await?;

        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(document.name.clone())
            .mime_str(&document.content_type)
            .map_err(|e| Self::provider_err(format!("invalid content type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("files", file_part)
            .text("strategy", self.strategy.clone())
            .text("chunking_strategy", "by_title")
            .text("max_characters", self.max_characters.to_string())
            .text("overlap", self.overlap.to_string());

        debug!(document.id = %document.id, strategy = %self.strategy, "partitioning remotely");

        let response = self
            .client
            .post(&self.server_url)
            .header("unstructured-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "unstructured", error = %e, "request failed");
                Self::provider_err(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(provider = "unstructured", %status, "API error");
            return Err(Self::provider_err(format!("API returned {status}: {body}")));
        }

        let elements: Vec<Element> = response.json().await.map_err(|e| {
            error!(provider = "unstructured", error = %e, "failed to parse response");
            Self::provider_err(format!("failed to parse response: {e}"))
        })?;

        Ok(elements
            .into_iter()
            .filter(|e| !e.text.trim().is_empty())
            .enumerate()
            .map(|(index, element)| Chunk {
                id: format!("{}:{index}", document.id),
                text: element.text,
                metadata: ChunkMetadata {
                    file_name: document.name.clone(),
                    file_type: document.content_type.clone(),
                    page_number: element.metadata.page_number,
                    languages: element.metadata.languages,
                    parent_id: document.id.clone(),
                    owner: document.owner.clone(),
                },
            })
            .collect())
    }
}
