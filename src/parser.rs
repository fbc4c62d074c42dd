//! Parsing providers: turn staged uploads into chunk lists.
//!
//! [`LocalParser`] extracts per-page plain text (PDF text layer, or
//! form-feed-delimited text for everything else) and delegates to the
//! configured [`Chunker`]. Remote layout-aware providers implement the same
//! [`DocumentParser`] trait (see the `unstructured` feature) and return
//! pre-chunked elements.
//!
//! Providers are registered by name in a [`ParserRegistry`]; an unknown name
//! fails when the pipeline is built, never deep inside a request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::chunking::Chunker;
use crate::document::{Chunk, Document, Page};
use crate::error::{PipelineError, Result};
use crate::storage::{FileHandle, StorageProvider};

/// A provider that extracts a staged upload into chunks.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse the staged file into the uniform chunk-list shape.
    async fn parse(&self, handle: &FileHandle, document: &Document) -> Result<Vec<Chunk>>;
}

/// Named lookup table of parsing providers.
///
/// Resolution happens once, at pipeline build time, so an invalid provider
/// name is a configuration error rather than a per-request failure.
#[derive(Default)]
pub struct ParserRegistry {
    providers: HashMap<String, Arc<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under a name, replacing any previous entry.
    pub fn register(mut self, name: impl Into<String>, parser: Arc<dyn DocumentParser>) -> Self {
        self.providers.insert(name.into(), parser);
        self
    }

    /// Resolve a provider by name.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ConfigError`] naming the unknown provider
    /// and the registered alternatives.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DocumentParser>> {
        self.providers.get(name).cloned().ok_or_else(|| {
            let mut known: Vec<&str> = self.providers.keys().map(String::as_str).collect();
            known.sort_unstable();
            PipelineError::ConfigError(format!(
                "unsupported parsing provider '{name}' (registered: {})",
                known.join(", ")
            ))
        })
    }
}

/// Extracts text locally and delegates chunking to a [`Chunker`].
pub struct LocalParser {
    storage: Arc<dyn StorageProvider>,
    chunker: Arc<dyn Chunker>,
}

impl LocalParser {
    /// Create a local parser reading from the given storage provider.
    pub fn new(storage: Arc<dyn StorageProvider>, chunker: Arc<dyn Chunker>) -> Self {
        Self { storage, chunker }
    }

    /// Extract per-page text from raw file bytes.
    ///
    /// PDFs go through the text-layer extractor on a blocking thread; any
    /// other content type is decoded as UTF-8 and split on form feeds, the
    /// page delimiter for plain text.
    async fn extract_pages(&self, bytes: Vec<u8>, content_type: &str) -> Result<Vec<Page>> {
        let text = if content_type == "application/pdf" {
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                .await
                .map_err(|e| PipelineError::ParsingError {
                    provider: "local".to_string(),
                    message: format!("extraction task failed: {e}"),
                })?
                .map_err(|e| PipelineError::ParsingError {
                    provider: "local".to_string(),
                    message: format!("PDF text extraction failed: {e}"),
                })?
        } else {
            String::from_utf8(bytes).map_err(|e| PipelineError::ParsingError {
                provider: "local".to_string(),
                message: format!("file is not valid UTF-8: {e}"),
            })?
        };

        Ok(split_form_feeds(&text))
    }
}

/// Split extracted text on form feeds into numbered pages, skipping empty ones.
fn split_form_feeds(text: &str) -> Vec<Page> {
    text.split('\u{c}')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| Page { page_number: i as u32 + 1, text: page.to_string() })
        .collect()
}

#[async_trait]
impl DocumentParser for LocalParser {
    async fn parse(&self, handle: &FileHandle, document: &Document) -> Result<Vec<Chunk>> {
        let bytes = self.storage.read(handle).await?;
        let pages = self.extract_pages(bytes, &document.content_type).await?;
        debug!(document.id = %document.id, pages = pages.len(), "extracted pages");

        self.chunker.chunk(document, &pages)
    }
}
