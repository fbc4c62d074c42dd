//! End-to-end ingestion and retrieval orchestration.
//!
//! [`IngestionPipeline`] wires storage, parsing, embedding, the vector
//! index, and the user registry together. Each uploaded file moves through
//! upload, parse, embed, and upsert stages; staged bytes are always cleaned
//! up afterwards, and a mid-flight failure rolls back whatever the file
//! already wrote to the index and the registry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::chunking::chunker_for;
use crate::config::PipelineConfig;
use crate::document::Document;
use crate::embedding::{DocumentEmbedder, EmbeddingProvider};
use crate::error::{PipelineError, Result};
use crate::events::{measured, ProgressSender};
use crate::parser::{DocumentParser, LocalParser, ParserRegistry};
use crate::reranker::{NoOpReranker, Reranker};
use crate::retrieval::{RankedContext, Retriever};
use crate::storage::{FileHandle, StorageProvider};
use crate::users::{InMemoryUserStore, UserStore};
use crate::vectorstore::{IndexManager, VectorStore};

/// A pipeline stage, as surfaced in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    /// Staging the raw upload bytes.
    Uploading,
    /// Extracting text and producing chunks.
    Parsing,
    /// Turning chunks into embedding records.
    Embedding,
    /// Writing records into the owner's namespace.
    Upserting,
    /// Removing the staged upload.
    CleaningUp,
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            IngestStage::Uploading => "Uploading",
            IngestStage::Parsing => "Parsing",
            IngestStage::Embedding => "Embedding",
            IngestStage::Upserting => "Upserting",
            IngestStage::CleaningUp => "Cleaning up",
        };
        f.write_str(label)
    }
}

fn stage_message(stage: IngestStage, file_name: &str) -> String {
    format!("{stage}: '{file_name}'")
}

/// An uploaded file, as received from the caller.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Display name of the file.
    pub name: String,
    /// MIME content type.
    pub content_type: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Create an upload from a name, content type, and bytes.
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self { name: name.into(), content_type: content_type.into(), bytes: bytes.into() }
    }
}

/// The per-file result of a batch ingestion.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    /// Name of the uploaded file.
    pub file_name: String,
    /// Id minted for this file's document record; every event emitted for
    /// the file carries it as the correlation id, including pre-check
    /// rejections.
    pub document_id: String,
    /// Whether the file was fully ingested.
    pub success: bool,
    /// The failure description, when `success` is false.
    pub error: Option<String>,
}

/// Aggregate result of a batch ingestion. One failed file never aborts the
/// rest of the batch.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// Number of files fully ingested.
    pub succeeded: usize,
    /// Number of files that failed.
    pub failed: usize,
    /// Per-file outcomes, in input order.
    pub outcomes: Vec<FileOutcome>,
}

impl BatchSummary {
    /// The human-readable batch summary line.
    pub fn message(&self) -> String {
        format!("Success: {}. Failed: {}.", self.succeeded, self.failed)
    }
}

fn is_supported(content_type: &str) -> bool {
    content_type == "application/pdf" || content_type.starts_with("text/")
}

/// Builder for [`IngestionPipeline`].
pub struct IngestionPipelineBuilder {
    config: PipelineConfig,
    storage: Option<Arc<dyn StorageProvider>>,
    parsers: Vec<(String, Arc<dyn DocumentParser>)>,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    reranker: Option<Arc<dyn Reranker>>,
    users: Option<Arc<dyn UserStore>>,
}

impl IngestionPipelineBuilder {
    /// Start a builder from a validated configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            storage: None,
            parsers: Vec::new(),
            embedding: None,
            vector_store: None,
            reranker: None,
            users: None,
        }
    }

    /// Set the file storage provider. Required.
    pub fn storage_provider(mut self, storage: Arc<dyn StorageProvider>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Register an additional parsing provider under a name.
    ///
    /// The `"local"` provider is always registered; a provider registered
    /// here under the same name replaces it.
    pub fn parser(mut self, name: impl Into<String>, parser: Arc<dyn DocumentParser>) -> Self {
        self.parsers.push((name.into(), parser));
        self
    }

    /// Set the embedding provider. Required.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding = Some(provider);
        self
    }

    /// Set the vector store backend. Required.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the reranker. Defaults to [`NoOpReranker`].
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set the user registry. Defaults to [`InMemoryUserStore`].
    pub fn user_store(mut self, users: Arc<dyn UserStore>) -> Self {
        self.users = Some(users);
        self
    }

    /// Build the pipeline, resolving the configured parsing provider.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ConfigError`] if a required component is
    /// missing or the configured parsing provider is not registered.
    pub fn build(self) -> Result<IngestionPipeline> {
        let storage = self
            .storage
            .ok_or_else(|| PipelineError::ConfigError("storage provider is required".into()))?;
        let embedding = self
            .embedding
            .ok_or_else(|| PipelineError::ConfigError("embedding provider is required".into()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| PipelineError::ConfigError("vector store is required".into()))?;

        let config = self.config;
        let chunker =
            chunker_for(config.strategy, config.min_chunk_size, config.max_chunk_size);
        let mut registry = ParserRegistry::new()
            .register("local", Arc::new(LocalParser::new(storage.clone(), chunker)));
        for (name, parser) in self.parsers {
            registry = registry.register(name, parser);
        }
        let parser = registry.resolve(&config.parsing_provider)?;

        let embedder = Arc::new(DocumentEmbedder::new(
            embedding,
            Duration::from_millis(config.embed_delay_ms),
        ));
        let index = Arc::new(IndexManager::new(vector_store, config.chunk_batch));
        let reranker = self.reranker.unwrap_or_else(|| Arc::new(NoOpReranker));
        let users = self.users.unwrap_or_else(|| Arc::new(InMemoryUserStore::new()));
        let retriever = Retriever::new(
            embedder.clone(),
            index.clone(),
            reranker,
            config.top_k,
            config.top_n,
            config.relevance_threshold,
        );

        Ok(IngestionPipeline { config, storage, parser, embedder, index, users, retriever })
    }
}

/// The document ingestion and retrieval pipeline.
pub struct IngestionPipeline {
    config: PipelineConfig,
    storage: Arc<dyn StorageProvider>,
    parser: Arc<dyn DocumentParser>,
    embedder: Arc<DocumentEmbedder>,
    index: Arc<IndexManager>,
    users: Arc<dyn UserStore>,
    retriever: Retriever,
}

impl IngestionPipeline {
    /// Start building a pipeline from a configuration.
    pub fn builder(config: PipelineConfig) -> IngestionPipelineBuilder {
        IngestionPipelineBuilder::new(config)
    }

    /// The pipeline's configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The per-user document registry.
    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    /// Ingest a batch of files for one owner.
    ///
    /// Files are ingested concurrently and settled independently; the
    /// summary reports per-file outcomes and the terminal event carries
    /// the `Success: N. Failed: M.` line.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ValidationError`] if the owner is empty or
    /// the batch contains no files. Per-file failures are reported in the
    /// summary, not as an error.
    pub async fn ingest_batch(
        &self,
        owner: &str,
        files: Vec<UploadFile>,
        events: &ProgressSender,
    ) -> Result<BatchSummary> {
        if owner.is_empty() {
            let err = PipelineError::ValidationError("owner must not be empty".into());
            events.error(err.to_string());
            return Err(err);
        }
        if files.is_empty() {
            let err = PipelineError::ValidationError("no files to ingest".into());
            events.error(err.to_string());
            return Err(err);
        }

        let outcomes = futures::future::join_all(
            files.iter().map(|file| self.ingest_file(owner, file, events)),
        )
        .await;

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let summary =
            BatchSummary { succeeded, failed: outcomes.len() - succeeded, outcomes };
        info!(owner, succeeded = summary.succeeded, failed = summary.failed, "batch settled");
        events.finish(summary.message());
        Ok(summary)
    }

    /// Ingest one file for an owner, settling to an outcome.
    ///
    /// Every event emitted for this file carries its document id as the
    /// correlation id. The staged upload is deleted whether or not the
    /// file succeeds; on failure, records already upserted and the
    /// registry entry are rolled back best-effort.
    pub async fn ingest_file(
        &self,
        owner: &str,
        file: &UploadFile,
        events: &ProgressSender,
    ) -> FileOutcome {
        let document = Document::new(owner, &file.name, &file.content_type);
        let events = events.with_correlation(&document.id);

        if !is_supported(&file.content_type) {
            let message = format!(
                "Validation error: unsupported content type '{}' for '{}'",
                file.content_type, file.name
            );
            events.error(message.clone());
            return FileOutcome {
                file_name: file.name.clone(),
                document_id: document.id,
                success: false,
                error: Some(message),
            };
        }

        let start = Instant::now();
        let mut staged: Option<FileHandle> = None;
        let mut upserted = false;

        let result =
            self.run_stages(&document, file, &mut staged, &mut upserted, &events).await;

        if let Some(handle) = &staged {
            let cleanup = measured(
                &events,
                &stage_message(IngestStage::CleaningUp, &file.name),
                self.storage.delete(handle, owner),
            )
            .await;
            if let Err(e) = cleanup {
                warn!(document.id = %document.id, error = %e, "cleanup failed");
                events.error(format!("Cleanup failed for '{}': {e}", file.name));
            }
        }

        let outcome = match result {
            Ok(records) => {
                info!(owner, document.id = %document.id, records, "file ingested");
                FileOutcome {
                    file_name: file.name.clone(),
                    document_id: document.id.clone(),
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                self.rollback(owner, &document, upserted).await;
                events.error(format!("Ingestion failed for '{}': {e}", file.name));
                FileOutcome {
                    file_name: file.name.clone(),
                    document_id: document.id.clone(),
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        };

        events.metric(format!(
            "Total time: {:.2} seconds.",
            start.elapsed().as_secs_f64()
        ));
        outcome
    }

    async fn run_stages(
        &self,
        document: &Document,
        file: &UploadFile,
        staged: &mut Option<FileHandle>,
        upserted: &mut bool,
        events: &ProgressSender,
    ) -> Result<usize> {
        let handle = measured(
            events,
            &stage_message(IngestStage::Uploading, &file.name),
            self.storage.upload(&file.bytes, &file.name, &file.content_type, &document.owner),
        )
        .await?;
        *staged = Some(handle.clone());

        let chunks = measured(
            events,
            &stage_message(IngestStage::Parsing, &file.name),
            self.parser.parse(&handle, document),
        )
        .await?;
        if chunks.is_empty() {
            // A readable file with no extractable text (whitespace-only,
            // blank pages) still settles as a success, with zero records.
            info!(document.id = %document.id, "no chunks extracted");
        }

        let records = measured(
            events,
            &stage_message(IngestStage::Embedding, &file.name),
            self.embedder.embed_document(document, &chunks),
        )
        .await?;

        // A partially applied upsert still needs rollback, so mark before
        // the stage runs.
        *upserted = true;
        let count = measured(
            events,
            &stage_message(IngestStage::Upserting, &file.name),
            self.index.upsert_document(&document.owner, &records),
        )
        .await?;

        self.users.add_document(&document.owner, document.clone()).await?;
        Ok(count)
    }

    /// Best-effort undo of a failed file's side effects.
    async fn rollback(&self, owner: &str, document: &Document, upserted: bool) {
        if upserted {
            if let Err(e) = self.index.delete_document(owner, document).await {
                warn!(document.id = %document.id, error = %e, "rollback of upserted records failed");
            }
        }
        if let Err(e) = self.users.remove_document(owner, &document.id).await {
            warn!(document.id = %document.id, error = %e, "rollback of registry entry failed");
        }
    }

    /// Retrieve ranked context for a query in the owner's namespace.
    ///
    /// The terminal event carries the formatted context.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ValidationError`] if the owner or query is
    /// empty; provider failures propagate after an error event.
    pub async fn retrieve(
        &self,
        owner: &str,
        query: &str,
        events: &ProgressSender,
    ) -> Result<RankedContext> {
        if owner.is_empty() {
            let err = PipelineError::ValidationError("owner must not be empty".into());
            events.error(err.to_string());
            return Err(err);
        }
        if query.trim().is_empty() {
            let err = PipelineError::ValidationError("query must not be empty".into());
            events.error(err.to_string());
            return Err(err);
        }

        let start = Instant::now();
        let context = match self.retriever.retrieve(owner, query, events).await {
            Ok(context) => context,
            Err(e) => {
                events.error(e.to_string());
                return Err(e);
            }
        };

        events.metric(format!(
            "Total time: {:.2} seconds.",
            start.elapsed().as_secs_f64()
        ));
        events.finish(context.context.clone());
        Ok(context)
    }

    /// Delete a document's records from the index and the registry.
    ///
    /// Returns the number of records deleted from the vector store.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ValidationError`] if the owner does not
    /// have a document with the given id. If the index deletion fails, the
    /// registry entry is restored and the error propagates.
    pub async fn purge_document(
        &self,
        owner: &str,
        document_id: &str,
        events: &ProgressSender,
    ) -> Result<usize> {
        let Some(document) = self.users.remove_document(owner, document_id).await? else {
            let err = PipelineError::ValidationError(format!(
                "no document '{document_id}' for owner '{owner}'"
            ));
            events.error(err.to_string());
            return Err(err);
        };

        let deleted = match self.index.delete_document(owner, &document).await {
            Ok(deleted) => deleted,
            Err(e) => {
                if let Err(restore) = self.users.add_document(owner, document).await {
                    warn!(owner, document_id, error = %restore, "failed to restore registry entry");
                }
                events.error(e.to_string());
                return Err(e);
            }
        };

        info!(owner, document_id, deleted, "document purged");
        events.notify(format!("Deleted {deleted} chunks for '{}'", document.name));
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inmemory::InMemoryVectorStore;
    use crate::storage::LocalStorage;
    use async_trait::async_trait;

    struct ByteSumEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ByteSumEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let sum: u32 = text.bytes().map(u32::from).sum();
            Ok(vec![sum as f32, text.len() as f32, 1.0])
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    fn test_pipeline() -> IngestionPipeline {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .min_chunk_size(8)
            .max_chunk_size(64)
            .overlap(8)
            .embed_delay_ms(0)
            .build()
            .unwrap();
        IngestionPipeline::builder(config)
            .storage_provider(Arc::new(LocalStorage::new(tmp.into_path())))
            .embedding_provider(Arc::new(ByteSumEmbedder))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn build_requires_storage() {
        let config = PipelineConfig::default();
        let err = IngestionPipeline::builder(config)
            .embedding_provider(Arc::new(ByteSumEmbedder))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }

    #[tokio::test]
    async fn unsupported_content_type_is_rejected_per_file() {
        let pipeline = test_pipeline();
        let files = vec![
            UploadFile::new("notes.txt", "text/plain", b"Portable text contents for tests.".to_vec()),
            UploadFile::new("photo.png", "image/png", vec![0u8; 4]),
        ];
        let (events, mut rx) = ProgressSender::channel("batch-1");
        let summary = pipeline.ingest_batch("alice", files, &events).await.unwrap();
        drop(events);

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.message(), "Success: 1. Failed: 1.");
        assert!(summary.outcomes[1].error.as_deref().unwrap().contains("image/png"));

        // A rejected file still gets a document id, and its error event is
        // correlated by it like every other per-file event.
        let rejected_id = &summary.outcomes[1].document_id;
        assert!(!rejected_id.is_empty());
        let mut saw_rejection = false;
        while let Some(event) = rx.recv().await {
            if event.kind == crate::events::EventKind::Error {
                assert_eq!(&event.correlation_id, rejected_id);
                saw_rejection = true;
            }
        }
        assert!(saw_rejection);
    }

    #[tokio::test]
    async fn empty_batch_is_a_validation_error() {
        let pipeline = test_pipeline();
        let err = pipeline
            .ingest_batch("alice", Vec::new(), &ProgressSender::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ValidationError(_)));
    }

    #[tokio::test]
    async fn purge_of_unknown_document_fails() {
        let pipeline = test_pipeline();
        let err = pipeline
            .purge_document("alice", "missing", &ProgressSender::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ValidationError(_)));
    }
}
