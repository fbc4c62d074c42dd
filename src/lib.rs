//! # papyrus
//!
//! A document ingestion and retrieval pipeline: uploaded files are staged,
//! parsed into page-attributed chunks, embedded, and upserted into the
//! owner's vector namespace; queries are embedded, matched against that
//! namespace, reranked, and formatted into ready-to-use context.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use papyrus::{
//!     IngestionPipeline, InMemoryVectorStore, LocalStorage, PipelineConfig,
//!     ProgressSender, UploadFile,
//! };
//!
//! let pipeline = IngestionPipeline::builder(PipelineConfig::default())
//!     .storage_provider(Arc::new(LocalStorage::in_temp_dir()))
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! let (events, mut rx) = ProgressSender::channel("batch-1");
//! let files = vec![UploadFile::new("notes.txt", "text/plain", bytes)];
//! let summary = pipeline.ingest_batch("user@example.com", files, &events).await?;
//! let context = pipeline.retrieve("user@example.com", "what did I write?", &events).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `openai` — [`OpenAiEmbedding`] over the OpenAI embeddings API.
//! - `cohere` — [`CohereReranker`] over the Cohere rerank API.
//! - `unstructured` — [`UnstructuredParser`] over the Unstructured partition API.
//! - `remote` — all of the above.

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod events;
pub mod inmemory;
pub mod parser;
pub mod pipeline;
pub mod reranker;
pub mod retrieval;
pub mod storage;
pub mod users;
pub mod vectorstore;

#[cfg(feature = "cohere")]
pub mod cohere;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "unstructured")]
pub mod unstructured;

pub use chunking::{
    chunker_for, Chunker, DynamicChunker, EntityAwareChunker, ParagraphChunker, SentenceChunker,
};
pub use config::{ChunkingStrategy, PipelineConfig, PipelineConfigBuilder};
pub use document::{
    to_ascii, Chunk, ChunkMetadata, Document, EmbeddingRecord, MetadataValue, Page, Purpose,
    VectorMatch,
};
pub use embedding::{flatten_metadata, DocumentEmbedder, EmbeddingProvider};
pub use error::{PipelineError, Result};
pub use events::{measured, EventKind, ProgressEvent, ProgressSender};
pub use inmemory::InMemoryVectorStore;
pub use parser::{DocumentParser, LocalParser, ParserRegistry};
pub use pipeline::{
    BatchSummary, FileOutcome, IngestStage, IngestionPipeline, IngestionPipelineBuilder,
    UploadFile,
};
pub use reranker::{NoOpReranker, RankedMatch, Reranker};
pub use retrieval::{RankedContext, Retriever, ScoredChunk, NO_CONTEXT_MESSAGE};
pub use storage::{FileHandle, LocalStorage, StorageProvider};
pub use users::{InMemoryUserStore, UserRecord, UserStore};
pub use vectorstore::{ChunkIdPage, IndexManager, VectorStore};

#[cfg(feature = "cohere")]
pub use cohere::CohereReranker;
#[cfg(feature = "openai")]
pub use openai::OpenAiEmbedding;
#[cfg(feature = "unstructured")]
pub use unstructured::UnstructuredParser;
