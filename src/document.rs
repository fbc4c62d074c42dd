//! Data types for documents, pages, chunks, and embedding records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which downstream consumer an uploaded document is intended for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Indexed into the owner's vector namespace for retrieval.
    #[default]
    Retrieval,
    /// Staged for an external assistant's file store.
    Assistant,
}

/// An uploaded source file, owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// Owner identity (user email or account id).
    pub owner: String,
    /// Display name of the uploaded file.
    pub name: String,
    /// MIME content type of the file.
    pub content_type: String,
    /// Which downstream consumer this document feeds.
    pub purpose: Purpose,
    /// When the file was uploaded.
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    /// Create a document record with a fresh id and the current timestamp.
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.into(),
            name: name.into(),
            content_type: content_type.into(),
            purpose: Purpose::Retrieval,
            uploaded_at: Utc::now(),
        }
    }

    /// The record-id prefix shared by every chunk of this document.
    ///
    /// All [`EmbeddingRecord`] ids are `"{ascii(name)}#{id}#{seq}"`, so this
    /// prefix is the basis for bulk deletion of the document's chunks.
    pub fn chunk_prefix(&self) -> String {
        format!("{}#{}", to_ascii(&self.name), self.id)
    }
}

/// A single page of extracted text, as produced by a parsing provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    /// 1-based page number within the source document.
    pub page_number: u32,
    /// The page's plain text.
    pub text: String,
}

/// Metadata attached to every chunk, inherited from the parent document
/// plus chunk-level fields filled in by the chunker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChunkMetadata {
    /// Source filename.
    pub file_name: String,
    /// Source MIME type.
    pub file_type: String,
    /// Page the chunk was extracted from, if the source is paginated.
    pub page_number: Option<u32>,
    /// Languages identified in the chunk text (ISO 639-3 codes).
    pub languages: Vec<String>,
    /// Id of the parent [`Document`].
    pub parent_id: String,
    /// Owner identity of the parent document.
    pub owner: String,
}

/// A bounded span of extracted text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Sequence-based identifier, `"{document_id}:{index}"`.
    pub id: String,
    /// The chunk's text content.
    pub text: String,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
}

/// A flat metadata value as accepted by vector store backends.
///
/// Vector-record metadata fields are flat scalars or string arrays only;
/// anything nested must be flattened to `"key:value"` strings before it
/// reaches the store (see [`crate::embedding::flatten_metadata`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A string scalar.
    Str(String),
    /// A numeric scalar.
    Num(f64),
    /// An array of strings.
    StrList(Vec<String>),
}

impl MetadataValue {
    /// The string value, if this is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// An embedded chunk as persisted in the vector store. Immutable once
/// created; superseded only by re-ingestion under a new id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// Record id, `"{ascii(file_name)}#{document_id}#{seq}"` with a 1-based
    /// sequence number. All chunks of one document share a discoverable
    /// prefix (see [`Document::chunk_prefix`]).
    pub id: String,
    /// The embedding vector.
    pub values: Vec<f32>,
    /// Flattened chunk metadata plus `text` and `owner`.
    pub metadata: HashMap<String, MetadataValue>,
}

/// A candidate returned by a namespace vector query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    /// The matched record's id.
    pub id: String,
    /// Similarity score (higher is more relevant).
    pub score: f32,
    /// The matched record's metadata. Vector values are never included.
    pub metadata: HashMap<String, MetadataValue>,
}

/// Strip every non-ASCII byte from a string.
///
/// Used to build filename-safe record-id prefixes. Deletion by prefix
/// (§[`Document::chunk_prefix`]) depends on ingestion and deletion applying
/// the same transform.
pub fn to_ascii(s: &str) -> String {
    s.chars().filter(char::is_ascii).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_ascii_strips_non_ascii() {
        assert_eq!(to_ascii("résumé.pdf"), "rsum.pdf");
        assert_eq!(to_ascii("plain.txt"), "plain.txt");
        assert_eq!(to_ascii("日本語"), "");
    }

    #[test]
    fn chunk_prefix_uses_ascii_name_and_id() {
        let mut doc = Document::new("a@b.c", "naïve.pdf", "application/pdf");
        doc.id = "doc-1".into();
        assert_eq!(doc.chunk_prefix(), "nave.pdf#doc-1");
    }
}
