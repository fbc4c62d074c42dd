//! Per-user document registry.
//!
//! The metadata store tracks which documents each owner has ingested, so
//! purges can find a document's name and id (the basis of its chunk-id
//! prefix). Backed by an external database in production; the in-memory
//! implementation serves development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::document::Document;
use crate::error::{PipelineError, Result};

/// A user record: preferences plus the list of ingested documents.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserRecord {
    /// Owner identity.
    pub owner: String,
    /// Free-form user preferences.
    pub preferences: HashMap<String, String>,
    /// Documents this owner has ingested, newest last.
    pub documents: Vec<Document>,
}

/// The per-user document/metadata store.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a user record, if the owner is known.
    async fn get_user(&self, owner: &str) -> Result<Option<UserRecord>>;

    /// Merge preference fields into the owner's record, creating it if needed.
    async fn update_user(&self, owner: &str, patch: HashMap<String, String>) -> Result<()>;

    /// Append a document to the owner's list, creating the record if needed.
    async fn add_document(&self, owner: &str, document: Document) -> Result<()>;

    /// Remove a document from the owner's list, returning it if present.
    async fn remove_document(&self, owner: &str, document_id: &str)
        -> Result<Option<Document>>;
}

/// An in-memory [`UserStore`].
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryUserStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_user(&self, owner: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.read().await.get(owner).cloned())
    }

    async fn update_user(&self, owner: &str, patch: HashMap<String, String>) -> Result<()> {
        let mut users = self.users.write().await;
        let record = users.entry(owner.to_string()).or_insert_with(|| UserRecord {
            owner: owner.to_string(),
            ..UserRecord::default()
        });
        record.preferences.extend(patch);
        Ok(())
    }

    async fn add_document(&self, owner: &str, document: Document) -> Result<()> {
        if document.owner != owner {
            return Err(PipelineError::UserStoreError(format!(
                "document '{}' is not owned by '{owner}'",
                document.id
            )));
        }
        let mut users = self.users.write().await;
        let record = users.entry(owner.to_string()).or_insert_with(|| UserRecord {
            owner: owner.to_string(),
            ..UserRecord::default()
        });
        record.documents.retain(|d| d.id != document.id);
        record.documents.push(document);
        Ok(())
    }

    async fn remove_document(
        &self,
        owner: &str,
        document_id: &str,
    ) -> Result<Option<Document>> {
        let mut users = self.users.write().await;
        let Some(record) = users.get_mut(owner) else {
            return Ok(None);
        };
        let position = record.documents.iter().position(|d| d.id == document_id);
        Ok(position.map(|i| record.documents.remove(i)))
    }
}
