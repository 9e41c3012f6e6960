//! In-memory collection.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use propstore_core::Kind;
use tokio::sync::RwLock;

use super::{Collection, Document, DocumentError};
use crate::key::RecordKey;

/// Process-local document collection.
///
/// Nothing survives the process. Suitable for tests and for tiers that only
/// need to absorb repeated reads.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    documents: RwLock<HashMap<RecordKey, Document>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored documents across all kinds.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Remove every stored document.
    pub async fn clear(&self) {
        self.documents.write().await.clear();
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn get(&self, key: &RecordKey) -> Result<Option<Document>, DocumentError> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn put(&self, document: Document) -> Result<Document, DocumentError> {
        let key = document.key();
        let mut documents = self.documents.write().await;

        let stored = document.stamped(documents.get(&key), Utc::now());
        documents.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool, DocumentError> {
        Ok(self.documents.write().await.remove(key).is_some())
    }

    async fn count_kind(&self, kind: &Kind) -> Result<u64, DocumentError> {
        let documents = self.documents.read().await;
        Ok(documents.keys().filter(|key| key.kind() == kind).count() as u64)
    }
}
