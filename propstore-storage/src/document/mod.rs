//! Document-store adapter.
//!
//! A [`Collection`] stores schemaless [`Document`]s keyed by [`RecordKey`].
//! [`DocumentStore`] turns any collection into a [`StoragePort`] for every
//! [`PropagatedItem`] type by converting records to and from JSON documents.
//!
//! Two drivers ship with the crate:
//! - [`MemoryCollection`]: process-local, for tests and ephemeral tiers
//! - [`LmdbCollection`]: durable, memory-mapped LMDB via `heed`

mod lmdb;
mod memory;

pub use lmdb::{open_lmdb_store, LmdbCollection, LmdbStoreError};
pub use memory::MemoryCollection;

use std::sync::Arc;

use async_trait::async_trait;
use propstore_core::{Kind, PortResult, PropagatedItem, Record, Timestamp, Version};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::key::RecordKey;
use crate::ports::StoragePort;

// ============================================================================
// DOCUMENT
// ============================================================================

/// Persisted form of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub kind: Kind,
    pub version: Version,
    pub item: Option<serde_json::Value>,
    pub created_at: Option<Timestamp>,
    pub modified_at: Option<Timestamp>,
}

impl Document {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.kind.clone(), self.id.clone())
    }

    /// Encode a record, serializing its item to a JSON value.
    pub fn from_record<I: Serialize>(record: &Record<I>) -> Result<Self, DocumentError> {
        let item = record
            .item
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DocumentError::Encode {
                id: record.id().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            id: record.id().to_string(),
            kind: record.kind().clone(),
            version: record.version,
            item,
            created_at: record.created_at,
            modified_at: record.modified_at,
        })
    }

    /// Decode into a record of `I`.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Decode` if the stored item does not
    /// deserialize as `I`. An absent item is not an error.
    pub fn into_record<I: DeserializeOwned>(self) -> Result<Record<I>, DocumentError> {
        let item = match self.item {
            Some(value) => {
                Some(
                    serde_json::from_value(value).map_err(|e| DocumentError::Decode {
                        id: self.id.clone(),
                        reason: e.to_string(),
                    })?,
                )
            }
            None => None,
        };

        let mut record = Record::empty(self.id, self.kind);
        record.version = self.version;
        record.item = item;
        record.created_at = self.created_at;
        record.modified_at = self.modified_at;
        Ok(record)
    }

    /// Stamp timestamps for an upsert at `now`.
    ///
    /// `created_at` survives from the document being replaced, if any.
    pub(crate) fn stamped(mut self, replaced: Option<&Document>, now: Timestamp) -> Self {
        self.created_at = replaced.and_then(|d| d.created_at).or(Some(now));
        self.modified_at = Some(now);
        self
    }
}

/// Errors from the document adapter and its collections.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Failed to encode item '{id}': {reason}")]
    Encode { id: String, reason: String },

    #[error("Failed to decode stored item '{id}': {reason}")]
    Decode { id: String, reason: String },

    #[error(transparent)]
    Lmdb(#[from] LmdbStoreError),
}

// ============================================================================
// COLLECTION
// ============================================================================

/// Keyed document storage.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Look up the document stored under `key`.
    async fn get(&self, key: &RecordKey) -> Result<Option<Document>, DocumentError>;

    /// Upsert `document`, returning it as stored.
    ///
    /// # Implementation Requirements
    ///
    /// - Keep `created_at` of the document being replaced
    /// - Set `modified_at` to the time of the write
    async fn put(&self, document: Document) -> Result<Document, DocumentError>;

    /// Remove the document under `key`. Returns whether one existed.
    async fn delete(&self, key: &RecordKey) -> Result<bool, DocumentError>;

    /// Number of documents stored for `kind`.
    async fn count_kind(&self, kind: &Kind) -> Result<u64, DocumentError>;
}

/// Usage statistics of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
}

impl CollectionStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ============================================================================
// DOCUMENT STORE
// ============================================================================

/// [`StoragePort`] over a [`Collection`].
pub struct DocumentStore<C: Collection> {
    collection: Arc<C>,
}

impl<C: Collection> DocumentStore<C> {
    pub fn new(collection: C) -> Self {
        Self {
            collection: Arc::new(collection),
        }
    }

    /// Share a collection with other stores or owners.
    pub fn from_arc(collection: Arc<C>) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }
}

impl<C: Collection> Clone for DocumentStore<C> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
        }
    }
}

#[async_trait]
impl<I, C> StoragePort<I> for DocumentStore<C>
where
    I: PropagatedItem,
    C: Collection + 'static,
{
    async fn get(&self, key: &RecordKey) -> PortResult<Record<I>> {
        match self.collection.get(key).await? {
            Some(document) => Ok(document.into_record()?),
            None => Ok(Record::empty(key.item_id(), key.kind().clone())),
        }
    }

    async fn save(&self, record: &mut Record<I>) -> PortResult<()> {
        let document = Document::from_record(record)?;
        let stored = self.collection.put(document).await?;

        record.created_at = stored.created_at;
        record.modified_at = stored.modified_at;
        Ok(())
    }
}
