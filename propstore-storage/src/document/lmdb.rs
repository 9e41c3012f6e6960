//! LMDB-backed collection.
//!
//! Uses the heed crate (Rust bindings for LMDB). Every collection is a named
//! database inside an LMDB environment, so several collections can share one
//! environment directory, up to the environment's `max_collections`.
//!
//! # Layout
//!
//! - Key: [`RecordKey::encode`], so all documents of a kind are contiguous
//! - Value: the JSON-serialized [`Document`]
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Reads use read transactions; `put`,
//! `delete` and `invalidate_kind` use a single write transaction each.
//! Hit/miss statistics are atomic counters.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use propstore_core::{ConfigError, Kind, LmdbStoreConfig, DEFAULT_MAX_COLLECTIONS};

use super::{Collection, CollectionStats, Document, DocumentError, DocumentStore};
use crate::key::RecordKey;

/// Error type for LMDB collection operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the named database within the environment.
    #[error("Failed to open database '{name}': {reason}")]
    DbOpen { name: String, reason: String },

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error for key {key}: {reason}")]
    Deserialization { key: String, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn txn_error(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// Document collection stored in an LMDB named database.
///
/// # Example
///
/// ```ignore
/// let collection = LmdbCollection::open("/var/lib/propstore", "propagatedstorage", 64)?;
/// let store = DocumentStore::new(collection);
/// let service = ReconciliationService::new(Arc::new(store), "user");
/// ```
pub struct LmdbCollection {
    env: Env,
    db: Database<Bytes, Bytes>,
    name: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LmdbCollection {
    /// Open (or create) the collection `name` in the environment at `path`,
    /// with the default limit of named databases.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory holding the LMDB environment files
    /// * `name` - Name of the database inside the environment
    /// * `map_size_mb` - Maximum size of the environment in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - The map size in bytes does not fit in `usize`
    /// - The LMDB environment cannot be opened
    /// - The named database cannot be created
    pub fn open<P: AsRef<Path>>(
        path: P,
        name: &str,
        map_size_mb: usize,
    ) -> Result<Self, LmdbStoreError> {
        Self::open_with_limit(path, name, map_size_mb, DEFAULT_MAX_COLLECTIONS)
    }

    /// Like [`open`](Self::open), with the environment holding at most
    /// `max_collections` named databases.
    ///
    /// Collections sharing one directory share its environment, so every
    /// collection opened on that directory must pass the same `map_size_mb`
    /// and `max_collections`.
    pub fn open_with_limit<P: AsRef<Path>>(
        path: P,
        name: &str,
        map_size_mb: usize,
        max_collections: u32,
    ) -> Result<Self, LmdbStoreError> {
        let map_size = map_size_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            LmdbStoreError::EnvOpen(format!("map size of {} MB overflows usize", map_size_mb))
        })?;

        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened through heed only, which hands
        // back the already opened environment for a path it has seen.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_collections)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(name))
            .map_err(|e| LmdbStoreError::DbOpen {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(txn_error)?;

        tracing::debug!(path = %path.as_ref().display(), collection = name, "opened LMDB collection");

        Ok(Self {
            env,
            db,
            name: name.to_string(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current hit/miss counters and stored entry count.
    pub fn stats(&self) -> Result<CollectionStats, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let entry_count = self.db.len(&rtxn).map_err(txn_error)?;

        Ok(CollectionStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
        })
    }

    /// Delete every document of `kind`. Returns the number deleted.
    pub fn invalidate_kind(&self, kind: &Kind) -> Result<u64, LmdbStoreError> {
        let keys = self.keys_of_kind(kind)?;

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut deleted = 0u64;
        for key in &keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_error)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;

        tracing::debug!(collection = %self.name, kind = %kind, deleted, "invalidated kind");
        Ok(deleted)
    }

    fn keys_of_kind(&self, kind: &Kind) -> Result<Vec<Vec<u8>>, LmdbStoreError> {
        let prefix = RecordKey::kind_prefix(kind);
        let rtxn = self.env.read_txn().map_err(txn_error)?;

        let mut keys = Vec::new();
        for entry in self.db.prefix_iter(&rtxn, &prefix).map_err(txn_error)? {
            let (key, _) = entry.map_err(txn_error)?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    fn decode(key: &RecordKey, bytes: &[u8]) -> Result<Document, LmdbStoreError> {
        serde_json::from_slice(bytes).map_err(|e| LmdbStoreError::Deserialization {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Collection for LmdbCollection {
    async fn get(&self, key: &RecordKey) -> Result<Option<Document>, DocumentError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;

        match self.db.get(&rtxn, &key.encode()).map_err(txn_error)? {
            Some(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(Self::decode(key, bytes)?))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn put(&self, document: Document) -> Result<Document, DocumentError> {
        let key = document.key();
        let encoded_key = key.encode();

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        let replaced = match self.db.get(&wtxn, &encoded_key).map_err(txn_error)? {
            Some(bytes) => Some(Self::decode(&key, bytes)?),
            None => None,
        };

        let stored = document.stamped(replaced.as_ref(), Utc::now());
        let value = serde_json::to_vec(&stored)
            .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;

        self.db
            .put(&mut wtxn, &encoded_key, &value)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        Ok(stored)
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool, DocumentError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self
            .db
            .delete(&mut wtxn, &key.encode())
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    async fn count_kind(&self, kind: &Kind) -> Result<u64, DocumentError> {
        Ok(self.keys_of_kind(kind)?.len() as u64)
    }
}

/// Open the LMDB-backed document store described by `config`.
///
/// # Errors
///
/// Returns `ConfigError` if the configuration is invalid or the
/// environment cannot be opened.
pub fn open_lmdb_store(
    config: &LmdbStoreConfig,
) -> Result<DocumentStore<LmdbCollection>, ConfigError> {
    config.validate()?;

    let collection = LmdbCollection::open_with_limit(
        &config.path,
        &config.collection,
        config.map_size_mb,
        config.max_collections,
    )
    .map_err(|e| ConfigError::Open {
        path: config.path.display().to_string(),
        reason: e.to_string(),
    })?;

    Ok(DocumentStore::new(collection))
}
