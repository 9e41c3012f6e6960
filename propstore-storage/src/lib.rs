//! Propstore Storage - Reconciliation Service and Ports
//!
//! Keeps a local copy of propagated items in sync with the service that owns
//! them. Every read passes through a freshness gate; stale or missing copies
//! are refetched from the fallback source, persisted, and handed back as if
//! they had been local all along.
//!
//! The storage driver and the fallback source are external collaborators,
//! reached only through [`StoragePort`] and [`FallbackPort`]. The
//! [`document`] module ships a document-store adapter with in-memory and
//! LMDB collections.

pub mod document;
pub mod freshness;
pub mod key;
pub mod ports;
pub mod service;

pub use document::{
    open_lmdb_store, Collection, CollectionStats, Document, DocumentError, DocumentStore,
    LmdbCollection, LmdbStoreError, MemoryCollection,
};
pub use freshness::{check_freshness, Freshness, ReadSource};
pub use key::RecordKey;
pub use ports::{FallbackPort, StoragePort};
pub use service::ReconciliationService;
