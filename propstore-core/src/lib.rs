//! Propstore Core - Propagated Storage Types
//!
//! Pure data structures with no I/O. The storage crate builds the
//! reconciliation protocol on top of these.
//! This crate contains ONLY data types and their invariants - no port calls.

pub mod config;
pub mod error;
pub mod identity;
pub mod item;
pub mod record;

pub use config::{
    LmdbStoreConfig, ServiceConfig, DEFAULT_COLLECTION, DEFAULT_MAP_SIZE_MB, DEFAULT_MAX_COLLECTIONS,
};
pub use error::{ConfigError, PortError, PortResult, SyncError, SyncErrorKind, SyncResult};
pub use identity::{Kind, Timestamp, Version, NO_VERSION};
pub use item::PropagatedItem;
pub use record::Record;
