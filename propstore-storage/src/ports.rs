//! Ports to the external collaborators of the reconciliation service.
//!
//! Both traits are async and object-safe so a service can hold them as
//! `Arc<dyn ...>`. Neither port is retried or timed out by the service;
//! implementations own their retry, backoff and deadline policy.

use async_trait::async_trait;
use propstore_core::{PortResult, PropagatedItem, Record};

use crate::key::RecordKey;

/// Local persistence of propagated records.
///
/// # Contract
///
/// - `get` looks up by `(kind, identity)`. Nothing stored is NOT an error:
///   return `Record::empty` (no item, version 0).
/// - `save` is an idempotent upsert keyed by `(kind, identity)`. It may
///   update the record in place (e.g. with storage-maintained timestamps).
/// - Implementations must never lower the stored version on their own.
#[async_trait]
pub trait StoragePort<I: PropagatedItem>: Send + Sync {
    /// Fetch the record stored under `key`.
    async fn get(&self, key: &RecordKey) -> PortResult<Record<I>>;

    /// Persist `record`, reflecting the persisted state back into it.
    async fn save(&self, record: &mut Record<I>) -> PortResult<()>;
}

/// The authoritative source that owns the propagated items.
///
/// Most often an HTTP client for the owning service, but any
/// [`ReconciliationService`](crate::ReconciliationService) is also a
/// fallback, so tiers can be stacked.
#[async_trait]
pub trait FallbackPort<I: PropagatedItem>: Send + Sync {
    /// Overwrite `item` with the canonical version held by the owner.
    async fn fetch(&self, item: &mut I) -> PortResult<()>;

    /// Push `item` upstream to the owner.
    async fn push(&self, item: &I) -> PortResult<()>;
}
