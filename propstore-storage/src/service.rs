//! Reconciliation service: version-checked reads with resync from the owner.
//!
//! Reads go local first. A stored copy that fails the freshness gate is
//! refetched from the fallback source, persisted, and the caller's item is
//! populated from the resynced record. Writes persist whatever version the
//! item reports.
//!
//! # Get state machine
//!
//! ```text
//! Fetching ──> Fresh ─────────────────────────────> PopulatingCaller ──> Done
//!     │                                                   ^       └──> PopulateFailed
//!     └──> Stale ──> NoFallbackConfigured                 │
//!            └────> FallbackFetching ──> FallbackFailed   │
//!                        └──> Resyncing ──> SyncFailed    │
//!                                 └────────────────────────┘
//! ```
//!
//! The service holds only immutable configuration and is safe to share
//! across concurrent callers. It never retries and imposes no deadline;
//! dropping a pending call cancels whatever port call is in flight.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use propstore_core::{
    Kind, PortError, PortResult, PropagatedItem, Record, ServiceConfig, SyncError, SyncErrorKind,
    SyncResult, Version, NO_VERSION,
};
use tracing::Instrument;

use crate::freshness::{check_freshness, ReadSource};
use crate::key::RecordKey;
use crate::ports::{FallbackPort, StoragePort};

/// Read-through/write-through service for one kind of propagated item.
///
/// # Type Parameters
///
/// - `I`: The propagated item type
/// - `S`: The storage port holding local copies
///
/// # Example
///
/// ```ignore
/// let service = ReconciliationService::new(store, "user")
///     .with_required_version(2)
///     .with_fallback(Arc::new(user_service_client));
///
/// let mut user = User::with_id("u-42");
/// service.get(&mut user).await?;
/// ```
pub struct ReconciliationService<I, S>
where
    I: PropagatedItem,
    S: StoragePort<I>,
{
    storage: Arc<S>,
    fallback: Option<Arc<dyn FallbackPort<I>>>,
    kind: Kind,
    required_version: Version,
}

impl<I, S> ReconciliationService<I, S>
where
    I: PropagatedItem,
    S: StoragePort<I>,
{
    /// Create a service with no required version and no fallback.
    pub fn new(storage: Arc<S>, kind: impl Into<Kind>) -> Self {
        Self {
            storage,
            fallback: None,
            kind: kind.into(),
            required_version: NO_VERSION,
        }
    }

    /// Create a service from a validated configuration.
    pub fn from_config(storage: Arc<S>, config: &ServiceConfig) -> Self {
        Self::new(storage, config.kind.clone()).with_required_version(config.required_version)
    }

    /// Set the minimum stored version trusted without a resync.
    pub fn with_required_version(mut self, version: Version) -> Self {
        self.required_version = version;
        self
    }

    /// Set the authoritative source used to resync stale copies.
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackPort<I>>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn required_version(&self) -> Version {
        self.required_version
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Get a reference to the storage port.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Populate `item` with the current state of the item it identifies.
    ///
    /// `item` must report a non-empty identity. On success it has been
    /// overwritten with the validated stored copy, or with the resynced copy
    /// if the stored one was stale or missing.
    pub async fn get(&self, item: &mut I) -> SyncResult<()> {
        self.get_with_source(item).await.map(|_| ())
    }

    /// Like [`get`](Self::get), also reporting whether a resync happened.
    pub async fn get_with_source(&self, item: &mut I) -> SyncResult<ReadSource> {
        let span = tracing::debug_span!(
            "propstore.get",
            item_id = %item.item_id(),
            kind = %self.kind,
        );
        self.get_inner(item).instrument(span).await
    }

    /// Persist `item` locally with the version it reports.
    ///
    /// Never reads the stored version first and never bumps the version.
    pub async fn save(&self, item: &I) -> SyncResult<()> {
        let span = tracing::debug_span!(
            "propstore.save",
            item_id = %item.item_id(),
            kind = %self.kind,
            version = item.current_version(),
        );
        async {
            self.ensure_identity(item, "save")?;
            self.persist(item.clone()).await.map(|_| ())
        }
        .instrument(span)
        .await
    }

    /// Push `item` to the owning service, then persist it locally.
    ///
    /// Nothing is stored locally if the push fails.
    pub async fn save_through(&self, item: &I) -> SyncResult<()> {
        let span = tracing::debug_span!(
            "propstore.save_through",
            item_id = %item.item_id(),
            kind = %self.kind,
            version = item.current_version(),
        );
        async {
            let item_id = self.ensure_identity(item, "save")?;
            let context = format!("could not push item with id '{}'", item_id);

            let fallback = self
                .fallback
                .as_ref()
                .ok_or_else(|| SyncError::new(SyncErrorKind::MissingFallback, context.clone()))?;

            fallback.push(item).await.map_err(|e| {
                tracing::debug!(error = %e, "fallback push failed");
                SyncError::fallback(context, e)
            })?;

            self.persist(item.clone()).await.map(|_| ())
        }
        .instrument(span)
        .await
    }

    async fn get_inner(&self, item: &mut I) -> SyncResult<ReadSource> {
        let item_id = self.ensure_identity(item, "get")?;
        let key = RecordKey::new(self.kind.clone(), item_id.clone());

        let mut record = self.storage.get(&key).await.map_err(|e| {
            tracing::debug!(error = %e, "storage get failed");
            SyncError::storage(format!("could not get item with id '{}'", item_id), e)
        })?;

        let freshness = check_freshness(&record, self.required_version);
        let source = match freshness.to_error(&item_id) {
            None => ReadSource::Local,
            Some(reason) => {
                tracing::debug!(
                    stored_version = record.version,
                    required_version = self.required_version,
                    reason = %reason,
                    "stored item is not fresh"
                );
                record = self.resync(item, record, reason).await?;
                ReadSource::Resynced
            }
        };

        populate(item, &record)?;
        Ok(source)
    }

    /// Fetch the canonical item from the fallback and persist it.
    async fn resync(
        &self,
        item: &I,
        mut stale: Record<I>,
        reason: SyncError,
    ) -> SyncResult<Record<I>> {
        let item_id = stale.id().to_string();
        let context = format!("could not get item with id '{}'", item_id);

        let Some(fallback) = self.fallback.as_ref() else {
            return Err(
                SyncError::new(SyncErrorKind::MissingFallback, context).with_source(reason)
            );
        };

        // Nothing stored: the caller's item carries the identity the owner needs.
        let mut slot = stale.take_item().unwrap_or_else(|| item.clone());

        fallback.fetch(&mut slot).await.map_err(|e| {
            tracing::debug!(error = %e, "fallback fetch failed");
            SyncError::fallback(context.clone(), e)
        })?;

        if slot.item_id() != item_id {
            return Err(SyncError::new(
                SyncErrorKind::FallbackFailure,
                format!(
                    "fallback returned item '{}' for requested item '{}'",
                    slot.item_id(),
                    item_id
                ),
            ));
        }

        if self.required_version > NO_VERSION && slot.current_version() < self.required_version {
            tracing::warn!(
                resynced_version = slot.current_version(),
                required_version = self.required_version,
                "fallback returned a version below the required version"
            );
        }

        self.persist(slot).await
    }

    /// Save `item` under the configured kind with the version it reports.
    async fn persist(&self, item: I) -> SyncResult<Record<I>> {
        let mut record = Record::from_item(self.kind.clone(), item);
        let item_id = record.id().to_string();

        self.storage.save(&mut record).await.map_err(|e| {
            tracing::debug!(error = %e, "storage save failed");
            SyncError::storage(format!("could not save item with id '{}'", item_id), e)
        })?;

        Ok(record)
    }

    fn ensure_identity(&self, item: &I, operation: &str) -> SyncResult<String> {
        let item_id = item.item_id();
        if item_id.is_empty() {
            return Err(SyncError::new(
                SyncErrorKind::InvalidItem,
                format!("cannot {} {} item without an identity", operation, self.kind),
            ));
        }
        Ok(item_id.to_string())
    }
}

/// Copy the resolved record into the caller's item.
fn populate<I: PropagatedItem>(item: &mut I, record: &Record<I>) -> SyncResult<()> {
    let context = format!("could not populate item with id '{}'", record.id());

    let resolved = record.item.as_ref().ok_or_else(|| {
        SyncError::new(SyncErrorKind::PopulateFailure, context.clone()).with_source(
            SyncError::new(SyncErrorKind::PayloadMissing, "resolved record has no payload"),
        )
    })?;

    let canonical =
        serde_json::to_vec(resolved).map_err(|e| SyncError::populate(context.clone(), e))?;
    item.populate_from(&canonical)
        .map_err(|e| SyncError::populate(context, e))?;

    if let (Some(created_at), Some(modified_at)) = (record.created_at, record.modified_at) {
        item.apply_timestamps(created_at, modified_at);
    }

    Ok(())
}

impl<I, S> Clone for ReconciliationService<I, S>
where
    I: PropagatedItem,
    S: StoragePort<I>,
{
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            fallback: self.fallback.clone(),
            kind: self.kind.clone(),
            required_version: self.required_version,
        }
    }
}

impl<I, S> fmt::Debug for ReconciliationService<I, S>
where
    I: PropagatedItem,
    S: StoragePort<I>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationService")
            .field("kind", &self.kind)
            .field("required_version", &self.required_version)
            .field("has_fallback", &self.has_fallback())
            .finish()
    }
}

/// A service is itself an authoritative source for the tier below it.
#[async_trait]
impl<I, S> FallbackPort<I> for ReconciliationService<I, S>
where
    I: PropagatedItem,
    S: StoragePort<I> + 'static,
{
    async fn fetch(&self, item: &mut I) -> PortResult<()> {
        self.get(item).await.map_err(PortError::from)
    }

    async fn push(&self, item: &I) -> PortResult<()> {
        self.save(item).await.map_err(PortError::from)
    }
}
