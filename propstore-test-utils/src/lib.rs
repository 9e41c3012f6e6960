//! Propstore Test Utilities
//!
//! Shared test infrastructure for the propstore workspace:
//! - A propagated item fixture and a variant that refuses to be populated
//! - Recording and scripted doubles for the storage and fallback ports
//! - Ports that never answer, for cancellation tests
//! - Proptest generators
//! - Tracing setup for tests

pub use propstore_core::{
    Kind, PortError, PortResult, PropagatedItem, Record, SyncError, SyncErrorKind, SyncResult,
    Timestamp, Version, NO_VERSION,
};
pub use propstore_storage::{
    DocumentStore, FallbackPort, MemoryCollection, ReadSource, ReconciliationService, RecordKey,
    StoragePort,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber (once).
///
/// Output is captured by the test harness and filtered by `RUST_LOG`
/// (default `warn`).
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(filter)
            .try_init()
            .ok();
    });
}

/// Error injected by the port doubles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("injected failure: {0}")]
pub struct InjectedFailure(pub String);

impl InjectedFailure {
    pub fn port_error(message: &str) -> PortError {
        Box::new(Self(message.to_string()))
    }
}

// ============================================================================
// ITEM FIXTURES
// ============================================================================

/// General purpose propagated item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestItem {
    pub id: String,
    pub version: Version,
    pub name: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<Timestamp>,
}

impl TestItem {
    pub fn new(id: impl Into<String>, version: Version, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version,
            name: name.into(),
            ..Default::default()
        }
    }

    /// An item carrying only its identity, as a caller hands it to `get`.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// An identity-only item with a fresh UUIDv7 identity.
    pub fn random() -> Self {
        Self::with_id(Uuid::now_v7().to_string())
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// The same item without storage timestamps.
    pub fn without_timestamps(mut self) -> Self {
        self.created_at = None;
        self.modified_at = None;
        self
    }
}

impl PropagatedItem for TestItem {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn current_version(&self) -> Version {
        self.version
    }

    fn apply_timestamps(&mut self, created_at: Timestamp, modified_at: Timestamp) {
        self.created_at = Some(created_at);
        self.modified_at = Some(modified_at);
    }
}

/// Item that can be stored and fetched but never populated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SealedItem {
    pub id: String,
    pub version: Version,
}

impl SealedItem {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl PropagatedItem for SealedItem {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn current_version(&self) -> Version {
        self.version
    }

    fn populate_from(&mut self, _canonical: &[u8]) -> Result<(), PortError> {
        Err(InjectedFailure::port_error("sealed item cannot be populated"))
    }
}

/// A stored record of `item` under `kind`.
pub fn stored_record<I: PropagatedItem>(kind: &str, item: I) -> Record<I> {
    Record::from_item(Kind::new(kind), item)
}

// ============================================================================
// STORAGE DOUBLES
// ============================================================================

/// In-memory storage port that records every call.
///
/// Gets answer from seeded records (or `Record::empty`); saves are kept in
/// call order and become visible to later gets. Either operation can be
/// scripted to fail.
pub struct RecordingStorage<I: PropagatedItem> {
    records: RwLock<HashMap<RecordKey, Record<I>>>,
    saves: Mutex<Vec<Record<I>>>,
    get_failure: Mutex<Option<String>>,
    save_failure: Mutex<Option<String>>,
    get_calls: AtomicUsize,
}

impl<I: PropagatedItem> Default for RecordingStorage<I> {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            saves: Mutex::new(Vec::new()),
            get_failure: Mutex::new(None),
            save_failure: Mutex::new(None),
            get_calls: AtomicUsize::new(0),
        }
    }
}

impl<I: PropagatedItem> RecordingStorage<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage already holding `record`.
    pub fn seeded(record: Record<I>) -> Self {
        let storage = Self::new();
        storage.insert(record);
        storage
    }

    /// Store `record` without counting it as a save.
    pub fn insert(&self, record: Record<I>) {
        let key = RecordKey::new(record.kind().clone(), record.id());
        self.records.write().unwrap().insert(key, record);
    }

    /// Make every following get fail with `message`.
    pub fn fail_gets(self, message: &str) -> Self {
        *self.get_failure.lock().unwrap() = Some(message.to_string());
        self
    }

    /// Make every following save fail with `message`.
    pub fn fail_saves(self, message: &str) -> Self {
        *self.save_failure.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of save attempts, failed ones included.
    pub fn save_calls(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    /// Records passed to save, in call order.
    pub fn saved(&self) -> Vec<Record<I>> {
        self.saves.lock().unwrap().clone()
    }

    pub fn stored(&self, kind: &str, item_id: &str) -> Option<Record<I>> {
        let key = RecordKey::new(Kind::new(kind), item_id);
        self.records.read().unwrap().get(&key).cloned()
    }
}

#[async_trait]
impl<I: PropagatedItem> StoragePort<I> for RecordingStorage<I> {
    async fn get(&self, key: &RecordKey) -> PortResult<Record<I>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.get_failure.lock().unwrap().as_deref() {
            return Err(InjectedFailure::port_error(message));
        }

        Ok(self
            .records
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_else(|| Record::empty(key.item_id(), key.kind().clone())))
    }

    async fn save(&self, record: &mut Record<I>) -> PortResult<()> {
        self.saves.lock().unwrap().push(record.clone());

        if let Some(message) = self.save_failure.lock().unwrap().as_deref() {
            return Err(InjectedFailure::port_error(message));
        }

        self.insert(record.clone());
        Ok(())
    }
}

// ============================================================================
// FALLBACK DOUBLES
// ============================================================================

/// Fallback port answering with a scripted canonical item.
///
/// Without a canonical item, `fetch` leaves the slot unchanged.
pub struct ScriptedFallback<I: PropagatedItem> {
    canonical: Mutex<Option<I>>,
    fetch_failure: Mutex<Option<String>>,
    push_failure: Mutex<Option<String>>,
    fetched: Mutex<Vec<I>>,
    pushed: Mutex<Vec<I>>,
}

impl<I: PropagatedItem> Default for ScriptedFallback<I> {
    fn default() -> Self {
        Self {
            canonical: Mutex::new(None),
            fetch_failure: Mutex::new(None),
            push_failure: Mutex::new(None),
            fetched: Mutex::new(Vec::new()),
            pushed: Mutex::new(Vec::new()),
        }
    }
}

impl<I: PropagatedItem> ScriptedFallback<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fallback whose `fetch` overwrites the slot with `canonical`.
    pub fn answering(canonical: I) -> Self {
        let fallback = Self::new();
        *fallback.canonical.lock().unwrap() = Some(canonical);
        fallback
    }

    /// Fallback whose `fetch` fails with `message`.
    pub fn failing(message: &str) -> Self {
        let fallback = Self::new();
        *fallback.fetch_failure.lock().unwrap() = Some(message.to_string());
        fallback
    }

    /// Make every following push fail with `message`.
    pub fn fail_pushes(self, message: &str) -> Self {
        *self.push_failure.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }

    pub fn push_calls(&self) -> usize {
        self.pushed.lock().unwrap().len()
    }

    /// Slots handed to `fetch`, as received.
    pub fn fetched(&self) -> Vec<I> {
        self.fetched.lock().unwrap().clone()
    }

    /// Items handed to `push`.
    pub fn pushed(&self) -> Vec<I> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl<I: PropagatedItem> FallbackPort<I> for ScriptedFallback<I> {
    async fn fetch(&self, item: &mut I) -> PortResult<()> {
        self.fetched.lock().unwrap().push(item.clone());

        if let Some(message) = self.fetch_failure.lock().unwrap().as_deref() {
            return Err(InjectedFailure::port_error(message));
        }

        if let Some(canonical) = self.canonical.lock().unwrap().as_ref() {
            *item = canonical.clone();
        }
        Ok(())
    }

    async fn push(&self, item: &I) -> PortResult<()> {
        self.pushed.lock().unwrap().push(item.clone());

        if let Some(message) = self.push_failure.lock().unwrap().as_deref() {
            return Err(InjectedFailure::port_error(message));
        }
        Ok(())
    }
}

// ============================================================================
// PENDING PORTS
// ============================================================================

/// Storage port whose calls never complete.
#[derive(Debug, Default)]
pub struct PendingStorage {
    calls: AtomicUsize,
}

impl PendingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls that were started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<I: PropagatedItem> StoragePort<I> for PendingStorage {
    async fn get(&self, _key: &RecordKey) -> PortResult<Record<I>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn save(&self, _record: &mut Record<I>) -> PortResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Fallback port whose calls never complete.
#[derive(Debug, Default)]
pub struct PendingFallback {
    calls: AtomicUsize,
}

impl PendingFallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls that were started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<I: PropagatedItem> FallbackPort<I> for PendingFallback {
    async fn fetch(&self, _item: &mut I) -> PortResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn push(&self, _item: &I) -> PortResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for propstore types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a non-empty item identity.
    pub fn arb_item_id() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9-]{0,23}"
    }

    /// Generate a non-empty kind.
    pub fn arb_kind() -> impl Strategy<Value = Kind> {
        "[a-z][a-z_]{0,15}".prop_map(Kind::new)
    }

    pub fn arb_version() -> impl Strategy<Value = Version> {
        0u64..10_000
    }

    /// Generate a TestItem with arbitrary content.
    pub fn arb_test_item() -> impl Strategy<Value = TestItem> {
        (
            arb_item_id(),
            arb_version(),
            ".{0,32}",
            prop::collection::vec("[a-z]{1,8}", 0..4),
        )
            .prop_map(|(id, version, name, tags)| TestItem {
                id,
                version,
                name,
                tags,
                created_at: None,
                modified_at: None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_recording_storage_answers_empty_for_unknown() {
        let storage: RecordingStorage<TestItem> = RecordingStorage::new();
        let key = RecordKey::new(Kind::new("thing"), "t-1");

        let record = storage.get(&key).await.unwrap();
        assert!(!record.has_item());
        assert_eq!(record.id(), "t-1");
        assert_eq!(storage.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_recording_storage_failures_are_scripted() {
        let storage: RecordingStorage<TestItem> =
            RecordingStorage::new().fail_gets("down").fail_saves("full");
        let key = RecordKey::new(Kind::new("thing"), "t-1");

        let err = storage.get(&key).await.unwrap_err();
        assert_eq!(err.to_string(), "injected failure: down");

        let mut record = stored_record("thing", TestItem::new("t-1", 1, "a"));
        assert!(storage.save(&mut record).await.is_err());
        assert_eq!(storage.save_calls(), 1);
        assert!(storage.stored("thing", "t-1").is_none());
    }

    #[tokio::test]
    async fn test_scripted_fallback_overwrites_slot() {
        let fallback = ScriptedFallback::answering(TestItem::new("t-1", 4, "canonical"));
        let mut slot = TestItem::with_id("t-1");

        fallback.fetch(&mut slot).await.unwrap();
        assert_eq!(slot, TestItem::new("t-1", 4, "canonical"));
        assert_eq!(fallback.fetched(), vec![TestItem::with_id("t-1")]);
    }

    #[test]
    fn test_sealed_item_refuses_population() {
        let mut item = SealedItem::new("s-1", 1);
        assert!(item.populate_from(b"{}").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_items_have_identity(item in generators::arb_test_item()) {
            prop_assert!(!item.item_id().is_empty());
        }
    }
}
