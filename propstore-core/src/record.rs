//! The versioned envelope persisted in storage.

use serde::{Deserialize, Serialize};

use crate::identity::{Kind, Timestamp, Version, NO_VERSION};
use crate::item::PropagatedItem;

/// Versioned envelope around a propagated item.
///
/// Records are built per call from the caller's item and discarded when the
/// call returns. `item == None` is the "nothing stored locally" answer from
/// storage, distinct from a storage error. Timestamps are maintained by the
/// storage driver, never by the reconciliation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<I> {
    id: String,
    kind: Kind,
    pub version: Version,
    pub item: Option<I>,
    pub created_at: Option<Timestamp>,
    pub modified_at: Option<Timestamp>,
}

impl<I> Record<I> {
    /// An empty record for `(kind, id)`: no payload, version 0.
    pub fn empty(id: impl Into<String>, kind: Kind) -> Self {
        Self {
            id: id.into(),
            kind,
            version: NO_VERSION,
            item: None,
            created_at: None,
            modified_at: None,
        }
    }

    /// Identity of the record. Fixed at construction.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn has_item(&self) -> bool {
        self.item.is_some()
    }

    /// Take the payload out, leaving the record empty-handed.
    pub fn take_item(&mut self) -> Option<I> {
        self.item.take()
    }
}

impl<I: PropagatedItem> Record<I> {
    /// Wrap an item, taking identity and version from what the item reports.
    pub fn from_item(kind: Kind, item: I) -> Self {
        Self {
            id: item.item_id().to_string(),
            kind,
            version: item.current_version(),
            item: Some(item),
            created_at: None,
            modified_at: None,
        }
    }
}
