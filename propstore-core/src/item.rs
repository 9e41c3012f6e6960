//! The capability set every propagated entity type implements.

use serde::{de::DeserializeOwned, Serialize};

use crate::identity::{Timestamp, Version};
use crate::PortError;

/// An entity owned by a remote service and replicated locally under a
/// version contract.
///
/// # Implementation Requirements
///
/// - `item_id()` must be stable for the lifetime of the entity and non-empty
///   for any item handed to the reconciliation service
/// - `current_version()` reports the version the item carries right now;
///   `0` means no authoritative version is known
/// - `populate_from()` receives the canonical JSON form of a resolved item
///   and must overwrite `self` with it
/// - Implementations must be `Clone`, `Serialize`, and `DeserializeOwned`
///   because storage persists them as JSON documents
pub trait PropagatedItem: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identity of this item, unique within its kind.
    fn item_id(&self) -> &str;

    /// Version currently carried by this item.
    fn current_version(&self) -> Version;

    /// Overwrite this item from its canonical byte representation.
    ///
    /// The default decodes the bytes as JSON and replaces `self`.
    fn populate_from(&mut self, canonical: &[u8]) -> Result<(), PortError> {
        *self = serde_json::from_slice(canonical)?;
        Ok(())
    }

    /// Receive the storage-maintained timestamps of the record this item was
    /// resolved from. Items that don't carry timestamps ignore them.
    fn apply_timestamps(&mut self, _created_at: Timestamp, _modified_at: Timestamp) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: String,
        version: Version,
        display_name: String,
    }

    impl PropagatedItem for Profile {
        fn item_id(&self) -> &str {
            &self.id
        }

        fn current_version(&self) -> Version {
            self.version
        }
    }

    #[test]
    fn test_default_populate_replaces_item() {
        let resolved = Profile {
            id: "p-1".to_string(),
            version: 4,
            display_name: "Ada".to_string(),
        };
        let canonical = serde_json::to_vec(&resolved).unwrap();

        let mut target = Profile {
            id: "p-1".to_string(),
            version: 0,
            display_name: String::new(),
        };
        target.populate_from(&canonical).unwrap();

        assert_eq!(target, resolved);
    }

    #[test]
    fn test_default_populate_rejects_garbage() {
        let mut target = Profile {
            id: "p-1".to_string(),
            version: 0,
            display_name: String::new(),
        };
        let err = target.populate_from(b"not json").unwrap_err();
        assert!(!err.to_string().is_empty());
        assert_eq!(target.version, 0);
    }
}
