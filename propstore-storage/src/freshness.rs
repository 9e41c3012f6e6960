//! Freshness gate for stored records.
//!
//! A stored record is trusted as-is only if it carries a payload and its
//! version meets the configured required version. Anything else sends the
//! read to the fallback source.

use propstore_core::{Record, SyncError, SyncErrorKind, Version, NO_VERSION};

/// Verdict of the freshness gate on a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Payload present and version acceptable.
    Fresh,
    /// Payload present but stored below the required version.
    Outdated { stored: Version, required: Version },
    /// Nothing stored for this identity.
    Missing,
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }

    /// The reason a record failed the gate, as a taxonomy error.
    ///
    /// Returns `None` for a fresh record.
    pub fn to_error(&self, item_id: &str) -> Option<SyncError> {
        match *self {
            Self::Fresh => None,
            Self::Outdated { stored, required } => Some(SyncError::new(
                SyncErrorKind::VersionOutdated,
                format!(
                    "version mismatch for item '{}' (required {}; current {})",
                    item_id, required, stored
                ),
            )),
            Self::Missing => Some(SyncError::new(
                SyncErrorKind::PayloadMissing,
                format!("no payload stored for item '{}'", item_id),
            )),
        }
    }
}

/// Run the freshness gate.
///
/// A missing payload fails regardless of `required_version`; a required
/// version of 0 accepts any stored version.
pub fn check_freshness<I>(record: &Record<I>, required_version: Version) -> Freshness {
    if !record.has_item() {
        return Freshness::Missing;
    }

    if required_version > NO_VERSION && record.version < required_version {
        return Freshness::Outdated {
            stored: record.version,
            required: required_version,
        };
    }

    Freshness::Fresh
}

/// Where a successful read got its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// The stored copy passed the freshness gate.
    Local,
    /// The stored copy was stale or missing and was resynced from the fallback.
    Resynced,
}

impl ReadSource {
    pub fn was_local(&self) -> bool {
        matches!(self, Self::Local)
    }

    pub fn was_resynced(&self) -> bool {
        matches!(self, Self::Resynced)
    }
}
