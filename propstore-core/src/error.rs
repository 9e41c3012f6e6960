//! Error types for propagated storage operations

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Error raised by a storage or fallback port.
///
/// Ports are external collaborators; their errors are opaque to the
/// reconciliation service and only ever travel as the `source` of a
/// [`SyncError`].
pub type PortError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type alias for port operations.
pub type PortResult<T> = Result<T, PortError>;

/// Membership tags of the sync error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncErrorKind {
    /// The storage port failed on get or save.
    StorageFailure,
    /// The stored version is below the configured required version.
    VersionOutdated,
    /// Storage holds no payload for the requested identity.
    PayloadMissing,
    /// The stored copy is not fresh and no fallback is configured.
    MissingFallback,
    /// The fallback port failed to produce the canonical item.
    FallbackFailure,
    /// Copying the resolved item back into the caller's item failed.
    PopulateFailure,
    /// The caller's item cannot be addressed (e.g. empty identity).
    InvalidItem,
}

impl SyncErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StorageFailure => "datastore failed",
            Self::VersionOutdated => "version outdated",
            Self::PayloadMissing => "payload missing",
            Self::MissingFallback => "missing fallback service",
            Self::FallbackFailure => "failed to fetch item from fallback service",
            Self::PopulateFailure => "failed to populate item",
            Self::InvalidItem => "invalid item",
        }
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged error returned by every reconciliation operation.
///
/// Carries its taxonomy kind, the context it was raised in (operation and
/// identity), and an optional wrapped cause. Use [`SyncError::is`] to test
/// membership anywhere in the cause chain instead of matching on messages.
#[derive(Debug, Error)]
#[error("{kind}: {context}")]
pub struct SyncError {
    kind: SyncErrorKind,
    context: String,
    #[source]
    source: Option<PortError>,
}

impl SyncError {
    pub fn new(kind: SyncErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            source: None,
        }
    }

    /// Wrap `source` as the cause of this error.
    pub fn with_source(mut self, source: impl Into<PortError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn storage(context: impl Into<String>, source: impl Into<PortError>) -> Self {
        Self::new(SyncErrorKind::StorageFailure, context).with_source(source)
    }

    pub fn fallback(context: impl Into<String>, source: impl Into<PortError>) -> Self {
        Self::new(SyncErrorKind::FallbackFailure, context).with_source(source)
    }

    pub fn populate(context: impl Into<String>, source: impl Into<PortError>) -> Self {
        Self::new(SyncErrorKind::PopulateFailure, context).with_source(source)
    }

    pub fn kind(&self) -> SyncErrorKind {
        self.kind
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// True if this error or any error in its cause chain has `kind`.
    pub fn is(&self, kind: SyncErrorKind) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(sync) = err.downcast_ref::<SyncError>() {
                if sync.kind == kind {
                    return true;
                }
            }
            current = err.source();
        }
        false
    }

    /// Render the whole cause chain on one line, outermost first.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut current = StdError::source(self);
        while let Some(err) = current {
            out.push_str(": ");
            out.push_str(&err.to_string());
            current = err.source();
        }
        out
    }
}

/// Result type alias for reconciliation operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to open store at {path}: {reason}")]
    Open { path: String, reason: String },
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("connection reset")]
    struct Reset;

    #[test]
    fn test_sync_error_display() {
        let err = SyncError::storage("could not get item with id 'u-1'", Reset);
        assert_eq!(
            err.to_string(),
            "datastore failed: could not get item with id 'u-1'"
        );
        assert_eq!(err.kind(), SyncErrorKind::StorageFailure);
        assert_eq!(err.context(), "could not get item with id 'u-1'");
    }

    #[test]
    fn test_is_walks_the_chain() {
        let outdated = SyncError::new(
            SyncErrorKind::VersionOutdated,
            "version mismatch (required 2; current 1)",
        );
        let err = SyncError::new(SyncErrorKind::MissingFallback, "could not get item 'u-1'")
            .with_source(outdated);

        assert!(err.is(SyncErrorKind::MissingFallback));
        assert!(err.is(SyncErrorKind::VersionOutdated));
        assert!(!err.is(SyncErrorKind::StorageFailure));
        assert!(!err.is(SyncErrorKind::PayloadMissing));
    }

    #[test]
    fn test_is_stops_at_foreign_errors() {
        let err = SyncError::fallback("could not get item 'u-1'", Reset);
        assert!(err.is(SyncErrorKind::FallbackFailure));
        assert!(!err.is(SyncErrorKind::StorageFailure));
    }

    #[test]
    fn test_report_includes_every_cause() {
        let err = SyncError::new(SyncErrorKind::MissingFallback, "could not get item 'u-1'")
            .with_source(SyncError::new(
                SyncErrorKind::PayloadMissing,
                "no payload stored",
            ));
        assert_eq!(
            err.report(),
            "missing fallback service: could not get item 'u-1': payload missing: no payload stored"
        );
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "required_version".to_string(),
            value: "abc".to_string(),
            reason: "must be a non-negative integer".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("required_version"));
        assert!(msg.contains("abc"));
        assert!(msg.contains("non-negative"));
    }
}
