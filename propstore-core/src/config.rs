//! Configuration types
//!
//! Configuration is loaded from environment variables with defaults for
//! development, then validated before anything is wired together.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::identity::{Kind, Version, NO_VERSION};

/// Collection name used when none is configured.
pub const DEFAULT_COLLECTION: &str = "propagatedstorage";

/// LMDB map size used when none is configured.
pub const DEFAULT_MAP_SIZE_MB: usize = 64;

/// Named databases an LMDB environment can hold when none is configured.
pub const DEFAULT_MAX_COLLECTIONS: u32 = 8;

/// Reconciliation service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Kind tag of the items this service reconciles.
    pub kind: Kind,
    /// Minimum stored version trusted without a resync. 0 = no requirement.
    #[serde(default)]
    pub required_version: Version,
}

impl ServiceConfig {
    pub fn new(kind: impl Into<Kind>) -> Self {
        Self {
            kind: kind.into(),
            required_version: NO_VERSION,
        }
    }

    /// Set the required version.
    pub fn with_required_version(mut self, version: Version) -> Self {
        self.required_version = version;
        self
    }

    /// Create a ServiceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PROPSTORE_KIND`: Kind tag of the propagated items (required)
    /// - `PROPSTORE_REQUIRED_VERSION`: Minimum trusted version (default: 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create a ServiceConfig from the variables `lookup` resolves.
    ///
    /// Same variables and defaults as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let kind = lookup("PROPSTORE_KIND").ok_or_else(|| ConfigError::MissingRequired {
            field: "PROPSTORE_KIND".to_string(),
        })?;

        let required_version = match lookup("PROPSTORE_REQUIRED_VERSION") {
            Some(raw) => parse_version(&raw)?,
            None => NO_VERSION,
        };

        let config = Self {
            kind: Kind::new(kind),
            required_version,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - kind is not empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "kind".to_string(),
                value: String::new(),
                reason: "kind must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_version(raw: &str) -> Result<Version, ConfigError> {
    raw.trim()
        .parse::<Version>()
        .map_err(|_| ConfigError::InvalidValue {
            field: "PROPSTORE_REQUIRED_VERSION".to_string(),
            value: raw.to_string(),
            reason: "must be a non-negative integer".to_string(),
        })
}

fn parse_positive<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: "must be a positive integer".to_string(),
        })
}

/// LMDB-backed document store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LmdbStoreConfig {
    /// Directory holding the LMDB environment.
    pub path: PathBuf,
    /// Named database inside the environment.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Maximum size of the environment in megabytes.
    #[serde(default = "default_map_size_mb")]
    pub map_size_mb: usize,
    /// Named databases the environment can hold. Every collection sharing
    /// the environment directory takes one.
    #[serde(default = "default_max_collections")]
    pub max_collections: u32,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_map_size_mb() -> usize {
    DEFAULT_MAP_SIZE_MB
}

fn default_max_collections() -> u32 {
    DEFAULT_MAX_COLLECTIONS
}

impl LmdbStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            collection: default_collection(),
            map_size_mb: DEFAULT_MAP_SIZE_MB,
            max_collections: DEFAULT_MAX_COLLECTIONS,
        }
    }

    /// Set the collection name. An empty name falls back to the default.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        let collection = collection.into();
        self.collection = if collection.is_empty() {
            default_collection()
        } else {
            collection
        };
        self
    }

    /// Set the map size.
    pub fn with_map_size_mb(mut self, map_size_mb: usize) -> Self {
        self.map_size_mb = map_size_mb;
        self
    }

    pub fn with_max_collections(mut self, max_collections: u32) -> Self {
        self.max_collections = max_collections;
        self
    }

    /// Create an LmdbStoreConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PROPSTORE_LMDB_PATH`: Environment directory (required)
    /// - `PROPSTORE_COLLECTION`: Named database (default: "propagatedstorage")
    /// - `PROPSTORE_LMDB_MAP_SIZE_MB`: Map size in MB (default: 64)
    /// - `PROPSTORE_LMDB_MAX_COLLECTIONS`: Named databases per environment (default: 8)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create an LmdbStoreConfig from the variables `lookup` resolves.
    ///
    /// Same variables and defaults as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("PROPSTORE_LMDB_PATH").unwrap_or_default();
        let collection = lookup("PROPSTORE_COLLECTION").unwrap_or_default();

        let map_size_mb = match lookup("PROPSTORE_LMDB_MAP_SIZE_MB") {
            Some(raw) => parse_positive("PROPSTORE_LMDB_MAP_SIZE_MB", &raw)?,
            None => DEFAULT_MAP_SIZE_MB,
        };

        let max_collections = match lookup("PROPSTORE_LMDB_MAX_COLLECTIONS") {
            Some(raw) => parse_positive("PROPSTORE_LMDB_MAX_COLLECTIONS", &raw)?,
            None => DEFAULT_MAX_COLLECTIONS,
        };

        let config = Self::new(path)
            .with_collection(collection)
            .with_map_size_mb(map_size_mb)
            .with_max_collections(max_collections);
        config.validate()?;
        Ok(config)
    }

    /// Map size in bytes, or `None` if it does not fit in `usize`.
    pub fn map_size_bytes(&self) -> Option<usize> {
        self.map_size_mb.checked_mul(1024 * 1024)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - path is set
    /// - collection is not empty
    /// - map_size_mb > 0 and its byte size fits in `usize`
    /// - max_collections > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "path".to_string(),
            });
        }

        if self.collection.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "collection".to_string(),
                value: String::new(),
                reason: "collection must not be empty".to_string(),
            });
        }

        if self.map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: self.map_size_mb.to_string(),
                reason: "map_size_mb must be greater than 0".to_string(),
            });
        }

        if self.map_size_bytes().is_none() {
            return Err(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: self.map_size_mb.to_string(),
                reason: "map size in bytes overflows usize".to_string(),
            });
        }

        if self.max_collections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_collections".to_string(),
                value: self.max_collections.to_string(),
                reason: "max_collections must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_builder() {
        let config = ServiceConfig::new("user").with_required_version(3);
        assert_eq!(config.kind.as_str(), "user");
        assert_eq!(config.required_version, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_service_config_rejects_empty_kind() {
        let err = ServiceConfig::new("").validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "kind"));
    }

    #[test]
    fn test_service_config_deserializes_without_version() {
        let config: ServiceConfig = serde_json::from_str(r#"{"kind":"user"}"#).unwrap();
        assert_eq!(config.required_version, NO_VERSION);
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version(" 12 ").unwrap(), 12);
        assert!(parse_version("-1").is_err());
        assert!(parse_version("one").is_err());
    }

    #[test]
    fn test_lmdb_config_defaults() {
        let config = LmdbStoreConfig::new("/var/lib/propstore");
        assert_eq!(config.collection, DEFAULT_COLLECTION);
        assert_eq!(config.map_size_mb, DEFAULT_MAP_SIZE_MB);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lmdb_config_empty_collection_uses_default() {
        let config = LmdbStoreConfig::new("/tmp/x").with_collection("");
        assert_eq!(config.collection, DEFAULT_COLLECTION);
    }

    #[test]
    fn test_lmdb_config_missing_path() {
        let err = LmdbStoreConfig::new("").validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "path".to_string()
            }
        );
    }

    #[test]
    fn test_lmdb_config_zero_map_size() {
        let err = LmdbStoreConfig::new("/tmp/x")
            .with_map_size_mb(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "map_size_mb"));
    }

    #[test]
    fn test_lmdb_config_overflowing_map_size() {
        let config = LmdbStoreConfig::new("/tmp/x").with_map_size_mb(usize::MAX);
        assert!(config.map_size_bytes().is_none());

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, ref reason, .. }
                if field == "map_size_mb" && reason.contains("overflows")
        ));
    }

    #[test]
    fn test_lmdb_config_zero_max_collections() {
        let err = LmdbStoreConfig::new("/tmp/x")
            .with_max_collections(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "max_collections"));
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_service_config_from_lookup() {
        let config = ServiceConfig::from_lookup(vars(&[
            ("PROPSTORE_KIND", "user"),
            ("PROPSTORE_REQUIRED_VERSION", "4"),
        ]))
        .unwrap();
        assert_eq!(config, ServiceConfig::new("user").with_required_version(4));
    }

    #[test]
    fn test_service_config_from_lookup_defaults_version() {
        let config = ServiceConfig::from_lookup(vars(&[("PROPSTORE_KIND", "user")])).unwrap();
        assert_eq!(config.required_version, NO_VERSION);
    }

    #[test]
    fn test_service_config_from_lookup_requires_kind() {
        let err = ServiceConfig::from_lookup(vars(&[("PROPSTORE_REQUIRED_VERSION", "1")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "PROPSTORE_KIND".to_string()
            }
        );
    }

    #[test]
    fn test_service_config_from_lookup_rejects_bad_version() {
        let err = ServiceConfig::from_lookup(vars(&[
            ("PROPSTORE_KIND", "user"),
            ("PROPSTORE_REQUIRED_VERSION", "latest"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, ref value, .. }
                if field == "PROPSTORE_REQUIRED_VERSION" && value == "latest"
        ));
    }

    #[test]
    fn test_service_config_from_lookup_rejects_empty_kind() {
        let err = ServiceConfig::from_lookup(vars(&[("PROPSTORE_KIND", "")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "kind"));
    }

    #[test]
    fn test_lmdb_config_from_lookup() {
        let config = LmdbStoreConfig::from_lookup(vars(&[
            ("PROPSTORE_LMDB_PATH", "/var/lib/propstore"),
            ("PROPSTORE_COLLECTION", "users"),
            ("PROPSTORE_LMDB_MAP_SIZE_MB", "128"),
            ("PROPSTORE_LMDB_MAX_COLLECTIONS", "2"),
        ]))
        .unwrap();
        assert_eq!(
            config,
            LmdbStoreConfig::new("/var/lib/propstore")
                .with_collection("users")
                .with_map_size_mb(128)
                .with_max_collections(2)
        );
    }

    #[test]
    fn test_lmdb_config_from_lookup_defaults() {
        let config =
            LmdbStoreConfig::from_lookup(vars(&[("PROPSTORE_LMDB_PATH", "/tmp/x")])).unwrap();
        assert_eq!(config.collection, DEFAULT_COLLECTION);
        assert_eq!(config.map_size_mb, DEFAULT_MAP_SIZE_MB);
        assert_eq!(config.max_collections, DEFAULT_MAX_COLLECTIONS);
    }

    #[test]
    fn test_lmdb_config_from_lookup_requires_path() {
        let err = LmdbStoreConfig::from_lookup(vars(&[])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "path".to_string()
            }
        );
    }

    #[test]
    fn test_lmdb_config_from_lookup_rejects_bad_numbers() {
        let err = LmdbStoreConfig::from_lookup(vars(&[
            ("PROPSTORE_LMDB_PATH", "/tmp/x"),
            ("PROPSTORE_LMDB_MAP_SIZE_MB", "big"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, .. } if field == "PROPSTORE_LMDB_MAP_SIZE_MB"
        ));

        let err = LmdbStoreConfig::from_lookup(vars(&[
            ("PROPSTORE_LMDB_PATH", "/tmp/x"),
            ("PROPSTORE_LMDB_MAX_COLLECTIONS", "-3"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, .. } if field == "PROPSTORE_LMDB_MAX_COLLECTIONS"
        ));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        std::env::set_var("PROPSTORE_KIND", "env_kind");
        std::env::remove_var("PROPSTORE_REQUIRED_VERSION");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.kind.as_str(), "env_kind");
        assert_eq!(config.required_version, NO_VERSION);

        std::env::remove_var("PROPSTORE_KIND");
    }

    mod prop_tests {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// Any non-negative integer is accepted as a required version.
            #[test]
            fn prop_parse_version_accepts_any_u64(version in any::<u64>()) {
                prop_assert_eq!(parse_version(&version.to_string()).unwrap(), version);
            }

            /// Non-numeric input never parses.
            #[test]
            fn prop_parse_version_rejects_letters(raw in "[a-z]{1,8}") {
                prop_assert!(parse_version(&raw).is_err());
            }
        }
    }
}
