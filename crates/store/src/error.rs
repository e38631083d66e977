//! Store error types.

use depot_storage::StorageError;
use thiserror::Error;

/// Errors raised by the bundle store and the migration engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] depot_core::Error),

    #[error("malformed document at {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("bundle not found: {0}")]
    BundleNotFound(String),

    #[error("bundle already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("migration {name} failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub(crate) fn serialization(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            key: key.into(),
            source,
        }
    }

    /// The failure underneath any migration wrapper.
    pub fn root(&self) -> &StoreError {
        match self {
            Self::Migration { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_errors_expose_root_cause() {
        let err = StoreError::Migration {
            name: "0001_channel_partitions".to_string(),
            source: Box::new(StoreError::BundleNotFound("abc".to_string())),
        };
        assert!(matches!(err.root(), StoreError::BundleNotFound(id) if id == "abc"));
        assert_eq!(
            err.to_string(),
            "migration 0001_channel_partitions failed: bundle not found: abc"
        );
    }

    #[test]
    fn storage_errors_convert() {
        let err: StoreError = StorageError::NotFound("a.json".to_string()).into();
        assert!(matches!(err, StoreError::Storage(ref e) if e.is_not_found()));
    }
}
