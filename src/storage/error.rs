use std::error::Error as StdError;
use std::fmt;

/// Errors raised by a [`KeyValueStore`](super::KeyValueStore) backend or by
/// the JSON helpers layered on top of it.
#[derive(Debug)]
pub enum StorageError {
    /// The backend could not read, write, or remove the record.
    Io {
        /// Storage key involved in the failed operation.
        key: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The write would push the storage space past its byte quota.
    QuotaExceeded {
        key: String,
        requested: usize,
        limit: usize,
    },

    /// The stored value is not valid JSON for the expected shape.
    Corrupt {
        key: String,
        source: serde_json::Error,
    },

    /// The value could not be serialized before writing.
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io { key, source } => {
                write!(f, "Storage I/O error for '{key}': {source}")
            }
            StorageError::QuotaExceeded {
                key,
                requested,
                limit,
            } => write!(
                f,
                "Storage quota exceeded writing '{key}': {requested} bytes requested, limit is {limit}"
            ),
            StorageError::Corrupt { key, source } => {
                write!(f, "Stored value for '{key}' is corrupt: {source}")
            }
            StorageError::Encode { key, source } => {
                write!(f, "Failed to encode value for '{key}': {source}")
            }
        }
    }
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StorageError::Io { source, .. } => Some(source),
            StorageError::QuotaExceeded { .. } => None,
            StorageError::Corrupt { source, .. } => Some(source),
            StorageError::Encode { source, .. } => Some(source),
        }
    }
}
