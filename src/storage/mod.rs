//! Local key-value storage shared by every persistent store.
//!
//! The storage space is a flat map from string keys to JSON strings. Each
//! store owns one fixed key (see [`crate::core::constants`]), so stores never
//! collide; separate processes sharing the same backing directory race on
//! read-modify-write cycles and the last write wins.
//!
//! Two backends are provided:
//! - [`FileStore`] keeps one `<key>.json` file per key inside a directory and
//!   replaces files atomically.
//! - [`MemoryStore`] keeps everything in process memory.
//!
//! Both can enforce a byte quota; a write that would exceed it fails with
//! [`StorageError::QuotaExceeded`].

mod error;
mod file;
mod memory;
#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::StorageError;
pub use file::FileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A string-keyed storage space holding serialized records.
pub trait KeyValueStore: Send + Sync {
    /// Returns the raw value stored under `key`, or `None` when absent.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key succeeds.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Reads and deserializes the JSON record under `key`.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get_item(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Serializes `value` as JSON and stores it under `key`.
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.set_item(key, &raw)
}
