use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{KeyValueStore, MemoryStore, StorageError};

/// Storage double whose reads and writes can be switched to fail.
#[derive(Default)]
pub(crate) struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.fail_reads.store(true, Ordering::SeqCst);
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn denied(key: &str) -> StorageError {
        StorageError::Io {
            key: key.to_string(),
            source: std::io::Error::new(ErrorKind::PermissionDenied, "storage unavailable"),
        }
    }
}

impl KeyValueStore for FlakyStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::denied(key));
        }
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::denied(key));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::denied(key));
        }
        self.inner.remove_item(key)
    }
}
