use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{KeyValueStore, StorageError};

/// Directory-backed storage space: one `<key>.json` file per key.
///
/// Writes go to a temp file in the same directory which is then renamed over
/// the target, so a crash mid-write never leaves a truncated record behind.
pub struct FileStore {
    dir: PathBuf,
    quota_bytes: Option<usize>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota_bytes: None,
        }
    }

    /// Limits the total size of all records in the directory.
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn io_error(key: &str, source: std::io::Error) -> StorageError {
        StorageError::Io {
            key: key.to_string(),
            source,
        }
    }

    /// Bytes used by every record except `key`.
    fn used_bytes_excluding(&self, key: &str) -> Result<usize, StorageError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(Self::io_error(key, err)),
        };

        let skip = self.path_for(key);
        let mut total = 0usize;
        for entry in entries {
            let entry = entry.map_err(|err| Self::io_error(key, err))?;
            let path = entry.path();
            if path == skip || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let len = entry.metadata().map_err(|err| Self::io_error(key, err))?.len();
            total = total.saturating_add(len as usize);
        }
        Ok(total)
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Self::io_error(key, err)),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(limit) = self.quota_bytes {
            let requested = self.used_bytes_excluding(key)?.saturating_add(value.len());
            if requested > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    limit,
                });
            }
        }

        fs::create_dir_all(&self.dir).map_err(|err| Self::io_error(key, err))?;
        let mut temp_file =
            NamedTempFile::new_in(&self.dir).map_err(|err| Self::io_error(key, err))?;
        temp_file
            .write_all(value.as_bytes())
            .map_err(|err| Self::io_error(key, err))?;
        temp_file
            .as_file_mut()
            .sync_all()
            .map_err(|err| Self::io_error(key, err))?;
        temp_file
            .persist(self.path_for(key))
            .map_err(|err| Self::io_error(key, err.error))?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Self::io_error(key, err)),
        }
    }
}
