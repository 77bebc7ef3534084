use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use uuid::Uuid;

use super::RecordStore;
use crate::RelayError;

/// Records kept as individual files inside a directory.
///
/// Writes land in a temporary sibling first and are renamed into place, so a
/// reader never observes a half-written record.
#[derive(Clone, Debug)]
pub struct FileRecords {
    dir: PathBuf,
}

impl FileRecords {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "creating FileRecords");
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> RelayError {
    RelayError::storage(format!("{action} {}: {err}", path.display()))
}

#[async_trait]
impl RecordStore for FileRecords {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RelayError> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                trace!(path = %path.display(), len = bytes.len(), "read record");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("reading", &path, e)),
        }
    }

    async fn put(&self, key: &str, body: &[u8]) -> Result<(), RelayError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error("creating", &self.dir, e))?;
        let path = self.path(key);
        let tmp = self.dir.join(format!(".{key}.{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| io_error("writing", &tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error("replacing", &path, e));
        }
        trace!(path = %path.display(), len = body.len(), "wrote record");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, RelayError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("listing", &self.dir, e)),
        };
        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("listing", &self.dir, e))?
        {
            // In-flight writes end in `.tmp` and never match.
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
