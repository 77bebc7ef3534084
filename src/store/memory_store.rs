use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::RecordStore;
use crate::RelayError;

/// In-process record store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryRecords {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>, RelayError> {
        self.objects
            .lock()
            .map_err(|_| RelayError::storage("memory records lock poisoned"))
    }
}

#[async_trait]
impl RecordStore for MemoryRecords {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RelayError> {
        Ok(self.objects()?.get(key).cloned())
    }

    async fn put(&self, key: &str, body: &[u8]) -> Result<(), RelayError> {
        self.objects()?.insert(key.to_string(), body.to_vec());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, RelayError> {
        Ok(self.objects()?.keys().cloned().collect())
    }
}
