// store/mod.rs - record backends holding one serialized history per user

pub mod file_store;
pub mod memory_store;
pub mod object_store;

pub use file_store::FileRecords;
pub use memory_store::MemoryRecords;
pub use object_store::ObjectRecords;

use async_trait::async_trait;

use crate::RelayError;

/// Whole-object storage keyed by name (`"{user_id}.json"`).
///
/// An absent key is `Ok(None)`; only real backend failures are errors.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the full body stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RelayError>;

    /// Replace the full body stored under `key`.
    async fn put(&self, key: &str, body: &[u8]) -> Result<(), RelayError>;

    /// Every key currently stored.
    async fn list(&self) -> Result<Vec<String>, RelayError>;
}

#[async_trait]
impl<T> RecordStore for std::sync::Arc<T>
where
    T: RecordStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RelayError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, body: &[u8]) -> Result<(), RelayError> {
        (**self).put(key, body).await
    }

    async fn list(&self) -> Result<Vec<String>, RelayError> {
        (**self).list().await
    }
}
