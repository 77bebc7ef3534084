//! Per-user conversation history on top of a [`RecordStore`].
//!
//! Each user owns exactly one record, `"{user_id}.json"`, holding the whole
//! [`History`]. Appending is a full read-modify-write of that record. Within a
//! process, appends for the same user are serialized by a keyed async mutex so
//! no update is lost; separate processes sharing a backend still race and the
//! last writer wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::store::RecordStore;
use crate::title::{CollisionPolicy, TitleStyle};
use crate::{History, RelayError, Turn};

const RECORD_SUFFIX: &str = ".json";

/// Reject user ids that cannot safely name a record.
pub fn validate_user_id(user_id: &str) -> Result<(), RelayError> {
    if user_id.trim().is_empty() {
        return Err(RelayError::validation("user_id must not be empty"));
    }
    if user_id.contains(['/', '\\']) || user_id.contains("..") {
        return Err(RelayError::validation(format!(
            "user_id '{user_id}' must not contain path separators or '..'"
        )));
    }
    Ok(())
}

/// Object key of the record holding `user_id`'s history.
pub fn record_key(user_id: &str) -> String {
    format!("{user_id}{RECORD_SUFFIX}")
}

/// Async mutexes keyed by user id.
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Loads and extends user histories.
pub struct HistoryStore {
    records: Arc<dyn RecordStore>,
    titles: TitleStyle,
    collisions: CollisionPolicy,
    locks: UserLocks,
}

impl HistoryStore {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self {
            records,
            titles: TitleStyle::default(),
            collisions: CollisionPolicy::default(),
            locks: UserLocks::default(),
        }
    }

    /// Set how keys are derived from questions.
    pub fn titles(mut self, titles: TitleStyle) -> Self {
        self.titles = titles;
        self
    }

    /// Set what happens when a derived key is already taken.
    pub fn collisions(mut self, collisions: CollisionPolicy) -> Self {
        self.collisions = collisions;
        self
    }

    /// Key a question would be stored under, before collision handling.
    pub fn title(&self, question: &str) -> String {
        self.titles.derive(question)
    }

    /// Full history for `user_id`; empty when the user has no record yet.
    pub async fn load(&self, user_id: &str) -> Result<History, RelayError> {
        validate_user_id(user_id)?;
        let Some(bytes) = self.records.get(&record_key(user_id)).await? else {
            debug!(user_id, "no history record");
            return Ok(History::new());
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            warn!(user_id, error = %e, "history record unreadable");
            RelayError::CorruptRecord {
                user_id: user_id.to_string(),
                message: e.to_string(),
            }
        })
    }

    /// Record a completed turn and return the key it was stored under.
    pub async fn append(
        &self,
        user_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<String, RelayError> {
        validate_user_id(user_id)?;
        let _guard = self.locks.lock(user_id).await;
        let mut history = self.load(user_id).await?;
        let key = self.collisions.resolve(&history, self.title(question));
        if history.upsert(key.clone(), Turn::new(question, answer)).is_some() {
            info!(user_id, %key, "replacing earlier turn with the same title");
        }
        let body = serde_json::to_vec_pretty(&history)
            .map_err(|e| RelayError::storage(format!("encoding history: {e}")))?;
        self.records.put(&record_key(user_id), &body).await?;
        debug!(user_id, %key, turns = history.len(), "history saved");
        Ok(key)
    }

    /// Ids of every user with a stored record.
    pub async fn users(&self) -> Result<Vec<String>, RelayError> {
        let keys = self.records.list().await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_suffix(RECORD_SUFFIX).map(str::to_string))
            .collect())
    }
}
