//! Error taxonomy shared by storage, dispatch and the HTTP surface.
//!
//! A missing history record is never an error: backends report it as `None`
//! and the history layer turns it into an empty [`History`](crate::History).

use std::time::Duration;
use thiserror::Error;

/// Failures a relay request can end with.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The request was rejected before any external call was attempted.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The record backend could not be reached or refused the operation.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A record exists but could not be decoded.
    #[error("history record for '{user_id}' is unreadable: {message}")]
    CorruptRecord { user_id: String, message: String },

    /// The assistant service failed or ended the run without an answer.
    #[error("assistant unavailable: {0}")]
    AssistantUnavailable(String),

    /// The assistant did not complete within the allowed wait.
    #[error("assistant did not complete within {0:?}")]
    AssistantTimeout(Duration),

    /// The request was abandoned before the assistant answered.
    #[error("request cancelled")]
    Cancelled,
}

impl RelayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageUnavailable(message.into())
    }

    pub fn assistant(message: impl Into<String>) -> Self {
        Self::AssistantUnavailable(message.into())
    }

    /// Stable snake_case tag used in error payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::CorruptRecord { .. } => "corrupt_record",
            Self::AssistantUnavailable(_) => "assistant_unavailable",
            Self::AssistantTimeout(_) => "assistant_timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether repeating the same operation could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct_for_storage_and_assistant() {
        let storage = RelayError::storage("connection refused");
        let assistant = RelayError::assistant("503");
        assert_eq!(storage.kind(), "storage_unavailable");
        assert_eq!(assistant.kind(), "assistant_unavailable");
        assert!(storage.is_transient());
        assert!(!assistant.is_transient());
    }

    #[test]
    fn timeout_message_names_the_wait() {
        let err = RelayError::AssistantTimeout(Duration::from_secs(3));
        assert_eq!(err.to_string(), "assistant did not complete within 3s");
    }
}
