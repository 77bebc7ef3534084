//! Dispatch of context messages to a hosted assistant.
//!
//! The relay only needs three capabilities: open a session, post messages to
//! it in order, and run it to completion. [`ThreadsAssistant`] drives a
//! hosted threads API, [`CompletionsAssistant`] a plain chat-completions API
//! and [`EchoAssistant`] answers locally.

pub mod completions;
pub mod echo;
mod http;
pub mod poll;
pub mod threads;

pub use completions::CompletionsAssistant;
pub use echo::EchoAssistant;
pub use poll::{PollPolicy, RunStatus};
pub use threads::ThreadsAssistant;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::{ContextMessage, RelayError};

/// Handle to an open conversation on the assistant side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: String,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Conversational backend the relay forwards questions to.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Open a fresh session.
    async fn create_session(&self) -> Result<Session, RelayError>;

    /// Append one message to the session.
    async fn post_message(
        &self,
        session: &Session,
        message: &ContextMessage,
    ) -> Result<(), RelayError>;

    /// Run the session and wait, within `poll`'s bounds, for the final answer.
    async fn run_and_await_completion(
        &self,
        session: &Session,
        poll: &PollPolicy,
    ) -> Result<String, RelayError>;
}

/// Sessions opened but never run are dropped after this long.
const TRANSCRIPT_TTL: Duration = Duration::from_secs(15 * 60);

struct Transcript {
    opened: Instant,
    messages: Vec<ContextMessage>,
}

/// Messages buffered per session for assistants without remote sessions.
///
/// A session leaves the map when it runs, or, if it never runs, once it is
/// older than the TTL and another session is opened.
pub(crate) struct Transcripts {
    sessions: Mutex<HashMap<String, Transcript>>,
    ttl: Duration,
}

impl Default for Transcripts {
    fn default() -> Self {
        Self::with_ttl(TRANSCRIPT_TTL)
    }
}

impl Transcripts {
    pub(crate) fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Transcript>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn open(&self) -> Session {
        let session = Session::new(format!("local-{}", uuid::Uuid::new_v4()));
        let now = Instant::now();
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, t| now.duration_since(t.opened) < self.ttl);
        if sessions.len() < before {
            debug!(target: "assistant", expired = before - sessions.len(), "dropped stale sessions");
        }
        sessions.insert(
            session.id.clone(),
            Transcript {
                opened: now,
                messages: Vec::new(),
            },
        );
        session
    }

    pub(crate) fn push(&self, session: &Session, message: &ContextMessage) -> Result<(), RelayError> {
        self.sessions()
            .get_mut(&session.id)
            .map(|t| t.messages.push(message.clone()))
            .ok_or_else(|| RelayError::assistant(format!("unknown session '{}'", session.id)))
    }

    /// Remove and return the session's messages; a session runs once.
    pub(crate) fn take(&self, session: &Session) -> Result<Vec<ContextMessage>, RelayError> {
        self.sessions()
            .remove(&session.id)
            .map(|t| t.messages)
            .ok_or_else(|| RelayError::assistant(format!("unknown session '{}'", session.id)))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn unrun_sessions_expire() {
        let transcripts = Transcripts::with_ttl(Duration::from_secs(60));
        let stale = transcripts.open();
        transcripts
            .push(&stale, &ContextMessage::user("Hello?"))
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        let fresh = transcripts.open();

        assert_eq!(transcripts.len(), 1);
        assert!(transcripts.take(&stale).is_err());
        assert!(transcripts.take(&fresh).unwrap().is_empty());
        assert_eq!(transcripts.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recent_sessions_survive_new_ones() {
        let transcripts = Transcripts::with_ttl(Duration::from_secs(60));
        let first = transcripts.open();
        tokio::time::advance(Duration::from_secs(30)).await;
        transcripts.open();
        assert_eq!(transcripts.len(), 2);
        assert!(transcripts.push(&first, &ContextMessage::user("q")).is_ok());
    }
}
