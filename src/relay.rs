use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assistant::{Assistant, PollPolicy};
use crate::context::{DEFAULT_CONTEXT_WINDOW, build_context};
use crate::history::{HistoryStore, validate_user_id};
use crate::{History, RelayError};

/// Successful answer to a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub answer: String,
    pub thread_id: String,
}

/// Forwards questions to an [`Assistant`] with the user's recent turns as
/// context and records each completed turn.
pub struct Relay {
    history: Arc<HistoryStore>,
    assistant: Arc<dyn Assistant>,
    window: usize,
    poll: PollPolicy,
}

impl Relay {
    pub fn new(history: Arc<HistoryStore>, assistant: Arc<dyn Assistant>) -> Self {
        Self {
            history,
            assistant,
            window: DEFAULT_CONTEXT_WINDOW,
            poll: PollPolicy::default(),
        }
    }

    /// Number of prior turns threaded into each request.
    pub fn window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn history_store(&self) -> &HistoryStore {
        &self.history
    }

    /// Answer `question` for `user_id` and record the turn.
    ///
    /// Nothing is written unless the assistant produced an answer. Cancelling
    /// `cancel` abandons the pending dispatch and yields
    /// [`RelayError::Cancelled`].
    pub async fn chat(
        &self,
        user_id: &str,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, RelayError> {
        validate_user_id(user_id)?;
        if question.trim().is_empty() {
            return Err(RelayError::validation("question must not be empty"));
        }
        let history = self.history.load(user_id).await?;
        let messages = build_context(&history, question, self.window);
        debug!(user_id, prior = messages.len() - 1, "context assembled");

        let dispatch = async {
            let session = self.assistant.create_session().await?;
            for message in &messages {
                self.assistant.post_message(&session, message).await?;
            }
            let answer = self
                .assistant
                .run_and_await_completion(&session, &self.poll)
                .await?;
            Ok::<_, RelayError>((session, answer))
        };
        let (session, answer) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(user_id, "chat cancelled before the assistant answered");
                return Err(RelayError::Cancelled);
            }
            res = dispatch => res?,
        };

        let key = self.history.append(user_id, question, &answer).await?;
        info!(user_id, %key, thread = %session.id, "chat turn recorded");
        Ok(ChatReply {
            answer,
            thread_id: session.id,
        })
    }

    /// Stored history for `user_id`.
    pub async fn history(&self, user_id: &str) -> Result<History, RelayError> {
        self.history.load(user_id).await
    }

    /// Users that have at least one recorded turn.
    pub async fn active_users(&self) -> Result<Vec<String>, RelayError> {
        self.history.users().await
    }

    /// Acknowledge a client switching identities. Nothing is migrated.
    pub fn change_user(&self, current: &str, new: &str) -> Result<String, RelayError> {
        validate_user_id(current)?;
        validate_user_id(new)?;
        info!(from = current, to = new, "user switched");
        Ok(format!("Switched from {current} to {new}"))
    }
}
