use async_trait::async_trait;
use tracing::trace;

use super::{Assistant, PollPolicy, Session, Transcripts};
use crate::{ContextMessage, RelayError};

/// Offline assistant answering `Echo: <last message>`. Useful for tests and
/// for running the relay without service credentials.
#[derive(Default)]
pub struct EchoAssistant {
    transcripts: Transcripts,
}

impl EchoAssistant {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Assistant for EchoAssistant {
    async fn create_session(&self) -> Result<Session, RelayError> {
        Ok(self.transcripts.open())
    }

    async fn post_message(
        &self,
        session: &Session,
        message: &ContextMessage,
    ) -> Result<(), RelayError> {
        self.transcripts.push(session, message)
    }

    async fn run_and_await_completion(
        &self,
        session: &Session,
        _poll: &PollPolicy,
    ) -> Result<String, RelayError> {
        let messages = self.transcripts.take(session)?;
        trace!(target: "assistant", session = %session.id, messages = messages.len(), "echoing");
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        Ok(format!("Echo: {last}"))
    }
}
