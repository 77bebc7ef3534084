use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::http::ApiClient;
use super::{Assistant, PollPolicy, Session, Transcripts};
use crate::retry::RetryPolicy;
use crate::{ContextMessage, RelayError};

/// Stateless chat-completions model behind the session interface.
///
/// Posted messages are buffered locally; running the session sends them all
/// in one completion request bounded by the poll policy's maximum wait.
pub struct CompletionsAssistant {
    api: ApiClient,
    model: String,
    transcripts: Transcripts,
}

impl CompletionsAssistant {
    pub fn new(client: Client, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            api: ApiClient::new(client, base_url, api_key),
            model: model.to_string(),
            transcripts: Transcripts::default(),
        }
    }

    /// Retry policy for requests that fail to connect.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.api = self.api.retry(retry);
        self
    }
}

#[async_trait]
impl Assistant for CompletionsAssistant {
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
        poll: &PollPolicy,
    ) -> Result<String, RelayError> {
        let messages: Vec<Value> = self
            .transcripts
            .take(session)?
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();
        info!(target: "assistant", session = %session.id, messages = messages.len(), "requesting completion");
        let body = json!({"model": self.model, "messages": messages});
        let max_wait = poll.max_wait();
        let value = tokio::time::timeout(max_wait, self.api.post_json("/chat/completions", &body))
            .await
            .map_err(|_| RelayError::AssistantTimeout(max_wait))??;
        let answer = value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RelayError::assistant("completion has no message content"))?;
        debug!(target: "assistant", len = answer.len(), "completion received");
        Ok(answer)
    }
}
