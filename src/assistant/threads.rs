use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::http::{ApiClient, string_field};
use super::{Assistant, PollPolicy, RunStatus, Session};
use crate::retry::RetryPolicy;
use crate::{ContextMessage, RelayError};

/// Hosted assistant reached through its threads API.
///
/// A session is a remote thread. Running it creates a run for the configured
/// assistant, polls the run under a [`PollPolicy`] and reads back the newest
/// assistant message.
#[derive(Clone)]
pub struct ThreadsAssistant {
    api: ApiClient,
    assistant_id: String,
}

impl ThreadsAssistant {
    pub fn new(client: Client, base_url: &str, api_key: &str, assistant_id: &str) -> Self {
        Self {
            api: ApiClient::new(client, base_url, api_key).header("OpenAI-Beta", "assistants=v2"),
            assistant_id: assistant_id.to_string(),
        }
    }

    /// Retry policy for requests that fail to connect.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.api = self.api.retry(retry);
        self
    }

    async fn run_status(&self, thread: &str, run: &str) -> Result<RunStatus, RelayError> {
        let value = self
            .api
            .get_json(&format!("/threads/{thread}/runs/{run}"))
            .await?;
        let status = string_field(&value, "status")?;
        let detail = value
            .pointer("/last_error/message")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(RunStatus::parse(&status, detail))
    }

    async fn latest_answer(&self, thread: &str) -> Result<String, RelayError> {
        let value = self
            .api
            .get_json(&format!("/threads/{thread}/messages?order=desc&limit=20"))
            .await?;
        extract_answer(&value)
            .ok_or_else(|| RelayError::assistant("run completed without an assistant message"))
    }
}

/// Concatenate the text parts of the newest assistant message in a
/// newest-first message listing.
fn extract_answer(listing: &Value) -> Option<String> {
    let message = listing
        .get("data")?
        .as_array()?
        .iter()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("assistant"))?;
    let parts: Vec<&str> = message
        .get("content")?
        .as_array()?
        .iter()
        .filter_map(|part| part.pointer("/text/value").and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Cancels a remote run when dropped while still armed.
///
/// Dropping happens when the wait times out or the request is abandoned.
struct RunGuard {
    cancel: Option<reqwest::RequestBuilder>,
}

impl RunGuard {
    fn disarm(&mut self) {
        self.cancel = None;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let Some(req) = self.cancel.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                match req.send().await {
                    Ok(resp) => debug!(target: "assistant", status = %resp.status(), "run cancel sent"),
                    Err(e) => warn!(target: "assistant", error = %e, "run cancel failed"),
                }
            });
        }
    }
}

#[async_trait]
impl Assistant for ThreadsAssistant {
    async fn create_session(&self) -> Result<Session, RelayError> {
        let value = self.api.post_json("/threads", &json!({})).await?;
        let id = string_field(&value, "id")?;
        debug!(target: "assistant", thread = %id, "thread created");
        Ok(Session::new(id))
    }

    async fn post_message(
        &self,
        session: &Session,
        message: &ContextMessage,
    ) -> Result<(), RelayError> {
        let body = json!({"role": message.role.as_str(), "content": message.content});
        self.api
            .post_json(&format!("/threads/{}/messages", session.id), &body)
            .await?;
        Ok(())
    }

    async fn run_and_await_completion(
        &self,
        session: &Session,
        poll: &PollPolicy,
    ) -> Result<String, RelayError> {
        let thread = session.id.as_str();
        let body = json!({"assistant_id": self.assistant_id});
        let run = self
            .api
            .post_json(&format!("/threads/{thread}/runs"), &body)
            .await?;
        let run_id = string_field(&run, "id")?;
        info!(target: "assistant", thread, run = %run_id, "run started");

        let mut guard = RunGuard {
            cancel: Some(self.api.request(
                reqwest::Method::POST,
                &format!("/threads/{thread}/runs/{run_id}/cancel"),
            )),
        };
        let outcome = poll.wait_for(|| self.run_status(thread, &run_id)).await;
        match &outcome {
            Ok(()) => guard.disarm(),
            Err(RelayError::AssistantTimeout(_)) => {}
            Err(_) => guard.disarm(),
        }
        drop(guard);
        outcome?;
        self.latest_answer(thread).await
    }
}
