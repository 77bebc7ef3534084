use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, error, trace};

use crate::RelayError;
use crate::retry::RetryPolicy;

/// JSON-over-HTTP access to an assistant API with bearer authentication.
///
/// Only requests that never reached the service (connection failures) are
/// retried, so a message is never posted twice.
#[derive(Clone)]
pub(crate) struct ApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    headers: Vec<(&'static str, &'static str)>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub(crate) fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            headers: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub(crate) fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    pub(crate) fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build an authorized request; usable outside the retry loop.
    pub(crate) fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, self.url(path))
            .bearer_auth(&self.api_key);
        for (name, value) in &self.headers {
            req = req.header(*name, *value);
        }
        req
    }

    pub(crate) async fn post_json(&self, path: &str, body: &Value) -> Result<Value, RelayError> {
        trace!(target: "assistant", path, %body, "POST");
        self.send(path, || self.request(reqwest::Method::POST, path).json(body))
            .await
    }

    pub(crate) async fn get_json(&self, path: &str) -> Result<Value, RelayError> {
        trace!(target: "assistant", path, "GET");
        self.send(path, || self.request(reqwest::Method::GET, path))
            .await
    }

    async fn send<F>(&self, path: &str, build: F) -> Result<Value, RelayError>
    where
        F: Fn() -> RequestBuilder,
    {
        let resp = self
            .retry
            .retry_if(|| build().send(), |e: &reqwest::Error| e.is_connect())
            .await
            .map_err(|e| RelayError::assistant(format!("{path}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(target: "assistant", %status, %body, path, "assistant API error");
            return Err(RelayError::assistant(format!("{path} returned {status}")));
        }
        let value: Value = resp
            .json()
            .await
            .map_err(|e| RelayError::assistant(format!("{path}: malformed response: {e}")))?;
        debug!(target: "assistant", path, "assistant API ok");
        Ok(value)
    }
}

/// Read a required string field from an API response.
pub(crate) fn string_field(value: &Value, field: &str) -> Result<String, RelayError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RelayError::assistant(format!("response is missing '{field}'")))
}
