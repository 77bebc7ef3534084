//! HTTP surface of the relay.
//!
//! Routes:
//! - `POST /chat` with `{user_id, question}` answers `{answer, thread_id}`.
//! - `GET /get-history/{user_id}` answers `{chats}`.
//! - `GET /get-active-users` answers `{active_users}`.
//! - `POST /change-user` with `{current_user_id, new_user_id}` answers `{message}`.
//! - `GET /health` answers `{status: "ok"}`.
//!
//! Failures answer `{error, kind}` with a status matching the error kind.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::relay::{ChatReply, Relay};
use crate::{History, RelayError};

impl RelayError {
    fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::CorruptRecord { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::AssistantUnavailable(_) => StatusCode::BAD_GATEWAY,
            RelayError::AssistantTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "request failed");
        } else {
            warn!(kind = self.kind(), error = %self, "request rejected");
        }
        let body = json!({"error": self.to_string(), "kind": self.kind()});
        (status, Json(body)).into_response()
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    relay: Arc<Relay>,
    shutdown: CancellationToken,
}

impl AppState {
    /// `shutdown` is cancelled when the server stops; in-flight chats are
    /// abandoned with it.
    pub fn new(relay: Arc<Relay>, shutdown: CancellationToken) -> Self {
        Self { relay, shutdown }
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    question: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeUserRequest {
    #[serde(default)]
    current_user_id: Option<String>,
    #[serde(default)]
    new_user_id: Option<String>,
}

#[derive(Serialize)]
struct HistoryResponse {
    chats: History,
}

#[derive(Serialize)]
struct ActiveUsersResponse {
    active_users: Vec<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

fn required(field: Option<String>, name: &str) -> Result<String, RelayError> {
    field
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| RelayError::validation(format!("'{name}' is required")))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, RelayError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| RelayError::validation(e.body_text()))
}

/// Build the router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/get-history/:user_id", get(get_history))
        .route("/get-active-users", get(active_users))
        .route("/change-user", post(change_user))
        .route("/health", get(health))
        .with_state(state)
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, RelayError> {
    let req = body(payload)?;
    let user_id = required(req.user_id, "user_id")?;
    let question = required(req.question, "question")?;
    let cancel = state.shutdown.child_token();
    let reply = state.relay.chat(&user_id, &question, &cancel).await?;
    Ok(Json(reply))
}

async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<HistoryResponse>, RelayError> {
    let chats = state.relay.history(&user_id).await?;
    Ok(Json(HistoryResponse { chats }))
}

async fn active_users(
    State(state): State<AppState>,
) -> Result<Json<ActiveUsersResponse>, RelayError> {
    let active_users = state.relay.active_users().await?;
    Ok(Json(ActiveUsersResponse { active_users }))
}

async fn change_user(
    State(state): State<AppState>,
    payload: Result<Json<ChangeUserRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, RelayError> {
    let req = body(payload)?;
    let current = required(req.current_user_id, "current_user_id")?;
    let new = required(req.new_user_id, "new_user_id")?;
    let message = state.relay.change_user(&current, &new)?;
    Ok(Json(MessageResponse { message }))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Waits for `Ctrl+C` or, on Unix, `SIGTERM`, then cancels `shutdown`.
pub async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                    _ = shutdown.cancelled() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = shutdown.cancelled() => {},
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = shutdown.cancelled() => {},
        }
    }
    info!("shutdown signal received");
    shutdown.cancel();
}

/// Serve the relay on `addr` until `shutdown` is cancelled.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "serving chat relay");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        assert_eq!(
            RelayError::validation("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::storage("x").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RelayError::assistant("x").status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            RelayError::AssistantTimeout(std::time::Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn blank_fields_are_missing() {
        assert!(required(Some("  ".into()), "question").is_err());
        assert!(required(None, "question").is_err());
        assert_eq!(required(Some("q".into()), "question").unwrap(), "q");
    }
}
