use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use chat_relay::assistant::EchoAssistant;
use chat_relay::server::{AppState, router};
use chat_relay::store::{MemoryRecords, RecordStore};
use chat_relay::{HistoryStore, Relay, RelayError};

struct DownRecords;

#[async_trait]
impl RecordStore for DownRecords {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, RelayError> {
        Err(RelayError::storage("bucket unreachable"))
    }

    async fn put(&self, _key: &str, _body: &[u8]) -> Result<(), RelayError> {
        Err(RelayError::storage("bucket unreachable"))
    }

    async fn list(&self) -> Result<Vec<String>, RelayError> {
        Err(RelayError::storage("bucket unreachable"))
    }
}

fn app_over(records: Arc<dyn RecordStore>) -> Router {
    let relay = Relay::new(
        Arc::new(HistoryStore::new(records)),
        Arc::new(EchoAssistant::new()),
    );
    router(AppState::new(Arc::new(relay), CancellationToken::new()))
}

fn app() -> Router {
    app_over(Arc::new(MemoryRecords::new()))
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn chat_answers_and_records_turn() {
    let app = app();

    let (status, body) = call(
        &app,
        post("/chat", json!({"user_id": "user_1234", "question": "Hello?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Echo: Hello?");
    assert!(body["thread_id"].as_str().unwrap().starts_with("local-"));

    let (status, body) = call(&app, get("/get-history/user_1234")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"chats": {"Hello": {"question": "Hello?", "answer": "Echo: Hello?"}}})
    );
}

#[tokio::test]
async fn unknown_user_has_empty_history() {
    let (status, body) = call(&app(), get("/get-history/nobody")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"chats": {}}));
}

#[tokio::test]
async fn missing_question_is_bad_request() {
    let (status, body) = call(&app(), post("/chat", json!({"user_id": "u1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
    assert!(body["error"].as_str().unwrap().contains("question"));
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let req = Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(&app(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn storage_outage_is_service_unavailable() {
    let app = app_over(Arc::new(DownRecords));

    let (status, body) = call(
        &app,
        post("/chat", json!({"user_id": "u1", "question": "Hello?"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "storage_unavailable");

    let (status, _) = call(&app, get("/get-history/u1")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn corrupt_record_is_internal_error() {
    let records = Arc::new(MemoryRecords::new());
    records.put("u1.json", b"[not a history").await.unwrap();
    let app = app_over(records);

    let (status, body) = call(&app, get("/get-history/u1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "corrupt_record");
}

#[tokio::test]
async fn active_users_and_change_user() {
    let app = app();
    for user in ["user_5678", "user_1234"] {
        let (status, _) = call(
            &app,
            post("/chat", json!({"user_id": user, "question": "Hi?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = call(&app, get("/get-active-users")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"active_users": ["user_1234", "user_5678"]}));

    let (status, body) = call(
        &app,
        post(
            "/change-user",
            json!({"current_user_id": "user_1234", "new_user_id": "user_5678"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Switched from user_1234 to user_5678");

    let (status, _) = call(
        &app,
        post("/change-user", json!({"current_user_id": "user_1234"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = call(&app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}
