use chat_relay::assistant::CompletionsAssistant;
use chat_relay::{Assistant, ContextMessage, PollPolicy, RelayError, RetryPolicy};
use httpmock::prelude::*;
use serde_json::json;

fn assistant(server: &MockServer) -> CompletionsAssistant {
    CompletionsAssistant::new(reqwest::Client::new(), &server.base_url(), "sk-test", "gpt-4")
        .retry(RetryPolicy::none())
}

#[tokio::test]
async fn sends_buffered_messages_in_one_request() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer sk-test")
                .json_body(json!({
                    "model": "gpt-4",
                    "messages": [
                        {"role": "user", "content": "Previously, I asked: 'Hello?' and you answered: 'Hi.'"},
                        {"role": "user", "content": "And you?"}
                    ]
                }));
            then.status(200).json_body(json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Fine."}}]
            }));
        })
        .await;

    let assistant = assistant(&server);
    let session = assistant.create_session().await.unwrap();
    assistant
        .post_message(
            &session,
            &ContextMessage::user("Previously, I asked: 'Hello?' and you answered: 'Hi.'"),
        )
        .await
        .unwrap();
    assistant
        .post_message(&session, &ContextMessage::user("And you?"))
        .await
        .unwrap();
    let answer = assistant
        .run_and_await_completion(&session, &PollPolicy::default())
        .await
        .unwrap();

    assert_eq!(answer, "Fine.");
    mock.assert_async().await;
}

#[tokio::test]
async fn empty_choices_are_assistant_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({"choices": []}));
        })
        .await;

    let assistant = assistant(&server);
    let session = assistant.create_session().await.unwrap();
    let err = assistant
        .run_and_await_completion(&session, &PollPolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::AssistantUnavailable(_)), "{err:?}");
}

#[tokio::test]
async fn overloaded_service_is_assistant_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(503).body("overloaded");
        })
        .await;

    let assistant = assistant(&server);
    let session = assistant.create_session().await.unwrap();
    assistant
        .post_message(&session, &ContextMessage::user("Hello?"))
        .await
        .unwrap();
    let err = assistant
        .run_and_await_completion(&session, &PollPolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::AssistantUnavailable(_)), "{err:?}");
}
