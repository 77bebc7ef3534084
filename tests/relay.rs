use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_relay::assistant::RunStatus;
use chat_relay::store::{MemoryRecords, RecordStore};
use chat_relay::{
    Assistant, ContextMessage, HistoryStore, PollPolicy, Relay, RelayError, Session,
};
use tokio_util::sync::CancellationToken;

enum Outcome {
    Answer(&'static str),
    Fail,
    Stall,
    Hang,
}

/// Assistant that records what it is sent and answers per its script.
struct ScriptedAssistant {
    outcome: Outcome,
    sessions: AtomicUsize,
    posted: Mutex<Vec<ContextMessage>>,
}

impl ScriptedAssistant {
    fn new(outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            sessions: AtomicUsize::new(0),
            posted: Mutex::new(Vec::new()),
        })
    }

    fn posted(&self) -> Vec<ContextMessage> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Assistant for ScriptedAssistant {
    async fn create_session(&self) -> Result<Session, RelayError> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Session::new(format!("thread_{n}")))
    }

    async fn post_message(
        &self,
        _session: &Session,
        message: &ContextMessage,
    ) -> Result<(), RelayError> {
        self.posted.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn run_and_await_completion(
        &self,
        _session: &Session,
        poll: &PollPolicy,
    ) -> Result<String, RelayError> {
        match self.outcome {
            Outcome::Answer(a) => Ok(a.to_string()),
            Outcome::Fail => Err(RelayError::assistant("run ended as failed")),
            Outcome::Stall => {
                poll.wait_for(|| async { Ok(RunStatus::InProgress) }).await?;
                Ok("late".into())
            }
            Outcome::Hang => {
                std::future::pending::<()>().await;
                Ok("never".into())
            }
        }
    }
}

fn relay_with(assistant: Arc<ScriptedAssistant>) -> (Relay, Arc<MemoryRecords>) {
    let records = Arc::new(MemoryRecords::new());
    let history = HistoryStore::new(records.clone());
    (Relay::new(Arc::new(history), assistant), records)
}

#[tokio::test]
async fn first_question_is_sent_alone_and_recorded() {
    let assistant = ScriptedAssistant::new(Outcome::Answer("Hi there."));
    let (relay, _) = relay_with(assistant.clone());

    let reply = relay
        .chat("u1", "Hello?", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reply.answer, "Hi there.");
    assert_eq!(reply.thread_id, "thread_0");
    assert_eq!(assistant.posted(), vec![ContextMessage::user("Hello?")]);
    let history = relay.history("u1").await.unwrap();
    assert_eq!(history.get("Hello").unwrap().answer, "Hi there.");
}

#[tokio::test]
async fn context_is_limited_to_recent_turns() {
    let assistant = ScriptedAssistant::new(Outcome::Answer("ok"));
    let (relay, _) = relay_with(assistant.clone());
    let store = relay.history_store();
    for i in 0..8 {
        store
            .append("u1", &format!("question number {i}"), &format!("answer {i}"))
            .await
            .unwrap();
    }

    relay
        .chat("u1", "And the next one?", &CancellationToken::new())
        .await
        .unwrap();

    let posted = assistant.posted();
    assert_eq!(posted.len(), 6);
    assert_eq!(
        posted[0].content,
        "Previously, I asked: 'question number 3' and you answered: 'answer 3'"
    );
    assert_eq!(posted[5].content, "And the next one?");
}

#[tokio::test]
async fn failed_run_records_nothing() {
    let assistant = ScriptedAssistant::new(Outcome::Fail);
    let (relay, records) = relay_with(assistant);

    let err = relay
        .chat("u1", "Hello?", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::AssistantUnavailable(_)));
    assert_eq!(records.get("u1.json").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn stalled_run_times_out_without_recording() {
    let assistant = ScriptedAssistant::new(Outcome::Stall);
    let (relay, records) = relay_with(assistant);
    let relay = relay.poll(PollPolicy {
        initial_delay_ms: 100,
        max_delay_ms: 1_000,
        multiplier: 2,
        max_wait_ms: 10_000,
    });

    let err = relay
        .chat("u1", "Hello?", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::AssistantTimeout(d) if d == Duration::from_secs(10)));
    assert!(records.list().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_abandons_dispatch() {
    let assistant = ScriptedAssistant::new(Outcome::Hang);
    let (relay, records) = relay_with(assistant);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = relay.chat("u1", "Hello?", &cancel).await.unwrap_err();

    assert!(matches!(err, RelayError::Cancelled));
    assert!(records.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_requests_never_reach_the_assistant() {
    let assistant = ScriptedAssistant::new(Outcome::Answer("ok"));
    let (relay, _) = relay_with(assistant.clone());
    let token = CancellationToken::new();

    for (user, question) in [("", "Hello?"), ("u1", "   "), ("a/b", "Hello?")] {
        let err = relay.chat(user, question, &token).await.unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)), "{user:?} {question:?}");
    }
    assert_eq!(assistant.sessions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn change_user_acknowledges_switch() {
    let (relay, _) = relay_with(ScriptedAssistant::new(Outcome::Answer("ok")));
    assert_eq!(
        relay.change_user("alice", "bob").unwrap(),
        "Switched from alice to bob"
    );
    assert!(relay.change_user("alice", "").is_err());
}

#[tokio::test]
async fn active_users_lists_recorded_users() {
    let (relay, _) = relay_with(ScriptedAssistant::new(Outcome::Answer("ok")));
    let token = CancellationToken::new();
    relay.chat("bob", "Hi?", &token).await.unwrap();
    relay.chat("alice", "Hi?", &token).await.unwrap();
    assert_eq!(relay.active_users().await.unwrap(), vec!["alice", "bob"]);
}
