use serde::{Deserialize, Serialize};

use crate::History;

/// Number of prior turns threaded into a new request by default.
pub const DEFAULT_CONTEXT_WINDOW: usize = 5;

/// Author of a message posted to an assistant session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message handed to the assistant before the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl ContextMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Thread the last `window` turns of `history` in front of `new_question`.
///
/// Each prior turn becomes a synthetic user message restating the exchange;
/// the new question is always the final message.
///
/// ```
/// use chat_relay::{build_context, History, Turn};
/// let mut history = History::new();
/// history.upsert("Hello", Turn::new("Hello?", "Hi there."));
/// let msgs = build_context(&history, "And you?", 5);
/// assert_eq!(msgs.len(), 2);
/// assert_eq!(
///     msgs[0].content,
///     "Previously, I asked: 'Hello?' and you answered: 'Hi there.'"
/// );
/// assert_eq!(msgs[1].content, "And you?");
/// ```
pub fn build_context(history: &History, new_question: &str, window: usize) -> Vec<ContextMessage> {
    let mut messages: Vec<ContextMessage> = history
        .recent(window)
        .map(|(_, turn)| {
            ContextMessage::user(format!(
                "Previously, I asked: '{}' and you answered: '{}'",
                turn.question, turn.answer
            ))
        })
        .collect();
    messages.push(ContextMessage::user(new_question));
    messages
}
