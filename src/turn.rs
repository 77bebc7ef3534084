use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One question and the answer the assistant gave to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// A user's turns keyed by derived title.
///
/// Iteration follows record order, which is the order of the most recent
/// write: re-writing an existing key moves that turn to the end. The JSON
/// form is a plain object, `{ "<key>": {"question": .., "answer": ..} }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct History {
    turns: IndexMap<String, Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Turn> {
        self.turns.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.turns.contains_key(key)
    }

    /// Turns in record order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &Turn)> {
        self.turns.iter().map(|(k, t)| (k.as_str(), t))
    }

    /// The last `n` turns in record order, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = (&str, &Turn)> {
        let skip = self.turns.len().saturating_sub(n);
        self.iter().skip(skip)
    }

    /// Store `turn` under `key`, replacing any previous turn with that key and
    /// placing it last. Returns the replaced turn.
    pub fn upsert(&mut self, key: impl Into<String>, turn: Turn) -> Option<Turn> {
        let key = key.into();
        let previous = self.turns.shift_remove(&key);
        self.turns.insert(key, turn);
        previous
    }
}

impl FromIterator<(String, Turn)> for History {
    fn from_iter<I: IntoIterator<Item = (String, Turn)>>(iter: I) -> Self {
        let mut history = History::new();
        for (key, turn) in iter {
            history.upsert(key, turn);
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_plain_object() {
        let mut history = History::new();
        history.upsert("Hello", Turn::new("Hello?", "Hi there."));
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Hello": {"question": "Hello?", "answer": "Hi there."}})
        );
    }

    #[test]
    fn preserves_file_order_when_parsed() {
        let text = r#"{"b": {"question": "b", "answer": "1"}, "a": {"question": "a", "answer": "2"}}"#;
        let history: History = serde_json::from_str(text).unwrap();
        let keys: Vec<_> = history.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn rewriting_a_key_moves_it_last() {
        let mut history = History::new();
        history.upsert("a", Turn::new("a", "1"));
        history.upsert("b", Turn::new("b", "2"));
        let old = history.upsert("a", Turn::new("a", "3"));
        assert_eq!(old, Some(Turn::new("a", "1")));
        let keys: Vec<_> = history.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(history.get("a").unwrap().answer, "3");
    }

    #[test]
    fn recent_returns_tail() {
        let history: History = (0..8)
            .map(|i| (format!("k{i}"), Turn::new(format!("q{i}"), format!("a{i}"))))
            .collect();
        let keys: Vec<_> = history.recent(3).map(|(k, _)| k).collect();
        assert_eq!(keys, ["k5", "k6", "k7"]);
        assert_eq!(history.recent(20).count(), 8);
        assert_eq!(history.recent(0).count(), 0);
    }
}
