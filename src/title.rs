//! Short, human-readable keys derived from question text.
//!
//! Keys are lossy: two questions sharing their leading words map to the same
//! key. What happens on such a collision is decided by [`CollisionPolicy`].

use serde::Deserialize;

use crate::History;

/// Default number of words kept by [`derive_key`].
pub const DEFAULT_TITLE_WORDS: usize = 5;
/// Default number of characters kept by [`TitleStyle::Truncate`].
pub const DEFAULT_TITLE_CHARS: usize = 50;

/// Join the first `max_words` whitespace-separated tokens of `question` with
/// underscores and strip `?` and `.` from the result.
///
/// ```
/// use chat_relay::title::derive_key;
/// assert_eq!(derive_key("Hello?", 5), "Hello");
/// assert_eq!(derive_key("  How do I apply.  ", 3), "How_do_I");
/// ```
pub fn derive_key(question: &str, max_words: usize) -> String {
    question
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join("_")
        .replace(['?', '.'], "")
}

/// Keep the first `max_chars` characters, marking the cut with `...`.
pub fn truncate_key(question: &str, max_chars: usize) -> String {
    if question.chars().count() > max_chars {
        let head: String = question.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        question.to_string()
    }
}

/// How a question is turned into its history key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleStyle {
    /// Leading words joined by underscores, see [`derive_key`].
    Words { max_words: usize },
    /// Leading characters, see [`truncate_key`].
    Truncate { max_chars: usize },
}

impl Default for TitleStyle {
    fn default() -> Self {
        TitleStyle::Words {
            max_words: DEFAULT_TITLE_WORDS,
        }
    }
}

impl TitleStyle {
    pub fn derive(&self, question: &str) -> String {
        match *self {
            TitleStyle::Words { max_words } => derive_key(question, max_words),
            TitleStyle::Truncate { max_chars } => truncate_key(question, max_chars),
        }
    }
}

/// What to do when a new turn derives a key already present in the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Replace the earlier turn; the key reads as "latest answer on this topic".
    #[default]
    Overwrite,
    /// Keep both turns by suffixing the new key with `_2`, `_3`, ...
    KeepBoth,
}

impl CollisionPolicy {
    /// Resolve the key a new turn is stored under.
    pub fn resolve(&self, history: &History, key: String) -> String {
        match self {
            CollisionPolicy::Overwrite => key,
            CollisionPolicy::KeepBoth => {
                if !history.contains_key(&key) {
                    return key;
                }
                let mut n = 2usize;
                loop {
                    let candidate = format!("{key}_{n}");
                    if !history.contains_key(&candidate) {
                        return candidate;
                    }
                    n += 1;
                }
            }
        }
    }
}
