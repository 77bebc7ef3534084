//! Service configuration loaded from TOML.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a runnable relay that stores histories under `./chats` and
//! answers with the offline echo assistant.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::assistant::PollPolicy;
use crate::context::DEFAULT_CONTEXT_WINDOW;
use crate::retry::RetryPolicy;
use crate::title::{CollisionPolicy, DEFAULT_TITLE_CHARS, DEFAULT_TITLE_WORDS, TitleStyle};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub assistant: AssistantConfig,
    pub history: HistoryConfig,
    pub polling: PollPolicy,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Object,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the `file` backend.
    pub dir: PathBuf,
    /// Base URL of the S3-compatible endpoint for the `object` backend.
    pub endpoint: Option<String>,
    pub bucket: String,
    /// Bearer token sent to the object store.
    pub token: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            dir: PathBuf::from("chats"),
            endpoint: None,
            bucket: "img-chat-history".into(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantProvider {
    Threads,
    Completions,
    #[default]
    Echo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub provider: AssistantProvider,
    pub base_url: String,
    /// Usually left unset and supplied through `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Assistant to run for the `threads` provider.
    pub assistant_id: Option<String>,
    /// Model for the `completions` provider.
    pub model: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            provider: AssistantProvider::Echo,
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            assistant_id: None,
            model: "gpt-4".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStyle {
    #[default]
    Words,
    Truncate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub context_window: usize,
    pub key_style: KeyStyle,
    pub title_words: usize,
    pub title_chars: usize,
    pub collision: CollisionPolicy,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_CONTEXT_WINDOW,
            key_style: KeyStyle::Words,
            title_words: DEFAULT_TITLE_WORDS,
            title_chars: DEFAULT_TITLE_CHARS,
            collision: CollisionPolicy::Overwrite,
        }
    }
}

impl HistoryConfig {
    pub fn title_style(&self) -> TitleStyle {
        match self.key_style {
            KeyStyle::Words => TitleStyle::Words {
                max_words: self.title_words,
            },
            KeyStyle::Truncate => TitleStyle::Truncate {
                max_chars: self.title_chars,
            },
        }
    }
}

impl RelayConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Load a [`RelayConfig`] from a TOML file.
///
/// # Examples
///
/// ```no_run
/// use chat_relay::config::load;
/// # async fn example() -> anyhow::Result<()> {
/// let cfg = load("relay.toml").await?;
/// assert!(cfg.history.context_window > 0);
/// # Ok(())
/// # }
/// ```
pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<RelayConfig> {
    let text = tokio::fs::read_to_string(path).await?;
    RelayConfig::from_toml(&text)
}
