//! Question relay with per-user conversation history.
//!
//! A question arrives for a user, that user's recent turns are threaded in
//! front of it as context, a hosted assistant answers, and the new turn is
//! written back into the user's history record.

pub mod assistant;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod logger;
pub mod relay;
pub mod retry;
pub mod server;
pub mod store;
pub mod title;
pub mod turn;

pub use assistant::{Assistant, PollPolicy, Session};
pub use context::{ContextMessage, Role, build_context};
pub use error::RelayError;
pub use history::HistoryStore;
pub use relay::{ChatReply, Relay};
pub use retry::{RetryPolicy, RetryRecords};
pub use store::RecordStore;
pub use title::{CollisionPolicy, TitleStyle, derive_key};
pub use turn::{History, Turn};
