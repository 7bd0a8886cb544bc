//! Persistence for the chat gateway.
//!
//! Three repositories, each a trait with an in-memory and (where state must
//! survive restarts) a SQLite implementation:
//!
//! - [`QuotaStore`]: usage records behind a transaction executor
//! - [`RateLimitStore`]: sliding-window admission log
//! - [`ConversationStore`]: recent turns and running summaries

pub mod database;
pub mod error;
pub mod history;
pub mod quota;
pub mod rate_window;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
pub use history::{ConversationStore, MemoryConversationStore, SqliteConversationStore};
pub use quota::{
    MemoryQuotaStore, QuotaStore, SqliteQuotaStore, TxDecision, TxOutcome, UsageRecord,
};
pub use rate_window::{MemoryRateLimitStore, RateLimitStore, WindowDecision};
