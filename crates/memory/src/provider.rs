//! Conversation Memory contract (C1).

use async_trait::async_trait;
use sa_domain::error::Result;
use sa_domain::model::{ConversationState, HistoryItem};

/// Durable store for per-conversation state and message history.
///
/// Implemented by [`crate::redis::RedisConversationMemory`] (the durable
/// backend) and [`crate::in_memory::InMemoryConversationMemory`] (used when
/// no Redis URL is configured, or in tests). The backend is selected once in
/// bootstrap via [`crate::create_provider`] — there is no runtime failover
/// between the two.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// Load state for `conversation_id`, creating a fresh
    /// [`ConversationState`] if none exists yet. A stored value that fails
    /// to deserialize is treated as absent (fresh state), not an error.
    async fn get_state(&self, conversation_id: &str) -> Result<ConversationState>;

    /// Persist state, overwriting whatever was stored before.
    async fn save_state(&self, state: &ConversationState) -> Result<()>;

    /// Append one history item for `conversation_id`.
    async fn append_history(&self, conversation_id: &str, item: HistoryItem) -> Result<()>;

    /// Return up to `limit` most recent history items, oldest first. A
    /// `limit` of `None` returns the full history.
    async fn get_history(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<HistoryItem>>;

    /// Return the current rolling summary (empty string if none yet).
    async fn get_summary(&self, conversation_id: &str) -> Result<String>;
}
