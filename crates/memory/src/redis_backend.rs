//! Redis-backed [`ConversationMemory`](crate::provider::ConversationMemory).
//!
//! Key layout mirrors the original service exactly:
//! - `conv:{id}:state` — a single JSON blob, SET/GET.
//! - `conv:{id}:history` — a JSON blob per message, RPUSH/LRANGE.
//!
//! A state or history entry that fails to deserialize is treated as absent
//! rather than propagated as an error: a corrupted `state` key yields a
//! fresh `ConversationState`, a corrupted history item is skipped.

use async_trait::async_trait;
use redis::AsyncCommands;
use sa_domain::error::{Error, Result};
use sa_domain::model::{ConversationState, HistoryItem};

use crate::provider::ConversationMemory;

pub struct RedisConversationMemory {
    client: redis::Client,
}

impl RedisConversationMemory {
    /// Construct the client and verify connectivity with a single `PING`.
    /// Called once at bootstrap; there is no reconnect-on-failover logic.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Config(format!("invalid redis_url: {e}")))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Other(format!("redis connect failed: {e}")))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Other(format!("redis ping failed: {e}")))?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Other(format!("redis connection: {e}")))
    }

    fn state_key(conversation_id: &str) -> String {
        format!("conv:{conversation_id}:state")
    }

    fn history_key(conversation_id: &str) -> String {
        format!("conv:{conversation_id}:history")
    }
}

#[async_trait]
impl ConversationMemory for RedisConversationMemory {
    async fn get_state(&self, conversation_id: &str) -> Result<ConversationState> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .get(Self::state_key(conversation_id))
            .await
            .map_err(|e| Error::Other(format!("redis GET: {e}")))?;
        let Some(raw) = raw else {
            return Ok(ConversationState::new(conversation_id));
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                sa_domain::trace::TraceEvent::ConversationStateCorrupted {
                    conversation_id: conversation_id.to_string(),
                    key: "state",
                }
                .emit();
                tracing::warn!(error = %e, conversation_id, "corrupted state, starting fresh");
                Ok(ConversationState::new(conversation_id))
            }
        }
    }

    async fn save_state(&self, state: &ConversationState) -> Result<()> {
        let mut conn = self.conn().await?;
        let data = serde_json::to_string(state)?;
        let _: () = conn
            .set(Self::state_key(&state.conversation_id), data)
            .await
            .map_err(|e| Error::Other(format!("redis SET: {e}")))?;
        Ok(())
    }

    async fn append_history(&self, conversation_id: &str, item: HistoryItem) -> Result<()> {
        let mut conn = self.conn().await?;
        let data = serde_json::to_string(&item)?;
        let _: () = conn
            .rpush(Self::history_key(conversation_id), data)
            .await
            .map_err(|e| Error::Other(format!("redis RPUSH: {e}")))?;
        Ok(())
    }

    async fn get_history(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<HistoryItem>> {
        let mut conn = self.conn().await?;
        let start: isize = match limit {
            Some(n) => -(n as isize),
            None => 0,
        };
        let raw_items: Vec<String> = conn
            .lrange(Self::history_key(conversation_id), start, -1)
            .await
            .map_err(|e| Error::Other(format!("redis LRANGE: {e}")))?;
        let items = raw_items
            .into_iter()
            .filter_map(|raw| match serde_json::from_str(&raw) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(error = %e, conversation_id, "skipping corrupted history item");
                    None
                }
            })
            .collect();
        Ok(items)
    }

    async fn get_summary(&self, conversation_id: &str) -> Result<String> {
        Ok(self.get_state(conversation_id).await?.summary)
    }
}
