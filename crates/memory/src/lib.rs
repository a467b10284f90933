//! Conversation Memory (C1): durable per-conversation state and message
//! history, backed by Redis in production and an in-process map in tests
//! or when no `redis_url` is configured.

pub mod in_memory;
pub mod provider;
pub mod redis_backend;

pub use in_memory::InMemoryConversationMemory;
pub use provider::ConversationMemory;
pub use redis_backend::RedisConversationMemory;

use std::sync::Arc;

use sa_domain::config::MemoryConfig;
use sa_domain::error::Result;

/// Select the backend once, at startup. A configured, reachable
/// `redis_url` gets the durable Redis backend; an empty URL falls back to
/// the in-process store so the gateway still runs (degraded) without a
/// Redis instance on hand. Connection failure against a non-empty URL is
/// fatal — callers should surface it and refuse to start rather than
/// silently run in-memory against a broken config.
pub async fn create_provider(cfg: &MemoryConfig) -> Result<Arc<dyn ConversationMemory>> {
    if cfg.redis_url.is_empty() {
        tracing::warn!("memory.redis_url is empty, using in-process conversation memory");
        return Ok(Arc::new(InMemoryConversationMemory::new()));
    }
    let backend = RedisConversationMemory::connect(&cfg.redis_url).await?;
    tracing::info!(redis_url = %cfg.redis_url, "connected conversation memory to redis");
    Ok(Arc::new(backend))
}
