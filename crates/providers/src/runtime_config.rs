//! Reader for the durable `runtime_config:v1` override map (§6), grounded
//! in `runtime_config.py`'s `get_effective_openai_api_keys`/
//! `get_effective_agent_pipeline_version` — both re-read a live
//! Redis-backed JSON blob of operator overrides on every call rather than
//! trusting the process's own boot-time config, so an operator can flip
//! `AGENT_PIPELINE_VERSION` or rotate `OPENAI_API_KEY` on a running
//! process without a restart.

const RUNTIME_CONFIG_KEY: &str = "runtime_config:v1";

pub struct RuntimeConfigStore {
    redis: Option<redis::Client>,
}

impl RuntimeConfigStore {
    /// `redis_url` empty or unreachable means every [`Self::get_field`]
    /// call returns `None` — callers fall back to their static config.
    pub fn new(redis_url: &str) -> Self {
        let redis = if redis_url.is_empty() { None } else { redis::Client::open(redis_url).ok() };
        Self { redis }
    }

    /// Read one string field out of the `runtime_config:v1` JSON map.
    /// Any failure along the way (unreachable Redis, missing key,
    /// malformed JSON, missing/non-string field) yields `None`.
    pub async fn get_field(&self, field: &str) -> Option<String> {
        let client = self.redis.as_ref()?;
        let mut conn = client.get_multiplexed_async_connection().await.ok()?;
        let raw: Option<String> = redis::AsyncCommands::get(&mut conn, RUNTIME_CONFIG_KEY).await.ok()?;
        let value: serde_json::Value = serde_json::from_str(&raw?).ok()?;
        value.get(field)?.as_str().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_redis_url_always_returns_none() {
        let store = RuntimeConfigStore::new("");
        assert_eq!(store.get_field("AGENT_PIPELINE_VERSION").await, None);
    }

    #[tokio::test]
    async fn unreachable_redis_url_returns_none_rather_than_erroring() {
        let store = RuntimeConfigStore::new("redis://127.0.0.1:1");
        assert_eq!(store.get_field("OPENAI_API_KEY").await, None);
    }
}
