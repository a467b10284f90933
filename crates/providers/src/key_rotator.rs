//! Monotonic API-key rotation, grounded in `runtime_config.py`'s
//! `get_effective_openai_api_key`/`mark_openai_api_key_rate_limited`.
//!
//! Deliberately not [`crate::auth::AuthRotator`] (cooldown-based skip on
//! failure) — this is a durable, process-shared counter: `keys[counter %
//! N]`, advanced by `INCR` on rate-limit, persisted in Redis when
//! reachable and otherwise in an in-process atomic.
//!
//! The key *list* itself is also re-read live: every call resolves
//! against [`RuntimeConfigStore`]'s `OPENAI_API_KEY` field before falling
//! back to the static list passed to [`KeyRotator::new`], mirroring
//! `get_effective_openai_api_keys`'s own live Redis read.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::runtime_config::RuntimeConfigStore;

const COUNTER_KEY: &str = "runtime_config:openai_api_key_rotation_counter:v1";

pub struct KeyRotator {
    keys: Vec<String>,
    redis: Option<redis::Client>,
    runtime_config: RuntimeConfigStore,
    local_counter: AtomicU64,
}

impl std::fmt::Debug for KeyRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRotator")
            .field("key_count", &self.keys.len())
            .field("durable", &self.redis.is_some())
            .finish()
    }
}

impl KeyRotator {
    /// `redis_url` empty or unreachable falls back silently to an
    /// in-process counter — rotation still works within one process, it
    /// just doesn't survive a restart or coordinate across replicas.
    pub fn new(keys: Vec<String>, redis_url: &str) -> Self {
        let redis = if redis_url.is_empty() {
            None
        } else {
            redis::Client::open(redis_url).ok()
        };
        Self {
            keys,
            redis,
            runtime_config: RuntimeConfigStore::new(redis_url),
            local_counter: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key list a call should rotate over right now: the
    /// `runtime_config:v1` override (comma-separated `OPENAI_API_KEY`
    /// field) when present and non-empty, else the static list from
    /// [`Self::new`].
    async fn effective_keys(&self) -> Vec<String> {
        if let Some(raw) = self.runtime_config.get_field("OPENAI_API_KEY").await {
            let overridden: Vec<String> =
                raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
            if !overridden.is_empty() {
                return overridden;
            }
        }
        self.keys.clone()
    }

    /// Number of keys a call should rotate over right now (see
    /// [`Self::effective_keys`]) — what `call_with_rotation` retries
    /// against, as opposed to [`Self::len`]'s static count.
    pub async fn effective_len(&self) -> usize {
        self.effective_keys().await.len()
    }

    async fn counter(&self) -> u64 {
        if let Some(client) = &self.redis {
            if let Ok(mut conn) = client.get_multiplexed_async_connection().await {
                let raw: redis::RedisResult<Option<String>> =
                    redis::AsyncCommands::get(&mut conn, COUNTER_KEY).await;
                if let Ok(Some(raw)) = raw {
                    if let Ok(n) = raw.parse::<u64>() {
                        return n;
                    }
                }
                return 0;
            }
        }
        self.local_counter.load(Ordering::SeqCst)
    }

    /// The key the next request should use.
    pub async fn current_key(&self) -> Option<String> {
        let keys = self.effective_keys().await;
        if keys.is_empty() {
            return None;
        }
        let idx = (self.counter().await as usize) % keys.len();
        Some(keys[idx].clone())
    }

    /// Advance to the next key. A no-op when only one key is configured
    /// (rotation would just reselect the same key).
    pub async fn mark_rate_limited(&self) {
        if self.effective_keys().await.len() <= 1 {
            return;
        }
        if let Some(client) = &self.redis {
            if let Ok(mut conn) = client.get_multiplexed_async_connection().await {
                let _: redis::RedisResult<i64> =
                    redis::AsyncCommands::incr(&mut conn, COUNTER_KEY, 1).await;
                return;
            }
        }
        self.local_counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_key_rotation_is_a_no_op() {
        let rotator = KeyRotator::new(vec!["only-key".into()], "");
        assert_eq!(rotator.current_key().await.as_deref(), Some("only-key"));
        rotator.mark_rate_limited().await;
        assert_eq!(rotator.current_key().await.as_deref(), Some("only-key"));
    }

    #[tokio::test]
    async fn multi_key_rotation_advances_with_local_counter_fallback() {
        let rotator = KeyRotator::new(vec!["a".into(), "b".into(), "c".into()], "");
        assert_eq!(rotator.current_key().await.as_deref(), Some("a"));
        rotator.mark_rate_limited().await;
        assert_eq!(rotator.current_key().await.as_deref(), Some("b"));
        rotator.mark_rate_limited().await;
        assert_eq!(rotator.current_key().await.as_deref(), Some("c"));
        rotator.mark_rate_limited().await;
        assert_eq!(rotator.current_key().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn no_keys_configured_returns_none() {
        let rotator = KeyRotator::new(vec![], "");
        assert_eq!(rotator.current_key().await, None);
    }

    #[tokio::test]
    async fn effective_len_falls_back_to_static_key_count_without_redis() {
        let rotator = KeyRotator::new(vec!["a".into(), "b".into()], "");
        assert_eq!(rotator.effective_len().await, 2);
    }
}
