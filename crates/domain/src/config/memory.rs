use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation Memory (C1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// `REDIS_URL`. Empty means: skip the durable backend probe and go
    /// straight to the in-process fallback.
    #[serde(default = "d_redis_url")]
    pub redis_url: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            redis_url: d_redis_url(),
        }
    }
}

fn d_redis_url() -> String {
    "redis://127.0.0.1:6379".into()
}
