use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retrieval Client (C5)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// `RETRIEVAL_URL`, base of the external knowledge-base service.
    #[serde(default = "d_retrieval_url")]
    pub base_url: String,
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "d_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: d_retrieval_url(),
            max_attempts: d_max_attempts(),
            attempt_timeout_ms: d_attempt_timeout_ms(),
        }
    }
}

fn d_retrieval_url() -> String {
    "http://127.0.0.1:8090".into()
}
fn d_max_attempts() -> u32 {
    8
}
fn d_attempt_timeout_ms() -> u64 {
    30_000
}
