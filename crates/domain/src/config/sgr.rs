use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SGR Converter (C9)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SgrConfig {
    #[serde(default = "d_timeout_s")]
    pub timeout_s: u64,
    /// `SGR_TRACE_DIR`. Per-conversion trace bundles are written under
    /// `{trace_dir}/<trace_id>/`.
    #[serde(default = "d_trace_dir")]
    pub trace_dir: String,
    /// `SGR_LOG_PROMPTS`. When false, request/response trace files still
    /// get written but prompts are redacted to a length marker.
    #[serde(default)]
    pub log_prompts: bool,
}

impl Default for SgrConfig {
    fn default() -> Self {
        Self {
            timeout_s: d_timeout_s(),
            trace_dir: d_trace_dir(),
            log_prompts: false,
        }
    }
}

fn d_timeout_s() -> u64 {
    35
}
fn d_trace_dir() -> String {
    "./data/sgr_traces".into()
}
