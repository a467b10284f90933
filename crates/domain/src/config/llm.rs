use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM Gateway configuration (§4.4)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Comma-separated in the environment (`OPENAI_API_KEY`); stored here
    /// already split. Rotation treats `keys[i]` as `keys[counter % N]`.
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default = "d_model")]
    pub llm_model: String,
    /// Per-role overrides. Unset fields cascade to `llm_model`.
    #[serde(default)]
    pub condition_model: Option<String>,
    #[serde(default)]
    pub judge_model: Option<String>,
    #[serde(default)]
    pub revise_model: Option<String>,
    #[serde(default)]
    pub summary_model: Option<String>,
    #[serde(default)]
    pub sgr_model: Option<String>,
    #[serde(default = "d_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Per-model pricing for cost logging, keyed by model name. Ambient —
    /// the turn pipeline does not depend on it.
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
}

impl LlmConfig {
    pub fn condition_model(&self) -> &str {
        self.condition_model.as_deref().unwrap_or(&self.llm_model)
    }
    pub fn judge_model(&self) -> &str {
        self.judge_model.as_deref().unwrap_or(&self.llm_model)
    }
    pub fn revise_model(&self) -> &str {
        self.revise_model.as_deref().unwrap_or(&self.llm_model)
    }
    pub fn summary_model(&self) -> &str {
        self.summary_model.as_deref().unwrap_or(&self.llm_model)
    }
    pub fn sgr_model(&self) -> &str {
        self.sgr_model.as_deref().unwrap_or(&self.llm_model)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_keys: Vec::new(),
            llm_model: d_model(),
            condition_model: None,
            judge_model: None,
            revise_model: None,
            summary_model: None,
            sgr_model: None,
            default_timeout_ms: d_timeout_ms(),
            pricing: HashMap::new(),
        }
    }
}

/// Pricing per million tokens for a specific model, used only for the
/// ambient cost-estimate log line (no spec operation depends on it).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

impl ModelPricing {
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_1m + output_tokens as f64 * self.output_per_1m)
            / 1_000_000.0
    }
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_model() -> String {
    "gpt-4o-mini".into()
}
fn d_timeout_ms() -> u64 {
    20_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_role_models_cascade_to_llm_model() {
        let cfg = LlmConfig {
            llm_model: "base-model".into(),
            ..LlmConfig::default()
        };
        assert_eq!(cfg.judge_model(), "base-model");
        assert_eq!(cfg.condition_model(), "base-model");
    }

    #[test]
    fn explicit_role_model_overrides_cascade() {
        let cfg = LlmConfig {
            llm_model: "base-model".into(),
            judge_model: Some("judge-model".into()),
            ..LlmConfig::default()
        };
        assert_eq!(cfg.judge_model(), "judge-model");
        assert_eq!(cfg.revise_model(), "base-model");
    }
}
