mod llm;
mod memory;
mod pipeline;
mod retrieval;
mod scenarios;
mod server;
mod sgr;

pub use llm::*;
pub use memory::*;
pub use pipeline::*;
pub use retrieval::*;
pub use scenarios::*;
pub use server::*;
pub use sgr::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub scenarios: ScenariosConfig,
    #[serde(default)]
    pub sgr: SgrConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Apply the environment-variable overrides listed in spec.md §6 on top
    /// of whatever a TOML file supplied (or the struct defaults).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("REDIS_URL") {
            self.memory.redis_url = v;
        }
        if let Ok(v) = std::env::var("RETRIEVAL_URL") {
            self.retrieval.base_url = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.llm.api_keys = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = std::env::var("OPENAI_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            self.llm.llm_model = v;
        }
        if let Ok(v) = std::env::var("CONDITION_MODEL") {
            self.llm.condition_model = Some(v);
        }
        if let Ok(v) = std::env::var("JUDGE_MODEL") {
            self.llm.judge_model = Some(v);
        }
        if let Ok(v) = std::env::var("REVISE_MODEL") {
            self.llm.revise_model = Some(v);
        }
        if let Ok(v) = std::env::var("SUMMARY_MODEL") {
            self.llm.summary_model = Some(v);
        }
        if let Ok(v) = std::env::var("SGR_MODEL") {
            self.llm.sgr_model = Some(v);
        }
        if let Ok(v) = std::env::var("AGENT_PIPELINE_VERSION").ok().and_then(|v| PipelineVersion::parse(&v)) {
            self.pipeline.default_version = v;
        }
        if let Ok(v) = std::env::var("SGR_TIMEOUT_S").ok().and_then(|v| v.parse().ok()) {
            self.sgr.timeout_s = v;
        }
        if let Ok(v) = std::env::var("SGR_TRACE_DIR") {
            self.sgr.trace_dir = v;
        }
        if let Ok(v) = std::env::var("SGR_LOG_PROMPTS") {
            self.sgr.log_prompts = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("SCENARIO_STORAGE_PATH") {
            self.scenarios.storage_path = v;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. Mirrors the
    /// teacher's `Config::validate()` shape (flat Vec, severities, one
    /// check per field) narrowed to this system's config surface.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.retrieval.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "retrieval.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        } else if !self.retrieval.base_url.starts_with("http://")
            && !self.retrieval.base_url.starts_with("https://")
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "retrieval.base_url".into(),
                message: format!(
                    "base_url must start with http:// or https:// (got \"{}\")",
                    self.retrieval.base_url
                ),
            });
        }

        if self.llm.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        }

        if self.llm.api_keys.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.api_keys".into(),
                message: "no OPENAI_API_KEY configured — chat/chat_json will fail until set".into(),
            });
        }

        if self.memory.redis_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "memory.redis_url".into(),
                message: "empty redis_url — conversation memory will use the in-process fallback only".into(),
            });
        }

        if self.sgr.timeout_s == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sgr.timeout_s".into(),
                message: "timeout_s must be greater than 0".into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            llm: LlmConfig {
                api_keys: vec!["sk-test".into()],
                ..LlmConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn default_config_validates_with_only_warnings() {
        let issues = Config::default().validate();
        assert!(issues.iter().all(|i| i.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn zero_port_is_an_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "server.port" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn malformed_retrieval_url_is_an_error() {
        let mut cfg = valid_config();
        cfg.retrieval.base_url = "ftp://bad".into();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "retrieval.base_url" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn env_override_splits_comma_separated_keys() {
        std::env::set_var("OPENAI_API_KEY", "a,b, c");
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.llm.api_keys, vec!["a", "b", "c"]);
        std::env::remove_var("OPENAI_API_KEY");
    }
}
