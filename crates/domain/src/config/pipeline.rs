use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn Pipeline version resolution (§6)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineVersion {
    #[serde(rename = "0.1")]
    V0_1,
    #[serde(rename = "1.0")]
    V1_0,
}

impl PipelineVersion {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "0.1" => Some(Self::V0_1),
            "1.0" => Some(Self::V1_0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V0_1 => "0.1",
            Self::V1_0 => "1.0",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// `AGENT_PIPELINE_VERSION`, the process-level default used when the
    /// `/chat` caller sends no (or an unrecognized) pipeline header and no
    /// runtime-config override is present.
    #[serde(default = "d_default_version")]
    pub default_version: PipelineVersion,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_version: d_default_version(),
        }
    }
}

fn d_default_version() -> PipelineVersion {
    PipelineVersion::V0_1
}
