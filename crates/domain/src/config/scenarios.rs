use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario Registry (C2)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenariosConfig {
    /// `SCENARIO_STORAGE_PATH`. `{path}/test_scenario.json` is loaded once
    /// at startup if present; failures are logged and non-fatal.
    #[serde(default = "d_storage_path")]
    pub storage_path: String,
}

impl Default for ScenariosConfig {
    fn default() -> Self {
        Self {
            storage_path: d_storage_path(),
        }
    }
}

fn d_storage_path() -> String {
    "./data/scenarios".into()
}
