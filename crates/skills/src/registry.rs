//! Scenario Registry (C2): in-memory store of author-written scenarios,
//! keyed by name, with an optional one-shot disk bootstrap.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;

use sa_domain::error::Result;
use sa_domain::model::ScenarioDefinition;

#[derive(Default)]
pub struct ScenarioRegistry {
    scenarios: RwLock<HashMap<String, ScenarioDefinition>>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, scenario: ScenarioDefinition) {
        self.scenarios.write().insert(scenario.name.clone(), scenario);
    }

    pub fn remove(&self, name: &str) -> Option<ScenarioDefinition> {
        self.scenarios.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<ScenarioDefinition> {
        self.scenarios.read().get(name).cloned()
    }

    /// Detached snapshot, not a lock guard — callers can iterate freely
    /// without holding the registry lock.
    pub fn all(&self) -> HashMap<String, ScenarioDefinition> {
        self.scenarios.read().clone()
    }

    /// Load `{storage_path}/test_scenario.json`, if present, at startup.
    /// A missing file or parse failure is logged and non-fatal — the
    /// registry simply starts empty.
    pub fn load_default_from_disk(&self, storage_path: &Path) {
        let path = storage_path.join("test_scenario.json");
        if !path.exists() {
            tracing::warn!(path = %path.display(), "default scenario file not found");
            return;
        }
        match Self::read_scenario_file(&path) {
            Ok(scenario) => {
                let name = scenario.name.clone();
                self.add(scenario);
                tracing::info!(scenario = %name, path = %path.display(), "loaded default scenario");
            }
            Err(e) => {
                tracing::error!(error = %e, path = %path.display(), "failed to load default scenario");
            }
        }
    }

    fn read_scenario_file(path: &Path) -> Result<ScenarioDefinition> {
        let raw = std::fs::read_to_string(path)?;
        let scenario = serde_json::from_str(&raw)?;
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::ScenarioNode;
    use std::collections::HashMap as Map;

    fn scenario(name: &str) -> ScenarioDefinition {
        ScenarioDefinition {
            name: name.to_string(),
            code: vec![ScenarioNode::end("1")],
            meta: Map::new(),
            enabled: true,
            summary: None,
            admin_message: None,
        }
    }

    #[test]
    fn add_get_remove_round_trip() {
        let reg = ScenarioRegistry::new();
        reg.add(scenario("greeting"));
        assert!(reg.get("greeting").is_some());
        assert!(reg.remove("greeting").is_some());
        assert!(reg.get("greeting").is_none());
    }

    #[test]
    fn all_returns_a_detached_snapshot() {
        let reg = ScenarioRegistry::new();
        reg.add(scenario("a"));
        let snapshot = reg.all();
        reg.add(scenario("b"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(reg.all().len(), 2);
    }

    #[test]
    fn load_default_from_disk_is_non_fatal_when_file_missing() {
        let reg = ScenarioRegistry::new();
        reg.load_default_from_disk(Path::new("/nonexistent/path/xyz"));
        assert!(reg.all().is_empty());
    }

    #[test]
    fn load_default_from_disk_loads_valid_json() {
        let dir = std::env::temp_dir().join(format!("sa-scenario-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("test_scenario.json"),
            r#"{"name": "birthday", "code": [{"id": "1", "type": "end"}]}"#,
        )
        .unwrap();

        let reg = ScenarioRegistry::new();
        reg.load_default_from_disk(&dir);
        assert!(reg.get("birthday").is_some());

        std::fs::remove_dir_all(&dir).ok();
    }
}
