//! Tool Registry (C3): maps a tool name to a nullary async function. A
//! failed invocation never propagates — it is logged and yields an empty
//! JSON object, per scenario-engine `tool` node semantics.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::RwLock;

use sa_domain::model::ToolSpec;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn spec(&self) -> ToolSpec;
    async fn call(&self) -> serde_json::Value;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.write().insert(tool.name().to_string(), tool);
    }

    /// Invoke a registered tool. Isolates both returned errors and panics:
    /// an unknown name or a panicking/failing tool yields `{}`, never an
    /// `Err` — the scenario engine treats a tool node as always succeeding.
    pub async fn call(&self, name: &str) -> serde_json::Value {
        let tool = self.tools.read().get(name).cloned();
        let Some(tool) = tool else {
            tracing::warn!(tool = name, "call to unknown tool");
            return serde_json::Value::Object(Default::default());
        };

        match AssertUnwindSafe(tool.call()).catch_unwind().await {
            Ok(value) => value,
            Err(_) => {
                tracing::error!(tool = name, "tool panicked");
                serde_json::Value::Object(Default::default())
            }
        }
    }

    /// Specs for every registered tool, for SGR's use.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.read().values().map(|t| t.spec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysPanics;

    #[async_trait]
    impl Tool for AlwaysPanics {
        fn name(&self) -> &str {
            "boom"
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "boom".into(),
                description: "panics".into(),
                input_schema: serde_json::json!({}),
                output_schema: serde_json::json!({}),
            }
        }
        async fn call(&self) -> serde_json::Value {
            panic!("boom")
        }
    }

    #[tokio::test]
    async fn unknown_tool_yields_empty_object() {
        let reg = ToolRegistry::new();
        let result = reg.call("does_not_exist").await;
        assert_eq!(result, serde_json::json!({}));
    }

    #[tokio::test]
    async fn panicking_tool_yields_empty_object_not_a_crash() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(AlwaysPanics));
        let result = reg.call("boom").await;
        assert_eq!(result, serde_json::json!({}));
    }

    #[tokio::test]
    async fn specs_lists_every_registered_tool() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(AlwaysPanics));
        assert_eq!(reg.specs().len(), 1);
    }
}
