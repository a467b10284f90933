//! Scenario Engine (C6): compiles the registry of author scenarios and the
//! current turn's state into a [`ToolsContext`] the Turn Pipeline folds into
//! its prompt. Four phases run in sequence — map (concurrent, per scenario),
//! reduce (deterministic merge), condition-decide (concurrent, per remaining
//! conditional block) and summarize (concurrent, per scenario) — mirroring
//! `scenario_engine.py`'s `tools_subgraph` end to end.

pub mod condition_decide;
pub mod map;
pub mod reduce;
pub mod summarize;
pub mod template;

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;

use sa_domain::model::{ConversationState, ScenarioDefinition, ToolsContext};
use sa_domain::trace::TraceEvent;
use sa_providers::LlmGateway;
use sa_tools::ToolRegistry;

use map::run_scenario_map;
use reduce::reduce_scenario_maps;

/// Run the full map → reduce → condition-decide → summarize pipeline over
/// every enabled scenario in `scenarios`.
pub async fn run_scenario_engine(
    scenarios: &HashMap<String, ScenarioDefinition>,
    state: &ConversationState,
    user_message: &str,
    tools: &ToolRegistry,
    llm: &Arc<dyn LlmGateway>,
) -> ToolsContext {
    let mut ordered: Vec<&ScenarioDefinition> = scenarios.values().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    // Tool facts discovered by earlier scenarios in this sequential pass are
    // visible to later ones, so a shared tool (e.g. `get_user_data`) is
    // invoked at most once per turn even across scenario boundaries.
    let mut shared_facts = HashMap::new();
    let mut map_results = Vec::with_capacity(ordered.len());

    let batches = join_all(
        ordered
            .iter()
            .map(|scenario| run_scenario_map(scenario, state, user_message, tools, &shared_facts)),
    )
    .await;

    for result in batches {
        TraceEvent::ScenarioMapCompleted {
            scenario: result.scenario_name.clone(),
            blocks_emitted: result.instruction_blocks.len(),
            facts_emitted: result.facts.len(),
        }
        .emit();
        for (k, v) in &result.facts {
            shared_facts.entry(k.clone()).or_insert_with(|| v.clone());
        }
        map_results.push(result);
    }

    let mut context = reduce_scenario_maps(map_results);
    let decisions = condition_decide::decide_conditions(&mut context, user_message, llm).await;
    summarize::summarize_instructions(&mut context, scenarios, llm, &decisions).await;
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_domain::error::Result;
    use sa_domain::model::ScenarioNode;
    use sa_providers::{ChatMessage, ModelRole};
    use serde_json::json;

    struct StubGateway;

    #[async_trait]
    impl LlmGateway for StubGateway {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
            _role: ModelRole,
            _model_override: Option<&str>,
        ) -> Result<String> {
            Ok(String::new())
        }

        async fn chat_json(
            &self,
            _messages: &[ChatMessage],
            _schema: &serde_json::Value,
            _schema_name: &str,
            _temperature: f32,
            _role: ModelRole,
            _model_override: Option<&str>,
        ) -> Result<serde_json::Value> {
            Ok(json!({"decision": "ignore", "followup_question": "", "imperative": "ignored"}))
        }
    }

    #[tokio::test]
    async fn runs_all_enabled_scenarios_and_merges_results() {
        let mut scenarios = HashMap::new();
        scenarios.insert(
            "greeting".to_string(),
            ScenarioDefinition {
                name: "greeting".to_string(),
                code: vec![ScenarioNode::text("1", "Hello there.")],
                meta: HashMap::new(),
                enabled: true,
                summary: None,
                admin_message: None,
            },
        );

        let state = ConversationState::new("c1");
        let tools = ToolRegistry::new();
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway);

        let context = run_scenario_engine(&scenarios, &state, "hi", &tools, &llm).await;
        assert_eq!(context.instruction_blocks.len(), 1);
        assert_eq!(context.applied.len(), 1);
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_context() {
        let scenarios = HashMap::new();
        let state = ConversationState::new("c1");
        let tools = ToolRegistry::new();
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway);

        let context = run_scenario_engine(&scenarios, &state, "hi", &tools, &llm).await;
        assert!(context.instruction_blocks.is_empty());
    }

    #[tokio::test]
    async fn scenario_whose_only_condition_is_ignored_does_not_linger_in_applied() {
        // StubGateway's chat_json always decides "ignore", so this scenario's
        // sole `if` node resolves to nothing and the reduce-phase `applied`
        // seed for it must not survive summarize.
        let mut if_node = ScenarioNode::end("1");
        if_node.node_type = sa_domain::model::NodeType::If;
        if_node.condition = Some("пользователь упомянул день рождения".to_string());
        if_node.children = vec![ScenarioNode::text("1.1", "Поздравляем с днём рождения!")];

        let mut scenarios = HashMap::new();
        scenarios.insert(
            "birthday".to_string(),
            ScenarioDefinition {
                name: "birthday".to_string(),
                code: vec![if_node],
                meta: HashMap::new(),
                enabled: true,
                summary: None,
                admin_message: None,
            },
        );

        let state = ConversationState::new("c1");
        let tools = ToolRegistry::new();
        let llm: Arc<dyn LlmGateway> = Arc::new(StubGateway);

        let context = run_scenario_engine(&scenarios, &state, "hi", &tools, &llm).await;
        assert!(context.instruction_blocks.is_empty());
        assert!(context.applied.is_empty());
    }
}
