//! Per-scenario map phase, grounded in `scenario_engine.py`'s `_map_scenario`.
//!
//! Each enabled scenario is walked independently and turned into a flat
//! fact table plus a list of [`InstructionBlock`]s. `if` nodes are resolved
//! deterministically where possible (an explicit `message_index` comparison,
//! or one of the two Russian "first message" phrasings) so that only
//! genuinely ambiguous conditions are pushed to the LLM in
//! [`super::condition_decide`].

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use sa_domain::model::{
    ApplyPolicy, ConditionalPayload, ConversationState, InstructionBlock, NodeType, ScenarioDefinition, ScenarioNode,
};
use sa_tools::ToolRegistry;

use super::template::render_template;

/// Output of mapping a single scenario against the current turn.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMapResult {
    pub scenario_name: String,
    pub facts: HashMap<String, Value>,
    pub instruction_blocks: Vec<InstructionBlock>,
}

fn message_index_cmp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"message_index\s*(==|!=|>=|<=|>|<)\s*(\d+)").unwrap())
}

/// Map a single scenario. `tools` resolves `tool` nodes; tool results already
/// discovered by a sibling scenario in this turn are passed in via
/// `shared_facts` so a given tool is invoked at most once per turn.
pub async fn run_scenario_map(
    scenario: &ScenarioDefinition,
    state: &ConversationState,
    user_message: &str,
    tools: &ToolRegistry,
    shared_facts: &HashMap<String, Value>,
) -> ScenarioMapResult {
    let mut result = ScenarioMapResult { scenario_name: scenario.name.clone(), ..Default::default() };

    if !scenario.enabled {
        return result;
    }
    if let Some(only_at) = scenario.apply_only_message_index() {
        if state.message_index != only_at {
            return result;
        }
    }

    let mut nodes: Vec<&ScenarioNode> = scenario.code.iter().collect();
    nodes.sort_by_key(|n| n.sort_key());

    let _ = run_sequence(&nodes, scenario, state, user_message, tools, shared_facts, &mut result).await;

    result
}

/// Run a sorted sequence of sibling nodes, stopping as soon as an `end`
/// node is reached — `end` terminates execution of the enclosing
/// sequence. Returns `true` if an `end` was reached anywhere within this
/// sequence (directly, or inside a deterministically-resolved `if`
/// branch), so the caller that recursed into an `if` branch can itself
/// stop rather than falling through to the nodes that follow the `if`.
async fn run_sequence(
    nodes: &[&ScenarioNode],
    scenario: &ScenarioDefinition,
    state: &ConversationState,
    user_message: &str,
    tools: &ToolRegistry,
    shared_facts: &HashMap<String, Value>,
    result: &mut ScenarioMapResult,
) -> bool {
    for node in nodes {
        if node.node_type == NodeType::End {
            return true;
        }
        if run_node(node, scenario, state, user_message, tools, shared_facts, result).await {
            return true;
        }
    }
    false
}

/// Runs one node. Returns `true` only when an `end` node was reached
/// while executing it (directly, or via a chosen `if` branch) — the
/// signal the caller must propagate up to `run_scenario_map`'s own
/// top-level sequence.
async fn run_node(
    node: &ScenarioNode,
    scenario: &ScenarioDefinition,
    state: &ConversationState,
    user_message: &str,
    tools: &ToolRegistry,
    shared_facts: &HashMap<String, Value>,
    result: &mut ScenarioMapResult,
) -> bool {
    match node.node_type {
        NodeType::Text => {
            if let Some(text) = &node.text {
                let facts = merged_facts(shared_facts, &result.facts);
                let rendered = render_template(text, &facts, state);
                result.instruction_blocks.push(InstructionBlock::raw_agent(
                    format!("scenario:{}:text:{}", scenario.name, node.id),
                    scenario.name.clone(),
                    rendered,
                ));
            }
            false
        }
        NodeType::Tool => {
            if let Some(tool_name) = &node.tool {
                let key = format!("tool:{tool_name}");
                if shared_facts.contains_key(&key) || result.facts.contains_key(&key) {
                    return false;
                }
                let value = resolve_tool(tool_name, state, tools).await;
                result.facts.insert(key, value);
            }
            false
        }
        NodeType::If => {
            let Some(condition) = &node.condition else { return false };
            match decide_deterministically(condition, state, user_message) {
                Some(true) => {
                    let mut children: Vec<&ScenarioNode> = node.children.iter().collect();
                    children.sort_by_key(|n| n.sort_key());
                    Box::pin(run_sequence(&children, scenario, state, user_message, tools, shared_facts, result))
                        .await
                }
                Some(false) => {
                    let mut children: Vec<&ScenarioNode> = node.else_children.iter().collect();
                    children.sort_by_key(|n| n.sort_key());
                    Box::pin(run_sequence(&children, scenario, state, user_message, tools, shared_facts, result))
                        .await
                }
                None => {
                    let facts = merged_facts(shared_facts, &result.facts);
                    let when_true = render_block_texts(&node.children, &facts, state);
                    let when_false = render_block_texts(&node.else_children, &facts, state);
                    let payload = ConditionalPayload {
                        condition: condition.clone(),
                        condition_text: node.text.clone(),
                        when_true,
                        when_false,
                        apply_policy: ApplyPolicy::default(),
                    };
                    result.instruction_blocks.push(InstructionBlock::conditional_agent(
                        node.id.clone(),
                        scenario.name.clone(),
                        payload,
                    ));
                    false
                }
            }
        }
        NodeType::End => false,
    }
}

fn render_block_texts(nodes: &[ScenarioNode], facts: &HashMap<String, Value>, state: &ConversationState) -> Vec<String> {
    nodes
        .iter()
        .filter(|n| matches!(n.node_type, NodeType::Text))
        .filter_map(|n| n.text.as_deref())
        .map(|text| render_template(text, facts, state))
        .collect()
}

fn merged_facts(shared: &HashMap<String, Value>, local: &HashMap<String, Value>) -> HashMap<String, Value> {
    let mut merged = shared.clone();
    for (k, v) in local {
        merged.entry(k.clone()).or_insert_with(|| v.clone());
    }
    merged
}

async fn resolve_tool(tool_name: &str, state: &ConversationState, tools: &ToolRegistry) -> Value {
    if tool_name == "get_user_data" {
        if let Some(name) = &state.user_profile.name {
            return serde_json::json!({
                "name": name,
                "age": state.user_profile.age,
                "birthday_date": state.user_profile.birthday_date,
            });
        }
    }
    tools.call(tool_name).await
}

/// Resolve a condition without involving an LLM, where possible.
///
/// Two cases are handled: an explicit `message_index <op> N` comparison, and
/// the two Russian "this is/isn't the first message" phrasings. Anything
/// else returns `None` and is left for [`super::condition_decide`].
fn decide_deterministically(condition: &str, state: &ConversationState, user_message: &str) -> Option<bool> {
    let lower = condition.to_lowercase();

    if let Some(caps) = message_index_cmp_re().captures(&lower) {
        let op = &caps[1];
        let n: u64 = caps[2].parse().ok()?;
        let idx = state.message_index;
        return Some(match op {
            "==" => idx == n,
            "!=" => idx != n,
            ">=" => idx >= n,
            "<=" => idx <= n,
            ">" => idx > n,
            "<" => idx < n,
            _ => return None,
        });
    }

    let mentions_message = lower.contains("сообщ");
    if mentions_message {
        if lower.contains("не перв") {
            return Some(state.message_index != 1);
        }
        if lower.contains("перв") {
            return Some(state.message_index == 1);
        }
    }

    let _ = user_message;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::ScenarioDefinition;
    use sa_tools::ToolRegistry;

    fn scenario_with(code: Vec<ScenarioNode>) -> ScenarioDefinition {
        ScenarioDefinition {
            name: "greeting".to_string(),
            code,
            meta: HashMap::new(),
            enabled: true,
            summary: None,
            admin_message: None,
        }
    }

    #[tokio::test]
    async fn text_node_renders_into_required_block() {
        let scenario = scenario_with(vec![ScenarioNode::text("1", "Здравствуйте!")]);
        let state = ConversationState::new("c1");
        let tools = ToolRegistry::new();
        let result = run_scenario_map(&scenario, &state, "hi", &tools, &HashMap::new()).await;
        assert_eq!(result.instruction_blocks.len(), 1);
        assert_eq!(result.instruction_blocks[0].text.as_deref(), Some("Здравствуйте!"));
    }

    #[tokio::test]
    async fn disabled_scenario_produces_nothing() {
        let mut scenario = scenario_with(vec![ScenarioNode::text("1", "hi")]);
        scenario.enabled = false;
        let state = ConversationState::new("c1");
        let tools = ToolRegistry::new();
        let result = run_scenario_map(&scenario, &state, "hi", &tools, &HashMap::new()).await;
        assert!(result.instruction_blocks.is_empty());
    }

    #[tokio::test]
    async fn message_index_condition_resolves_deterministically() {
        let mut first = ScenarioNode::end("2.1");
        first.node_type = NodeType::Text;
        first.text = Some("welcome".to_string());
        let mut if_node = ScenarioNode::end("2");
        if_node.node_type = NodeType::If;
        if_node.condition = Some("message_index == 1".to_string());
        if_node.children = vec![first];

        let scenario = scenario_with(vec![if_node]);
        let mut state = ConversationState::new("c1");
        state.message_index = 1;
        let tools = ToolRegistry::new();
        let result = run_scenario_map(&scenario, &state, "hi", &tools, &HashMap::new()).await;
        assert_eq!(result.instruction_blocks.len(), 1);
        assert_eq!(result.instruction_blocks[0].text.as_deref(), Some("welcome"));
    }

    #[tokio::test]
    async fn ambiguous_condition_becomes_conditional_block() {
        let mut if_node = ScenarioNode::end("3");
        if_node.node_type = NodeType::If;
        if_node.condition = Some("пользователь упомянул день рождения".to_string());
        if_node.children = vec![ScenarioNode::text("3.1", "Поздравляем с днём рождения!")];

        let scenario = scenario_with(vec![if_node]);
        let state = ConversationState::new("c1");
        let tools = ToolRegistry::new();
        let result = run_scenario_map(&scenario, &state, "hi", &tools, &HashMap::new()).await;
        assert_eq!(result.instruction_blocks.len(), 1);
        assert!(result.instruction_blocks[0].payload.is_some());
    }

    #[tokio::test]
    async fn end_inside_deterministic_if_branch_halts_the_whole_scenario() {
        // `if message_index == 1` resolves deterministically to `true` here,
        // and its chosen branch ends with `end`. That `end` must stop the
        // enclosing top-level sequence too, so the sibling `text` node after
        // the `if` must never run.
        let mut if_node = ScenarioNode::end("1");
        if_node.node_type = NodeType::If;
        if_node.condition = Some("message_index == 1".to_string());
        if_node.children = vec![ScenarioNode::text("1.1", "welcome"), ScenarioNode::end("1.2")];

        let after = ScenarioNode::text("2", "should not run");

        let scenario = scenario_with(vec![if_node, after]);
        let mut state = ConversationState::new("c1");
        state.message_index = 1;
        let tools = ToolRegistry::new();
        let result = run_scenario_map(&scenario, &state, "hi", &tools, &HashMap::new()).await;
        assert_eq!(result.instruction_blocks.len(), 1);
        assert_eq!(result.instruction_blocks[0].text.as_deref(), Some("welcome"));
    }

    #[tokio::test]
    async fn apply_only_message_index_gates_scenario() {
        let mut scenario = scenario_with(vec![ScenarioNode::text("1", "hi")]);
        scenario.meta.insert("apply_only_message_index".to_string(), serde_json::json!(5));
        let mut state = ConversationState::new("c1");
        state.message_index = 1;
        let tools = ToolRegistry::new();
        let result = run_scenario_map(&scenario, &state, "hi", &tools, &HashMap::new()).await;
        assert!(result.instruction_blocks.is_empty());
    }
}
