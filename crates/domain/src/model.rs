//! Shared data model (§3): conversation state, history, scenarios, and the
//! per-turn instruction blocks the Scenario Engine produces.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────
// Conversation state & history
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub birthday_date: Option<String>,
}

/// Audit entry recorded every time a scenario actually ran for a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub name: String,
    pub at_message_index: u64,
    pub ts: DateTime<Utc>,
}

/// Per-conversation state. Created on first access, never deleted by the
/// core. `message_index` is incremented exactly once per user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    #[serde(default)]
    pub message_index: u64,
    #[serde(default)]
    pub user_profile: UserProfile,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub scenario_runs: Vec<ScenarioRun>,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_index: 0,
            user_profile: UserProfile::default(),
            summary: String::new(),
            scenario_runs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryItem {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Retrieval
// ─────────────────────────────────────────────────────────────────────

/// Opaque payload from the retrieval service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub score: Option<f64>,
}

// ─────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Text,
    Tool,
    If,
    End,
}

/// A single node in a scenario's code tree. `children`/`else_children` make
/// this recursive: an `if` node's branches are themselves node sequences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub children: Vec<ScenarioNode>,
    #[serde(default)]
    pub else_children: Vec<ScenarioNode>,
}

impl ScenarioNode {
    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::Text,
            text: Some(text.into()),
            tool: None,
            condition: None,
            children: Vec::new(),
            else_children: Vec::new(),
        }
    }

    pub fn tool(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::Tool,
            text: None,
            tool: Some(tool.into()),
            condition: None,
            children: Vec::new(),
            else_children: Vec::new(),
        }
    }

    pub fn end(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::End,
            text: None,
            tool: None,
            condition: None,
            children: Vec::new(),
            else_children: Vec::new(),
        }
    }

    /// Sort key for lexicographic ordering on the dotted-integer id
    /// (`"1.2.10"` sorts after `"1.2.9"`, never as a string).
    pub fn sort_key(&self) -> Vec<i64> {
        sort_key(&self.id)
    }
}

/// Parse a dotted-number id (`"2.1"`) into an integer tuple for ordering.
/// Non-numeric segments sort as 0, mirroring the original's tolerant parse.
pub fn sort_key(id: &str) -> Vec<i64> {
    id.split('.').map(|p| p.parse::<i64>().unwrap_or(0)).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub name: String,
    #[serde(default)]
    pub code: Vec<ScenarioNode>,
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub admin_message: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ScenarioDefinition {
    /// `meta.apply_only_message_index`, if present, gates execution of the
    /// whole scenario to a single user-message index.
    pub fn apply_only_message_index(&self) -> Option<u64> {
        self.meta
            .get("apply_only_message_index")
            .and_then(|v| v.as_u64())
    }

    /// Whether this scenario's code tree contains at least one `if` node,
    /// recursively. Used by the summarize-to-imperatives enable policy
    /// (§4.6.5) to tell a scenario with no conditions at all — which always
    /// summarizes as-is — from one whose only conditions were decided
    /// `ignore` — which is discarded entirely.
    pub fn has_condition_nodes(&self) -> bool {
        fn any_if(nodes: &[ScenarioNode]) -> bool {
            nodes.iter().any(|n| {
                n.node_type == NodeType::If || any_if(&n.children) || any_if(&n.else_children)
            })
        }
        any_if(&self.code)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Per-turn ToolsContext produced by the Scenario Engine
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTarget {
    Agent,
    Judge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Required,
    Conditional,
    Rule,
    Raw,
}

/// Payload carried by a `conditional` block until condition-decide resolves
/// it into `raw`/`required` blocks or discards it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalPayload {
    pub condition: String,
    #[serde(default)]
    pub condition_text: Option<String>,
    #[serde(default)]
    pub when_true: Vec<String>,
    #[serde(default)]
    pub when_false: Vec<String>,
    #[serde(default)]
    pub apply_policy: ApplyPolicy,
}

/// The four gates rendered verbatim into the agent prompt alongside each
/// conditional block (§4.6.4) — fixed Russian instructional text, not
/// booleans. They tell the generating model how to treat the block once
/// the condition has been decided, not whether to decide it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyPolicy {
    #[serde(default = "ApplyPolicy::default_relevance_gate")]
    pub relevance_gate: String,
    #[serde(default = "ApplyPolicy::default_true_gate")]
    pub true_gate: String,
    #[serde(default = "ApplyPolicy::default_false_gate")]
    pub false_gate: String,
    #[serde(default = "ApplyPolicy::default_unknown_gate")]
    pub unknown_gate: String,
}

impl ApplyPolicy {
    pub fn default_relevance_gate() -> String {
        "Если сообщение не относится к теме условия — игнорируй блок полностью.".to_string()
    }

    pub fn default_true_gate() -> String {
        "Считай условие TRUE только если из сообщения явно следует, что условие выполняется."
            .to_string()
    }

    pub fn default_false_gate() -> String {
        "Считай условие FALSE только если из сообщения явно следует, что условие НЕ выполняется, но тема та же."
            .to_string()
    }

    pub fn default_unknown_gate() -> String {
        "Если упомянута тема, но непонятно TRUE/FALSE — не применяй when_false по умолчанию и лучше игнорируй блок."
            .to_string()
    }
}

impl Default for ApplyPolicy {
    fn default() -> Self {
        Self {
            relevance_gate: Self::default_relevance_gate(),
            true_gate: Self::default_true_gate(),
            false_gate: Self::default_false_gate(),
            unknown_gate: Self::default_unknown_gate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionBlock {
    pub id: String,
    pub source: String,
    pub target: BlockTarget,
    pub kind: BlockKind,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub payload: Option<ConditionalPayload>,
}

fn default_priority() -> i32 {
    10
}

impl InstructionBlock {
    pub fn raw_agent(id: impl Into<String>, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: BlockTarget::Agent,
            kind: BlockKind::Raw,
            priority: default_priority(),
            text: Some(text.into()),
            payload: None,
        }
    }

    pub fn required_agent(
        id: impl Into<String>,
        source: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: BlockTarget::Agent,
            kind: BlockKind::Required,
            priority: default_priority(),
            text: Some(text.into()),
            payload: None,
        }
    }

    pub fn rule_judge(id: impl Into<String>, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: BlockTarget::Judge,
            kind: BlockKind::Rule,
            priority: default_priority(),
            text: Some(text.into()),
            payload: None,
        }
    }

    pub fn conditional_agent(
        id: impl Into<String>,
        source: impl Into<String>,
        payload: ConditionalPayload,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: BlockTarget::Agent,
            kind: BlockKind::Conditional,
            priority: default_priority(),
            text: None,
            payload: Some(payload),
        }
    }
}

/// What a scenario applied, surfaced in the turn's response as
/// `last_step_scenario`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedEntry {
    pub kind: String,
    pub name: String,
}

/// Ephemeral per-turn aggregate the Scenario Engine builds and the Turn
/// Pipeline consumes. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsContext {
    /// Facts keyed `"tool:<name>"`.
    #[serde(default)]
    pub facts: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub instruction_blocks: Vec<InstructionBlock>,
    #[serde(default)]
    pub applied: Vec<AppliedEntry>,
}

// ─────────────────────────────────────────────────────────────────────
// Judge
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeAction {
    Pass,
    Revise,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeDecision {
    pub action: JudgeAction,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub patch_instructions: String,
}

// ─────────────────────────────────────────────────────────────────────
// Tool registry
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub output_schema: serde_json::Value,
}

// ─────────────────────────────────────────────────────────────────────
// Condition decide
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionDecision {
    Ignore,
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionDecideResult {
    pub decision: ConditionDecision,
    #[serde(default)]
    pub followup_question: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_orders_numerically_not_lexically() {
        let mut ids = vec!["1.2.10", "1.2.9", "1.1", "2"];
        ids.sort_by_key(|id| sort_key(id));
        assert_eq!(ids, vec!["1.1", "1.2.9", "1.2.10", "2"]);
    }

    #[test]
    fn sort_key_tolerates_non_numeric_segments() {
        assert_eq!(sort_key("a.1"), vec![0, 1]);
    }

    #[test]
    fn conversation_state_new_starts_at_zero() {
        let s = ConversationState::new("c1");
        assert_eq!(s.message_index, 0);
        assert!(s.user_profile.name.is_none());
    }

    #[test]
    fn scenario_definition_reads_apply_only_message_index() {
        let mut def = ScenarioDefinition {
            name: "x".into(),
            code: vec![],
            meta: HashMap::new(),
            enabled: true,
            summary: None,
            admin_message: None,
        };
        assert_eq!(def.apply_only_message_index(), None);
        def.meta.insert("apply_only_message_index".into(), serde_json::json!(1));
        assert_eq!(def.apply_only_message_index(), Some(1));
    }

    #[test]
    fn has_condition_nodes_detects_nested_if() {
        let flat = ScenarioDefinition {
            name: "flat".into(),
            code: vec![ScenarioNode::text("1", "hi")],
            meta: HashMap::new(),
            enabled: true,
            summary: None,
            admin_message: None,
        };
        assert!(!flat.has_condition_nodes());

        let mut nested_if = ScenarioNode::end("2");
        nested_if.node_type = NodeType::If;
        nested_if.condition = Some("x".into());
        let mut outer = ScenarioNode::text("1", "hi");
        outer.node_type = NodeType::Text;
        outer.children = vec![nested_if];
        let branching = ScenarioDefinition {
            name: "branching".into(),
            code: vec![outer],
            meta: HashMap::new(),
            enabled: true,
            summary: None,
            admin_message: None,
        };
        assert!(branching.has_condition_nodes());
    }
}
