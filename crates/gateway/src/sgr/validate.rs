//! Static validation ported from `converter.py`: actionable-node checks and
//! template-reference validation against the tools actually registered.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use sa_domain::model::{NodeType, ScenarioNode, ToolSpec};

fn template_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{=([^=]+)=\}").unwrap())
}

fn extract_template_refs(text: &str) -> Vec<String> {
    template_pattern()
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .collect()
}

/// Mirrors `_validate_templates`'s return shape exactly (field names and
/// sorted-list ordering), so it serializes the same way into diagnostics.
#[derive(Debug, Default, Serialize)]
pub struct TemplateRefs {
    pub referenced_tools: Vec<String>,
    pub unknown_tools: Vec<String>,
    pub unknown_fields: Vec<String>,
    pub invalid_expressions: Vec<String>,
}

/// Walks every `text` node's `{=...=}` references and checks them against
/// `available_tools` — mirrors `_validate_templates`.
pub fn validate_templates(code: &[ScenarioNode], available_tools: &[ToolSpec]) -> TemplateRefs {
    let mut referenced_tools = BTreeSet::new();
    let mut unknown_tools = BTreeSet::new();
    let mut unknown_fields = BTreeSet::new();
    let mut invalid_expressions = BTreeSet::new();

    visit_nodes(
        code,
        available_tools,
        &mut referenced_tools,
        &mut unknown_tools,
        &mut unknown_fields,
        &mut invalid_expressions,
    );

    TemplateRefs {
        referenced_tools: referenced_tools.into_iter().collect(),
        unknown_tools: unknown_tools.into_iter().collect(),
        unknown_fields: unknown_fields.into_iter().collect(),
        invalid_expressions: invalid_expressions.into_iter().collect(),
    }
}

fn visit_nodes(
    nodes: &[ScenarioNode],
    available_tools: &[ToolSpec],
    referenced_tools: &mut BTreeSet<String>,
    unknown_tools: &mut BTreeSet<String>,
    unknown_fields: &mut BTreeSet<String>,
    invalid_expressions: &mut BTreeSet<String>,
) {
    for node in nodes {
        if node.node_type == NodeType::Text {
            if let Some(text) = &node.text {
                for expr in extract_template_refs(text) {
                    if let Some(inner) = expr.strip_prefix('@') {
                        let mut parts = inner.splitn(2, '.');
                        let tool_name = parts.next().unwrap_or("").trim().to_string();
                        if tool_name.is_empty() {
                            continue;
                        }
                        referenced_tools.insert(tool_name.clone());
                        let Some(spec) = available_tools.iter().find(|t| t.name == tool_name) else {
                            unknown_tools.insert(tool_name);
                            continue;
                        };
                        if let Some(field) = parts.next() {
                            let field = field.trim();
                            if !field.is_empty() {
                                let known = spec
                                    .output_schema
                                    .get("properties")
                                    .and_then(|p| p.as_object())
                                    .map(|props| props.contains_key(field))
                                    .unwrap_or(false);
                                if !known {
                                    unknown_fields.insert(format!("{tool_name}.{field}"));
                                }
                            }
                        }
                        continue;
                    }
                    if expr.starts_with("dialog.") {
                        continue;
                    }
                    invalid_expressions.insert(expr);
                }
            }
        }
        if node.node_type == NodeType::If {
            visit_nodes(&node.children, available_tools, referenced_tools, unknown_tools, unknown_fields, invalid_expressions);
            visit_nodes(&node.else_children, available_tools, referenced_tools, unknown_tools, unknown_fields, invalid_expressions);
        }
    }
}

/// True when at least one node actually does something — mirrors
/// `_has_actionable_nodes` (an `end` node alone does not count).
pub fn has_actionable_nodes(nodes: &[ScenarioNode]) -> bool {
    nodes
        .iter()
        .any(|n| matches!(n.node_type, NodeType::Text | NodeType::Tool | NodeType::If))
}

/// True when an `if` node exists anywhere in the tree — mirrors
/// `_contains_if`.
pub fn contains_if(nodes: &[ScenarioNode]) -> bool {
    nodes
        .iter()
        .any(|n| n.node_type == NodeType::If || contains_if(&n.children) || contains_if(&n.else_children))
}

/// Mirrors `_validate_scenario_or_raise`: a scenario with no actionable
/// nodes, or one whose input text said "если" (if) without the converter
/// producing an `if` node, is rejected rather than silently accepted.
pub fn validate_scenario_or_raise(code: &[ScenarioNode], input_text: &str) -> Result<(), String> {
    if !has_actionable_nodes(code) {
        return Err("scenario has no actionable nodes (only end or empty actions)".into());
    }
    if input_text.to_lowercase().contains("если") && !contains_if(code) {
        return Err("input contains 'если' but scenario has no if-nodes".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::ScenarioNode;

    fn tool(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.into(),
            description: String::new(),
            input_schema: serde_json::json!({}),
            output_schema: serde_json::json!({"properties": {"name": {"type": "string"}}}),
        }
    }

    #[test]
    fn has_actionable_nodes_rejects_end_only() {
        assert!(!has_actionable_nodes(&[ScenarioNode::end("1")]));
        assert!(has_actionable_nodes(&[ScenarioNode::text("1", "hi")]));
    }

    #[test]
    fn contains_if_finds_nested_condition() {
        let mut outer = ScenarioNode::text("1", "x");
        outer.children = vec![ScenarioNode::text("1.1", "y")];
        assert!(!contains_if(std::slice::from_ref(&outer)));
        let if_node = ScenarioNode {
            id: "2".into(),
            node_type: NodeType::If,
            text: None,
            tool: None,
            condition: Some("c".into()),
            children: vec![],
            else_children: vec![],
        };
        assert!(contains_if(&[if_node]));
    }

    #[test]
    fn validate_templates_flags_unknown_tool_and_field() {
        let code = vec![ScenarioNode::text("1", "Привет, {=@get_user_data.name=}! {=@unknown.x=} {=bad=}")];
        let refs = validate_templates(&code, &[tool("get_user_data")]);
        assert_eq!(refs.referenced_tools, vec!["get_user_data".to_string(), "unknown".to_string()]);
        assert_eq!(refs.unknown_tools, vec!["unknown".to_string()]);
        assert_eq!(refs.unknown_fields, Vec::<String>::new());
        assert_eq!(refs.invalid_expressions, vec!["bad".to_string()]);
    }

    #[test]
    fn validate_scenario_or_raise_requires_if_node_when_input_mentions_uslovie() {
        let code = vec![ScenarioNode::text("1", "hi")];
        assert!(validate_scenario_or_raise(&code, "Если сегодня день рождения, поздравь").is_err());
        assert!(validate_scenario_or_raise(&code, "Поздравь пользователя").is_ok());
    }
}
