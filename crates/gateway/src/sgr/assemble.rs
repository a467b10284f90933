//! Deterministic scenario assembly — no LLM call. Ported field-for-field
//! from `_assemble_scenario` in `langchain_chain/pipeline.py`: its exact
//! integer/dotted-integer id-numbering scheme is load-bearing, since
//! `ScenarioNode::sort_key` and the Scenario Engine both order nodes by it.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use sa_domain::model::{NodeType, ScenarioDefinition, ScenarioNode};

use super::models::{Step2GateAndCritique, Step3ToolsAndTemplates, TemplateTarget};

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn scenario_name(name_hint: Option<&str>, input_text: &str, trace_id: &str) -> String {
    if let Some(hint) = name_hint {
        let hint = hint.trim();
        if !hint.is_empty() {
            return hint.to_string();
        }
    }
    let base = input_text.trim();
    if !base.is_empty() {
        let collapsed = whitespace_re().replace_all(base, " ").into_owned();
        return collapsed.chars().take(72).collect();
    }
    format!("sgr:{trace_id}")
}

/// One or more atomic `text` nodes under `parent_id.branch_index[.n]`,
/// splitting multi-line instructions into separate nodes — mirrors
/// `_atomic_text_nodes`.
fn atomic_text_nodes(parent_id: &str, branch_index: u32, texts: &[String]) -> Vec<ScenarioNode> {
    let mut cleaned = Vec::new();
    for t in texts {
        for line in t.lines() {
            let line = line.trim();
            if !line.is_empty() {
                cleaned.push(line.to_string());
            }
        }
    }
    if cleaned.is_empty() {
        return Vec::new();
    }
    if cleaned.len() == 1 {
        return vec![ScenarioNode::text(format!("{parent_id}.{branch_index}"), cleaned.into_iter().next().unwrap())];
    }
    cleaned
        .into_iter()
        .enumerate()
        .map(|(i, txt)| ScenarioNode::text(format!("{parent_id}.{branch_index}.{}", i + 1), txt))
        .collect()
}

fn append_text_nodes(code: &mut Vec<ScenarioNode>, next_id: &mut i64, text: &str) {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        code.push(ScenarioNode::text(next_id.to_string(), line.to_string()));
        *next_id += 1;
    }
}

pub fn assemble_scenario(
    trace_id: &str,
    input_text: &str,
    name_hint: Option<&str>,
    strict: bool,
    step2: &Step2GateAndCritique,
    step3: &Step3ToolsAndTemplates,
) -> Result<ScenarioDefinition, String> {
    let intent_by_id: HashMap<&str, &super::models::Intent> =
        step2.intents.iter().map(|i| (i.id.as_str(), i)).collect();

    let mut seen_tools = HashSet::new();
    let tools_to_call: Vec<&str> = step3
        .tools_to_call
        .iter()
        .map(String::as_str)
        .filter(|t| seen_tools.insert(*t))
        .collect();

    let templates_global: Vec<_> = step3.templates.iter().filter(|t| t.target == TemplateTarget::Global).collect();
    let templates_then: Vec<_> = step3.templates.iter().filter(|t| t.target == TemplateTarget::ConditionThen).collect();
    let templates_else: Vec<_> = step3.templates.iter().filter(|t| t.target == TemplateTarget::ConditionElse).collect();

    let mut code: Vec<ScenarioNode> = Vec::new();
    let mut next_id: i64 = 1;

    for tool_name in &tools_to_call {
        code.push(ScenarioNode::tool(next_id.to_string(), (*tool_name).to_string()));
        next_id += 1;
    }

    for iid in &step2.unconditional_intents {
        if let Some(intent) = intent_by_id.get(iid.as_str()) {
            let text = intent.text.trim();
            if !text.is_empty() {
                append_text_nodes(&mut code, &mut next_id, text);
            }
        }
    }

    for t in &templates_global {
        let text = t.text.trim();
        if !text.is_empty() {
            append_text_nodes(&mut code, &mut next_id, text);
        }
    }

    for cond in &step2.conditions {
        let parent_id = next_id.to_string();
        next_id += 1;

        let condition_text = cond.condition_text.trim();
        if condition_text.is_empty() {
            return Err(format!("condition {} has empty condition_text", cond.id));
        }

        let mut then_texts: Vec<String> = Vec::new();
        for iid in &cond.then_intents {
            if let Some(intent) = intent_by_id.get(iid.as_str()) {
                let text = intent.text.trim();
                if !text.is_empty() {
                    then_texts.push(text.to_string());
                }
            }
        }
        for t in &templates_then {
            if t.condition_id.as_deref() == Some(cond.id.as_str()) {
                let text = t.text.trim();
                if !text.is_empty() {
                    then_texts.push(text.to_string());
                }
            }
        }

        let mut else_texts: Vec<String> = Vec::new();
        for iid in &cond.else_intents {
            if let Some(intent) = intent_by_id.get(iid.as_str()) {
                let text = intent.text.trim();
                if !text.is_empty() {
                    else_texts.push(text.to_string());
                }
            }
        }
        for t in &templates_else {
            if t.condition_id.as_deref() == Some(cond.id.as_str()) {
                let text = t.text.trim();
                if !text.is_empty() {
                    else_texts.push(text.to_string());
                }
            }
        }

        let children = atomic_text_nodes(&parent_id, 1, &then_texts);
        if children.is_empty() && strict {
            return Err(format!("condition {} has no then-actions (then_intents/templates empty)", cond.id));
        }

        let else_children =
            if !else_texts.is_empty() { atomic_text_nodes(&parent_id, 2, &else_texts) } else { Vec::new() };

        code.push(ScenarioNode {
            id: parent_id,
            node_type: NodeType::If,
            text: None,
            tool: None,
            condition: Some(condition_text.to_string()),
            children,
            else_children,
        });
    }

    code.push(ScenarioNode::end(next_id.to_string()));

    Ok(ScenarioDefinition {
        name: scenario_name(name_hint, input_text, trace_id),
        code,
        meta: HashMap::new(),
        enabled: true,
        summary: None,
        admin_message: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::models::{Condition, Intent, Template};

    fn step2(intents: Vec<Intent>, unconditional: Vec<&str>, conditions: Vec<Condition>) -> Step2GateAndCritique {
        Step2GateAndCritique {
            intents,
            unconditional_intents: unconditional.into_iter().map(String::from).collect(),
            conditions,
            questions: vec![],
        }
    }

    #[test]
    fn unconditional_intent_becomes_text_node_after_tools() {
        let step2 = step2(vec![Intent { id: "i1".into(), text: "Скажи привет".into() }], vec!["i1"], vec![]);
        let step3 = Step3ToolsAndTemplates { tools_to_call: vec!["get_user_data".into()], ..Default::default() };
        let scenario = assemble_scenario("t1", "текст", None, true, &step2, &step3).unwrap();
        assert_eq!(scenario.code[0].node_type, NodeType::Tool);
        assert_eq!(scenario.code[0].id, "1");
        assert_eq!(scenario.code[1].node_type, NodeType::Text);
        assert_eq!(scenario.code[1].text.as_deref(), Some("Скажи привет"));
        assert_eq!(scenario.code.last().unwrap().node_type, NodeType::End);
    }

    #[test]
    fn condition_without_then_actions_fails_in_strict_mode() {
        let step2 = step2(
            vec![],
            vec![],
            vec![Condition { id: "c1".into(), condition_text: "Пользователь написал привет".into(), then_intents: vec![], else_intents: vec![] }],
        );
        let step3 = Step3ToolsAndTemplates::default();
        assert!(assemble_scenario("t1", "если привет, поздоровайся", None, true, &step2, &step3).is_err());
        assert!(assemble_scenario("t1", "если привет, поздоровайся", None, false, &step2, &step3).is_ok());
    }

    #[test]
    fn condition_with_then_and_else_produces_if_node_with_both_branches() {
        let step2 = step2(
            vec![Intent { id: "i1".into(), text: "Поздравь с днём рождения".into() }, Intent { id: "i2".into(), text: "Предложи скидку".into() }],
            vec![],
            vec![Condition {
                id: "c1".into(),
                condition_text: "Сегодня день рождения пользователя".into(),
                then_intents: vec!["i1".into()],
                else_intents: vec!["i2".into()],
            }],
        );
        let step3 = Step3ToolsAndTemplates::default();
        let scenario = assemble_scenario("t1", "если др то поздравь иначе предложи скидку", None, true, &step2, &step3).unwrap();
        let if_node = scenario.code.iter().find(|n| n.node_type == NodeType::If).unwrap();
        assert_eq!(if_node.condition.as_deref(), Some("Сегодня день рождения пользователя"));
        assert_eq!(if_node.children.len(), 1);
        assert_eq!(if_node.else_children.len(), 1);
    }

    #[test]
    fn template_with_missing_condition_text_is_rejected() {
        let step2 = step2(vec![], vec![], vec![Condition { id: "c1".into(), condition_text: "  ".into(), then_intents: vec![], else_intents: vec![] }]);
        let step3 = Step3ToolsAndTemplates::default();
        assert!(assemble_scenario("t1", "x", None, true, &step2, &step3).is_err());
    }

    #[test]
    fn name_hint_wins_over_derived_name() {
        let step2 = step2(vec![], vec![], vec![]);
        let step3 = Step3ToolsAndTemplates { tools_to_call: vec![], missing_tools: vec![], templates: vec![], questions: vec![] };
        let scenario = assemble_scenario("t1", "длинный текст сценария", Some("my-scenario"), true, &step2, &step3).unwrap();
        assert_eq!(scenario.name, "my-scenario");
    }

    #[test]
    fn template_global_unused_warning_suppressed_when_none() {
        // Template wiring: a global template with no condition_id renders as a plain text node.
        let step2 = step2(vec![], vec![], vec![]);
        let step3 = Step3ToolsAndTemplates {
            tools_to_call: vec![],
            missing_tools: vec![],
            templates: vec![Template { id: "t1".into(), target: TemplateTarget::Global, condition_id: None, text: "Привет, {=dialog.name=}!".into(), depends_on_tool: None }],
            questions: vec![],
        };
        let scenario = assemble_scenario("t1", "x", None, true, &step2, &step3).unwrap();
        assert!(scenario.code.iter().any(|n| n.text.as_deref() == Some("Привет, {=dialog.name=}!")));
    }
}
