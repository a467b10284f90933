//! `{=EXPR=}` placeholder substitution, grounded in
//! `scenario_engine.py`/`scenario_runner_v0_1.py`'s shared `_render_template`.
//!
//! Two closed namespaces are understood: `@tool[.field]` (a fact cached
//! under `"tool:<tool>"` in the map's fact table) and `dialog.{name,age,
//! message_index}` (read straight off `ConversationState`). Anything else
//! — an unknown tool, a missing field, a malformed expression — resolves to
//! the literal string `"finderror"` rather than failing the turn.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use sa_domain::model::ConversationState;

const UNRESOLVED: &str = "finderror";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{=(.*?)=\}").unwrap())
}

/// Render every `{=EXPR=}` placeholder in `text` against the scenario map's
/// fact table and the conversation state.
pub fn render_template(text: &str, facts: &HashMap<String, Value>, state: &ConversationState) -> String {
    placeholder_re()
        .replace_all(text, |caps: &regex::Captures| eval_expr(caps[1].trim(), facts, state))
        .into_owned()
}

fn eval_expr(expr: &str, facts: &HashMap<String, Value>, state: &ConversationState) -> String {
    if let Some(rest) = expr.strip_prefix('@') {
        let (tool, field) = match rest.split_once('.') {
            Some((t, f)) => (t, Some(f)),
            None => (rest, None),
        };
        let Some(value) = facts.get(&format!("tool:{tool}")) else {
            return UNRESOLVED.to_string();
        };
        return match field {
            None => value_to_string(value),
            Some(f) => value.get(f).map(value_to_string).unwrap_or_else(|| UNRESOLVED.to_string()),
        };
    }

    if let Some(field) = expr.strip_prefix("dialog.") {
        return match field {
            "name" => state.user_profile.name.clone().unwrap_or_else(|| UNRESOLVED.to_string()),
            "age" => state.user_profile.age.map(|a| a.to_string()).unwrap_or_else(|| UNRESOLVED.to_string()),
            "message_index" => state.message_index.to_string(),
            _ => UNRESOLVED.to_string(),
        };
    }

    UNRESOLVED.to_string()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => UNRESOLVED.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::ConversationState;

    fn facts_with(tool: &str, value: Value) -> HashMap<String, Value> {
        let mut facts = HashMap::new();
        facts.insert(format!("tool:{tool}"), value);
        facts
    }

    #[test]
    fn renders_tool_field_reference() {
        let facts = facts_with("get_user_data", serde_json::json!({"name": "Иван Петров"}));
        let state = ConversationState::new("c1");
        assert_eq!(render_template("Привет, {=@get_user_data.name=}!", &facts, &state), "Привет, Иван Петров!");
    }

    #[test]
    fn renders_dialog_message_index() {
        let mut state = ConversationState::new("c1");
        state.message_index = 3;
        assert_eq!(render_template("{=dialog.message_index=}", &HashMap::new(), &state), "3");
    }

    #[test]
    fn unknown_tool_resolves_to_finderror() {
        let state = ConversationState::new("c1");
        assert_eq!(render_template("{=@missing.field=}", &HashMap::new(), &state), "finderror");
    }

    #[test]
    fn unset_dialog_name_resolves_to_finderror() {
        let state = ConversationState::new("c1");
        assert_eq!(render_template("{=dialog.name=}", &HashMap::new(), &state), "finderror");
    }

    #[test]
    fn multiple_placeholders_in_one_text() {
        let facts = facts_with("get_user_data", serde_json::json!({"name": "Мария"}));
        let mut state = ConversationState::new("c1");
        state.message_index = 1;
        let out = render_template("{=@get_user_data.name=}, сообщение №{=dialog.message_index=}", &facts, &state);
        assert_eq!(out, "Мария, сообщение №1");
    }
}
