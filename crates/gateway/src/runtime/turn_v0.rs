//! Turn Pipeline v0.1: the linear, pre-map/reduce predecessor of
//! [`crate::runtime::turn`]. Still reachable via `X-Agent-Pipeline-Version:
//! 0.1` (and the runtime default), so it is kept fully implemented rather
//! than retired — a host that cannot serve v0.1 cannot honor its own
//! `/chat` contract.
//!
//! Scenarios only run on a conversation's first message; each enabled
//! scenario renders straight into a YAML-like `special_instructions` block
//! and the generating LLM performs the true/false/ignore decision inline
//! during generation, instead of a dedicated decide step. There is no
//! judge/revise loop: one `chat` call produces the answer.

use sa_domain::model::{
    ConversationState, HistoryItem, MessageRole, NodeType, ScenarioDefinition, ScenarioNode,
};
use sa_providers::{ChatMessage, ModelRole};

use crate::runtime::apology::apology_for;
use crate::runtime::cancel::CancelToken;
use crate::runtime::turn::TurnOutput;
use crate::scenario_engine::template::render_template;
use crate::state::AppState;

const DIALOG_TAIL_LEN: usize = 3;

const BIRTHDAY_TRIGGERS: &[&str] = &[
    "день рождения",
    "днём рождения",
    "с днем рождения",
    "с днём рождения",
    "днюха",
    "днюху",
    "у меня др",
    "мой др",
    "сегодня др",
    "сегодня день рождения",
    " др ",
    " др.",
    " др,",
    "др ",
    "др.",
    "др,",
    "др?",
    "годиков",
    "исполнилось",
    "исполнится",
];

pub async fn run_turn_v0_1(
    state: &AppState,
    conversation_id: &str,
    user_message: &str,
    cancel: &CancelToken,
) -> sa_domain::error::Result<TurnOutput> {
    let mut conv_state = state.memory.get_state(conversation_id).await?;
    conv_state.message_index += 1;
    conv_state.summary = state.memory.get_summary(conversation_id).await.unwrap_or_default();

    if conv_state.message_index == 1
        && (conv_state.user_profile.name.is_none() || conv_state.user_profile.age.is_none())
    {
        let value = state.tools.call("get_user_data").await;
        if let Some(name) = value.get("name").and_then(|v| v.as_str()) {
            conv_state.user_profile.name = Some(name.to_string());
        }
        if let Some(age) = value.get("age").and_then(|v| v.as_i64()) {
            conv_state.user_profile.age = Some(age);
        }
    }

    state
        .memory
        .append_history(conversation_id, HistoryItem::new(MessageRole::User, user_message))
        .await?;

    if cancel.is_cancelled() {
        return Err(sa_domain::error::Error::Other("turn cancelled".into()));
    }

    let chunks = state.retrieval.search(user_message).await;

    let mut scenario_context_parts = Vec::new();
    let mut applied_scenarios = Vec::new();

    let mut scenarios: Vec<ScenarioDefinition> = state.scenarios.all().into_values().collect();
    scenarios.sort_by(|a, b| a.name.cmp(&b.name));

    for scenario in &scenarios {
        if !scenario.enabled {
            continue;
        }
        if let Some(text) = render_scenario(scenario, &conv_state, user_message) {
            scenario_context_parts.push(text);
            applied_scenarios.push(scenario.name.clone());
        }
    }

    let scenario_context = scenario_context_parts.join("\n\n");
    let history = state.memory.get_history(conversation_id, None).await?;

    let system_prompt = build_system_prompt(&conv_state, &history, &scenario_context, &chunks, user_message);
    let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(user_message.to_string())];

    let answer = match state.llm.chat(&messages, 0.2, ModelRole::Generate, None).await {
        Ok(text) => text,
        Err(e) => apology_for(&e),
    };

    state
        .memory
        .append_history(conversation_id, HistoryItem::new(MessageRole::Assistant, answer.clone()))
        .await?;
    let now = chrono::Utc::now();
    conv_state.scenario_runs.extend(applied_scenarios.iter().map(|name| sa_domain::model::ScenarioRun {
        name: name.clone(),
        at_message_index: conv_state.message_index,
        ts: now,
    }));
    state.memory.save_state(&conv_state).await?;

    crate::runtime::summarizer::launch_summary(state.clone(), conversation_id.to_string());

    Ok(TurnOutput {
        conversation_id: conversation_id.to_string(),
        answer,
        chunks,
        last_step_scenario: applied_scenarios.join(", "),
    })
}

/// Render one scenario into its `special_instructions` text block, or
/// `None` if it produced nothing (gated out, or no text/if nodes at all).
fn render_scenario(scenario: &ScenarioDefinition, state: &ConversationState, user_message: &str) -> Option<String> {
    if state.message_index != 1 {
        return None;
    }

    let name_lower = scenario.name.to_lowercase();
    if name_lower.contains("дню рожд") || name_lower.contains("день рожд") {
        let text_lower = user_message.to_lowercase();
        if !BIRTHDAY_TRIGGERS.iter().any(|t| text_lower.contains(t)) {
            return None;
        }
    }

    let facts = user_data_facts(state);

    let mut nodes: Vec<&ScenarioNode> = scenario.code.iter().collect();
    nodes.sort_by_key(|n| n.sort_key());

    let mut text_blocks = Vec::new();
    let mut conditional_blocks = Vec::new();

    for node in nodes {
        match node.node_type {
            NodeType::End => break,
            NodeType::Tool => continue,
            NodeType::Text => {
                if let Some(text) = &node.text {
                    text_blocks.push(render_template(text, &facts, state));
                }
            }
            NodeType::If => {
                let when_true: Vec<String> = node
                    .children
                    .iter()
                    .filter(|c| c.node_type == NodeType::Text)
                    .filter_map(|c| c.text.as_deref())
                    .map(|t| render_template(t, &facts, state))
                    .collect();
                let when_false: Vec<String> = node
                    .else_children
                    .iter()
                    .filter(|c| c.node_type == NodeType::Text)
                    .filter_map(|c| c.text.as_deref())
                    .map(|t| render_template(t, &facts, state))
                    .collect();
                conditional_blocks.push((node.condition.clone().unwrap_or_default(), when_true, when_false));
            }
        }
    }

    if text_blocks.is_empty() && conditional_blocks.is_empty() {
        return None;
    }

    Some(render_special_instructions(&text_blocks, &conditional_blocks, user_message))
}

fn user_data_facts(state: &ConversationState) -> std::collections::HashMap<String, serde_json::Value> {
    let mut facts = std::collections::HashMap::new();
    facts.insert(
        "tool:get_user_data".to_string(),
        serde_json::json!({"name": state.user_profile.name, "age": state.user_profile.age}),
    );
    facts
}

fn render_special_instructions(
    text_blocks: &[String],
    conditional_blocks: &[(String, Vec<String>, Vec<String>)],
    user_message: &str,
) -> String {
    let mut lines = Vec::new();
    lines.push("instructions: |".to_string());
    lines.push("  special_instructions описывает дополнительные сценарные указания.".to_string());
    lines.push("  - blocks: список обязательных текстов-инструкций, которые нужно учитывать при формировании ответа.".to_string());
    lines.push("  - blocks_with_conditions: список условных блоков, которые применяются только если тема условия явно присутствует в сообщении пользователя.".to_string());

    if !text_blocks.is_empty() {
        lines.push("blocks:".to_string());
        for text in text_blocks {
            lines.push("  - text: |".to_string());
            for line in text.lines() {
                lines.push(format!("      {line}"));
            }
        }
    }

    if !conditional_blocks.is_empty() {
        lines.push("blocks_with_conditions:".to_string());
        for (condition, when_true, when_false) in conditional_blocks {
            lines.push("  - condition:".to_string());
            lines.push(format!("      description: \"{condition}\""));
            lines.push(format!("      user_message: \"{user_message}\""));
            lines.push("    when_true:".to_string());
            lines.push("      texts:".to_string());
            if when_true.is_empty() {
                lines.push("        # нет текстов для ветки when_true".to_string());
            } else {
                for text in when_true {
                    lines.push(format!("        - \"{text}\""));
                }
            }
            lines.push("    when_false:".to_string());
            lines.push("      texts:".to_string());
            if when_false.is_empty() {
                lines.push("        # нет текстов для ветки when_false".to_string());
            } else {
                for text in when_false {
                    lines.push(format!("        - \"{text}\""));
                }
            }
        }
    }

    lines.join("\n")
}

fn build_system_prompt(
    state: &ConversationState,
    history: &[HistoryItem],
    special_instructions: &str,
    chunks: &[sa_domain::model::Chunk],
    user_message: &str,
) -> String {
    let mut out = String::new();

    out.push_str(
        "Ты — агент технической поддержки. Отвечай только на основе поля context и, при наличии, \
         special_instructions. Приоритет источников (от более важного к менее важному): 1) context, \
         2) special_instructions, 3) dialog_summary и dialog_tail. Не считай свои прошлые ответы из \
         dialog_tail более достоверными, чем context или special_instructions. Не используй внешний \
         мир или общие знания вне того, что явно дано в этом промпте. Если context пустой, \
         недостаточный или нерелевантный — честно напиши, что не нашёл точного ответа и предложи \
         эскалацию специалисту или переформулировку вопроса. Отвечай на русском языке, дружелюбно и \
         профессионально, без эмодзи. Не раскрывай ход рассуждений. Если message_index равен 1 — \
         поздоровайся, иначе продолжай диалог без приветствия.\n\n",
    );

    out.push_str(&format!(
        "dialog_params: message_index={}, name={:?}, age={:?}\n\n",
        state.message_index, state.user_profile.name, state.user_profile.age
    ));

    out.push_str(&format!("dialog_summary: {}\n\n", state.summary));

    let tail_start = history.len().saturating_sub(1).saturating_sub(DIALOG_TAIL_LEN);
    let tail_end = history.len().saturating_sub(1).max(tail_start);
    out.push_str("dialog_tail:\n");
    if tail_start >= tail_end {
        out.push_str("  (нет предыдущих сообщений)\n");
    } else {
        for item in &history[tail_start..tail_end] {
            out.push_str(&format!("  - {:?}: {}\n", item.role, item.content));
        }
    }
    out.push('\n');

    out.push_str("context:\n");
    if chunks.is_empty() {
        out.push_str("  Релевантных фрагментов базы знаний не найдено.\n\n");
    } else {
        for (i, chunk) in chunks.iter().enumerate() {
            out.push_str(&format!("  [{}] {}\n", i + 1, chunk.text));
        }
        out.push('\n');
    }

    out.push_str("special_instructions:\n");
    if special_instructions.is_empty() {
        out.push_str("  (нет)\n\n");
    } else {
        out.push_str(special_instructions);
        out.push_str("\n\n");
    }

    out.push_str(&format!("new_user_message: {user_message}\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn scenario(name: &str, code: Vec<ScenarioNode>) -> ScenarioDefinition {
        ScenarioDefinition { name: name.to_string(), code, meta: HashMap::new(), enabled: true, summary: None, admin_message: None }
    }

    #[test]
    fn scenario_skipped_after_first_message() {
        let mut state = ConversationState::new("c1");
        state.message_index = 2;
        let scn = scenario("greeting", vec![ScenarioNode::text("1", "hello")]);
        assert!(render_scenario(&scn, &state, "hi").is_none());
    }

    #[test]
    fn birthday_scenario_requires_trigger_phrase() {
        let mut state = ConversationState::new("c1");
        state.message_index = 1;
        let scn = scenario("день рождения", vec![ScenarioNode::text("1", "Congrats")]);
        assert!(render_scenario(&scn, &state, "как дела?").is_none());
        assert!(render_scenario(&scn, &state, "у меня др сегодня").is_some());
    }

    #[test]
    fn renders_text_block_into_special_instructions() {
        let mut state = ConversationState::new("c1");
        state.message_index = 1;
        let scn = scenario("info", vec![ScenarioNode::text("1", "Важная инструкция")]);
        let rendered = render_scenario(&scn, &state, "hi").unwrap();
        assert!(rendered.contains("Важная инструкция"));
        assert!(rendered.contains("blocks:"));
    }

    #[test]
    fn apology_mentions_rate_limit_reason() {
        let err = sa_domain::error::Error::UpstreamLlm {
            kind: sa_domain::error::UpstreamLlmErrorKind::RateLimit,
            message: "429 too many requests".to_string(),
        };
        assert!(apology_for(&err).contains("лимитов"));
    }
}
