//! Summarizer (C8): rebuilds the rolling narrative summary from recent
//! history. Launched fire-and-forget at the end of a turn — a failure here
//! never affects the turn's response.

use serde_json::json;

use sa_domain::model::{HistoryItem, MessageRole};
use sa_domain::trace::TraceEvent;
use sa_providers::{ChatMessage, ModelRole};

use crate::state::AppState;

const MAX_HISTORY_ITEMS: usize = 16;

const SYSTEM_PROMPT: &str = "Ты восстанавливаешь краткое повествование о диалоге с пользователем \
от первого лица помощника, в стиле \"Вы спрашивали …, я объяснил …\". Пиши от 1 до 5 предложений, \
без эмодзи, без указания ролей (\"пользователь:\"/\"ассистент:\"), без персональных данных и без \
цитирования оскорбительного содержания. Верни только итоговое повествование.";

fn summary_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {"summary": {"type": "string"}},
        "required": ["summary"],
        "additionalProperties": false,
    })
}

/// Spawn the summarizer as a detached task against `conversation_id`.
pub fn launch_summary(state: AppState, conversation_id: String) {
    tokio::spawn(async move {
        if let Err(e) = run(&state, &conversation_id).await {
            tracing::warn!(conversation_id = %conversation_id, error = %e, "summarizer failed");
        }
    });
}

async fn run(state: &AppState, conversation_id: &str) -> sa_domain::error::Result<()> {
    let history = state.memory.get_history(conversation_id, Some(MAX_HISTORY_ITEMS)).await?;
    if history.is_empty() {
        return Ok(());
    }

    let transcript = render_transcript(&history);
    let messages = vec![ChatMessage::system(SYSTEM_PROMPT.to_string()), ChatMessage::user(transcript)];

    let value = state
        .llm
        .chat_json(
            &messages,
            &summary_schema(),
            "conversation_summary",
            0.2,
            ModelRole::Summary,
            Some(state.config.llm.summary_model()),
        )
        .await?;

    let summary = value.get("summary").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    if summary.is_empty() {
        return Ok(());
    }

    let mut conv_state = state.memory.get_state(conversation_id).await?;
    conv_state.summary = summary;
    state.memory.save_state(&conv_state).await?;

    TraceEvent::SummaryUpdated { conversation_id: conversation_id.to_string(), history_len: history.len() }.emit();
    Ok(())
}

/// Plain-text transcript for the summarizer prompt. Not role-prefixed in the
/// output summary, but the model needs to see turn order to narrate it.
fn render_transcript(history: &[HistoryItem]) -> String {
    history
        .iter()
        .filter(|item| item.role != MessageRole::System)
        .map(|item| item.content.as_str())
        .collect::<Vec<_>>()
        .join("\n---\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::HistoryItem;

    #[test]
    fn render_transcript_skips_system_items() {
        let history = vec![
            HistoryItem::new(MessageRole::System, "bootstrap"),
            HistoryItem::new(MessageRole::User, "hello"),
            HistoryItem::new(MessageRole::Assistant, "hi there"),
        ];
        let transcript = render_transcript(&history);
        assert!(!transcript.contains("bootstrap"));
        assert!(transcript.contains("hello"));
        assert!(transcript.contains("hi there"));
    }
}
