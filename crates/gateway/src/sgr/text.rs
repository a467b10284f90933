//! Text-cleaning and gating helpers shared by every SGR step, grounded in
//! `langchain_chain/pipeline.py`'s free functions of the same names.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

fn emoji_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!("[", "\u{1F300}-\u{1FAFF}", "\u{2700}-\u{27BF}", "\u{2600}-\u{26FF}", "]+")).unwrap()
    })
}

fn template_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{=([^=]+)=\}").unwrap())
}

fn condition_check_verb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(определ|провер|выясн|убед|понят)").unwrap())
}

fn how_to_determine_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)как\s+(определ|провер|понят)").unwrap())
}

fn birthday_yesno_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(сегодня|ваш|у вас).*день рождения").unwrap())
}

fn tool_question_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)какой\s+инструмент|какой\s+метод|как\s+получить").unwrap())
}

pub fn strip_emojis(text: &str) -> String {
    emoji_re().replace_all(text, "").into_owned()
}

/// Normalizes whitespace, strips code fences and emojis — mirrors
/// `_clean_text`.
pub fn clean_text(text: &str) -> String {
    let t = text.replace("\r\n", "\n");
    let t = t.trim();
    let t = t.replace("```", "");
    let t = strip_emojis(t.trim());
    let t = Regex::new(r"[ \t]+").unwrap().replace_all(&t, " ").into_owned();
    let t = Regex::new(r"\n{3,}").unwrap().replace_all(&t, "\n\n").into_owned();
    t.trim().to_string()
}

/// `{=@tool.field=}`/`{=@tool=}` references in `text`, tool name only.
pub fn extract_tool_refs(text: &str) -> Vec<String> {
    template_ref_re()
        .captures_iter(text)
        .filter_map(|c| {
            let expr = c.get(1)?.as_str().trim();
            let inner = expr.strip_prefix('@')?;
            let tool_name = inner.split('.').next()?.trim();
            (!tool_name.is_empty()).then(|| tool_name.to_string())
        })
        .collect()
}

/// True when `text` reads as a meta-check ("is today X's birthday?") that
/// the engine already performs by evaluating the condition, not as an
/// actionable instruction.
pub fn looks_like_condition_check_intent(text: &str) -> bool {
    let t = text.to_lowercase();
    if t.is_empty() || !condition_check_verb_re().is_match(&t) {
        return false;
    }
    if t.contains("является ли") {
        return true;
    }
    if t.contains("сегодня") && (t.contains("день рождения") || t.contains("др")) {
        return true;
    }
    if t.contains("дата") && (t.contains("сегодня") || t.contains("текущ")) {
        return true;
    }
    false
}

/// Drops meta "how do I check" and tool-requesting questions, and
/// deduplicates — mirrors `_filter_questions`.
pub fn filter_questions(questions: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for q in questions {
        let cleaned = clean_text(q);
        if cleaned.is_empty() {
            continue;
        }
        let low = cleaned.to_lowercase();
        if how_to_determine_re().is_match(&low) {
            continue;
        }
        if birthday_yesno_re().is_match(&low) {
            continue;
        }
        if tool_question_re().is_match(&low) {
            continue;
        }
        if seen.insert(cleaned.clone()) {
            out.push(cleaned);
        }
    }
    out
}

/// True when the author's own text spells out an explicit no-op else
/// branch ("иначе ничего не делай") — mirrors `_text_has_explicit_noop_else`.
pub fn text_has_explicit_noop_else(text: &str) -> bool {
    let t = text.to_lowercase();
    let has_else_marker =
        t.contains("иначе") || t.contains("а если") || t.contains("если нет") || t.contains("если не");
    if has_else_marker && t.contains("ничего") {
        return true;
    }
    if t.contains("ничего не") && (t.contains("говор") || t.contains("дел") || t.contains("добав")) {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_fences_and_collapses_whitespace() {
        let cleaned = clean_text("```\nHello   world\n\n\n\nagain```");
        assert_eq!(cleaned, "Hello world\n\nagain");
    }

    #[test]
    fn extract_tool_refs_picks_up_tool_name_before_dot() {
        let refs = extract_tool_refs("Привет, {=@get_user_data.name=}! {=@other_tool=}");
        assert_eq!(refs, vec!["get_user_data", "other_tool"]);
    }

    #[test]
    fn looks_like_condition_check_intent_flags_birthday_meta_check() {
        assert!(looks_like_condition_check_intent("Определить, является ли сегодня день рождения пользователя"));
        assert!(!looks_like_condition_check_intent("Поздравь пользователя с днём рождения"));
    }

    #[test]
    fn filter_questions_drops_meta_and_tool_questions_and_dedupes() {
        let qs = vec![
            "Как определить день рождения?".to_string(),
            "Какой инструмент использовать?".to_string(),
            "Как зовут пользователя?".to_string(),
            "Как зовут пользователя?".to_string(),
        ];
        let out = filter_questions(&qs);
        assert_eq!(out, vec!["Как зовут пользователя?".to_string()]);
    }

    #[test]
    fn text_has_explicit_noop_else_detects_common_phrasing() {
        assert!(text_has_explicit_noop_else("Иначе ничего не делай"));
        assert!(!text_has_explicit_noop_else("Иначе предложи скидку"));
    }
}
