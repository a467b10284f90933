//! LLM Gateway (C4): a single capability over an OpenAI-compatible chat
//! endpoint — `chat` (plain text) and `chat_json` (schema-constrained).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sa_domain::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Which per-role model a caller wants resolved (§4.4's six roles).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Generate,
    Condition,
    Judge,
    Revise,
    Summary,
    Sgr,
}

#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Plain-text completion.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        role: ModelRole,
        model_override: Option<&str>,
    ) -> Result<String>;

    /// Schema-constrained completion. Tries strict `json_schema` mode, then
    /// `json_object` mode, then a permissive extraction of the first
    /// `{...}` block from plain text; returns `{}` if nothing parses.
    async fn chat_json(
        &self,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
        schema_name: &str,
        temperature: f32,
        role: ModelRole,
        model_override: Option<&str>,
    ) -> Result<serde_json::Value>;
}

/// Extract the first balanced `{...}` block from arbitrary text — the last
/// rung of `chat_json`'s fallback ladder.
pub fn extract_first_json_object(text: &str) -> Option<serde_json::Value> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    let candidate = std::str::from_utf8(&bytes[start..end]).ok()?;
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_object_embedded_in_prose() {
        let text = r#"Sure, here is the result: {"decision": "true", "extra": {"n": 1}} — hope that helps."#;
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value["decision"], "true");
        assert_eq!(value["extra"]["n"], 1);
    }

    #[test]
    fn ignores_braces_inside_strings_when_matching_depth() {
        let text = r#"{"text": "a { b } c"}"#;
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value["text"], "a { b } c");
    }

    #[test]
    fn returns_none_when_no_object_present() {
        assert!(extract_first_json_object("no json here").is_none());
    }
}
