//! Concrete [`LlmGateway`] over any OpenAI-compatible `/chat/completions`
//! endpoint (OpenRouter in production), grounded in `graph_pipeline.py`'s
//! `_OpenRouterClient` and `openai_compat.rs`'s request-building idiom.
//!
//! Key rotation is per-request: on a 429 the caller advances
//! [`KeyRotator`] and retries with the next key, for up to `key_count`
//! attempts — mirrors `_call_llm_step`'s "retry through every configured
//! key on rate limit, re-raise anything else immediately" policy.

use async_trait::async_trait;
use serde_json::Value;

use sa_domain::error::{Error, Result, UpstreamLlmErrorKind};

use crate::key_rotator::KeyRotator;
use crate::llm_gateway::{extract_first_json_object, ChatMessage, LlmGateway, ModelRole};

pub struct OpenAiGateway {
    client: reqwest::Client,
    base_url: String,
    keys: KeyRotator,
    default_model: String,
}

impl OpenAiGateway {
    pub fn new(base_url: impl Into<String>, keys: Vec<String>, redis_url: &str, default_model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("reqwest client builder never fails with this configuration");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            keys: KeyRotator::new(keys, redis_url),
            default_model: default_model.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn effective_model(&self, model_override: Option<&str>) -> String {
        model_override.map(str::to_string).unwrap_or_else(|| self.default_model.clone())
    }

    fn messages_json(messages: &[ChatMessage]) -> Value {
        Value::Array(
            messages
                .iter()
                .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
                .collect(),
        )
    }

    /// One completion attempt against a single key. Returns the raw
    /// `choices[0].message.content` string.
    async fn call_once(&self, body: &Value, api_key: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url())
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(e.to_string())
                } else {
                    Error::UpstreamLlm { kind: UpstreamLlmErrorKind::Network, message: e.to_string() }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::UpstreamLlm { kind: UpstreamLlmErrorKind::RateLimit, message: "rate limited".into() });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamLlm { kind: UpstreamLlmErrorKind::Auth, message: text });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamLlm { kind: UpstreamLlmErrorKind::Other, message: format!("{status}: {text}") });
        }

        let text = response.text().await.map_err(|e| Error::UpstreamLlm {
            kind: UpstreamLlmErrorKind::Network,
            message: e.to_string(),
        })?;
        let payload: Value = serde_json::from_str(&text)?;
        let content = payload["choices"][0]["message"]["content"].as_str().unwrap_or("").to_string();
        Ok(content)
    }

    /// Run `call_once`, advancing through every configured key whenever the
    /// upstream answers 429. Any other error is propagated immediately.
    async fn call_with_rotation(&self, body: &Value) -> Result<String> {
        let attempts = self.keys.effective_len().await.max(1);
        let mut last_err: Option<Error> = None;

        for _ in 0..attempts {
            let Some(key) = self.keys.current_key().await else {
                return Err(Error::Auth("no LLM API key configured".into()));
            };
            match self.call_once(body, &key).await {
                Ok(content) => return Ok(content),
                Err(Error::UpstreamLlm { kind: UpstreamLlmErrorKind::RateLimit, message }) => {
                    self.keys.mark_rate_limited().await;
                    last_err = Some(Error::UpstreamLlm { kind: UpstreamLlmErrorKind::RateLimit, message });
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Auth("no LLM API key configured".into())))
    }
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        _role: ModelRole,
        model_override: Option<&str>,
    ) -> Result<String> {
        let body = serde_json::json!({
            "model": self.effective_model(model_override),
            "messages": Self::messages_json(messages),
            "temperature": temperature,
        });
        self.call_with_rotation(&body).await
    }

    async fn chat_json(
        &self,
        messages: &[ChatMessage],
        schema: &Value,
        schema_name: &str,
        temperature: f32,
        _role: ModelRole,
        model_override: Option<&str>,
    ) -> Result<Value> {
        let model = self.effective_model(model_override);
        let base = serde_json::json!({
            "model": model,
            "messages": Self::messages_json(messages),
            "temperature": temperature,
        });

        // Rung 1: strict json_schema mode.
        let mut strict_body = base.clone();
        strict_body["response_format"] = serde_json::json!({
            "type": "json_schema",
            "json_schema": {"name": schema_name, "schema": schema, "strict": true},
        });
        if let Ok(raw) = self.call_with_rotation(&strict_body).await {
            if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
                return Ok(value);
            }
        }

        // Rung 2: json_object mode.
        let mut object_body = base.clone();
        object_body["response_format"] = serde_json::json!({"type": "json_object"});
        let raw = match self.call_with_rotation(&object_body).await {
            Ok(raw) => raw,
            Err(_) => self.call_with_rotation(&base).await?,
        };
        if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
            return Ok(value);
        }

        // Rung 3: permissive extraction of the first balanced `{...}`.
        Ok(extract_first_json_object(&raw).unwrap_or_else(|| serde_json::json!({})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_model_falls_back_to_default() {
        let gw = OpenAiGateway::new("https://openrouter.ai/api/v1", vec!["k".into()], "", "gpt-default");
        assert_eq!(gw.effective_model(None), "gpt-default");
        assert_eq!(gw.effective_model(Some("gpt-override")), "gpt-override");
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let gw = OpenAiGateway::new("https://openrouter.ai/api/v1/", vec!["k".into()], "", "m");
        assert_eq!(gw.url(), "https://openrouter.ai/api/v1/chat/completions");
    }

    #[test]
    fn messages_json_preserves_role_and_content() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let value = OpenAiGateway::messages_json(&messages);
        assert_eq!(value[0]["role"], "system");
        assert_eq!(value[1]["content"], "hi");
    }
}
