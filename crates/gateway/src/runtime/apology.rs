//! Russian apology text selected by the kind of an upstream LLM failure
//! (§7: "emit a user-facing apology message categorized by the underlying
//! error type"). Shared by both pipeline versions so a `chat` failure never
//! surfaces as a 5xx to the end user.

use sa_domain::error::{Error, UpstreamLlmErrorKind};

pub fn apology_for(error: &Error) -> String {
    let reason = match error {
        Error::UpstreamLlm { kind: UpstreamLlmErrorKind::Auth, .. } => "проблема с токеном доступа или авторизацией",
        Error::UpstreamLlm { kind: UpstreamLlmErrorKind::RateLimit, .. } => {
            "временное превышение лимитов запросов к LLM-сервису"
        }
        Error::UpstreamLlm { kind: UpstreamLlmErrorKind::Timeout | UpstreamLlmErrorKind::Network, .. }
        | Error::Timeout(_) => "проблемы с сетевым доступом или таймаут соединения с LLM-сервисом",
        _ => "внутренняя ошибка на стороне LLM-сервиса",
    };

    format!(
        "Сейчас у меня не получается получить ответ от модели. Причина: {reason}. \
         Попробуйте, пожалуйста, повторить запрос позже."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::error::UpstreamLlmErrorKind;

    #[test]
    fn apology_mentions_rate_limit_reason() {
        let err = Error::UpstreamLlm { kind: UpstreamLlmErrorKind::RateLimit, message: "429 too many requests".to_string() };
        assert!(apology_for(&err).contains("лимитов"));
    }

    #[test]
    fn apology_mentions_auth_reason() {
        let err = Error::UpstreamLlm { kind: UpstreamLlmErrorKind::Auth, message: "401 unauthorized".to_string() };
        assert!(apology_for(&err).contains("токеном"));
    }

    #[test]
    fn apology_falls_back_to_generic_reason() {
        let err = Error::Other("weird upstream glitch".to_string());
        assert!(apology_for(&err).contains("внутренняя ошибка"));
    }
}
