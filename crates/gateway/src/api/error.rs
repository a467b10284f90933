//! Maps [`sa_domain::error::Error`] onto HTTP responses at the API boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use sa_domain::error::{Error, UpstreamLlmErrorKind};

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match &self.0 {
            Error::InputValidation(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({"error": msg})),
            Error::Auth(msg) => (StatusCode::UNAUTHORIZED, serde_json::json!({"error": msg})),
            Error::UpstreamLlm { kind, message } => {
                let status = match kind {
                    UpstreamLlmErrorKind::Auth => StatusCode::UNAUTHORIZED,
                    UpstreamLlmErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
                    UpstreamLlmErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    UpstreamLlmErrorKind::Network | UpstreamLlmErrorKind::Other => StatusCode::BAD_GATEWAY,
                };
                (status, serde_json::json!({"error": message}))
            }
            Error::SgrConversion(payload) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({
                    "trace_id": payload.trace_id,
                    "failed_step": payload.failed_step,
                    "diagnostics": payload.diagnostics,
                    "last_llm_raw": payload.last_llm_raw,
                }),
            ),
            other => (StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({"error": other.to_string()})),
        };
        (status, Json(body)).into_response()
    }
}
