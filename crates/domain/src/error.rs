/// Shared error type used across all crates in this workspace.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("upstream LLM error ({kind:?}): {message}")]
    UpstreamLlm { kind: UpstreamLlmErrorKind, message: String },

    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("tool failure ({tool}): {message}")]
    ToolFailure { tool: String, message: String },

    #[error("scenario runtime error in {scenario}: {message}")]
    ScenarioRuntime { scenario: String, message: String },

    #[error("SGR conversion failed at step {failed_step}")]
    SgrConversion(Box<SgrErrorPayload>),

    #[error("memory deserialization: {0}")]
    MemoryDeserialization(String),

    #[error("config: {0}")]
    Config(String),

    #[error("input validation: {0}")]
    InputValidation(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

/// Narrower classification of an upstream LLM failure, used to pick the
/// HTTP status code at the API boundary and the apology text shared by
/// both pipeline versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamLlmErrorKind {
    Auth,
    RateLimit,
    Timeout,
    Network,
    Other,
}

/// The structured payload an SGR conversion failure carries, per the
/// trace/diagnostics contract every step of the converter must honor.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SgrErrorPayload {
    pub trace_id: String,
    pub failed_step: String,
    pub diagnostics: serde_json::Value,
    pub last_llm_raw: String,
}

pub type Result<T> = std::result::Result<T, Error>;
