pub mod key_rotator;
pub mod llm_gateway;
pub mod openai_gateway;
pub mod runtime_config;

pub use key_rotator::KeyRotator;
pub use llm_gateway::{ChatMessage, LlmGateway, ModelRole, Role};
pub use openai_gateway::OpenAiGateway;
pub use runtime_config::RuntimeConfigStore;
