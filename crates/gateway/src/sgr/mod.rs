//! SGR converter (C9): turns free-form natural-language instructions into a
//! `ScenarioDefinition` via a 3-stage LLM chain plus deterministic assembly
//! and static validation. Grounded in `chat_app/sgr/` of the original
//! implementation — `converter.py`'s `sgr_convert_text` is the entry point,
//! `langchain_chain/pipeline.py`'s `sgr_convert_via_langchain` is the 3-step
//! chain this module's [`converter`] mirrors.

pub mod assemble;
pub mod converter;
pub mod models;
pub mod text;
pub mod validate;

pub use converter::{convert, SgrConvertRequest, SgrConvertResponse};
