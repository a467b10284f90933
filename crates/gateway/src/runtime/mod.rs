//! Turn orchestration — the deterministic pipeline that turns one user
//! message into one assistant answer.
//!
//! [`session_lock`] serializes turns per conversation so history and
//! `message_index` stay in order; [`cancel`] propagates client-initiated
//! cancellation into in-flight LLM/retrieval calls. [`turn`] and [`turn_v0`]
//! implement the two pipeline versions; [`summarizer`] runs after a turn
//! completes to keep the rolling conversation summary current.

pub mod apology;
pub mod cancel;
pub mod session_lock;
pub mod summarizer;
pub mod turn;
pub mod turn_v0;

pub use turn::{run_turn_v1_0, TurnOutput};
pub use turn_v0::run_turn_v0_1;
