//! Per-call concurrency and state-machine engine
//!
//! [`sequence`] is the pure packet classifier; [`call_engine`] orchestrates
//! the race-safe per-call mutations, the lifecycle transitions, the AI
//! completion pipeline, and event fan-out.

pub mod call_engine;
pub mod sequence;

pub use call_engine::{CallEngine, CompleteOutcome, IngestOutcome, IngestRequest};
pub use sequence::{Classification, SequenceTracking};
