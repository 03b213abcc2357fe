// src/lib.rs
//! Streaming demultiplexer for tagged model output.
//!
//! Models trained on the `<think>`/`<answer>`/`<code_env>` dialect interleave
//! private reasoning, user-facing text, and tool invocations in one token
//! stream, cut into fragments at arbitrary byte boundaries. This crate splits
//! that stream back into its channels incrementally: reasoning and answer
//! deltas are surfaced as they arrive, and call blocks are assembled into
//! tool-call records with JSON argument payloads built fragment by fragment.
//!
//! The [`parser`] module holds the state machine itself; [`engine`] wraps it
//! behind a pluggable trait with a priority-based registry so non-tagged
//! models can share the same request path; [`stream`] drives an engine over
//! an async fragment source.

pub mod engine;
pub mod parser;
pub mod protocol;
pub mod stream;

pub use engine::{Engine, EngineError, EngineRegistry, EngineSelector, PlainEngine, TaggedEngine};
pub use parser::{
    CallLedger, ChunkResult, ParseState, StreamOutcome, ToolCallDelta, ToolCallRecord,
};
pub use protocol::{CompletionRequest, Message, RequestContext, ToolDefinition};
