// src/parser/mod.rs
//! Incremental demultiplexing of tagged model output.
//!
//! A stream like
//! `<think>...</think><answer>...</answer><code_env><function=NAME>...` is
//! split, fragment by fragment, into a reasoning channel, an answer channel
//! and structured tool calls. Fragments may cut tags at any character
//! boundary; undecidable tag prefixes are retained and nothing is emitted
//! until they resolve. The parser performs no I/O and never fails: malformed
//! markup degrades to best-effort content routing.

pub mod calls;
pub mod json;
pub mod machine;
pub mod scanner;

pub use calls::{CallIdSource, CallLedger, ToolCallRecord};
pub use machine::ParseState;

use serde::{Deserialize, Serialize};

/// Top-level logical channel the cursor is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    None,
    Reasoning,
    Answer,
    CallBlock,
}

/// Position within a call block; meaningful only when `Section::CallBlock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallSubState {
    #[default]
    Outside,
    InFunction,
    InParameter,
}

/// Incremental tool-call output: the piece of `arguments_json` newly produced
/// by one fragment, tied to the call it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallDelta {
    pub id: String,
    pub name: String,
    pub arguments_delta: String,
    pub complete: bool,
}

/// Output attributable to a single processed fragment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkResult {
    pub answer_delta: String,
    pub reasoning_delta: String,
    pub tool_call_deltas: Vec<ToolCallDelta>,
}

impl ChunkResult {
    pub fn is_empty(&self) -> bool {
        self.answer_delta.is_empty()
            && self.reasoning_delta.is_empty()
            && self.tool_call_deltas.is_empty()
    }
}

/// Everything accumulated over one stream, returned at finalize.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamOutcome {
    pub full_answer: String,
    pub full_reasoning: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub finish_reason: Option<String>,
}
