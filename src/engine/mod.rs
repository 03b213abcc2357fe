// src/engine/mod.rs
//! Pluggable parsing/formatting engines and their registry.
//!
//! An engine owns one model-output dialect end to end: how the prompt is
//! prepared, how the request is built, how each streamed chunk is parsed and
//! how the finished stream is folded back into conversation history. The
//! registry picks one engine per request; from then on that instance handles
//! every chunk of the request.

pub mod plain;
pub mod registry;
pub mod tagged;

pub use plain::PlainEngine;
pub use registry::{EngineRegistry, EngineSelector, SelectionStrategy};
pub use tagged::TaggedEngine;

use std::fmt;
use std::sync::Arc;

use crate::parser::{ChunkResult, StreamOutcome};
use crate::protocol::{CompletionRequest, Message, RequestContext};

/// Predicate deciding whether an engine wants a given request.
pub type CanHandle = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// Factory producing a fresh engine instance for one request.
pub type EngineFactory = Box<dyn Fn() -> Box<dyn Engine> + Send + Sync>;

/// One dialect strategy. Implementations are selected at runtime as trait
/// objects; per-stream parse state lives inside the instance, so a new
/// instance is created per request by the registry.
pub trait Engine: Send {
    fn name(&self) -> &'static str;

    /// Render the prompt for this dialect, including any tool instructions.
    fn prepare_prompt(&self, ctx: &RequestContext) -> String;

    /// Build the transport-facing completion request.
    fn build_request(&self, ctx: &RequestContext) -> CompletionRequest;

    /// Parse one raw fragment, returning the incremental output.
    fn process_chunk(&mut self, fragment: &str) -> ChunkResult;

    /// End of stream: return everything accumulated. Best-effort even when
    /// the stream stopped mid-section or mid-call.
    fn finalize(&mut self, finish_reason: Option<String>) -> StreamOutcome;

    /// Serialize a finished stream back into messages the agent loop can
    /// append to its history.
    fn rebuild_history(&self, outcome: &StreamOutcome) -> Vec<Message>;
}

/// Registration metadata for one engine.
#[derive(Clone)]
pub struct EngineDescriptor {
    pub name: String,
    pub priority: i32,
    /// Absent means "accepts everything".
    pub can_handle: Option<CanHandle>,
}

impl EngineDescriptor {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
            can_handle: None,
        }
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        self.can_handle = Some(Arc::new(predicate));
        self
    }

    fn accepts(&self, ctx: &RequestContext) -> bool {
        self.can_handle.as_ref().map(|p| p(ctx)).unwrap_or(true)
    }
}

impl fmt::Debug for EngineDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("can_handle", &self.can_handle.is_some())
            .finish()
    }
}

/// The only hard failure in this crate: the registry cannot produce an
/// engine. Everything stream-shaped degrades instead of erroring.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no engines registered")]
    EmptyRegistry,
}
