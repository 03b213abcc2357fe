// src/engine/plain.rs
//! Pass-through engine for models that emit no markup. Every fragment is
//! answer text; there is no reasoning channel and no tool calling.

use super::Engine;
use crate::parser::{ChunkResult, StreamOutcome};
use crate::protocol::{CompletionRequest, Message, RequestContext};

#[derive(Default)]
pub struct PlainEngine {
    answer: String,
}

impl PlainEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for PlainEngine {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn prepare_prompt(&self, ctx: &RequestContext) -> String {
        let mut prompt = String::new();
        for msg in &ctx.messages {
            prompt.push_str(&format!("{}: {}\n", msg.role, msg.content));
        }
        prompt.push_str("assistant: ");
        prompt
    }

    fn build_request(&self, ctx: &RequestContext) -> CompletionRequest {
        CompletionRequest {
            model: ctx.model_id.clone(),
            prompt: self.prepare_prompt(ctx),
            stream: true,
            stop: Vec::new(),
        }
    }

    fn process_chunk(&mut self, fragment: &str) -> ChunkResult {
        self.answer.push_str(fragment);
        ChunkResult {
            answer_delta: fragment.to_string(),
            ..Default::default()
        }
    }

    fn finalize(&mut self, finish_reason: Option<String>) -> StreamOutcome {
        StreamOutcome {
            full_answer: self.answer.clone(),
            full_reasoning: String::new(),
            tool_calls: Vec::new(),
            finish_reason,
        }
    }

    fn rebuild_history(&self, outcome: &StreamOutcome) -> Vec<Message> {
        vec![Message::new("assistant", outcome.full_answer.clone())]
    }
}
