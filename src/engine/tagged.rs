// src/engine/tagged.rs
//! Engine for the tagged dialect: `<think>` / `<answer>` sections plus
//! `<code_env>` call blocks, parsed incrementally by `parser::machine`.

use super::Engine;
use crate::parser::{ChunkResult, ParseState, StreamOutcome, ToolCallRecord};
use crate::protocol::{CompletionRequest, Message, RequestContext};

pub struct TaggedEngine {
    state: ParseState,
}

impl Default for TaggedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TaggedEngine {
    pub fn new() -> Self {
        Self {
            state: ParseState::new(),
        }
    }

    /// Sequential call ids for reproducible runs.
    pub fn deterministic() -> Self {
        Self {
            state: ParseState::with_sequential_ids(),
        }
    }

    /// Render the finalized call list back into `<code_env>` markup so a
    /// historical assistant turn replays in the model's own dialect.
    fn render_call_block(calls: &[ToolCallRecord]) -> String {
        let mut out = String::from("<code_env>\n");
        for call in calls {
            out.push_str(&format!("<function={}>\n", call.name));
            if let Ok(serde_json::Value::Object(args)) =
                serde_json::from_str::<serde_json::Value>(&call.arguments_json)
            {
                for (key, value) in args {
                    let rendered = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    out.push_str(&format!(
                        "<parameter={}>{}</parameter>\n",
                        key, rendered
                    ));
                }
            }
            out.push_str("</function>\n");
        }
        out.push_str("</code_env>");
        out
    }

    fn tool_instructions(ctx: &RequestContext) -> String {
        let mut rule = String::from(
            "Wrap private reasoning in <think></think> and the user-facing reply in \
             <answer></answer>. To call a tool, emit a <code_env> block containing \
             <function=NAME> with one <parameter=NAME>value</parameter> per argument, \
             then close with </function> and </code_env>. Parameter values are taken \
             verbatim; do not JSON-encode them.\n\nAvailable tools:\n",
        );
        for tool in &ctx.tools {
            rule.push_str(&format!(
                "- {}: {}\n",
                tool.name,
                tool.description.as_deref().unwrap_or("")
            ));
            if let Some(schema) = &tool.parameters {
                rule.push_str(&format!("  parameters: {}\n", schema));
            }
        }
        rule
    }
}

impl Engine for TaggedEngine {
    fn name(&self) -> &'static str {
        "tagged"
    }

    fn prepare_prompt(&self, ctx: &RequestContext) -> String {
        let mut prompt = String::new();
        if !ctx.tools.is_empty() {
            prompt.push_str(&Self::tool_instructions(ctx));
            prompt.push('\n');
        }
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
        self.state.process_chunk(fragment)
    }

    fn finalize(&mut self, finish_reason: Option<String>) -> StreamOutcome {
        self.state.finalize(finish_reason)
    }

    fn rebuild_history(&self, outcome: &StreamOutcome) -> Vec<Message> {
        let mut content = outcome.full_answer.clone();
        if !outcome.tool_calls.is_empty() {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&Self::render_call_block(&outcome.tool_calls));
        }
        let mut message = Message::new("assistant", content);
        if !outcome.tool_calls.is_empty() {
            message.tool_calls = Some(outcome.tool_calls.clone());
        }
        vec![message]
    }
}
