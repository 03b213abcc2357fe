// src/parser/machine.rs
//! Section state machine and per-fragment chunk processor.
//!
//! `ParseState` owns everything for one stream: the current section, the
//! undecidable-tag tail held over from the previous fragment, the cumulative
//! reasoning/answer buffers, and the call assembler. Fragments must be applied
//! in arrival order; each call returns only the output newly produced by that
//! fragment.

use super::calls::{CallAssembler, CallIdSource, ToolCallRecord};
use super::scanner::{self, TagKind, TagProbe};
use super::{CallSubState, ChunkResult, Section, StreamOutcome};

#[derive(Debug, Clone)]
pub struct ParseState {
    section: Section,
    call_sub: CallSubState,
    reasoning_buffer: String,
    answer_buffer: String,
    pending_tail: String,
    calls: CallAssembler,
}

impl Default for ParseState {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseState {
    pub fn new() -> Self {
        Self::with_ids(CallIdSource::Random)
    }

    /// Deterministic `call_0`, `call_1`, ... ids for reproducible runs.
    pub fn with_sequential_ids() -> Self {
        Self::with_ids(CallIdSource::Sequential(0))
    }

    fn with_ids(ids: CallIdSource) -> Self {
        Self {
            section: Section::None,
            call_sub: CallSubState::Outside,
            reasoning_buffer: String::new(),
            answer_buffer: String::new(),
            pending_tail: String::new(),
            calls: CallAssembler::new(ids),
        }
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn call_sub_state(&self) -> CallSubState {
        self.call_sub
    }

    /// Cumulative reasoning text emitted so far.
    pub fn reasoning_buffer(&self) -> &str {
        &self.reasoning_buffer
    }

    /// Cumulative answer text emitted so far.
    pub fn answer_buffer(&self) -> &str {
        &self.answer_buffer
    }

    pub fn ledger(&self) -> &super::calls::CallLedger {
        self.calls.ledger()
    }

    /// Process one raw fragment and return the output attributable to it.
    ///
    /// The held-back tail from the previous fragment is prepended before
    /// scanning, so tags split at any character boundary reassemble here.
    pub fn process_chunk(&mut self, fragment: &str) -> ChunkResult {
        let mut out = ChunkResult::default();
        if self.pending_tail.is_empty() && fragment.is_empty() {
            return out;
        }
        let buf = {
            let mut b = std::mem::take(&mut self.pending_tail);
            b.push_str(fragment);
            b
        };

        let mut cursor = 0;
        while cursor < buf.len() {
            let rest = &buf[cursor..];
            let lt = match rest.find('<') {
                Some(i) => i,
                None => {
                    self.route_content(rest, &mut out);
                    break;
                }
            };
            if lt > 0 {
                self.route_content(&rest[..lt], &mut out);
                cursor += lt;
                continue;
            }
            match scanner::probe_any(rest, scanner::candidates(self.section, self.call_sub)) {
                TagProbe::Match(tag) => {
                    let len = tag.len;
                    self.apply_tag(tag.kind, tag.name.as_deref(), &mut out);
                    cursor += len;
                }
                TagProbe::Partial => {
                    // Undecidable prefix: hold it for the next fragment.
                    self.pending_tail = rest.to_string();
                    return out;
                }
                TagProbe::None => {
                    self.route_content("<", &mut out);
                    cursor += 1;
                }
            }
        }
        out
    }

    /// End of stream: flush whatever is still held, best-effort close any
    /// open call, and hand back the accumulated channels. The state should be
    /// discarded afterwards.
    pub fn finalize(&mut self, finish_reason: Option<String>) -> StreamOutcome {
        if !self.pending_tail.is_empty() {
            // The tail never became a tag; treat it as content of whatever
            // section it was buffered in.
            let tail = std::mem::take(&mut self.pending_tail);
            let mut out = ChunkResult::default();
            self.route_content(&tail, &mut out);
        }
        self.calls.force_close();
        StreamOutcome {
            full_answer: self.answer_buffer.clone(),
            full_reasoning: self.reasoning_buffer.clone(),
            tool_calls: self.calls.ledger().all().to_vec(),
            finish_reason,
        }
    }

    /// Finalized view of the ledger without consuming the state.
    pub fn tool_calls(&self) -> Vec<ToolCallRecord> {
        self.calls.ledger().all().to_vec()
    }

    fn route_content(&mut self, text: &str, out: &mut ChunkResult) {
        match (self.section, self.call_sub) {
            (Section::Reasoning, _) => {
                self.reasoning_buffer.push_str(text);
                out.reasoning_delta.push_str(text);
            }
            (Section::Answer, _) => {
                self.answer_buffer.push_str(text);
                out.answer_delta.push_str(text);
            }
            (Section::CallBlock, CallSubState::InParameter) => {
                if let Some(delta) = self.calls.value_fragment(text) {
                    out.tool_call_deltas.push(delta);
                }
            }
            // Outside any section (and between call-block tags) the dialect
            // defines no destination; stray text is dropped.
            _ => {
                if !text.trim().is_empty() {
                    tracing::debug!(dropped = text, "discarding text outside recognized sections");
                }
            }
        }
    }

    fn apply_tag(&mut self, kind: TagKind, name: Option<&str>, out: &mut ChunkResult) {
        match kind {
            TagKind::ThinkOpen => {
                self.section = Section::Reasoning;
            }
            TagKind::ThinkClose => {
                self.section = Section::None;
            }
            TagKind::AnswerOpen => {
                self.section = Section::Answer;
            }
            TagKind::AnswerClose => {
                self.section = Section::None;
            }
            TagKind::CodeEnvOpen => {
                self.section = Section::CallBlock;
                self.call_sub = CallSubState::Outside;
            }
            TagKind::CodeEnvClose => {
                // A function left open by a malformed stream is closed first
                // so the trailing call is not lost.
                if self.calls.has_open_call() {
                    if let Some(delta) = self.calls.force_close() {
                        out.tool_call_deltas.push(delta);
                    }
                }
                self.section = Section::None;
                self.call_sub = CallSubState::Outside;
            }
            TagKind::FunctionOpen => {
                let name = name.unwrap_or_default();
                if let Some(delta) = self.calls.open_function(name) {
                    tracing::debug!(call_id = %delta.id, tool = name, "tool call opened");
                    out.tool_call_deltas.push(delta);
                }
                self.call_sub = CallSubState::InFunction;
            }
            TagKind::FunctionClose => {
                if let Some(delta) = self.calls.close_function() {
                    out.tool_call_deltas.push(delta);
                }
                self.call_sub = CallSubState::Outside;
            }
            TagKind::ParameterOpen => {
                if let Some(delta) = self.calls.open_parameter(name.unwrap_or_default()) {
                    out.tool_call_deltas.push(delta);
                }
                self.call_sub = CallSubState::InParameter;
            }
            TagKind::ParameterClose => {
                if let Some(delta) = self.calls.close_parameter() {
                    out.tool_call_deltas.push(delta);
                }
                self.call_sub = CallSubState::InFunction;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(state: &mut ParseState, fragments: &[&str]) -> ChunkResult {
        let mut merged = ChunkResult::default();
        for fragment in fragments {
            let r = state.process_chunk(fragment);
            merged.answer_delta.push_str(&r.answer_delta);
            merged.reasoning_delta.push_str(&r.reasoning_delta);
            merged.tool_call_deltas.extend(r.tool_call_deltas);
        }
        merged
    }

    #[test]
    fn test_reasoning_and_answer_sections() {
        let mut state = ParseState::with_sequential_ids();
        let r = state.process_chunk("<think>let me see</think><answer>42</answer>");
        assert_eq!(r.reasoning_delta, "let me see");
        assert_eq!(r.answer_delta, "42");
        assert_eq!(state.section(), Section::None);
        assert_eq!(state.reasoning_buffer(), "let me see");
        assert_eq!(state.answer_buffer(), "42");
    }

    #[test]
    fn test_single_fragment_equals_char_by_char() {
        let text = "<think>hello</think>";
        let mut whole = ParseState::with_sequential_ids();
        whole.process_chunk(text);

        let mut split = ParseState::with_sequential_ids();
        for ch in text.chars() {
            split.process_chunk(&ch.to_string());
        }

        assert_eq!(whole.reasoning_buffer(), "hello");
        assert_eq!(split.reasoning_buffer(), "hello");
        assert_eq!(whole.section(), Section::None);
        assert_eq!(split.section(), Section::None);
    }

    #[test]
    fn test_partial_open_tag_emits_nothing_until_confirmed() {
        let mut state = ParseState::with_sequential_ids();
        let r1 = state.process_chunk("<thi");
        assert_eq!(r1.reasoning_delta, "");
        assert_eq!(r1.answer_delta, "");
        let r2 = state.process_chunk("nk>x</think>");
        assert_eq!(r2.reasoning_delta, "x");
        assert_eq!(state.reasoning_buffer(), "x");
    }

    #[test]
    fn test_text_outside_sections_is_dropped() {
        let mut state = ParseState::with_sequential_ids();
        let r = state.process_chunk("noise\n<answer>kept</answer>\nmore noise");
        assert_eq!(r.answer_delta, "kept");
        assert_eq!(state.answer_buffer(), "kept");
    }

    #[test]
    fn test_unrecognized_tag_falls_into_active_section() {
        let mut state = ParseState::with_sequential_ids();
        let r = state.process_chunk("<answer>a < b and <b>bold</b></answer>");
        assert_eq!(r.answer_delta, "a < b and <b>bold</b>");
    }

    #[test]
    fn test_stray_close_tag_ignored_outside_section() {
        // A closing tag for a section that was never opened is not a
        // candidate in section None, so its characters are dropped there.
        let mut state = ParseState::with_sequential_ids();
        let r = state.process_chunk("</think><answer>ok</answer>");
        assert_eq!(r.answer_delta, "ok");
        assert_eq!(r.reasoning_delta, "");
    }

    #[test]
    fn test_call_block_round_trip() {
        let mut state = ParseState::with_sequential_ids();
        let r = state.process_chunk(
            "<code_env><function=foo><parameter=a>1</parameter><parameter=b>two</parameter></function></code_env>",
        );
        assert_eq!(state.section(), Section::None);
        let calls = state.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "foo");
        assert!(calls[0].complete);
        let parsed: serde_json::Value = serde_json::from_str(&calls[0].arguments_json).unwrap();
        assert_eq!(parsed, serde_json::json!({"a": "1", "b": "two"}));
        assert!(r.tool_call_deltas.iter().any(|d| d.complete));
    }

    #[test]
    fn test_call_block_split_at_every_boundary() {
        let text = "<code_env><function=foo><parameter=a>1</parameter><parameter=b>two</parameter></function></code_env>";
        for split in 1..text.len() {
            if !text.is_char_boundary(split) {
                continue;
            }
            let mut state = ParseState::with_sequential_ids();
            state.process_chunk(&text[..split]);
            state.process_chunk(&text[split..]);
            let calls = state.tool_calls();
            assert_eq!(calls.len(), 1, "split at {}", split);
            let parsed: serde_json::Value =
                serde_json::from_str(&calls[0].arguments_json).unwrap();
            assert_eq!(
                parsed,
                serde_json::json!({"a": "1", "b": "two"}),
                "split at {}",
                split
            );
        }
    }

    #[test]
    fn test_parameter_value_with_quotes_and_newlines() {
        let mut state = ParseState::with_sequential_ids();
        state.process_chunk(
            "<code_env><function=w><parameter=text>say \"hi\"\nbye</parameter></function></code_env>",
        );
        let calls = state.tool_calls();
        let parsed: serde_json::Value = serde_json::from_str(&calls[0].arguments_json).unwrap();
        assert_eq!(parsed["text"], "say \"hi\"\nbye");
    }

    #[test]
    fn test_parameter_value_keeps_literal_angle_brackets() {
        let mut state = ParseState::with_sequential_ids();
        state.process_chunk(
            "<code_env><function=w><parameter=html><div><p>x</p></div></parameter></function></code_env>",
        );
        let parsed: serde_json::Value =
            serde_json::from_str(&state.tool_calls()[0].arguments_json).unwrap();
        assert_eq!(parsed["html"], "<div><p>x</p></div>");
    }

    #[test]
    fn test_three_calls_preserve_order_across_fragments() {
        let text = "<code_env>\
            <function=alpha><parameter=x>1</parameter></function>\
            <function=beta></function>\
            <function=gamma><parameter=y>2</parameter></function>\
            </code_env>";
        for chunk_size in [1, 3, 7, text.len()] {
            let mut state = ParseState::with_sequential_ids();
            let bytes = text.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                let mut end = (i + chunk_size).min(bytes.len());
                while !text.is_char_boundary(end) {
                    end += 1;
                }
                state.process_chunk(&text[i..end]);
                i = end;
            }
            let names: Vec<_> = state.tool_calls().iter().map(|r| r.name.clone()).collect();
            assert_eq!(names, ["alpha", "beta", "gamma"], "chunks of {}", chunk_size);
        }
    }

    #[test]
    fn test_code_env_close_recovers_open_function() {
        let mut state = ParseState::with_sequential_ids();
        state.process_chunk("<code_env><function=f><parameter=a>1</parameter></code_env>");
        let calls = state.tool_calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].complete);
        let parsed: serde_json::Value = serde_json::from_str(&calls[0].arguments_json).unwrap();
        assert_eq!(parsed, serde_json::json!({"a": "1"}));
        assert_eq!(state.section(), Section::None);
    }

    #[test]
    fn test_finalize_closes_unterminated_stream() {
        let mut state = ParseState::with_sequential_ids();
        state.process_chunk("<code_env><function=f><parameter=a>par");
        let outcome = state.finalize(Some("length".to_string()));
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(!outcome.tool_calls[0].complete);
        let parsed: serde_json::Value =
            serde_json::from_str(&outcome.tool_calls[0].arguments_json).unwrap();
        assert_eq!(parsed, serde_json::json!({"a": "par"}));
        assert_eq!(outcome.finish_reason.as_deref(), Some("length"));
    }

    #[test]
    fn test_finalize_flushes_pending_tail_into_section() {
        let mut state = ParseState::with_sequential_ids();
        state.process_chunk("<think>almost </thi");
        let outcome = state.finalize(None);
        // "</thi" never completed into a closing tag; it is reasoning text.
        assert_eq!(outcome.full_reasoning, "almost </thi");
    }

    #[test]
    fn test_deltas_concatenate_to_full_buffers() {
        let text = "<think>abc def</think><answer>ghi jkl</answer>";
        for chunk_size in 1..=text.len() {
            let mut state = ParseState::with_sequential_ids();
            let mut reasoning = String::new();
            let mut answer = String::new();
            let mut i = 0;
            while i < text.len() {
                let mut end = (i + chunk_size).min(text.len());
                while !text.is_char_boundary(end) {
                    end += 1;
                }
                let r = state.process_chunk(&text[i..end]);
                reasoning.push_str(&r.reasoning_delta);
                answer.push_str(&r.answer_delta);
                i = end;
            }
            let outcome = state.finalize(None);
            assert_eq!(reasoning, outcome.full_reasoning, "chunks of {}", chunk_size);
            assert_eq!(answer, outcome.full_answer, "chunks of {}", chunk_size);
            assert_eq!(outcome.full_reasoning, "abc def");
            assert_eq!(outcome.full_answer, "ghi jkl");
        }
    }

    #[test]
    fn test_interleaved_sections_and_calls() {
        let mut state = ParseState::with_sequential_ids();
        let merged = feed_all(
            &mut state,
            &[
                "<think>need a tool</think>",
                "<code_env><function=search><parameter=q>rust</parameter></function></code_env>",
                "<answer>found it</answer>",
            ],
        );
        assert_eq!(merged.reasoning_delta, "need a tool");
        assert_eq!(merged.answer_delta, "found it");
        assert_eq!(state.tool_calls().len(), 1);
    }

    #[test]
    fn test_lone_angle_bracket_between_sections() {
        let mut state = ParseState::with_sequential_ids();
        let r1 = state.process_chunk("<");
        assert_eq!(r1.answer_delta, "");
        // Disambiguated as a non-tag: in section None the char is dropped.
        let r2 = state.process_chunk("x<answer>ok</answer>");
        assert_eq!(r2.answer_delta, "ok");
    }

    #[test]
    fn test_empty_fragment_is_noop() {
        let mut state = ParseState::with_sequential_ids();
        state.process_chunk("<think>a");
        let r = state.process_chunk("");
        assert_eq!(r.reasoning_delta, "");
        assert_eq!(state.section(), Section::Reasoning);
    }

    #[test]
    fn test_tool_deltas_reassemble_arguments() {
        let text = "<code_env><function=f><parameter=a>x\"y</parameter></function></code_env>";
        for chunk_size in 1..=text.len() {
            let mut state = ParseState::with_sequential_ids();
            let mut args = String::from("{");
            let mut i = 0;
            while i < text.len() {
                let end = (i + chunk_size).min(text.len());
                let r = state.process_chunk(&text[i..end]);
                for d in &r.tool_call_deltas {
                    args.push_str(&d.arguments_delta);
                }
                i = end;
            }
            assert_eq!(args, state.tool_calls()[0].arguments_json);
        }
    }
}
