// src/parser/calls.rs
//! Structured-call assembly: per-call argument JSON built incrementally as
//! `<function=...>` / `<parameter=...>` tags and value text stream in, plus
//! the ordered ledger of every call seen on the stream.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::json;
use super::ToolCallDelta;

/// One tool invocation discovered in a call block.
///
/// `arguments_json` starts as `"{"` and grows by appended key/value fragments;
/// at every parameter boundary it is a syntactically valid JSON prefix, and
/// once `complete` is set it parses as a full object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments_json: String,
    pub complete: bool,
}

/// Insertion-ordered collection of call records. Records are never removed
/// or reordered; they live for the life of the parse state.
#[derive(Debug, Clone, Default)]
pub struct CallLedger {
    records: Vec<ToolCallRecord>,
}

impl CallLedger {
    pub fn append(&mut self, record: ToolCallRecord) {
        self.records.push(record);
    }

    pub fn find(&self, id: &str) -> Option<&ToolCallRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut ToolCallRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    pub fn all(&self) -> &[ToolCallRecord] {
        &self.records
    }
}

/// Source of call ids. `Random` matches the `call_` + 16-hex scheme used for
/// OpenAI-compatible tool calls; `Sequential` yields `call_0`, `call_1`, ...
/// for reproducible test runs.
#[derive(Debug, Clone)]
pub enum CallIdSource {
    Random,
    Sequential(usize),
}

impl CallIdSource {
    fn next(&mut self) -> String {
        match self {
            CallIdSource::Random => {
                let raw = Uuid::new_v4().simple().to_string();
                format!("call_{}", &raw[..16])
            }
            CallIdSource::Sequential(n) => {
                let id = format!("call_{}", n);
                *n += 1;
                id
            }
        }
    }
}

/// Assembles tool calls while the cursor is inside a call block. At most one
/// call is open at a time; all ledger mutation goes through here.
#[derive(Debug, Clone)]
pub struct CallAssembler {
    ledger: CallLedger,
    ids: CallIdSource,
    current_call_id: Option<String>,
    current_tool_name: Option<String>,
    current_parameter_name: Option<String>,
}

impl CallAssembler {
    pub fn new(ids: CallIdSource) -> Self {
        Self {
            ledger: CallLedger::default(),
            ids,
            current_call_id: None,
            current_tool_name: None,
            current_parameter_name: None,
        }
    }

    pub fn ledger(&self) -> &CallLedger {
        &self.ledger
    }

    pub fn has_open_call(&self) -> bool {
        self.current_call_id.is_some()
    }

    fn delta(&self, arguments_delta: String, complete: bool) -> Option<ToolCallDelta> {
        let id = self.current_call_id.clone()?;
        let name = self.current_tool_name.clone()?;
        Some(ToolCallDelta {
            id,
            name,
            arguments_delta,
            complete,
        })
    }

    fn append_to_current(&mut self, fragment: &str) {
        if let Some(id) = self.current_call_id.clone() {
            if let Some(record) = self.ledger.find_mut(&id) {
                record.arguments_json.push_str(fragment);
            }
        }
    }

    /// `<function=NAME>` recognized: open a fresh record.
    pub fn open_function(&mut self, name: &str) -> Option<ToolCallDelta> {
        let id = self.ids.next();
        self.ledger.append(ToolCallRecord {
            id: id.clone(),
            name: name.to_string(),
            arguments_json: "{".to_string(),
            complete: false,
        });
        self.current_call_id = Some(id);
        self.current_tool_name = Some(name.to_string());
        self.delta(String::new(), false)
    }

    /// `<parameter=NAME>` recognized: start a new string-valued entry.
    pub fn open_parameter(&mut self, name: &str) -> Option<ToolCallDelta> {
        let first = self
            .current_call_id
            .as_deref()
            .and_then(|id| self.ledger.find(id))
            .map(|r| r.arguments_json == "{")
            .unwrap_or(true);
        let fragment = json::key_fragment(name, first);
        self.append_to_current(&fragment);
        self.current_parameter_name = Some(name.to_string());
        self.delta(fragment, false)
    }

    /// Raw parameter value text: escaped, then appended.
    pub fn value_fragment(&mut self, raw: &str) -> Option<ToolCallDelta> {
        let escaped = json::escape_fragment(raw);
        if escaped.is_empty() {
            return None;
        }
        self.append_to_current(&escaped);
        self.delta(escaped, false)
    }

    /// `</parameter>` recognized: close the string value.
    pub fn close_parameter(&mut self) -> Option<ToolCallDelta> {
        self.append_to_current("\"");
        self.current_parameter_name = None;
        self.delta("\"".to_string(), false)
    }

    /// `</function>` recognized: close the arguments object and mark the
    /// record complete.
    pub fn close_function(&mut self) -> Option<ToolCallDelta> {
        let closing = self.close_arguments();
        let delta = self.delta(closing, true);
        if let Some(id) = self.current_call_id.take() {
            if let Some(record) = self.ledger.find_mut(&id) {
                record.complete = true;
            }
        }
        self.current_tool_name = None;
        delta
    }

    /// Best-effort close for a call still open when the block or stream ends.
    /// The arguments object is terminated so it parses as JSON, but the record
    /// stays incomplete to signal the forced close.
    pub fn force_close(&mut self) -> Option<ToolCallDelta> {
        if !self.has_open_call() {
            return None;
        }
        if self.current_parameter_name.take().is_some() {
            self.append_to_current("\"");
        }
        let closing = self.close_arguments();
        let delta = self.delta(closing, false);
        self.current_call_id = None;
        self.current_tool_name = None;
        delta
    }

    fn close_arguments(&mut self) -> String {
        let needs_close = self
            .current_call_id
            .as_deref()
            .and_then(|id| self.ledger.find(id))
            .map(|r| !r.arguments_json.ends_with('}'))
            .unwrap_or(false);
        if needs_close {
            self.append_to_current(" }");
            " }".to_string()
        } else {
            String::new()
        }
    }
}
