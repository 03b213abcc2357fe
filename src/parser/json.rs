// src/parser/json.rs
//! JSON string-fragment helpers for incremental argument assembly.
//!
//! All escaping for tool-call arguments goes through here so the assembled
//! `arguments_json` is valid JSON at every parameter boundary, no matter how
//! the raw value was fragmented by the stream.

use std::fmt::Write;

/// Escape a raw text fragment for inclusion inside a JSON string literal.
///
/// Total over all inputs: backslash, double quote, newline, carriage return
/// and tab get their short forms, any other control character below 0x20 is
/// emitted as `\u00XX`. Everything else passes through unchanged.
pub fn escape_fragment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                // Remaining C0 controls have no short escape form.
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Build the fragment that opens a new `"key": "` entry in an arguments
/// object. `first` controls whether a separating comma is emitted.
pub fn key_fragment(name: &str, first: bool) -> String {
    if first {
        format!("\"{}\": \"", escape_fragment(name))
    } else {
        format!(", \"{}\": \"", escape_fragment(name))
    }
}
