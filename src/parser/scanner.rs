// src/parser/scanner.rs
//! Tag scanner: lowest-level matching of markup tags against a buffer that
//! may end mid-tag.
//!
//! Given text starting at a `<` and the tag set valid for the current parse
//! state, the scanner decides between three outcomes: a complete tag, an
//! undecidable prefix that must be retained until more text arrives, or plain
//! content. Which tags are candidates depends entirely on where the cursor
//! currently sits, so e.g. a literal `<` inside a parameter value is only
//! ever tested against `</parameter>`.

use super::{CallSubState, Section};

/// Identity of a recognized tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    ThinkOpen,
    ThinkClose,
    AnswerOpen,
    AnswerClose,
    CodeEnvOpen,
    CodeEnvClose,
    /// `<function=NAME>`, name captured.
    FunctionOpen,
    FunctionClose,
    /// `<parameter=NAME>`, name captured.
    ParameterOpen,
    ParameterClose,
}

/// A tag candidate: either a fixed literal or a `prefix` + NAME + `>` form.
#[derive(Debug, Clone, Copy)]
pub enum TagPattern {
    Literal(&'static str, TagKind),
    Named(&'static str, TagKind),
}

/// A complete tag found at the start of the probed buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatch {
    pub kind: TagKind,
    /// Captured NAME for `Named` patterns.
    pub name: Option<String>,
    /// Bytes consumed from the buffer, including the closing `>`.
    pub len: usize,
}

/// Outcome of probing a buffer that starts with `<`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagProbe {
    /// A complete candidate tag starts the buffer.
    Match(TagMatch),
    /// The whole buffer is an undecidable prefix of some candidate; it must
    /// be held back until the next fragment disambiguates it.
    Partial,
    /// No candidate matches or could still match; the leading `<` is plain
    /// content.
    None,
}

const NONE_TAGS: &[TagPattern] = &[
    TagPattern::Literal("<think>", TagKind::ThinkOpen),
    TagPattern::Literal("<answer>", TagKind::AnswerOpen),
    TagPattern::Literal("<code_env>", TagKind::CodeEnvOpen),
];

const REASONING_TAGS: &[TagPattern] = &[TagPattern::Literal("</think>", TagKind::ThinkClose)];

const ANSWER_TAGS: &[TagPattern] = &[TagPattern::Literal("</answer>", TagKind::AnswerClose)];

const CALL_OUTSIDE_TAGS: &[TagPattern] = &[
    TagPattern::Named("<function=", TagKind::FunctionOpen),
    TagPattern::Literal("</code_env>", TagKind::CodeEnvClose),
];

const IN_FUNCTION_TAGS: &[TagPattern] = &[
    TagPattern::Named("<parameter=", TagKind::ParameterOpen),
    TagPattern::Literal("</function>", TagKind::FunctionClose),
    TagPattern::Literal("</code_env>", TagKind::CodeEnvClose),
];

const IN_PARAMETER_TAGS: &[TagPattern] =
    &[TagPattern::Literal("</parameter>", TagKind::ParameterClose)];

/// Tag candidates valid for the given parse position.
///
/// Note the deliberate asymmetry: inside a parameter value only the closing
/// `</parameter>` is recognized, so HTML-ish content (or a stray `<think>`)
/// inside an argument streams through verbatim. Nested same-type section tags
/// are not detected anywhere; the first closing tag always wins.
pub fn candidates(section: Section, sub: CallSubState) -> &'static [TagPattern] {
    match section {
        Section::None => NONE_TAGS,
        Section::Reasoning => REASONING_TAGS,
        Section::Answer => ANSWER_TAGS,
        Section::CallBlock => match sub {
            CallSubState::Outside => CALL_OUTSIDE_TAGS,
            CallSubState::InFunction => IN_FUNCTION_TAGS,
            CallSubState::InParameter => IN_PARAMETER_TAGS,
        },
    }
}

/// Probe a buffer beginning with `<` against one candidate.
fn probe_one(buf: &str, pattern: &TagPattern) -> TagProbe {
    match pattern {
        TagPattern::Literal(literal, kind) => {
            if buf.len() >= literal.len() {
                if buf.as_bytes().starts_with(literal.as_bytes()) {
                    TagProbe::Match(TagMatch {
                        kind: *kind,
                        name: None,
                        len: literal.len(),
                    })
                } else {
                    TagProbe::None
                }
            } else if literal.as_bytes().starts_with(buf.as_bytes()) {
                TagProbe::Partial
            } else {
                TagProbe::None
            }
        }
        TagPattern::Named(prefix, kind) => {
            if buf.len() < prefix.len() {
                return if prefix.as_bytes().starts_with(buf.as_bytes()) {
                    TagProbe::Partial
                } else {
                    TagProbe::None
                };
            }
            if !buf.as_bytes().starts_with(prefix.as_bytes()) {
                return TagProbe::None;
            }
            // Capture NAME up to the closing `>`. A second `<` before the `>`
            // means this was never a tag; an empty name is rejected the same
            // way. If the buffer runs out first the tag is still undecidable.
            for (rel, ch) in buf[prefix.len()..].char_indices() {
                match ch {
                    '>' => {
                        if rel == 0 {
                            return TagProbe::None;
                        }
                        let name = &buf[prefix.len()..prefix.len() + rel];
                        return TagProbe::Match(TagMatch {
                            kind: *kind,
                            name: Some(name.to_string()),
                            len: prefix.len() + rel + 1,
                        });
                    }
                    '<' => return TagProbe::None,
                    _ => {}
                }
            }
            TagProbe::Partial
        }
    }
}

/// Probe a buffer beginning with `<` against every candidate for the current
/// state. A complete match on any candidate wins over a partial on another;
/// a partial on any candidate wins over plain content.
pub fn probe_any(buf: &str, patterns: &[TagPattern]) -> TagProbe {
    debug_assert!(buf.starts_with('<'));
    let mut partial = false;
    for pattern in patterns {
        match probe_one(buf, pattern) {
            TagProbe::Match(m) => return TagProbe::Match(m),
            TagProbe::Partial => partial = true,
            TagProbe::None => {}
        }
    }
    if partial {
        TagProbe::Partial
    } else {
        TagProbe::None
    }
}
