//! Best-effort structural repair of truncated or unbalanced JSON.
//!
//! Model output cut off by the token cap is a valid JSON *prefix* with a
//! damaged tail. Repair works on shape only and never invents content:
//!
//! 1. Close a string left open at the end of the text.
//! 2. Cut everything after the last structurally complete object. When that
//!    object is top-level the text is sliced to exactly its span; when it is
//!    nested, the enclosing structures are kept open for step 3.
//! 3. Append the missing `}`/`]` closers in nesting order.
//!
//! Scanning is a three-state machine (outside a string, inside a string,
//! escape pending) over bytes. Every structural character is ASCII, so byte
//! iteration never splits a multi-byte character that matters.
//!
//! When the repaired text still fails to parse, [`salvage_stories`] pulls out
//! each story object individually.

use crate::extract::extract_json;
use crate::models::Story;
use crate::utils::looks_truncated;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Every story object is expected to open with its Hungarian title.
static STORY_START: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\{\s*"title_hu"\s*:"#).expect("valid story regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    OutsideString,
    InsideString,
    EscapePending,
}

/// Result of one pass over the text.
#[derive(Debug)]
struct Scan {
    /// Byte offset and byte of every bracket or brace outside a string.
    structural: Vec<(usize, u8)>,
    end_state: ScanState,
}

fn scan(text: &str) -> Scan {
    let mut state = ScanState::OutsideString;
    let mut structural = Vec::new();

    for (idx, byte) in text.bytes().enumerate() {
        state = match (state, byte) {
            (ScanState::OutsideString, b'"') => ScanState::InsideString,
            (ScanState::OutsideString, b'{' | b'}' | b'[' | b']') => {
                structural.push((idx, byte));
                ScanState::OutsideString
            }
            (ScanState::OutsideString, _) => ScanState::OutsideString,
            (ScanState::InsideString, b'\\') => ScanState::EscapePending,
            (ScanState::InsideString, b'"') => ScanState::OutsideString,
            (ScanState::InsideString, _) => ScanState::InsideString,
            (ScanState::EscapePending, _) => ScanState::InsideString,
        };
    }

    Scan {
        structural,
        end_state: state,
    }
}

/// Opening byte offsets still unclosed after `tokens`, innermost last.
///
/// A closer that does not match the innermost opener is ignored.
fn open_stack(tokens: &[(usize, u8)]) -> Vec<(usize, u8)> {
    let mut stack: Vec<(usize, u8)> = Vec::new();
    for &(idx, byte) in tokens {
        match byte {
            b'{' | b'[' => stack.push((idx, byte)),
            b'}' if stack.last().is_some_and(|&(_, b)| b == b'{') => {
                stack.pop();
            }
            b']' if stack.last().is_some_and(|&(_, b)| b == b'[') => {
                stack.pop();
            }
            _ => {}
        }
    }
    stack
}

/// Walk backward from the brace at `tokens[close]` to the `{` that balances it.
fn matching_open(tokens: &[(usize, u8)], close: usize) -> Option<usize> {
    let mut depth = 0usize;
    for i in (0..=close).rev() {
        match tokens[i].1 {
            b'}' => depth += 1,
            b'{' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Repair `text` so a strict JSON parser has the best chance of accepting it.
///
/// Well-formed input comes back unchanged apart from surrounding whitespace.
pub fn repair_json(text: &str) -> String {
    let mut out = text.trim().to_string();

    // 1. Close an unterminated string. A dangling backslash would escape the
    //    closing quote, so it goes first.
    match scan(&out).end_state {
        ScanState::OutsideString => {}
        ScanState::InsideString => out.push('"'),
        ScanState::EscapePending => {
            out.pop();
            out.push('"');
        }
    }

    // 2. Drop whatever follows the last complete object.
    let tokens = scan(&out).structural;
    if let Some(close) = tokens.iter().rposition(|&(_, b)| b == b'}') {
        let close_idx = tokens[close].0;
        match matching_open(&tokens, close) {
            Some(open) if open_stack(&tokens[..open]).is_empty() => {
                out = out[tokens[open].0..=close_idx].to_string();
            }
            _ => out.truncate(close_idx + 1),
        }
    }

    // 3. Balance structures opened but never closed.
    let missing = open_stack(&scan(&out).structural);
    if !missing.is_empty() {
        let trimmed_len = out.trim_end_matches(|c: char| c.is_whitespace() || c == ',').len();
        out.truncate(trimmed_len);
        for &(_, opener) in missing.iter().rev() {
            out.push(if opener == b'{' { '}' } else { ']' });
        }
    }

    out
}

/// Extract, repair and strictly parse a raw model response.
///
/// The extracted candidate is tried as-is first; only if that fails is it
/// repaired. The returned error is the one from the repaired attempt.
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let candidate = extract_json(raw);
    match serde_json::from_str(candidate) {
        Ok(value) => Ok(value),
        Err(e) => {
            debug!(error = %e, truncated = looks_truncated(&e), "Strict parse failed; repairing");
            serde_json::from_str(&repair_json(candidate))
        }
    }
}

/// Recover individual stories from text that does not parse as a whole.
///
/// Each story object is located by its opening `{"title_hu":`. The span of a
/// story runs to the next story start; the last one runs to the final `}` (or
/// the end of the text). Each span is parsed on its own, first as the leading
/// complete value and then after repair. Spans that still fail are dropped.
///
/// Stories whose first key is not `title_hu` are not found.
pub fn salvage_stories(text: &str) -> Vec<Story> {
    let starts: Vec<usize> = STORY_START.find_iter(text).map(|m| m.start()).collect();
    let mut stories = Vec::new();

    for (i, &start) in starts.iter().enumerate() {
        let end = match starts.get(i + 1) {
            Some(&next) => next,
            None => text
                .rfind('}')
                .map(|p| p + 1)
                .filter(|&e| e > start)
                .unwrap_or(text.len()),
        };
        let span = &text[start..end];

        match parse_story_span(span) {
            Some(story) => stories.push(story),
            None => warn!(index = i, span_len = span.len(), "Dropping story span that could not be parsed"),
        }
    }

    debug!(found = starts.len(), recovered = stories.len(), "Story salvage finished");
    stories
}

fn parse_story_span(span: &str) -> Option<Story> {
    let mut leading = serde_json::Deserializer::from_str(span).into_iter::<Story>();
    if let Some(Ok(story)) = leading.next() {
        return Some(story);
    }
    serde_json::from_str::<Story>(&repair_json(span)).ok()
}
