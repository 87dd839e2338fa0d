//! Isolate the JSON payload from a raw model response.
//!
//! Models wrap JSON in prose or code fences despite instructions, and when
//! they hit the output token cap the object is left unterminated. Extraction is
//! therefore lenient at the front and leaves the damaged tail for
//! [`crate::repair`] to deal with.

/// Return the candidate JSON substring of `response`.
///
/// 1. Prefer a fenced block tagged `json`, then any fenced block, then the
///    whole trimmed text. A fence that is never closed runs to the end.
/// 2. Within that span, slice from the first `{` to the last `}`. Without a
///    closing brace the text is kept from the first `{` onward, unterminated.
///
/// A top-level array of objects (`[` directly followed by the first `{`) is
/// sliced the same way on `[`/`]`.
pub fn extract_json(response: &str) -> &str {
    let span = fenced_block(response).unwrap_or(response).trim();

    let first_brace = span.find('{');
    let first_bracket = span.find('[');
    if let (Some(open), Some(brace)) = (first_bracket, first_brace) {
        if open < brace && span[open + 1..brace].trim().is_empty() {
            return slice_between(span, open, ']');
        }
    }
    match first_brace {
        Some(open) => slice_between(span, open, '}'),
        None => span,
    }
}

fn slice_between(span: &str, open: usize, close: char) -> &str {
    match span.rfind(close) {
        Some(end) if end > open => &span[open..=end],
        _ => &span[open..],
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    const JSON_FENCE: &str = "```json";
    const FENCE: &str = "```";

    let body_start = if let Some(pos) = text.find(JSON_FENCE) {
        pos + JSON_FENCE.len()
    } else {
        let pos = text.find(FENCE)?;
        // Skip a language tag on the opening fence line, if any.
        let after = pos + FENCE.len();
        let line_end = text[after..].find('\n').map(|i| after + i + 1).unwrap_or(after);
        if text[after..line_end].trim().chars().all(|c| c.is_ascii_alphanumeric()) {
            line_end
        } else {
            after
        }
    };

    let rest = &text[body_start..];
    Some(match rest.find(FENCE) {
        Some(end) => &rest[..end],
        None => rest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_is_returned_trimmed() {
        assert_eq!(extract_json("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_json_fence_preferred() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```\nHope this helps!";
        assert_eq!(extract_json(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_untagged_fence() {
        let raw = "```\n{\"a\": [1, 2]}\n```";
        assert_eq!(extract_json(raw), "{\"a\": [1, 2]}");
    }

    #[test]
    fn test_other_language_tag_skipped() {
        let raw = "```javascript\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_leading_and_trailing_prose_discarded() {
        let raw = "Sure! {\"stories\": []} Let me know if you need more.";
        assert_eq!(extract_json(raw), "{\"stories\": []}");
    }

    #[test]
    fn test_unterminated_fence_runs_to_end() {
        let raw = "```json\n{\"stories\": [{\"title_hu\": \"A\"}";
        assert_eq!(extract_json(raw), "{\"stories\": [{\"title_hu\": \"A\"}");
    }

    #[test]
    fn test_missing_closing_brace_kept_from_first_brace() {
        let raw = "Result: {\"a\": \"hello";
        assert_eq!(extract_json(raw), "{\"a\": \"hello");
    }

    #[test]
    fn test_top_level_array() {
        let raw = "```json\n[{\"story_id\": 1}, {\"story_id\": 2}]\n```";
        assert_eq!(extract_json(raw), "[{\"story_id\": 1}, {\"story_id\": 2}]");
    }

    #[test]
    fn test_array_inside_object_not_mistaken_for_top_level() {
        let raw = "{\"stories\": [1]}";
        assert_eq!(extract_json(raw), "{\"stories\": [1]}");
    }

    #[test]
    fn test_bracketed_prose_before_object() {
        let raw = "Note [1]: {\"a\": 1}";
        assert_eq!(extract_json(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_no_json_at_all() {
        assert_eq!(extract_json("  I cannot help with that.  "), "I cannot help with that.");
    }
}
