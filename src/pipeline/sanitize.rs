//! Response sanitisation: turn model output into valid JSON, or say why not.
//!
//! Even well-prompted models wrap JSON in ` ```json ` fences, append a
//! friendly sentence after the closing brace, or leave a trailing comma
//! before `}`. The rules here fix those quirks deterministically. They never
//! invent structure: if the repaired text still does not parse, the
//! *original* text is returned and the caller reports a parse failure.
//!
//! ## Rule Order
//!
//! 1. Strip the outer fence.
//! 2. Parse; done if valid.
//! 3. Truncate after the last top-level `}`; parse.
//! 4. Remove trailing commas before `}` / `]`; parse.
//! 5. Give back the input unchanged.
//!
//! [`sanitize`] is idempotent: a valid result is already fence-free and
//! trimmed, and an unrepairable input is returned verbatim.

use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Number of trailing characters kept in a [`ExtractError::ParseFailure`].
pub const FRAGMENT_CHARS: usize = 200;

/// Apply the repair rules to raw model output.
pub fn sanitize(raw: &str) -> String {
    let stripped = strip_fence(raw);
    if is_valid_json(stripped) {
        debug!("Model output is valid JSON ({} bytes)", stripped.len());
        return stripped.to_string();
    }
    warn!("Model output is not valid JSON, attempting repair");

    let truncated = truncate_after_last_object(stripped);
    if is_valid_json(truncated) {
        debug!(
            "Removed {} trailing byte(s) after the JSON object",
            stripped.len() - truncated.len()
        );
        return truncated.to_string();
    }

    let decomma = remove_trailing_commas(truncated);
    if is_valid_json(&decomma) {
        debug!("Removed trailing comma(s)");
        return decomma;
    }

    warn!("Could not repair model output; returning it unchanged");
    raw.to_string()
}

fn is_valid_json(s: &str) -> bool {
    serde_json::from_str::<Value>(s).is_ok()
}

// ── Rule 1: Strip outer fence ───────────────────────────────────────────────

static RE_FENCE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Za-z][\w+.-]*)?[ \t]*\r?\n").unwrap());

/// Strip a leading and/or trailing triple-backtick fence, with an optional
/// language tag on the opening line.
pub fn strip_fence(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = match RE_FENCE_TAG.find(rest) {
            Some(m) => &rest[m.end()..],
            None => rest.strip_prefix("json").unwrap_or(rest),
        };
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

// ── Rule 3: Truncate trailing content ───────────────────────────────────────

/// Byte offset of the `}` that closes the last top-level object, skipping
/// braces inside string literals.
fn last_top_level_close(s: &str) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut last = None;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = (depth - 1).max(0);
                if depth == 0 && c == '}' {
                    last = Some(i);
                }
            }
            _ => {}
        }
    }
    last
}

fn truncate_after_last_object(s: &str) -> &str {
    match last_top_level_close(s).or_else(|| s.rfind('}')) {
        Some(end) if end + 1 < s.len() => &s[..=end],
        _ => s,
    }
}

// ── Rule 4: Trailing commas ─────────────────────────────────────────────────

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());

fn remove_trailing_commas(s: &str) -> String {
    RE_TRAILING_COMMA.replace_all(s, "$1").into_owned()
}

// ── JSON location in conversational replies ─────────────────────────────────

/// Find the JSON object inside a conversational reply.
///
/// Strategies, first match wins: a ` ```json ` block, any fenced block, the
/// span from the first `{` to the last `}`, the whole trimmed text. `None`
/// only for blank input.
pub fn locate_json(text: &str) -> Option<&str> {
    if text.trim().is_empty() {
        return None;
    }

    if let Some(open) = text.find("```json") {
        let start = open + "```json".len();
        if let Some(len) = text[start..].find("```") {
            return Some(text[start..start + len].trim());
        }
    }

    if let Some(open) = text.find("```") {
        let mut start = open + 3;
        if let Some(nl) = text[start..].find('\n') {
            start += nl + 1;
        }
        if let Some(len) = text[start..].find("```") {
            return Some(text[start..start + len].trim());
        }
    }

    if let (Some(open), Some(close)) = (text.find('{'), text.rfind('}')) {
        if close > open {
            return Some(text[open..=close].trim());
        }
    }

    Some(text.trim())
}

// ── Parsing ─────────────────────────────────────────────────────────────────

/// Sanitize a schema reply and parse it into a JSON object.
pub fn parse_schema(raw: &str) -> Result<Value, ExtractError> {
    parse_object(raw, &sanitize(raw))
}

/// Locate, sanitize and parse a JSON object embedded in conversational text.
pub fn parse_located(raw: &str) -> Result<Value, ExtractError> {
    let located = locate_json(raw).ok_or_else(|| ExtractError::ParseFailure {
        detail: "response was empty".into(),
        fragment: String::new(),
    })?;
    parse_object(raw, &sanitize(located))
}

fn parse_object(raw: &str, candidate: &str) -> Result<Value, ExtractError> {
    let value: Value = serde_json::from_str(candidate).map_err(|e| ExtractError::ParseFailure {
        detail: e.to_string(),
        fragment: tail(raw, FRAGMENT_CHARS),
    })?;
    if !value.is_object() {
        return Err(ExtractError::ParseFailure {
            detail: "expected a JSON object at the top level".into(),
            fragment: tail(raw, FRAGMENT_CHARS),
        });
    }
    Ok(value)
}

/// The last `n` characters of `s`.
pub fn tail(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_trailing_comma_is_repaired() {
        let raw = "```json\n{\"a\":1,}\n```";
        let out = sanitize(raw);
        assert_eq!(out, "{\"a\":1}");
        assert_eq!(serde_json::from_str::<Value>(&out).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn strip_fence_variants() {
        assert_eq!(strip_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_fence("  ```\n[1]\n```  "), "[1]");
        assert_eq!(strip_fence("```JSON \n{}```"), "{}");
        assert_eq!(strip_fence("```json{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_fence("{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn fence_round_trip_with_whitespace() {
        let bodies = [
            json!({"a": 1, "b": [true, null, "x"]}),
            json!([1, 2, 3]),
            json!({"nested": {"deep": {"s": "with ``` inside"}}}),
            json!("plain string"),
        ];
        for body in bodies {
            let text = serde_json::to_string_pretty(&body).unwrap();
            for wrapped in [
                format!("```json\n{text}\n```"),
                format!("\n\n  ```json\n{text}\n```\n\t "),
                format!("```\n{text}\n```"),
            ] {
                let out: Value = serde_json::from_str(&sanitize(&wrapped)).unwrap();
                assert_eq!(out, body, "input: {wrapped:?}");
            }
        }
    }

    #[test]
    fn trailing_prose_is_cut() {
        let raw = "{\"title\": \"Form {A}\"}\n\nLet me know if you need changes!";
        assert_eq!(sanitize(raw), "{\"title\": \"Form {A}\"}");
    }

    #[test]
    fn brace_inside_string_does_not_fool_truncation() {
        let raw = "{\"a\": \"}\", \"b\": 2} trailing";
        assert_eq!(sanitize(raw), "{\"a\": \"}\", \"b\": 2}");
    }

    #[test]
    fn trailing_comma_in_array() {
        assert_eq!(sanitize("{\"a\": [1, 2, ], }"), "{\"a\": [1, 2]}");
    }

    #[test]
    fn unrepairable_input_is_returned_unchanged() {
        let raw = "```json\n{\"a\": {\"b\": 1\n```";
        assert_eq!(sanitize(raw), raw);
        assert_eq!(sanitize("no json here"), "no json here");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "",
            "   ",
            "```json\n{\"a\":1,}\n```",
            "{\"a\": 1} and then some",
            "```\n[1,2,]\n```",
            "{\"a\": {\"b\": 1",
            "plain prose",
            "```json\n```",
            "{\"a\": \"}\",}",
            "\u{feff}{\"x\": 1}",
        ];
        for x in inputs {
            let once = sanitize(x);
            assert_eq!(sanitize(&once), once, "input: {x:?}");
        }
    }

    #[test]
    fn locate_prefers_json_fence() {
        let text = "Sure!\n```json\n{\"a\":1}\n```\nAlso ```\n{\"b\":2}\n```";
        assert_eq!(locate_json(text), Some("{\"a\":1}"));
    }

    #[test]
    fn locate_generic_fence_skips_language_line() {
        let text = "Here:\n```javascript\n{\"b\":2}\n```";
        assert_eq!(locate_json(text), Some("{\"b\":2}"));
    }

    #[test]
    fn locate_brace_span() {
        let text = "Here you go: {\"primaryButton\":\"1A2B3C\"} enjoy!";
        assert_eq!(locate_json(text), Some("{\"primaryButton\":\"1A2B3C\"}"));
    }

    #[test]
    fn locate_falls_back_to_trimmed_text() {
        assert_eq!(locate_json("  nothing useful  "), Some("nothing useful"));
        assert_eq!(locate_json("} backwards {"), Some("} backwards {"));
        assert_eq!(locate_json("  \n "), None);
    }

    #[test]
    fn parse_failure_carries_tail_fragment() {
        let raw = format!("{{\"properties\": {{{}", "\"f\": 1, ".repeat(60));
        let err = parse_schema(&raw).unwrap_err();
        match err {
            ExtractError::ParseFailure { fragment, .. } => {
                assert_eq!(fragment.chars().count(), FRAGMENT_CHARS);
                assert!(raw.ends_with(&fragment));
            }
            other => panic!("expected ParseFailure, got {other:?}"),
        }
    }

    #[test]
    fn parse_schema_requires_object() {
        assert!(parse_schema("[1, 2]").is_err());
        assert_eq!(parse_schema("{\"a\":1,}").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn parse_located_handles_conversation() {
        let v = parse_located("I think:\n```json\n{\"accent\": \"#112233\",}\n```").unwrap();
        assert_eq!(v, json!({"accent": "#112233"}));
        assert!(matches!(
            parse_located(""),
            Err(ExtractError::ParseFailure { .. })
        ));
    }

    #[test]
    fn tail_is_char_safe() {
        assert_eq!(tail("héllo", 3), "llo");
        assert_eq!(tail("ab", 10), "ab");
    }
}
