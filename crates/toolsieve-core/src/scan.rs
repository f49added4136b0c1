//! Balanced-text scanning helpers shared by the batch parser and the streaming sieve.
//!
//! Every routine here is a pure function over `(text, index)`. Indices are byte
//! offsets; all delimiters we look for are ASCII, so every offset returned is
//! also a valid char boundary.

/// The key that marks a tool-call payload in model output.
pub const TOOL_CALLS_KEY: &str = "tool_calls";

/// Triple-backtick code fence marker.
pub const FENCE_MARKER: &str = "```";

/// Given `text[start] == '{'`, return the balanced object and the index just past
/// its closing brace. Quoted strings (double or single quotes, backslash-escaped)
/// are skipped. Returns `None` if the text ends before the object closes.
pub fn extract_balanced_object(text: &str, start: usize) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (i, &ch) in bytes.iter().enumerate().skip(start) {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == b'\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            b'"' | b'\'' => quote = Some(ch),
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = i + 1;
                    return Some((&text[start..end], end));
                }
            }
            _ => {}
        }
    }

    None
}

/// Scan the depth-1 members of the object starting at `object_start` and return
/// the index where the value of the first key matching any of `keys` begins
/// (after the colon and any whitespace).
///
/// Values are located, not parsed. Returns `None` if no key matched before the
/// object closed or the text ran out.
pub fn find_key_value_start(text: &str, object_start: usize, keys: &[&str]) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(object_start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    let mut i = object_start;

    while i < bytes.len() {
        let ch = bytes[i];
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == b'\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match ch {
            b'"' | b'\'' if depth == 1 => {
                let (key, end) = parse_quoted_string(text, i)?;
                let colon = skip_spaces(text, end);
                if bytes.get(colon) != Some(&b':') {
                    // A string value, not a key.
                    i = end;
                    continue;
                }
                let value = skip_spaces(text, colon + 1);
                if value >= bytes.len() {
                    return None;
                }
                if keys.contains(&key.as_str()) {
                    return Some(value);
                }
                i = value;
                continue;
            }
            b'"' | b'\'' => quote = Some(ch),
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return None;
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Decode a JSON string literal starting at `text[quote_start] == '"'`.
///
/// Returns the decoded value and the index just past the closing quote, or
/// `None` if the literal is not terminated yet.
pub fn parse_quoted_string(text: &str, quote_start: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(quote_start) != Some(&b'"') {
        return None;
    }

    let mut escaped = false;
    let mut close = None;
    for (i, &ch) in bytes.iter().enumerate().skip(quote_start + 1) {
        if escaped {
            escaped = false;
        } else if ch == b'\\' {
            escaped = true;
        } else if ch == b'"' {
            close = Some(i);
            break;
        }
    }
    let close = close?;
    let literal = &text[quote_start..=close];

    let decoded = serde_json::from_str::<String>(literal)
        .unwrap_or_else(|_| unescape_lenient(&text[quote_start + 1..close]));
    Some((decoded, close + 1))
}

/// Drop backslashes, keeping the escaped character verbatim. Used only when a
/// literal carries escapes that JSON does not define.
pub(crate) fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut escaped = false;
    for ch in raw.chars() {
        if escaped {
            out.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Advance past ASCII JSON whitespace.
pub fn skip_spaces(text: &str, mut i: usize) -> usize {
    let bytes = text.as_bytes();
    while i < bytes.len() && matches!(bytes[i], b' ' | b'\t' | b'\n' | b'\r') {
        i += 1;
    }
    i
}

/// ASCII case-insensitive search for `tool_calls`, starting at `from`.
pub fn find_tool_calls_key(text: &str, from: usize) -> Option<usize> {
    let hay = text.as_bytes();
    let needle = TOOL_CALLS_KEY.as_bytes();
    if from >= hay.len() || hay.len() - from < needle.len() {
        return None;
    }
    (from..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// True when `text` has an odd number of fence markers, i.e. the end of
/// `text` sits inside a fenced code block.
pub fn inside_code_fence(text: &str) -> bool {
    !text.is_empty() && text.matches(FENCE_MARKER).count() % 2 == 1
}

/// Position of the `{` that encloses the `tool_calls` key at `key_index`,
/// found by walking backward to the nearest brace.
pub fn enclosing_brace(text: &str, key_index: usize) -> Option<usize> {
    text[..key_index].rfind('{')
}

/// First `tool_calls` key that has an enclosing `{`, with that brace's offset.
///
/// A bare mention of the key in prose has no brace before it and is skipped,
/// so a real object later in the same text is still found.
pub fn find_enclosed_key(text: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    while let Some(key) = find_tool_calls_key(text, offset) {
        if let Some(start) = enclosing_brace(text, key) {
            return Some((key, start));
        }
        offset = key + TOOL_CALLS_KEY.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_balanced_object_simple() {
        let text = r#"prefix {"a":{"b":1}} suffix"#;
        let start = text.find('{').unwrap();
        let (obj, end) = extract_balanced_object(text, start).unwrap();
        assert_eq!(obj, r#"{"a":{"b":1}}"#);
        assert_eq!(&text[end..], " suffix");
    }

    #[test]
    fn test_extract_balanced_object_ignores_braces_in_strings() {
        let text = r#"{"content":"{not a brace}","q":'}'}"#;
        let (obj, end) = extract_balanced_object(text, 0).unwrap();
        assert_eq!(obj, text);
        assert_eq!(end, text.len());
    }

    #[test]
    fn test_extract_balanced_object_escaped_quote() {
        let text = r#"{"a":"say \"}\" now"}"#;
        let (obj, _) = extract_balanced_object(text, 0).unwrap();
        assert_eq!(obj, text);
    }

    #[test]
    fn test_extract_balanced_object_incomplete() {
        assert!(extract_balanced_object(r#"{"a":{"b":1}"#, 0).is_none());
        assert!(extract_balanced_object("no brace", 0).is_none());
        assert!(extract_balanced_object("{", 5).is_none());
    }

    #[test]
    fn test_find_key_value_start_top_level_only() {
        let text = r#"{"function":{"name":"inner"},"name": "outer"}"#;
        let at = find_key_value_start(text, 0, &["name"]).unwrap();
        assert_eq!(&text[at..at + 7], r#""outer""#);
    }

    #[test]
    fn test_find_key_value_start_skips_string_values() {
        let text = r#"{"title":"name","input":{"q":1}}"#;
        let at = find_key_value_start(text, 0, &["name", "input"]).unwrap();
        assert_eq!(&text[at..at + 1], "{");
    }

    #[test]
    fn test_find_key_value_start_missing() {
        assert!(find_key_value_start(r#"{"a":1}"#, 0, &["b"]).is_none());
        assert!(find_key_value_start(r#"{"a":"#, 0, &["a"]).is_none());
    }

    #[test]
    fn test_parse_quoted_string_decodes_escapes() {
        let text = r#""line\nbreak A \"q\"" tail"#;
        let (value, end) = parse_quoted_string(text, 0).unwrap();
        assert_eq!(value, "line\nbreak A \"q\"");
        assert_eq!(&text[end..], " tail");
    }

    #[test]
    fn test_parse_quoted_string_incomplete() {
        assert!(parse_quoted_string(r#""open"#, 0).is_none());
        assert!(parse_quoted_string(r#""ends with escape\""#, 0).is_none());
    }

    #[test]
    fn test_parse_quoted_string_lenient_escape() {
        let (value, _) = parse_quoted_string(r#""a\qb""#, 0).unwrap();
        assert_eq!(value, "aqb");
    }

    #[test]
    fn test_find_tool_calls_key_case_insensitive() {
        assert_eq!(find_tool_calls_key(r#"{"TOOL_CALLS":[]}"#, 0), Some(2));
        assert_eq!(find_tool_calls_key("tool_call", 0), None);
        assert_eq!(find_tool_calls_key("x tool_calls y tool_calls", 3), Some(15));
    }

    #[test]
    fn test_find_enclosed_key_skips_bare_mentions() {
        let text = r#"I will emit tool_calls now. {"tool_calls":[]}"#;
        let (key, start) = find_enclosed_key(text).unwrap();
        assert_eq!(start, text.find('{').unwrap());
        assert_eq!(key, start + 2);
        assert_eq!(find_enclosed_key("only tool_calls here"), None);
    }

    #[test]
    fn test_find_tool_calls_key_multibyte_text() {
        let text = "这里是示例：{\"tool_calls\":[]}";
        let at = find_tool_calls_key(text, 0).unwrap();
        assert_eq!(&text[at..at + 10], "tool_calls");
    }

    #[test]
    fn test_inside_code_fence() {
        assert!(!inside_code_fence(""));
        assert!(inside_code_fence("```json\n"));
        assert!(!inside_code_fence("```a``` text"));
        assert!(inside_code_fence("```a``` text ```"));
    }
}
