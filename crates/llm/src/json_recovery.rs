//! Best-effort extraction of the first complete JSON value from free text.
//!
//! Models asked for `json_object` output sometimes wrap the JSON in prose
//! ("sure, here you go: {...}"). This scans for the first balanced
//! `{...}`/`[...]` span and tries to parse it. The scan is **not**
//! string-aware: braces inside string literals in the candidate text will
//! confuse the depth counter. That's a deliberate simplification — see
//! `is_confused_by_braces_inside_strings` below, which pins the (wrong but
//! expected) behavior rather than "fixing" it.

use serde_json::Value;

/// Try to recover a JSON value embedded in `text`. Returns `None` if no
/// balanced opener/closer pair can be found or the slice doesn't parse.
pub fn recover(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if (trimmed.starts_with('{') && trimmed.ends_with('}')) || (trimmed.starts_with('[') && trimmed.ends_with(']')) {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return Some(value);
        }
    }

    let brace = trimmed.find('{');
    let bracket = trimmed.find('[');

    let start = match (brace, bracket) {
        (Some(b), Some(k)) => b.min(k),
        (Some(b), None) => b,
        (None, Some(k)) => k,
        (None, None) => return None,
    };

    let opener = trimmed.as_bytes()[start];
    let closer = if opener == b'{' { b'}' } else { b']' };

    let mut depth: i32 = 0;
    let mut end = None;

    for (i, byte) in trimmed.bytes().enumerate().skip(start) {
        if byte == opener {
            depth += 1;
        } else if byte == closer {
            depth -= 1;
            if depth == 0 {
                end = Some(i);
                break;
            }
        }
    }

    let end = end?;
    serde_json::from_str(&trimmed[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bare_object() {
        assert_eq!(recover(r#"{"a":1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn recovers_object_with_surrounding_prose() {
        assert_eq!(
            recover("sure, here: {\"a\":1} trailing"),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn recovers_array_when_it_comes_first() {
        assert_eq!(recover("values: [1, 2, 3] done"), Some(json!([1, 2, 3])));
    }

    #[test]
    fn returns_none_when_no_opener_present() {
        assert_eq!(recover("no json here at all"), None);
    }

    #[test]
    fn is_confused_by_braces_inside_strings() {
        // The scanner isn't string-aware: the `}` inside the string literal
        // closes the object early, and the leftover `"}` breaks parsing of
        // the truncated slice. This is the documented, deliberate simplification.
        let text = r#"{"a": "contains a } brace", "b": 2}"#;
        assert_eq!(recover(text), None);
    }
}
