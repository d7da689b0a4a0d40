//! Pagination cursor handling.
//!
//! Pull responses may carry a `next` cursor; the follow-up request replaces
//! the `cursor` query parameter of the pull URL with it. The query string
//! is rebuilt with plain string splitting so every other parameter comes
//! through byte-for-byte untouched.

use serde_json::Value;

/// Percent-encodes `value` for use as a query parameter value.
///
/// Unreserved characters (alphanumerics and `-_.~`) pass through; every
/// other byte becomes `%XX` with uppercase hex.
pub fn url_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Rebuilds `base_url` with `cursor=<encoded_cursor>`.
///
/// An existing `cursor=` parameter is replaced in place; otherwise the
/// parameter is appended. All other query parameters keep their original
/// order and bytes.
pub fn build_url_with_cursor(base_url: &str, encoded_cursor: &str) -> String {
    let (base, query) = match base_url.find('?') {
        Some(pos) => (&base_url[..pos], &base_url[pos + 1..]),
        None => (base_url, ""),
    };

    let mut parts: Vec<String> = Vec::new();
    let mut replaced = false;
    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        if part.starts_with("cursor=") {
            parts.push(format!("cursor={encoded_cursor}"));
            replaced = true;
        } else {
            parts.push(part.to_string());
        }
    }
    if !replaced {
        parts.push(format!("cursor={encoded_cursor}"));
    }

    format!("{}?{}", base, parts.join("&"))
}

/// Extracts the pagination cursor from a pull response body.
///
/// Returns the cursor already percent-encoded: string cursors are encoded
/// directly, object/array (or any other non-null) cursors are serialized
/// to JSON first. `None` means pagination is finished: no `next`, a null
/// `next`, an empty cursor, or an unparsable body.
pub fn extract_next_cursor(body: &str) -> Option<String> {
    let root: Value = serde_json::from_str(body).ok()?;
    let next = root.as_object()?.get("next")?;
    match next {
        Value::Null => None,
        Value::String(s) => {
            if s.is_empty() {
                None
            } else {
                Some(url_encode(s))
            }
        }
        other => {
            let serialized = serde_json::to_string(other).ok()?;
            if serialized.is_empty() {
                None
            } else {
                Some(url_encode(&serialized))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_passes_unreserved_through() {
        assert_eq!(url_encode("abc-DEF_123.~"), "abc-DEF_123.~");
        assert_eq!(url_encode("a b"), "a%20b");
        assert_eq!(url_encode("{\"k\":\"v\"}"), "%7B%22k%22%3A%22v%22%7D");
        assert_eq!(url_encode("ü"), "%C3%BC");
    }

    #[test]
    fn cursor_appended_when_absent() {
        assert_eq!(
            build_url_with_cursor("https://h/pull", "abc"),
            "https://h/pull?cursor=abc"
        );
        assert_eq!(
            build_url_with_cursor("https://h/pull?sequenceId=seq-1", "abc"),
            "https://h/pull?sequenceId=seq-1&cursor=abc"
        );
    }

    #[test]
    fn cursor_replaced_in_place() {
        assert_eq!(
            build_url_with_cursor("https://h/pull?cursor=old&sequenceId=seq-1", "new"),
            "https://h/pull?cursor=new&sequenceId=seq-1"
        );
    }

    #[test]
    fn other_parameters_preserved_verbatim() {
        let url = build_url_with_cursor(
            "https://h/pull?sequenceId=seq%2D1&limit=50&cursor=x",
            "y",
        );
        assert_eq!(url, "https://h/pull?sequenceId=seq%2D1&limit=50&cursor=y");
    }

    #[test]
    fn string_cursor_is_encoded() {
        assert_eq!(
            extract_next_cursor("{\"next\":\"cursor-token\"}"),
            Some("cursor-token".to_string())
        );
        assert_eq!(
            extract_next_cursor("{\"next\":\"a b\"}"),
            Some("a%20b".to_string())
        );
    }

    #[test]
    fn object_cursor_is_serialized_then_encoded() {
        assert_eq!(
            extract_next_cursor("{\"changes\":{},\"next\":{\"foo\":\"bar\"}}"),
            Some("%7B%22foo%22%3A%22bar%22%7D".to_string())
        );
    }

    #[test]
    fn null_absent_or_empty_ends_pagination() {
        assert_eq!(extract_next_cursor("{\"next\":null}"), None);
        assert_eq!(extract_next_cursor("{\"changes\":{}}"), None);
        assert_eq!(extract_next_cursor("{\"next\":\"\"}"), None);
        assert_eq!(extract_next_cursor("not json"), None);
        assert_eq!(extract_next_cursor("[]"), None);
    }
}
