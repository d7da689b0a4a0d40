//! Sync event JSON.
//!
//! Events are single-line JSON strings with fixed field order; the host
//! parses them as a versioned wire format, so they are assembled by hand
//! rather than through a serializer.

use crate::state::SyncState;

/// Escapes a string for embedding in a JSON string literal.
pub fn escape_json(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

pub(crate) fn state_event(state: SyncState) -> String {
    format!("{{\"type\":\"state\",\"state\":\"{}\"}}", state.as_str())
}

pub(crate) fn sync_start(reason: &str) -> String {
    format!("{{\"type\":\"sync_start\",\"reason\":\"{}\"}}", escape_json(reason))
}

pub(crate) fn sync_queued(reason: &str) -> String {
    format!("{{\"type\":\"sync_queued\",\"reason\":\"{}\"}}", escape_json(reason))
}

pub(crate) fn phase_pull(attempt: i32) -> String {
    format!("{{\"type\":\"phase\",\"phase\":\"pull\",\"attempt\":{attempt}}}")
}

pub(crate) fn phase_push() -> String {
    "{\"type\":\"phase\",\"phase\":\"push\"}".to_string()
}

pub(crate) fn sync_retry(attempt: i32) -> String {
    format!("{{\"type\":\"sync_retry\",\"attempt\":{attempt}}}")
}

pub(crate) fn retry_scheduled(attempt: i32, delay_ms: i64, message: &str) -> String {
    format!(
        "{{\"type\":\"retry_scheduled\",\"attempt\":{attempt},\"delayMs\":{delay_ms},\"message\":\"{}\"}}",
        escape_json(message)
    )
}

pub(crate) fn http_pull(status: i32) -> String {
    format!("{{\"type\":\"http\",\"phase\":\"pull\",\"status\":{status}}}")
}

pub(crate) fn auth_required() -> String {
    "{\"type\":\"auth_required\"}".to_string()
}

pub(crate) fn auth_failed(message: &str) -> String {
    format!("{{\"type\":\"auth_failed\",\"message\":\"{}\"}}", escape_json(message))
}

pub(crate) fn error(message: &str) -> String {
    format!("{{\"type\":\"error\",\"message\":\"{}\"}}", escape_json(message))
}

pub(crate) fn sync_cancelled() -> String {
    "{\"type\":\"sync_cancelled\"}".to_string()
}
