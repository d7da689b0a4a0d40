//! Request-id generation for sync traffic.

use uuid::Uuid;

/// Generates a fresh request id.
///
/// One id is generated per sync run and reused verbatim across retries and
/// auth refreshes, so server logs can correlate every attempt of one run.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_nonempty() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }
}
