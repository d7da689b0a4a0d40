//! HTTP client abstraction.
//!
//! The host owns the real HTTP stack; the core only needs to issue a
//! request and receive exactly one completion callback.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// An HTTP request issued by the sync engine.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    /// HTTP method ("GET", "POST", ...).
    pub method: String,
    /// Absolute request URL.
    pub url: String,
    /// Header name/value pairs, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Request body (empty for GET).
    pub body: String,
    /// Timeout enforced by the host, in milliseconds.
    pub timeout_ms: i64,
}

impl HttpRequest {
    /// Returns the first header with the given name, if any.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// The host's answer to an [`HttpRequest`].
///
/// A `status_code` of 0 together with a nonempty `error_message` means the
/// request never produced an HTTP response (DNS failure, timeout, ...).
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// HTTP status code, or 0 on transport failure.
    pub status_code: i32,
    /// Response body.
    pub body: String,
    /// Transport error text, empty on success.
    pub error_message: String,
}

impl HttpResponse {
    /// Builds a successful response with the given status and body.
    pub fn ok(status_code: i32, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
            error_message: String::new(),
        }
    }

    /// Builds a transport-failure response.
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self {
            status_code: 0,
            body: String::new(),
            error_message: message.into(),
        }
    }
}

/// Completion callback for an HTTP request. Called exactly once.
pub type HttpCompletion = Box<dyn FnOnce(HttpResponse) + Send>;

/// Host-provided HTTP client.
pub trait HttpClient: Send + Sync {
    /// Issues `request` and eventually invokes `on_done` exactly once, on
    /// any thread.
    fn request(&self, request: HttpRequest, on_done: HttpCompletion);
}

/// A scripted HTTP client for tests.
///
/// Responses are handed out FIFO; every request is recorded so tests can
/// assert on URLs and headers. Completion callbacks run synchronously on
/// the calling thread.
#[derive(Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    /// Creates an empty mock with no scripted responses.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the next response to hand out.
    pub fn push_response(&self, response: HttpResponse) {
        self.responses.lock().push_back(response);
    }

    /// Returns all requests observed so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Returns how many requests were issued.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl HttpClient for MockHttpClient {
    fn request(&self, request: HttpRequest, on_done: HttpCompletion) {
        self.requests.lock().push(request);
        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| HttpResponse::transport_error("no scripted response"));
        on_done(response);
    }
}
