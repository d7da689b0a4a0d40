//! The sync engine state machine.
//!
//! Single-flight pull/apply/push cycles with cursor pagination, bounded
//! retry, auth refresh, and cooperative cancellation. One mutex guards all
//! mutable state; events are emitted inside the critical section that
//! produced them, and every async continuation captures the `sync_id`
//! generation counter so work scheduled for a cancelled run falls through
//! as a no-op.

use brookdb_platform::{generate_request_id, HttpClient, HttpRequest, HttpResponse};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::config::SyncConfig;
use crate::cursor::{build_url_with_cursor, extract_next_cursor};
use crate::events;
use crate::state::SyncState;

/// Sink for the engine's JSON event stream.
pub type EventCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Applies a pull response body; returns the error message on failure.
pub type ApplyCallback = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// One-shot completion for a sync run: `(ok, error_message)`.
pub type CompletionCallback = Box<dyn FnOnce(bool, &str) + Send>;

/// Invoked when the engine needs a (new) auth token. The host answers by
/// calling [`SyncEngine::set_auth_token`] or [`SyncEngine::clear_auth_token`].
pub type AuthTokenRequestCallback = Arc<dyn Fn() + Send + Sync>;

/// One-shot completion handed to the push delegate.
pub type PushCompletion = Box<dyn FnOnce(bool, &str) + Send>;

/// Push delegate; called after all pull pages applied.
pub type PushChangesCallback = Arc<dyn Fn(PushCompletion) + Send + Sync>;

const CANCELLED_MESSAGE: &str = "cancelled_for_foreground";
const SHUTDOWN_MESSAGE: &str = "sync_engine_shutdown";
const AUTH_EXHAUSTED_MESSAGE: &str = "Max auth retries exceeded";
const MISSING_URL_MESSAGE: &str = "Missing sync pullEndpointUrl";

#[derive(Default)]
struct Inner {
    shutdown: bool,
    state: SyncState,
    config: SyncConfig,
    pull_endpoint_url: String,
    auth_token: String,

    event_callback: Option<EventCallback>,
    apply_callback: Option<ApplyCallback>,
    auth_token_request_callback: Option<AuthTokenRequestCallback>,
    push_changes_callback: Option<PushChangesCallback>,

    completion: Option<CompletionCallback>,
    pending_reason: Option<String>,
    pending_completion: Option<CompletionCallback>,

    sync_in_flight: bool,
    retry_scheduled: bool,
    retry_count: i32,
    auth_retry_count: i32,
    auth_request_in_flight: bool,
    sync_id: i64,
    current_reason: String,
    current_request_id: String,
    current_pull_url: String,
}

impl Inner {
    fn emit(&self, event: &str) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }

    fn set_state(&mut self, state: SyncState) {
        self.state = state;
    }

    /// Transitions to `error`, clears flight state, and hands back the
    /// stored completions for delivery outside the lock.
    fn fail(&mut self, message: &str) -> TakenCompletions {
        self.emit(&events::error(message));
        self.set_state(SyncState::Error);
        self.emit(&events::state_event(SyncState::Error));
        self.clear_flight()
    }

    fn clear_flight(&mut self) -> TakenCompletions {
        self.sync_in_flight = false;
        self.retry_scheduled = false;
        self.retry_count = 0;
        self.current_request_id.clear();
        self.current_pull_url.clear();
        self.pending_reason = None;
        (self.completion.take(), self.pending_completion.take())
    }

    fn should_retry(&self, status_code: i32) -> bool {
        if self.retry_count >= self.config.max_retries {
            return false;
        }
        matches!(status_code, 0 | 408 | 429 | 500..=599)
    }

    fn backoff_ms(&self) -> i64 {
        if self.retry_count <= 0 {
            return self.config.retry_initial_ms;
        }
        let shifted = self
            .config
            .retry_initial_ms
            .saturating_mul(1i64 << (self.retry_count - 1).min(32));
        shifted.min(self.config.retry_max_ms)
    }
}

type TakenCompletions = (Option<CompletionCallback>, Option<CompletionCallback>);

fn deliver(completions: TakenCompletions, ok: bool, message: &str) {
    let (completion, pending) = completions;
    if let Some(completion) = completion {
        completion(ok, message);
    }
    if let Some(pending) = pending {
        pending(ok, message);
    }
}

enum DispatchPlan {
    Abort,
    Fail(TakenCompletions, String),
    RequestAuth(Option<AuthTokenRequestCallback>),
    Issue(HttpRequest),
}

/// The sync engine.
///
/// One instance per database. Public entry points may be called from any
/// thread. Event listeners run under the engine lock and must not call
/// back into the engine.
pub struct SyncEngine {
    http: Arc<dyn HttpClient>,
    inner: Mutex<Inner>,
    // Handed to async continuations (HTTP, retry timer, push) so they can
    // re-enter the engine without keeping it alive past the host's drop.
    self_ref: Weak<SyncEngine>,
}

impl SyncEngine {
    /// Creates an idle engine over the host's HTTP client.
    pub fn new(http: Arc<dyn HttpClient>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            http,
            inner: Mutex::new(Inner::default()),
            self_ref: self_ref.clone(),
        })
    }

    /// Installs the event sink.
    pub fn set_event_callback(&self, callback: EventCallback) {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return;
        }
        inner.event_callback = Some(callback);
    }

    /// Installs the pull-body applier.
    pub fn set_apply_callback(&self, callback: ApplyCallback) {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return;
        }
        inner.apply_callback = Some(callback);
    }

    /// Installs the auth-token producer.
    pub fn set_auth_token_request_callback(&self, callback: AuthTokenRequestCallback) {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return;
        }
        inner.auth_token_request_callback = Some(callback);
    }

    /// Installs the push delegate.
    pub fn set_push_changes_callback(&self, callback: PushChangesCallback) {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return;
        }
        inner.push_changes_callback = Some(callback);
    }

    /// Parses and installs configuration, transitioning to `configured`.
    pub fn configure(&self, config_json: &str) {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return;
        }
        let config = SyncConfig::from_json(config_json);
        inner.pull_endpoint_url = config.pull_endpoint_url.clone();
        inner.config = config;
        inner.set_state(SyncState::Configured);
        inner.emit(&SyncState::Configured.to_json());
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> SyncConfig {
        self.inner.lock().config.clone()
    }

    /// Replaces the base URL used by subsequent pulls.
    pub fn set_pull_endpoint_url(&self, url: &str) {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return;
        }
        inner.pull_endpoint_url = url.to_string();
    }

    /// Stores a token. When the engine was parked in `auth_required` with
    /// no sync in flight, the run restarts with reason
    /// `"auth_token_updated"`, inheriting the stored completion.
    pub fn set_auth_token(&self, token: &str) {
        let restart_completion;
        let should_restart;
        {
            let mut inner = self.inner.lock();
            if inner.shutdown {
                return;
            }
            inner.auth_token = token.to_string();
            inner.auth_request_in_flight = false;

            should_restart = !inner.sync_in_flight && inner.state == SyncState::AuthRequired;
            restart_completion = if should_restart {
                inner.completion.take()
            } else {
                None
            };
        }
        if should_restart {
            self.start_inner("auth_token_updated", restart_completion);
        }
    }

    /// Drops the stored token and the in-flight auth-request flag.
    pub fn clear_auth_token(&self) {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return;
        }
        inner.auth_token.clear();
        inner.auth_request_in_flight = false;
    }

    /// Fire-and-forget sync.
    pub fn start(&self, reason: &str) {
        self.start_inner(reason, None);
    }

    /// Sync with a one-shot completion. While a run is in flight the
    /// `(reason, completion)` pair occupies the single pending slot,
    /// replacing whatever was there.
    pub fn start_with_completion(&self, reason: &str, completion: CompletionCallback) {
        self.start_inner(reason, Some(completion));
    }

    /// Cancels everything pending or in flight and returns to `idle`.
    /// Stored completions fire with `"cancelled_for_foreground"`. No-op
    /// when idle.
    pub fn cancel_sync(&self) {
        let completions = {
            let mut inner = self.inner.lock();
            if inner.shutdown {
                return;
            }
            let anything_active = inner.sync_in_flight
                || inner.retry_scheduled
                || inner.pending_reason.is_some()
                || inner.completion.is_some()
                || inner.pending_completion.is_some()
                || inner.state == SyncState::AuthRequired;
            if !anything_active {
                return;
            }

            // Invalidate every scheduled continuation before anything else.
            inner.sync_id += 1;
            inner.auth_request_in_flight = false;
            inner.auth_retry_count = 0;
            inner.emit(&events::sync_cancelled());
            inner.set_state(SyncState::Idle);
            inner.emit(&events::state_event(SyncState::Idle));
            inner.clear_flight()
        };
        deliver(completions, false, CANCELLED_MESSAGE);
    }

    /// Current state as `{"state":"<name>"}`.
    pub fn state_json(&self) -> String {
        self.inner.lock().state.to_json()
    }

    /// Permanently shuts the engine down. Stored completions fire with
    /// `"sync_engine_shutdown"`; any later `start*` completes immediately
    /// with the same message.
    pub fn shutdown(&self) {
        let completions = {
            let mut inner = self.inner.lock();
            inner.shutdown = true;
            inner.event_callback = None;
            inner.apply_callback = None;
            inner.auth_token_request_callback = None;
            inner.push_changes_callback = None;
            inner.auth_request_in_flight = false;
            inner.set_state(SyncState::Idle);
            inner.sync_id += 1;
            inner.current_reason.clear();
            inner.clear_flight()
        };
        deliver(completions, false, SHUTDOWN_MESSAGE);
    }

    fn start_inner(&self, reason: &str, completion: Option<CompletionCallback>) {
        let sync_id;
        {
            let mut inner = self.inner.lock();
            if inner.shutdown {
                drop(inner);
                if let Some(completion) = completion {
                    completion(false, SHUTDOWN_MESSAGE);
                }
                return;
            }
            if inner.sync_in_flight {
                inner.pending_reason = Some(reason.to_string());
                inner.pending_completion = completion;
                inner.emit(&events::sync_queued(reason));
                return;
            }

            inner.sync_in_flight = true;
            inner.retry_scheduled = false;
            inner.retry_count = 0;
            inner.current_reason = reason.to_string();
            if let Some(completion) = completion {
                inner.completion = Some(completion);
            }

            // Resuming after an auth refresh keeps the pagination position,
            // the request id, and the auth-retry budget; anything else
            // starts a fresh run.
            let resume_from_auth =
                inner.state == SyncState::AuthRequired && !inner.current_pull_url.is_empty();
            if !resume_from_auth {
                inner.auth_retry_count = 0;
                inner.current_request_id = generate_request_id();
                inner.current_pull_url = inner.pull_endpoint_url.clone();
            } else if inner.current_request_id.is_empty() {
                inner.current_request_id = generate_request_id();
            }

            inner.set_state(SyncState::SyncRequested);
            inner.emit(&events::state_event(SyncState::SyncRequested));
            inner.emit(&events::sync_start(reason));
            inner.sync_id += 1;
            sync_id = inner.sync_id;
        }
        self.dispatch_request(sync_id, false);
    }

    fn dispatch_request(&self, sync_id: i64, is_retry: bool) {
        let plan = {
            let mut inner = self.inner.lock();
            if inner.shutdown || sync_id != inner.sync_id {
                DispatchPlan::Abort
            } else {
                if inner.current_request_id.is_empty() {
                    inner.current_request_id = generate_request_id();
                }
                let url = if inner.current_pull_url.is_empty() {
                    inner.pull_endpoint_url.clone()
                } else {
                    inner.current_pull_url.clone()
                };

                if url.is_empty() {
                    let completions = inner.fail(MISSING_URL_MESSAGE);
                    DispatchPlan::Fail(completions, MISSING_URL_MESSAGE.to_string())
                } else if inner.auth_token.is_empty()
                    && inner.auth_token_request_callback.is_some()
                {
                    self.auth_plan(&mut inner)
                } else {
                    let attempt = inner.retry_count + 1;
                    inner.set_state(SyncState::Syncing);
                    inner.emit(&events::state_event(SyncState::Syncing));
                    inner.emit(&events::phase_pull(attempt));
                    if is_retry {
                        inner.emit(&events::sync_retry(attempt));
                    }

                    let mut headers = Vec::new();
                    if !inner.auth_token.is_empty() {
                        headers.push(("Authorization".to_string(), inner.auth_token.clone()));
                    }
                    headers.push(("X-Request-Id".to_string(), inner.current_request_id.clone()));
                    // Marker identifying native engine traffic in server logs.
                    headers.push(("x-sync-engine".to_string(), "1".to_string()));

                    DispatchPlan::Issue(HttpRequest {
                        method: "GET".to_string(),
                        url,
                        headers,
                        body: String::new(),
                        timeout_ms: inner.config.timeout_ms,
                    })
                }
            }
        };

        match plan {
            DispatchPlan::Abort => {}
            DispatchPlan::Fail(completions, message) => deliver(completions, false, &message),
            DispatchPlan::RequestAuth(callback) => {
                if let Some(callback) = callback {
                    callback();
                }
            }
            DispatchPlan::Issue(request) => {
                debug!(url = %request.url, "issuing pull request");
                let target = self.self_ref.clone();
                self.http.request(
                    request,
                    Box::new(move |response| {
                        if let Some(engine) = target.upgrade() {
                            engine.handle_response(sync_id, response);
                        }
                    }),
                );
            }
        }
    }

    /// Auth flow shared by dispatch (no token) and 401/403 handling.
    /// Assumes the lock is held.
    fn auth_plan(&self, inner: &mut Inner) -> DispatchPlan {
        if inner.auth_retry_count >= inner.config.max_auth_retries {
            inner.emit(&events::auth_failed(AUTH_EXHAUSTED_MESSAGE));
            inner.emit(&events::error(AUTH_EXHAUSTED_MESSAGE));
            inner.set_state(SyncState::AuthFailed);
            inner.emit(&events::state_event(SyncState::AuthFailed));
            let completions = inner.clear_flight();
            return DispatchPlan::Fail(completions, AUTH_EXHAUSTED_MESSAGE.to_string());
        }

        inner.set_state(SyncState::AuthRequired);
        inner.emit(&events::auth_required());
        inner.emit(&events::state_event(SyncState::AuthRequired));
        // The run parks: not in flight, but the completion and pagination
        // position stay latched for the restart that set_auth_token drives.
        inner.sync_in_flight = false;
        inner.retry_scheduled = false;
        inner.retry_count = 0;

        let callback = if !inner.auth_request_in_flight {
            inner.auth_request_in_flight = true;
            inner.auth_retry_count += 1;
            inner.auth_token_request_callback.clone()
        } else {
            None
        };
        DispatchPlan::RequestAuth(callback)
    }

    fn handle_response(&self, sync_id: i64, response: HttpResponse) {
        enum ResponsePlan {
            Abort,
            Fail(TakenCompletions, String),
            RequestAuth(Option<AuthTokenRequestCallback>),
            Proceed,
        }

        let plan = {
            let mut inner = self.inner.lock();
            if inner.shutdown || sync_id != inner.sync_id {
                ResponsePlan::Abort
            } else if !response.error_message.is_empty() {
                if self.schedule_retry_locked(
                    &mut inner,
                    sync_id,
                    response.status_code,
                    &response.error_message,
                ) {
                    ResponsePlan::Abort
                } else {
                    let completions = inner.fail(&response.error_message);
                    ResponsePlan::Fail(completions, response.error_message.clone())
                }
            } else if response.status_code == 401 || response.status_code == 403 {
                match self.auth_plan(&mut inner) {
                    DispatchPlan::Fail(completions, message) => {
                        ResponsePlan::Fail(completions, message)
                    }
                    DispatchPlan::RequestAuth(callback) => ResponsePlan::RequestAuth(callback),
                    _ => ResponsePlan::Abort,
                }
            } else if response.status_code >= 400 {
                let message = format!("HTTP {}", response.status_code);
                if self.schedule_retry_locked(&mut inner, sync_id, response.status_code, &message)
                {
                    ResponsePlan::Abort
                } else {
                    let completions = inner.fail(&message);
                    ResponsePlan::Fail(completions, message)
                }
            } else {
                inner.emit(&events::http_pull(response.status_code));
                ResponsePlan::Proceed
            }
        };

        match plan {
            ResponsePlan::Abort => return,
            ResponsePlan::Fail(completions, message) => {
                deliver(completions, false, &message);
                return;
            }
            ResponsePlan::RequestAuth(callback) => {
                if let Some(callback) = callback {
                    callback();
                }
                return;
            }
            ResponsePlan::Proceed => {}
        }

        // Apply phase, outside the lock; the applier holds the database
        // for the duration of its transaction.
        let apply_callback = {
            let inner = self.inner.lock();
            if inner.shutdown || sync_id != inner.sync_id {
                return;
            }
            inner.apply_callback.clone()
        };
        if let Some(apply) = apply_callback {
            if let Err(message) = apply(&response.body) {
                let completions = {
                    let mut inner = self.inner.lock();
                    if inner.shutdown || sync_id != inner.sync_id {
                        return;
                    }
                    inner.fail(&message)
                };
                deliver(completions, false, &message);
                return;
            }
        }

        // Pagination: a cursor loops straight back into the pull phase.
        if let Some(cursor) = extract_next_cursor(&response.body) {
            {
                let mut inner = self.inner.lock();
                if inner.shutdown || sync_id != inner.sync_id {
                    return;
                }
                let base = if inner.current_pull_url.is_empty() {
                    inner.pull_endpoint_url.clone()
                } else {
                    inner.current_pull_url.clone()
                };
                inner.current_pull_url = build_url_with_cursor(&base, &cursor);
                inner.retry_scheduled = false;
                inner.retry_count = 0;
            }
            self.dispatch_request(sync_id, false);
            return;
        }

        // Push phase.
        let push_callback = {
            let inner = self.inner.lock();
            if inner.shutdown || sync_id != inner.sync_id {
                return;
            }
            inner.push_changes_callback.clone()
        };
        if let Some(push) = push_callback {
            {
                let inner = self.inner.lock();
                if inner.shutdown || sync_id != inner.sync_id {
                    return;
                }
                inner.emit(&events::phase_push());
            }
            let target = self.self_ref.clone();
            push(Box::new(move |ok, message| {
                if let Some(engine) = target.upgrade() {
                    engine.handle_push_result(sync_id, ok, message.to_string());
                }
            }));
            return;
        }

        self.finish_success(sync_id);
    }

    fn handle_push_result(&self, sync_id: i64, ok: bool, message: String) {
        if !ok {
            let completions = {
                let mut inner = self.inner.lock();
                if inner.shutdown || sync_id != inner.sync_id {
                    return;
                }
                inner.fail(&message)
            };
            deliver(completions, false, &message);
            return;
        }
        self.finish_success(sync_id);
    }

    fn finish_success(&self, sync_id: i64) {
        let (completion, pending_reason, pending_completion) = {
            let mut inner = self.inner.lock();
            if inner.shutdown || sync_id != inner.sync_id {
                return;
            }
            inner.set_state(SyncState::Done);
            inner.emit(&events::state_event(SyncState::Done));
            inner.sync_in_flight = false;
            inner.retry_scheduled = false;
            inner.retry_count = 0;
            inner.current_request_id.clear();
            inner.current_pull_url.clear();
            (
                inner.completion.take(),
                inner.pending_reason.take(),
                inner.pending_completion.take(),
            )
        };

        if let Some(completion) = completion {
            completion(true, "");
        }
        if let Some(reason) = pending_reason {
            self.start_inner(&reason, pending_completion);
        }
    }

    /// Schedules a backoff retry when policy allows. Assumes the lock is
    /// held; returns true when a retry was scheduled.
    fn schedule_retry_locked(
        &self,
        inner: &mut Inner,
        sync_id: i64,
        status_code: i32,
        message: &str,
    ) -> bool {
        if inner.shutdown || inner.retry_scheduled || !inner.should_retry(status_code) {
            return false;
        }
        inner.retry_count += 1;
        let delay_ms = inner.backoff_ms();
        inner.retry_scheduled = true;
        inner.emit(&events::retry_scheduled(
            inner.retry_count + 1,
            delay_ms,
            message,
        ));
        inner.set_state(SyncState::RetryScheduled);
        inner.emit(&events::state_event(SyncState::RetryScheduled));

        let target = self.self_ref.clone();
        thread::spawn(move || {
            if delay_ms > 0 {
                thread::sleep(Duration::from_millis(delay_ms as u64));
            }
            if let Some(engine) = target.upgrade() {
                engine.retry(sync_id);
            }
        });
        true
    }

    fn retry(&self, sync_id: i64) {
        {
            let mut inner = self.inner.lock();
            if inner.shutdown || sync_id != inner.sync_id || !inner.sync_in_flight {
                return;
            }
            inner.retry_scheduled = false;
        }
        self.dispatch_request(sync_id, true);
    }
}
