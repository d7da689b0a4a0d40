//! Sync engine states.

/// Observable states of the sync engine.
///
/// Each state has one wire name, emitted to the host as
/// `{"state":"<name>"}` and in `{"type":"state",...}` events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing configured, nothing running.
    #[default]
    Idle,
    /// Configuration accepted.
    Configured,
    /// A sync was requested and is about to dispatch.
    SyncRequested,
    /// A pull request is in flight.
    Syncing,
    /// A retry timer is pending.
    RetryScheduled,
    /// Waiting for the host to supply an auth token.
    AuthRequired,
    /// Auth retries were exhausted.
    AuthFailed,
    /// The last sync run completed successfully.
    Done,
    /// The last sync run failed.
    Error,
}

impl SyncState {
    /// The wire name of this state.
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Configured => "configured",
            SyncState::SyncRequested => "sync_requested",
            SyncState::Syncing => "syncing",
            SyncState::RetryScheduled => "retry_scheduled",
            SyncState::AuthRequired => "auth_required",
            SyncState::AuthFailed => "auth_failed",
            SyncState::Done => "done",
            SyncState::Error => "error",
        }
    }

    /// The `{"state":"<name>"}` snapshot for this state.
    pub fn to_json(self) -> String {
        format!("{{\"state\":\"{}\"}}", self.as_str())
    }
}
