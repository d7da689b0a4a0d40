//! The database bridge.

use brookdb_import::{ImportCompletion, SliceImportEngine, SqliteImportAdapter};
use brookdb_platform::{
    DeviceProfile, Downloader, HttpClient, MemoryAlertSource, WorkQueue,
};
use brookdb_sqlite::{
    exec_sql, find_by_table, is_read_only, ConnectionPool, ConnectionTag, MemoryIdentityCache,
    SqlRecord,
};
use brookdb_sync::{
    apply_sync_payload, AuthTokenRequestCallback, PushChangesCallback, SyncEngine,
};
use brookdb_codec::FieldValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use tracing::info;

use crate::error::{BridgeError, BridgeResult};

/// Identifier of a registered sync listener.
pub type ListenerId = u64;

/// A sync event listener. Runs under the sync engine's lock; it must not
/// call back into the bridge's sync operations.
pub type SyncListener = Arc<dyn Fn(&str) + Send + Sync>;

/// The host-facing entry point to the native data layer.
pub struct DatabaseBridge {
    pool: Arc<dyn ConnectionPool>,
    downloader: Arc<dyn Downloader>,
    alerts: Arc<dyn MemoryAlertSource>,
    profile: DeviceProfile,
    queue: WorkQueue,
    identity_cache: Arc<MemoryIdentityCache>,
    sync_engine: Arc<SyncEngine>,
    listeners: Mutex<HashMap<ListenerId, SyncListener>>,
    next_listener_id: AtomicU64,
}

impl DatabaseBridge {
    /// Wires a bridge over the host-provided platform pieces.
    pub fn new(
        pool: Arc<dyn ConnectionPool>,
        http: Arc<dyn HttpClient>,
        downloader: Arc<dyn Downloader>,
        alerts: Arc<dyn MemoryAlertSource>,
        profile: DeviceProfile,
    ) -> Arc<Self> {
        let bridge = Arc::new(Self {
            pool,
            downloader,
            alerts,
            profile,
            queue: WorkQueue::new(),
            identity_cache: Arc::new(MemoryIdentityCache::new()),
            sync_engine: SyncEngine::new(http),
            listeners: Mutex::new(HashMap::new()),
            next_listener_id: AtomicU64::new(1),
        });

        let events_target = Arc::downgrade(&bridge);
        bridge.sync_engine.set_event_callback(Arc::new(move |event| {
            if let Some(bridge) = events_target.upgrade() {
                bridge.notify_listeners(event);
            }
        }));

        let apply_target = Arc::downgrade(&bridge);
        bridge.sync_engine.set_apply_callback(Arc::new(move |body| {
            match apply_target.upgrade() {
                Some(bridge) => bridge.apply_pull_body(body),
                None => Err("bridge is shut down".to_string()),
            }
        }));

        bridge
    }

    // --- query facade ---

    /// Identity-cached projection query; the SELECT must produce `id` as
    /// its first column.
    pub fn query(&self, tag: i32, table: &str, query_text: &str) -> BridgeResult<Vec<SqlRecord>> {
        let tag = ConnectionTag(tag);
        let connection = self.pool.reader(tag)?;
        let cache = Arc::clone(&self.identity_cache);
        let table = table.to_string();
        let query_text = query_text.to_string();
        let records = self.queue.dispatch_sync(move || {
            let conn = connection.lock();
            find_by_table(&conn, cache.as_ref(), tag, &table, &query_text)
        })?;
        Ok(records)
    }

    /// Runs parameterized SQL, routed to a read connection for
    /// SELECT/WITH/EXPLAIN and the write connection otherwise.
    pub fn exec_sql_query(
        &self,
        tag: i32,
        sql: &str,
        args: Vec<FieldValue>,
    ) -> BridgeResult<Vec<SqlRecord>> {
        let tag = ConnectionTag(tag);
        let connection = if is_read_only(sql) {
            self.pool.reader(tag)?
        } else {
            self.pool.writer(tag)?
        };
        let sql = sql.to_string();
        let records = self.queue.dispatch_sync(move || {
            let conn = connection.lock();
            exec_sql(&conn, &sql, &args)
        })?;
        Ok(records)
    }

    // --- slice import ---

    /// Starts a streaming slice import into the database behind `tag`.
    /// The completion fires exactly once, on an arbitrary thread.
    pub fn import_remote_slice(&self, tag: i32, url: &str, completion: ImportCompletion) {
        let connection = match self.pool.writer(ConnectionTag(tag)) {
            Ok(connection) => connection,
            Err(e) => {
                completion(Err(brookdb_import::ImportError::Database(e)));
                return;
            }
        };
        let adapter = Arc::new(SqliteImportAdapter::new(connection));
        let engine = SliceImportEngine::new(
            adapter,
            Arc::clone(&self.downloader),
            Arc::clone(&self.alerts),
            self.queue.clone(),
            &self.profile,
        );
        info!(tag, url, "starting remote slice import");
        engine.start(url, completion);
    }

    /// Blocking variant of [`DatabaseBridge::import_remote_slice`].
    pub fn import_remote_slice_sync(&self, tag: i32, url: &str) -> BridgeResult<()> {
        let (tx, rx) = channel();
        self.import_remote_slice(
            tag,
            url,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.recv()
            .map_err(|_| BridgeError::Sync {
                message: "import completion dropped".to_string(),
            })?
            .map_err(BridgeError::from)
    }

    // --- sync lifecycle ---

    /// Installs sync configuration (§3.3 JSON).
    pub fn configure_sync(&self, config_json: &str) {
        self.sync_engine.configure(config_json);
    }

    /// Fire-and-forget sync.
    pub fn start_sync(&self, reason: &str) {
        self.sync_engine.start(reason);
    }

    /// Runs a sync to completion, blocking the calling thread.
    pub fn sync_database(&self, reason: &str) -> BridgeResult<()> {
        let (tx, rx) = channel();
        self.sync_engine.start_with_completion(
            reason,
            Box::new(move |ok, message| {
                let _ = tx.send((ok, message.to_string()));
            }),
        );
        let (ok, message) = rx.recv().map_err(|_| BridgeError::Sync {
            message: "sync completion dropped".to_string(),
        })?;
        if ok {
            Ok(())
        } else {
            Err(BridgeError::Sync { message })
        }
    }

    /// Cancels anything pending or in flight.
    pub fn cancel_sync(&self) {
        self.sync_engine.cancel_sync();
    }

    /// Stores an auth token, possibly resuming a parked run.
    pub fn set_auth_token(&self, token: &str) {
        self.sync_engine.set_auth_token(token);
    }

    /// Drops the stored auth token.
    pub fn clear_auth_token(&self) {
        self.sync_engine.clear_auth_token();
    }

    /// Installs the host's auth-token producer.
    pub fn set_auth_token_provider(&self, provider: AuthTokenRequestCallback) {
        self.sync_engine.set_auth_token_request_callback(provider);
    }

    /// Installs the host's push delegate.
    pub fn set_push_changes_provider(&self, provider: PushChangesCallback) {
        self.sync_engine.set_push_changes_callback(provider);
    }

    /// Current sync state as `{"state":"<name>"}`.
    pub fn sync_state_json(&self) -> String {
        self.sync_engine.state_json()
    }

    /// Permanently shuts the sync engine down.
    pub fn shutdown_sync(&self) {
        self.sync_engine.shutdown();
    }

    // --- events ---

    /// Registers a sync event listener and returns its id.
    pub fn add_sync_listener(&self, listener: SyncListener) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(id, listener);
        id
    }

    /// Removes a listener; unknown ids are ignored.
    pub fn remove_sync_listener(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }

    fn notify_listeners(&self, event: &str) {
        let listeners: Vec<SyncListener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }

    // --- helpers ---

    /// Decompresses a whole zstd file from `src` to `dest`.
    pub fn decompress_zstd(&self, src: &Path, dest: &Path) -> BridgeResult<()> {
        let input = BufReader::new(File::open(src)?);
        let output = BufWriter::new(File::create(dest)?);
        zstd::stream::copy_decode(input, output)?;
        Ok(())
    }

    fn apply_pull_body(&self, body: &str) -> Result<(), String> {
        let tag = ConnectionTag(self.sync_engine.config().connection_tag);
        let connection = self.pool.writer(tag).map_err(|e| e.to_string())?;
        let body = body.to_string();
        self.queue.dispatch_sync(move || {
            let conn = connection.lock();
            apply_sync_payload(&conn, &body).map_err(|e| e.to_string())
        })
    }
}
