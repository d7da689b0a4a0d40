//! The slice import engine.
//!
//! One engine run drives: download → decompress → parse → batch →
//! transactional insert. All parsing and database work happens on the work
//! queue thread; download chunks and memory alerts arrive on arbitrary
//! threads and are marshalled over.

use brookdb_codec::{HeaderStep, RowStep, SliceDecoder, TableHeader, TableStep};
use brookdb_platform::{
    optimal_batch_size, DeviceProfile, DownloadHandle, Downloader, MemoryAlertHandle,
    MemoryAlertLevel, MemoryAlertSource, WorkQueue,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::batch::RowBatch;
use crate::db::ImportDatabase;
use crate::error::{ImportError, ImportResult};
use crate::registry;

/// Rows between savepoint cycles; bounds rollback-segment growth.
const SAVEPOINT_INTERVAL: usize = 10_000;

/// Hard cap on the adaptive batch size.
const MAX_BATCH_SIZE: usize = 10_000;

/// Buffer compaction cadence, in download chunks.
const COMPACT_EVERY_N_CHUNKS: usize = 16;

/// Completion callback for an import. Called exactly once.
pub type ImportCompletion = Box<dyn FnOnce(Result<(), ImportError>) + Send>;

enum RowsOutcome {
    NeedMoreData,
    EndOfTable,
}

type PendingFailure = (ImportCompletion, ImportError);

#[derive(Default)]
struct ImportState {
    importing: bool,
    failed: bool,
    transaction_started: bool,
    header_parsed: bool,
    current_table: Option<TableHeader>,
    decoder: Option<SliceDecoder>,
    batch: RowBatch,
    total_rows: usize,
    rows_since_savepoint: usize,
    chunks_since_compaction: usize,
    flush_count: usize,
    started_at: Option<Instant>,
    download: Option<Arc<dyn DownloadHandle>>,
    alert_handle: Option<Arc<dyn MemoryAlertHandle>>,
    completion: Option<ImportCompletion>,
    registry_id: Option<u64>,
}

/// Streaming slice import orchestrator.
///
/// Create once per database, call [`SliceImportEngine::start`] per import.
/// The process-wide registry holds the engine alive while a run is active,
/// so callers may drop their handle after starting.
pub struct SliceImportEngine {
    db: Arc<dyn ImportDatabase>,
    downloader: Arc<dyn Downloader>,
    alerts: Arc<dyn MemoryAlertSource>,
    queue: WorkQueue,
    initial_batch_size: usize,
    batch_size: AtomicUsize,
    state: Mutex<ImportState>,
    // Download and memory-alert callbacks re-enter through this weak
    // reference; the registry's strong reference keeps the engine alive
    // while a run is active.
    self_ref: Weak<SliceImportEngine>,
}

impl SliceImportEngine {
    /// Creates an engine sized for the given device.
    pub fn new(
        db: Arc<dyn ImportDatabase>,
        downloader: Arc<dyn Downloader>,
        alerts: Arc<dyn MemoryAlertSource>,
        queue: WorkQueue,
        profile: &DeviceProfile,
    ) -> Arc<Self> {
        let initial_batch_size = optimal_batch_size(profile).clamp(1, MAX_BATCH_SIZE);
        info!(batch_size = initial_batch_size, "slice import engine initialized");
        Arc::new_cyclic(|self_ref| Self {
            db,
            downloader,
            alerts,
            queue,
            initial_batch_size,
            batch_size: AtomicUsize::new(initial_batch_size),
            state: Mutex::new(ImportState::default()),
            self_ref: self_ref.clone(),
        })
    }

    /// Starts importing the slice at `url`.
    ///
    /// `completion` fires exactly once, with `Ok(())` after commit or the
    /// first fatal error otherwise. A second `start` while a run is active
    /// completes immediately with [`ImportError::AlreadyInProgress`].
    pub fn start(&self, url: &str, completion: ImportCompletion) {
        {
            let mut state = self.state.lock();
            if state.importing {
                drop(state);
                completion(Err(ImportError::AlreadyInProgress));
                return;
            }
            *state = ImportState::default();
            state.importing = true;
            state.completion = Some(completion);
            state.started_at = Some(Instant::now());
            if let Some(strong) = self.self_ref.upgrade() {
                state.registry_id = Some(registry::register(&strong));
            }
        }
        self.batch_size.store(self.initial_batch_size, Ordering::SeqCst);

        let target = self.self_ref.clone();
        let url = url.to_string();
        self.queue.dispatch(move || {
            if let Some(engine) = target.upgrade() {
                engine.begin(&url);
            }
        });
    }

    /// Cancels the active import, rolling back and completing with
    /// "Import cancelled". No-op when idle.
    pub fn cancel(&self) {
        let target = self.self_ref.clone();
        self.queue.dispatch(move || {
            let Some(engine) = target.upgrade() else {
                return;
            };
            let pending = {
                let mut state = engine.state.lock();
                if !state.importing || state.failed {
                    return;
                }
                engine.fail_locked(&mut state, ImportError::Cancelled)
            };
            Self::deliver_failure(pending);
        });
    }

    /// True while an import run is active.
    pub fn is_importing(&self) -> bool {
        self.state.lock().importing
    }

    /// The current adaptive batch size, in rows.
    pub fn current_batch_size(&self) -> usize {
        self.batch_size.load(Ordering::SeqCst)
    }

    /// Rows inserted so far in the active (or last) run.
    pub fn total_rows_inserted(&self) -> usize {
        self.state.lock().total_rows
    }

    fn begin(&self, url: &str) {
        let pending = {
            let mut state = self.state.lock();
            if state.failed || !state.importing {
                return;
            }

            match SliceDecoder::new() {
                Ok(decoder) => state.decoder = Some(decoder),
                Err(e) => {
                    let pending = self.fail_locked(&mut state, e.into());
                    drop(state);
                    Self::deliver_failure(pending);
                    return;
                }
            }

            let alert_target = self.self_ref.clone();
            state.alert_handle = Some(self.alerts.subscribe(Arc::new(move |level| {
                if let Some(engine) = alert_target.upgrade() {
                    engine.handle_memory_pressure(level);
                }
            })));

            if let Err(e) = self.db.begin_transaction() {
                let pending = self.fail_locked(&mut state, e);
                drop(state);
                Self::deliver_failure(pending);
                return;
            }
            state.transaction_started = true;
            state.rows_since_savepoint = 0;
            if let Err(e) = self.db.create_savepoint() {
                debug!(error = %e, "initial savepoint failed (non-fatal)");
            }
            None
        };
        Self::deliver_failure(pending);

        info!(url, "starting slice import");

        let chunk_target = self.self_ref.clone();
        let done_target = self.self_ref.clone();
        let handle = self.downloader.download(
            url,
            Box::new(move |bytes| {
                if let Some(engine) = chunk_target.upgrade() {
                    let data = bytes.to_vec();
                    let on_queue = Arc::clone(&engine);
                    engine.queue.dispatch(move || on_queue.process_chunk(&data));
                }
            }),
            Box::new(move |err| {
                if let Some(engine) = done_target.upgrade() {
                    let message = err.to_string();
                    let on_queue = Arc::clone(&engine);
                    engine
                        .queue
                        .dispatch(move || on_queue.process_download_complete(message));
                }
            }),
        );
        self.state.lock().download = Some(handle);
    }

    fn process_chunk(&self, data: &[u8]) {
        let pending = {
            let mut state = self.state.lock();
            if state.failed || !state.importing {
                return;
            }

            let result = self.feed_and_parse(&mut state, data);

            state.chunks_since_compaction += 1;
            if state.chunks_since_compaction >= COMPACT_EVERY_N_CHUNKS {
                if let Some(decoder) = state.decoder.as_mut() {
                    decoder.compact_buffer();
                }
                state.chunks_since_compaction = 0;
            }

            match result {
                Ok(()) => None,
                Err(e) => self.fail_locked(&mut state, e),
            }
        };
        Self::deliver_failure(pending);
    }

    fn process_download_complete(&self, message: String) {
        let mut pending_failure: Option<PendingFailure> = None;
        let mut pending_success: Option<ImportCompletion> = None;
        {
            let mut state = self.state.lock();
            if state.failed || !state.importing {
                return;
            }

            if !message.is_empty() {
                error!(error = %message, "download failed");
                pending_failure =
                    self.fail_locked(&mut state, ImportError::Download { message });
            } else {
                match self.finish_import(&mut state) {
                    Ok(()) => pending_success = self.complete_locked(&mut state),
                    Err(e) => pending_failure = self.fail_locked(&mut state, e),
                }
            }
        }
        Self::deliver_failure(pending_failure);
        if let Some(completion) = pending_success {
            completion(Ok(()));
        }
    }

    fn feed_and_parse(&self, state: &mut ImportState, data: &[u8]) -> ImportResult<()> {
        if let Some(decoder) = state.decoder.as_mut() {
            decoder.feed(data)?;
        }
        self.parse_available(state)
    }

    fn parse_available(&self, state: &mut ImportState) -> ImportResult<()> {
        if !state.header_parsed {
            let step = match state.decoder.as_mut() {
                Some(decoder) => decoder.parse_slice_header()?,
                None => return Ok(()),
            };
            match step {
                HeaderStep::Header(header) => {
                    info!(
                        slice_id = %header.slice_id,
                        version = header.version,
                        priority = %header.priority,
                        tables = header.number_of_tables,
                        "parsed slice header"
                    );
                    state.header_parsed = true;
                }
                HeaderStep::NeedMoreData => return Ok(()),
            }
        }
        self.parse_tables(state)
    }

    fn parse_tables(&self, state: &mut ImportState) -> ImportResult<()> {
        loop {
            if let Some(table) = state.current_table.clone() {
                match self.parse_rows(state, &table)? {
                    RowsOutcome::NeedMoreData => return Ok(()),
                    RowsOutcome::EndOfTable => state.current_table = None,
                }
            }

            let step = match state.decoder.as_mut() {
                Some(decoder) => decoder.parse_table_header()?,
                None => return Ok(()),
            };
            match step {
                TableStep::Table(table) => {
                    debug!(
                        table = %table.table_name,
                        columns = table.columns.len(),
                        "parsing table"
                    );
                    state.current_table = Some(table);
                }
                TableStep::NeedMoreData => return Ok(()),
                TableStep::EndOfStream => {
                    debug!("parsed all tables");
                    return Ok(());
                }
            }
        }
    }

    fn parse_rows(&self, state: &mut ImportState, table: &TableHeader) -> ImportResult<RowsOutcome> {
        loop {
            let (step, consumed) = match state.decoder.as_mut() {
                Some(decoder) => {
                    let before = decoder.remaining_bytes();
                    let step = decoder.parse_row(&table.columns)?;
                    let after = decoder.remaining_bytes();
                    (step, after < before)
                }
                None => return Ok(RowsOutcome::NeedMoreData),
            };

            match step {
                RowStep::Row(row) => {
                    if !consumed {
                        return Err(ImportError::ParserStalled);
                    }
                    state.batch.add_row(&table.table_name, &table.columns, row);
                    if state.batch.total_rows() >= self.batch_size.load(Ordering::SeqCst) {
                        self.flush_batch(state)?;
                    }
                }
                RowStep::NeedMoreData => return Ok(RowsOutcome::NeedMoreData),
                RowStep::EndOfTable => return Ok(RowsOutcome::EndOfTable),
            }
        }
    }

    fn flush_batch(&self, state: &mut ImportState) -> ImportResult<()> {
        if state.batch.is_empty() {
            return Ok(());
        }
        debug!(rows = state.batch.total_rows(), "flushing batch");

        self.db.insert_batch(&state.batch)?;

        let rows = state.batch.total_rows();
        state.total_rows += rows;
        state.rows_since_savepoint += rows;
        state.flush_count += 1;
        state.batch.clear();

        while state.rows_since_savepoint >= SAVEPOINT_INTERVAL {
            if let Err(e) = self.db.release_savepoint() {
                debug!(error = %e, "savepoint release failed (non-fatal)");
            }
            match self.db.create_savepoint() {
                Ok(()) => debug!(total_rows = state.total_rows, "savepoint cycled"),
                Err(e) => debug!(error = %e, "savepoint create failed (non-fatal)"),
            }
            state.rows_since_savepoint -= SAVEPOINT_INTERVAL;
        }
        Ok(())
    }

    fn finish_import(&self, state: &mut ImportState) -> ImportResult<()> {
        self.parse_available(state)?;

        let (ended, remaining) = match state.decoder.as_mut() {
            Some(decoder) => {
                decoder.compact_buffer();
                (decoder.is_end_of_stream(), decoder.remaining_bytes())
            }
            None => (false, 0),
        };
        if !ended {
            return Err(ImportError::StreamNotFinished);
        }
        if remaining > 0 {
            return Err(ImportError::UnparsedBytes { remaining });
        }

        self.flush_batch(state)?;

        // The adapter rolls back itself when COMMIT fails, so the failure
        // path must not roll back a second time.
        state.transaction_started = false;
        self.db.commit_transaction()?;

        let elapsed_ms = state
            .started_at
            .map(|t| t.elapsed().as_millis())
            .unwrap_or_default();
        info!(
            total_rows = state.total_rows,
            flushes = state.flush_count,
            elapsed_ms,
            "import committed"
        );
        Ok(())
    }

    fn handle_memory_pressure(&self, level: MemoryAlertLevel) {
        let current = self.batch_size.load(Ordering::SeqCst);
        let reduced = match level {
            MemoryAlertLevel::Warn => (current / 2).max(250),
            MemoryAlertLevel::Critical => (current / 4).max(100),
        };
        if reduced != current {
            warn!(from = current, to = reduced, ?level, "memory pressure, adjusting batch size");
        }
        self.batch_size.store(reduced, Ordering::SeqCst);
    }

    /// Marks the run failed, cancels I/O, rolls back, and hands back the
    /// completion to invoke once the state lock is released.
    fn fail_locked(
        &self,
        state: &mut ImportState,
        error: ImportError,
    ) -> Option<PendingFailure> {
        if state.failed {
            return None;
        }
        error!(error = %error, "import failed");
        state.failed = true;

        if let Some(handle) = state.download.take() {
            handle.cancel();
        }
        if state.transaction_started {
            self.db.rollback_transaction();
            state.transaction_started = false;
        }
        self.complete_locked(state).map(|completion| (completion, error))
    }

    fn complete_locked(&self, state: &mut ImportState) -> Option<ImportCompletion> {
        state.importing = false;
        if let Some(handle) = state.alert_handle.take() {
            handle.cancel();
        }
        state.download = None;
        state.decoder = None;
        state.current_table = None;
        if let Some(id) = state.registry_id.take() {
            registry::unregister(id);
        }
        state.completion.take()
    }

    fn deliver_failure(pending: Option<PendingFailure>) {
        if let Some((completion, error)) = pending {
            completion(Err(error));
        }
    }
}
