//! Process-wide registry of active imports.
//!
//! Download and memory-alert callbacks hold only weak references to their
//! engine; the registry's strong reference is what keeps an engine alive
//! for the duration of its run. Entries are inserted on start and erased
//! on completion.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::SliceImportEngine;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

lazy_static! {
    static ref ACTIVE_IMPORTS: Mutex<HashMap<u64, Arc<SliceImportEngine>>> =
        Mutex::new(HashMap::new());
}

pub(crate) fn register(engine: &Arc<SliceImportEngine>) -> u64 {
    let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
    ACTIVE_IMPORTS.lock().insert(id, Arc::clone(engine));
    id
}

pub(crate) fn unregister(id: u64) {
    ACTIVE_IMPORTS.lock().remove(&id);
}

/// Number of imports currently running in this process.
pub fn active_import_count() -> usize {
    ACTIVE_IMPORTS.lock().len()
}
