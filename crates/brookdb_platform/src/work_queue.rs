//! Serialized work queue for database operations.
//!
//! SQLite connections must not be touched from more than one thread at a
//! time, so every database-adapter operation is funneled through a single
//! dedicated thread. Callers either fire and forget (`dispatch`) or wait
//! for a result (`dispatch_sync`).

use parking_lot::Mutex;
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread;

type Job = Box<dyn FnOnce() + Send>;

/// A single-threaded executor with FIFO ordering.
///
/// Cloning shares the same underlying thread. Dropping the last clone shuts
/// the thread down after it drains pending jobs.
#[derive(Clone)]
pub struct WorkQueue {
    // The mpsc sender is not Sync; the mutex makes the queue shareable
    // between the engines that embed it.
    sender: Arc<Mutex<Sender<Job>>>,
}

impl WorkQueue {
    /// Spawns the worker thread and returns the queue.
    pub fn new() -> Self {
        let (sender, receiver) = channel::<Job>();
        thread::Builder::new()
            .name("brookdb-work-queue".to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .expect("failed to spawn work queue thread");
        Self {
            sender: Arc::new(Mutex::new(sender)),
        }
    }

    /// Enqueues `job` for execution on the worker thread.
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // A closed queue only happens at teardown; dropping the job then
        // is the correct behavior.
        let _ = self.sender.lock().send(Box::new(job));
    }

    /// Runs `job` on the worker thread and blocks until it returns.
    ///
    /// Must not be called from the worker thread itself.
    pub fn dispatch_sync<F, R>(&self, job: F) -> R
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = channel();
        self.dispatch(move || {
            let _ = tx.send(job());
        });
        rx.recv().expect("work queue thread terminated")
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn jobs_run_in_fifo_order_on_one_thread() {
        let queue = WorkQueue::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let threads = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..16 {
            let order = Arc::clone(&order);
            let threads = Arc::clone(&threads);
            queue.dispatch(move || {
                order.lock().push(i);
                threads.lock().push(thread::current().id());
            });
        }
        queue.dispatch_sync(|| {});

        assert_eq!(*order.lock(), (0..16).collect::<Vec<_>>());
        let threads = threads.lock();
        assert!(threads.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn dispatch_sync_returns_the_result() {
        let queue = WorkQueue::new();
        assert_eq!(queue.dispatch_sync(|| 6 * 7), 42);
    }

    #[test]
    fn clones_share_the_same_thread() {
        let queue = WorkQueue::new();
        let other = queue.clone();
        let counter = Arc::new(AtomicUsize::new(0));

        for q in [&queue, &other] {
            let counter = Arc::clone(&counter);
            q.dispatch(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        queue.dispatch_sync(|| {});
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
