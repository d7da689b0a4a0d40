//! Streaming file downloads.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback invoked with each received chunk.
pub type ChunkCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Callback invoked once when the download finishes. The message is empty
/// on success.
pub type DownloadCompletion = Box<dyn FnOnce(&str) + Send>;

/// Handle to an in-flight download.
pub trait DownloadHandle: Send + Sync {
    /// Stops the download. After cancellation no further callbacks are
    /// required to arrive.
    fn cancel(&self);
}

/// Host-provided streaming downloader.
///
/// `on_chunk` may be called any number of times (including zero) before
/// exactly one `on_complete`; after `on_complete` no more callbacks arrive.
pub trait Downloader: Send + Sync {
    /// Starts downloading `url`.
    fn download(
        &self,
        url: &str,
        on_chunk: ChunkCallback,
        on_complete: DownloadCompletion,
    ) -> Arc<dyn DownloadHandle>;
}

/// Handle returned by [`MockDownloader`].
#[derive(Default)]
pub struct MockDownload {
    cancelled: AtomicBool,
}

impl DownloadHandle for MockDownload {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl MockDownload {
    /// True once [`DownloadHandle::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A downloader that synchronously replays configured chunks.
///
/// Tests set the payload (and optionally an error) up front; `download`
/// delivers every chunk and then the completion on the calling thread.
#[derive(Default)]
pub struct MockDownloader {
    chunks: Mutex<Vec<Vec<u8>>>,
    error: Mutex<Option<String>>,
    last_url: Mutex<Option<String>>,
}

impl MockDownloader {
    /// Creates a downloader with no payload (completes immediately).
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replaces the chunks to deliver.
    pub fn set_chunks(&self, chunks: Vec<Vec<u8>>) {
        *self.chunks.lock() = chunks;
    }

    /// Splits `payload` into `chunk_size`-byte chunks to deliver.
    pub fn set_payload(&self, payload: &[u8], chunk_size: usize) {
        let chunks = payload.chunks(chunk_size.max(1)).map(<[u8]>::to_vec).collect();
        *self.chunks.lock() = chunks;
    }

    /// Makes the download fail with `message` after delivering its chunks.
    pub fn set_error(&self, message: impl Into<String>) {
        *self.error.lock() = Some(message.into());
    }

    /// URL of the most recent download, if any.
    pub fn last_url(&self) -> Option<String> {
        self.last_url.lock().clone()
    }
}

impl Downloader for MockDownloader {
    fn download(
        &self,
        url: &str,
        on_chunk: ChunkCallback,
        on_complete: DownloadCompletion,
    ) -> Arc<dyn DownloadHandle> {
        *self.last_url.lock() = Some(url.to_string());
        let handle = Arc::new(MockDownload::default());

        let chunks = self.chunks.lock().clone();
        for chunk in &chunks {
            if handle.is_cancelled() {
                return handle;
            }
            on_chunk(chunk);
        }
        if !handle.is_cancelled() {
            let error = self.error.lock().clone().unwrap_or_default();
            on_complete(&error);
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_chunks_then_completion() {
        let downloader = MockDownloader::new();
        downloader.set_chunks(vec![vec![1, 2], vec![3]]);

        let received = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&received);
        let done = Arc::clone(&completed);
        downloader.download(
            "https://example.com/slice.zst",
            Box::new(move |chunk| sink.lock().extend_from_slice(chunk)),
            Box::new(move |err| *done.lock() = Some(err.to_string())),
        );

        assert_eq!(*received.lock(), vec![1, 2, 3]);
        assert_eq!(completed.lock().clone(), Some(String::new()));
        assert_eq!(
            downloader.last_url(),
            Some("https://example.com/slice.zst".to_string())
        );
    }

    #[test]
    fn reports_configured_error() {
        let downloader = MockDownloader::new();
        downloader.set_error("connection reset");

        let completed = Arc::new(Mutex::new(None));
        let done = Arc::clone(&completed);
        downloader.download(
            "https://example.com/slice.zst",
            Box::new(|_| {}),
            Box::new(move |err| *done.lock() = Some(err.to_string())),
        );
        assert_eq!(completed.lock().clone(), Some("connection reset".to_string()));
    }
}
