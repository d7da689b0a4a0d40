//! # BrookDB Platform
//!
//! Abstractions over the capabilities the host application provides:
//! - Asynchronous HTTP requests
//! - Streaming file downloads
//! - Memory-pressure alerts
//! - A serialized work queue for database operations
//! - Device profile and batch-size sizing
//!
//! The core never blocks on I/O; every interface here is callback-based.
//! Each trait ships with a mock implementation used throughout the test
//! suites, so the engines can be exercised without a device or a network.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod download;
mod http;
mod memory;
mod profile;
mod request_id;
mod work_queue;

pub use download::{
    ChunkCallback, DownloadCompletion, DownloadHandle, Downloader, MockDownload, MockDownloader,
};
pub use http::{HttpClient, HttpCompletion, HttpRequest, HttpResponse, MockHttpClient};
pub use memory::{
    MemoryAlertCallback, MemoryAlertHandle, MemoryAlertLevel, MemoryAlertSource,
    MockMemoryAlertSource,
};
pub use profile::{optimal_batch_size, DeviceProfile};
pub use request_id::generate_request_id;
pub use work_queue::WorkQueue;
