//! Client for the EventHorizon API.
//!
//! [`Client`] covers the versioned resource endpoints. Turn logs are read
//! live through [`LogStream`] and written in ordered batches through
//! [`LogUploader`].

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod group;
pub mod log_stream;
pub mod log_uploader;
pub mod sse;

pub use backoff::Backoff;
pub use client::{Client, ListOptions, TurnLogSink};
pub use config::{ClientConfig, DelegatedAuth, RequestOptions};
pub use error::{Error, Result};
pub use group::WorkerGroup;
pub use log_stream::{LogStream, LogStreamOptions};
pub use log_uploader::{LogUploader, UploadSummary, UploaderOptions};
