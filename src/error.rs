//! Error taxonomy for include resolution.
//!
//! Per-leaf failures (everything except [`ReadoutError::InvalidNamespace`] and
//! [`ReadoutError::Serialize`]) never abort a page: they are logged, recorded
//! in the [`Report`](crate::readout::Report), and the element keeps its content.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ReadoutError {
    /// The configured attribute name is not a valid HTML attribute name.
    #[error("invalid attribute name {0:?}")]
    InvalidNamespace(String),

    /// Reading a local file failed.
    #[error("read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No file exists at the resolved location.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// The fetch path resolves outside the loader's root directory.
    #[error("path escapes root: {path}")]
    OutsideRoot { path: String },

    /// The file exceeds the size limit for fetched documents.
    #[error("{} is {size} bytes, over the {limit} byte limit", .path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    /// The fetched body is not valid UTF-8.
    #[error("{path} is not valid UTF-8")]
    NotUtf8 { path: String },

    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("GET {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("GET {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// The fetch path cannot be joined onto the base URL.
    #[error("cannot resolve {path:?} against base URL: {reason}")]
    BadUrl { path: String, reason: String },

    /// The task fetching this leaf panicked or was aborted.
    #[error("fetch task for {path} did not complete")]
    Task { path: String },

    /// Writing the resulting document out failed.
    #[error("serialize document: {0}")]
    Serialize(#[source] io::Error),
}
