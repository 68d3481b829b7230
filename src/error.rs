//! Error types for evidence mining.
//!
//! Only the outer surfaces (settings, manifests, output files, CLI) let these
//! escape. Inside the mining core every collaborator error is logged and turned
//! into an empty result.

use std::io;
use thiserror::Error;

/// Result type alias for mining operations.
pub type Result<T> = std::result::Result<T, MinerError>;

#[derive(Error, Debug)]
pub enum MinerError {
    /// I/O error when reading inputs or writing records.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The remote answered, but not with a success status.
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Markup or payload did not have the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// A classification or extraction collaborator failed.
    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MinerError {
    pub fn status(url: impl Into<String>, status: reqwest::StatusCode) -> Self {
        MinerError::Status {
            url: url.into(),
            status: status.as_u16(),
        }
    }
}
