//! Defines the custom error types for the funnel-scout application.

use std::io;
use thiserror::Error;

/// The primary error type for the discovery and classification pipeline.
///
/// Only [`AppError::InvalidUrl`] is fatal to a run. Every other variant is
/// absorbed at the point where it occurs and recorded as a missing result.
#[derive(Error, Debug)]
pub(crate) enum AppError {
    /// The top-level input could not be turned into an absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Timeout, DNS failure, connection reset and similar transport errors.
    #[error("Network Failure: {0}")]
    NetworkFailure(String),

    /// The server answered with a 4xx/5xx status.
    #[error("Upstream Rejection: {url} returned HTTP {status}")]
    UpstreamRejection {
        /// The URL that was requested.
        url: String,
        /// The status code returned by the server.
        status: u16,
    },

    /// A document was expected to be HTML but the server said otherwise.
    #[error("Content Type Mismatch: {url} is '{content_type}'")]
    ContentTypeMismatch {
        /// The URL that was requested.
        url: String,
        /// The reported content type (empty when absent).
        content_type: String,
    },

    /// Malformed robots, sitemap or HTML input.
    #[error("Parse Failure: {0}")]
    ParseFailure(String),

    /// No browser could be launched, or the browser failed mid-render.
    #[error("Rendering Unavailable: {0}")]
    RenderingUnavailable(String),

    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization or deserialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// An underlying error that doesn't fit other categories, using anyhow.
    #[error("Generic Error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::NetworkFailure(format!("timeout: {}", e))
        } else {
            AppError::NetworkFailure(e.to_string())
        }
    }
}

pub(crate) type Result<T> = std::result::Result<T, AppError>;
