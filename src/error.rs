//! Error types for polling.

use thiserror::Error;

use crate::fragment::FragmentError;

/// Why a single poll cycle failed.
///
/// A failed cycle never advances the poller's high-water mark and never
/// touches the view; the next scheduled tick simply tries again.
#[derive(Error, Debug)]
pub enum PollError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Endpoint answered with a non-success status.
    #[error("Unexpected status: {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Response had no `numEvents` header.
    #[error("Response is missing the numEvents header")]
    MissingEventCount,

    /// `numEvents` header was present but not an unsigned integer.
    #[error("Invalid numEvents header: {value:?}")]
    InvalidEventCount {
        /// Raw header value.
        value: String,
    },

    /// Response body was not a usable HTML fragment.
    #[error("Malformed fragment: {0}")]
    Fragment(#[from] FragmentError),
}

/// Result type alias for poll operations.
pub type Result<T> = std::result::Result<T, PollError>;
