//! Domain error types for guarded provider calls.
//!
//! Typed errors at the call boundary replace string-encoded errors and let the
//! retry policy decide eligibility by pattern matching. Embedded in
//! `anyhow::Error` at async seams so handler signatures stay `anyhow::Result`;
//! callers can downcast: `e.downcast_ref::<CallError>()`.

use thiserror::Error;

/// Failure of one guarded operation against an external provider.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error("Request timed out")]
    Timeout,

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error (status {status})")]
    Http { status: u16 },

    #[error("Request cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl CallError {
    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            CallError::Http { status } => Some(*status),
            _ => None,
        }
    }
}
