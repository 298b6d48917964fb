//! Error types for leadable-sync.

use thiserror::Error;

/// Fetching leads failed. Always recoverable from the task's point of view.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A required source setting was blank.
    #[error("invalid source settings: {0} is empty")]
    InvalidSettings(&'static str),

    /// Transport failure or timeout. The URL is stripped: it carries the token.
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// The platform answered with an error object or a non-success status.
    #[error("ad platform API error: {message}")]
    Api { message: String },

    /// Success status, but no `data` array in the body.
    #[error("ad platform response has no data container")]
    MissingData,

    /// The body was not the expected JSON shape.
    #[error("malformed lead payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A spreadsheet call failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// 401/403: the token is invalid, expired, or lacks the scope.
    #[error("spreadsheet access denied (HTTP {status}); the Google token may have expired")]
    Unauthorized { status: u16 },

    #[error("spreadsheet '{sheet_id}' not found")]
    SheetNotFound { sheet_id: String },

    #[error("spreadsheet '{sheet_id}' has no worksheets")]
    NoWorksheet { sheet_id: String },

    #[error("spreadsheet API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed spreadsheet response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid spreadsheet API URL: {0}")]
    InvalidUrl(String),
}

/// Any failure inside one poll cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
