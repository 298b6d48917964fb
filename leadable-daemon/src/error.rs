use std::path::PathBuf;

use thiserror::Error;

use leadable_core::ValidationError;

/// Registry-level failures, reported synchronously to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The create request was rejected; no task was created.
    #[error("invalid sync: {0}")]
    Validation(#[from] ValidationError),

    #[error("no sync named '{name}'")]
    NotFound { name: String },
}

/// Error surface for the daemon runtime and its control protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] leadable_core::ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
