//! Error types for leadable-core.

use std::path::PathBuf;

use thiserror::Error;

/// A sync request was rejected before any task was created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was absent or blank.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The frequency label is neither a known preset nor a positive number of minutes.
    #[error("unknown frequency '{0}'")]
    UnknownFrequency(String),

    /// Frequencies are strictly positive.
    #[error("frequency must be at least one minute")]
    ZeroFrequency,

    /// Another sync is already registered under this name.
    #[error("a sync named '{0}' already exists")]
    DuplicateName(String),
}

/// Errors raised while loading or saving [`crate::AppConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
