use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while wiring a read tracker to the host's visibility layer.
///
/// None of these are fatal: a tracker that hits one simply stops tracking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("visibility observation is not supported by this host")]
    Unsupported,
    #[error("failed to observe message {id}: {reason}")]
    Observe { id: u64, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode preferences: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("unknown language code: {0}")]
    UnknownLanguage(String),
}
