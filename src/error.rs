use std::{path::PathBuf, time::Duration};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration directory could not be created: {0}")]
    ConfigDir(PathBuf),

    #[error("confidence must be between 0 and 1, got {0}")]
    InvalidConfidence(f32),

    #[error("invalid document type: {0}")]
    UnknownLabel(String),

    #[error("invalid classification method: {0}")]
    UnknownMethod(String),

    #[error("invalid regex pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("external classifier failed: {0}")]
    External(String),

    #[error("external classifier timed out after {0:?}")]
    Timeout(Duration),
}
