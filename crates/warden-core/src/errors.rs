use std::path::PathBuf;

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the lifecycle
/// manager and reconciler can log failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid file: {path}: {reason}")]
    InvalidFile { path: PathBuf, reason: String },

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("not connected to upstream")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, Error>;
