use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("please enter a valid search term")]
    InvalidQuery,

    #[error("invalid harvest request: {0}")]
    InvalidRequest(String),

    #[error("no images were downloaded for \"{keyword}\"; try a broader query")]
    NoImages { keyword: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("failed to parse settings at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
