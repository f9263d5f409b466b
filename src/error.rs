use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Failures while loading or persisting the dataset file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("dataset not found: {0}")]
    MissingInputFile(PathBuf),

    #[error("dataset {path} is not valid JSON: {source}")]
    CorruptState {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to persist dataset to {path}: {source}")]
    PersistFailure {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode dataset: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures of a single fetch. Never fatal for a run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP status error: {status} {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("no content found for {0}")]
    NoContent(String),

    #[error("unexpected content from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// True when the source answered but had nothing usable.
    pub fn is_no_content(&self) -> bool {
        matches!(self, Self::NoContent(_))
    }
}
