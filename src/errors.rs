use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Config(String),
    #[error("no place candidate found for location {location_id} (query: {query:?})")]
    ResolutionFailed { location_id: String, query: String },
    #[error("places provider returned {status} for {operation}")]
    Upstream { operation: &'static str, status: u16 },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid durable row: {0}")]
    InvalidRow(String),
    #[error("invalid photo reference: {0}")]
    InvalidPhotoReference(String),
    #[error("background task failed: {0}")]
    Task(String),
}

impl AppError {
    /// Transport-level failures that may succeed on the next call.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Http(_) => true,
            AppError::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Upstream { status: 404, .. })
    }

    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, AppError::ResolutionFailed { .. })
    }
}
