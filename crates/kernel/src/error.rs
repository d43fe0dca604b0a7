//! Application error types.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised by a [`ListingStore`](crate::listing::ListingStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors at the listing service boundary.
///
/// These never reach a client as-is: the route pairs them with an empty
/// envelope and the status from [`ListingError::status`].
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("storage failure")]
    Store(#[from] StoreError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("unknown resource: {0}")]
    UnknownResource(String),
}

impl ListingError {
    pub fn status(&self) -> StatusCode {
        match self {
            ListingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ListingError::Unauthorized => StatusCode::UNAUTHORIZED,
            ListingError::UnknownResource(_) => StatusCode::NOT_FOUND,
        }
    }
}

/// Errors fetching one page during an export.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid base URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("server returned status {0}")]
    Status(u16),

    #[error("malformed listing envelope")]
    Decode,
}

/// Terminal failures of a bulk export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("page {page} failed after {attempts} attempts: {source}")]
    PageFailed {
        page: u32,
        attempts: u32,
        #[source]
        source: SourceError,
    },

    #[error("partial export declined ({received} of {expected} rows)")]
    PartialDeclined { received: usize, expected: u64 },

    #[error("export cancelled")]
    Cancelled,

    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to finish CSV output: {0}")]
    Output(String),
}

/// Errors surfaced by a listing view.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("another request is already in flight")]
    Busy,

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Errors loading or saving a persisted view configuration.
#[derive(Debug, Error)]
pub enum ViewConfigError {
    #[error("failed to access view config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid view config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported view config version {0}")]
    UnsupportedVersion(u32),
}

/// Result type alias for listing store calls.
pub type StoreResult<T> = Result<T, StoreError>;
