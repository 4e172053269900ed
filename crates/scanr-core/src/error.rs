use thiserror::Error;

/// Application-wide error types for scanr.
#[derive(Error, Debug)]
pub enum AppError {
    /// A source or query row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Insert collided with an existing `(source_url, query_key)` identity.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The store could not be reached (pool exhausted, connection refused).
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Database statement failed for a reason other than availability.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Remote catalog answered with a non-200 status or a malformed body.
    #[error("Remote API error (HTTP {status}): {message}")]
    RemoteApi { status: u16, message: String },

    /// Extraction for one item was abandoned before anything was written.
    #[error("Extraction aborted: {0}")]
    ExtractionAbort(String),

    /// The page never reached its ready condition.
    #[error("Page not ready: {0}")]
    PageNotReady(String),

    /// The browser session is unusable and cannot be recovered in-process.
    #[error("Session failure: {0}")]
    SessionFailure(String),

    /// HTTP request failed (fetching a page).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Settings are missing or inconsistent.
    #[error("Config error: {0}")]
    ConfigError(String),

    /// Filesystem access failed.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error ends the current stage cycle instead of
    /// only the current item.
    pub fn aborts_cycle(&self) -> bool {
        matches!(
            self,
            AppError::StoreUnavailable(_) | AppError::SessionFailure(_)
        )
    }

    /// Returns true if the source runtime must stop so its supervisor can
    /// restart the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::SessionFailure(_))
    }
}
