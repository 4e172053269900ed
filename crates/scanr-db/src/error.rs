use scanr_core::AppError;

/// Classify a sqlx failure. `what` names the row or statement for the message.
pub(crate) fn map_sqlx_error(e: sqlx::Error, what: &str) -> AppError {
    match e {
        sqlx::Error::RowNotFound => AppError::NotFound(what.to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::DuplicateKey(format!("{what}: {}", db.message()))
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => AppError::StoreUnavailable(format!("{what}: {e}")),
        other => AppError::DatabaseError(format!("{what}: {other}")),
    }
}
