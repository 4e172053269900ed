use scanr_core::AppError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;
use crate::error::map_sqlx_error;
use crate::query_repository::QueryRepository;
use crate::source_repository::SourceRepository;

/// Owns the connection pool, runs migrations and vends repositories.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error(e, "connect"))?;

        tracing::debug!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    pub fn source_repo(&self) -> SourceRepository {
        SourceRepository::new(self.pool.clone())
    }

    pub fn query_repo(&self) -> QueryRepository {
        QueryRepository::new(self.pool.clone())
    }
}
