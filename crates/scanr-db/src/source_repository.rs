use scanr_core::AppError;
use scanr_core::models::Source;
use sqlx::PgPool;

use crate::error::map_sqlx_error;

/// Source rows in PostgreSQL.
#[derive(Clone)]
pub struct SourceRepository {
    pool: PgPool,
}

impl SourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, url: &str) -> Result<Source, AppError> {
        sqlx::query_as::<_, SourceRow>("SELECT url, name FROM sources WHERE url = $1")
            .bind(url)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| map_sqlx_error(e, &format!("source {url}")))
    }

    pub async fn create(&self, source: &Source) -> Result<Source, AppError> {
        sqlx::query_as::<_, SourceRow>(
            "INSERT INTO sources (url, name) VALUES ($1, $2) RETURNING url, name",
        )
        .bind(&source.url)
        .bind(&source.name)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| map_sqlx_error(e, &format!("source {}", source.url)))
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<Source>, AppError> {
        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT url, name FROM sources ORDER BY url LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "sources"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct SourceRow {
    url: String,
    name: String,
}

impl From<SourceRow> for Source {
    fn from(row: SourceRow) -> Self {
        Source {
            url: row.url,
            name: row.name,
        }
    }
}
