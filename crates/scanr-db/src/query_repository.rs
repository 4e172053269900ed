use chrono::{DateTime, Utc};
use scanr_core::AppError;
use scanr_core::filter::QueryFilter;
use scanr_core::models::{Query, QueryUpdate, Source};
use scanr_core::traits::QueryStore;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::error::map_sqlx_error;
use crate::source_repository::SourceRepository;

const COLUMNS: &str = "source_url, query_key, mod_id, last_parsed, allow, needs_updating, \
     view_url, category_id, banner, name, owner_name, description, description_short, \
     install, nsfw, auto_update, downloads, screenshots, installers";

/// Query rows in PostgreSQL.
#[derive(Clone)]
pub struct QueryRepository {
    pool: PgPool,
}

impl QueryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, source_url: &str, query_key: &str) -> Result<Query, AppError> {
        sqlx::query_as::<_, QueryRow>(&format!(
            "SELECT {COLUMNS} FROM queries WHERE source_url = $1 AND query_key = $2"
        ))
        .bind(source_url)
        .bind(query_key)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| map_sqlx_error(e, &format!("query {source_url}{query_key}")))
    }

    pub async fn create(&self, source_url: &str, query_key: &str) -> Result<Query, AppError> {
        sqlx::query_as::<_, QueryRow>(&format!(
            "INSERT INTO queries (source_url, query_key) VALUES ($1, $2) RETURNING {COLUMNS}"
        ))
        .bind(source_url)
        .bind(query_key)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| map_sqlx_error(e, &format!("query {source_url}{query_key}")))
    }

    /// Rows matching `filter`, never-parsed first when ordered, then random.
    pub async fn find(&self, filter: &QueryFilter) -> Result<Vec<Query>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM queries WHERE TRUE"));

        if let Some(url) = &filter.source_url {
            qb.push(" AND source_url = ").push_bind(url.clone());
        }
        if let Some(key) = &filter.query_key {
            qb.push(" AND query_key = ").push_bind(key.clone());
        }
        if let Some(needs_updating) = filter.needs_updating {
            qb.push(" AND needs_updating = ").push_bind(needs_updating);
        }
        if let Some(allow) = filter.allow {
            qb.push(" AND allow = ").push_bind(allow);
        }
        match filter.exists {
            Some(true) => {
                qb.push(" AND mod_id IS NOT NULL AND mod_id <> 0");
            }
            Some(false) => {
                qb.push(" AND (mod_id IS NULL OR mod_id = 0)");
            }
            None => {}
        }
        if let Some(age) = filter.older_than {
            qb.push(" AND last_parsed < ").push_bind(Utc::now() - age);
        }
        match filter.last_parsed_null {
            Some(true) => {
                qb.push(" AND last_parsed IS NULL");
            }
            Some(false) => {
                qb.push(" AND last_parsed IS NOT NULL");
            }
            None => {}
        }
        if let Some(ids) = &filter.category_ids {
            qb.push(" AND category_id = ANY(")
                .push_bind(ids.clone())
                .push(")");
        }
        if filter.require_name {
            qb.push(" AND name IS NOT NULL AND name <> ''");
        }
        if filter.require_description {
            qb.push(" AND description IS NOT NULL AND description <> ''");
        }
        if filter.require_view_url {
            qb.push(" AND view_url IS NOT NULL AND view_url <> ''");
        }

        let mut orders = Vec::new();
        if filter.order_by_last_parsed {
            orders.push("last_parsed ASC NULLS FIRST");
        }
        if filter.random_order {
            orders.push("RANDOM()");
        }
        if !orders.is_empty() {
            qb.push(" ORDER BY ").push(orders.join(", "));
        }
        qb.push(" LIMIT ").push_bind(filter.limit as i64);

        let rows = qb
            .build_query_as::<QueryRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "find queries"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Write the columns present in `update` and return the row.
    pub async fn update(
        &self,
        source_url: &str,
        query_key: &str,
        update: &QueryUpdate,
    ) -> Result<Query, AppError> {
        if update.is_empty() {
            return self.get(source_url, query_key).await;
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE queries SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(v) = update.mod_id {
                set.push("mod_id = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.last_parsed {
                set.push("last_parsed = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.allow {
                set.push("allow = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.needs_updating {
                set.push("needs_updating = ").push_bind_unseparated(v);
            }
            if let Some(v) = &update.view_url {
                set.push("view_url = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = update.category_id {
                set.push("category_id = ").push_bind_unseparated(v);
            }
            if let Some(v) = &update.banner {
                set.push("banner = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &update.name {
                set.push("name = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &update.owner_name {
                set.push("owner_name = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &update.description {
                set.push("description = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &update.description_short {
                set.push("description_short = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &update.install {
                set.push("install = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = update.nsfw {
                set.push("nsfw = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.auto_update {
                set.push("auto_update = ").push_bind_unseparated(v);
            }
            if let Some(v) = &update.downloads {
                set.push("downloads = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &update.screenshots {
                set.push("screenshots = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &update.installers {
                set.push("installers = ").push_bind_unseparated(v.clone());
            }
        }
        qb.push(" WHERE source_url = ")
            .push_bind(source_url.to_string())
            .push(" AND query_key = ")
            .push_bind(query_key.to_string())
            .push(format!(" RETURNING {COLUMNS}"));

        qb.build_query_as::<QueryRow>()
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| map_sqlx_error(e, &format!("query {source_url}{query_key}")))
    }

    pub async fn delete(&self, source_url: &str, query_key: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM queries WHERE source_url = $1 AND query_key = $2")
            .bind(source_url)
            .bind(query_key)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, &format!("query {source_url}{query_key}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("query {source_url}{query_key}")));
        }
        Ok(())
    }

    /// On-disk size of `table` in megabytes; 0 when the table is missing.
    pub async fn table_size_mb(&self, table: &str) -> Result<f64, AppError> {
        sqlx::query_scalar::<_, f64>(
            "SELECT COALESCE(pg_table_size(to_regclass($1)), 0)::FLOAT8 / 1048576::FLOAT8",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, &format!("size of {table}")))
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct QueryRow {
    source_url: String,
    query_key: String,
    mod_id: Option<i64>,
    last_parsed: Option<DateTime<Utc>>,
    allow: bool,
    needs_updating: bool,
    view_url: Option<String>,
    category_id: Option<i64>,
    banner: Option<String>,
    name: Option<String>,
    owner_name: Option<String>,
    description: Option<String>,
    description_short: Option<String>,
    install: Option<String>,
    nsfw: Option<bool>,
    auto_update: Option<bool>,
    downloads: Option<String>,
    screenshots: Option<String>,
    installers: Option<String>,
}

impl From<QueryRow> for Query {
    fn from(row: QueryRow) -> Self {
        Query {
            source_url: row.source_url,
            query_key: row.query_key,
            mod_id: row.mod_id,
            last_parsed: row.last_parsed,
            allow: row.allow,
            needs_updating: row.needs_updating,
            view_url: row.view_url,
            category_id: row.category_id,
            banner: row.banner,
            name: row.name,
            owner_name: row.owner_name,
            description: row.description,
            description_short: row.description_short,
            install: row.install,
            nsfw: row.nsfw,
            auto_update: row.auto_update,
            downloads: row.downloads,
            screenshots: row.screenshots,
            installers: row.installers,
        }
    }
}

// -- Trait implementation --

impl QueryStore for QueryRepository {
    async fn get_source(&self, url: &str) -> Result<Source, AppError> {
        SourceRepository::new(self.pool.clone()).get(url).await
    }

    async fn create_source(&self, source: &Source) -> Result<Source, AppError> {
        SourceRepository::new(self.pool.clone()).create(source).await
    }

    async fn get_query(&self, source_url: &str, query_key: &str) -> Result<Query, AppError> {
        QueryRepository::get(self, source_url, query_key).await
    }

    async fn create_query(&self, source_url: &str, query_key: &str) -> Result<Query, AppError> {
        QueryRepository::create(self, source_url, query_key).await
    }

    async fn find_queries(&self, filter: &QueryFilter) -> Result<Vec<Query>, AppError> {
        QueryRepository::find(self, filter).await
    }

    async fn update_query(
        &self,
        source_url: &str,
        query_key: &str,
        update: &QueryUpdate,
    ) -> Result<Query, AppError> {
        QueryRepository::update(self, source_url, query_key, update).await
    }

    async fn table_size_mb(&self, table: &str) -> Result<f64, AppError> {
        QueryRepository::table_size_mb(self, table).await
    }
}
