use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// SQL migration statements, executed one at a time.
const MIGRATIONS: &[&str] = &[
    // 001_init.sql
    r#"CREATE TABLE IF NOT EXISTS sources (
        url VARCHAR(255) PRIMARY KEY,
        name VARCHAR(255) NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS queries (
        source_url VARCHAR(255) NOT NULL REFERENCES sources(url) ON DELETE CASCADE,
        query_key VARCHAR(255) NOT NULL,
        mod_id BIGINT,
        last_parsed TIMESTAMPTZ,
        allow BOOLEAN NOT NULL DEFAULT TRUE,
        needs_updating BOOLEAN NOT NULL DEFAULT FALSE,
        view_url VARCHAR(256),
        category_id BIGINT,
        banner TEXT,
        name VARCHAR(120),
        owner_name VARCHAR(64),
        description TEXT,
        description_short VARCHAR(256),
        install TEXT,
        nsfw BOOLEAN,
        auto_update BOOLEAN,
        downloads TEXT,
        screenshots TEXT,
        installers TEXT,
        PRIMARY KEY (source_url, query_key)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_queries_source_mod ON queries(source_url, mod_id)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_queries_selection
        ON queries(source_url, allow, needs_updating, last_parsed NULLS FIRST)"#,
];

/// Spins up a PostgreSQL container and returns a connected pool.
///
/// Keep the returned `ContainerAsync` alive for the whole test; dropping
/// it stops the container.
pub async fn setup_test_db() -> (PgPool, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "scanr_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/scanr_test");

    // Retry connection until container is fully ready
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    // Run migrations one statement at a time
    for migration in MIGRATIONS {
        sqlx::query(migration)
            .execute(&pool)
            .await
            .expect("Failed to run migration");
    }

    (pool, container)
}
