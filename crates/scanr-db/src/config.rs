use scanr_core::AppError;
use scanr_core::config::DatabaseSettings;

/// Configuration for the database connection pool.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Build from the settings file, then apply environment overrides.
    ///
    /// - `DATABASE_URL` replaces the configured URL or connection fields
    /// - `DATABASE_MAX_CONNECTIONS` replaces `database.maxConnections`
    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self, AppError> {
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| settings.connection_url());

        let max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Err(_) => settings.max_connections,
            Ok(raw) => parse_max_connections(&raw)?,
        };
        if max_connections == 0 {
            return Err(AppError::ConfigError(
                "database.maxConnections must be at least 1".into(),
            ));
        }

        Ok(Self {
            url,
            max_connections,
        })
    }
}

fn parse_max_connections(raw: &str) -> Result<u32, AppError> {
    let parsed: u32 = raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!(
            "Invalid DATABASE_MAX_CONNECTIONS '{raw}': must be a positive integer"
        ))
    })?;
    if parsed == 0 {
        return Err(AppError::ConfigError(
            "DATABASE_MAX_CONNECTIONS must be at least 1".into(),
        ));
    }
    Ok(parsed)
}
