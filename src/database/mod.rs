use crate::config::DatabaseConfig;
use crate::errors::{DbError, DbResult};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;

/// Build connect options without going through a formatted connection string
pub fn connect_options(config: &DatabaseConfig) -> DbResult<PgConnectOptions> {
    match config {
        DatabaseConfig::Url(url) => PgConnectOptions::from_str(url)
            .map_err(|e| DbError::ConnectionPool(format!("Invalid DATABASE_URL: {}", e))),
        DatabaseConfig::Params {
            host,
            port,
            user,
            password,
            dbname,
            disable_tls,
        } => {
            let ssl_mode = if *disable_tls {
                PgSslMode::Disable
            } else {
                PgSslMode::Prefer
            };
            Ok(PgConnectOptions::new()
                .host(host)
                .port(*port)
                .username(user)
                .password(password)
                .database(dbname)
                .ssl_mode(ssl_mode))
        }
    }
}

/// Open a pool and verify it with a round trip
pub async fn connect(config: &DatabaseConfig, max_connections: u32) -> DbResult<PgPool> {
    let options = connect_options(config)?;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await
        .map_err(|e| DbError::ConnectionPool(format!("Database connection failed: {}", e)))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| DbError::ConnectionPool(format!("Database ping failed: {}", e)))?;

    log::info!("Connected to the database (pool size {})", max_connections);
    Ok(pool)
}
