//! Process configuration, read once at startup and passed down by value.

use crate::domains::export::{ExportSettings, DEFAULT_BUCKET};
use crate::domains::storage::{RetryPolicy, StorageBackend};
use crate::errors::{ConfigError, ConfigResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// `STAGE` value that selects local development endpoints
pub const STAGE_DEV: &str = "dev";

const DEV_S3_ENDPOINT: &str = "http://minio:9000";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_DB_HOST: &str = "db";
const DEFAULT_DB_PORT: u16 = 5432;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    /// A full `postgres://` URL
    Url(String),
    Params {
        host: String,
        port: u16,
        user: String,
        password: String,
        dbname: String,
        /// Disable TLS, used against the local development database
        disable_tls: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub storage: StorageBackend,
    pub export: ExportSettings,
    pub upload_retry: RetryPolicy,
    /// Exit non-zero when no user could be exported
    pub fail_on_total_failure: bool,
}

impl AppConfig {
    /// Load from the process environment, honouring a `.env` file if present
    pub fn from_env() -> ConfigResult<Self> {
        if let Ok(path) = dotenv::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let is_dev = get("STAGE").as_deref() == Some(STAGE_DEV);

        let database = match get("DATABASE_URL") {
            Some(url) => DatabaseConfig::Url(url),
            None => DatabaseConfig::Params {
                host: get("POSTGRES_HOST").unwrap_or_else(|| DEFAULT_DB_HOST.to_string()),
                port: parse_or("POSTGRES_PORT", get("POSTGRES_PORT"), DEFAULT_DB_PORT)?,
                user: get("POSTGRES_USER").ok_or_else(|| ConfigError::missing("POSTGRES_USER"))?,
                password: get("POSTGRES_PASSWORD").unwrap_or_default(),
                dbname: get("POSTGRES_DB").ok_or_else(|| ConfigError::missing("POSTGRES_DB"))?,
                disable_tls: is_dev,
            },
        };

        let storage = match get("EXPORT_STORAGE").as_deref() {
            None | Some("s3") => StorageBackend::S3 {
                region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
                endpoint: get("S3_ENDPOINT")
                    .or_else(|| is_dev.then(|| DEV_S3_ENDPOINT.to_string())),
            },
            Some("fs") => StorageBackend::Fs {
                root: get("EXPORT_FS_ROOT")
                    .map(PathBuf::from)
                    .ok_or_else(|| ConfigError::missing("EXPORT_FS_ROOT"))?,
            },
            Some(other) => {
                return Err(ConfigError::invalid("EXPORT_STORAGE", other, "expected 's3' or 'fs'"));
            }
        };

        let max_concurrent_exports = parse_or(
            "EXPORT_MAX_CONCURRENCY",
            get("EXPORT_MAX_CONCURRENCY"),
            ExportSettings::default().max_concurrent_exports,
        )?;
        if max_concurrent_exports == 0 {
            return Err(ConfigError::invalid("EXPORT_MAX_CONCURRENCY", "0", "must be at least 1"));
        }

        let run_timeout = get("EXPORT_RUN_TIMEOUT_SECS")
            .map(|v| parse_value::<u64>("EXPORT_RUN_TIMEOUT_SECS", &v))
            .transpose()?
            .map(Duration::from_secs);

        let export = ExportSettings {
            bucket: get("EXPORT_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            max_concurrent_exports,
            run_timeout,
        };

        let upload_retry = RetryPolicy {
            max_retries: parse_or("EXPORT_UPLOAD_RETRIES", get("EXPORT_UPLOAD_RETRIES"), 0)?,
            ..RetryPolicy::default()
        };

        let fail_on_total_failure = match get("EXPORT_FAIL_ON_TOTAL_FAILURE") {
            None => true,
            Some(v) => parse_bool("EXPORT_FAIL_ON_TOTAL_FAILURE", &v)?,
        };

        Ok(Self {
            database,
            storage,
            export,
            upload_retry,
            fail_on_total_failure,
        })
    }

    /// Pool size: one connection per concurrent worker plus one for listing users
    pub fn pool_size(&self) -> u32 {
        u32::try_from(self.export.max_concurrent_exports)
            .unwrap_or(u32::MAX - 1)
            .saturating_add(1)
    }
}

fn parse_value<T>(name: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::invalid(name, value, &e.to_string()))
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => parse_value(name, &v),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(name, value, "expected a boolean")),
    }
}
