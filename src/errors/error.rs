use serde::Serialize;
use thiserror::Error;

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Failed to decode column '{column}': {reason}")]
    Decode {
        column: String,
        reason: String,
    },
}

impl Serialize for DbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("DbError", 2)?;
        let kind = match self {
            DbError::Sqlx(_) => "Sqlx",
            DbError::ConnectionPool(_) => "ConnectionPool",
            DbError::Query(_) => "Query",
            DbError::Decode { .. } => "Decode",
        };
        state.serialize_field("type", kind)?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Manual Clone implementation for DbError, `sqlx::Error` is not Clone
impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            DbError::Sqlx(err) => DbError::Query(format!("SQLx error: {}", err)),
            DbError::ConnectionPool(s) => DbError::ConnectionPool(s.clone()),
            DbError::Query(s) => DbError::Query(s.clone()),
            DbError::Decode { column, reason } => DbError::Decode {
                column: column.clone(),
                reason: reason.clone(),
            },
        }
    }
}

/// Object storage errors
#[derive(Debug, Error, Clone, Serialize)]
pub enum StorageError {
    #[error("Storage backend error writing {bucket}/{key}: {message}")]
    Backend {
        bucket: String,
        key: String,
        message: String,
        /// Set when the backend reports the failure as temporary
        transient: bool,
    },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Storage configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Backend { transient: true, .. })
    }
}

/// Configuration errors raised while building `AppConfig`
#[derive(Debug, Error, Clone, Serialize)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required")]
    Missing(String),

    #[error("Environment variable '{name}' has an invalid value '{value}': {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn missing(name: &str) -> Self {
        Self::Missing(name.to_string())
    }

    pub fn invalid(name: &str, value: &str, reason: &str) -> Self {
        Self::Invalid {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by the export pipeline
#[derive(Debug, Error, Clone, Serialize)]
pub enum ExportError {
    /// Listing users failed; aborts the whole run
    #[error("Failed to enumerate users: {0}")]
    UserEnumeration(DbError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Upload failed: {0}")]
    Upload(#[from] StorageError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Export worker panicked: {0}")]
    WorkerPanicked(String),
}

impl From<ConfigError> for ExportError {
    fn from(error: ConfigError) -> Self {
        ExportError::InvalidConfig(error.to_string())
    }
}

impl From<csv::Error> for ExportError {
    fn from(error: csv::Error) -> Self {
        ExportError::Serialization(error.to_string())
    }
}
