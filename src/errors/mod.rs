mod error;

pub use error::{ConfigError, DbError, ExportError, StorageError};

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Result type for object storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;
