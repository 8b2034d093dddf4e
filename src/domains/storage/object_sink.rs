use crate::errors::{StorageError, StorageResult};
use async_trait::async_trait;
use opendal::{services, Operator};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Trait for object storage put operations.
///
/// Implementations must be safe to call from many export workers at once.
/// Writing an existing key overwrites it.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> StorageResult<()>;
}

/// Backend selection for `OpenDalObjectSink`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// S3 or an S3-compatible endpoint such as MinIO
    S3 {
        region: String,
        endpoint: Option<String>,
    },
    /// Local directory, each bucket is a subdirectory of `root`
    Fs { root: PathBuf },
}

/// OpenDAL-backed object sink.
///
/// OpenDAL operators are bound to a single bucket, so one operator is built
/// lazily per bucket and cached. Credentials for S3 are resolved by OpenDAL
/// from the environment.
pub struct OpenDalObjectSink {
    backend: StorageBackend,
    operators: Mutex<HashMap<String, Operator>>,
}

impl OpenDalObjectSink {
    pub fn new(backend: StorageBackend) -> Self {
        Self {
            backend,
            operators: Mutex::new(HashMap::new()),
        }
    }

    fn build_operator(&self, bucket: &str) -> StorageResult<Operator> {
        let operator = match &self.backend {
            StorageBackend::S3 { region, endpoint } => {
                let mut builder = services::S3::default().bucket(bucket).region(region);
                if let Some(ep) = endpoint {
                    builder = builder.endpoint(ep);
                }
                Operator::new(builder)
                    .map_err(|e| StorageError::Configuration(e.to_string()))?
                    .finish()
            }
            StorageBackend::Fs { root } => {
                let bucket_root = root.join(bucket);
                let builder = services::Fs::default().root(&bucket_root.to_string_lossy());
                Operator::new(builder)
                    .map_err(|e| StorageError::Configuration(e.to_string()))?
                    .finish()
            }
        };
        Ok(operator)
    }

    fn operator_for(&self, bucket: &str) -> StorageResult<Operator> {
        let mut operators = self
            .operators
            .lock()
            .map_err(|_| StorageError::Configuration("operator cache poisoned".to_string()))?;

        if let Some(op) = operators.get(bucket) {
            return Ok(op.clone());
        }

        let op = self.build_operator(bucket)?;
        operators.insert(bucket.to_string(), op.clone());
        Ok(op)
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key is empty".to_string()));
    }
    if key.split('/').any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(format!("'{}' contains a parent segment", key)));
    }
    Ok(())
}

#[async_trait]
impl ObjectSink for OpenDalObjectSink {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> StorageResult<()> {
        validate_key(key)?;
        let operator = self.operator_for(bucket)?;

        log::debug!("Writing {} bytes to {}/{}", body.len(), bucket, key);

        operator
            .write(key, body)
            .await
            .map_err(|e| StorageError::Backend {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
                transient: e.is_temporary(),
            })?;

        Ok(())
    }
}
