use crate::domains::export::types::{
    ExportArtifact, ExportReceipt, FailureStage, UserExportOutcome,
};
use crate::domains::export::writers::{serialize_records, CsvConfig};
use crate::domains::history::{RowSource, User};
use crate::domains::storage::ObjectSink;
use crate::errors::ExportError;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Exports one user's call history: query, serialize, upload.
///
/// A worker never returns an error. Every failure is contained and reported
/// as a `UserExportOutcome::Failed` naming the stage it stopped at. Nothing is
/// uploaded unless serialization of the full record set succeeded, and at most
/// one upload is attempted.
pub struct ExportWorker {
    user: User,
    bucket: String,
    row_source: Arc<dyn RowSource>,
    sink: Arc<dyn ObjectSink>,
    csv_config: CsvConfig,
    cancel_token: CancellationToken,
}

impl ExportWorker {
    pub fn new(
        user: User,
        bucket: impl Into<String>,
        row_source: Arc<dyn RowSource>,
        sink: Arc<dyn ObjectSink>,
    ) -> Self {
        Self {
            user,
            bucket: bucket.into(),
            row_source,
            sink,
            csv_config: CsvConfig::default(),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Set cancellation token for this worker
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub async fn run(self) -> UserExportOutcome {
        let start_time = Instant::now();
        let user = self.user;

        if self.cancel_token.is_cancelled() {
            return UserExportOutcome::cancelled(user);
        }

        let records = tokio::select! {
            _ = self.cancel_token.cancelled() => {
                log::warn!("Export of {} cancelled while querying call history", user);
                return UserExportOutcome::cancelled(user);
            }
            result = self.row_source.list_api_calls(user.id) => match result {
                Ok(records) => records,
                Err(e) => {
                    log::error!("Failed to query call history for {}: {}", user, e);
                    return UserExportOutcome::failed(user, FailureStage::Query, ExportError::Database(e));
                }
            }
        };

        let (body, mut stats) = match serialize_records(&records, &self.csv_config) {
            Ok(serialized) => serialized,
            Err(e) => {
                log::error!("Failed to serialize call history for {}: {}", user, e);
                return UserExportOutcome::failed(user, FailureStage::Serialize, e);
            }
        };
        drop(records);

        let ExportArtifact { bucket, key, body } = ExportArtifact::new(&self.bucket, &user, body);

        // Do not start an upload once cancellation has been requested
        if self.cancel_token.is_cancelled() {
            return UserExportOutcome::cancelled(user);
        }

        let upload = tokio::select! {
            _ = self.cancel_token.cancelled() => {
                log::warn!("Upload of {}/{} for {} cancelled", bucket, key, user);
                return UserExportOutcome::cancelled(user);
            }
            result = self.sink.put_object(&bucket, &key, body) => result,
        };

        if let Err(e) = upload {
            log::error!("Unable to upload {}/{} for {}: {}", bucket, key, user, e);
            return UserExportOutcome::failed(user, FailureStage::Upload, ExportError::Upload(e));
        }

        stats.duration_ms = start_time.elapsed().as_millis() as u64;
        log::debug!(
            "Exported {} records ({} bytes) for {} to {}/{}",
            stats.records_written,
            stats.bytes_written,
            user,
            bucket,
            key
        );

        UserExportOutcome::Uploaded(ExportReceipt {
            user,
            bucket,
            key,
            stats,
        })
    }
}
