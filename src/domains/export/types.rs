use crate::domains::export::csv_record::sanitize_key_component;
use crate::domains::history::User;
use crate::errors::ExportError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Bucket every artifact is uploaded to unless configured otherwise
pub const DEFAULT_BUCKET: &str = "user-history";

/// Default ceiling on simultaneously running export workers
pub const DEFAULT_MAX_CONCURRENT_EXPORTS: usize = 8;

/// Header row of every exported CSV file
pub const CSV_HEADER: [&str; 3] = ["ID", "Endpoint", "Date"];

/// Serialized CSV for one user plus its destination.
///
/// Lives only in memory and is consumed by the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
}

impl ExportArtifact {
    pub fn new(bucket: &str, user: &User, body: Vec<u8>) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: Self::key_for(user),
            body,
        }
    }

    /// Object key for a user's artifact: `user_<id>_<name>.csv`
    pub fn key_for(user: &User) -> String {
        format!("user_{}_{}.csv", user.id, sanitize_key_component(&user.name))
    }
}

/// Pipeline settings passed into the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub bucket: String,
    pub max_concurrent_exports: usize,
    /// Cancel every in-flight worker once this elapses
    pub run_timeout: Option<Duration>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            max_concurrent_exports: DEFAULT_MAX_CONCURRENT_EXPORTS,
            run_timeout: None,
        }
    }
}

/// Export statistics for one artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    pub records_written: usize,
    pub bytes_written: usize,
    pub duration_ms: u64,
}

/// Proof of a completed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReceipt {
    pub user: User,
    pub bucket: String,
    pub key: String,
    pub stats: ExportStats,
}

/// Where in the worker sequence a user's export stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureStage {
    Query,
    Serialize,
    Upload,
    Cancelled,
    Panicked,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureStage::Query => "query",
            FailureStage::Serialize => "serialize",
            FailureStage::Upload => "upload",
            FailureStage::Cancelled => "cancelled",
            FailureStage::Panicked => "panicked",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserExportFailure {
    pub user: User,
    pub stage: FailureStage,
    pub error: ExportError,
}

/// Result of one export worker
#[derive(Debug, Clone, Serialize)]
pub enum UserExportOutcome {
    Uploaded(ExportReceipt),
    Failed(UserExportFailure),
}

impl UserExportOutcome {
    pub fn failed(user: User, stage: FailureStage, error: ExportError) -> Self {
        Self::Failed(UserExportFailure { user, stage, error })
    }

    pub fn cancelled(user: User) -> Self {
        Self::failed(user, FailureStage::Cancelled, ExportError::Cancelled)
    }

    pub fn user(&self) -> &User {
        match self {
            UserExportOutcome::Uploaded(receipt) => &receipt.user,
            UserExportOutcome::Failed(failure) => &failure.user,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UserExportOutcome::Uploaded(_))
    }
}

/// Aggregate result of a whole export run, one outcome per enumerated user
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<UserExportOutcome>,
}

impl ExportReport {
    /// Outcomes are ordered by user id so the report is stable across runs
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        mut outcomes: Vec<UserExportOutcome>,
    ) -> Self {
        outcomes.sort_by_key(|o| o.user().id);
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn receipts(&self) -> impl Iterator<Item = &ExportReceipt> {
        self.outcomes.iter().filter_map(|o| match o {
            UserExportOutcome::Uploaded(receipt) => Some(receipt),
            UserExportOutcome::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &UserExportFailure> {
        self.outcomes.iter().filter_map(|o| match o {
            UserExportOutcome::Failed(failure) => Some(failure),
            UserExportOutcome::Uploaded(_) => None,
        })
    }

    pub fn outcome_for(&self, user_id: i64) -> Option<&UserExportOutcome> {
        self.outcomes.iter().find(|o| o.user().id == user_id)
    }

    /// True when there was at least one user and none was exported
    pub fn is_total_failure(&self) -> bool {
        self.total() > 0 && self.succeeded() == 0
    }

    /// Process exit status for this report.
    ///
    /// A run with zero users is a success.
    pub fn exit_code(&self, fail_on_total_failure: bool) -> i32 {
        if fail_on_total_failure && self.is_total_failure() {
            2
        } else {
            0
        }
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            total: self.total(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            bytes_uploaded: self.receipts().map(|r| r.stats.bytes_written).sum(),
            failures: self
                .failures()
                .map(|f| FailureSummary {
                    user_id: f.user.id,
                    user_name: f.user.name.clone(),
                    stage: f.stage,
                    error: f.error.to_string(),
                })
                .collect(),
        }
    }
}

/// Machine-readable run summary printed by the binary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes_uploaded: usize,
    pub failures: Vec<FailureSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    pub user_id: i64,
    pub user_name: String,
    pub stage: FailureStage,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DbError;

    fn receipt(user: User) -> UserExportOutcome {
        UserExportOutcome::Uploaded(ExportReceipt {
            key: ExportArtifact::key_for(&user),
            bucket: DEFAULT_BUCKET.to_string(),
            user,
            stats: ExportStats {
                records_written: 1,
                bytes_written: 40,
                duration_ms: 3,
            },
        })
    }

    fn query_failure(user: User) -> UserExportOutcome {
        UserExportOutcome::failed(
            user,
            FailureStage::Query,
            ExportError::Database(DbError::Query("boom".to_string())),
        )
    }

    #[test]
    fn test_artifact_key() {
        assert_eq!(ExportArtifact::key_for(&User::new(1, "ann")), "user_1_ann.csv");
        assert_eq!(ExportArtifact::key_for(&User::new(7, "a/b")), "user_7_a_b.csv");
    }

    #[test]
    fn test_report_counts_and_order() {
        let report = ExportReport::new(
            Uuid::new_v4(),
            Utc::now(),
            vec![query_failure(User::new(3, "cy")), receipt(User::new(1, "ann"))],
        );

        assert_eq!(report.total(), 2);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.outcomes[0].user().id, 1);
        assert!(report.outcome_for(3).is_some_and(|o| !o.is_success()));

        let summary = report.summary();
        assert_eq!(summary.bytes_uploaded, 40);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].stage, FailureStage::Query);
    }

    #[test]
    fn test_exit_code_policy() {
        let empty = ExportReport::new(Uuid::new_v4(), Utc::now(), Vec::new());
        assert_eq!(empty.exit_code(true), 0);

        let all_failed = ExportReport::new(
            Uuid::new_v4(),
            Utc::now(),
            vec![query_failure(User::new(1, "ann"))],
        );
        assert!(all_failed.is_total_failure());
        assert_eq!(all_failed.exit_code(true), 2);
        assert_eq!(all_failed.exit_code(false), 0);

        let partial = ExportReport::new(
            Uuid::new_v4(),
            Utc::now(),
            vec![query_failure(User::new(1, "ann")), receipt(User::new(2, "bo"))],
        );
        assert_eq!(partial.exit_code(true), 0);
    }

    #[test]
    fn test_summary_serializes_to_json() {
        let report = ExportReport::new(
            Uuid::new_v4(),
            Utc::now(),
            vec![query_failure(User::new(2, "bo"))],
        );
        let json = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["failures"][0]["userId"], 2);
        assert_eq!(json["failures"][0]["stage"], "query");
    }
}
