use crate::domains::export::types::{
    ExportReport, ExportSettings, FailureStage, UserExportOutcome,
};
use crate::domains::export::worker::ExportWorker;
use crate::domains::history::{RowSource, User};
use crate::domains::storage::ObjectSink;
use crate::errors::{ExportError, ExportResult};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Runs one export batch: enumerate users, fan out one worker per user under
/// a concurrency ceiling, and join every worker into an `ExportReport`.
pub struct ExportOrchestrator {
    row_source: Arc<dyn RowSource>,
    sink: Arc<dyn ObjectSink>,
    settings: ExportSettings,
    cancel_token: CancellationToken,
}

impl ExportOrchestrator {
    pub fn new(
        row_source: Arc<dyn RowSource>,
        sink: Arc<dyn ObjectSink>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            row_source,
            sink,
            settings,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Set cancellation token for the whole run
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Execute the export run.
    ///
    /// Fails only when the run cannot start: invalid settings, cancellation
    /// before users were listed, or failure to list users. In that case no
    /// worker is launched. Every per-user failure is reported in the returned
    /// `ExportReport` instead.
    pub async fn run(&self) -> ExportResult<ExportReport> {
        if self.settings.max_concurrent_exports == 0 {
            return Err(ExportError::InvalidConfig(
                "max_concurrent_exports must be at least 1".to_string(),
            ));
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let token = self.cancel_token.child_token();

        let deadline = self.settings.run_timeout.map(|timeout| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        log::warn!("Export run exceeded {:?}, cancelling in-flight exports", timeout);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        let users = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ExportError::Cancelled),
            result = self.row_source.list_users() => result.map_err(ExportError::UserEnumeration),
        };
        let users = match users {
            Ok(users) => users,
            Err(e) => {
                if let Some(handle) = deadline {
                    handle.abort();
                }
                log::error!("Export run {} aborted: {}", run_id, e);
                return Err(e);
            }
        };

        log::info!(
            "Export run {} starting for {} users (max {} concurrent)",
            run_id,
            users.len(),
            self.settings.max_concurrent_exports
        );

        let outcomes = self.fan_out(users, &token).await;

        if let Some(handle) = deadline {
            handle.abort();
        }

        let report = ExportReport::new(run_id, started_at, outcomes);
        log::info!(
            "Export run {} finished: {} of {} users exported, {} failed",
            run_id,
            report.succeeded(),
            report.total(),
            report.failed()
        );
        Ok(report)
    }

    /// Launch one worker per user and wait for all of them.
    ///
    /// A permit is taken before each spawn and held by the task until it
    /// finishes, so at most `max_concurrent_exports` workers run at once.
    async fn fan_out(&self, users: Vec<User>, token: &CancellationToken) -> Vec<UserExportOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_exports));
        let mut tasks = JoinSet::new();
        let mut running = HashMap::new();
        let mut outcomes = Vec::with_capacity(users.len());

        let mut pending = users.into_iter();
        for user in pending.by_ref() {
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                log::warn!("Export of {} skipped, run cancelled before launch", user);
                outcomes.push(UserExportOutcome::cancelled(user));
                break;
            };

            let worker = ExportWorker::new(
                user.clone(),
                self.settings.bucket.clone(),
                self.row_source.clone(),
                self.sink.clone(),
            )
            .with_cancellation(token.clone());

            let handle = tasks.spawn(async move {
                let outcome = run_contained(worker).await;
                drop(permit);
                outcome
            });
            running.insert(handle.id(), user);
        }

        // Users never launched because the run was cancelled
        for user in pending {
            log::warn!("Export of {} skipped, run cancelled before launch", user);
            outcomes.push(UserExportOutcome::cancelled(user));
        }

        outcomes.extend(join_workers(tasks, running).await);
        outcomes
    }
}

/// Wait for every spawned worker.
///
/// `running` maps each task to the user it exports, so a task that ends
/// without returning an outcome is still reported against that user.
async fn join_workers(
    mut tasks: JoinSet<UserExportOutcome>,
    mut running: HashMap<task::Id, User>,
) -> Vec<UserExportOutcome> {
    let mut outcomes = Vec::with_capacity(running.len());
    while let Some(result) = tasks.join_next_with_id().await {
        match result {
            Ok((id, outcome)) => {
                running.remove(&id);
                outcomes.push(outcome);
            }
            Err(e) => {
                let Some(user) = running.remove(&e.id()) else {
                    log::error!("Export task {} could not be joined: {}", e.id(), e);
                    continue;
                };
                log::error!("Export task for {} could not be joined: {}", user, e);
                let outcome = if e.is_cancelled() {
                    UserExportOutcome::cancelled(user)
                } else {
                    UserExportOutcome::failed(
                        user,
                        FailureStage::Panicked,
                        ExportError::WorkerPanicked(e.to_string()),
                    )
                };
                outcomes.push(outcome);
            }
        }
    }
    outcomes
}

/// Run a worker, turning a panic into a reported failure for that user
async fn run_contained(worker: ExportWorker) -> UserExportOutcome {
    let user = worker.user().clone();
    match AssertUnwindSafe(worker.run()).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            log::error!("Export worker for {} panicked: {}", user, message);
            UserExportOutcome::failed(user, FailureStage::Panicked, ExportError::WorkerPanicked(message))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
