//! Delete-then-reinsert reconciliation of a date window.
//!
//! A run authenticates once, removes every remote record in the window and
//! uploads the report rows that fall inside it, so repeating a run with the
//! same report converges to the same remote table. Authentication failure is
//! the only fatal error; everything after it degrades per batch.

use std::future::Future;

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::batch::{Batch, BatchBuilder, BatchOutcome};
use crate::config::{SyncConfig, TargetConfig};
use crate::error::AppError;
use crate::mapping::map_records;
use crate::models::SourceRecord;
use crate::sync::{RunState, SyncPhase, SyncRun};
use crate::window::{filter_by_window, DateWindow, RemoteFilter};

/// The remote table as seen by the orchestrator.
///
/// Calls are issued strictly one at a time.
pub trait SyncTarget: Send + Sync {
    /// Obtains the run's credential. An error aborts the run.
    fn authenticate(&self) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Primary keys of remote records matching `filter`.
    fn query_ids(
        &self,
        filter: &RemoteFilter,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    /// Transmits one batch. Never fails: problems come back as
    /// [`BatchOutcome::Failure`].
    fn execute(&self, batch: &Batch) -> impl Future<Output = BatchOutcome> + Send;
}

/// Drives a [`SyncTarget`] through authenticate, query, delete and upload.
pub struct Reconciler<'a, T: SyncTarget> {
    target: &'a T,
    table: &'a TargetConfig,
    sync: &'a SyncConfig,
}

impl<'a, T: SyncTarget> Reconciler<'a, T> {
    pub fn new(target: &'a T, table: &'a TargetConfig, sync: &'a SyncConfig) -> Self {
        Self {
            target,
            table,
            sync,
        }
    }

    /// Full pass: delete everything in `window`, then upload the rows of
    /// `rows` that fall inside it.
    ///
    /// A failed delete query is recorded in [`SyncRun::query_error`] and the
    /// upload still runs.
    pub async fn reconcile(
        &self,
        rows: &[SourceRecord],
        window: DateWindow,
    ) -> Result<SyncRun, AppError> {
        let mut run = SyncRun::new(Some(window));
        self.authenticate(&mut run).await?;

        self.delete_matching(&mut run, RemoteFilter::Within(window))
            .await;
        self.upload_rows(&mut run, rows).await;

        run.advance(RunState::Done);
        Ok(run)
    }

    /// Upload only. With no window every mapped row is sent.
    pub async fn upload(
        &self,
        rows: &[SourceRecord],
        window: Option<DateWindow>,
    ) -> Result<SyncRun, AppError> {
        let mut run = SyncRun::new(window);
        self.authenticate(&mut run).await?;
        self.upload_rows(&mut run, rows).await;
        run.advance(RunState::Done);
        Ok(run)
    }

    /// Delete only, for records dated inside `window`.
    pub async fn delete_range(&self, window: DateWindow) -> Result<SyncRun, AppError> {
        let mut run = SyncRun::new(Some(window));
        self.authenticate(&mut run).await?;
        self.delete_matching(&mut run, RemoteFilter::Within(window))
            .await;
        run.advance(RunState::Done);
        Ok(run)
    }

    /// Delete only, for records dated strictly after `cutoff`.
    pub async fn delete_after(&self, cutoff: NaiveDate) -> Result<SyncRun, AppError> {
        let mut run = SyncRun::new(None);
        self.authenticate(&mut run).await?;
        self.delete_matching(&mut run, RemoteFilter::After(cutoff))
            .await;
        run.advance(RunState::Done);
        Ok(run)
    }

    async fn authenticate(&self, run: &mut SyncRun) -> Result<(), AppError> {
        info!("Authenticating to Dataverse...");
        if let Err(e) = self.target.authenticate().await {
            run.advance(RunState::Failed);
            error!("Authentication failed: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Queries and deletes matching records. A failed query skips deletion.
    async fn delete_matching(&self, run: &mut SyncRun, filter: RemoteFilter) {
        run.advance(RunState::Querying);
        info!("Fetching records {}...", filter);

        let ids = match self.target.query_ids(&filter).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Error fetching records: {}", e);
                run.query_error = Some(e.to_string());
                return;
            }
        };
        run.matched_for_delete = ids.len();

        run.advance(RunState::Deleting);
        if ids.is_empty() {
            info!("No records found {}", filter);
            return;
        }
        info!("Found {} records to delete", ids.len());

        let batches =
            BatchBuilder::new(self.table).deletes(&ids, self.sync.delete_batch_size());
        self.execute_all(run, SyncPhase::Deleting, batches, ids.len())
            .await;

        info!(
            "✓ Deleted {} of {} records from table '{}'",
            run.deleted(),
            ids.len(),
            self.table.table_name
        );
    }

    async fn upload_rows(&self, run: &mut SyncRun, rows: &[SourceRecord]) {
        run.advance(RunState::Uploading);
        run.source_records = rows.len();

        if let Some(window) = &run.window {
            info!("Filtering records between {}...", window);
        }
        let records = filter_by_window(map_records(rows), run.window.as_ref());
        run.filtered_records = records.len();
        info!(
            "Found {} records to upload ({} dropped by the window filter)",
            records.len(),
            rows.len() - records.len()
        );

        if records.is_empty() {
            warn!("No records to upload");
            return;
        }

        let batches = BatchBuilder::new(self.table).creates(&records, self.sync.batch_size);
        self.execute_all(run, SyncPhase::Uploading, batches, records.len())
            .await;

        info!(
            "✓ Uploaded {} of {} records to table '{}'",
            run.uploaded(),
            records.len(),
            self.table.table_name
        );
    }

    async fn execute_all(
        &self,
        run: &mut SyncRun,
        phase: SyncPhase,
        batches: Vec<Batch>,
        total: usize,
    ) {
        for (idx, batch) in batches.iter().enumerate() {
            let number = idx + 1;
            let outcome = self.target.execute(batch).await;
            run.record(phase, number, batch.len(), &outcome);

            let done = match phase {
                SyncPhase::Deleting => run.deleted(),
                SyncPhase::Uploading => run.uploaded(),
            };
            match &outcome {
                BatchOutcome::Success(count) => info!(
                    "  {} batch {}: {} records (Total: {}/{})",
                    phase_verb(phase),
                    number,
                    count,
                    done,
                    total
                ),
                BatchOutcome::Failure { status, detail } => error!(
                    "  Error in {} batch {}: {} - {}",
                    phase,
                    number,
                    status.map_or_else(|| "no response".to_string(), |s| s.to_string()),
                    detail
                ),
            }
        }
    }
}

fn phase_verb(phase: SyncPhase) -> &'static str {
    match phase {
        SyncPhase::Deleting => "Deleted",
        SyncPhase::Uploading => "Uploaded",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Operation;
    use crate::sync::PhaseStats;
    use std::sync::Mutex;

    /// In-memory target that records every call.
    #[derive(Default)]
    struct FakeTarget {
        fail_auth: bool,
        fail_query: bool,
        remote_ids: Vec<String>,
        /// 1-based call numbers (across all batches) that return HTTP 500.
        failing_calls: Vec<usize>,
        calls: Mutex<Vec<String>>,
        executed: Mutex<Vec<Batch>>,
    }

    impl FakeTarget {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.executed.lock().unwrap().iter().map(Batch::len).collect()
        }
    }

    impl SyncTarget for FakeTarget {
        async fn authenticate(&self) -> Result<(), AppError> {
            self.calls.lock().unwrap().push("auth".to_string());
            if self.fail_auth {
                return Err(AppError::AuthenticationFailed("invalid_grant".to_string()));
            }
            Ok(())
        }

        async fn query_ids(&self, filter: &RemoteFilter) -> Result<Vec<String>, AppError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("query {}", filter.to_odata("d")));
            if self.fail_query {
                return Err(AppError::QueryFailed {
                    status: 400,
                    detail: "bad filter".to_string(),
                });
            }
            Ok(self.remote_ids.clone())
        }

        async fn execute(&self, batch: &Batch) -> BatchOutcome {
            let call = {
                let mut executed = self.executed.lock().unwrap();
                executed.push(batch.clone());
                executed.len()
            };
            self.calls
                .lock()
                .unwrap()
                .push(format!("{:?} {}", batch.kind, batch.len()));
            if self.failing_calls.contains(&call) {
                BatchOutcome::from_status(500, batch.len(), "server exploded")
            } else {
                BatchOutcome::from_status(204, batch.len(), "")
            }
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn window() -> DateWindow {
        DateWindow::new(ymd(2025, 1, 1), ymd(2025, 12, 31))
    }

    fn rows(dates: &[&str]) -> Vec<SourceRecord> {
        dates
            .iter()
            .map(|date| SourceRecord::from_pairs(&[("Person", "Ada"), ("Date", *date)]))
            .collect()
    }

    fn table() -> TargetConfig {
        TargetConfig::new("https://org.crm.dynamics.com", "cr834")
    }

    fn sync_config(batch_size: usize) -> SyncConfig {
        SyncConfig {
            batch_size,
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn test_upload_all_batches_succeed() {
        let target = FakeTarget::default();
        let (table, sync) = (table(), sync_config(2));
        let reconciler = Reconciler::new(&target, &table, &sync);

        let run = reconciler
            .upload(&rows(&["2025-03-01"; 5]), Some(window()))
            .await
            .unwrap();

        assert_eq!(target.batch_sizes(), vec![2, 2, 1]);
        assert_eq!(run.uploaded(), 5);
        assert_eq!(run.failed_batches(), 0);
        assert!(run.is_complete());
    }

    #[tokio::test]
    async fn test_middle_batch_failure_does_not_stop_run() {
        let target = FakeTarget {
            failing_calls: vec![2],
            ..FakeTarget::default()
        };
        let (table, sync) = (table(), sync_config(2));
        let reconciler = Reconciler::new(&target, &table, &sync);

        let run = reconciler
            .upload(&rows(&["2025-03-01"; 5]), Some(window()))
            .await
            .unwrap();

        assert_eq!(target.batch_sizes(), vec![2, 2, 1]);
        assert_eq!(run.uploaded(), 3);
        assert_eq!(run.failed_batches(), 1);
        assert_eq!(run.failures[0].batch_number, 2);
        assert_eq!(run.failures[0].status, Some(500));
        assert_eq!(run.upload.attempted, 5);
        assert!(run.is_complete());
    }

    #[tokio::test]
    async fn test_reconcile_deletes_then_uploads_in_window() {
        let target = FakeTarget {
            remote_ids: (0..7).map(|i| format!("id-{}", i)).collect(),
            ..FakeTarget::default()
        };
        let table = table();
        let sync = SyncConfig {
            batch_size: 1,
            delete_batch_multiplier: 3,
            window_days: 365,
        };
        let reconciler = Reconciler::new(&target, &table, &sync);

        let run = reconciler
            .reconcile(&rows(&["2025-01-01", "2025-06-15", "2026-01-01", ""]), window())
            .await
            .unwrap();

        assert_eq!(
            target.calls(),
            vec![
                "auth",
                "query d ge '2025-01-01' and d le '2025-12-31'",
                "Delete 3",
                "Delete 3",
                "Delete 1",
                "Create 1",
                "Create 1",
            ]
        );
        assert_eq!(run.matched_for_delete, 7);
        assert_eq!(run.deleted(), 7);
        assert_eq!(run.source_records, 4);
        assert_eq!(run.filtered_records, 2);
        assert_eq!(run.uploaded(), 2);
        assert_eq!(run.state, RunState::Done);
    }

    #[tokio::test]
    async fn test_delete_ids_are_addressed_in_batches() {
        let target = FakeTarget {
            remote_ids: vec!["a".to_string(), "b".to_string()],
            ..FakeTarget::default()
        };
        let (table, sync) = (table(), sync_config(500));
        Reconciler::new(&target, &table, &sync)
            .delete_after(ymd(2024, 12, 31))
            .await
            .unwrap();

        let executed = target.executed.lock().unwrap();
        assert_eq!(
            executed[0].operations,
            vec![Operation::Delete("a".into()), Operation::Delete("b".into())]
        );
        assert!(target.calls()[1].contains("d gt '2024-12-31'"));
    }

    #[tokio::test]
    async fn test_authentication_failure_is_fatal() {
        let target = FakeTarget {
            fail_auth: true,
            remote_ids: vec!["a".to_string()],
            ..FakeTarget::default()
        };
        let (table, sync) = (table(), sync_config(2));
        let reconciler = Reconciler::new(&target, &table, &sync);

        let result = reconciler.reconcile(&rows(&["2025-03-01"]), window()).await;

        assert!(matches!(result, Err(AppError::AuthenticationFailed(_))));
        assert_eq!(target.calls(), vec!["auth"]);
    }

    #[tokio::test]
    async fn test_query_failure_skips_delete_but_uploads() {
        let target = FakeTarget {
            fail_query: true,
            ..FakeTarget::default()
        };
        let (table, sync) = (table(), sync_config(2));
        let reconciler = Reconciler::new(&target, &table, &sync);

        let run = reconciler
            .reconcile(&rows(&["2025-03-01", "2025-04-01"]), window())
            .await
            .unwrap();

        assert!(run.is_complete());
        assert!(run.query_error.is_some());
        assert!(run.has_failures());
        assert_eq!(run.delete, PhaseStats::default());
        assert_eq!(run.source_records, 2);
        assert_eq!(run.filtered_records, 2);
        assert_eq!(run.uploaded(), 2);
        assert_eq!(target.batch_sizes(), vec![2]);
        assert_eq!(target.calls()[2], "Create 2");
    }

    #[tokio::test]
    async fn test_failed_delete_batch_does_not_block_upload() {
        let target = FakeTarget {
            remote_ids: vec!["a".to_string()],
            failing_calls: vec![1],
            ..FakeTarget::default()
        };
        let (table, sync) = (table(), sync_config(2));
        let run = Reconciler::new(&target, &table, &sync)
            .reconcile(&rows(&["2025-03-01"]), window())
            .await
            .unwrap();

        assert_eq!(run.deleted(), 0);
        assert_eq!(run.delete.failed_batches, 1);
        assert_eq!(run.uploaded(), 1);
    }

    #[tokio::test]
    async fn test_nothing_to_upload() {
        let target = FakeTarget::default();
        let (table, sync) = (table(), sync_config(2));
        let run = Reconciler::new(&target, &table, &sync)
            .upload(&rows(&["1999-01-01"]), Some(window()))
            .await
            .unwrap();

        assert_eq!(run.filtered_records, 0);
        assert_eq!(run.upload.batches, 0);
        assert!(run.is_complete());
    }
}
