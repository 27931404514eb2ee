//! Run statistics for a reconciliation pass.
//!
//! Pure bookkeeping, decoupled from I/O: the orchestrator feeds every batch
//! outcome into a [`SyncRun`], and the CLI renders it at the end.

use std::fmt;

use crate::batch::BatchOutcome;
use crate::window::DateWindow;

/// Mutating phase a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Deleting,
    Uploading,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Deleting => write!(f, "delete"),
            SyncPhase::Uploading => write!(f, "upload"),
        }
    }
}

/// Lifecycle of one run. `Failed` is only reachable from `Authenticating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Authenticating,
    Querying,
    Deleting,
    Uploading,
    Done,
    Failed,
}

/// A batch that was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub phase: SyncPhase,
    /// 1-based position of the batch within its phase.
    pub batch_number: usize,
    pub size: usize,
    pub status: Option<u16>,
    pub detail: String,
}

/// Attempted versus applied counts for one phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PhaseStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub batches: usize,
    pub failed_batches: usize,
}

impl PhaseStats {
    /// Records handed to failed batches.
    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }
}

/// Aggregate state of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub window: Option<DateWindow>,
    pub state: RunState,
    /// Rows read from the report.
    pub source_records: usize,
    /// Rows left after the window filter.
    pub filtered_records: usize,
    /// Remote records matched by the delete query.
    pub matched_for_delete: usize,
    pub delete: PhaseStats,
    pub upload: PhaseStats,
    pub failures: Vec<BatchFailure>,
    /// Set when the delete query failed; deletion was skipped.
    pub query_error: Option<String>,
}

impl SyncRun {
    pub fn new(window: Option<DateWindow>) -> Self {
        Self {
            window,
            state: RunState::Authenticating,
            source_records: 0,
            filtered_records: 0,
            matched_for_delete: 0,
            delete: PhaseStats::default(),
            upload: PhaseStats::default(),
            failures: Vec::new(),
            query_error: None,
        }
    }

    pub fn advance(&mut self, state: RunState) {
        self.state = state;
    }

    /// Folds one batch outcome into the totals. Every batch lands here,
    /// whether it succeeded or not.
    pub fn record(&mut self, phase: SyncPhase, batch_number: usize, size: usize, outcome: &BatchOutcome) {
        let stats = match phase {
            SyncPhase::Deleting => &mut self.delete,
            SyncPhase::Uploading => &mut self.upload,
        };
        stats.attempted += size;
        stats.batches += 1;

        match outcome {
            BatchOutcome::Success(count) => stats.succeeded += count,
            BatchOutcome::Failure { status, detail } => {
                stats.failed_batches += 1;
                self.failures.push(BatchFailure {
                    phase,
                    batch_number,
                    size,
                    status: *status,
                    detail: detail.clone(),
                });
            }
        }
    }

    pub fn deleted(&self) -> usize {
        self.delete.succeeded
    }

    pub fn uploaded(&self) -> usize {
        self.upload.succeeded
    }

    pub fn failed_batches(&self) -> usize {
        self.failures.len()
    }

    /// True once the run reached `Done`, even with failed batches.
    pub fn is_complete(&self) -> bool {
        self.state == RunState::Done
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty() || self.query_error.is_some()
    }
}

impl fmt::Display for SyncRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(window) = &self.window {
            writeln!(f, "  Window:           {}", window)?;
        }
        writeln!(f, "  Source records:   {}", self.source_records)?;
        writeln!(f, "  In window:        {}", self.filtered_records)?;
        writeln!(
            f,
            "  Deleted:          {}/{} ({} batches, {} failed)",
            self.delete.succeeded, self.delete.attempted, self.delete.batches, self.delete.failed_batches
        )?;
        write!(
            f,
            "  Uploaded:         {}/{} ({} batches, {} failed)",
            self.upload.succeeded, self.upload.attempted, self.upload.batches, self.upload.failed_batches
        )?;
        if let Some(error) = &self.query_error {
            write!(f, "\n  ✗ delete query failed: {}", error)?;
        }
        for failure in &self.failures {
            let status = failure
                .status
                .map_or_else(|| "transport error".to_string(), |s| format!("HTTP {}", s));
            write!(
                f,
                "\n  ✗ {} batch {} ({} records): {}",
                failure.phase, failure.batch_number, failure.size, status
            )?;
        }
        Ok(())
    }
}
