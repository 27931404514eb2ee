//! Billsync Core - record mapping, batch building and the reconciliation engine.

pub mod batch;
pub mod config;
pub mod dates;
pub mod error;
pub mod mapping;
pub mod models;
pub mod reconcile;
pub mod source;
pub mod sync;
pub mod window;

pub use batch::{Batch, BatchBuilder, BatchOutcome, Operation, OperationKind};
pub use config::{HttpConfig, SyncConfig, TargetConfig};
pub use dates::{normalize_date, parse_date};
pub use error::AppError;
pub use mapping::{map_record, map_records};
pub use models::{FieldValue, SourceRecord, TargetRecord};
pub use reconcile::{Reconciler, SyncTarget};
pub use source::{read_source_file, read_source_records};
pub use sync::{BatchFailure, PhaseStats, RunState, SyncPhase, SyncRun};
pub use window::{filter_by_window, DateWindow, RemoteFilter};
