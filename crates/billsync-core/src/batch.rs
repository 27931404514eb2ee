//! OData `$batch` payload construction and batch outcome classification.
//!
//! Every batch wraps a single changeset, so the server applies its
//! operations atomically: one failing operation rolls back the whole
//! changeset. That lets a batch be judged by its HTTP status alone, see
//! [`BatchOutcome::from_status`].

use serde_json::Value;
use uuid::Uuid;

use crate::config::TargetConfig;
use crate::models::TargetRecord;

/// Statuses that mean the whole changeset was applied.
pub const SUCCESS_STATUSES: [u16; 3] = [200, 201, 204];

/// Maximum characters of a failed response kept for diagnostics.
pub const DETAIL_LIMIT: usize = 500;

const CRLF: &str = "\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Delete,
}

impl OperationKind {
    pub fn verb(&self) -> &'static str {
        match self {
            OperationKind::Create => "POST",
            OperationKind::Delete => "DELETE",
        }
    }
}

/// A single operation inside a changeset.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create a record from its serialized JSON body.
    Create(String),
    /// Delete the record with this primary key.
    Delete(String),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create(_) => OperationKind::Create,
            Operation::Delete(_) => OperationKind::Delete,
        }
    }
}

/// One `$batch` request, ready to send.
#[derive(Debug, Clone)]
pub struct Batch {
    pub batch_id: Uuid,
    pub changeset_id: Uuid,
    pub kind: OperationKind,
    pub operations: Vec<Operation>,
    pub body: String,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Always false for batches produced by [`BatchBuilder`].
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn boundary(&self) -> String {
        format!("batch_{}", self.batch_id)
    }

    /// Value of the outer `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary())
    }
}

/// Builds `$batch` payloads addressed at one target table.
///
/// # Examples
///
/// ```
/// use billsync_core::batch::BatchBuilder;
/// use billsync_core::TargetConfig;
///
/// let target = TargetConfig::new("https://org.crm.dynamics.com", "cr834");
/// let ids: Vec<String> = (0..7).map(|i| format!("id-{}", i)).collect();
///
/// let batches = BatchBuilder::new(&target).deletes(&ids, 3);
/// let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
/// assert_eq!(sizes, vec![3, 3, 1]);
/// ```
pub struct BatchBuilder<'a> {
    target: &'a TargetConfig,
}

impl<'a> BatchBuilder<'a> {
    pub fn new(target: &'a TargetConfig) -> Self {
        Self { target }
    }

    /// Create batches for `records`, at most `max_batch_size` per batch.
    pub fn creates(&self, records: &[TargetRecord], max_batch_size: usize) -> Vec<Batch> {
        let operations = records
            .iter()
            .map(|record| {
                let json = Value::Object(record.to_json(&self.target.table_prefix));
                Operation::Create(json.to_string())
            })
            .collect();
        self.build(operations, max_batch_size)
    }

    /// Delete batches for primary keys `ids`, at most `max_batch_size` per batch.
    pub fn deletes(&self, ids: &[String], max_batch_size: usize) -> Vec<Batch> {
        let operations = ids.iter().cloned().map(Operation::Delete).collect();
        self.build(operations, max_batch_size)
    }

    /// Splits `operations` into consecutive chunks and renders each one.
    ///
    /// Produces `ceil(len / max_batch_size)` batches; only the last may be
    /// short. A zero size is treated as one.
    pub fn build(&self, operations: Vec<Operation>, max_batch_size: usize) -> Vec<Batch> {
        operations
            .chunks(max_batch_size.max(1))
            .map(|chunk| self.render(chunk.to_vec()))
            .collect()
    }

    fn render(&self, operations: Vec<Operation>) -> Batch {
        let batch_id = Uuid::new_v4();
        let changeset_id = Uuid::new_v4();
        let kind = operations
            .first()
            .map_or(OperationKind::Create, Operation::kind);

        let mut body = format!(
            "--batch_{batch_id}{CRLF}\
             Content-Type: multipart/mixed; boundary=changeset_{changeset_id}{CRLF}{CRLF}"
        );

        for (idx, operation) in operations.iter().enumerate() {
            body.push_str(&format!(
                "--changeset_{changeset_id}{CRLF}\
                 Content-Type: application/http{CRLF}\
                 Content-Transfer-Encoding: binary{CRLF}\
                 Content-ID: {}{CRLF}{CRLF}",
                idx + 1
            ));
            body.push_str(&self.render_request(operation));
        }

        body.push_str(&format!("--changeset_{changeset_id}--{CRLF}"));
        body.push_str(&format!("--batch_{batch_id}--{CRLF}"));

        Batch {
            batch_id,
            changeset_id,
            kind,
            operations,
            body,
        }
    }

    /// The embedded HTTP request for one operation.
    fn render_request(&self, operation: &Operation) -> String {
        match operation {
            Operation::Create(json) => format!(
                "POST {} HTTP/1.1{CRLF}\
                 Content-Type: application/json; charset=utf-8{CRLF}{CRLF}\
                 {}{CRLF}",
                self.target.entity_set_url(),
                json
            ),
            Operation::Delete(id) => {
                format!("DELETE {} HTTP/1.1{CRLF}{CRLF}", self.target.record_url(id))
            }
        }
    }
}

/// Result of transmitting one batch. Success is never partial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every operation in the batch was applied.
    Success(usize),
    /// Nothing was applied. `status` is `None` when no response arrived.
    Failure { status: Option<u16>, detail: String },
}

impl BatchOutcome {
    /// Classifies a `$batch` response for a batch of `batch_size` operations.
    pub fn from_status(status: u16, batch_size: usize, body: &str) -> Self {
        if SUCCESS_STATUSES.contains(&status) {
            BatchOutcome::Success(batch_size)
        } else {
            BatchOutcome::Failure {
                status: Some(status),
                detail: truncate_detail(body),
            }
        }
    }

    /// A failure where the request never produced a response.
    pub fn transport_failure(detail: impl Into<String>) -> Self {
        BatchOutcome::Failure {
            status: None,
            detail: truncate_detail(&detail.into()),
        }
    }

    /// Records counted as applied.
    pub fn succeeded(&self) -> usize {
        match self {
            BatchOutcome::Success(count) => *count,
            BatchOutcome::Failure { .. } => 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success(_))
    }
}

/// True for statuses worth retrying: throttling and server errors.
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Cuts response text to [`DETAIL_LIMIT`] characters.
pub fn truncate_detail(text: &str) -> String {
    text.chars().take(DETAIL_LIMIT).collect()
}
