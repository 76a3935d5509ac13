//! Error types for the reconciliation pipeline
//!
//! Each boundary has its own error so the reconciler can tell batch-fatal
//! failures (authentication, report, move) from per-entry and best-effort
//! ones (decode, alert).

use thiserror::Error;

/// Failure to turn one delivery entry into label descriptors.
///
/// Never fatal for the batch: the entry is logged and skipped.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("envelope is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("relay message is not valid JSON: {0}")]
    RelayJson(#[source] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("object key '{0}' is not valid percent-encoded UTF-8")]
    KeyEncoding(String),
}

/// Failure to obtain a WMS session token
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("login request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("login rejected with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("login response carried no token")]
    MissingToken,
}

/// Phase of the asynchronous report protocol an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPhase {
    Submit,
    Poll,
    Fetch,
}

impl std::fmt::Display for ReportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportPhase::Submit => write!(f, "submit"),
            ReportPhase::Poll => write!(f, "status"),
            ReportPhase::Fetch => write!(f, "fetch"),
        }
    }
}

/// Failure anywhere in submit, poll or fetch. Always fatal for the batch.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("report {phase} request failed: {source}")]
    Request {
        phase: ReportPhase,
        #[source]
        source: reqwest::Error,
    },

    #[error("report {phase} rejected with status {status}: {body}")]
    Status {
        phase: ReportPhase,
        status: u16,
        body: String,
    },

    #[error("report submit response carried no TaskId")]
    MissingTaskId,

    #[error("report task {task_id} rejected: request too large")]
    TooLarge { task_id: String },

    #[error("report task {task_id} not done after {attempts} status checks")]
    TimedOut { task_id: String, attempts: u32 },

    #[error("report task {task_id} returned no Data rows")]
    MissingData { task_id: String },
}

impl ReportError {
    pub(crate) fn request(phase: ReportPhase, source: reqwest::Error) -> Self {
        Self::Request { phase, source }
    }
}

/// Object store failure
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object s3://{bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("failed to list s3://{bucket}/{prefix}: {message}")]
    List {
        bucket: String,
        prefix: String,
        message: String,
    },

    #[error("failed to read s3://{bucket}/{key}: {message}")]
    Read {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("failed to copy s3://{bucket}/{source_key} to {dest_key}: {message}")]
    Copy {
        bucket: String,
        source_key: String,
        dest_key: String,
        message: String,
    },

    #[error("failed to delete s3://{bucket}/{key}: {message}")]
    Delete {
        bucket: String,
        key: String,
        message: String,
    },

    /// Copy landed but the source could not be removed; both keys now exist.
    #[error("copied s3://{bucket}/{source_key} to {copied_to} but could not delete the source: {message}")]
    Incomplete {
        bucket: String,
        source_key: String,
        copied_to: String,
        message: String,
    },
}

/// Alert dispatch failure. Logged by the notifier, never propagated.
#[derive(Error, Debug)]
#[error("alert dispatch failed: {0}")]
pub struct AlertError(pub String);

/// Batch-fatal failure reported back to the delivery layer
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("report pull failed: {0}")]
    Report(#[from] ReportError),

    #[error("failed to move {filename}: {source}")]
    Move {
        filename: String,
        #[source]
        source: StoreError,
    },
}

/// Operator-side folder operation failure
#[derive(Error, Debug)]
pub enum FolderError {
    #[error("{key} is not in {expected}/")]
    WrongFolder {
        key: String,
        expected: label_common::Folder,
    },

    #[error("refusing to clear {0}/: only printed/ and errors/ may be cleared")]
    Protected(label_common::Folder),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Trim a response body for inclusion in an error message
pub(crate) fn snippet(body: &str) -> String {
    const MAX_CHARS: usize = 300;
    body.chars().take(MAX_CHARS).collect()
}
