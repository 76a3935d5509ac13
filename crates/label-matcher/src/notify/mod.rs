//! Notifier
//!
//! Aggregated, best-effort operator alerts. A failed dispatch is logged and
//! otherwise ignored; it never fails or retries a batch.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::AlertError;
use label_common::Folder;

pub mod sns;

pub use sns::SnsAlertSink;

/// Subjects longer than this are cut before dispatch
pub const MAX_SUBJECT_CHARS: usize = 100;

const SUBJECT_PREFIX: &str = "Label Matcher";

/// Pub/sub channel for alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, subject: &str, body: &str) -> Result<(), AlertError>;
}

/// Writes alerts to the log. Used when no topic is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn publish(&self, subject: &str, body: &str) -> Result<(), AlertError> {
        info!(subject, "Alert (no topic configured):\n{}", body);
        Ok(())
    }
}

/// Why a whole batch was sent to `errors/`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFailure {
    Authentication,
    Report,
}

/// One alert message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub subject: String,
    pub body: String,
}

/// Where each file of a failed batch ended up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorMoves {
    /// Every file in the batch, in delivery order
    pub files: Vec<String>,
    /// Gone from `incoming/` before the move ran
    pub missing: Vec<String>,
    /// Move failed; still in `incoming/`
    pub unmoved: Vec<String>,
}

impl ErrorMoves {
    pub fn new(files: Vec<String>) -> Self {
        Self {
            files,
            ..Default::default()
        }
    }

    /// Files that actually landed in `errors/`
    pub fn moved(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|name| !self.missing.contains(name) && !self.unmoved.contains(name))
            .cloned()
            .collect()
    }
}

impl Alert {
    /// The batch could not be reconciled because of `failure`; its files
    /// were sent to `errors/` as far as `moves` records.
    pub fn batch_failure(
        failure: BatchFailure,
        reason: &str,
        report_name: &str,
        moves: &ErrorMoves,
    ) -> Self {
        let (subject, headline) = match failure {
            BatchFailure::Authentication => (
                format!("{} - Authentication Failure", SUBJECT_PREFIX),
                "Failed to authenticate with the WMS.".to_string(),
            ),
            BatchFailure::Report => (
                format!("{} - Report Failure", SUBJECT_PREFIX),
                format!("Failed to pull WMS report '{}'.", report_name),
            ),
        };

        let mut body = format!(
            "{}\nReason: {}\n\n{} label file(s) could not be processed:\n\n{}",
            headline,
            reason,
            moves.files.len(),
            bullet_list(&moves.files),
        );

        if moves.missing.is_empty() && moves.unmoved.is_empty() {
            body.push_str(&format!(
                "\n\nAll of them have been moved to {}.",
                Folder::Errors.prefix()
            ));
            return Self { subject, body };
        }

        let moved = moves.moved();
        if !moved.is_empty() {
            body.push_str(&format!(
                "\n\nMoved to {}:\n\n{}",
                Folder::Errors.prefix(),
                bullet_list(&moved),
            ));
        }
        if !moves.missing.is_empty() {
            body.push_str(&format!(
                "\n\nAlready gone from {} (handled by another run), nothing moved:\n\n{}",
                Folder::Incoming.prefix(),
                bullet_list(&moves.missing),
            ));
        }
        if !moves.unmoved.is_empty() {
            body.push_str(&format!(
                "\n\nCould not be moved and remain in {}:\n\n{}",
                Folder::Incoming.prefix(),
                bullet_list(&moves.unmoved),
            ));
        }

        Self { subject, body }
    }

    pub fn unmatched(report_name: &str, filenames: &[String]) -> Self {
        Self {
            subject: format!("{} - {} Unmatched Label(s)", SUBJECT_PREFIX, filenames.len()),
            body: format!(
                "The following label files were uploaded but no matching order was found in WMS report '{}':\n\n{}\n\nThese files have been moved to the {} folder.\nPlease verify filenames match existing order references.",
                report_name,
                bullet_list(filenames),
                Folder::Errors.prefix(),
            ),
        }
    }

    pub fn matched(filenames: &[String]) -> Self {
        Self {
            subject: format!(
                "{} - {} Label(s) Matched Successfully",
                SUBJECT_PREFIX,
                filenames.len()
            ),
            body: format!(
                "The following labels were matched to orders and are ready for printing in {}:\n\n{}",
                Folder::Processed.prefix(),
                bullet_list(filenames),
            ),
        }
    }

    /// A move failed mid-batch; the batch will be redelivered
    pub fn move_failure(filename: &str, reason: &str) -> Self {
        Self {
            subject: format!("{} - Move Failure", SUBJECT_PREFIX),
            body: format!(
                "Failed to move label file '{}': {}\n\nThe batch has been returned for redelivery. Check the bucket for a copy left in two folders.",
                filename, reason
            ),
        }
    }
}

fn bullet_list(filenames: &[String]) -> String {
    filenames
        .iter()
        .map(|name| format!("- {}", name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut `subject` to at most [`MAX_SUBJECT_CHARS`] characters
pub fn truncate_subject(subject: &str) -> &str {
    match subject.char_indices().nth(MAX_SUBJECT_CHARS) {
        Some((idx, _)) => &subject[..idx],
        None => subject,
    }
}

#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn AlertSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Dispatch one alert. Returns whether the sink accepted it.
    pub async fn publish(&self, alert: &Alert) -> bool {
        let subject = truncate_subject(&alert.subject);
        match self.sink.publish(subject, &alert.body).await {
            Ok(()) => {
                info!(subject, "Alert sent");
                true
            }
            Err(e) => {
                error!(subject, "Failed to send alert: {}", e);
                false
            }
        }
    }
}
