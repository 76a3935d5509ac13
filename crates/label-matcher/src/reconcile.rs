//! Reconciler
//!
//! One batch end to end: authenticate once, pull the report once, then move
//! every label to `processed/` or `errors/`. Authentication and report
//! failures send the whole batch to `errors/`; a failed move stops the batch
//! so the delivery layer redelivers it.

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::batch::{self, DeliveryBatch, LabelDescriptor};
use crate::error::ReconcileError;
use crate::notify::{Alert, BatchFailure, ErrorMoves, Notifier};
use crate::storage::{MoveOutcome, ObjectStore};
use crate::wms::{OrderSource, ReportRow};
use label_common::Folder;

/// Order references present in one report snapshot. Rebuilt for every batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderIndex(HashSet<String>);

impl OrderIndex {
    /// Project `column` of every row into a set of trimmed strings.
    ///
    /// Strings and numbers count; empty, null, boolean and nested values do not.
    pub fn from_rows(rows: &[ReportRow], column: &str) -> Self {
        Self(
            rows.iter()
                .filter_map(|row| row.get(column).and_then(order_id))
                .collect(),
        )
    }

    /// Exact, case-sensitive membership of the trimmed reference
    pub fn contains(&self, order_reference: &str) -> bool {
        self.0.contains(order_reference.trim())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn order_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

/// Outcome of a successful run, by filename
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "SummaryCounts")]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub matched: Vec<String>,
    pub unmatched: Vec<String>,
    /// Source already gone: moved by an earlier or concurrent run
    pub skipped: Vec<String>,
}

/// Wire form of [`BatchSummary`] returned to the delivery layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SummaryCounts {
    pub matched: usize,
    pub unmatched: usize,
    pub skipped: usize,
}

impl From<BatchSummary> for SummaryCounts {
    fn from(summary: BatchSummary) -> Self {
        summary.counts()
    }
}

impl BatchSummary {
    fn new(batch_id: Uuid) -> Self {
        Self {
            batch_id,
            matched: Vec::new(),
            unmatched: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn counts(&self) -> SummaryCounts {
        SummaryCounts {
            matched: self.matched.len(),
            unmatched: self.unmatched.len(),
            skipped: self.skipped.len(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.matched.is_empty() && self.unmatched.is_empty() && self.skipped.is_empty()
    }
}

pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    orders: Arc<dyn OrderSource>,
    notifier: Notifier,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ObjectStore>, orders: Arc<dyn OrderSource>, notifier: Notifier) -> Self {
        Self {
            store,
            orders,
            notifier,
        }
    }

    /// Decode and reconcile one delivery batch
    pub async fn process(&self, batch: &DeliveryBatch) -> Result<BatchSummary, ReconcileError> {
        let batch_id = Uuid::new_v4();
        let descriptors = batch::decode(batch);

        let span = info_span!(
            "batch",
            %batch_id,
            entries = batch.len(),
            labels = descriptors.len()
        );

        self.reconcile(batch_id, descriptors).instrument(span).await
    }

    /// Reconcile already-decoded descriptors
    pub async fn reconcile(
        &self,
        batch_id: Uuid,
        descriptors: Vec<LabelDescriptor>,
    ) -> Result<BatchSummary, ReconcileError> {
        let mut summary = BatchSummary::new(batch_id);

        if descriptors.is_empty() {
            info!("No valid files in batch");
            return Ok(summary);
        }

        info!("Processing batch of {} label files", descriptors.len());

        let credential = match self.orders.authenticate().await {
            Ok(credential) => credential,
            Err(e) => {
                error!("Authentication failed: {}", e);
                self.fail_batch(BatchFailure::Authentication, &e.to_string(), &descriptors)
                    .await;
                return Err(e.into());
            }
        };

        let rows = match self.orders.pull_report(&credential).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Report pull failed: {}", e);
                self.fail_batch(BatchFailure::Report, &e.to_string(), &descriptors)
                    .await;
                return Err(e.into());
            }
        };

        let index = OrderIndex::from_rows(&rows, self.orders.order_id_column());
        info!(
            "Report returned {} rows, {} unique order IDs",
            rows.len(),
            index.len()
        );

        for descriptor in &descriptors {
            let matched = index.contains(&descriptor.order_reference);
            let dest = if matched {
                Folder::Processed
            } else {
                Folder::Errors
            };

            match self.store.move_to(&descriptor.source, dest.prefix()).await {
                Ok(MoveOutcome::Moved { .. }) | Ok(MoveOutcome::AlreadyInPlace) => {
                    info!("Moved {} -> {}", descriptor.filename, dest.prefix());
                    if matched {
                        summary.matched.push(descriptor.filename.clone());
                    } else {
                        summary.unmatched.push(descriptor.filename.clone());
                    }
                }
                Ok(MoveOutcome::SourceMissing) => {
                    warn!(
                        location = %descriptor.source,
                        "Source already gone, skipping {}",
                        descriptor.filename
                    );
                    summary.skipped.push(descriptor.filename.clone());
                }
                Err(e) => {
                    error!("Failed to move {}: {}", descriptor.filename, e);
                    self.notifier
                        .publish(&Alert::move_failure(&descriptor.filename, &e.to_string()))
                        .await;
                    return Err(ReconcileError::Move {
                        filename: descriptor.filename.clone(),
                        source: e,
                    });
                }
            }
        }

        let counts = summary.counts();
        info!(
            matched = counts.matched,
            unmatched = counts.unmatched,
            skipped = counts.skipped,
            "Batch reconciled"
        );

        if !summary.unmatched.is_empty() {
            self.notifier
                .publish(&Alert::unmatched(self.orders.report_name(), &summary.unmatched))
                .await;
        }

        if !summary.matched.is_empty() {
            self.notifier.publish(&Alert::matched(&summary.matched)).await;
        }

        Ok(summary)
    }

    /// Best-effort: every descriptor is attempted even when some moves fail
    async fn fail_batch(
        &self,
        failure: BatchFailure,
        reason: &str,
        descriptors: &[LabelDescriptor],
    ) {
        let moves_in_flight = descriptors.iter().map(|descriptor| async move {
            let result = self
                .store
                .move_to(&descriptor.source, Folder::Errors.prefix())
                .await;
            (descriptor, result)
        });

        let mut moves = ErrorMoves::new(descriptors.iter().map(|d| d.filename.clone()).collect());
        for (descriptor, result) in join_all(moves_in_flight).await {
            match result {
                Ok(MoveOutcome::SourceMissing) => {
                    warn!(location = %descriptor.source, "Source already gone, skipping {}", descriptor.filename);
                    moves.missing.push(descriptor.filename.clone());
                }
                Ok(_) => info!("Moved {} -> {}", descriptor.filename, Folder::Errors.prefix()),
                Err(e) => {
                    error!("Failed to move {} to errors: {}", descriptor.filename, e);
                    moves.unmoved.push(descriptor.filename.clone());
                }
            }
        }

        self.notifier
            .publish(&Alert::batch_failure(
                failure,
                reason,
                self.orders.report_name(),
                &moves,
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: Vec<Value>) -> Vec<ReportRow> {
        values
            .into_iter()
            .map(|value| match value {
                Value::Object(row) => row,
                _ => panic!("row must be an object"),
            })
            .collect()
    }

    #[test]
    fn test_index_trims_and_is_case_sensitive() {
        let index = OrderIndex::from_rows(
            &rows(vec![
                json!({"OrderID": " PO-100 "}),
                json!({"OrderID": "PO-200"}),
            ]),
            "OrderID",
        );

        assert!(index.contains("PO-100"));
        assert!(index.contains("PO-100 "));
        assert!(!index.contains("po-100"));
        assert!(!index.contains("PO-10"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_index_projection_rules() {
        let index = OrderIndex::from_rows(
            &rows(vec![
                json!({"OrderID": 4512}),
                json!({"OrderID": "   "}),
                json!({"OrderID": null}),
                json!({"OrderID": true}),
                json!({"OrderID": ["PO-1"]}),
                json!({"Other": "PO-2"}),
                json!({"OrderID": "PO-3"}),
                json!({"OrderID": "PO-3"}),
            ]),
            "OrderID",
        );

        assert!(index.contains("4512"));
        assert!(index.contains("PO-3"));
        assert!(!index.contains("PO-2"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_summary_serializes_counts() {
        let summary = BatchSummary {
            batch_id: Uuid::nil(),
            matched: vec!["PO-1.pdf".to_string()],
            unmatched: vec!["PO-2.pdf".to_string(), "PO-4.pdf".to_string()],
            skipped: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({"matched": 1, "unmatched": 2, "skipped": 0})
        );
        assert!(!summary.is_noop());
    }
}
