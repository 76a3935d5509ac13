//! Common test utilities for label matcher integration tests
//!
//! In-process fakes for every collaborator of the reconciler: a recording
//! alert sink, an object store that fails on chosen keys, a static order
//! source, and wiremock helpers for the WMS HTTP endpoints.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use label_matcher::{
    batch::DeliveryBatch,
    config::{LoginCredentials, WmsConfig},
    error::{AlertError, AuthError, ReportError, StoreError},
    notify::{AlertSink, Notifier},
    reconcile::Reconciler,
    storage::{MemoryObjectStore, ObjectLocation, ObjectStore, StorageObject, StoreResult},
    wms::{Credential, OrderSource, PollPolicy, ReportRow, WmsClient},
};

pub const BUCKET: &str = "vwslabels";
pub const TOKEN: &str = "test-token";

// ============================================================================
// Alerts
// ============================================================================

/// Keeps every published alert
#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingAlertSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn subjects(&self) -> Vec<String> {
        self.alerts.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.alerts.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn publish(&self, subject: &str, body: &str) -> Result<(), AlertError> {
        self.alerts
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        if self.fail {
            return Err(AlertError("topic unavailable".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Storage
// ============================================================================

/// In-memory store whose copy or delete fails for chosen source keys
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryObjectStore,
    pub fail_copy: HashSet<String>,
    pub fail_delete: HashSet<String>,
}

impl FailingStore {
    pub fn failing_copy(keys: &[&str]) -> Self {
        Self {
            fail_copy: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing_delete(keys: &[&str]) -> Self {
        Self {
            fail_delete: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<StorageObject>> {
        self.inner.list(bucket, prefix).await
    }

    async fn read(&self, location: &ObjectLocation) -> StoreResult<Vec<u8>> {
        self.inner.read(location).await
    }

    async fn copy(&self, source: &ObjectLocation, dest_key: &str) -> StoreResult<()> {
        if self.fail_copy.contains(&source.key) {
            return Err(StoreError::Copy {
                bucket: source.bucket.clone(),
                source_key: source.key.clone(),
                dest_key: dest_key.to_string(),
                message: "access denied".to_string(),
            });
        }
        self.inner.copy(source, dest_key).await
    }

    async fn delete(&self, location: &ObjectLocation) -> StoreResult<()> {
        if self.fail_delete.contains(&location.key) {
            return Err(StoreError::Delete {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
                message: "access denied".to_string(),
            });
        }
        self.inner.delete(location).await
    }
}

pub fn seed(store: &MemoryObjectStore, keys: &[&str]) {
    for key in keys {
        store.put(BUCKET, key, b"%PDF-1.4".to_vec());
    }
}

// ============================================================================
// Orders
// ============================================================================

/// Order source with a canned outcome
pub enum StaticOrders {
    Rows(Vec<ReportRow>),
    AuthFails,
    ReportFails,
}

impl StaticOrders {
    pub fn with_ids(ids: &[&str]) -> Self {
        StaticOrders::Rows(ids.iter().map(|id| row(json!({ "OrderID": id }))).collect())
    }
}

#[async_trait]
impl OrderSource for StaticOrders {
    async fn authenticate(&self) -> Result<Credential, AuthError> {
        match self {
            StaticOrders::AuthFails => Err(AuthError::MissingToken),
            _ => Ok(Credential::new(TOKEN)),
        }
    }

    async fn pull_report(&self, _credential: &Credential) -> Result<Vec<ReportRow>, ReportError> {
        match self {
            StaticOrders::Rows(rows) => Ok(rows.clone()),
            _ => Err(ReportError::TooLarge {
                task_id: "t-1".to_string(),
            }),
        }
    }

    fn report_name(&self) -> &str {
        "Open Orders"
    }

    fn order_id_column(&self) -> &str {
        "OrderID"
    }
}

pub fn row(value: Value) -> ReportRow {
    match value {
        Value::Object(row) => row,
        other => panic!("report row must be an object, got {}", other),
    }
}

// ============================================================================
// WMS HTTP
// ============================================================================

pub fn login() -> LoginCredentials {
    LoginCredentials {
        username: "labels".to_string(),
        password: "hunter2".to_string(),
        system_id: "SYS1".to_string(),
    }
}

/// Config against `server` with a millisecond poll interval
pub fn wms_config(server: &MockServer, max_attempts: u32) -> WmsConfig {
    let mut config = WmsConfig::new(server.uri(), login());
    config.poll = PollPolicy {
        interval: Duration::from_millis(5),
        max_attempts,
    };
    config
}

pub fn wms_client(server: &MockServer, max_attempts: u32) -> WmsClient {
    WmsClient::new(wms_config(server, max_attempts)).unwrap()
}

pub async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/Login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Token": TOKEN })))
        .mount(server)
        .await;
}

pub async fn mount_submit(server: &MockServer, task_id: &str) {
    Mock::given(method("POST"))
        .and(path("/reports"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "TaskId": task_id })))
        .mount(server)
        .await;
}

/// Status endpoint answers `pending` for the first `pending_checks` calls, then `last`
pub async fn mount_status(server: &MockServer, task_id: &str, pending_checks: u64, last: &str) {
    let status_path = format!("/reports/{}/status", task_id);
    if pending_checks > 0 {
        Mock::given(method("GET"))
            .and(path(status_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Status": "Processing" })))
            .up_to_n_times(pending_checks)
            .with_priority(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(status_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Status": last })))
        .mount(server)
        .await;
}

pub async fn mount_data(server: &MockServer, task_id: &str, rows: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/reports/{}", task_id).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Data": rows })))
        .mount(server)
        .await;
}

// ============================================================================
// Batches
// ============================================================================

/// Queue event with one storage notification per key
pub fn batch(keys: &[&str]) -> DeliveryBatch {
    let records: Vec<Value> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let notification = json!({ "Records": [
                { "s3": { "bucket": { "name": BUCKET }, "object": { "key": key } } }
            ]});
            json!({ "messageId": format!("m-{}", i), "body": notification.to_string() })
        })
        .collect();

    DeliveryBatch::from_event_json(&json!({ "Records": records }).to_string()).unwrap()
}

pub fn reconciler(
    store: Arc<dyn ObjectStore>,
    orders: Arc<dyn OrderSource>,
    alerts: Arc<RecordingAlertSink>,
) -> Reconciler {
    Reconciler::new(store, orders, Notifier::new(alerts))
}
