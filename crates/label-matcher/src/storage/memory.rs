//! In-process object store
//!
//! Backs tests and dry runs. Behaves like the S3 store for the operations the
//! pipeline relies on: copy of a missing source is `NotFound`, deleting a
//! missing key succeeds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{ObjectLocation, ObjectStore, StorageObject, StoreResult};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct Blob {
    bytes: Vec<u8>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<ObjectLocation, Blob>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) {
        self.lock().insert(
            ObjectLocation::new(bucket, key),
            Blob {
                bytes: bytes.into(),
                last_modified: Utc::now(),
            },
        );
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.lock().contains_key(&ObjectLocation::new(bucket, key))
    }

    /// All keys in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|location| location.bucket == bucket)
            .map(|location| location.key.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ObjectLocation, Blob>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<StorageObject>> {
        Ok(self
            .lock()
            .iter()
            .filter(|(location, _)| location.bucket == bucket && location.key.starts_with(prefix))
            .map(|(location, blob)| StorageObject {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
                filename: location.filename().to_string(),
                size_bytes: blob.bytes.len() as i64,
                last_modified: Some(blob.last_modified),
            })
            .collect())
    }

    async fn read(&self, location: &ObjectLocation) -> StoreResult<Vec<u8>> {
        self.lock()
            .get(location)
            .map(|blob| blob.bytes.clone())
            .ok_or_else(|| StoreError::NotFound {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
            })
    }

    async fn copy(&self, source: &ObjectLocation, dest_key: &str) -> StoreResult<()> {
        let mut objects = self.lock();
        let blob = objects.get(source).cloned().ok_or_else(|| StoreError::NotFound {
            bucket: source.bucket.clone(),
            key: source.key.clone(),
        })?;
        objects.insert(
            source.with_key(dest_key),
            Blob {
                last_modified: Utc::now(),
                ..blob
            },
        );
        Ok(())
    }

    async fn delete(&self, location: &ObjectLocation) -> StoreResult<()> {
        self.lock().remove(location);
        Ok(())
    }
}
