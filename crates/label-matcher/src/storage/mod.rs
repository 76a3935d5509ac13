//! Object Store Adapter
//!
//! Thin, one-object-at-a-time boundary over a blob store organised by key
//! prefix. Moves are copy-then-delete unless an implementation overrides
//! [`ObjectStore::move_object`] with a native rename.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;

pub mod config;
pub mod memory;
pub mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Address of one blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Last path segment of the key
    pub fn filename(&self) -> &str {
        label_common::types::base_name(&self.key)
    }

    /// Same bucket, different key
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self::new(self.bucket.clone(), key)
    }
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageObject {
    pub bucket: String,
    pub key: String,
    pub filename: String,
    pub size_bytes: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl StorageObject {
    pub fn location(&self) -> ObjectLocation {
        ObjectLocation::new(self.bucket.clone(), self.key.clone())
    }

    /// Folder markers are zero-content keys standing in for the prefix itself
    pub fn is_folder_marker(&self, prefix: &str) -> bool {
        self.key == prefix || self.key.ends_with('/')
    }
}

/// Result of a move that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { dest_key: String },
    /// Nothing at the source: a concurrent or earlier run already moved it
    SourceMissing,
    /// Source and destination are the same key
    AlreadyInPlace,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every object whose key starts with `prefix`, across all pages
    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<StorageObject>>;

    async fn read(&self, location: &ObjectLocation) -> StoreResult<Vec<u8>>;

    /// Server-side copy within the bucket. Fails with [`StoreError::NotFound`]
    /// when the source does not exist.
    async fn copy(&self, source: &ObjectLocation, dest_key: &str) -> StoreResult<()>;

    /// Deleting a key that does not exist succeeds.
    async fn delete(&self, location: &ObjectLocation) -> StoreResult<()>;

    /// Move `source` to `dest_key` in the same bucket.
    ///
    /// Copy then delete. A failure after the copy surfaces as
    /// [`StoreError::Incomplete`]; the duplicate is left for inspection.
    async fn move_object(&self, source: &ObjectLocation, dest_key: &str) -> StoreResult<MoveOutcome> {
        if source.key == dest_key {
            return Ok(MoveOutcome::AlreadyInPlace);
        }

        match self.copy(source, dest_key).await {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => return Ok(MoveOutcome::SourceMissing),
            Err(e) => return Err(e),
        }

        self.delete(source).await.map_err(|e| StoreError::Incomplete {
            bucket: source.bucket.clone(),
            source_key: source.key.clone(),
            copied_to: dest_key.to_string(),
            message: e.to_string(),
        })?;

        Ok(MoveOutcome::Moved {
            dest_key: dest_key.to_string(),
        })
    }

    /// Move `source` into `dest_prefix`, keeping its filename
    async fn move_to(&self, source: &ObjectLocation, dest_prefix: &str) -> StoreResult<MoveOutcome> {
        let dest_key = format!("{}{}", dest_prefix, source.filename());
        self.move_object(source, &dest_key).await
    }
}
