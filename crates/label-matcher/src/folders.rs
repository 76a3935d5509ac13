//! Operator primitives over the labels bucket
//!
//! What a dashboard or the CLI needs to browse, retry, archive and clear
//! labels. Everything goes through [`ObjectStore`]; no other metadata exists.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::batch::order_reference;
use crate::error::FolderError;
use crate::storage::{MoveOutcome, ObjectLocation, ObjectStore, StorageObject};
use label_common::Folder;

pub type FolderResult<T> = std::result::Result<T, FolderError>;

/// Result of a bulk operation that keeps going past individual failures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub moved: Vec<String>,
    /// `(filename, error)`
    pub failed: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct LabelFolders {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl LabelFolders {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn location(&self, key: &str) -> ObjectLocation {
        ObjectLocation::new(self.bucket.clone(), key)
    }

    /// Objects in `folder`, folder markers excluded
    pub async fn list(&self, folder: Folder) -> FolderResult<Vec<StorageObject>> {
        let prefix = folder.prefix();
        let objects = self.store.list(&self.bucket, prefix).await?;
        Ok(objects
            .into_iter()
            .filter(|object| !object.is_folder_marker(prefix))
            .collect())
    }

    pub async fn read(&self, key: &str) -> FolderResult<Vec<u8>> {
        Ok(self.store.read(&self.location(key)).await?)
    }

    pub async fn delete(&self, key: &str) -> FolderResult<()> {
        Ok(self.store.delete(&self.location(key)).await?)
    }

    /// Send an `errors/` object back to `incoming/` for another pass
    #[instrument(skip(self))]
    pub async fn retry(&self, key: &str) -> FolderResult<MoveOutcome> {
        require_folder(key, Folder::Errors)?;
        let outcome = self
            .store
            .move_to(&self.location(key), Folder::Incoming.prefix())
            .await?;
        info!(?outcome, "Retrying {}", key);
        Ok(outcome)
    }

    /// Retry everything in `errors/`, continuing past failures
    pub async fn retry_all(&self) -> FolderResult<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for object in self.list(Folder::Errors).await? {
            match self.retry(&object.key).await {
                Ok(_) => outcome.moved.push(object.filename),
                Err(e) => {
                    warn!("Failed to retry {}: {}", object.filename, e);
                    outcome.failed.push((object.filename, e.to_string()));
                }
            }
        }
        Ok(outcome)
    }

    /// Archive a `processed/` object as `printed/YYYYmmdd_HHMMSS_<filename>`
    pub async fn mark_printed(&self, key: &str) -> FolderResult<MoveOutcome> {
        self.mark_printed_at(key, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn mark_printed_at(&self, key: &str, at: DateTime<Utc>) -> FolderResult<MoveOutcome> {
        require_folder(key, Folder::Processed)?;
        let source = self.location(key);
        let dest_key = Folder::Printed.key_for(&format!(
            "{}_{}",
            at.format("%Y%m%d_%H%M%S"),
            source.filename()
        ));
        Ok(self.store.move_object(&source, &dest_key).await?)
    }

    /// Delete every object in `printed/` or `errors/`. Returns the number deleted.
    #[instrument(skip(self))]
    pub async fn clear(&self, folder: Folder) -> FolderResult<usize> {
        if !matches!(folder, Folder::Printed | Folder::Errors) {
            return Err(FolderError::Protected(folder));
        }

        let objects = self.list(folder).await?;
        for object in &objects {
            self.store.delete(&object.location()).await?;
        }

        info!("Cleared {} objects from {}", objects.len(), folder.prefix());
        Ok(objects.len())
    }

    /// Objects in `folder` whose order reference appears in `text`
    /// (comma or newline separated)
    pub async fn select_by_order_ids(
        &self,
        folder: Folder,
        text: &str,
    ) -> FolderResult<Vec<StorageObject>> {
        let wanted = parse_order_ids(text);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .list(folder)
            .await?
            .into_iter()
            .filter(|object| {
                order_reference(&object.filename).is_some_and(|reference| wanted.contains(&reference))
            })
            .collect())
    }
}

fn require_folder(key: &str, expected: Folder) -> FolderResult<()> {
    if Folder::of_key(key) == Some(expected) {
        Ok(())
    } else {
        Err(FolderError::WrongFolder {
            key: key.to_string(),
            expected,
        })
    }
}

/// Split on commas and newlines, trimmed, empties dropped
pub fn parse_order_ids(text: &str) -> HashSet<String> {
    text.split([',', '\n'])
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
