//! CLI command implementations

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::batch::DeliveryBatch;
use crate::config::{Config, FolderConfig};
use crate::folders::LabelFolders;
use crate::notify::{AlertSink, LogAlertSink, Notifier, SnsAlertSink};
use crate::reconcile::Reconciler;
use crate::storage::{MoveOutcome, S3ObjectStore, StorageObject};
use crate::wms::WmsClient;
use label_common::Folder;

/// Run one batch. An error here means the delivery layer should redeliver.
pub async fn process(batch_path: Option<&Path>) -> Result<()> {
    let config = Config::load()?;

    let raw = read_event(batch_path).await.with_context(|| match batch_path {
        Some(path) => format!("Failed to read batch file {}", path.display()),
        None => "Failed to read batch from stdin".to_string(),
    })?;
    let batch = DeliveryBatch::from_event_json(&raw).context("Invalid delivery event")?;

    let sink: Arc<dyn AlertSink> = match &config.alerts.topic_arn {
        Some(topic_arn) => Arc::new(SnsAlertSink::new(topic_arn.clone()).await),
        None => Arc::new(LogAlertSink),
    };

    let reconciler = Reconciler::new(
        Arc::new(S3ObjectStore::new(&config.storage).await),
        Arc::new(WmsClient::new(config.wms.clone()).context("Failed to build WMS client")?),
        Notifier::new(sink),
    );

    let summary = reconciler.process(&batch).await?;
    println!("{}", to_json(&summary, false)?);

    Ok(())
}

/// Raw delivery event from a file, or stdin when no path is given
async fn read_event(path: Option<&Path>) -> label_common::Result<String> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            raw
        }
    };
    Ok(raw)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> label_common::Result<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(rendered)
}

async fn folders() -> Result<LabelFolders> {
    let config = FolderConfig::load()?;
    Ok(LabelFolders::new(
        Arc::new(S3ObjectStore::new(&config.storage).await),
        config.bucket,
    ))
}

pub async fn list(folder: Folder, json: bool) -> Result<()> {
    let objects = folders().await?.list(folder).await?;

    if json {
        println!("{}", to_json(&objects, true)?);
        return Ok(());
    }

    if objects.is_empty() {
        println!("No labels in {}", folder.prefix());
        return Ok(());
    }

    print_objects(&objects);
    println!("\n{} label(s) in {}", objects.len(), folder.prefix());
    Ok(())
}

pub async fn retry(key: Option<&str>, all: bool) -> Result<()> {
    let folders = folders().await?;

    if all {
        let outcome = folders.retry_all().await?;
        for (filename, error) in &outcome.failed {
            eprintln!("Failed to retry {}: {}", filename, error);
        }
        println!(
            "{} label(s) moved back to {}",
            outcome.moved.len(),
            Folder::Incoming.prefix()
        );
        if !outcome.failed.is_empty() {
            anyhow::bail!("{} label(s) could not be retried", outcome.failed.len());
        }
        return Ok(());
    }

    let key = key.context("A key or --all is required")?;
    match folders.retry(key).await? {
        MoveOutcome::SourceMissing => println!("{} no longer exists", key),
        _ => println!("Retrying {}", key),
    }
    Ok(())
}

pub async fn mark_printed(keys: &[String]) -> Result<()> {
    let folders = folders().await?;

    for key in keys {
        match folders.mark_printed(key).await? {
            MoveOutcome::Moved { dest_key } => println!("{} -> {}", key, dest_key),
            MoveOutcome::SourceMissing => println!("{} no longer exists", key),
            MoveOutcome::AlreadyInPlace => {}
        }
    }
    Ok(())
}

pub async fn clear(folder: Folder) -> Result<()> {
    let count = folders().await?.clear(folder).await?;
    info!(%folder, count, "Folder cleared");
    println!("Deleted {} label(s) from {}", count, folder.prefix());
    Ok(())
}

pub async fn select(folder: Folder, order_ids: &str) -> Result<()> {
    let objects = folders()
        .await?
        .select_by_order_ids(folder, order_ids)
        .await?;

    if objects.is_empty() {
        println!("No matching labels in {}", folder.prefix());
    } else {
        print_objects(&objects);
    }
    Ok(())
}

fn print_objects(objects: &[StorageObject]) {
    for object in objects {
        let modified = object
            .last_modified
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "{:<48} {:>9.1} KB  {}",
            object.filename,
            object.size_bytes as f64 / 1024.0,
            modified
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::BatchSummary;
    use label_common::CommonError;

    #[tokio::test]
    async fn test_read_event_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, r#"{"Records":[]}"#).unwrap();

        assert_eq!(read_event(Some(&path)).await.unwrap(), r#"{"Records":[]}"#);
    }

    #[tokio::test]
    async fn test_read_event_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_event(Some(&dir.path().join("absent.json"))).await.unwrap_err();

        assert!(matches!(err, CommonError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn test_to_json_summary() {
        let summary = BatchSummary {
            batch_id: uuid::Uuid::new_v4(),
            matched: vec!["PO-1.pdf".to_string()],
            unmatched: Vec::new(),
            skipped: Vec::new(),
        };
        let rendered = to_json(&summary, false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["matched"], 1);
        assert_eq!(value["unmatched"], 0);
    }
}
