//! Batch Decoder
//!
//! Flattens one delivery batch into label descriptors. Each queue entry body
//! is either a storage notification (`{"Records":[{"s3":...}]}`) or a pub/sub
//! relay wrapper whose `Message` (a string or an object) holds that
//! notification. Only keys under `incoming/` become descriptors. Anything
//! malformed is logged and skipped; decoding never fails the batch.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use label_common::Folder;

use crate::error::DecodeError;
use crate::storage::ObjectLocation;

/// One queue entry as delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message_id: Option<String>,
    pub body: String,
}

/// Queue batch handed to the pipeline by the delivery layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryBatch {
    pub entries: Vec<Envelope>,
}

#[derive(Deserialize)]
struct QueueEvent {
    #[serde(rename = "Records", default)]
    records: Vec<Value>,
}

impl DeliveryBatch {
    /// Parse a queue event (`{"Records":[{"messageId":..,"body":".."}]}`).
    ///
    /// Only the outer document must be valid JSON. Queue records without a
    /// string `body` are skipped.
    pub fn from_event_json(raw: &str) -> Result<Self, DecodeError> {
        let event: QueueEvent = serde_json::from_str(raw)?;

        let entries = event
            .records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| {
                let message_id = record
                    .get("messageId")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                match record.get("body").and_then(Value::as_str) {
                    Some(body) => Some(Envelope {
                        message_id,
                        body: body.to_string(),
                    }),
                    None => {
                        warn!(index, message_id = ?message_id, "Queue record has no body, skipping");
                        None
                    }
                }
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn from_bodies<I, S>(bodies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: bodies
                .into_iter()
                .map(|body| Envelope {
                    message_id: None,
                    body: body.into(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A label file waiting in `incoming/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDescriptor {
    pub source: ObjectLocation,
    pub filename: String,
    /// Filename stem, trimmed; the join key against the report
    pub order_reference: String,
}

impl LabelDescriptor {
    /// `None` for keys that do not name a label file waiting in `incoming/`
    pub fn from_location(source: ObjectLocation) -> Option<Self> {
        if Folder::of_key(&source.key) != Some(Folder::Incoming) {
            warn!(location = %source, "Ignoring notification outside incoming/");
            return None;
        }
        let filename = source.filename().to_string();
        if filename.trim().is_empty() || filename.starts_with('.') {
            return None;
        }
        let order_reference = order_reference(&filename)?;
        Some(Self {
            source,
            filename,
            order_reference,
        })
    }
}

/// Filename without its extension, trimmed. `None` when nothing is left.
pub fn order_reference(filename: &str) -> Option<String> {
    let stem = match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    };
    let stem = stem.trim();
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Decode every entry, in delivery order, dropping duplicates of the same object
pub fn decode(batch: &DeliveryBatch) -> Vec<LabelDescriptor> {
    let mut seen = HashSet::new();
    let mut descriptors = Vec::new();

    for envelope in &batch.entries {
        let locations = match decode_body(&envelope.body) {
            Ok(locations) => locations,
            Err(e) => {
                warn!(message_id = ?envelope.message_id, "Skipping malformed envelope: {}", e);
                continue;
            }
        };

        for location in locations {
            let Some(descriptor) = LabelDescriptor::from_location(location) else {
                continue;
            };
            if seen.insert(descriptor.source.clone()) {
                descriptors.push(descriptor);
            } else {
                debug!(location = %descriptor.source, "Duplicate notification in batch");
            }
        }
    }

    descriptors
}

/// Object locations named by one envelope body
fn decode_body(body: &str) -> Result<Vec<ObjectLocation>, DecodeError> {
    let document: Value = serde_json::from_str(body)?;

    let relayed: Option<Value> = match document.get("Message") {
        _ if document.get("Records").is_some() => None,
        Some(Value::String(message)) => {
            Some(serde_json::from_str(message).map_err(DecodeError::RelayJson)?)
        }
        Some(message @ Value::Object(_)) => Some(message.clone()),
        Some(_) => return Err(DecodeError::MissingField("Message")),
        None => None,
    };
    let document = relayed.unwrap_or(document);

    let records = match document.get("Records") {
        Some(Value::Array(records)) => records,
        Some(_) => return Err(DecodeError::MissingField("Records")),
        None => {
            debug!(event = ?document.get("Event"), "Notification carries no records");
            return Ok(Vec::new());
        }
    };

    let mut locations = Vec::with_capacity(records.len());
    for record in records {
        match decode_record(record) {
            Ok(location) => locations.push(location),
            Err(e) => warn!("Skipping notification record: {}", e),
        }
    }
    Ok(locations)
}

fn decode_record(record: &Value) -> Result<ObjectLocation, DecodeError> {
    let bucket = record
        .pointer("/s3/bucket/name")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("s3.bucket.name"))?;
    let raw_key = record
        .pointer("/s3/object/key")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("s3.object.key"))?;

    Ok(ObjectLocation::new(bucket, decode_key(raw_key)?))
}

/// Notification keys are form-encoded: `+` is a space
fn decode_key(raw: &str) -> Result<String, DecodeError> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|key| key.into_owned())
        .map_err(|_| DecodeError::KeyEncoding(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(keys: &[&str]) -> String {
        let records: Vec<Value> = keys
            .iter()
            .map(|key| json!({"s3": {"bucket": {"name": "vwslabels"}, "object": {"key": key}}}))
            .collect();
        json!({ "Records": records }).to_string()
    }

    fn keys(descriptors: &[LabelDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.source.key.as_str()).collect()
    }

    #[test]
    fn test_order_reference() {
        assert_eq!(order_reference("PO-1.pdf").as_deref(), Some("PO-1"));
        assert_eq!(order_reference(" PO-1 .pdf").as_deref(), Some("PO-1"));
        assert_eq!(order_reference("PO.1.pdf").as_deref(), Some("PO.1"));
        assert_eq!(order_reference("PO-1").as_deref(), Some("PO-1"));
        assert_eq!(order_reference("  .pdf"), None);
    }

    #[test]
    fn test_decode_skips_hidden_and_folder_keys() {
        let batch = DeliveryBatch::from_bodies([notification(&[
            "incoming/PO-1.pdf",
            "incoming/PO-2.pdf",
            "incoming/.hidden.pdf",
            "incoming/",
            "incoming/   ",
        ])]);

        let descriptors = decode(&batch);
        assert_eq!(keys(&descriptors), vec!["incoming/PO-1.pdf", "incoming/PO-2.pdf"]);
        assert_eq!(descriptors[0].filename, "PO-1.pdf");
        assert_eq!(descriptors[0].order_reference, "PO-1");
        assert_eq!(descriptors[0].source.bucket, "vwslabels");
    }

    #[test]
    fn test_decode_skips_malformed_envelopes() {
        let batch = DeliveryBatch::from_bodies([
            "not json".to_string(),
            json!({"Records": "nope"}).to_string(),
            notification(&["incoming/PO-7.pdf"]),
        ]);

        assert_eq!(keys(&decode(&batch)), vec!["incoming/PO-7.pdf"]);
    }

    #[test]
    fn test_decode_skips_incomplete_records_only() {
        let body = json!({"Records": [
            {"s3": {"bucket": {"name": "vwslabels"}}},
            {"s3": {"bucket": {"name": "vwslabels"}, "object": {"key": "incoming/PO-8.pdf"}}}
        ]})
        .to_string();

        assert_eq!(keys(&decode(&DeliveryBatch::from_bodies([body]))), vec!["incoming/PO-8.pdf"]);
    }

    #[test]
    fn test_decode_relay_wrapper() {
        let body = json!({
            "Type": "Notification",
            "Message": notification(&["incoming/PO-3.pdf"])
        })
        .to_string();

        assert_eq!(keys(&decode(&DeliveryBatch::from_bodies([body]))), vec!["incoming/PO-3.pdf"]);
    }

    #[test]
    fn test_decode_relay_with_object_message() {
        let message: Value = serde_json::from_str(&notification(&["incoming/PO-4.pdf"])).unwrap();
        let body = json!({"Type": "Notification", "Message": message}).to_string();

        assert_eq!(keys(&decode(&DeliveryBatch::from_bodies([body]))), vec!["incoming/PO-4.pdf"]);
    }

    #[test]
    fn test_decode_relay_with_scalar_message() {
        let body = json!({"Type": "Notification", "Message": 17}).to_string();
        assert!(matches!(decode_body(&body), Err(DecodeError::MissingField("Message"))));
    }

    #[test]
    fn test_decode_ignores_keys_outside_incoming() {
        let batch = DeliveryBatch::from_bodies([notification(&[
            "processed/PO-9.pdf",
            "printed/20240101_000000_PO-1.pdf",
            "errors/PO-2.pdf",
            "PO-5.pdf",
            "incoming/PO-1.pdf",
        ])]);

        assert_eq!(keys(&decode(&batch)), vec!["incoming/PO-1.pdf"]);
    }

    #[test]
    fn test_decode_relay_with_bad_message() {
        let body = json!({"Type": "Notification", "Message": "{oops"}).to_string();
        assert!(matches!(decode_body(&body), Err(DecodeError::RelayJson(_))));
    }

    #[test]
    fn test_decode_test_event_is_empty() {
        let body = json!({"Service": "Amazon S3", "Event": "s3:TestEvent"}).to_string();
        assert!(decode(&DeliveryBatch::from_bodies([body])).is_empty());
    }

    #[test]
    fn test_decode_url_encoded_keys() {
        let batch = DeliveryBatch::from_bodies([notification(&["incoming/PO+100%2BA.pdf"])]);
        let descriptors = decode(&batch);
        assert_eq!(keys(&descriptors), vec!["incoming/PO 100+A.pdf"]);
        assert_eq!(descriptors[0].order_reference, "PO 100+A");
    }

    #[test]
    fn test_decode_deduplicates_within_batch() {
        let batch = DeliveryBatch::from_bodies([
            notification(&["incoming/PO-1.pdf"]),
            notification(&["incoming/PO-1.pdf", "incoming/PO-2.pdf"]),
        ]);
        assert_eq!(keys(&decode(&batch)), vec!["incoming/PO-1.pdf", "incoming/PO-2.pdf"]);
    }

    #[test]
    fn test_from_event_json() {
        let event = json!({"Records": [
            {"messageId": "m-1", "body": notification(&["incoming/PO-1.pdf"])},
            {"messageId": "m-2"}
        ]})
        .to_string();

        let batch = DeliveryBatch::from_event_json(&event).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.entries[0].message_id.as_deref(), Some("m-1"));
        assert_eq!(keys(&decode(&batch)), vec!["incoming/PO-1.pdf"]);
    }

    #[test]
    fn test_from_event_json_rejects_non_json() {
        assert!(DeliveryBatch::from_event_json("[[").is_err());
    }
}
