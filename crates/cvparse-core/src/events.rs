//! Ingress: queue batches of object-created notifications.
//!
//! A batch is a list of queue messages; each message body is an object
//! storage notification carrying bucket and key of the uploaded document.
//!
//! ```json
//! {"Records": [{"messageId": "...", "body": "{\"Records\":[{\"s3\":{...}}]}"}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::storage::SourceLocation;

const TEST_EVENT: &str = "s3:TestEvent";

/// A batch of queue messages delivered in one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueMessage>,
}

impl QueueBatch {
    pub fn from_json(json: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One queue message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub body: String,
}

impl QueueMessage {
    /// Document locations carried by this message.
    ///
    /// Test notifications (sent when a bucket notification is configured)
    /// carry no documents and yield an empty list.
    pub fn locations(&self) -> Result<Vec<SourceLocation>, EventError> {
        let notification: StorageNotification = serde_json::from_str(&self.body)?;
        if notification.records.is_empty() {
            if notification.event.as_deref() == Some(TEST_EVENT) {
                tracing::debug!(message_id = ?self.message_id, "Ignoring test notification");
                return Ok(Vec::new());
            }
            return Err(EventError::MissingField("Records"));
        }

        notification
            .records
            .into_iter()
            .map(|record| {
                let entity = record.s3.ok_or(EventError::MissingField("s3"))?;
                Ok(SourceLocation::new(entity.bucket.name, entity.object.key))
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct StorageNotification {
    #[serde(rename = "Records", default)]
    records: Vec<NotificationRecord>,
    #[serde(rename = "Event", default)]
    event: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotificationRecord {
    #[serde(default)]
    s3: Option<S3Entity>,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: String,
}

/// Build a notification body for one object. Used by tests and the worker's
/// plain `bucket/key` input form.
pub fn notification_body(location: &SourceLocation) -> String {
    serde_json::json!({
        "Records": [{
            "eventSource": "aws:s3",
            "eventName": "ObjectCreated:Put",
            "s3": {
                "bucket": {"name": location.bucket},
                "object": {"key": location.key}
            }
        }]
    })
    .to_string()
}
