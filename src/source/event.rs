//! Trigger event model.
//!
//! The collector is triggered by a queue delivery whose messages wrap storage
//! notifications. A message body arrives either already structured or as a
//! JSON string; [`NotificationWrapper::decode_body`] turns both shapes into
//! one [`NotificationBody`] before anything else looks at it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::prelude::*;
use tracing::warn;

use crate::error::{
    BodyParseSnafu, EventError, EventParseSnafu, MissingBodySnafu, MissingBucketSnafu,
    MissingKeySnafu,
};
use crate::source::key;

/// The document a collector invocation receives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationWrapper>,
}

/// One queue message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationWrapper {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// A decoded storage notification.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NotificationBody {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,

    /// Set on service test messages, which carry no records.
    #[serde(rename = "Event", default)]
    pub event: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NotificationRecord {
    #[serde(default)]
    pub s3: Option<S3Entity>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct S3Entity {
    #[serde(default)]
    pub bucket: Option<BucketEntity>,
    #[serde(default)]
    pub object: Option<ObjectEntity>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BucketEntity {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ObjectEntity {
    #[serde(default)]
    pub key: Option<String>,
}

/// An actionable notification: one object to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectNotification {
    pub bucket: String,
    /// The literal object key.
    pub key: String,
}

impl NotificationWrapper {
    /// Normalize the body: parse it if it is a string, use it as-is otherwise.
    pub fn decode_body(&self, index: usize) -> Result<NotificationBody, EventError> {
        let body = self.body.as_ref().context(MissingBodySnafu { index })?;

        match body {
            Value::String(text) => serde_json::from_str(text).context(BodyParseSnafu { index }),
            Value::Null => MissingBodySnafu { index }.fail(),
            other => NotificationBody::deserialize(other).context(BodyParseSnafu { index }),
        }
    }
}

impl NotificationBody {
    /// Extract the first record as an object notification.
    ///
    /// Returns `Ok(None)` when the body has no records at all. A record that
    /// exists but lacks a bucket name or key is an error.
    pub fn first_object(&self, index: usize) -> Result<Option<ObjectNotification>, EventError> {
        let Some(record) = self.records.first() else {
            return Ok(None);
        };
        let s3 = record.s3.as_ref();

        let bucket = s3
            .and_then(|s3| s3.bucket.as_ref())
            .and_then(|bucket| bucket.name.as_deref())
            .filter(|name| !name.is_empty())
            .context(MissingBucketSnafu { index })?;

        let raw_key = s3
            .and_then(|s3| s3.object.as_ref())
            .and_then(|object| object.key.as_deref())
            .filter(|key| !key.is_empty())
            .context(MissingKeySnafu { index, bucket })?;

        Ok(Some(ObjectNotification {
            bucket: bucket.to_string(),
            key: key::decode(raw_key),
        }))
    }
}

impl TriggerEvent {
    /// Parse a trigger event from JSON text.
    pub fn from_json(text: &str) -> Result<Self, EventError> {
        serde_json::from_str(text).context(EventParseSnafu)
    }

    /// Decode every wrapper into the objects to fetch, in event order.
    ///
    /// Any malformed notification fails the whole event before anything is
    /// fetched. Bodies without records (service test messages) are skipped.
    pub fn notifications(&self) -> Result<Vec<ObjectNotification>, EventError> {
        let mut notifications = Vec::with_capacity(self.records.len());

        for (index, wrapper) in self.records.iter().enumerate() {
            let body = wrapper.decode_body(index)?;
            match body.first_object(index)? {
                Some(notification) => notifications.push(notification),
                None => warn!(
                    index,
                    event = body.event.as_deref().unwrap_or("unknown"),
                    "Notification has no records, skipping"
                ),
            }
        }

        Ok(notifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn s3_body(bucket: &str, key: &str) -> Value {
        json!({
            "Records": [{
                "eventName": "ObjectCreated:Put",
                "s3": {"bucket": {"name": bucket}, "object": {"key": key, "size": 1024}}
            }]
        })
    }

    #[test]
    fn test_inline_and_string_bodies_decode_the_same() {
        let inline = NotificationWrapper {
            body: Some(s3_body("logs", "error/postgresql.log.gz")),
        };
        let encoded = NotificationWrapper {
            body: Some(Value::String(
                s3_body("logs", "error/postgresql.log.gz").to_string(),
            )),
        };

        assert_eq!(
            inline.decode_body(0).unwrap(),
            encoded.decode_body(0).unwrap()
        );
    }

    #[test]
    fn test_notifications_decode_keys_in_order() {
        let event: TriggerEvent = serde_json::from_value(json!({
            "Records": [
                {"body": s3_body("logs", "a/first+file.gz")},
                {"body": s3_body("logs", "a/second%3A1.gz").to_string()},
            ]
        }))
        .unwrap();

        let notifications = event.notifications().unwrap();
        assert_eq!(
            notifications,
            vec![
                ObjectNotification {
                    bucket: "logs".to_string(),
                    key: "a/first file.gz".to_string(),
                },
                ObjectNotification {
                    bucket: "logs".to_string(),
                    key: "a/second:1.gz".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_missing_bucket_is_an_error() {
        let event: TriggerEvent = serde_json::from_value(json!({
            "Records": [
                {"body": s3_body("logs", "ok.gz")},
                {"body": {"Records": [{"s3": {"object": {"key": "k.gz"}}}]}},
            ]
        }))
        .unwrap();

        let err = event.notifications().unwrap_err();
        assert!(matches!(err, EventError::MissingBucket { index: 1 }));
    }

    #[test]
    fn test_empty_key_is_an_error() {
        let event: TriggerEvent = serde_json::from_value(json!({
            "Records": [{"body": s3_body("logs", "")}]
        }))
        .unwrap();

        let err = event.notifications().unwrap_err();
        assert!(matches!(err, EventError::MissingKey { index: 0, .. }));
    }

    #[test]
    fn test_body_without_records_is_skipped() {
        let test_event = json!({
            "Service": "Amazon S3",
            "Event": "s3:TestEvent",
            "Bucket": "logs"
        });
        let event: TriggerEvent = serde_json::from_value(json!({
            "Records": [
                {"body": test_event.to_string()},
                {"body": s3_body("logs", "real.gz")},
            ]
        }))
        .unwrap();

        let notifications = event.notifications().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].key, "real.gz");
    }

    #[test]
    fn test_missing_and_unparseable_bodies() {
        let event: TriggerEvent = serde_json::from_value(json!({"Records": [{}]})).unwrap();
        assert!(matches!(
            event.notifications().unwrap_err(),
            EventError::MissingBody { index: 0 }
        ));

        let event: TriggerEvent =
            serde_json::from_value(json!({"Records": [{"body": "{not json"}]})).unwrap();
        assert!(matches!(
            event.notifications().unwrap_err(),
            EventError::BodyParse { index: 0, .. }
        ));
    }

    #[test]
    fn test_event_without_records_yields_nothing() {
        let event = TriggerEvent::from_json("{}").unwrap();
        assert!(event.notifications().unwrap().is_empty());
    }
}
