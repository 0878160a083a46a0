//! Queue messages and the events built from them.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CycleError;

/// A raw record waiting on the shared queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Identifier assigned when the message was created.
    pub id: Uuid,
    /// Named fields; one of them carries the payload.
    pub fields: Map<String, Value>,
    /// When the message was created by its producer.
    pub enqueued_at: DateTime<Utc>,
}

impl QueueMessage {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            fields,
            enqueued_at: Utc::now(),
        }
    }

    /// Message with a single field `key` set to `value`.
    pub fn with_payload(key: &str, value: impl Into<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert(key.to_string(), value.into());
        Self::new(fields)
    }
}

/// The dispatchable form of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    body: Bytes,
}

impl Event {
    pub fn with_body(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// Build an event from the `payload_key` field of `msg`.
    ///
    /// Strings become their UTF-8 bytes, other values their JSON text.
    /// A missing or `null` payload is a [`CycleError::Transform`].
    pub fn from_message(msg: &QueueMessage, payload_key: &str) -> Result<Self, CycleError> {
        let body = match msg.fields.get(payload_key) {
            Some(Value::String(s)) => Bytes::from(s.clone()),
            Some(Value::Null) | None => {
                return Err(CycleError::Transform {
                    message_id: msg.id.to_string(),
                    reason: format!("missing field '{payload_key}'"),
                })
            }
            Some(other) => Bytes::from(other.to_string()),
        };
        Ok(Self { body })
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}
