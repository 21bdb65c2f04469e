use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::Result;

/// A message as it travels through the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerMessage {
    /// Unique identifier for this delivery.
    pub id: Uuid,

    /// Destination topic.
    pub topic: String,

    /// Partition key. Messages sharing a key keep their relative order.
    pub key: String,

    /// Serialized JSON payload.
    pub payload: Vec<u8>,

    /// When the message was produced.
    pub timestamp: DateTime<Utc>,

    /// Partition assigned by the broker on publish.
    pub partition: Option<u32>,
}

impl BrokerMessage {
    /// Creates a message from an already serialized payload.
    pub fn new(topic: impl Into<String>, key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            key: key.into(),
            payload,
            timestamp: Utc::now(),
            partition: None,
        }
    }

    /// Creates a message by serializing `payload` as JSON.
    pub fn json<T: Serialize + ?Sized>(
        topic: impl Into<String>,
        key: impl Into<String>,
        payload: &T,
    ) -> Result<Self> {
        Ok(Self::new(topic, key, serde_json::to_vec(payload)?))
    }

    /// Decodes the payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Returns the payload as text, replacing invalid UTF-8.
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
