//! Inbound message envelope.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::Topic;
use crate::error::HandlerError;

/// One inbound stream message: `{type, data?, message?, timestamp?}`.
///
/// `type` selects the routing target. The payload shape is topic-specific
/// and opaque to the router; handlers decode it with [`MessageEnvelope::decode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl MessageEnvelope {
    /// Build an envelope for `topic` carrying `data`.
    pub fn new(topic: &Topic, data: serde_json::Value) -> Self {
        Self {
            kind: topic.to_string(),
            data: Some(data),
            message: None,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp_ms: f64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    /// The routing topic, if `type` names one.
    #[must_use]
    pub fn topic(&self) -> Option<Topic> {
        self.kind.parse().ok()
    }

    /// Exchange timestamp as a UTC datetime.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .filter(|ts| ts.is_finite())
            .and_then(|ts| DateTime::from_timestamp_millis(ts as i64))
    }

    /// Decode the payload into a topic-specific type.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::MissingData`] when the envelope has no payload
    /// and [`HandlerError::Payload`] when it does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        let data = self.data.as_ref().ok_or_else(|| HandlerError::MissingData {
            topic: self.kind.clone(),
        })?;
        Ok(T::deserialize(data)?)
    }
}
