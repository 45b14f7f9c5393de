use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{BusError, Result};

/// Unique identifier for a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a message inside one partition of a topic.
///
/// Offsets start at 0 for the first message of each partition and increase
/// by one per message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(u64);

impl Offset {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A domain event that knows where it travels on the bus.
pub trait BusEvent: Serialize {
    /// Topic the event is published to.
    fn topic(&self) -> &'static str;

    /// Partition key; all events sharing a key are delivered in publish order.
    fn key(&self) -> String;

    /// Discriminator written into the message so consumers can route it.
    fn event_type(&self) -> &'static str;
}

/// A message as stored in a topic partition and handed to consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub topic: String,
    pub key: String,
    pub partition: u32,
    pub offset: Offset,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub headers: HashMap<String, String>,
    pub published_at: DateTime<Utc>,
}

impl Message {
    /// Decodes the payload into a typed event.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// A message on its way into the bus, before a partition and offset are assigned.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub id: MessageId,
    pub topic: String,
    pub key: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub headers: HashMap<String, String>,
}

impl OutboundMessage {
    pub fn builder() -> OutboundMessageBuilder {
        OutboundMessageBuilder::default()
    }

    /// Builds a message from a typed event, using the event's own routing.
    pub fn from_event<E: BusEvent>(event: &E) -> Result<Self> {
        Self::builder()
            .topic(event.topic())
            .key(event.key())
            .event_type(event.event_type())
            .payload(event)?
            .build()
    }

    /// The message as a consumer would receive it from `partition` at
    /// `offset`. Lets handlers be driven without a bus.
    pub fn into_delivered(self, partition: u32, offset: Offset) -> Message {
        self.into_message(partition, offset, Utc::now())
    }

    pub(crate) fn into_message(
        self,
        partition: u32,
        offset: Offset,
        published_at: DateTime<Utc>,
    ) -> Message {
        Message {
            id: self.id,
            topic: self.topic,
            key: self.key,
            partition,
            offset,
            event_type: self.event_type,
            payload: self.payload,
            headers: self.headers,
            published_at,
        }
    }
}

/// Builder for [`OutboundMessage`].
#[derive(Debug, Default)]
pub struct OutboundMessageBuilder {
    id: Option<MessageId>,
    topic: Option<String>,
    key: Option<String>,
    event_type: Option<String>,
    payload: Option<serde_json::Value>,
    headers: HashMap<String, String>,
}

impl OutboundMessageBuilder {
    /// Sets the message id. A fresh id is generated when unset.
    pub fn id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_json(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Result<OutboundMessage> {
        Ok(OutboundMessage {
            id: self.id.unwrap_or_default(),
            topic: self.topic.ok_or(BusError::MissingField("topic"))?,
            key: self.key.ok_or(BusError::MissingField("key"))?,
            event_type: self.event_type.ok_or(BusError::MissingField("event_type"))?,
            payload: self.payload.ok_or(BusError::MissingField("payload"))?,
            headers: self.headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Ping {
        order_number: String,
    }

    impl BusEvent for Ping {
        fn topic(&self) -> &'static str {
            "pings"
        }

        fn key(&self) -> String {
            self.order_number.clone()
        }

        fn event_type(&self) -> &'static str {
            "Ping"
        }
    }

    #[test]
    fn builder_requires_routing_fields() {
        let err = OutboundMessage::builder()
            .event_type("Ping")
            .payload_json(serde_json::json!({}))
            .build()
            .unwrap_err();
        assert!(matches!(err, BusError::MissingField("topic")));
    }

    #[test]
    fn from_event_uses_event_routing() {
        let ping = Ping {
            order_number: "ORD-1".to_string(),
        };
        let msg = OutboundMessage::from_event(&ping).unwrap();
        assert_eq!(msg.topic, "pings");
        assert_eq!(msg.key, "ORD-1");
        assert_eq!(msg.event_type, "Ping");

        let stored = msg.into_message(2, Offset::new(7), Utc::now());
        assert_eq!(stored.partition, 2);
        assert_eq!(stored.offset.next(), Offset::new(8));
        assert_eq!(stored.decode::<Ping>().unwrap(), ping);
    }
}
