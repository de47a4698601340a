//! Message Data Structures
//!
//! This module defines the `Message` type, the unit of data handed to the
//! producer, and the types that describe what happened to it afterwards.
//!
//! ## Structure
//! A message carries:
//! - **topic**: destination stream
//! - **tag**: optional filter label, matched by consumer subscriptions
//! - **keys**: optional business/dedup key (not used for routing)
//! - **body**: opaque payload
//! - **delay_level**: optional hint for deferred delivery; the broker maps
//!   the level to a duration
//! - **ordering_key**: optional key routing correlated messages to a single
//!   partition
//!
//! ## Design Decisions
//! - Uses `bytes::Bytes` for bodies so that fan-out to retries and handlers
//!   never copies the payload
//! - The delay level is stored exactly as given; `validate()` rejects
//!   non-positive levels but never rewrites them
//!
//! ## Example
//! ```
//! use partline_core::Message;
//!
//! let msg = Message::new("orders", "order created")
//!     .with_tag("TagA")
//!     .with_keys("KEY1")
//!     .with_ordering_key(15103111039_i64);
//! assert_eq!(msg.tag(), Some("TagA"));
//! ```

use crate::error::{Error, Result};
use crate::topic::Partition;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Key used to pin correlated messages to one partition.
///
/// Numeric keys (order ids, account ids) are used directly as the routing
/// value; byte keys are hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderingKey {
    Numeric(i64),
    Bytes(Bytes),
}

impl From<i64> for OrderingKey {
    fn from(v: i64) -> Self {
        OrderingKey::Numeric(v)
    }
}

impl From<u32> for OrderingKey {
    fn from(v: u32) -> Self {
        OrderingKey::Numeric(i64::from(v))
    }
}

impl From<&str> for OrderingKey {
    fn from(v: &str) -> Self {
        OrderingKey::Bytes(Bytes::copy_from_slice(v.as_bytes()))
    }
}

impl From<String> for OrderingKey {
    fn from(v: String) -> Self {
        OrderingKey::Bytes(Bytes::from(v))
    }
}

impl From<Vec<u8>> for OrderingKey {
    fn from(v: Vec<u8>) -> Self {
        OrderingKey::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for OrderingKey {
    fn from(v: Bytes) -> Self {
        OrderingKey::Bytes(v)
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingKey::Numeric(v) => write!(f, "{}", v),
            OrderingKey::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

/// A message to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    topic: String,
    tag: Option<String>,
    keys: Option<String>,
    body: Bytes,
    delay_level: Option<i32>,
    ordering_key: Option<OrderingKey>,
    properties: HashMap<String, String>,
}

impl Message {
    pub fn new(topic: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            tag: None,
            keys: None,
            body: body.into(),
            delay_level: None,
            ordering_key: None,
            properties: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Business key, e.g. an idempotency token. Never used for routing.
    pub fn with_keys(mut self, keys: impl Into<String>) -> Self {
        self.keys = Some(keys.into());
        self
    }

    pub fn with_delay_level(mut self, level: i32) -> Self {
        self.delay_level = Some(level);
        self
    }

    pub fn with_ordering_key(mut self, key: impl Into<OrderingKey>) -> Self {
        self.ordering_key = Some(key.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn keys(&self) -> Option<&str> {
        self.keys.as_deref()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn delay_level(&self) -> Option<i32> {
        self.delay_level
    }

    pub fn ordering_key(&self) -> Option<&OrderingKey> {
        self.ordering_key.as_ref()
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Check the fields a transport must never see in an invalid state.
    pub fn validate(&self) -> Result<()> {
        match self.delay_level {
            Some(level) if level <= 0 => Err(Error::InvalidDelayLevel(level)),
            _ => Ok(()),
        }
    }
}

/// Broker verdict carried by a successful send.
///
/// The taxonomy is broker policy; `Partial` and `BrokerBusy` still mean the
/// message was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendStatus {
    Ok,
    /// Stored on the primary but not yet on every replica.
    Partial,
    /// Accepted while the broker reported back-pressure.
    BrokerBusy,
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendStatus::Ok => write!(f, "SEND_OK"),
            SendStatus::Partial => write!(f, "PARTIAL"),
            SendStatus::BrokerBusy => write!(f, "BROKER_BUSY"),
        }
    }
}

/// Outcome of an acknowledged send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub status: SendStatus,
    pub msg_id: String,
    pub partition: Partition,
    /// Broker-assigned position, when the broker reports one.
    pub offset: Option<u64>,
}

/// A message as delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedMessage {
    pub message: Message,
    pub msg_id: String,
    pub partition: Partition,
    pub offset: u64,
    /// Milliseconds since epoch when the producer handed the message over.
    pub born_timestamp: i64,
    /// Milliseconds since epoch when the broker stored the message.
    pub store_timestamp: i64,
    /// How many times this message was redelivered after a failed attempt.
    pub reconsume_times: u32,
}

impl ConsumedMessage {
    pub fn body(&self) -> &Bytes {
        self.message.body()
    }

    pub fn tag(&self) -> Option<&str> {
        self.message.tag()
    }
}
