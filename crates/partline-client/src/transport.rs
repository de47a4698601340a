//! Transport trait - the seam between the client and a broker.
//!
//! Everything the client needs from a broker goes through this trait:
//! partition discovery, message submission, fetching and position commits.
//! Storage, replication, delayed-message scheduling and network retry live
//! behind it and are not the client's concern.
//!
//! ## Implementations
//!
//! - **MemoryTransport**: in-process broker used by tests and the demo CLI
//!
//! ## Thread Safety
//!
//! Implementations must be `Send + Sync`; the client shares one instance
//! across every producer task and consumer lane via `Arc<dyn Transport>`.
//!
//! ## Ordering
//!
//! The client relies on one guarantee from implementations: messages sent to
//! the same partition are stored, and later fetched, in submission order.

use async_trait::async_trait;
use partline_core::{ConsumedMessage, Message, Partition, SendResult};
use std::fmt;
use thiserror::Error;

/// Errors reported by a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),

    /// Transient: broker down, restarting or overloaded.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// Permanent: the broker refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("transport closed")]
    Closed,
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Unavailable(_))
    }
}

/// How the producer wants a send acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendMode {
    /// Caller waits for the broker acknowledgment.
    Sync,
    /// Acknowledgment is delivered on another task.
    Async,
    /// No acknowledgment is solicited.
    OneWay,
}

impl SendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendMode::Sync => "sync",
            SendMode::Async => "async",
            SendMode::OneWay => "oneway",
        }
    }
}

impl fmt::Display for SendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetchable range of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionBounds {
    /// Offset of the oldest retained message.
    pub earliest: u64,
    /// Offset the next stored message will get.
    pub latest: u64,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Ordered partitions of `topic`. An empty list means the topic has none.
    async fn resolve_partitions(&self, topic: &str) -> Result<Vec<Partition>, TransportError>;

    /// Store `message` on `partition`.
    ///
    /// For `SendMode::OneWay` the returned result is informational only; the
    /// producer discards it.
    async fn send(
        &self,
        message: &Message,
        partition: &Partition,
        mode: SendMode,
    ) -> Result<SendResult, TransportError>;

    /// Up to `max_messages` visible messages starting at `from`, in offset
    /// order. An empty vector means nothing is available yet.
    async fn fetch(
        &self,
        partition: &Partition,
        from: u64,
        max_messages: usize,
    ) -> Result<Vec<ConsumedMessage>, TransportError>;

    /// Durably record that `group` will resume `partition` at `position`.
    async fn commit(
        &self,
        group: &str,
        partition: &Partition,
        position: u64,
    ) -> Result<(), TransportError>;

    /// Last position committed by `group`, if any.
    async fn committed_position(
        &self,
        group: &str,
        partition: &Partition,
    ) -> Result<Option<u64>, TransportError>;

    async fn bounds(&self, partition: &Partition) -> Result<PositionBounds, TransportError>;

    /// Liveness check run when a client starts.
    async fn health_check(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(TransportError::Unavailable("x".into()).is_retryable());
        assert!(!TransportError::Rejected("x".into()).is_retryable());
        assert!(!TransportError::UnknownTopic("x".into()).is_retryable());
        assert!(!TransportError::Closed.is_retryable());
    }

    #[test]
    fn test_send_mode_labels() {
        assert_eq!(SendMode::Sync.to_string(), "sync");
        assert_eq!(SendMode::Async.as_str(), "async");
        assert_eq!(SendMode::OneWay.as_str(), "oneway");
    }
}
