//! Error types for partline client operations.
//!
//! This module defines every error a producer or consumer can report. The
//! variants follow the ordered-delivery contract: routing and directory
//! problems are surfaced synchronously to the caller, transport failures are
//! wrapped with the partition they happened on, and outcomes that are neither
//! success nor failure get their own variant (`Indeterminate`).
//!
//! ## Error Handling Strategy
//!
//! - **Client errors**: `UnknownTopic`, `NoPartitionsAvailable`, `InvalidDelayLevel`,
//!   `InvalidFilter`, `ConfigError`
//! - **Send errors**: `SendFailed`, `SubmitFailed`, `Timeout`, `Indeterminate`
//! - **Consumption outcomes**: `Retry`, `Fatal`
//! - **Lifecycle**: `Closed`
//!
//! Only `Timeout` and `SendFailed` with an `Unavailable` cause are retryable,
//! and only non-ordered asynchronous sends ever retry them.
//!
//! ## Examples
//!
//! ```ignore
//! use partline_client::{ClientError, Producer};
//!
//! match producer.send(msg).await {
//!     Ok(result) => println!("stored at {}", result.partition),
//!     Err(ClientError::Timeout(after)) => eprintln!("no ack within {:?}", after),
//!     Err(ClientError::UnknownTopic(topic)) => eprintln!("no such topic '{}'", topic),
//!     Err(e) => eprintln!("send failed: {}", e),
//! }
//! ```

use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error type for partline client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport knows no partitions for the topic.
    ///
    /// ## Resolution
    /// - Create the topic on the broker
    /// - Check the topic name for typos
    #[error("Topic '{0}' does not exist")]
    UnknownTopic(String),

    /// Routing was attempted over an empty partition list.
    ///
    /// The router never falls back to a default partition; an empty list is
    /// always an error.
    #[error("No partitions available for topic '{0}'")]
    NoPartitionsAvailable(String),

    /// Delay levels start at 1. Raised before any transport call.
    #[error("Invalid delay level {0}: levels start at 1")]
    InvalidDelayLevel(i32),

    /// The transport rejected or failed a send after its own retry policy.
    ///
    /// The client adds no retry of its own for synchronous and ordered sends.
    #[error("Send to {partition} failed: {cause}")]
    SendFailed {
        partition: String,
        #[source]
        cause: TransportError,
    },

    /// A one-way send could not even be handed to the transport.
    #[error("Submit failed: {0}")]
    SubmitFailed(String),

    /// No answer within the caller's timeout. Distinct from `SendFailed`.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// An asynchronous send did not report back before the caller's deadline.
    ///
    /// The message may or may not have been stored.
    #[error("Send outcome unknown after {0:?}")]
    Indeterminate(Duration),

    /// A batch failed and will be redelivered from its first message.
    #[error("Batch at {partition} offset {offset} failed on attempt {attempt}, redelivering")]
    Retry {
        partition: String,
        offset: u64,
        attempt: u32,
    },

    /// A batch kept failing past the reconsume ceiling.
    #[error("Batch at {partition} offset {offset} failed {attempts} times, giving up")]
    Fatal {
        partition: String,
        offset: u64,
        attempts: u32,
    },

    /// A subscription expression could not be parsed.
    #[error("Invalid subscription expression '{0}'")]
    InvalidFilter(String),

    /// Invalid client configuration.
    ///
    /// ## Causes
    /// - Required builder fields missing (e.g. transport)
    /// - Invalid parameter values (e.g. zero worker lanes)
    /// - Unreadable or malformed TOML file
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Transport failure outside the send path (fetch, commit, resolve).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The producer or consumer has been shut down.
    #[error("Client is closed")]
    Closed,

    /// Internal error that shouldn't normally occur.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Timeout(_) => true,
            ClientError::SendFailed { cause, .. } => cause.is_retryable(),
            ClientError::Transport(cause) => cause.is_retryable(),
            _ => false,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::UnknownTopic(_) => "unknown_topic",
            ClientError::NoPartitionsAvailable(_) => "no_partitions",
            ClientError::InvalidDelayLevel(_) => "invalid_delay_level",
            ClientError::SendFailed { .. } => "send_failed",
            ClientError::SubmitFailed(_) => "submit_failed",
            ClientError::Timeout(_) => "timeout",
            ClientError::Indeterminate(_) => "indeterminate",
            ClientError::Retry { .. } => "retry",
            ClientError::Fatal { .. } => "fatal",
            ClientError::InvalidFilter(_) => "invalid_filter",
            ClientError::ConfigError(_) => "config",
            ClientError::Transport(_) => "transport",
            ClientError::Closed => "closed",
            ClientError::Internal(_) => "internal",
        }
    }
}

impl From<partline_core::Error> for ClientError {
    fn from(e: partline_core::Error) -> Self {
        match e {
            partline_core::Error::InvalidDelayLevel(level) => ClientError::InvalidDelayLevel(level),
            other => ClientError::Internal(other.to_string()),
        }
    }
}
