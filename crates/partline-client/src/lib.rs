//! Partline Client - ordered producer and push consumer APIs
//!
//! This crate implements the client side of partition-ordered messaging:
//!
//! - a [`Producer`] that routes messages sharing an ordering key to one
//!   partition, with synchronous, asynchronous, one-way and ordered sends
//! - a push consumer ([`PushConsumer`]) that runs one lane per partition,
//!   delivers each partition strictly in order with at most one batch in
//!   flight, and runs different partitions in parallel
//!
//! The broker is reached through the [`Transport`] trait. [`MemoryTransport`]
//! is an in-process implementation for tests and demos.
//!
//! # Examples
//!
//! ## Producer
//!
//! ```ignore
//! use partline_client::Producer;
//! use partline_core::Message;
//!
//! let producer = Producer::builder()
//!     .transport(transport.clone())
//!     .group("order-producer")
//!     .start()
//!     .await?;
//!
//! // Every step of order 15103111039 lands on the same partition.
//! producer
//!     .send_ordered(Message::new("orders", "paid").with_tag("TagA"), 15103111039_i64)
//!     .await?;
//! ```
//!
//! ## Consumer
//!
//! ```ignore
//! use partline_client::{ConsumeMode, HandlerError, PushConsumer, StartPosition};
//! use partline_core::ConsumedMessage;
//!
//! let consumer = PushConsumer::builder()
//!     .transport(transport)
//!     .group("order-consumer")
//!     .start_position(StartPosition::Earliest)
//!     .subscribe("orders", "*", ConsumeMode::Orderly, |msgs: Vec<ConsumedMessage>| async move {
//!         println!("{:?}", msgs);
//!         Ok::<(), HandlerError>(())
//!     })
//!     .start()
//!     .await?;
//!
//! consumer.stop().await?;
//! ```

pub mod config;
pub mod consumer;
pub mod directory;
pub mod error;
pub mod filter;
pub mod latch;
pub mod memory;
pub mod processor;
pub mod producer;
pub mod retry;
pub mod router;
pub mod scheduler;
pub mod transport;

pub use config::{ClientConfig, ConsumerConfig, ProducerConfig};
pub use consumer::{ConsumerHandle, PushConsumer, PushConsumerBuilder, SubscriptionInfo};
pub use directory::PartitionDirectory;
pub use error::{ClientError, Result};
pub use filter::TagFilter;
pub use latch::{CompletionLatch, LatchOutcome, PendingSend, SendOutcome, SendTracker};
pub use memory::{DelayLevels, MemoryTransport, DEFAULT_DELAY_LEVELS};
pub use processor::{
    BatchProcessor, ConsumeMode, HandlerError, HandlerResult, MessageHandler, Outcome,
};
pub use producer::{Producer, ProducerBuilder, Published};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use router::{AffinityRouter, SignNormalization};
pub use scheduler::{
    LaneConfig, LaneState, LaneStatsSnapshot, PartitionScheduler, ShutdownPolicy, StartPosition,
};
pub use transport::{PositionBounds, SendMode, Transport, TransportError};
