//! Data model shared by partline producers, consumers and transports.
//!
//! Nothing in this crate performs I/O. It defines what a topic, a partition
//! and a message are, and the invariants that the client relies on to keep
//! ordered delivery intact.

pub mod batch;
pub mod error;
pub mod message;
pub mod order;
pub mod topic;

pub use batch::ConsumptionBatch;
pub use error::{Error, Result};
pub use message::{ConsumedMessage, Message, OrderingKey, SendResult, SendStatus};
pub use order::OrderStep;
pub use topic::{Partition, Topic};
