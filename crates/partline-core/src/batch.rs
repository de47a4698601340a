//! Consumption batches.
//!
//! A batch is what a consumer lane hands to the delivery processor in one go:
//! a non-empty run of messages from exactly one partition, in partition order.
//! Both properties are checked on construction so the processor never has to.

use crate::error::{Error, Result};
use crate::message::ConsumedMessage;
use crate::topic::Partition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionBatch {
    partition: Partition,
    messages: Vec<ConsumedMessage>,
}

impl ConsumptionBatch {
    /// Wrap fetched messages.
    ///
    /// # Errors
    ///
    /// - `EmptyBatch` when `messages` is empty
    /// - `MixedPartitions` when two messages come from different partitions
    pub fn new(messages: Vec<ConsumedMessage>) -> Result<Self> {
        let first = messages.first().ok_or(Error::EmptyBatch)?;
        let partition = first.partition.clone();

        if let Some(other) = messages.iter().find(|m| m.partition != partition) {
            return Err(Error::MixedPartitions {
                first: partition.to_string(),
                other: other.partition.to_string(),
            });
        }

        Ok(Self {
            partition,
            messages,
        })
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn messages(&self) -> &[ConsumedMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn first_offset(&self) -> u64 {
        self.messages[0].offset
    }

    pub fn last_offset(&self) -> u64 {
        self.messages[self.messages.len() - 1].offset
    }

    /// Position to resume from once this batch has been consumed.
    pub fn next_offset(&self) -> u64 {
        self.last_offset() + 1
    }

    /// Mark every message as redelivered `times` times.
    pub fn set_reconsume_times(&mut self, times: u32) {
        for msg in &mut self.messages {
            msg.reconsume_times = times;
        }
    }
}
