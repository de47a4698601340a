//! Topics and partitions.
//!
//! A topic is a named logical stream split into an ordered sequence of
//! partitions. The partition index is the unit of parallelism and the unit
//! within which send order is preserved.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One ordered sub-stream of a topic.
///
/// The index is stable for as long as the topic keeps its partition count.
/// The topic name is shared (`Arc<str>`) between all partitions of a topic,
/// so cloning a partition never copies the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition {
    topic: Arc<str>,
    index: u32,
}

impl Partition {
    pub fn new(topic: impl Into<Arc<str>>, index: u32) -> Self {
        Self {
            topic: topic.into(),
            index,
        }
    }

    /// Name of the topic this partition belongs to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Zero-based index within the topic.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.index)
    }
}

/// A named stream and its ordered partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    name: Arc<str>,
    partitions: Arc<[Partition]>,
}

impl Topic {
    /// Build a topic with `partition_count` partitions indexed `0..partition_count`.
    pub fn new(name: impl Into<Arc<str>>, partition_count: u32) -> Self {
        let name = name.into();
        let partitions = (0..partition_count)
            .map(|index| Partition {
                topic: Arc::clone(&name),
                index,
            })
            .collect();
        Self { name, partitions }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> &Arc<[Partition]> {
        &self.partitions
    }

    pub fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    pub fn partition(&self, index: u32) -> Option<&Partition> {
        self.partitions.get(index as usize)
    }
}
