//! In-process transport.
//!
//! `MemoryTransport` keeps partition logs in memory and behaves like a small
//! single-node broker: it assigns offsets in submission order, honours delay
//! levels through a configurable level table, tracks committed positions per
//! consumer group, and can be told to misbehave so failure paths can be
//! exercised.
//!
//! Delayed messages are parked in a schedule queue and appended to their
//! partition log once due, receiving their offset at that point. A delayed
//! message therefore never blocks the messages sent after it.
//!
//! ## Examples
//!
//! ```ignore
//! use partline_client::MemoryTransport;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(MemoryTransport::new());
//! transport.create_topic("orders", 4).await?;
//! ```

use crate::error::{ClientError, Result};
use crate::transport::{PositionBounds, SendMode, Transport, TransportError};
use async_trait::async_trait;
use partline_core::{ConsumedMessage, Message, Partition, SendResult, SendStatus, Topic};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default level table, level 1 first.
pub const DEFAULT_DELAY_LEVELS: &str = "1s 5s 10s 30s 1m 2m 3m 4m 5m 6m 7m 8m 9m 10m 20m 30m 1h 2h";

/// Mapping from delay level to delay duration.
///
/// Level `n` uses the `n`-th entry (1-based). Levels above the table use the
/// last entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayLevels {
    levels: Vec<Duration>,
}

impl DelayLevels {
    /// Parse a space separated list such as `"1s 5s 1m 2h"`.
    ///
    /// Units: `ms`, `s`, `m`, `h`, `d`.
    pub fn parse(table: &str) -> Result<Self> {
        let levels = table
            .split_whitespace()
            .map(parse_duration)
            .collect::<Result<Vec<_>>>()?;

        if levels.is_empty() {
            return Err(ClientError::ConfigError(
                "delay level table must not be empty".to_string(),
            ));
        }

        Ok(Self { levels })
    }

    pub fn duration_for(&self, level: i32) -> Duration {
        if level <= 0 {
            return Duration::ZERO;
        }
        let idx = (level as usize).min(self.levels.len()) - 1;
        self.levels[idx]
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl Default for DelayLevels {
    fn default() -> Self {
        // The default table is a constant and always parses.
        Self::parse(DEFAULT_DELAY_LEVELS).unwrap_or(Self {
            levels: vec![Duration::from_secs(1)],
        })
    }
}

fn parse_duration(token: &str) -> Result<Duration> {
    let split = token
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ClientError::ConfigError(format!("delay '{}' has no unit", token)))?;
    let (value, unit) = token.split_at(split);
    let value: u64 = value
        .parse()
        .map_err(|_| ClientError::ConfigError(format!("delay '{}' has no value", token)))?;

    if unit == "ms" {
        return Ok(Duration::from_millis(value));
    }
    let unit_secs: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        other => {
            return Err(ClientError::ConfigError(format!(
                "unknown delay unit '{}' in '{}'",
                other, token
            )))
        }
    };
    value
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| ClientError::ConfigError(format!("delay '{}' is too large", token)))
}

struct ScheduledMessage {
    due: Instant,
    message: Message,
    msg_id: String,
    partition: Partition,
    born_timestamp: i64,
}

#[derive(Default)]
struct Broker {
    topics: HashMap<String, Topic>,
    logs: HashMap<Partition, Vec<ConsumedMessage>>,
    scheduled: Vec<ScheduledMessage>,
}

impl Broker {
    fn append(
        &mut self,
        message: Message,
        msg_id: String,
        partition: &Partition,
        born_timestamp: i64,
    ) -> u64 {
        let log = self.logs.entry(partition.clone()).or_default();
        let offset = log.len() as u64;
        log.push(ConsumedMessage {
            message,
            msg_id,
            partition: partition.clone(),
            offset,
            born_timestamp,
            store_timestamp: chrono::Utc::now().timestamp_millis(),
            reconsume_times: 0,
        });
        offset
    }

    /// Move every due scheduled message into its partition log, oldest due first.
    fn promote_due(&mut self, now: Instant) {
        if self.scheduled.is_empty() {
            return;
        }
        let mut due: Vec<ScheduledMessage> = Vec::new();
        let mut waiting = Vec::with_capacity(self.scheduled.len());
        for scheduled in self.scheduled.drain(..) {
            if scheduled.due <= now {
                due.push(scheduled);
            } else {
                waiting.push(scheduled);
            }
        }
        self.scheduled = waiting;
        due.sort_by_key(|s| s.due);

        for s in due {
            trace!(partition = %s.partition, msg_id = %s.msg_id, "Delayed message is due");
            self.append(s.message, s.msg_id, &s.partition, s.born_timestamp);
        }
    }
}

/// In-memory broker implementing [`Transport`].
pub struct MemoryTransport {
    broker: RwLock<Broker>,
    committed: Mutex<HashMap<(String, Partition), u64>>,
    delay_levels: DelayLevels,
    unresponsive: AtomicBool,
    send_failures: Mutex<VecDeque<TransportError>>,
    send_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_delay_levels(DelayLevels::default())
    }

    pub fn with_delay_levels(delay_levels: DelayLevels) -> Self {
        Self {
            broker: RwLock::new(Broker::default()),
            committed: Mutex::new(HashMap::new()),
            delay_levels,
            unresponsive: AtomicBool::new(false),
            send_failures: Mutex::new(VecDeque::new()),
            send_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Create (or resize) a topic.
    pub async fn create_topic(&self, name: &str, partition_count: u32) -> Result<Topic> {
        let topic = Topic::new(name, partition_count);
        let mut broker = self.broker.write().await;
        broker.topics.insert(name.to_string(), topic.clone());
        debug!(topic = name, partition_count, "Created topic");
        Ok(topic)
    }

    /// Make every send hang until toggled back.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.unresponsive.store(unresponsive, Ordering::SeqCst);
    }

    /// Fail the next sends, one queued error per send.
    pub async fn fail_next_sends(&self, errors: impl IntoIterator<Item = TransportError>) {
        self.send_failures.lock().await.extend(errors);
    }

    /// Number of `send` calls received, including failed ones.
    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Everything currently stored on `partition`, in offset order.
    pub async fn partition_log(&self, partition: &Partition) -> Vec<ConsumedMessage> {
        let mut broker = self.broker.write().await;
        broker.promote_due(Instant::now());
        broker.logs.get(partition).cloned().unwrap_or_default()
    }

    /// Messages waiting for their delay to elapse.
    pub async fn scheduled_count(&self) -> usize {
        self.broker.read().await.scheduled.len()
    }

    pub fn delay_levels(&self) -> &DelayLevels {
        &self.delay_levels
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn resolve_partitions(&self, topic: &str) -> std::result::Result<Vec<Partition>, TransportError> {
        let broker = self.broker.read().await;
        broker
            .topics
            .get(topic)
            .map(|t| t.partitions().to_vec())
            .ok_or_else(|| TransportError::UnknownTopic(topic.to_string()))
    }

    async fn send(
        &self,
        message: &Message,
        partition: &Partition,
        mode: SendMode,
    ) -> std::result::Result<SendResult, TransportError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);

        if self.unresponsive.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if let Some(err) = self.send_failures.lock().await.pop_front() {
            return Err(err);
        }

        let mut broker = self.broker.write().await;
        let known = broker
            .topics
            .get(partition.topic())
            .map(|t| partition.index() < t.partition_count())
            .unwrap_or(false);
        if !known {
            return Err(TransportError::Rejected(format!(
                "partition {} does not exist",
                partition
            )));
        }

        let msg_id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        let born_timestamp = chrono::Utc::now().timestamp_millis();

        let offset = match message.delay_level() {
            Some(level) if level > 0 => {
                let delay = self.delay_levels.duration_for(level);
                let due = Instant::now().checked_add(delay).ok_or_else(|| {
                    TransportError::Rejected(format!("delay {:?} is out of range", delay))
                })?;
                broker.scheduled.push(ScheduledMessage {
                    due,
                    message: message.clone(),
                    msg_id: msg_id.clone(),
                    partition: partition.clone(),
                    born_timestamp,
                });
                None
            }
            _ => Some(broker.append(message.clone(), msg_id.clone(), partition, born_timestamp)),
        };

        trace!(partition = %partition, mode = %mode, msg_id = %msg_id, "Stored message");

        Ok(SendResult {
            status: SendStatus::Ok,
            msg_id,
            partition: partition.clone(),
            offset,
        })
    }

    async fn fetch(
        &self,
        partition: &Partition,
        from: u64,
        max_messages: usize,
    ) -> std::result::Result<Vec<ConsumedMessage>, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let mut broker = self.broker.write().await;
        if !broker.topics.contains_key(partition.topic()) {
            return Err(TransportError::UnknownTopic(partition.topic().to_string()));
        }
        broker.promote_due(Instant::now());

        let messages = broker
            .logs
            .get(partition)
            .map(|log| {
                log.iter()
                    .skip(from as usize)
                    .take(max_messages)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(messages)
    }

    async fn commit(
        &self,
        group: &str,
        partition: &Partition,
        position: u64,
    ) -> std::result::Result<(), TransportError> {
        let mut committed = self.committed.lock().await;
        committed.insert((group.to_string(), partition.clone()), position);
        Ok(())
    }

    async fn committed_position(
        &self,
        group: &str,
        partition: &Partition,
    ) -> std::result::Result<Option<u64>, TransportError> {
        let committed = self.committed.lock().await;
        Ok(committed
            .get(&(group.to_string(), partition.clone()))
            .copied())
    }

    async fn bounds(&self, partition: &Partition) -> std::result::Result<PositionBounds, TransportError> {
        let mut broker = self.broker.write().await;
        broker.promote_due(Instant::now());
        let latest = broker.logs.get(partition).map_or(0, |log| log.len() as u64);
        Ok(PositionBounds {
            earliest: 0,
            latest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delay_levels() {
        let levels = DelayLevels::default();
        assert_eq!(levels.len(), 18);
        assert_eq!(levels.duration_for(1), Duration::from_secs(1));
        assert_eq!(levels.duration_for(3), Duration::from_secs(10));
        assert_eq!(levels.duration_for(18), Duration::from_secs(7200));
    }

    #[test]
    fn test_delay_levels_clamp_to_last() {
        let levels = DelayLevels::parse("100ms 2s").unwrap();
        assert_eq!(levels.duration_for(1), Duration::from_millis(100));
        assert_eq!(levels.duration_for(2), Duration::from_secs(2));
        assert_eq!(levels.duration_for(99), Duration::from_secs(2));
        assert_eq!(levels.duration_for(0), Duration::ZERO);
    }

    #[test]
    fn test_delay_levels_parse_errors() {
        assert!(DelayLevels::parse("").is_err());
        assert!(DelayLevels::parse("5").is_err());
        assert!(DelayLevels::parse("5w").is_err());
        assert!(DelayLevels::parse("s").is_err());
    }

    #[test]
    fn test_delay_levels_reject_overflowing_entries() {
        let huge = format!("{}d", u64::MAX / 2);
        assert!(matches!(
            DelayLevels::parse(&huge),
            Err(ClientError::ConfigError(_))
        ));
        assert!(DelayLevels::parse(&format!("1s {}h", u64::MAX)).is_err());

        let levels = DelayLevels::parse(&format!("{}s", u64::MAX)).unwrap();
        assert_eq!(levels.duration_for(1), Duration::from_secs(u64::MAX));
    }

    #[tokio::test]
    async fn test_offsets_follow_submission_order() {
        let transport = MemoryTransport::new();
        transport.create_topic("t", 2).await.unwrap();
        let p = Partition::new("t", 1);

        for i in 0..3 {
            let r = transport
                .send(&Message::new("t", format!("m{}", i)), &p, SendMode::Sync)
                .await
                .unwrap();
            assert_eq!(r.offset, Some(i));
        }

        let fetched = transport.fetch(&p, 1, 10).await.unwrap();
        let offsets: Vec<u64> = fetched.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_unknown_topic() {
        let transport = MemoryTransport::new();
        let err = transport.resolve_partitions("missing").await.unwrap_err();
        assert_eq!(err, TransportError::UnknownTopic("missing".to_string()));
    }

    #[tokio::test]
    async fn test_send_to_missing_partition_rejected() {
        let transport = MemoryTransport::new();
        transport.create_topic("t", 1).await.unwrap();
        let err = transport
            .send(&Message::new("t", "x"), &Partition::new("t", 5), SendMode::Sync)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_message_becomes_visible_when_due() {
        let transport = MemoryTransport::with_delay_levels(DelayLevels::parse("1s 5s").unwrap());
        transport.create_topic("t", 1).await.unwrap();
        let p = Partition::new("t", 0);

        let result = transport
            .send(&Message::new("t", "later").with_delay_level(2), &p, SendMode::Async)
            .await
            .unwrap();
        assert_eq!(result.offset, None);
        assert_eq!(transport.scheduled_count().await, 1);
        assert!(transport.fetch(&p, 0, 10).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(5)).await;

        let fetched = transport.fetch(&p, 0, 10).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].message.delay_level(), Some(2));
        assert_eq!(transport.scheduled_count().await, 0);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let transport = MemoryTransport::new();
        transport.create_topic("t", 1).await.unwrap();
        transport
            .fail_next_sends([TransportError::Unavailable("down".into())])
            .await;
        let p = Partition::new("t", 0);

        assert!(transport
            .send(&Message::new("t", "a"), &p, SendMode::Sync)
            .await
            .is_err());
        assert!(transport
            .send(&Message::new("t", "b"), &p, SendMode::Sync)
            .await
            .is_ok());
        assert_eq!(transport.send_calls(), 2);
    }

    #[tokio::test]
    async fn test_commit_and_bounds() {
        let transport = MemoryTransport::new();
        transport.create_topic("t", 1).await.unwrap();
        let p = Partition::new("t", 0);

        assert_eq!(transport.committed_position("g", &p).await.unwrap(), None);
        transport.commit("g", &p, 3).await.unwrap();
        assert_eq!(transport.committed_position("g", &p).await.unwrap(), Some(3));
        assert_eq!(transport.committed_position("other", &p).await.unwrap(), None);

        transport
            .send(&Message::new("t", "x"), &p, SendMode::Sync)
            .await
            .unwrap();
        let bounds = transport.bounds(&p).await.unwrap();
        assert_eq!(bounds, PositionBounds { earliest: 0, latest: 1 });
    }
}
