//! Push consumer API.
//!
//! A push consumer owns the lanes for every partition of the topics it
//! subscribes to and calls the application's handler with each batch. The
//! handler never polls; it only says whether a batch succeeded.
//!
//! ## Architecture
//!
//! ```text
//! PushConsumer::builder()
//!     .subscribe(topic, "TagA || TagB", ConsumeMode::Orderly, handler)
//!     .start()
//!         │
//!         ├─→ PartitionDirectory   resolve partitions of each topic
//!         └─→ PartitionScheduler   one lane per partition
//!                 └─→ BatchProcessor → handler
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use partline_client::{ConsumeMode, PushConsumer, StartPosition};
//!
//! let consumer = PushConsumer::builder()
//!     .transport(transport)
//!     .group("order-consumer")
//!     .start_position(StartPosition::Earliest)
//!     .subscribe("orders", "TagA || TagC || TagD", ConsumeMode::Orderly, |msgs: Vec<ConsumedMessage>| async move {
//!         for m in &msgs {
//!             println!("{} {}", m.partition, String::from_utf8_lossy(m.body()));
//!         }
//!         Ok::<(), HandlerError>(())
//!     })
//!     .start()
//!     .await?;
//!
//! // ...
//! consumer.stop().await?;
//! ```

use crate::config::ConsumerConfig;
use crate::directory::PartitionDirectory;
use crate::error::{ClientError, Result};
use crate::filter::TagFilter;
use crate::processor::{BatchProcessor, ConsumeMode, MessageHandler};
use crate::scheduler::{
    LaneConfig, LaneState, LaneStatsSnapshot, PartitionScheduler, ShutdownPolicy, StartPosition,
};
use crate::transport::Transport;
use partline_core::Partition;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Namespace for [`PushConsumer::builder`].
pub struct PushConsumer;

impl PushConsumer {
    pub fn builder() -> PushConsumerBuilder {
        PushConsumerBuilder::new()
    }
}

struct Subscription {
    topic: String,
    filter: TagFilter,
    mode: ConsumeMode,
    handler: Arc<dyn MessageHandler>,
}

/// Builder for a push consumer.
///
/// # Required Fields
///
/// - `transport`
/// - at least one `subscribe`
pub struct PushConsumerBuilder {
    transport: Option<Arc<dyn Transport>>,
    config: ConsumerConfig,
    subscriptions: Vec<Subscription>,
    invalid: Option<ClientError>,
}

impl PushConsumerBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            config: ConsumerConfig::default(),
            subscriptions: Vec::new(),
            invalid: None,
        }
    }

    /// Take every setting from `config`. Later builder calls still apply.
    pub fn from_config(mut self, config: &ConsumerConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.config.group = group.into();
        self
    }

    /// Subscribe `handler` to `topic`, filtered by `expression` (`"*"` or
    /// `"TagA || TagB"`). Subscribing to the same topic again replaces the
    /// earlier subscription.
    ///
    /// A malformed expression is reported by `start`.
    pub fn subscribe<H>(
        mut self,
        topic: impl Into<String>,
        expression: &str,
        mode: ConsumeMode,
        handler: H,
    ) -> Self
    where
        H: MessageHandler,
    {
        let topic = topic.into();
        match TagFilter::parse(expression) {
            Ok(filter) => {
                self.subscriptions.retain(|s| s.topic != topic);
                self.subscriptions.push(Subscription {
                    topic,
                    filter,
                    mode,
                    handler: Arc::new(handler),
                });
            }
            Err(e) => {
                self.invalid.get_or_insert(e);
            }
        }
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn max_active_lanes(mut self, lanes: usize) -> Self {
        self.config.max_active_lanes = lanes;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn idle_backoff(mut self, backoff: Duration) -> Self {
        self.config.idle_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn max_reconsume_times(mut self, times: u32) -> Self {
        self.config.max_reconsume_times = times;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn auto_commit(mut self, enabled: bool) -> Self {
        self.config.auto_commit = enabled;
        self
    }

    pub fn start_position(mut self, position: StartPosition) -> Self {
        self.config.start_position = position;
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.config.shutdown_policy = policy;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Resolve every subscription and start one lane per partition.
    ///
    /// All topics are resolved before the first lane starts, so a failure
    /// leaves nothing running.
    ///
    /// # Errors
    ///
    /// - `ConfigError`: missing transport, no subscriptions, invalid settings
    /// - `InvalidFilter`: a subscription expression did not parse
    /// - `UnknownTopic`: a subscribed topic has no partitions
    /// - `Transport`: the health check failed
    pub async fn start(self) -> Result<ConsumerHandle> {
        if let Some(e) = self.invalid {
            return Err(e);
        }
        let transport = self
            .transport
            .ok_or_else(|| ClientError::ConfigError("transport is required".to_string()))?;
        if self.subscriptions.is_empty() {
            return Err(ClientError::ConfigError(
                "at least one subscription is required".to_string(),
            ));
        }

        transport.health_check().await?;

        let directory = PartitionDirectory::new(Arc::clone(&transport));
        let mut resolved = Vec::with_capacity(self.subscriptions.len());
        for sub in self.subscriptions {
            let partitions = directory.partitions(&sub.topic).await?;
            resolved.push((sub, partitions));
        }

        let mut scheduler = PartitionScheduler::new(
            Arc::clone(&transport),
            LaneConfig::from_consumer_config(&self.config),
            self.config.max_active_lanes,
        )?;

        let mut subscriptions = Vec::with_capacity(resolved.len());
        for (sub, partitions) in resolved {
            for partition in partitions.iter() {
                scheduler.spawn_lane(
                    partition.clone(),
                    BatchProcessor::new(
                        sub.mode,
                        Arc::clone(&sub.handler),
                        self.config.max_reconsume_times,
                    ),
                    sub.filter.clone(),
                );
            }
            info!(
                group = %self.config.group,
                topic = %sub.topic,
                expression = %sub.filter,
                mode = %sub.mode,
                partitions = partitions.len(),
                "Subscribed"
            );
            subscriptions.push(SubscriptionInfo {
                topic: sub.topic,
                expression: sub.filter.to_string(),
                mode: sub.mode,
            });
        }

        info!(
            group = %self.config.group,
            lanes = scheduler.lane_count(),
            max_active_lanes = self.config.max_active_lanes,
            "Consumer started"
        );

        Ok(ConsumerHandle {
            group: self.config.group,
            subscriptions,
            scheduler,
        })
    }
}

impl Default for PushConsumerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription as the running consumer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub topic: String,
    pub expression: String,
    pub mode: ConsumeMode,
}

/// A running consumer. Dropping it signals every lane to stop without
/// waiting; call [`ConsumerHandle::stop`] to wait and commit.
pub struct ConsumerHandle {
    group: String,
    subscriptions: Vec<SubscriptionInfo>,
    scheduler: PartitionScheduler,
}

impl ConsumerHandle {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn subscriptions(&self) -> &[SubscriptionInfo] {
        &self.subscriptions
    }

    pub fn lane_states(&self) -> Vec<(Partition, LaneState)> {
        self.scheduler.lane_states()
    }

    pub fn watch_lane(&self, partition: &Partition) -> Option<watch::Receiver<LaneState>> {
        self.scheduler.watch_lane(partition)
    }

    pub async fn lane_stats(&self) -> Vec<LaneStatsSnapshot> {
        self.scheduler.lane_stats().await
    }

    /// Commit current positions now. Only needed with auto-commit off.
    pub async fn commit(&self) -> Result<()> {
        self.scheduler.commit().await
    }

    /// Stop every lane, wait for them under the configured shutdown policy
    /// and commit final positions.
    pub async fn stop(mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        info!(group = %self.group, "Consumer stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use crate::processor::HandlerError;
    use partline_core::ConsumedMessage;

    fn noop() -> impl MessageHandler {
        |_msgs: Vec<ConsumedMessage>| async { Ok::<(), HandlerError>(()) }
    }

    #[tokio::test]
    async fn test_requires_subscription() {
        let transport = Arc::new(MemoryTransport::new());
        let result = PushConsumer::builder().transport(transport).start().await;
        assert!(matches!(result, Err(ClientError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_invalid_expression() {
        let transport = Arc::new(MemoryTransport::new());
        transport.create_topic("t", 1).await.unwrap();
        let result = PushConsumer::builder()
            .transport(transport)
            .subscribe("t", "TagA ||", ConsumeMode::Concurrent, noop())
            .start()
            .await;
        assert!(matches!(result, Err(ClientError::InvalidFilter(_))));
    }

    #[tokio::test]
    async fn test_unknown_topic_starts_nothing() {
        let transport = Arc::new(MemoryTransport::new());
        transport.create_topic("known", 2).await.unwrap();
        let result = PushConsumer::builder()
            .transport(transport.clone())
            .start_position(StartPosition::Earliest)
            .subscribe("known", "*", ConsumeMode::Concurrent, noop())
            .subscribe("missing", "*", ConsumeMode::Concurrent, noop())
            .start()
            .await;

        assert!(matches!(result, Err(ClientError::UnknownTopic(t)) if t == "missing"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_one_lane_per_partition() {
        let transport = Arc::new(MemoryTransport::new());
        transport.create_topic("a", 3).await.unwrap();
        transport.create_topic("b", 2).await.unwrap();

        let consumer = PushConsumer::builder()
            .transport(transport)
            .group("g")
            .idle_backoff(Duration::from_millis(5))
            .subscribe("a", "*", ConsumeMode::Concurrent, noop())
            .subscribe("b", "TagA || TagB", ConsumeMode::Orderly, noop())
            .start()
            .await
            .unwrap();

        assert_eq!(consumer.lane_states().len(), 5);
        assert_eq!(consumer.subscriptions()[1].expression, "TagA || TagB");
        consumer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_resubscribe_replaces() {
        let transport = Arc::new(MemoryTransport::new());
        transport.create_topic("a", 1).await.unwrap();

        let consumer = PushConsumer::builder()
            .transport(transport)
            .subscribe("a", "*", ConsumeMode::Concurrent, noop())
            .subscribe("a", "TagA", ConsumeMode::Orderly, noop())
            .start()
            .await
            .unwrap();

        assert_eq!(consumer.subscriptions().len(), 1);
        assert_eq!(consumer.subscriptions()[0].mode, ConsumeMode::Orderly);
        assert_eq!(consumer.lane_states().len(), 1);
        consumer.stop().await.unwrap();
    }
}
