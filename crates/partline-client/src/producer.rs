//! Producer API for partline.
//!
//! This module provides the send gateway: every way an application can hand a
//! message to the broker.
//!
//! ## Send Modes
//!
//! | Method | Waits for | Failure surface | Client retry |
//! |---|---|---|---|
//! | `send` / `send_with_timeout` | broker ack, bounded | `Timeout`, `SendFailed` | never |
//! | `send_async` / `send_async_with_callback` | nothing | `PendingSend` / callback | `retry_times_when_send_async_failed` |
//! | `send_oneway` | local hand-off only | `SubmitFailed` | never |
//! | `send_ordered` / `send_ordered_async` | as sync / async | as sync / async | never |
//!
//! ## Routing
//!
//! Every mode runs the same front half before anything reaches the transport:
//!
//! 1. **Validate**: a delay level `<= 0` is rejected with `InvalidDelayLevel`
//! 2. **Resolve**: the topic's partitions come from the `PartitionDirectory`;
//!    unknown topics fail here, synchronously
//! 3. **Route**: a message with an ordering key goes through the
//!    `AffinityRouter`; messages without one are spread round-robin
//!
//! ## Ordering
//!
//! Messages with the same ordering key land on the same partition. Asynchronous
//! sends, one-way sends and keyed synchronous sends are queued per partition
//! and submitted by one dispatcher task per partition, so they reach the
//! transport in call order whatever mix of modes the caller uses. Completions
//! for different partitions may arrive in any order.
//!
//! ## Examples
//!
//! ```ignore
//! use partline_client::{MemoryTransport, Producer};
//! use partline_core::Message;
//!
//! let producer = Producer::builder()
//!     .transport(transport)
//!     .group("order-producer")
//!     .start()
//!     .await?;
//!
//! let result = producer.send(Message::new("orders", "created").with_tag("TagA")).await?;
//! println!("{} -> {}", result.msg_id, result.partition);
//!
//! producer.send_ordered(Message::new("orders", "paid"), 15103111039_i64).await?;
//! producer.shutdown().await?;
//! ```

use crate::config::ProducerConfig;
use crate::directory::PartitionDirectory;
use crate::error::{ClientError, Result};
use crate::latch::PendingSend;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::router::{AffinityRouter, SignNormalization};
use crate::transport::{SendMode, Transport};
use partline_core::{Message, OrderingKey, Partition, SendResult};
use partline_observability::metrics;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of [`Producer::publish`].
#[derive(Debug)]
pub enum Published {
    /// Synchronous send, acknowledged by the broker.
    Acknowledged(SendResult),
    /// Asynchronous send, still in flight.
    Pending(PendingSend),
    /// One-way send, queued for its partition.
    Submitted,
}

type Completion = Box<dyn FnOnce(Result<SendResult>) + Send>;

/// One queued send.
struct SendJob {
    message: Message,
    mode: SendMode,
    timeout: Duration,
    retry: RetryPolicy,
    done: Completion,
}

/// What the dispatcher tasks need from the producer.
struct SendContext {
    transport: Arc<dyn Transport>,
    send_timeout: Duration,
    in_flight: watch::Sender<usize>,
}

impl SendContext {
    /// One bounded attempt; records metrics for it.
    async fn attempt(
        &self,
        message: &Message,
        partition: &Partition,
        mode: SendMode,
        timeout: Duration,
    ) -> Result<SendResult> {
        let topic = message.topic();
        let start = Instant::now();

        let outcome = tokio::time::timeout(timeout, self.transport.send(message, partition, mode))
            .await
            .map_err(|_| ClientError::Timeout(timeout))
            .and_then(|r| {
                r.map_err(|cause| ClientError::SendFailed {
                    partition: partition.to_string(),
                    cause,
                })
            });

        match &outcome {
            Ok(_) => {
                metrics::PRODUCER_MESSAGES_TOTAL
                    .with_label_values(&[topic, mode.as_str()])
                    .inc();
                metrics::PRODUCER_BYTES_TOTAL
                    .with_label_values(&[topic])
                    .inc_by(message.body().len() as u64);
                metrics::PRODUCER_LATENCY
                    .with_label_values(&[topic, mode.as_str()])
                    .observe(start.elapsed().as_secs_f64());
            }
            Err(e) => {
                metrics::PRODUCER_ERRORS_TOTAL
                    .with_label_values(&[topic, e.kind()])
                    .inc();
            }
        }
        outcome
    }

    fn finish_one(&self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Drain one partition's queue in order until every sender is gone.
    async fn run_dispatcher(self: Arc<Self>, partition: Partition, mut rx: mpsc::UnboundedReceiver<SendJob>) {
        debug!(partition = %partition, "Send dispatcher started");

        while let Some(job) = rx.recv().await {
            let ctx: &SendContext = &self;
            let message = &job.message;
            let target = &partition;
            let (mode, timeout) = (job.mode, job.timeout);
            let result = retry_with_backoff(&job.retry, move || {
                ctx.attempt(message, target, mode, timeout)
            })
            .await;

            if let Err(e) = &result {
                debug!(partition = %partition, mode = %mode, error = %e, "Queued send failed");
            }

            let done = job.done;
            if std::panic::catch_unwind(AssertUnwindSafe(move || done(result))).is_err() {
                error!(partition = %partition, "Send completion callback panicked");
            }
            self.finish_one();
        }

        debug!(partition = %partition, "Send dispatcher stopped");
    }
}

/// High-level producer for publishing messages.
///
/// A `Producer` is an explicit handle: build one with [`Producer::builder`],
/// share it behind an `Arc` if several tasks publish, and call
/// [`Producer::shutdown`] when done.
pub struct Producer {
    config: ProducerConfig,
    ctx: Arc<SendContext>,
    directory: Arc<PartitionDirectory>,
    router: AffinityRouter,
    retry_policy: RetryPolicy,
    round_robin: AtomicUsize,
    dispatchers: Mutex<HashMap<Partition, mpsc::UnboundedSender<SendJob>>>,
    refresh_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Producer {
    pub fn builder() -> ProducerBuilder {
        ProducerBuilder::new()
    }

    pub fn group(&self) -> &str {
        &self.config.group
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Partitions the producer currently routes `topic` over.
    pub async fn partitions(&self, topic: &str) -> Result<Arc<[Partition]>> {
        self.directory.partitions(topic).await
    }

    /// Partition `message` would be sent to right now.
    ///
    /// Deterministic for messages with an ordering key. Advances the
    /// round-robin cursor for messages without one.
    pub async fn route(&self, message: &Message) -> Result<Partition> {
        message.validate()?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }

        let partitions = self.directory.partitions(message.topic()).await?;
        match message.ordering_key() {
            Some(key) => self.router.select(&partitions, key).map_err(|e| match e {
                ClientError::NoPartitionsAvailable(_) => {
                    ClientError::NoPartitionsAvailable(message.topic().to_string())
                }
                other => other,
            }),
            None => {
                if partitions.is_empty() {
                    return Err(ClientError::NoPartitionsAvailable(
                        message.topic().to_string(),
                    ));
                }
                let n = self.round_robin.fetch_add(1, Ordering::Relaxed);
                Ok(partitions[n % partitions.len()].clone())
            }
        }
    }

    /// Synchronous send bounded by the configured `send_timeout`.
    pub async fn send(&self, message: Message) -> Result<SendResult> {
        self.send_with_timeout(message, self.config.send_timeout())
            .await
    }

    /// Synchronous send: wait at most `timeout` for the broker ack.
    ///
    /// # Errors
    ///
    /// - `InvalidDelayLevel`, `UnknownTopic`: before any transport call
    /// - `Timeout(timeout)`: no ack in time; the message may still be stored
    /// - `SendFailed`: the transport reported a failure
    pub async fn send_with_timeout(&self, message: Message, timeout: Duration) -> Result<SendResult> {
        let topic = message.topic().to_string();
        let (partition, result) = if message.ordering_key().is_some() {
            self.send_queued(message, timeout).await?
        } else {
            let partition = self.route(&message).await?;
            let result = self
                .ctx
                .attempt(&message, &partition, SendMode::Sync, timeout)
                .await;
            (partition, result)
        };

        match &result {
            Ok(r) => debug!(
                topic = %topic,
                partition = %r.partition,
                msg_id = %r.msg_id,
                status = %r.status,
                "Message sent"
            ),
            Err(e) => warn!(topic = %topic, partition = %partition, error = %e, "Send failed"),
        }
        result
    }

    /// Keyed synchronous send through the partition queue, behind any keyed
    /// send already queued there. `timeout` covers the wait in the queue.
    async fn send_queued(
        &self,
        message: Message,
        timeout: Duration,
    ) -> Result<(Partition, Result<SendResult>)> {
        let (tx, rx) = oneshot::channel();
        let partition = self
            .enqueue(
                message,
                SendMode::Sync,
                timeout,
                Box::new(move |result: Result<SendResult>| {
                    let _ = tx.send(result);
                }),
            )
            .await?;

        let result = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Timeout(timeout)),
        };
        Ok((partition, result))
    }

    /// Asynchronous send. Routing errors are returned here; everything after
    /// that is reported through the returned [`PendingSend`].
    pub async fn send_async(&self, message: Message) -> Result<PendingSend> {
        let (tx, rx) = oneshot::channel();
        let partition = self
            .enqueue(
                message,
                SendMode::Async,
                self.ctx.send_timeout,
                Box::new(move |result: Result<SendResult>| {
                    let _ = tx.send(result);
                }),
            )
            .await?;
        Ok(PendingSend::new(partition, rx))
    }

    /// Asynchronous send reporting through `callback`, which runs on a
    /// dispatcher task. Not called when routing fails; that error is returned
    /// here instead.
    pub async fn send_async_with_callback<F>(&self, message: Message, callback: F) -> Result<()>
    where
        F: FnOnce(Result<SendResult>) + Send + 'static,
    {
        self.enqueue(message, SendMode::Async, self.ctx.send_timeout, Box::new(callback))
            .await
            .map(|_| ())
    }

    /// Fire-and-forget. Returns as soon as the message is queued for its
    /// partition, without waiting for the transport. Whatever the broker
    /// does with it afterwards is only logged.
    ///
    /// # Errors
    ///
    /// `SubmitFailed` when the producer no longer accepts messages. Routing
    /// errors are returned as they are.
    pub async fn send_oneway(&self, message: Message) -> Result<()> {
        let topic = message.topic().to_string();
        let queued = self
            .enqueue(
                message,
                SendMode::OneWay,
                self.ctx.send_timeout,
                Box::new(move |result: Result<SendResult>| {
                    if let Err(e) = result {
                        debug!(topic = %topic, error = %e, "One-way message was not stored");
                    }
                }),
            )
            .await;

        match queued {
            Ok(_) => Ok(()),
            Err(ClientError::Closed) => Err(ClientError::SubmitFailed(
                "producer is shut down".to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    /// Synchronous send pinned to the partition `key` routes to.
    pub async fn send_ordered(
        &self,
        message: Message,
        key: impl Into<OrderingKey>,
    ) -> Result<SendResult> {
        self.send(message.with_ordering_key(key)).await
    }

    /// Asynchronous send pinned to the partition `key` routes to. Never
    /// retried.
    pub async fn send_ordered_async(
        &self,
        message: Message,
        key: impl Into<OrderingKey>,
    ) -> Result<PendingSend> {
        self.send_async(message.with_ordering_key(key)).await
    }

    /// Send in the given mode.
    pub async fn publish(&self, message: Message, mode: SendMode) -> Result<Published> {
        match mode {
            SendMode::Sync => self.send(message).await.map(Published::Acknowledged),
            SendMode::Async => self.send_async(message).await.map(Published::Pending),
            SendMode::OneWay => self.send_oneway(message).await.map(|_| Published::Submitted),
        }
    }

    /// Asynchronous sends not yet completed.
    pub fn in_flight(&self) -> usize {
        *self.ctx.in_flight.borrow()
    }

    /// Stop accepting sends, stop the directory refresh and wait up to
    /// `shutdown_timeout` for in-flight asynchronous sends.
    ///
    /// Sends still queued after the timeout are abandoned; their
    /// `PendingSend` handles report `Indeterminate`.
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.abort_refresh();

        let mut rx = self.ctx.in_flight.subscribe();
        let timeout = self.config.shutdown_timeout();
        let drained = tokio::time::timeout(timeout, async {
            let _ = rx.wait_for(|n| *n == 0).await;
        })
        .await;

        if drained.is_err() {
            warn!(
                group = %self.config.group,
                outstanding = self.in_flight(),
                "Producer shut down with sends still in flight"
            );
        }

        // Dropping the senders ends the dispatcher tasks.
        self.dispatchers.lock().await.clear();
        info!(group = %self.config.group, "Producer shut down");
        Ok(())
    }

    async fn enqueue(
        &self,
        message: Message,
        mode: SendMode,
        timeout: Duration,
        done: Completion,
    ) -> Result<Partition> {
        let partition = self.route(&message).await?;

        // Only unordered asynchronous sends retry; a resend of an ordered one
        // could land behind a later message.
        let retry = if mode == SendMode::Async && message.ordering_key().is_none() {
            self.retry_policy.clone()
        } else {
            self.retry_policy.clone().with_max_retries(0)
        };

        let mut dispatchers = self.dispatchers.lock().await;
        let tx = dispatchers.entry(partition.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(Arc::clone(&self.ctx).run_dispatcher(partition.clone(), rx));
            tx
        });

        self.ctx.in_flight.send_modify(|n| *n += 1);
        if let Err(mpsc::error::SendError(job)) = tx.send(SendJob {
            message,
            mode,
            timeout,
            retry,
            done,
        }) {
            self.ctx.finish_one();
            dispatchers.remove(&partition);
            drop(dispatchers);
            (job.done)(Err(ClientError::Closed));
            return Err(ClientError::Closed);
        }

        Ok(partition)
    }

    fn abort_refresh(&self) {
        if let Ok(mut guard) = self.refresh_handle.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.abort_refresh();
    }
}

/// Builder for configuring and starting a `Producer`.
///
/// # Required Fields
///
/// - `transport`
///
/// # Default Values
///
/// See [`ProducerConfig::default`]: 3s send timeout, no asynchronous
/// retries, 30s directory refresh, 5s shutdown timeout.
pub struct ProducerBuilder {
    transport: Option<Arc<dyn Transport>>,
    config: ProducerConfig,
}

impl ProducerBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            config: ProducerConfig::default(),
        }
    }

    /// Take every setting from `config`. Later builder calls still apply.
    pub fn from_config(mut self, config: &ProducerConfig) -> Self {
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

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Resends of a failed non-ordered asynchronous send. Ordered sends
    /// ignore this.
    pub fn retry_times_when_send_async_failed(mut self, times: usize) -> Self {
        self.config.retry_times_when_send_async_failed = times;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn directory_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.directory_refresh_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn sign_normalization(mut self, sign: SignNormalization) -> Self {
        self.config.sign_normalization = sign;
        self
    }

    /// Check the transport and start the producer.
    ///
    /// # Errors
    ///
    /// - `ConfigError` when no transport was given or a setting is invalid
    /// - `Transport` when the health check fails
    pub async fn start(self) -> Result<Producer> {
        let transport = self
            .transport
            .ok_or_else(|| ClientError::ConfigError("transport is required".to_string()))?;

        if self.config.send_timeout_ms == 0 {
            return Err(ClientError::ConfigError(
                "send_timeout must be positive".to_string(),
            ));
        }
        if self.config.directory_refresh_interval_ms == 0 {
            return Err(ClientError::ConfigError(
                "directory_refresh_interval must be positive".to_string(),
            ));
        }

        transport.health_check().await?;

        let directory = Arc::new(PartitionDirectory::new(Arc::clone(&transport)));
        let refresh_handle =
            directory.spawn_refresh_task(self.config.directory_refresh_interval());

        let retry_policy = RetryPolicy::exponential(
            self.config.retry_times_when_send_async_failed,
            self.config.retry_backoff(),
        );

        let (in_flight, _) = watch::channel(0usize);
        let ctx = Arc::new(SendContext {
            transport,
            send_timeout: self.config.send_timeout(),
            in_flight,
        });

        info!(
            group = %self.config.group,
            send_timeout_ms = self.config.send_timeout_ms,
            async_retries = self.config.retry_times_when_send_async_failed,
            "Producer started"
        );

        Ok(Producer {
            router: AffinityRouter::new(self.config.sign_normalization),
            config: self.config,
            ctx,
            directory,
            retry_policy,
            round_robin: AtomicUsize::new(0),
            dispatchers: Mutex::new(HashMap::new()),
            refresh_handle: std::sync::Mutex::new(Some(refresh_handle)),
            closed: AtomicBool::new(false),
        })
    }
}

impl Default for ProducerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;

    async fn setup(partitions: u32) -> (Arc<MemoryTransport>, Producer) {
        let transport = Arc::new(MemoryTransport::new());
        transport.create_topic("t", partitions).await.unwrap();
        let producer = Producer::builder()
            .transport(transport.clone())
            .start()
            .await
            .unwrap();
        (transport, producer)
    }

    #[tokio::test]
    async fn test_builder_requires_transport() {
        let result = Producer::builder().start().await;
        assert!(matches!(result, Err(ClientError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_round_robin_without_key() {
        let (_transport, producer) = setup(3).await;
        let mut seen = Vec::new();
        for i in 0..6 {
            let r = producer
                .send(Message::new("t", format!("m{}", i)))
                .await
                .unwrap();
            seen.push(r.partition.index());
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2]);
    }

    #[tokio::test]
    async fn test_unknown_topic_surfaces_synchronously() {
        let (transport, producer) = setup(1).await;
        let err = producer
            .send_async(Message::new("nope", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnknownTopic(t) if t == "nope"));
        assert_eq!(transport.send_calls(), 0);
    }

    #[tokio::test]
    async fn test_async_retry_applies_to_unordered_only() {
        use crate::transport::TransportError;

        let transport = Arc::new(MemoryTransport::new());
        transport.create_topic("t", 2).await.unwrap();
        let producer = Producer::builder()
            .transport(transport.clone())
            .retry_times_when_send_async_failed(2)
            .retry_backoff(Duration::from_millis(1))
            .start()
            .await
            .unwrap();

        transport
            .fail_next_sends([TransportError::Unavailable("blip".into())])
            .await;
        let pending = producer.send_async(Message::new("t", "a")).await.unwrap();
        assert!(pending.wait(Duration::from_secs(5)).await.is_delivered());

        transport
            .fail_next_sends([TransportError::Unavailable("blip".into())])
            .await;
        let pending = producer
            .send_ordered_async(Message::new("t", "b"), 7_i64)
            .await
            .unwrap();
        let outcome = pending.wait(Duration::from_secs(5)).await;
        assert!(matches!(
            outcome,
            crate::latch::SendOutcome::Failed(ClientError::SendFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_sends() {
        let (_transport, producer) = setup(1).await;
        producer.shutdown().await.unwrap();
        assert!(matches!(
            producer.send(Message::new("t", "x")).await,
            Err(ClientError::Closed)
        ));
        // Idempotent.
        producer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_oneway_submits() {
        let (transport, producer) = setup(1).await;
        producer
            .send_oneway(Message::new("t", "fire"))
            .await
            .unwrap();
        producer.shutdown().await.unwrap();

        let log = transport.partition_log(&Partition::new("t", 0)).await;
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_oneway_ignores_broker_failure() {
        use crate::transport::TransportError;

        let (transport, producer) = setup(1).await;
        transport
            .fail_next_sends([TransportError::Rejected("full".into())])
            .await;
        producer.send_oneway(Message::new("t", "x")).await.unwrap();
        producer.shutdown().await.unwrap();

        assert_eq!(transport.send_calls(), 1);
        assert!(transport.partition_log(&Partition::new("t", 0)).await.is_empty());
    }

    #[tokio::test]
    async fn test_oneway_after_shutdown_is_submit_failure() {
        let (transport, producer) = setup(1).await;
        producer.shutdown().await.unwrap();
        assert!(matches!(
            producer.send_oneway(Message::new("t", "x")).await,
            Err(ClientError::SubmitFailed(_))
        ));
        assert_eq!(transport.send_calls(), 0);
    }

    #[tokio::test]
    async fn test_keyed_sync_send_waits_behind_queued_async() {
        let (transport, producer) = setup(4).await;

        let pending = producer
            .send_ordered_async(Message::new("t", "A"), 1001_i64)
            .await
            .unwrap();
        let result = producer
            .send_ordered(Message::new("t", "B"), 1001_i64)
            .await
            .unwrap();
        assert_eq!(result.partition, Partition::new("t", 1));
        assert_eq!(result.offset, Some(1));
        assert!(pending.wait(Duration::from_secs(5)).await.is_delivered());

        let bodies: Vec<String> = transport
            .partition_log(&Partition::new("t", 1))
            .await
            .iter()
            .map(|m| String::from_utf8_lossy(m.body()).into_owned())
            .collect();
        assert_eq!(bodies, vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyed_sync_send_times_out_in_queue() {
        let (transport, producer) = setup(1).await;
        transport.set_unresponsive(true);

        let err = producer
            .send_ordered(Message::new("t", "x"), 3_i64)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_publish_modes() {
        let (_transport, producer) = setup(2).await;

        let sync = producer
            .publish(Message::new("t", "s"), SendMode::Sync)
            .await
            .unwrap();
        assert!(matches!(sync, Published::Acknowledged(_)));

        let pending = match producer
            .publish(Message::new("t", "a"), SendMode::Async)
            .await
            .unwrap()
        {
            Published::Pending(p) => p,
            other => panic!("expected pending, got {:?}", other),
        };
        assert!(pending.wait(Duration::from_secs(5)).await.is_delivered());

        let oneway = producer
            .publish(Message::new("t", "o"), SendMode::OneWay)
            .await
            .unwrap();
        assert!(matches!(oneway, Published::Submitted));
    }
}
