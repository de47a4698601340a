//! Partition Consumption Scheduler
//!
//! Runs one lane per subscribed partition. A lane is a spawned task that
//! loops through four states:
//!
//! ```text
//!            permit acquired              non-empty fetch
//!   Idle ───────────────────▶ Fetching ───────────────────▶ Delivering
//!    ▲                           │ empty / error / timeout      │
//!    └───────────────────────────┴──────────────────────────────┘
//!                                                  outcome handled
//!   any state ── shutdown ──▶ Stopped
//! ```
//!
//! ## Invariants
//!
//! - A lane never fetches while it is delivering, so each partition has at
//!   most one batch in flight. Different lanes run fully in parallel.
//! - A lane only moves its position forward after the processor reports
//!   `Success` (or after skipping messages the tag filter rejects). A batch
//!   that is retried is redelivered from its first message.
//! - At most `max_active_lanes` lanes fetch or deliver at the same time.
//!
//! ## Shutdown
//!
//! Lanes watch a `tokio::sync::watch` flag. Once it flips, no lane starts a
//! new fetch. What happens to a delivery already running depends on
//! [`ShutdownPolicy`]: `Drain` lets it finish (optionally within
//! `drain_timeout`), `Abandon` cancels it without committing so the broker
//! redelivers it to the next consumer.

use crate::config::ConsumerConfig;
use crate::error::{ClientError, Result};
use crate::filter::TagFilter;
use crate::processor::{BatchProcessor, ConsumeMode, Outcome};
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use partline_core::{ConsumptionBatch, Partition};
use partline_observability::metrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LaneState {
    #[default]
    Idle,
    Fetching,
    Delivering,
    Stopped,
}

impl fmt::Display for LaneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LaneState::Idle => "idle",
            LaneState::Fetching => "fetching",
            LaneState::Delivering => "delivering",
            LaneState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Where a lane starts when its group has no committed position.
///
/// A committed position always wins over this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosition {
    /// Oldest retained message.
    Earliest,
    /// Only messages stored after the lane starts.
    #[default]
    Latest,
    /// Require a committed position; the lane stops if there is none.
    LastCommitted,
}

/// What stop does to a delivery that is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Let it finish and record its outcome.
    #[default]
    Drain,
    /// Cancel it. Nothing is committed; the batch will be redelivered.
    Abandon,
}

/// Settings shared by every lane of one consumer.
#[derive(Debug, Clone)]
pub struct LaneConfig {
    pub group: String,
    pub batch_size: usize,
    pub fetch_timeout: Duration,
    pub idle_backoff: Duration,
    /// Pause before each redelivery of a failed batch.
    pub retry_policy: RetryPolicy,
    pub auto_commit: bool,
    pub start_position: StartPosition,
    pub shutdown_policy: ShutdownPolicy,
    pub drain_timeout: Option<Duration>,
}

impl LaneConfig {
    pub fn from_consumer_config(config: &ConsumerConfig) -> Self {
        Self {
            group: config.group.clone(),
            batch_size: config.batch_size,
            fetch_timeout: config.fetch_timeout(),
            idle_backoff: config.idle_backoff(),
            retry_policy: RetryPolicy::fixed(
                config.max_reconsume_times as usize,
                config.retry_backoff(),
            ),
            auto_commit: config.auto_commit,
            start_position: config.start_position,
            shutdown_policy: config.shutdown_policy,
            drain_timeout: config.drain_timeout(),
        }
    }
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self::from_consumer_config(&ConsumerConfig::default())
    }
}

/// Counters one lane keeps about itself.
#[derive(Debug, Default)]
pub struct LaneStats {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    batches: AtomicU64,
    messages: AtomicU64,
    retries: AtomicU64,
    fatal: AtomicU64,
    skipped: AtomicU64,
}

impl LaneStats {
    fn begin_delivery(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn end_delivery(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Point-in-time copy of one lane's counters and position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneStatsSnapshot {
    pub partition: Partition,
    /// Highest number of batches ever delivered at the same time. Never
    /// above 1.
    pub max_in_flight: usize,
    /// Batches that completed with `Success`.
    pub delivered_batches: u64,
    pub delivered_messages: u64,
    pub retries: u64,
    pub fatal_batches: u64,
    /// Messages skipped by the tag filter.
    pub filtered_messages: u64,
    /// Next position the lane will fetch from, once resolved.
    pub position: Option<u64>,
    pub committed: Option<u64>,
}

#[derive(Debug, Default)]
struct PositionState {
    next: Option<u64>,
    committed: Option<u64>,
}

/// Worker permit that keeps the active-lanes gauge in step.
struct ActivePermit {
    _permit: OwnedSemaphorePermit,
    group: Arc<str>,
}

impl ActivePermit {
    fn new(permit: OwnedSemaphorePermit, group: Arc<str>) -> Self {
        metrics::CONSUMER_LANES_ACTIVE
            .with_label_values(&[&*group])
            .inc();
        Self {
            _permit: permit,
            group,
        }
    }
}

impl Drop for ActivePermit {
    fn drop(&mut self) {
        metrics::CONSUMER_LANES_ACTIVE
            .with_label_values(&[&*self.group])
            .dec();
    }
}

/// A batch to deliver and where the lane resumes once it succeeds.
struct Redelivery {
    batch: ConsumptionBatch,
    next_position: u64,
    attempt: u32,
}

struct Lane {
    partition: Partition,
    transport: Arc<dyn Transport>,
    processor: BatchProcessor,
    filter: TagFilter,
    config: Arc<LaneConfig>,
    group: Arc<str>,
    permits: Arc<Semaphore>,
    state: watch::Sender<LaneState>,
    shutdown: watch::Receiver<bool>,
    stats: Arc<LaneStats>,
    position: Arc<Mutex<PositionState>>,
}

impl Lane {
    async fn run(self) {
        debug!(partition = %self.partition, group = %self.group, "Lane started");

        if let Some(start) = self.resolve_start().await {
            self.position.lock().await.next = Some(start);
            self.publish_position(start);
            self.consume_from(start).await;
        }

        self.state.send_replace(LaneState::Stopped);
        debug!(partition = %self.partition, group = %self.group, "Lane stopped");
    }

    async fn consume_from(&self, mut position: u64) {
        let mut pending: Option<Redelivery> = None;

        loop {
            if self.is_stopping() {
                return;
            }
            self.state.send_replace(LaneState::Idle);

            let permit = {
                let mut shutdown = self.shutdown.clone();
                tokio::select! {
                    permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                        Ok(p) => ActivePermit::new(p, Arc::clone(&self.group)),
                        Err(_) => return,
                    },
                    _ = wait_for_stop(&mut shutdown) => return,
                }
            };

            let Redelivery {
                mut batch,
                next_position,
                attempt,
            } = match pending.take() {
                Some(redelivery) => redelivery,
                None => {
                    self.state.send_replace(LaneState::Fetching);
                    match self.fetch(position).await {
                        FetchResult::Batch(redelivery) => redelivery,
                        FetchResult::Skipped(next) => {
                            drop(permit);
                            position = next;
                            self.advance(next).await;
                            continue;
                        }
                        FetchResult::Empty => {
                            drop(permit);
                            if !self.pause(self.config.idle_backoff).await {
                                return;
                            }
                            continue;
                        }
                        FetchResult::Stopping => return,
                    }
                }
            };

            self.state.send_replace(LaneState::Delivering);
            self.stats.begin_delivery();
            let outcome = self.deliver(&batch, attempt).await;
            self.stats.end_delivery();
            drop(permit);

            let Some(outcome) = outcome else {
                warn!(
                    partition = %self.partition,
                    first_offset = batch.first_offset(),
                    "Delivery abandoned at shutdown; batch will be redelivered"
                );
                return;
            };

            metrics::CONSUMER_BATCH_OUTCOMES_TOTAL
                .with_label_values(&[self.partition.topic(), &*self.group, outcome.as_str()])
                .inc();

            match outcome {
                Outcome::Success => {
                    self.stats.batches.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .messages
                        .fetch_add(batch.len() as u64, Ordering::Relaxed);
                    metrics::CONSUMER_MESSAGES_TOTAL
                        .with_label_values(&[self.partition.topic(), &*self.group])
                        .inc_by(batch.len() as u64);
                    position = next_position;
                    self.advance(position).await;
                }
                Outcome::Retry => {
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    let err = ClientError::Retry {
                        partition: self.partition.to_string(),
                        offset: batch.first_offset(),
                        attempt: attempt + 1,
                    };
                    debug!(error = %err, "Scheduling redelivery");

                    batch.set_reconsume_times(attempt + 1);
                    pending = Some(Redelivery {
                        batch,
                        next_position,
                        attempt: attempt + 1,
                    });

                    self.state.send_replace(LaneState::Idle);
                    let backoff = self.config.retry_policy.backoff(attempt as usize);
                    if !self.pause(backoff).await {
                        return;
                    }
                }
                Outcome::Fatal => {
                    self.stats.fatal.fetch_add(1, Ordering::Relaxed);
                    let err = ClientError::Fatal {
                        partition: self.partition.to_string(),
                        offset: batch.first_offset(),
                        attempts: attempt + 1,
                    };

                    match self.processor.mode() {
                        ConsumeMode::Orderly => {
                            // Skipping would let later messages overtake this batch.
                            error!(error = %err, "Stopping orderly lane");
                            return;
                        }
                        ConsumeMode::Concurrent => {
                            error!(error = %err, "Skipping batch");
                            position = next_position;
                            self.advance(position).await;
                        }
                    }
                }
            }
        }
    }

    /// Committed position, else the configured start. `None` stops the lane.
    async fn resolve_start(&self) -> Option<u64> {
        loop {
            if self.is_stopping() {
                return None;
            }

            match self.try_resolve_start().await {
                Ok(start) => return start,
                Err(e) => {
                    warn!(partition = %self.partition, error = %e, "Cannot resolve start position");
                    if !self.pause(self.config.idle_backoff).await {
                        return None;
                    }
                }
            }
        }
    }

    async fn try_resolve_start(&self) -> Result<Option<u64>> {
        if let Some(committed) = self
            .transport
            .committed_position(&self.group, &self.partition)
            .await?
        {
            self.position.lock().await.committed = Some(committed);
            info!(partition = %self.partition, position = committed, "Resuming from committed position");
            return Ok(Some(committed));
        }

        let start = match self.config.start_position {
            StartPosition::Earliest => Some(self.transport.bounds(&self.partition).await?.earliest),
            StartPosition::Latest => Some(self.transport.bounds(&self.partition).await?.latest),
            StartPosition::LastCommitted => {
                error!(
                    partition = %self.partition,
                    group = %self.group,
                    "No committed position and start_position is last_committed"
                );
                None
            }
        };

        if let Some(position) = start {
            info!(partition = %self.partition, position, "Starting lane");
        }
        Ok(start)
    }

    async fn fetch(&self, position: u64) -> FetchResult {
        let fetch = tokio::time::timeout(
            self.config.fetch_timeout,
            self.transport
                .fetch(&self.partition, position, self.config.batch_size),
        );

        let mut shutdown = self.shutdown.clone();
        let fetched = tokio::select! {
            r = fetch => r,
            _ = wait_for_stop(&mut shutdown) => return FetchResult::Stopping,
        };

        let messages = match fetched {
            Ok(Ok(messages)) => messages,
            Ok(Err(e)) => {
                warn!(partition = %self.partition, position, error = %e, "Fetch failed");
                return FetchResult::Empty;
            }
            Err(_) => {
                let err = ClientError::Timeout(self.config.fetch_timeout);
                warn!(partition = %self.partition, position, error = %err, "Fetch timed out");
                return FetchResult::Empty;
            }
        };

        let Some(last) = messages.last() else {
            return FetchResult::Empty;
        };
        let next_position = last.offset + 1;

        let total = messages.len();
        let matching: Vec<_> = messages
            .into_iter()
            .filter(|m| self.filter.matches(m.tag()))
            .collect();
        self.stats
            .skipped
            .fetch_add((total - matching.len()) as u64, Ordering::Relaxed);

        if matching.is_empty() {
            return FetchResult::Skipped(next_position);
        }

        match ConsumptionBatch::new(matching) {
            Ok(batch) => FetchResult::Batch(Redelivery {
                batch,
                next_position,
                attempt: 0,
            }),
            Err(e) => {
                error!(partition = %self.partition, error = %e, "Transport returned a malformed batch");
                FetchResult::Empty
            }
        }
    }

    /// Run the processor under the shutdown policy. `None` means abandoned.
    async fn deliver(&self, batch: &ConsumptionBatch, attempt: u32) -> Option<Outcome> {
        let processing = self.processor.process(batch, attempt);
        tokio::pin!(processing);

        let mut shutdown = self.shutdown.clone();
        match (self.config.shutdown_policy, self.config.drain_timeout) {
            (ShutdownPolicy::Drain, None) => Some(processing.await),
            (ShutdownPolicy::Drain, Some(limit)) => {
                tokio::select! {
                    outcome = &mut processing => Some(outcome),
                    _ = wait_for_stop(&mut shutdown) => {
                        tokio::time::timeout(limit, &mut processing).await.ok()
                    }
                }
            }
            (ShutdownPolicy::Abandon, _) => {
                tokio::select! {
                    outcome = &mut processing => Some(outcome),
                    _ = wait_for_stop(&mut shutdown) => None,
                }
            }
        }
    }

    async fn advance(&self, next: u64) {
        self.position.lock().await.next = Some(next);
        self.publish_position(next);

        if self.config.auto_commit {
            match self.transport.commit(&self.group, &self.partition, next).await {
                Ok(()) => self.position.lock().await.committed = Some(next),
                Err(e) => warn!(partition = %self.partition, position = next, error = %e, "Commit failed"),
            }
        }
    }

    fn publish_position(&self, position: u64) {
        let index = self.partition.index().to_string();
        metrics::CONSUMER_POSITION
            .with_label_values(&[self.partition.topic(), index.as_str(), &*self.group])
            .set(position as i64);
    }

    /// Sleep unless shutdown comes first. Returns false on shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = wait_for_stop(&mut shutdown) => false,
        }
    }

    fn is_stopping(&self) -> bool {
        *self.shutdown.borrow()
    }
}

enum FetchResult {
    Batch(Redelivery),
    /// Everything fetched was filtered out; resume at the given position.
    Skipped(u64),
    Empty,
    Stopping,
}

/// Resolves once stop was requested or the scheduler is gone.
async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

struct LaneHandle {
    partition: Partition,
    state: watch::Receiver<LaneState>,
    stats: Arc<LaneStats>,
    position: Arc<Mutex<PositionState>>,
    join: JoinHandle<()>,
}

/// Owns the lanes of one consumer.
pub struct PartitionScheduler {
    transport: Arc<dyn Transport>,
    config: Arc<LaneConfig>,
    group: Arc<str>,
    permits: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    lanes: Vec<LaneHandle>,
}

impl PartitionScheduler {
    /// # Errors
    ///
    /// `ConfigError` when `max_active_lanes` or `batch_size` is zero.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: LaneConfig,
        max_active_lanes: usize,
    ) -> Result<Self> {
        if max_active_lanes == 0 {
            return Err(ClientError::ConfigError(
                "max_active_lanes must be positive".to_string(),
            ));
        }
        if config.batch_size == 0 {
            return Err(ClientError::ConfigError(
                "batch_size must be positive".to_string(),
            ));
        }

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            transport,
            group: Arc::from(config.group.as_str()),
            config: Arc::new(config),
            permits: Arc::new(Semaphore::new(max_active_lanes)),
            shutdown,
            lanes: Vec::new(),
        })
    }

    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    /// Start a lane for `partition`. A partition already running is left alone.
    pub fn spawn_lane(&mut self, partition: Partition, processor: BatchProcessor, filter: TagFilter) {
        if self.lanes.iter().any(|l| l.partition == partition) {
            return;
        }

        let (state_tx, state_rx) = watch::channel(LaneState::Idle);
        let stats = Arc::new(LaneStats::default());
        let position = Arc::new(Mutex::new(PositionState::default()));

        let lane = Lane {
            partition: partition.clone(),
            transport: Arc::clone(&self.transport),
            processor,
            filter,
            config: Arc::clone(&self.config),
            group: Arc::clone(&self.group),
            permits: Arc::clone(&self.permits),
            state: state_tx,
            shutdown: self.shutdown.subscribe(),
            stats: Arc::clone(&stats),
            position: Arc::clone(&position),
        };

        let join = tokio::spawn(lane.run());
        self.lanes.push(LaneHandle {
            partition,
            state: state_rx,
            stats,
            position,
            join,
        });
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn lane_states(&self) -> Vec<(Partition, LaneState)> {
        self.lanes
            .iter()
            .map(|l| (l.partition.clone(), *l.state.borrow()))
            .collect()
    }

    /// State updates for one lane.
    pub fn watch_lane(&self, partition: &Partition) -> Option<watch::Receiver<LaneState>> {
        self.lanes
            .iter()
            .find(|l| &l.partition == partition)
            .map(|l| l.state.clone())
    }

    pub async fn lane_stats(&self) -> Vec<LaneStatsSnapshot> {
        let mut out = Vec::with_capacity(self.lanes.len());
        for lane in &self.lanes {
            let position = lane.position.lock().await;
            out.push(LaneStatsSnapshot {
                partition: lane.partition.clone(),
                max_in_flight: lane.stats.max_in_flight.load(Ordering::SeqCst),
                delivered_batches: lane.stats.batches.load(Ordering::Relaxed),
                delivered_messages: lane.stats.messages.load(Ordering::Relaxed),
                retries: lane.stats.retries.load(Ordering::Relaxed),
                fatal_batches: lane.stats.fatal.load(Ordering::Relaxed),
                filtered_messages: lane.stats.skipped.load(Ordering::Relaxed),
                position: position.next,
                committed: position.committed,
            });
        }
        out
    }

    /// Commit every lane position that moved since its last commit.
    pub async fn commit(&self) -> Result<()> {
        for lane in &self.lanes {
            let mut position = lane.position.lock().await;
            let Some(next) = position.next else { continue };
            if position.committed == Some(next) {
                continue;
            }
            self.transport
                .commit(&self.config.group, &lane.partition, next)
                .await?;
            position.committed = Some(next);
            debug!(partition = %lane.partition, position = next, "Committed position");
        }
        Ok(())
    }

    /// Signal every lane to stop without waiting for them.
    pub fn signal_stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Stop every lane, wait for them under the shutdown policy, then commit
    /// final positions.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.signal_stop();

        for lane in &mut self.lanes {
            if let Err(e) = (&mut lane.join).await {
                if e.is_panic() {
                    error!(partition = %lane.partition, "Lane task panicked");
                }
            }
        }

        let result = self.commit().await;
        info!(group = %self.config.group, lanes = self.lanes.len(), "Scheduler stopped");
        result
    }

    /// Hard-stop every lane without waiting or committing.
    pub fn abort(&self) {
        self.signal_stop();
        for lane in &self.lanes {
            lane.join.abort();
        }
    }
}

impl Drop for PartitionScheduler {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
