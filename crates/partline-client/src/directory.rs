//! Partition Directory
//!
//! Caches each topic's ordered partition list so routing never waits on the
//! broker after the first send to a topic.
//!
//! ## Snapshot Model
//!
//! The cache is a copy-on-write snapshot: `RwLock<Arc<HashMap<..>>>`. Readers
//! hold the lock only long enough to clone the `Arc`, then look up the topic
//! with no lock held. Writers build a new map from the old one and swap it in.
//! A reader therefore always sees a complete, consistent map, and a routing
//! decision is never made against a half-updated partition list.
//!
//! ## Refresh
//!
//! `spawn_refresh_task` re-resolves every cached topic on an interval. Failed
//! refreshes are logged and the stale entry is kept; a producer can keep
//! sending through a short broker outage.

use crate::error::{ClientError, Result};
use crate::transport::{Transport, TransportError};
use partline_core::Partition;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Snapshot = Arc<HashMap<String, Arc<[Partition]>>>;

pub struct PartitionDirectory {
    transport: Arc<dyn Transport>,
    snapshot: RwLock<Snapshot>,
}

impl PartitionDirectory {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            snapshot: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Ordered, non-empty partition list of `topic`.
    ///
    /// Served from the snapshot when cached; resolved through the transport
    /// on a miss.
    ///
    /// # Errors
    ///
    /// - `UnknownTopic` if the transport knows no partitions for `topic`
    /// - `Transport` for any other transport failure
    pub async fn partitions(&self, topic: &str) -> Result<Arc<[Partition]>> {
        if let Some(cached) = self.current().await.get(topic) {
            return Ok(Arc::clone(cached));
        }
        self.refresh(topic).await
    }

    /// Re-resolve `topic` and install the result.
    pub async fn refresh(&self, topic: &str) -> Result<Arc<[Partition]>> {
        let partitions = self.resolve(topic).await?;
        self.install(topic, Arc::clone(&partitions)).await;
        Ok(partitions)
    }

    /// Re-resolve every cached topic. Failures keep the stale entry.
    pub async fn refresh_all(&self) {
        let topics: Vec<String> = self.current().await.keys().cloned().collect();

        for topic in topics {
            match self.refresh(&topic).await {
                Ok(partitions) => {
                    debug!(topic = %topic, count = partitions.len(), "Refreshed partitions");
                }
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Failed to refresh partitions");
                }
            }
        }
    }

    /// Topics currently held in the snapshot.
    pub async fn cached_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.current().await.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Periodically refresh every cached topic until the handle is aborted.
    pub fn spawn_refresh_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let directory = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                directory.refresh_all().await;
            }
        })
    }

    async fn current(&self) -> Snapshot {
        Arc::clone(&*self.snapshot.read().await)
    }

    async fn resolve(&self, topic: &str) -> Result<Arc<[Partition]>> {
        let partitions = self
            .transport
            .resolve_partitions(topic)
            .await
            .map_err(|e| match e {
                TransportError::UnknownTopic(t) => ClientError::UnknownTopic(t),
                other => ClientError::Transport(other),
            })?;

        if partitions.is_empty() {
            return Err(ClientError::UnknownTopic(topic.to_string()));
        }
        Ok(partitions.into())
    }

    /// Build the next map off the lock, then swap it in. If another install
    /// swapped first, rebuild from that one so its entry is not lost.
    async fn install(&self, topic: &str, partitions: Arc<[Partition]>) {
        let mut base = self.current().await;
        loop {
            let mut next: HashMap<_, _> = (*base).clone();
            next.insert(topic.to_string(), Arc::clone(&partitions));
            let next = Arc::new(next);

            let mut guard = self.snapshot.write().await;
            if Arc::ptr_eq(&*guard, &base) {
                *guard = next;
                return;
            }
            base = Arc::clone(&*guard);
        }
    }
}
