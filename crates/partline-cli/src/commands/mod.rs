//! Command implementations.
//!
//! Every command runs against its own in-process [`MemoryTransport`]. Nothing
//! survives between invocations, so the consume commands publish the messages
//! they read before they subscribe.

pub mod consume;
pub mod demo;
pub mod produce;

pub use consume::ConsumeCommands;
pub use demo::DemoCommands;
pub use produce::ProduceCommands;

use crate::config::Config;
use anyhow::{Context, Result};
use partline_client::{DelayLevels, MemoryTransport, Producer, Transport};
use std::sync::Arc;

/// Broker with every demo topic created.
pub async fn setup_transport(config: &Config) -> Result<Arc<MemoryTransport>> {
    let levels =
        DelayLevels::parse(&config.demo.delay_levels).context("Invalid delay level table")?;
    let transport = Arc::new(MemoryTransport::with_delay_levels(levels));

    for topic in config.demo.topics() {
        transport
            .create_topic(topic, config.demo.partitions)
            .await
            .with_context(|| format!("Failed to create topic {}", topic))?;
    }
    Ok(transport)
}

pub async fn start_producer(config: &Config, transport: &Arc<MemoryTransport>) -> Result<Producer> {
    Producer::builder()
        .from_config(&config.client.producer)
        .transport(transport.clone() as Arc<dyn Transport>)
        .start()
        .await
        .context("Failed to start producer")
}
