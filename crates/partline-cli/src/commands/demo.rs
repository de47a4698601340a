//! End-to-end demos.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use partline_client::{
    CompletionLatch, ConsumeMode, HandlerError, LatchOutcome, PushConsumer, StartPosition,
    Transport,
};
use partline_core::{ConsumedMessage, OrderStep};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::produce;
use crate::config::Config;

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum DemoCommands {
    /// Publish the sample orders, consume them in order and check every
    /// order arrived step by step
    Orderly {
        #[arg(long, default_value = "10000")]
        wait_ms: u64,
    },
}

pub async fn handle_demo_command(command: DemoCommands, config: &Config) -> Result<()> {
    match command {
        DemoCommands::Orderly { wait_ms } => run_orderly(config, Duration::from_millis(wait_ms)).await,
    }
}

async fn run_orderly(config: &Config, wait: Duration) -> Result<()> {
    let transport = super::setup_transport(config).await?;
    let producer = super::start_producer(config, &transport).await?;
    let topic = config.demo.orderly_topic.as_str();

    let sent = produce::send_orderly(&producer, topic).await?;

    let received: Arc<Mutex<Vec<(OrderStep, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let latch = CompletionLatch::new(sent);
    let (handler_received, handler_latch) = (received.clone(), latch.clone());

    let consumer = PushConsumer::builder()
        .from_config(&config.client.consumer)
        .transport(transport.clone() as Arc<dyn Transport>)
        .start_position(StartPosition::Earliest)
        .subscribe(
            topic,
            "TagA || TagC || TagD",
            ConsumeMode::Orderly,
            move |msgs: Vec<ConsumedMessage>| {
                let received = handler_received.clone();
                let latch = handler_latch.clone();
                async move {
                    for m in &msgs {
                        let step: OrderStep = match serde_json::from_slice(m.body()) {
                            Ok(step) => step,
                            Err(e) => return Err::<(), HandlerError>(Box::new(e)),
                        };
                        let worker = std::thread::current()
                            .name()
                            .unwrap_or("unnamed")
                            .to_string();
                        println!(
                            "  lane {} offset {} on {}: {}",
                            m.partition, m.offset, worker, step
                        );
                        if let Ok(mut received) = received.lock() {
                            received.push((step, m.partition.index()));
                        }
                        latch.count_down();
                    }
                    Ok::<(), HandlerError>(())
                }
            },
        )
        .start()
        .await
        .context("Failed to start consumer")?;

    let outcome = latch.wait(wait).await;
    let stats = consumer.lane_stats().await;
    consumer.stop().await.context("Failed to stop consumer")?;
    producer
        .shutdown()
        .await
        .context("Failed to shut producer down")?;

    if let LatchOutcome::TimedOut { remaining } = outcome {
        bail!("{} of {} order steps never arrived", remaining, sent);
    }

    println!();
    for lane in stats.iter().filter(|s| s.delivered_messages > 0) {
        println!(
            "  lane {}: {} messages in {} batches, committed at {}",
            lane.partition,
            lane.delivered_messages,
            lane.delivered_batches,
            lane.committed
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    let received = received
        .lock()
        .map(|r| r.clone())
        .map_err(|_| anyhow::anyhow!("Handler panicked while recording deliveries"))?;
    check_order(&received)?;
    println!("Every order was consumed step by step on a single partition");
    Ok(())
}

/// Each order's steps arrived in sequence and on one partition.
fn check_order(received: &[(OrderStep, u32)]) -> Result<()> {
    let mut progress: HashMap<i64, (u32, u32)> = HashMap::new();

    for (step, partition) in received {
        match progress.get(&step.order_id) {
            None if step.seq != 0 => bail!("{} arrived before earlier steps", step),
            Some((seq, _)) if step.seq != seq + 1 => {
                bail!("{} arrived after step {}", step, seq)
            }
            Some((_, p)) if p != partition => {
                bail!("order {} moved from partition {} to {}", step.order_id, p, partition)
            }
            _ => {}
        }
        progress.insert(step.order_id, (step.seq, *partition));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_order_accepts_sample() {
        let received: Vec<(OrderStep, u32)> = OrderStep::sample_orders()
            .into_iter()
            .map(|s| {
                let p = (s.order_id % 4) as u32;
                (s, p)
            })
            .collect();
        assert!(check_order(&received).is_ok());
    }

    #[test]
    fn test_check_order_rejects_reordering() {
        let received = vec![
            (OrderStep::new(1, 0, "created"), 0),
            (OrderStep::new(1, 2, "shipped"), 0),
        ];
        assert!(check_order(&received).is_err());
    }

    #[test]
    fn test_check_order_rejects_partition_change() {
        let received = vec![
            (OrderStep::new(1, 0, "created"), 0),
            (OrderStep::new(1, 1, "paid"), 3),
        ];
        assert!(check_order(&received).is_err());
    }
}
