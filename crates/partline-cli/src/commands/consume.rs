//! Consume commands
//!
//! Each command publishes its sample messages, subscribes a push consumer and
//! prints every delivery until all of them arrived or the wait runs out.

use anyhow::{Context, Result};
use clap::Subcommand;
use partline_client::{
    CompletionLatch, ConsumeMode, HandlerError, LatchOutcome, MemoryTransport, PushConsumer,
    StartPosition, Transport,
};
use partline_core::ConsumedMessage;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::produce;
use crate::config::Config;

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConsumeCommands {
    /// Consume the simple topic with concurrent delivery
    Concurrent {
        #[arg(short, long, default_value = "10")]
        count: usize,
        #[arg(long, default_value = "10000")]
        wait_ms: u64,
    },
    /// Consume the order steps one partition at a time, in order
    Orderly {
        #[arg(long, default_value = "10000")]
        wait_ms: u64,
    },
    /// Consume delayed messages once the broker releases them
    Delay {
        #[arg(short, long, default_value = "10")]
        count: usize,
        #[arg(short, long, default_value = "1")]
        level: i32,
        #[arg(long, default_value = "15000")]
        wait_ms: u64,
    },
}

pub async fn handle_consume_command(command: ConsumeCommands, config: &Config) -> Result<()> {
    let transport = super::setup_transport(config).await?;
    let producer = super::start_producer(config, &transport).await?;
    let demo = &config.demo;

    let received = match command {
        ConsumeCommands::Concurrent { count, wait_ms } => {
            produce::send_sync(&producer, &demo.simple_topic, count).await?;
            let subscription = Subscription {
                topic: &demo.simple_topic,
                expression: "*",
                mode: ConsumeMode::Concurrent,
                expected: count,
                wait: Duration::from_millis(wait_ms),
            };
            run_consumer(config, &transport, subscription, print_message).await?
        }
        ConsumeCommands::Orderly { wait_ms } => {
            let sent = produce::send_orderly(&producer, &demo.orderly_topic).await?;
            let subscription = Subscription {
                topic: &demo.orderly_topic,
                expression: "TagA || TagC || TagD",
                mode: ConsumeMode::Orderly,
                expected: sent,
                wait: Duration::from_millis(wait_ms),
            };
            run_consumer(config, &transport, subscription, print_message).await?
        }
        ConsumeCommands::Delay {
            count,
            level,
            wait_ms,
        } => {
            produce::send_delayed(&producer, &demo.delay_topic, count, level).await?;
            let subscription = Subscription {
                topic: &demo.delay_topic,
                expression: "*",
                mode: ConsumeMode::Concurrent,
                expected: count,
                wait: Duration::from_millis(wait_ms),
            };
            run_consumer(config, &transport, subscription, print_delayed).await?
        }
    };

    producer
        .shutdown()
        .await
        .context("Failed to shut producer down")?;
    println!("Received {} messages", received);
    Ok(())
}

pub struct Subscription<'a> {
    pub topic: &'a str,
    pub expression: &'a str,
    pub mode: ConsumeMode,
    pub expected: usize,
    pub wait: Duration,
}

/// Consume from the start of the topic until `expected` messages arrived or
/// `wait` elapsed. Returns how many arrived.
///
/// The topics are fresh, so the configured start position is overridden with
/// `Earliest`.
pub async fn run_consumer(
    config: &Config,
    transport: &Arc<MemoryTransport>,
    subscription: Subscription<'_>,
    print: fn(&ConsumedMessage),
) -> Result<usize> {
    let latch = CompletionLatch::new(subscription.expected);
    let handler_latch = latch.clone();

    let consumer = PushConsumer::builder()
        .from_config(&config.client.consumer)
        .transport(transport.clone() as Arc<dyn Transport>)
        .start_position(StartPosition::Earliest)
        .subscribe(
            subscription.topic,
            subscription.expression,
            subscription.mode,
            move |msgs: Vec<ConsumedMessage>| {
                let latch = handler_latch.clone();
                async move {
                    for m in &msgs {
                        print(m);
                        latch.count_down();
                    }
                    Ok::<(), HandlerError>(())
                }
            },
        )
        .start()
        .await
        .context("Failed to start consumer")?;

    println!(
        "Consuming {} [{}] ({} mode, group {})",
        subscription.topic,
        subscription.expression,
        subscription.mode,
        consumer.group()
    );

    let outcome = latch.wait(subscription.wait).await;
    consumer.stop().await.context("Failed to stop consumer")?;

    match outcome {
        LatchOutcome::Completed => Ok(subscription.expected),
        LatchOutcome::TimedOut { remaining } => {
            warn!(
                topic = subscription.topic,
                remaining, "Stopped before every message arrived"
            );
            Ok(subscription.expected - remaining)
        }
    }
}

fn print_message(m: &ConsumedMessage) {
    println!(
        "  {} offset={} tag={} reconsume={} body={}",
        m.partition,
        m.offset,
        m.tag().unwrap_or("-"),
        m.reconsume_times,
        String::from_utf8_lossy(m.body())
    );
}

fn print_delayed(m: &ConsumedMessage) {
    let waited = chrono::Utc::now().timestamp_millis() - m.born_timestamp;
    println!(
        "  {} msg_id={} received {}ms after it was sent",
        m.partition, m.msg_id, waited
    );
}
