//! Produce commands
//!
//! One command per send mode:
//! - `sync`: wait for every acknowledgment
//! - `async`: report acknowledgments from callbacks, then wait for all of them
//! - `oneway`: hand messages over without asking for an acknowledgment
//! - `orderly`: sample order steps, pinned to a partition by order id
//! - `delay`: messages released by the broker after their delay level

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use partline_client::{CompletionLatch, LatchOutcome, Producer};
use partline_core::{Message, OrderStep, SendResult};
use std::time::Duration;

use crate::config::Config;

/// Tags cycled over the ordered sample.
pub const ORDER_TAGS: [&str; 3] = ["TagA", "TagC", "TagD"];

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ProduceCommands {
    /// Send and wait for each acknowledgment
    Sync {
        #[arg(short, long, default_value = "10")]
        count: usize,
    },
    /// Send without waiting; acknowledgments arrive on callbacks
    Async {
        #[arg(short, long, default_value = "10")]
        count: usize,
        /// How long to wait for every callback
        #[arg(long, default_value = "5000")]
        wait_ms: u64,
    },
    /// Send without soliciting an acknowledgment
    Oneway {
        #[arg(short, long, default_value = "10")]
        count: usize,
    },
    /// Send the sample order steps, keyed by order id
    Orderly,
    /// Send delayed messages
    Delay {
        #[arg(short, long, default_value = "10")]
        count: usize,
        /// Delay level (1 is the shortest)
        #[arg(short, long, default_value = "1")]
        level: i32,
    },
}

pub async fn handle_produce_command(command: ProduceCommands, config: &Config) -> Result<()> {
    let transport = super::setup_transport(config).await?;
    let producer = super::start_producer(config, &transport).await?;
    let demo = &config.demo;

    match command {
        ProduceCommands::Sync { count } => send_sync(&producer, &demo.simple_topic, count).await?,
        ProduceCommands::Async { count, wait_ms } => {
            send_async(
                &producer,
                &demo.simple_topic,
                count,
                Duration::from_millis(wait_ms),
            )
            .await?
        }
        ProduceCommands::Oneway { count } => {
            send_oneway(&producer, &demo.simple_topic, count).await?
        }
        ProduceCommands::Orderly => {
            send_orderly(&producer, &demo.orderly_topic).await?;
        }
        ProduceCommands::Delay { count, level } => {
            send_delayed(&producer, &demo.delay_topic, count, level).await?;
            println!(
                "{} messages waiting on the broker",
                transport.scheduled_count().await
            );
        }
    }

    producer
        .shutdown()
        .await
        .context("Failed to shut producer down")?;
    Ok(())
}

fn simple_message(topic: &str, i: usize) -> Message {
    Message::new(topic, format!("Hello partline {}", i))
        .with_tag("TagA")
        .with_keys(format!("KEY{}", i))
}

fn print_result(i: usize, result: &SendResult) {
    let offset = result
        .offset
        .map(|o| o.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  #{:<3} {} msg_id={} partition={} offset={}",
        i, result.status, result.msg_id, result.partition, offset
    );
}

pub async fn send_sync(producer: &Producer, topic: &str, count: usize) -> Result<()> {
    println!("Sending {} messages to {} (sync)", count, topic);
    for i in 0..count {
        let result = producer
            .send(simple_message(topic, i))
            .await
            .with_context(|| format!("Failed to send message {}", i))?;
        print_result(i, &result);
    }
    Ok(())
}

pub async fn send_async(
    producer: &Producer,
    topic: &str,
    count: usize,
    wait: Duration,
) -> Result<()> {
    println!("Sending {} messages to {} (async)", count, topic);
    let latch = CompletionLatch::new(count);

    for i in 0..count {
        let latch = latch.clone();
        producer
            .send_async_with_callback(simple_message(topic, i), move |result| {
                match result {
                    Ok(r) => print_result(i, &r),
                    Err(e) => println!("  #{:<3} failed: {}", i, e),
                }
                latch.count_down();
            })
            .await
            .with_context(|| format!("Failed to submit message {}", i))?;
    }

    match latch.wait(wait).await {
        LatchOutcome::Completed => {
            println!("All {} callbacks reported", count);
            Ok(())
        }
        LatchOutcome::TimedOut { remaining } => {
            bail!("{} of {} sends did not report within {:?}", remaining, count, wait)
        }
    }
}

pub async fn send_oneway(producer: &Producer, topic: &str, count: usize) -> Result<()> {
    println!("Sending {} messages to {} (one-way)", count, topic);
    for i in 0..count {
        producer
            .send_oneway(simple_message(topic, i))
            .await
            .with_context(|| format!("Failed to submit message {}", i))?;
    }
    println!("Submitted {} messages", count);
    Ok(())
}

/// Send every sample step; returns how many were sent.
pub async fn send_orderly(producer: &Producer, topic: &str) -> Result<usize> {
    let steps = OrderStep::sample_orders();
    println!("Sending {} order steps to {} (ordered)", steps.len(), topic);

    for (i, step) in steps.iter().enumerate() {
        let body = serde_json::to_vec(step).context("Failed to encode order step")?;
        let msg = Message::new(topic, body)
            .with_tag(ORDER_TAGS[i % ORDER_TAGS.len()])
            .with_keys(format!("KEY{}", i));

        let result = producer
            .send_ordered(msg, step.order_id)
            .await
            .with_context(|| format!("Failed to send {}", step))?;
        println!("  {} -> {}", step, result.partition);
    }
    Ok(steps.len())
}

pub async fn send_delayed(producer: &Producer, topic: &str, count: usize, level: i32) -> Result<()> {
    println!(
        "Sending {} messages to {} (delay level {})",
        count, topic, level
    );
    for i in 0..count {
        let msg = Message::new(topic, format!("Hello scheduled message {}", i))
            .with_delay_level(level);
        let result = producer
            .send(msg)
            .await
            .with_context(|| format!("Failed to send delayed message {}", i))?;
        print_result(i, &result);
    }
    Ok(())
}
