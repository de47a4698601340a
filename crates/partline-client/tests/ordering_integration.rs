//! Integration tests for ordered delivery.
//!
//! These tests run a producer and a push consumer against the in-memory
//! transport and verify the end-to-end ordering contract:
//! 1. Messages sharing an ordering key land on one partition
//! 2. Each partition is consumed in send order, one batch at a time
//! 3. An orderly failure redelivers the whole batch before anything later
//! 4. A failing partition does not hold up its neighbours

use partline_client::{
    ConsumeMode, HandlerError, MemoryTransport, Producer, PushConsumer, StartPosition, Transport,
};
use partline_core::{ConsumedMessage, Message, OrderStep, Partition};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Transport with one topic of `partitions` partitions.
async fn setup_transport(topic: &str, partitions: u32) -> Arc<MemoryTransport> {
    let transport = Arc::new(MemoryTransport::new());
    transport.create_topic(topic, partitions).await.unwrap();
    transport
}

async fn start_producer(transport: &Arc<MemoryTransport>) -> Producer {
    Producer::builder()
        .transport(transport.clone() as Arc<dyn Transport>)
        .group("ordering-test-producer")
        .start()
        .await
        .unwrap()
}

/// Poll `done` until it holds or ten seconds pass.
async fn wait_until(what: &str, done: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn body_text(message: &ConsumedMessage) -> String {
    String::from_utf8_lossy(message.body()).into_owned()
}

#[tokio::test]
async fn test_order_steps_consumed_in_send_order() {
    let transport = setup_transport("orderly-topic", 4).await;
    let producer = start_producer(&transport).await;

    for step in OrderStep::sample_orders() {
        let body = format!("{}:{}", step.order_id, step.seq);
        producer
            .send_ordered(Message::new("orderly-topic", body), step.order_id)
            .await
            .unwrap();
    }

    let seen: Arc<Mutex<Vec<(i64, u32, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let handler_seen = seen.clone();
    let consumer = PushConsumer::builder()
        .transport(transport.clone() as Arc<dyn Transport>)
        .group("ordering-test-consumer")
        .start_position(StartPosition::Earliest)
        .idle_backoff(Duration::from_millis(10))
        .subscribe(
            "orderly-topic",
            "*",
            ConsumeMode::Orderly,
            move |msgs: Vec<ConsumedMessage>| {
                let seen = handler_seen.clone();
                async move {
                    for m in &msgs {
                        let text = body_text(m);
                        let (id, seq) = text.split_once(':').unwrap();
                        seen.lock().unwrap().push((
                            id.parse().unwrap(),
                            seq.parse().unwrap(),
                            m.partition.index(),
                        ));
                    }
                    Ok::<(), HandlerError>(())
                }
            },
        )
        .start()
        .await
        .unwrap();

    wait_until("all order steps", || seen.lock().unwrap().len() == 10).await;
    consumer.stop().await.unwrap();

    let mut last_seq: HashMap<i64, u32> = HashMap::new();
    let mut partition_of: HashMap<i64, u32> = HashMap::new();
    for (order_id, seq, partition) in seen.lock().unwrap().iter().copied() {
        if let Some(prev) = last_seq.insert(order_id, seq) {
            assert_eq!(seq, prev + 1, "order {} skipped or reordered", order_id);
        } else {
            assert_eq!(seq, 0, "order {} did not start at its first step", order_id);
        }
        let first = *partition_of.entry(order_id).or_insert(partition);
        assert_eq!(first, partition, "order {} spread over partitions", order_id);
    }
    assert_eq!(last_seq.len(), 3);
}

#[tokio::test]
async fn test_interleaved_keys_keep_per_key_order() {
    let transport = setup_transport("orders", 4).await;
    let producer = start_producer(&transport).await;

    let a1 = producer
        .send_ordered(Message::new("orders", "A1"), 1001_i64)
        .await
        .unwrap();
    let b1 = producer
        .send_ordered(Message::new("orders", "B1"), 1002_i64)
        .await
        .unwrap();
    let a2 = producer
        .send_ordered(Message::new("orders", "A2"), 1001_i64)
        .await
        .unwrap();

    assert_eq!(a1.partition.index(), 1);
    assert_eq!(b1.partition.index(), 2);
    assert_eq!(a2.partition, a1.partition);

    let log = transport.partition_log(&Partition::new("orders", 1)).await;
    let bodies: Vec<String> = log.iter().map(body_text).collect();
    assert_eq!(bodies, vec!["A1", "A2"]);

    let log = transport.partition_log(&Partition::new("orders", 2)).await;
    assert_eq!(log.len(), 1);
    assert_eq!(body_text(&log[0]), "B1");
}

#[tokio::test]
async fn test_orderly_failure_redelivers_from_batch_start() {
    let transport = setup_transport("orderly-topic", 1).await;
    let producer = start_producer(&transport).await;
    for i in 1..=5 {
        producer
            .send_ordered(Message::new("orderly-topic", format!("m{}", i)), 7_i64)
            .await
            .unwrap();
    }

    let seen: Arc<Mutex<Vec<(String, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let failed_once = Arc::new(AtomicBool::new(false));
    let handler_seen = seen.clone();
    let handler_failed = failed_once.clone();

    let consumer = PushConsumer::builder()
        .transport(transport.clone() as Arc<dyn Transport>)
        .group("orderly-retry-group")
        .start_position(StartPosition::Earliest)
        .batch_size(5)
        .idle_backoff(Duration::from_millis(10))
        .retry_backoff(Duration::from_millis(10))
        .max_reconsume_times(3)
        .subscribe(
            "orderly-topic",
            "*",
            ConsumeMode::Orderly,
            move |msgs: Vec<ConsumedMessage>| {
                let seen = handler_seen.clone();
                let failed_once = handler_failed.clone();
                async move {
                    let m = &msgs[0];
                    let text = body_text(m);
                    seen.lock().unwrap().push((text.clone(), m.reconsume_times));
                    if text == "m3" && !failed_once.swap(true, Ordering::SeqCst) {
                        return Err::<(), HandlerError>("m3 not ready".into());
                    }
                    Ok(())
                }
            },
        )
        .start()
        .await
        .unwrap();

    wait_until("redelivered batch", || seen.lock().unwrap().len() == 8).await;
    let stats = consumer.lane_stats().await;
    consumer.stop().await.unwrap();

    let seen = seen.lock().unwrap().clone();
    let bodies: Vec<&str> = seen.iter().map(|(b, _)| b.as_str()).collect();
    assert_eq!(bodies, vec!["m1", "m2", "m3", "m1", "m2", "m3", "m4", "m5"]);
    assert!(seen[..3].iter().all(|(_, times)| *times == 0));
    assert!(seen[3..].iter().all(|(_, times)| *times == 1));

    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].retries, 1);
    assert_eq!(stats[0].delivered_batches, 1);
    assert_eq!(stats[0].fatal_batches, 0);
}

#[tokio::test]
async fn test_failing_partition_does_not_block_others() {
    let transport = setup_transport("simple-topic", 2).await;
    let producer = start_producer(&transport).await;
    for i in 0..3 {
        // Numeric keys route by value: 0 -> partition 0, 1 -> partition 1.
        producer
            .send_ordered(Message::new("simple-topic", format!("p{}", i)), 0_i64)
            .await
            .unwrap();
        producer
            .send_ordered(Message::new("simple-topic", format!("q{}", i)), 1_i64)
            .await
            .unwrap();
    }

    let delivered: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let handler_delivered = delivered.clone();
    let consumer = PushConsumer::builder()
        .transport(transport.clone() as Arc<dyn Transport>)
        .group("isolation-group")
        .start_position(StartPosition::Earliest)
        .idle_backoff(Duration::from_millis(10))
        .retry_backoff(Duration::from_millis(10))
        .max_reconsume_times(1000)
        .subscribe(
            "simple-topic",
            "*",
            ConsumeMode::Concurrent,
            move |msgs: Vec<ConsumedMessage>| {
                let delivered = handler_delivered.clone();
                async move {
                    if msgs.iter().any(|m| m.partition.index() == 0) {
                        return Err::<(), HandlerError>("partition 0 is broken".into());
                    }
                    delivered
                        .lock()
                        .unwrap()
                        .extend(msgs.iter().map(body_text));
                    Ok(())
                }
            },
        )
        .start()
        .await
        .unwrap();

    wait_until("partition 1 messages", || delivered.lock().unwrap().len() == 3).await;
    let stats = consumer.lane_stats().await;
    consumer.stop().await.unwrap();

    assert_eq!(*delivered.lock().unwrap(), vec!["q0", "q1", "q2"]);

    let p0 = stats.iter().find(|s| s.partition.index() == 0).unwrap();
    assert!(p0.retries > 0);
    assert_eq!(p0.delivered_batches, 0);
    assert_eq!(p0.fatal_batches, 0);
}

#[tokio::test]
async fn test_one_batch_in_flight_per_partition() {
    let transport = setup_transport("simple-topic", 3).await;
    let producer = start_producer(&transport).await;
    for i in 0..60 {
        producer
            .send(Message::new("simple-topic", format!("m{}", i)))
            .await
            .unwrap();
    }

    let active: Arc<Mutex<HashMap<u32, usize>>> = Arc::new(Mutex::new(HashMap::new()));
    let overlapped = Arc::new(AtomicBool::new(false));
    let total = Arc::new(AtomicUsize::new(0));

    let (h_active, h_overlapped, h_total) = (active.clone(), overlapped.clone(), total.clone());
    let consumer = PushConsumer::builder()
        .transport(transport.clone() as Arc<dyn Transport>)
        .group("exclusive-group")
        .start_position(StartPosition::Earliest)
        .batch_size(2)
        .idle_backoff(Duration::from_millis(10))
        .subscribe(
            "simple-topic",
            "*",
            ConsumeMode::Concurrent,
            move |msgs: Vec<ConsumedMessage>| {
                let active = h_active.clone();
                let overlapped = h_overlapped.clone();
                let total = h_total.clone();
                async move {
                    let partition = msgs[0].partition.index();
                    {
                        let mut active = active.lock().unwrap();
                        let count = active.entry(partition).or_insert(0);
                        *count += 1;
                        if *count > 1 {
                            overlapped.store(true, Ordering::SeqCst);
                        }
                    }

                    tokio::time::sleep(Duration::from_millis(2)).await;

                    if let Some(count) = active.lock().unwrap().get_mut(&partition) {
                        *count -= 1;
                    }
                    total.fetch_add(msgs.len(), Ordering::SeqCst);
                    Ok::<(), HandlerError>(())
                }
            },
        )
        .start()
        .await
        .unwrap();

    wait_until("all messages", || total.load(Ordering::SeqCst) == 60).await;
    let stats = consumer.lane_stats().await;
    consumer.stop().await.unwrap();

    assert!(!overlapped.load(Ordering::SeqCst));
    assert_eq!(stats.len(), 3);
    for lane in &stats {
        assert_eq!(lane.max_in_flight, 1, "lane {}", lane.partition);
        assert_eq!(lane.delivered_messages, 20);
    }
}

#[tokio::test]
async fn test_tag_subscription_with_ordered_sends() {
    let transport = setup_transport("orderly-topic", 2).await;
    let producer = start_producer(&transport).await;
    let tags = ["TagA", "TagB", "TagC", "TagD"];
    for (i, tag) in tags.iter().cycle().take(8).enumerate() {
        producer
            .send_ordered(
                Message::new("orderly-topic", format!("m{}", i)).with_tag(*tag),
                42_i64,
            )
            .await
            .unwrap();
    }

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let handler_seen = seen.clone();
    let consumer = PushConsumer::builder()
        .transport(transport.clone() as Arc<dyn Transport>)
        .group("tag-group")
        .start_position(StartPosition::Earliest)
        .idle_backoff(Duration::from_millis(10))
        .subscribe(
            "orderly-topic",
            "TagA || TagC || TagD",
            ConsumeMode::Orderly,
            move |msgs: Vec<ConsumedMessage>| {
                let seen = handler_seen.clone();
                async move {
                    seen.lock().unwrap().extend(msgs.iter().map(body_text));
                    Ok::<(), HandlerError>(())
                }
            },
        )
        .start()
        .await
        .unwrap();

    wait_until("tagged messages", || seen.lock().unwrap().len() == 6).await;
    consumer.stop().await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["m0", "m2", "m3", "m4", "m6", "m7"]
    );
}
