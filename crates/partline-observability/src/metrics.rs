//! Metric definitions.
//!
//! The statics are usable before [`init`]; they only show up in [`REGISTRY`]
//! once it has run.

use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Producer Metrics
    // ============================================================================

    /// Messages handed to the transport, by send mode (sync, async, oneway)
    pub static ref PRODUCER_MESSAGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("partline_producer_messages_total", "Total messages published"),
        &["topic", "mode"]
    ).expect("metric can be created");

    /// Body bytes published
    pub static ref PRODUCER_BYTES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("partline_producer_bytes_total", "Total body bytes published"),
        &["topic"]
    ).expect("metric can be created");

    /// Time from submission to broker acknowledgment
    pub static ref PRODUCER_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("partline_producer_latency_seconds", "Send latency in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["topic", "mode"]
    ).expect("metric can be created");

    /// Producer errors by kind (timeout, send_failed, submit_failed, ...)
    pub static ref PRODUCER_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("partline_producer_errors_total", "Total producer errors"),
        &["topic", "error_type"]
    ).expect("metric can be created");

    // ============================================================================
    // Consumer Metrics
    // ============================================================================

    /// Messages successfully consumed
    pub static ref CONSUMER_MESSAGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("partline_consumer_messages_total", "Total messages consumed"),
        &["topic", "consumer_group"]
    ).expect("metric can be created");

    /// Batch outcomes (success, retry, fatal)
    pub static ref CONSUMER_BATCH_OUTCOMES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("partline_consumer_batch_outcomes_total", "Delivery outcomes per batch"),
        &["topic", "consumer_group", "outcome"]
    ).expect("metric can be created");

    /// Lanes currently fetching or delivering
    pub static ref CONSUMER_LANES_ACTIVE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("partline_consumer_lanes_active", "Partition lanes holding a worker permit"),
        &["consumer_group"]
    ).expect("metric can be created");

    /// Next position each lane will fetch from
    pub static ref CONSUMER_POSITION: IntGaugeVec = IntGaugeVec::new(
        Opts::new("partline_consumer_position", "Next fetch position per partition"),
        &["topic", "partition", "consumer_group"]
    ).expect("metric can be created");
}

/// Register every metric with [`REGISTRY`]. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(PRODUCER_MESSAGES_TOTAL.clone()),
            Box::new(PRODUCER_BYTES_TOTAL.clone()),
            Box::new(PRODUCER_LATENCY.clone()),
            Box::new(PRODUCER_ERRORS_TOTAL.clone()),
            Box::new(CONSUMER_MESSAGES_TOTAL.clone()),
            Box::new(CONSUMER_BATCH_OUTCOMES_TOTAL.clone()),
            Box::new(CONSUMER_LANES_ACTIVE.clone()),
            Box::new(CONSUMER_POSITION.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("partline metrics have unique names");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_registers_every_family() {
        init();
        CONSUMER_LANES_ACTIVE
            .with_label_values(&["metrics-test-group"])
            .set(0);
        let names: Vec<String> = REGISTRY
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"partline_consumer_lanes_active".to_string()));
    }

    #[test]
    fn test_send_counters_by_mode() {
        for mode in ["sync", "async", "async"] {
            PRODUCER_MESSAGES_TOTAL
                .with_label_values(&["metrics-test-send", mode])
                .inc();
        }
        PRODUCER_BYTES_TOTAL
            .with_label_values(&["metrics-test-send"])
            .inc_by(2048);

        let count = |mode: &str| {
            PRODUCER_MESSAGES_TOTAL
                .with_label_values(&["metrics-test-send", mode])
                .get()
        };
        assert_eq!(count("sync"), 1);
        assert_eq!(count("async"), 2);
        assert_eq!(
            PRODUCER_BYTES_TOTAL
                .with_label_values(&["metrics-test-send"])
                .get(),
            2048
        );
    }

    #[test]
    fn test_batch_outcomes_and_position() {
        let outcomes = &CONSUMER_BATCH_OUTCOMES_TOTAL;
        outcomes
            .with_label_values(&["metrics-test-consume", "group", "retry"])
            .inc();
        CONSUMER_POSITION
            .with_label_values(&["metrics-test-consume", "2", "group"])
            .set(17);

        assert_eq!(
            outcomes
                .with_label_values(&["metrics-test-consume", "group", "retry"])
                .get(),
            1
        );
        assert_eq!(
            CONSUMER_POSITION
                .with_label_values(&["metrics-test-consume", "2", "group"])
                .get(),
            17
        );
    }
}
