//! partline Observability
//!
//! Prometheus metrics for producers and consumers. The client crate records
//! into the statics in [`metrics`]; applications decide how to expose them.
//!
//! # Usage
//!
//! ```no_run
//! use partline_observability::{gather_text, init};
//!
//! init();
//! println!("{}", gather_text());
//! ```

pub mod metrics;

// Re-export commonly used items
pub use metrics::{init as init_metrics, REGISTRY};

use prometheus::{Encoder, TextEncoder};

/// Initialize all observability components
pub fn init() {
    metrics::init();
}

/// Render every registered metric in the Prometheus text exposition format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_does_not_panic() {
        init();
    }

    #[test]
    fn test_double_init_is_safe() {
        init();
        init_metrics();
    }

    #[test]
    fn test_gather_text_contains_registered_metrics() {
        init();
        metrics::PRODUCER_MESSAGES_TOTAL
            .with_label_values(&["gather-test", "oneway"])
            .inc();
        let text = gather_text();
        assert!(text.contains("partline_producer_messages_total"));
    }
}
