//! Sample ordered business payload.
//!
//! An `OrderStep` is one state transition of one order. The order id is the
//! ordering key: every step of an order must reach consumers in `seq` order,
//! which holds as long as all steps of the order land on the same partition.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStep {
    pub order_id: i64,
    pub seq: u32,
    pub desc: String,
}

impl OrderStep {
    pub fn new(order_id: i64, seq: u32, desc: impl Into<String>) -> Self {
        Self {
            order_id,
            seq,
            desc: desc.into(),
        }
    }

    /// Ten steps of three orders, interleaved the way a busy shop emits them.
    pub fn sample_orders() -> Vec<OrderStep> {
        const A: i64 = 15103111039;
        const B: i64 = 15103111065;
        const C: i64 = 15103117235;

        vec![
            OrderStep::new(A, 0, "created"),
            OrderStep::new(B, 0, "created"),
            OrderStep::new(A, 1, "paid"),
            OrderStep::new(C, 0, "created"),
            OrderStep::new(B, 1, "paid"),
            OrderStep::new(C, 1, "paid"),
            OrderStep::new(B, 2, "completed"),
            OrderStep::new(A, 2, "shipped"),
            OrderStep::new(C, 2, "completed"),
            OrderStep::new(A, 3, "completed"),
        ]
    }
}

impl fmt::Display for OrderStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OrderStep{{order_id={}, seq={}, desc='{}'}}",
            self.order_id, self.seq, self.desc
        )
    }
}
