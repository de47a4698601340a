//! Delivery Batch Processor
//!
//! Hands one batch to the application handler and turns what happened into
//! an [`Outcome`] for the lane that owns the batch.
//!
//! ## Modes
//!
//! - **Concurrent**: the handler sees the whole batch in one call. Lanes of
//!   different partitions run side by side; a failure only affects its own
//!   batch.
//! - **Orderly**: the handler is called once per message, in partition order.
//!   The first failure stops the batch, and the lane redelivers the whole
//!   batch from its first message. Messages after the failure are never
//!   delivered ahead of it.
//!
//! A handler that panics is treated exactly like one that returned an error.

use async_trait::async_trait;
use futures::FutureExt;
use partline_core::{ConsumedMessage, ConsumptionBatch};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, warn};

/// Error a handler reports to request redelivery.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Application callback.
///
/// Implemented for any `Fn(Vec<ConsumedMessage>) -> impl Future<Output = HandlerResult>`,
/// so a closure can be passed where a handler is expected:
///
/// ```ignore
/// consumer.subscribe("orders", "*", ConsumeMode::Concurrent, |msgs: Vec<ConsumedMessage>| async move {
///     for m in &msgs {
///         println!("{}", String::from_utf8_lossy(m.body()));
///     }
///     Ok(())
/// })
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, messages: Vec<ConsumedMessage>) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Vec<ConsumedMessage>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, messages: Vec<ConsumedMessage>) -> HandlerResult {
        (self)(messages).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumeMode {
    Concurrent,
    Orderly,
}

impl fmt::Display for ConsumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumeMode::Concurrent => f.write_str("concurrent"),
            ConsumeMode::Orderly => f.write_str("orderly"),
        }
    }
}

/// What the lane should do with the batch next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Advance past the batch.
    Success,
    /// Keep the position and redeliver the whole batch.
    Retry,
    /// The reconsume ceiling was reached.
    Fatal,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Retry => "retry",
            Outcome::Fatal => "fatal",
        }
    }
}

#[derive(Clone)]
pub struct BatchProcessor {
    mode: ConsumeMode,
    handler: Arc<dyn MessageHandler>,
    max_reconsume_times: u32,
}

impl fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("mode", &self.mode)
            .field("max_reconsume_times", &self.max_reconsume_times)
            .finish()
    }
}

impl BatchProcessor {
    pub fn new(mode: ConsumeMode, handler: Arc<dyn MessageHandler>, max_reconsume_times: u32) -> Self {
        Self {
            mode,
            handler,
            max_reconsume_times,
        }
    }

    pub fn mode(&self) -> ConsumeMode {
        self.mode
    }

    /// Deliver `batch`. `attempt` counts earlier failed deliveries of the
    /// same batch, starting at 0.
    pub async fn process(&self, batch: &ConsumptionBatch, attempt: u32) -> Outcome {
        let result = AssertUnwindSafe(self.invoke(batch)).catch_unwind().await;

        match result {
            Ok(Ok(())) => return Outcome::Success,
            Ok(Err(e)) => warn!(
                partition = %batch.partition(),
                first_offset = batch.first_offset(),
                attempt,
                error = %e,
                "Handler failed"
            ),
            Err(panic) => error!(
                partition = %batch.partition(),
                first_offset = batch.first_offset(),
                attempt,
                panic = %panic_message(&*panic),
                "Handler panicked"
            ),
        }

        if attempt < self.max_reconsume_times {
            Outcome::Retry
        } else {
            Outcome::Fatal
        }
    }

    async fn invoke(&self, batch: &ConsumptionBatch) -> HandlerResult {
        match self.mode {
            ConsumeMode::Concurrent => self.handler.handle(batch.messages().to_vec()).await,
            ConsumeMode::Orderly => {
                for message in batch.messages() {
                    self.handler.handle(vec![message.clone()]).await?;
                }
                Ok(())
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
