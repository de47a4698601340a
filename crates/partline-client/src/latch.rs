//! Completion tracking for asynchronous sends.
//!
//! - [`PendingSend`]: handle to one in-flight asynchronous send
//! - [`SendTracker`]: a set of pending sends awaited under one deadline
//! - [`CompletionLatch`]: counting barrier for callback-style sends
//!
//! Waiting is always bounded. A send that has not reported back when the
//! deadline passes is `Indeterminate`: it may or may not have been stored, and
//! the caller decides what to do about it.

use crate::error::{ClientError, Result};
use partline_core::{Partition, SendResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

/// What became of an asynchronous send.
#[derive(Debug)]
pub enum SendOutcome {
    Delivered(SendResult),
    Failed(ClientError),
    /// No answer before the deadline.
    Indeterminate,
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered(_))
    }

    pub fn is_indeterminate(&self) -> bool {
        matches!(self, SendOutcome::Indeterminate)
    }

    /// Collapse into a `Result`, reporting `Indeterminate(waited)` for sends
    /// that never answered.
    pub fn into_result(self, waited: Duration) -> Result<SendResult> {
        match self {
            SendOutcome::Delivered(r) => Ok(r),
            SendOutcome::Failed(e) => Err(e),
            SendOutcome::Indeterminate => Err(ClientError::Indeterminate(waited)),
        }
    }
}

/// Handle returned by `Producer::send_async`.
#[derive(Debug)]
pub struct PendingSend {
    partition: Partition,
    rx: oneshot::Receiver<Result<SendResult>>,
}

impl PendingSend {
    pub(crate) fn new(partition: Partition, rx: oneshot::Receiver<Result<SendResult>>) -> Self {
        Self { partition, rx }
    }

    /// Partition the message was routed to.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Wait at most `timeout` for the send to report back.
    pub async fn wait(self, timeout: Duration) -> SendOutcome {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(Ok(result))) => SendOutcome::Delivered(result),
            Ok(Ok(Err(e))) => SendOutcome::Failed(e),
            // The send task went away without answering (producer shut down).
            Ok(Err(_)) => SendOutcome::Indeterminate,
            Err(_) => SendOutcome::Indeterminate,
        }
    }
}

/// Pending sends awaited together under one deadline.
#[derive(Debug, Default)]
pub struct SendTracker {
    pending: Vec<PendingSend>,
}

impl SendTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pending: PendingSend) {
        self.pending.push(pending);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Outcomes in push order. Sends still unanswered at the deadline are
    /// `Indeterminate`; sends that already answered are reported even when
    /// the deadline has passed.
    pub async fn wait_all(self, timeout: Duration) -> Vec<SendOutcome> {
        let deadline = Instant::now() + timeout;
        let mut outcomes = Vec::with_capacity(self.pending.len());
        for pending in self.pending {
            let remaining = deadline.saturating_duration_since(Instant::now());
            outcomes.push(pending.wait(remaining).await);
        }
        outcomes
    }
}

/// Result of [`CompletionLatch::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchOutcome {
    Completed,
    TimedOut { remaining: usize },
}

/// Counting barrier: `wait` returns once `count_down` has been called `n`
/// times, or when the timeout elapses.
///
/// Cloning shares the same counter.
#[derive(Debug, Clone)]
pub struct CompletionLatch {
    count: Arc<watch::Sender<usize>>,
}

impl CompletionLatch {
    pub fn new(n: usize) -> Self {
        let (tx, _rx) = watch::channel(n);
        Self {
            count: Arc::new(tx),
        }
    }

    /// Extra calls past zero are ignored.
    pub fn count_down(&self) {
        self.count.send_modify(|c| *c = c.saturating_sub(1));
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    pub async fn wait(&self, timeout: Duration) -> LatchOutcome {
        let mut rx = self.count.subscribe();
        let done = tokio::time::timeout(timeout, async {
            // The sender lives in `self`, so the channel cannot close here.
            let _ = rx.wait_for(|c| *c == 0).await;
        })
        .await;

        match done {
            Ok(()) => LatchOutcome::Completed,
            Err(_) => LatchOutcome::TimedOut {
                remaining: self.count(),
            },
        }
    }
}
