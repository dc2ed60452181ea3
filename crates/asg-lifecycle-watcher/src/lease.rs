//! Visibility lease renewal
//!
//! While a handler runs, a background task keeps pushing the message's
//! visibility timeout forward so SQS does not hand it to another consumer.
//! The task is cancelled with a [`CancellationToken`] once the handler
//! returns; the first failed renewal ends the task early.

use crate::aws::QueueOperations;
use crate::observer::WatchObserver;
use asg_lifecycle_common::defaults::{RENEWAL_MARGIN_SECS, SHORT_VISIBILITY_TIMEOUT_SECS};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A `ChangeMessageVisibility` call failed and renewal stopped
#[derive(Debug, Error)]
#[error("failed to renew visibility of message {receipt_handle}")]
pub struct RenewalError {
    pub receipt_handle: String,
    #[source]
    pub source: anyhow::Error,
}

/// Interval between renewals for a queue visibility timeout of `timeout_secs`.
///
/// `None` means renewal is disabled (timeout of zero). The interval never
/// drops below one second.
pub fn renewal_interval(timeout_secs: u64) -> Option<Duration> {
    let secs = match timeout_secs {
        0 => return None,
        t if t < SHORT_VISIBILITY_TIMEOUT_SECS => t / 2,
        t => t - RENEWAL_MARGIN_SECS,
    };
    Some(Duration::from_secs(secs.max(1)))
}

/// Handle to a running renewal task for one message.
///
/// Dropping the renewer cancels the task without waiting for it.
pub struct LeaseRenewer {
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<(), RenewalError>>>,
}

impl LeaseRenewer {
    /// Start renewing `receipt_handle` every [`renewal_interval`].
    ///
    /// The first renewal happens one interval after start. Each renewal
    /// resets the visibility timeout to `timeout_secs`.
    pub fn start<Q>(
        queue: Arc<Q>,
        queue_url: impl Into<String>,
        receipt_handle: impl Into<String>,
        timeout_secs: u64,
        observer: Arc<dyn WatchObserver>,
    ) -> Self
    where
        Q: QueueOperations + 'static,
    {
        let cancel = CancellationToken::new();
        let Some(period) = renewal_interval(timeout_secs) else {
            return Self {
                cancel,
                handle: None,
            };
        };

        let task = RenewalTask {
            queue,
            queue_url: queue_url.into(),
            receipt_handle: receipt_handle.into(),
            timeout_secs,
            period,
            observer,
        };
        let handle = tokio::spawn(task.run(cancel.clone()));

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop renewing and wait for the task to exit.
    ///
    /// A renewal already in flight is allowed to finish. Returns the error
    /// that ended the task early, if any.
    pub async fn stop(mut self) -> Option<RenewalError> {
        self.cancel.cancel();
        let handle = self.handle.take()?;
        match handle.await {
            Ok(result) => result.err(),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => None,
        }
    }
}

impl Drop for LeaseRenewer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct RenewalTask<Q> {
    queue: Arc<Q>,
    queue_url: String,
    receipt_handle: String,
    timeout_secs: u64,
    period: Duration,
    observer: Arc<dyn WatchObserver>,
}

impl<Q: QueueOperations> RenewalTask<Q> {
    async fn run(self, cancel: CancellationToken) -> Result<(), RenewalError> {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let timeout = i32::try_from(self.timeout_secs).unwrap_or(i32::MAX);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    self.queue
                        .change_message_visibility(&self.queue_url, &self.receipt_handle, timeout)
                        .await
                        .map_err(|source| RenewalError {
                            receipt_handle: self.receipt_handle.clone(),
                            source,
                        })?;
                    self.observer.lease_renewed(&self.receipt_handle, self.timeout_secs);
                }
            }
        }
    }
}
