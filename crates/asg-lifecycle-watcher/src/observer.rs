//! Watch loop observer
//!
//! The watcher reports what it does through a [`WatchObserver`] instead of
//! logging directly, so embedders decide where the events go. The binary
//! uses [`TracingObserver`], which turns each callback into a structured
//! `tracing` event.

use crate::aws::classify_anyhow_error;
use crate::lease::RenewalError;
use crate::sandbox::HandlerError;
use asg_lifecycle_common::{Decision, LifecycleEvent};
use tracing::{debug, error, info, warn};

/// Receives one callback per notable step of the watch loop.
///
/// Every method has an empty default so implementors only override what
/// they care about. Callbacks run inline on the loop (or the renewal task)
/// and must not block.
pub trait WatchObserver: Send + Sync {
    fn watch_started(&self, _queue_url: &str, _visibility_timeout_secs: u64) {}

    fn event_received(&self, _message_id: Option<&str>, _event: &LifecycleEvent) {}

    fn inert_event_deleted(&self, _event: &LifecycleEvent) {}

    /// Deleting an inert event failed; the loop continues
    fn inert_delete_failed(&self, _event: &LifecycleEvent, _error: &anyhow::Error) {}

    fn lease_renewed(&self, _receipt_handle: &str, _visibility_timeout_secs: u64) {}

    /// The renewal task stopped early; the lease may expire mid-handler
    fn lease_renewal_failed(&self, _event: &LifecycleEvent, _error: &RenewalError) {}

    /// The handler reported a business error; the message is left for redelivery
    fn handler_failed(&self, _event: &LifecycleEvent, _error: &HandlerError) {}

    /// `CompleteLifecycleAction` failed; the message is deleted anyway
    fn completion_failed(
        &self,
        _event: &LifecycleEvent,
        _decision: Decision,
        _error: &anyhow::Error,
    ) {
    }

    fn event_committed(&self, _event: &LifecycleEvent, _decision: Decision) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl WatchObserver for NoopObserver {}

/// Observer that emits structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl WatchObserver for TracingObserver {
    fn watch_started(&self, queue_url: &str, visibility_timeout_secs: u64) {
        info!(
            queue_url = %queue_url,
            visibility_timeout_secs,
            "Watching lifecycle hook queue"
        );
        if visibility_timeout_secs == 0 {
            warn!(
                queue_url = %queue_url,
                "Queue has no visibility timeout, leases will not be renewed"
            );
        }
    }

    fn event_received(&self, message_id: Option<&str>, event: &LifecycleEvent) {
        debug!(
            message_id = message_id.unwrap_or_default(),
            transition = %event.transition,
            instance_id = %event.instance_id,
            group = %event.group_name,
            "Received lifecycle event"
        );
    }

    fn inert_event_deleted(&self, event: &LifecycleEvent) {
        debug!(transition = %event.transition, "Deleted non-lifecycle message");
    }

    fn inert_delete_failed(&self, event: &LifecycleEvent, error: &anyhow::Error) {
        warn!(
            transition = %event.transition,
            error = %error,
            "Failed to delete non-lifecycle message"
        );
    }

    fn lease_renewed(&self, receipt_handle: &str, visibility_timeout_secs: u64) {
        debug!(
            receipt_handle = %receipt_handle,
            visibility_timeout_secs,
            "Renewed message visibility"
        );
    }

    fn lease_renewal_failed(&self, event: &LifecycleEvent, error: &RenewalError) {
        warn!(
            instance_id = %event.instance_id,
            error = ?error,
            "Visibility renewal stopped, message may be redelivered while being handled"
        );
    }

    fn handler_failed(&self, event: &LifecycleEvent, error: &HandlerError) {
        warn!(
            instance_id = %event.instance_id,
            transition = %event.transition,
            error = %error,
            "Lifecycle handler failed, leaving message for redelivery"
        );
    }

    fn completion_failed(&self, event: &LifecycleEvent, decision: Decision, error: &anyhow::Error) {
        let classified = classify_anyhow_error(error);
        error!(
            instance_id = %event.instance_id,
            group = %event.group_name,
            hook = %event.hook_name,
            result = %decision,
            kind = classified.kind(),
            error = %error,
            "CompleteLifecycleAction failed"
        );
    }

    fn event_committed(&self, event: &LifecycleEvent, decision: Decision) {
        info!(
            instance_id = %event.instance_id,
            transition = %event.transition,
            result = %decision,
            "Completed lifecycle action"
        );
    }
}
