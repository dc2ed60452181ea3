//! Shared test utilities for integration tests
//!
//! In-memory stand-ins for SQS and Auto Scaling that record every call in a
//! shared journal, so tests can assert on both effects and their order.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use asg_lifecycle_watcher::aws::{
    AutoscalingOperations, LifecycleActionCompletion, LifecycleHookTarget, QueueMessage,
    QueueOperations,
};
use asg_lifecycle_watcher::lease::RenewalError;
use asg_lifecycle_watcher::{HandlerError, LifecycleEvent, WatchObserver};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_QUEUE_URL: &str = "https://sqs.us-east-2.amazonaws.com/123456789012/lifecycle";
pub const TEST_GROUP: &str = "web-asg";
pub const TEST_HOOK: &str = "drain-hook";

/// Ordered record of side effects across fakes
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Build a queue message carrying a lifecycle notification.
pub fn lifecycle_message(receipt_handle: &str, transition: &str, instance_id: &str) -> QueueMessage {
    let body = serde_json::json!({
        "Service": "AWS Auto Scaling",
        "Time": "2026-10-17T08:00:00.000Z",
        "AccountId": "123456789012",
        "AutoScalingGroupName": TEST_GROUP,
        "LifecycleHookName": TEST_HOOK,
        "LifecycleTransition": transition,
        "RequestId": format!("req-{receipt_handle}"),
        "LifecycleActionToken": format!("token-{instance_id}"),
        "EC2InstanceId": instance_id,
    });
    QueueMessage {
        message_id: Some(format!("msg-{receipt_handle}")),
        receipt_handle: Some(receipt_handle.to_string()),
        body: Some(body.to_string()),
    }
}

/// Queue message with an arbitrary body
pub fn raw_message(receipt_handle: &str, body: &str) -> QueueMessage {
    QueueMessage {
        message_id: Some(format!("msg-{receipt_handle}")),
        receipt_handle: Some(receipt_handle.to_string()),
        body: Some(body.to_string()),
    }
}

/// In-memory SQS queue.
///
/// Each receive pops one scripted batch. Once the script is exhausted,
/// receive fails, which ends the watch loop with `WatchError::Receive`.
pub struct FakeQueue {
    journal: Journal,
    visibility_timeout: u64,
    batches: Mutex<VecDeque<Vec<QueueMessage>>>,
    receives: AtomicUsize,
    fail_deletes: bool,
    fail_renewals: bool,
}

impl FakeQueue {
    pub fn new(journal: Journal, visibility_timeout: u64) -> Self {
        Self {
            journal,
            visibility_timeout,
            batches: Mutex::new(VecDeque::new()),
            receives: AtomicUsize::new(0),
            fail_deletes: false,
            fail_renewals: false,
        }
    }

    pub fn with_batch(self, batch: Vec<QueueMessage>) -> Self {
        self.batches.lock().unwrap().push_back(batch);
        self
    }

    pub fn with_message(self, message: QueueMessage) -> Self {
        self.with_batch(vec![message])
    }

    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn failing_renewals(mut self) -> Self {
        self.fail_renewals = true;
        self
    }

    pub fn receive_count(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueOperations for FakeQueue {
    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time_secs: i32,
    ) -> Result<Vec<QueueMessage>> {
        assert_eq!(queue_url, TEST_QUEUE_URL);
        assert_eq!(max_messages, 1);
        assert_eq!(wait_time_secs, 20);
        self.receives.fetch_add(1, Ordering::SeqCst);
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("fake queue drained"))
    }

    async fn delete_message(&self, _queue_url: &str, receipt_handle: &str) -> Result<()> {
        if self.fail_deletes {
            return Err(anyhow!("AccessDenied"));
        }
        self.journal.push(format!("delete {receipt_handle}"));
        Ok(())
    }

    async fn change_message_visibility(
        &self,
        _queue_url: &str,
        receipt_handle: &str,
        timeout_secs: i32,
    ) -> Result<()> {
        if self.fail_renewals {
            return Err(anyhow!("ReceiptHandleIsInvalid"));
        }
        self.journal
            .push(format!("renew {receipt_handle} {timeout_secs}"));
        Ok(())
    }

    async fn visibility_timeout(&self, _queue_url: &str) -> Result<u64> {
        Ok(self.visibility_timeout)
    }

    async fn get_queue_url(&self, queue_name: &str, owner_account_id: &str) -> Result<String> {
        Ok(format!(
            "https://sqs.us-east-2.amazonaws.com/{owner_account_id}/{queue_name}"
        ))
    }
}

/// Auto Scaling fake that records completions
pub struct RecordingAutoscaling {
    journal: Journal,
    completions: Mutex<Vec<LifecycleActionCompletion>>,
    fail_completions: bool,
}

impl RecordingAutoscaling {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            completions: Mutex::new(Vec::new()),
            fail_completions: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_completions = true;
        self
    }

    pub fn completions(&self) -> Vec<LifecycleActionCompletion> {
        self.completions.lock().unwrap().clone()
    }
}

#[async_trait]
impl AutoscalingOperations for RecordingAutoscaling {
    async fn complete_lifecycle_action(&self, completion: LifecycleActionCompletion) -> Result<()> {
        if self.fail_completions {
            return Err(anyhow!("ValidationError: No active Lifecycle Action found"));
        }
        self.journal.push(format!(
            "complete {} {}",
            completion.instance_id,
            completion.result.as_str()
        ));
        self.completions.lock().unwrap().push(completion);
        Ok(())
    }

    async fn describe_lifecycle_hooks(&self, _group_name: &str) -> Result<Vec<LifecycleHookTarget>> {
        Ok(Vec::new())
    }

    async fn group_name_for_instance(&self, _instance_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Observer that keeps the failures it was told about
#[derive(Default)]
pub struct RecordingObserver {
    pub handler_failures: Mutex<Vec<String>>,
    pub renewal_failures: Mutex<Vec<String>>,
    pub completion_failures: Mutex<Vec<String>>,
    pub inert_delete_failures: AtomicUsize,
}

impl WatchObserver for RecordingObserver {
    fn inert_delete_failed(&self, _event: &LifecycleEvent, _error: &anyhow::Error) {
        self.inert_delete_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn lease_renewal_failed(&self, event: &LifecycleEvent, _error: &RenewalError) {
        self.renewal_failures
            .lock()
            .unwrap()
            .push(event.instance_id.clone());
    }

    fn handler_failed(&self, event: &LifecycleEvent, error: &HandlerError) {
        self.handler_failures
            .lock()
            .unwrap()
            .push(format!("{}: {}", event.instance_id, error));
    }

    fn completion_failed(
        &self,
        event: &LifecycleEvent,
        _decision: asg_lifecycle_watcher::Decision,
        _error: &anyhow::Error,
    ) {
        self.completion_failures
            .lock()
            .unwrap()
            .push(event.instance_id.clone());
    }
}
