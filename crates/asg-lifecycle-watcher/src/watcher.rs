//! The lifecycle event watch loop
//!
//! `LifecycleWatcher` long-polls a lifecycle hook queue one message at a
//! time. Inert messages are deleted. Actionable events go to the handler
//! while a [`LeaseRenewer`] keeps the message invisible. A decision is then
//! committed; a handler failure leaves the message for redelivery.

use crate::aws::{AutoscalingOperations, QueueMessage, QueueOperations};
use crate::commit::commit;
use crate::lease::LeaseRenewer;
use crate::observer::{TracingObserver, WatchObserver};
use crate::sandbox::{LifecycleHandler, run_handler};
use asg_lifecycle_common::defaults::{RECEIVE_BATCH_SIZE, RECEIVE_WAIT_TIME_SECS};
use asg_lifecycle_common::{DecodeError, LifecycleEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that stop the watch loop
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to read queue visibility timeout")]
    VisibilityTimeout(#[source] anyhow::Error),

    #[error("failed to receive messages")]
    Receive(#[source] anyhow::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("received message without {missing} (message id: {message_id:?})")]
    MalformedMessage {
        message_id: Option<String>,
        missing: &'static str,
    },

    #[error("failed to delete message for instance {instance_id} after completing its lifecycle action")]
    Delete {
        instance_id: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Watches one lifecycle hook queue.
///
/// Messages are received one at a time: only the message being handled has
/// its lease renewed, so a larger batch would let the others expire.
pub struct LifecycleWatcher<Q, A> {
    queue: Arc<Q>,
    autoscaling: Arc<A>,
    queue_url: String,
    observer: Arc<dyn WatchObserver>,
}

impl<Q, A> std::fmt::Debug for LifecycleWatcher<Q, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleWatcher")
            .field("queue_url", &self.queue_url)
            .finish_non_exhaustive()
    }
}

impl<Q, A> LifecycleWatcher<Q, A>
where
    Q: QueueOperations + 'static,
    A: AutoscalingOperations,
{
    /// Create a watcher reporting to a [`TracingObserver`]
    pub fn new(queue: Arc<Q>, autoscaling: Arc<A>, queue_url: impl Into<String>) -> Self {
        Self {
            queue,
            autoscaling,
            queue_url: queue_url.into(),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn WatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Watch forever. Only returns on a fatal error.
    pub async fn run<H>(&self, handler: &H) -> Result<(), WatchError>
    where
        H: LifecycleHandler + ?Sized,
    {
        self.run_until(handler, &CancellationToken::new()).await
    }

    /// Watch until `shutdown` is cancelled or a fatal error occurs.
    ///
    /// Shutdown is only observed while waiting for messages; a message that
    /// is already being handled is finished first.
    pub async fn run_until<H>(
        &self,
        handler: &H,
        shutdown: &CancellationToken,
    ) -> Result<(), WatchError>
    where
        H: LifecycleHandler + ?Sized,
    {
        let visibility_timeout = self
            .queue
            .visibility_timeout(&self.queue_url)
            .await
            .map_err(WatchError::VisibilityTimeout)?;
        self.observer
            .watch_started(&self.queue_url, visibility_timeout);

        loop {
            let messages = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                received = self.queue.receive_messages(
                    &self.queue_url,
                    RECEIVE_BATCH_SIZE,
                    RECEIVE_WAIT_TIME_SECS,
                ) => received.map_err(WatchError::Receive)?,
            };

            for message in messages {
                self.process_message(handler, message, visibility_timeout)
                    .await?;
            }
        }
    }

    async fn process_message<H>(
        &self,
        handler: &H,
        message: QueueMessage,
        visibility_timeout: u64,
    ) -> Result<(), WatchError>
    where
        H: LifecycleHandler + ?Sized,
    {
        let QueueMessage {
            message_id,
            receipt_handle,
            body,
        } = message;
        let Some(receipt_handle) = receipt_handle else {
            return Err(WatchError::MalformedMessage {
                message_id,
                missing: "receipt handle",
            });
        };
        let Some(body) = body else {
            return Err(WatchError::MalformedMessage {
                message_id,
                missing: "body",
            });
        };

        let event = LifecycleEvent::decode(&body)?;
        self.observer.event_received(message_id.as_deref(), &event);

        if !event.is_actionable() {
            match self
                .queue
                .delete_message(&self.queue_url, &receipt_handle)
                .await
            {
                Ok(()) => self.observer.inert_event_deleted(&event),
                Err(e) => self.observer.inert_delete_failed(&event, &e),
            }
            return Ok(());
        }

        let renewer = LeaseRenewer::start(
            self.queue.clone(),
            self.queue_url.clone(),
            receipt_handle.clone(),
            visibility_timeout,
            self.observer.clone(),
        );
        let outcome = run_handler(handler, &event).await;
        if let Some(e) = renewer.stop().await {
            self.observer.lease_renewal_failed(&event, &e);
        }

        let decision = match outcome {
            Ok(decision) => decision,
            Err(e) => {
                self.observer.handler_failed(&event, &e);
                return Ok(());
            }
        };

        commit(
            self.queue.as_ref(),
            self.autoscaling.as_ref(),
            &self.queue_url,
            &receipt_handle,
            &event,
            decision,
            self.observer.as_ref(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::{MockAutoscalingOperations, MockQueueOperations};
    use crate::observer::NoopObserver;
    use crate::sandbox::{HandlerError, handler_fn};
    use asg_lifecycle_common::Decision;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const QUEUE_URL: &str = "https://sqs.us-east-2.amazonaws.com/123456789012/hooks";

    fn message(body: &str) -> QueueMessage {
        QueueMessage {
            message_id: Some("m-1".into()),
            receipt_handle: Some("rh-1".into()),
            body: Some(body.into()),
        }
    }

    /// Queue that yields `bodies` one per receive, then fails the next receive
    fn queue_with(bodies: &[&str]) -> MockQueueOperations {
        let mut queue = MockQueueOperations::new();
        queue.expect_visibility_timeout().returning(|_| Ok(30));
        let mut pending: Vec<QueueMessage> = bodies.iter().map(|b| message(b)).collect();
        pending.reverse();
        queue
            .expect_receive_messages()
            .withf(|url, max, wait| url == QUEUE_URL && *max == 1 && *wait == 20)
            .returning(move |_, _, _| match pending.pop() {
                Some(m) => Ok(vec![m]),
                None => Err(anyhow::anyhow!("end of test stream")),
            });
        queue
    }

    fn watcher(
        queue: MockQueueOperations,
        autoscaling: MockAutoscalingOperations,
    ) -> LifecycleWatcher<MockQueueOperations, MockAutoscalingOperations> {
        LifecycleWatcher::new(Arc::new(queue), Arc::new(autoscaling), QUEUE_URL)
            .with_observer(Arc::new(NoopObserver))
    }

    #[tokio::test]
    async fn receives_one_message_per_long_poll() {
        let mut queue = MockQueueOperations::new();
        queue.expect_visibility_timeout().returning(|_| Ok(30));
        let mut seq = mockall::Sequence::new();
        queue
            .expect_receive_messages()
            .withf(|_, max, wait| *max == RECEIVE_BATCH_SIZE && *wait == RECEIVE_WAIT_TIME_SECS)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(Vec::new()));
        queue
            .expect_receive_messages()
            .withf(|_, max, wait| *max == 1 && *wait == 20)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(anyhow::anyhow!("end of test stream")));

        let handler = handler_fn(|_| async { Ok(Decision::Continue) });
        let err = watcher(queue, MockAutoscalingOperations::new())
            .run(&handler)
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::Receive(_)));
    }

    #[tokio::test]
    async fn visibility_timeout_failure_is_fatal() {
        let mut queue = MockQueueOperations::new();
        queue
            .expect_visibility_timeout()
            .returning(|_| Err(anyhow::anyhow!("VisibilityTimeout attribute not found")));
        queue.expect_receive_messages().never();

        let handler = handler_fn(|_| async { Ok(Decision::Continue) });
        let err = watcher(queue, MockAutoscalingOperations::new())
            .run(&handler)
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::VisibilityTimeout(_)));
    }

    #[tokio::test]
    async fn decode_failure_is_fatal() {
        let mut queue = queue_with(&["{not json"]);
        queue.expect_delete_message().never();
        let mut autoscaling = MockAutoscalingOperations::new();
        autoscaling.expect_complete_lifecycle_action().never();

        let handler = handler_fn(|_| async { Ok(Decision::Continue) });
        let err = watcher(queue, autoscaling).run(&handler).await.unwrap_err();
        assert!(matches!(err, WatchError::Decode(_)));
    }

    #[tokio::test]
    async fn missing_receipt_handle_is_fatal() {
        let mut queue = MockQueueOperations::new();
        queue.expect_visibility_timeout().returning(|_| Ok(30));
        queue.expect_receive_messages().returning(|_, _, _| {
            Ok(vec![QueueMessage {
                message_id: Some("m-9".into()),
                receipt_handle: None,
                body: Some("{}".into()),
            }])
        });

        let handler = handler_fn(|_| async { Ok(Decision::Continue) });
        let err = watcher(queue, MockAutoscalingOperations::new())
            .run(&handler)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WatchError::MalformedMessage {
                missing: "receipt handle",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn inert_delete_failure_is_not_fatal() {
        let mut queue = queue_with(&[
            r#"{"LifecycleTransition":"SomeOtherEvent"}"#,
            r#"{"Event":"autoscaling:TEST_NOTIFICATION"}"#,
        ]);
        let deletes = Arc::new(AtomicUsize::new(0));
        let counter = deletes.clone();
        queue.expect_delete_message().returning(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("AccessDenied"))
        });

        let calls = Arc::new(AtomicUsize::new(0));
        let handler_calls = calls.clone();
        let handler = handler_fn(move |_| {
            handler_calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Decision::Continue) }
        });

        let err = watcher(queue, MockAutoscalingOperations::new())
            .run(&handler)
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::Receive(_)));
        assert_eq!(deletes.load(Ordering::SeqCst), 2, "both inert messages deleted");
        assert_eq!(calls.load(Ordering::SeqCst), 0, "handler never invoked");
    }

    #[tokio::test]
    async fn continue_decision_is_committed() {
        let mut queue = queue_with(&[
            r#"{"LifecycleTransition":"autoscaling:EC2_INSTANCE_LAUNCHING","EC2InstanceId":"i-123","AutoScalingGroupName":"web","LifecycleHookName":"h","LifecycleActionToken":"t"}"#,
        ]);
        queue
            .expect_delete_message()
            .withf(|url, handle| url == QUEUE_URL && handle == "rh-1")
            .times(1)
            .returning(|_, _| Ok(()));
        let mut autoscaling = MockAutoscalingOperations::new();
        autoscaling
            .expect_complete_lifecycle_action()
            .withf(|c| c.instance_id == "i-123" && c.result == Decision::Continue)
            .times(1)
            .returning(|_| Ok(()));

        let handler = handler_fn(|_| async { Ok(Decision::Continue) });
        let err = watcher(queue, autoscaling).run(&handler).await.unwrap_err();
        assert!(matches!(err, WatchError::Receive(_)));
    }

    #[tokio::test]
    async fn handler_error_skips_commit_and_keeps_polling() {
        let mut queue = queue_with(&[
            r#"{"LifecycleTransition":"autoscaling:EC2_INSTANCE_TERMINATING","EC2InstanceId":"i-1"}"#,
            r#"{"LifecycleTransition":"autoscaling:EC2_INSTANCE_TERMINATING","EC2InstanceId":"i-2"}"#,
        ]);
        queue.expect_delete_message().never();
        let mut autoscaling = MockAutoscalingOperations::new();
        autoscaling.expect_complete_lifecycle_action().never();

        let calls = Arc::new(AtomicUsize::new(0));
        let handler_calls = calls.clone();
        let handler = handler_fn(move |_| {
            handler_calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HandlerError::msg("db unreachable")) }
        });

        let err = watcher(queue, autoscaling).run(&handler).await.unwrap_err();
        assert!(matches!(err, WatchError::Receive(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_between_messages() {
        let mut queue = MockQueueOperations::new();
        queue.expect_visibility_timeout().returning(|_| Ok(0));
        queue.expect_receive_messages().never();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let handler = handler_fn(|_| async { Ok(Decision::Continue) });
        watcher(queue, MockAutoscalingOperations::new())
            .run_until(&handler, &shutdown)
            .await
            .unwrap();
    }
}
