//! Commit protocol: complete the lifecycle action, then delete the message

use crate::aws::{AutoscalingOperations, LifecycleActionCompletion, QueueOperations};
use crate::observer::WatchObserver;
use crate::watcher::WatchError;
use asg_lifecycle_common::{Decision, LifecycleEvent};

/// Tell Auto Scaling the handler's decision and remove the message.
///
/// A failed `CompleteLifecycleAction` is only reported: the hook may have
/// timed out or been completed elsewhere, and keeping the message would
/// retry it forever. A failed delete is returned and stops the watcher.
pub async fn commit<Q, A>(
    queue: &Q,
    autoscaling: &A,
    queue_url: &str,
    receipt_handle: &str,
    event: &LifecycleEvent,
    decision: Decision,
    observer: &dyn WatchObserver,
) -> Result<(), WatchError>
where
    Q: QueueOperations + ?Sized,
    A: AutoscalingOperations + ?Sized,
{
    let completion = LifecycleActionCompletion::new(event, decision);
    if let Err(e) = autoscaling.complete_lifecycle_action(completion).await {
        observer.completion_failed(event, decision, &e);
    }

    queue
        .delete_message(queue_url, receipt_handle)
        .await
        .map_err(|source| WatchError::Delete {
            instance_id: event.instance_id.clone(),
            source,
        })?;

    observer.event_committed(event, decision);
    Ok(())
}
