//! Locate the SQS queue a group's lifecycle hooks publish to

use crate::aws::autoscaling::AutoscalingOperations;
use crate::aws::error::classify_anyhow_error;
use crate::aws::sqs::QueueOperations;
use crate::config::QueueTarget;
use asg_lifecycle_common::Arn;
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// URL of a lifecycle hook queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, derive_more::Deref)]
pub struct QueueUrl(String);

impl QueueUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no lifecycle hook of group '{0}' publishes to an SQS queue")]
    HookNotFound(String),

    #[error("instance {0} is not part of an Auto Scaling group")]
    NotInGroup(String),

    #[error(transparent)]
    Aws(#[from] anyhow::Error),
}

/// Find the queue URL of the first SQS-backed lifecycle hook of `group_name`.
///
/// Hooks without a notification target or targeting another service (SNS)
/// are skipped. A failing `GetQueueUrl` for the chosen hook is an error.
pub async fn discover_queue_url<A, Q>(
    autoscaling: &A,
    queue: &Q,
    group_name: &str,
) -> Result<QueueUrl, DiscoveryError>
where
    A: AutoscalingOperations + ?Sized,
    Q: QueueOperations + ?Sized,
{
    let hooks = (|| async { autoscaling.describe_lifecycle_hooks(group_name).await })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(20))
                .with_max_times(5),
        )
        .when(|e| classify_anyhow_error(e).is_retryable())
        .notify(|e, dur| {
            warn!(
                group = %group_name,
                delay = ?dur,
                error = %e,
                "DescribeLifecycleHooks throttled, retrying..."
            );
        })
        .await?;

    for hook in hooks {
        let Some(target) = hook.notification_target_arn.as_deref() else {
            debug!(hook = %hook.hook_name, "Skipping lifecycle hook without notification target");
            continue;
        };
        let arn = match Arn::parse(target) {
            Ok(arn) if arn.is_sqs_queue() => arn,
            Ok(_) => {
                debug!(hook = %hook.hook_name, target = %target, "Skipping non-SQS lifecycle hook");
                continue;
            }
            Err(e) => {
                debug!(hook = %hook.hook_name, error = %e, "Skipping lifecycle hook with unparseable target");
                continue;
            }
        };

        let url = queue.get_queue_url(&arn.resource, &arn.account_id).await?;
        info!(
            group = %group_name,
            hook = %hook.hook_name,
            queue_url = %url,
            "Discovered lifecycle hook queue"
        );
        return Ok(QueueUrl(url));
    }

    Err(DiscoveryError::HookNotFound(group_name.to_string()))
}

/// Resolve any [`QueueTarget`] to a queue URL.
pub async fn resolve_queue_url<A, Q>(
    target: &QueueTarget,
    autoscaling: &A,
    queue: &Q,
) -> Result<QueueUrl, DiscoveryError>
where
    A: AutoscalingOperations + ?Sized,
    Q: QueueOperations + ?Sized,
{
    match target {
        QueueTarget::QueueUrl(url) => Ok(QueueUrl::new(url.clone())),
        QueueTarget::Group(group) => discover_queue_url(autoscaling, queue, group).await,
        QueueTarget::Instance(instance_id) => {
            let group = autoscaling
                .group_name_for_instance(instance_id)
                .await?
                .ok_or_else(|| DiscoveryError::NotInGroup(instance_id.clone()))?;
            info!(instance_id = %instance_id, group = %group, "Resolved Auto Scaling group");
            discover_queue_url(autoscaling, queue, &group).await
        }
    }
}
