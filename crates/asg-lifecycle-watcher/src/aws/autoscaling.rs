//! Auto Scaling control plane access

use crate::aws::context::{AwsContext, FromAwsContext};
use anyhow::{Context, Result};
use asg_lifecycle_common::{Decision, LifecycleEvent};
use async_trait::async_trait;
use aws_sdk_autoscaling::Client;

/// Arguments of one `CompleteLifecycleAction` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleActionCompletion {
    pub group_name: String,
    pub hook_name: String,
    pub instance_id: String,
    pub action_token: String,
    pub result: Decision,
}

impl LifecycleActionCompletion {
    pub fn new(event: &LifecycleEvent, result: Decision) -> Self {
        Self {
            group_name: event.group_name.clone(),
            hook_name: event.hook_name.clone(),
            instance_id: event.instance_id.clone(),
            action_token: event.action_token.clone(),
            result,
        }
    }
}

/// A lifecycle hook and where it publishes notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleHookTarget {
    pub hook_name: String,
    pub notification_target_arn: Option<String>,
}

/// Auto Scaling operations used by the watcher, mockable in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AutoscalingOperations: Send + Sync {
    async fn complete_lifecycle_action(&self, completion: LifecycleActionCompletion)
    -> Result<()>;

    async fn describe_lifecycle_hooks(&self, group_name: &str)
    -> Result<Vec<LifecycleHookTarget>>;

    /// Auto Scaling group an instance belongs to, if any
    async fn group_name_for_instance(&self, instance_id: &str) -> Result<Option<String>>;
}

/// Auto Scaling client for completing lifecycle actions
pub struct AutoscalingClient {
    client: Client,
}

impl FromAwsContext for AutoscalingClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.autoscaling_client(),
        }
    }
}

#[async_trait]
impl AutoscalingOperations for AutoscalingClient {
    async fn complete_lifecycle_action(
        &self,
        completion: LifecycleActionCompletion,
    ) -> Result<()> {
        self.client
            .complete_lifecycle_action()
            .auto_scaling_group_name(&completion.group_name)
            .lifecycle_hook_name(&completion.hook_name)
            .instance_id(&completion.instance_id)
            .lifecycle_action_token(&completion.action_token)
            .lifecycle_action_result(completion.result.as_str())
            .send()
            .await
            .with_context(|| {
                format!(
                    "CompleteLifecycleAction failed for instance {}",
                    completion.instance_id
                )
            })?;
        Ok(())
    }

    async fn describe_lifecycle_hooks(
        &self,
        group_name: &str,
    ) -> Result<Vec<LifecycleHookTarget>> {
        let response = self
            .client
            .describe_lifecycle_hooks()
            .auto_scaling_group_name(group_name)
            .send()
            .await
            .with_context(|| format!("DescribeLifecycleHooks failed for group '{}'", group_name))?;

        Ok(response
            .lifecycle_hooks()
            .iter()
            .map(|hook| LifecycleHookTarget {
                hook_name: hook.lifecycle_hook_name().unwrap_or_default().to_string(),
                notification_target_arn: hook.notification_target_arn().map(str::to_string),
            })
            .collect())
    }

    async fn group_name_for_instance(&self, instance_id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .describe_auto_scaling_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .with_context(|| {
                format!("DescribeAutoScalingInstances failed for instance {}", instance_id)
            })?;

        Ok(response
            .auto_scaling_instances()
            .first()
            .and_then(|details| details.auto_scaling_group_name())
            .filter(|name| !name.is_empty())
            .map(str::to_string))
    }
}
