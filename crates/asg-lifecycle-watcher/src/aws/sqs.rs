//! SQS queue access
//!
//! `QueueOperations` is the seam between the watcher and SQS; `SqsClient`
//! implements it over `aws-sdk-sqs`.

use crate::aws::context::{AwsContext, FromAwsContext};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::types::QueueAttributeName;
use tracing::debug;

/// The parts of a received SQS message the watcher uses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: Option<String>,
    pub receipt_handle: Option<String>,
    pub body: Option<String>,
}

impl From<&aws_sdk_sqs::types::Message> for QueueMessage {
    fn from(message: &aws_sdk_sqs::types::Message) -> Self {
        Self {
            message_id: message.message_id().map(str::to_string),
            receipt_handle: message.receipt_handle().map(str::to_string),
            body: message.body().map(str::to_string),
        }
    }
}

/// Queue operations used by the watcher, mockable in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueOperations: Send + Sync {
    /// Long-poll for up to `max_messages` messages
    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time_secs: i32,
    ) -> Result<Vec<QueueMessage>>;

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<()>;

    /// Reset a message's visibility timeout to `timeout_secs` from now
    async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        timeout_secs: i32,
    ) -> Result<()>;

    /// The queue's configured `VisibilityTimeout`, in seconds
    async fn visibility_timeout(&self, queue_url: &str) -> Result<u64>;

    async fn get_queue_url(&self, queue_name: &str, owner_account_id: &str) -> Result<String>;
}

/// SQS client for consuming lifecycle hook notifications
pub struct SqsClient {
    client: Client,
}

impl FromAwsContext for SqsClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.sqs_client(),
        }
    }
}

#[async_trait]
impl QueueOperations for SqsClient {
    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time_secs: i32,
    ) -> Result<Vec<QueueMessage>> {
        let response = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_time_secs)
            .send()
            .await
            .context("ReceiveMessage failed")?;

        Ok(response.messages().iter().map(QueueMessage::from).collect())
    }

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .context("DeleteMessage failed")?;
        Ok(())
    }

    async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        timeout_secs: i32,
    ) -> Result<()> {
        self.client
            .change_message_visibility()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(timeout_secs)
            .send()
            .await
            .context("ChangeMessageVisibility failed")?;
        Ok(())
    }

    async fn visibility_timeout(&self, queue_url: &str) -> Result<u64> {
        let response = self
            .client
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::VisibilityTimeout)
            .send()
            .await
            .context("GetQueueAttributes failed")?;

        let raw = response
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::VisibilityTimeout))
            .context("VisibilityTimeout attribute not found")?;

        let timeout = parse_visibility_timeout(raw)?;
        debug!(queue_url = %queue_url, visibility_timeout_secs = timeout, "Read queue visibility timeout");
        Ok(timeout)
    }

    async fn get_queue_url(&self, queue_name: &str, owner_account_id: &str) -> Result<String> {
        let response = self
            .client
            .get_queue_url()
            .queue_name(queue_name)
            .queue_owner_aws_account_id(owner_account_id)
            .send()
            .await
            .with_context(|| format!("GetQueueUrl failed for queue '{}'", queue_name))?;

        response
            .queue_url()
            .map(str::to_string)
            .with_context(|| format!("No URL returned for queue '{}'", queue_name))
    }
}

fn parse_visibility_timeout(raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("VisibilityTimeout is not a whole number of seconds: {:?}", raw))
}
