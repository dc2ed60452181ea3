//! AWS client modules for the watcher
//!
//! - SQS: receiving, deleting and renewing hook notifications
//! - Auto Scaling: completing lifecycle actions and hook discovery
//! - discovery: resolving the notification queue of a group

pub mod autoscaling;
pub mod context;
pub mod discovery;
pub mod error;
pub mod sqs;

// Core clients
pub use autoscaling::{
    AutoscalingClient, AutoscalingOperations, LifecycleActionCompletion, LifecycleHookTarget,
};
pub use context::{AwsContext, FromAwsContext};
pub use sqs::{QueueMessage, QueueOperations, SqsClient};

#[cfg(test)]
pub use autoscaling::MockAutoscalingOperations;
#[cfg(test)]
pub use sqs::MockQueueOperations;

// Queue discovery
pub use discovery::{DiscoveryError, QueueUrl, discover_queue_url, resolve_queue_url};

// Error handling
pub use error::{AwsError, classify_anyhow_error, classify_aws_error};
