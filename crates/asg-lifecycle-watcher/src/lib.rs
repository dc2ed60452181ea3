//! asg-lifecycle-watcher - EC2 Auto Scaling lifecycle hook consumer
//!
//! Long-polls the SQS queue a lifecycle hook publishes to, asks a
//! [`LifecycleHandler`](sandbox::LifecycleHandler) whether each launching or
//! terminating instance may proceed, and reports the decision back to Auto
//! Scaling with `CompleteLifecycleAction`.
//!
//! ```ignore
//! let watcher = LifecycleWatcher::new(sqs, autoscaling, queue_url);
//! watcher
//!     .run(&handler_fn(|event| async move { Ok(Decision::Continue) }))
//!     .await?;
//! ```

pub mod aws;
pub mod commit;
pub mod config;
pub mod hook_command;
pub mod lease;
pub mod observer;
pub mod sandbox;
pub mod watcher;

pub use asg_lifecycle_common::{Decision, LifecycleEvent, LifecycleTransition};
pub use observer::{NoopObserver, TracingObserver, WatchObserver};
pub use sandbox::{HandlerError, LifecycleHandler, handler_fn};
pub use watcher::{LifecycleWatcher, WatchError};
