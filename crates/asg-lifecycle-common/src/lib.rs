//! asg-lifecycle-common - Shared lifecycle hook types
//!
//! This crate holds the types shared by the watcher and its tests, without
//! any AWS SDK dependencies to keep it lightweight.
//!
//! ## Modules
//!
//! - [`event`]: Lifecycle notification codec and transition classification
//! - [`decision`]: The callback's continue/abandon decision
//! - [`arn`]: Structured Amazon Resource Names
//! - [`defaults`]: Default configuration values

pub mod arn;
pub mod decision;
pub mod defaults;
pub mod event;

// Re-export commonly used types
pub use arn::{Arn, ArnError};
pub use decision::Decision;
pub use event::{DecodeError, LifecycleEvent, LifecycleTransition};
