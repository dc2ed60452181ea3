//! Lifecycle handlers and the fault boundary around them
//!
//! A handler decides whether an instance transition should continue. It can
//! fail in two ways, and the watcher treats them differently:
//!
//! - a [`HandlerError`], either returned or raised with
//!   [`HandlerError::raise`], is a business failure. The message is left on
//!   the queue and redelivered once its lease expires.
//! - any other panic is a bug in the handler. It is resumed and takes the
//!   watcher down with it.

use asg_lifecycle_common::{Decision, LifecycleEvent};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use thiserror::Error;

/// Business failure of a lifecycle handler
#[derive(Debug, Error)]
#[error(transparent)]
pub struct HandlerError(#[from] anyhow::Error);

impl HandlerError {
    pub fn msg<M>(message: M) -> Self
    where
        M: Display + Debug + Send + Sync + 'static,
    {
        Self(anyhow::Error::msg(message))
    }

    /// Abort the handler by unwinding with this error as payload.
    ///
    /// The sandbox catches it and treats it like a returned error, which lets
    /// deeply nested code bail out without threading a `Result` through.
    ///
    /// This is still a panic, so the process panic hook runs and by default
    /// prints a "thread panicked" line. Install [`quiet_raised_errors`] to
    /// suppress it.
    pub fn raise(self) -> ! {
        std::panic::panic_any(self)
    }
}

/// Whether a panic payload came from [`HandlerError::raise`]
pub fn is_raised_error(payload: &(dyn Any + Send)) -> bool {
    payload.is::<HandlerError>()
}

/// Wrap the current panic hook so raised [`HandlerError`]s are not printed.
///
/// Every other panic still goes to the previous hook.
pub fn quiet_raised_errors() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if !is_raised_error(info.payload()) {
            previous(info);
        }
    }));
}

/// Decides the outcome of actionable lifecycle events.
///
/// Handlers must be idempotent: the same event is delivered again whenever
/// a previous attempt failed or its lease expired.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    async fn handle(&self, event: &LifecycleEvent) -> Result<Decision, HandlerError>;
}

/// Adapter turning an async closure into a [`LifecycleHandler`]
pub struct HandlerFn<F>(F);

/// Build a handler from a closure taking the event by value.
///
/// ```ignore
/// let handler = handler_fn(|event: LifecycleEvent| async move {
///     drain(&event.instance_id).await?;
///     Ok(Decision::Continue)
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(LifecycleEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Decision, HandlerError>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> LifecycleHandler for HandlerFn<F>
where
    F: Fn(LifecycleEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Decision, HandlerError>> + Send + 'static,
{
    async fn handle(&self, event: &LifecycleEvent) -> Result<Decision, HandlerError> {
        (self.0)(event.clone()).await
    }
}

/// Run `handler` on `event`, absorbing [`HandlerError`] panics.
///
/// Panics with any other payload are resumed unchanged.
pub async fn run_handler<H>(handler: &H, event: &LifecycleEvent) -> Result<Decision, HandlerError>
where
    H: LifecycleHandler + ?Sized,
{
    match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => match payload.downcast::<HandlerError>() {
            Ok(err) => Err(*err),
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}
