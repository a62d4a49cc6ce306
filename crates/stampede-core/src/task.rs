//! The task interface driven by the load core.

use crate::error::TaskError;
use crate::outcome::TaskResult;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// The future a task invocation returns.
///
/// `Err(TaskError)` is equivalent to a `TaskResult` with `success == false`;
/// both paths end up classified in the recorded outcome.
pub type TaskFuture = BoxFuture<'static, Result<TaskResult, TaskError>>;

/// One logical unit of work.
///
/// Load, before and after tasks all share this shape. Implementations must be
/// callable from any worker thread; the core invokes `run` once per dispatch
/// and never holds a lock across the returned future.
pub trait LoadTask: Send + Sync {
    fn run(&self) -> TaskFuture;
}

impl<T: LoadTask + ?Sized> LoadTask for Arc<T> {
    fn run(&self) -> TaskFuture {
        (**self).run()
    }
}

/// A [`LoadTask`] backed by a closure.
///
/// ```
/// use stampede_core::{FnTask, TaskResult};
///
/// let task = FnTask::new(|| async {
///     // issue the request here
///     Ok(TaskResult::success(12.5).with_status(200))
/// });
/// ```
pub struct FnTask<F> {
    f: F,
}

impl<F, Fut> FnTask<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskResult, TaskError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> LoadTask for FnTask<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskResult, TaskError>> + Send + 'static,
{
    fn run(&self) -> TaskFuture {
        Box::pin((self.f)())
    }
}
