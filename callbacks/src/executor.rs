//! The seam through which asynchronous callback invocations are run.

use std::thread;

use tracing::warn;

/// A type-erased unit of work handed to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks off the calling thread.
///
/// An executor may drop a task instead of running it (for example after
/// shutdown). The registry observes that as a rejected invocation, so
/// implementations never need to report failures back.
pub trait Executor: Send + Sync + 'static {
  /// Schedules `task` for execution.
  fn execute(&self, task: Task);
}

/// Spawns one named OS thread per task.
///
/// Task volume is not bounded: every asynchronous invocation gets a fresh
/// thread. Prefer [`ThreadPool`](crate::ThreadPool) when the number of
/// registered callbacks is large.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPerTask;

impl Executor for ThreadPerTask {
  fn execute(&self, task: Task) {
    // On spawn failure the closure, and with it the task, is dropped.
    if let Err(err) = thread::Builder::new()
      .name("skein-callback".into())
      .spawn(task)
    {
      warn!(error = %err, "failed to spawn callback thread; task rejected");
    }
  }
}

/// Runs tasks on a Tokio runtime's blocking thread pool.
#[cfg(feature = "tokio")]
pub struct TokioExecutor(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioExecutor {
  /// Creates an executor that uses the current Tokio runtime context.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self(tokio::runtime::Handle::current())
  }

  /// Creates an executor for an explicit runtime handle.
  pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
    Self(handle)
  }

  /// Like [`new`](Self::new), but returns `None` outside of a runtime.
  pub fn try_current() -> Option<Self> {
    tokio::runtime::Handle::try_current().ok().map(Self)
  }
}

#[cfg(feature = "tokio")]
impl Executor for TokioExecutor {
  fn execute(&self, task: Task) {
    // Callbacks are synchronous and may block, so they must not occupy an
    // async worker.
    drop(self.0.spawn_blocking(task));
  }
}

#[cfg(feature = "tokio")]
impl std::fmt::Debug for TokioExecutor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("TokioExecutor").finish()
  }
}
