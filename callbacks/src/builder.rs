//! Configuration for [`CallbackRegistry`](crate::CallbackRegistry).

use crate::error::BuildError;
use crate::executor::{Executor, ThreadPerTask};
use crate::pool::ThreadPool;
use crate::registry::CallbackRegistry;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// The smallest pool the builder creates by default.
const MIN_DEFAULT_WORKERS: usize = 4;

enum ExecutorChoice {
  Custom(Arc<dyn Executor>),
  ThreadPool(usize),
  ThreadPerTask,
}

/// A builder for [`CallbackRegistry`] instances.
///
/// Without further configuration the registry runs asynchronous invocations
/// on a dedicated [`ThreadPool`] with one worker per CPU (at least four).
pub struct CallbackRegistryBuilder<A> {
  executor: ExecutorChoice,
  _args: PhantomData<fn(A)>,
}

impl<A> fmt::Debug for CallbackRegistryBuilder<A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let executor = match &self.executor {
      ExecutorChoice::Custom(_) => "custom".to_string(),
      ExecutorChoice::ThreadPool(workers) => format!("thread_pool({})", workers),
      ExecutorChoice::ThreadPerTask => "thread_per_task".to_string(),
    };
    f.debug_struct("CallbackRegistryBuilder")
      .field("executor", &executor)
      .finish()
  }
}

impl<A> Default for CallbackRegistryBuilder<A> {
  fn default() -> Self {
    Self {
      executor: ExecutorChoice::ThreadPool(default_workers()),
      _args: PhantomData,
    }
  }
}

impl<A> CallbackRegistryBuilder<A> {
  /// Creates a builder with the default configuration.
  pub fn new() -> Self {
    Self::default()
  }

  /// Uses a caller-provided executor. It may be shared between registries.
  ///
  /// A synchronous pass waits for each callback's unfinished asynchronous
  /// run, and that run needs a free worker. When callbacks on a shared,
  /// bounded executor call `call_all` on another registry of the same
  /// executor, keep more workers than can be blocked that way at once, or the
  /// queued runs never start and the pool deadlocks.
  pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
    self.executor = ExecutorChoice::Custom(executor);
    self
  }

  /// Runs asynchronous invocations on a dedicated pool of `workers` threads.
  pub fn thread_pool(mut self, workers: usize) -> Self {
    self.executor = ExecutorChoice::ThreadPool(workers);
    self
  }

  /// Spawns one thread per asynchronous invocation.
  pub fn thread_per_task(mut self) -> Self {
    self.executor = ExecutorChoice::ThreadPerTask;
    self
  }

  /// Runs asynchronous invocations on the current Tokio runtime's blocking
  /// pool. Panics if called outside of a Tokio runtime.
  #[cfg(feature = "tokio")]
  pub fn tokio(self) -> Self {
    self.executor(Arc::new(crate::executor::TokioExecutor::new()))
  }

  /// Builds the registry.
  pub fn build(self) -> Result<CallbackRegistry<A>, BuildError>
  where
    A: Clone + Send + 'static,
  {
    let executor: Arc<dyn Executor> = match self.executor {
      ExecutorChoice::Custom(executor) => executor,
      ExecutorChoice::ThreadPool(workers) => Arc::new(ThreadPool::new(workers)?),
      ExecutorChoice::ThreadPerTask => Arc::new(ThreadPerTask),
    };
    Ok(CallbackRegistry::with_executor(executor))
  }
}

fn default_workers() -> usize {
  num_cpus::get().max(MIN_DEFAULT_WORKERS)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_worker_pool_fails_to_build() {
    let result = CallbackRegistryBuilder::<u32>::new().thread_pool(0).build();
    assert!(matches!(result, Err(BuildError::ZeroWorkers)));
  }

  #[test]
  fn default_pool_has_at_least_four_workers() {
    assert!(default_workers() >= MIN_DEFAULT_WORKERS);
    let registry = CallbackRegistryBuilder::<u32>::new().build().unwrap();
    assert!(registry.is_empty());
  }
}
