//! A fixed-size worker pool fed by a [`BlockingQueue`].

use crate::error::BuildError;
use crate::executor::{Executor, Task};

use parking_lot::Mutex;
use skein::BlockingQueue;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

/// A bounded set of named worker threads draining a shared task queue.
///
/// Tasks run in submission order per worker; across workers there is no
/// ordering. A panicking task is caught and logged, and the worker carries
/// on. Dropping the pool shuts it down.
///
/// A worker blocked inside a task does not pick up anything else. If every
/// worker is running a callback that waits, through a synchronous registry
/// pass, for a run still sitting in this pool's queue, nothing makes
/// progress. Size a shared pool above the number of such nested passes.
pub struct ThreadPool {
  queue: Arc<BlockingQueue<Task>>,
  workers: Mutex<Vec<JoinHandle<()>>>,
  size: usize,
}

impl ThreadPool {
  /// Spawns `workers` threads.
  pub fn new(workers: usize) -> Result<Self, BuildError> {
    if workers == 0 {
      return Err(BuildError::ZeroWorkers);
    }

    let queue: Arc<BlockingQueue<Task>> = Arc::new(BlockingQueue::new());
    let mut handles = Vec::with_capacity(workers);
    for index in 0..workers {
      let worker_queue = Arc::clone(&queue);
      let spawned = thread::Builder::new()
        .name(format!("skein-worker-{}", index))
        .spawn(move || Self::run_worker(&worker_queue));
      match spawned {
        Ok(handle) => handles.push(handle),
        Err(err) => {
          // Unwind the workers that did start before reporting.
          queue.close();
          for handle in handles {
            let _ = handle.join();
          }
          return Err(BuildError::Spawn(err));
        }
      }
    }
    debug!(workers, "thread pool started");

    Ok(Self {
      queue,
      workers: Mutex::new(handles),
      size: workers,
    })
  }

  fn run_worker(queue: &BlockingQueue<Task>) {
    while let Some(task) = queue.pop() {
      if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let message = payload
          .downcast_ref::<&'static str>()
          .map(|s| s.to_string())
          .or_else(|| payload.downcast_ref::<String>().cloned())
          .unwrap_or_default();
        warn!(panic = %message, "task panicked on pool worker");
      }
    }
    trace!("pool worker exiting");
  }

  /// The number of workers the pool was started with.
  pub fn size(&self) -> usize {
    self.size
  }

  /// Tasks submitted but not yet picked up by a worker (snapshot).
  pub fn queued(&self) -> usize {
    self.queue.len()
  }

  /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
  pub fn is_shut_down(&self) -> bool {
    self.queue.is_closed()
  }

  /// Stops accepting tasks, lets the workers finish everything already
  /// queued and joins them.
  ///
  /// Idempotent. When called from one of the pool's own workers, that
  /// worker is not joined (it exits once its current task returns).
  pub fn shutdown(&self) {
    self.queue.close();
    let handles = mem::take(&mut *self.workers.lock());
    if handles.is_empty() {
      return;
    }
    let current = thread::current().id();
    for handle in handles {
      if handle.thread().id() == current {
        continue;
      }
      if handle.join().is_err() {
        warn!("pool worker terminated abnormally");
      }
    }
    debug!(workers = self.size, "thread pool stopped");
  }
}

impl Executor for ThreadPool {
  fn execute(&self, task: Task) {
    if let Err(rejected) = self.queue.push(task) {
      warn!("thread pool is shut down; task rejected");
      drop(rejected);
    }
  }
}

impl Drop for ThreadPool {
  fn drop(&mut self) {
    self.shutdown();
  }
}

impl fmt::Debug for ThreadPool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ThreadPool")
      .field("size", &self.size)
      .field("queued", &self.queued())
      .field("shut_down", &self.is_shut_down())
      .finish()
  }
}
