//! A one-shot result slot connecting an async invocation to its waiters.
//!
//! The [`Completer`] travels with the task into the executor; the
//! [`Completion`] stays in the registry slot. Dropping a `Completer` without
//! completing it (the executor discarded the task) resolves the slot with
//! [`CallbackError::Rejected`], so a waiter can never hang on a task that
//! will not run.

use crate::error::CallbackError;

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Outcome = Result<(), CallbackError>;

struct Shared {
  result: Mutex<Option<Outcome>>,
  ready: Condvar,
  finished: AtomicBool,
}

impl Shared {
  fn finish(&self, outcome: Outcome) {
    {
      let mut result = self.result.lock();
      *result = Some(outcome);
      self.finished.store(true, Ordering::Release);
    }
    self.ready.notify_all();
  }
}

/// Creates a connected completer/completion pair.
pub(crate) fn pair() -> (Completer, Completion) {
  let shared = Arc::new(Shared {
    result: Mutex::new(None),
    ready: Condvar::new(),
    finished: AtomicBool::new(false),
  });
  (
    Completer {
      shared: Some(Arc::clone(&shared)),
    },
    Completion { shared },
  )
}

/// The producing half. Resolves the completion exactly once.
pub(crate) struct Completer {
  shared: Option<Arc<Shared>>,
}

impl Completer {
  pub(crate) fn complete(mut self, outcome: Outcome) {
    if let Some(shared) = self.shared.take() {
      shared.finish(outcome);
    }
  }
}

impl Drop for Completer {
  fn drop(&mut self) {
    if let Some(shared) = self.shared.take() {
      shared.finish(Err(CallbackError::Rejected));
    }
  }
}

/// The consuming half, held by the registry while the invocation is
/// outstanding.
pub(crate) struct Completion {
  shared: Arc<Shared>,
}

impl Completion {
  /// Non-blocking check.
  #[inline]
  pub(crate) fn is_finished(&self) -> bool {
    self.shared.finished.load(Ordering::Acquire)
  }

  /// Blocks until the invocation has finished.
  pub(crate) fn wait(&self) {
    if self.is_finished() {
      return;
    }
    let mut result = self.shared.result.lock();
    self.shared.ready.wait_while(&mut result, |r| r.is_none());
  }

  /// Waits at most `timeout` (`None` waits without limit). Returns `true` if
  /// the invocation has finished. A zero timeout only polls.
  pub(crate) fn wait_for(&self, timeout: Option<Duration>) -> bool {
    let timeout = match timeout {
      None => {
        self.wait();
        return true;
      }
      Some(timeout) => timeout,
    };
    if self.is_finished() {
      return true;
    }
    if timeout.is_zero() {
      return false;
    }
    let mut result = self.shared.result.lock();
    self
      .shared
      .ready
      .wait_while_for(&mut result, |r| r.is_none(), timeout);
    result.is_some()
  }

  /// Waits for the invocation and consumes its result.
  pub(crate) fn into_result(self) -> Outcome {
    self.wait();
    let mut result = self.shared.result.lock();
    result.take().unwrap_or(Err(CallbackError::Rejected))
  }
}

impl fmt::Debug for Completion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Completion")
      .field("finished", &self.is_finished())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;
  use std::time::Instant;

  #[test]
  fn complete_from_another_thread() {
    let (completer, completion) = pair();
    assert!(!completion.is_finished());
    assert!(!completion.wait_for(Some(Duration::ZERO)));

    let worker = thread::spawn(move || {
      thread::sleep(Duration::from_millis(30));
      completer.complete(Ok(()));
    });

    assert!(completion.wait_for(None));
    assert!(completion.is_finished());
    assert!(completion.into_result().is_ok());
    worker.join().unwrap();
  }

  #[test]
  fn timed_wait_gives_up() {
    let (_completer, completion) = pair();
    let start = Instant::now();
    assert!(!completion.wait_for(Some(Duration::from_millis(40))));
    assert!(start.elapsed() >= Duration::from_millis(40));
  }

  #[test]
  fn dropped_completer_rejects() {
    let (completer, completion) = pair();
    drop(completer);
    assert!(completion.is_finished());
    assert!(matches!(completion.into_result(), Err(CallbackError::Rejected)));
  }

  #[test]
  fn failure_is_kept_until_consumed() {
    let (completer, completion) = pair();
    completer.complete(Err(CallbackError::Panicked("x".into())));
    assert!(completion.wait_for(Some(Duration::from_millis(1))));
    assert!(completion.into_result().unwrap_err().is_panicked());
  }
}
