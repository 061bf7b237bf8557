//! The callback registry.
//!
//! All slot state lives behind one `parking_lot::Mutex`. Synchronous passes
//! (`call_all`, `call_all_quiet`) and the wait operations hold that mutex for
//! their whole duration, so every other registry method blocks until they
//! return; only [`CallbackRegistry::is_pending_operation`] stays readable.
//! Asynchronous invocations run on the executor outside the mutex and report
//! back through a per-slot [`Completion`].

use crate::builder::CallbackRegistryBuilder;
use crate::completion::{self, Completion};
use crate::error::{CallbackError, FailureMode};
use crate::executor::{Executor, ThreadPerTask};
use crate::handle::CallbackHandle;
use crate::outcome::CallbackOutcome;

use parking_lot::Mutex;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

type Callback<A> = Arc<dyn Fn(A) -> Result<(), CallbackError> + Send + Sync>;

struct Slot<A> {
  callback: Option<Callback<A>>,
  pending: Option<Completion>,
  generation: u64,
}

struct Slots<A> {
  slots: Vec<Slot<A>>,
  next_generation: u64,
  registered: usize,
}

impl<A> Slots<A> {
  fn starting_at(next_generation: u64) -> Self {
    Self {
      slots: Vec::new(),
      next_generation,
      registered: 0,
    }
  }

  fn get(&self, handle: CallbackHandle) -> Option<&Slot<A>> {
    self
      .slots
      .get(handle.index())
      .filter(|slot| slot.callback.is_some() && slot.generation == handle.generation())
  }

  fn get_mut(&mut self, handle: CallbackHandle) -> Option<&mut Slot<A>> {
    self
      .slots
      .get_mut(handle.index())
      .filter(|slot| slot.callback.is_some() && slot.generation == handle.generation())
  }

  /// Waits for every outstanding invocation, discarding the results, and
  /// empties the table. Returns how many invocations were still running.
  fn drain(&mut self) -> usize {
    let mut running = 0;
    for slot in &mut self.slots {
      if let Some(completion) = slot.pending.take() {
        if !completion.is_finished() {
          running += 1;
        }
        if let Err(err) = completion.into_result() {
          trace!(error = %err, "discarding result of drained callback");
        }
      }
    }
    self.slots.clear();
    self.registered = 0;
    running
  }
}

// Raises the pending-operation flag for the lifetime of the guard.
struct PendingOperationGuard<'a>(&'a AtomicBool);

impl<'a> PendingOperationGuard<'a> {
  fn enter(flag: &'a AtomicBool) -> Self {
    flag.store(true, Ordering::Release);
    Self(flag)
  }
}

impl Drop for PendingOperationGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

fn invoke<A>(callback: &Callback<A>, args: A) -> Result<(), CallbackError> {
  match panic::catch_unwind(AssertUnwindSafe(|| callback(args))) {
    Ok(result) => result,
    Err(payload) => Err(CallbackError::from_panic(payload)),
  }
}

fn settle(index: usize, result: Result<(), CallbackError>, mode: FailureMode) -> Result<bool, CallbackError> {
  match result {
    Ok(()) => Ok(true),
    Err(err) => match mode {
      FailureMode::Capture => {
        debug!(index, error = %err, "async callback failed");
        Ok(false)
      }
      FailureMode::Propagate => Err(err),
    },
  }
}

/// A thread-safe set of callbacks taking an argument of type `A`.
///
/// Callbacks are invoked in ascending handle order with a clone of the
/// arguments; use a tuple for several parameters. A callback returns either
/// `()` or `Result<(), E>`. Returning `Err` and panicking both count as a
/// failure.
///
/// Callbacks must not call back into the registry that is invoking them
/// synchronously: the registry's lock is held during the pass.
///
/// Dropping the registry waits for every outstanding asynchronous invocation.
pub struct CallbackRegistry<A> {
  inner: Mutex<Slots<A>>,
  pending_operation: AtomicBool,
  executor: Arc<dyn Executor>,
}

impl<A> CallbackRegistry<A>
where
  A: Clone + Send + 'static,
{
  /// Creates an empty registry that spawns one thread per asynchronous
  /// invocation. Use [`builder`](Self::builder) for a pooled executor.
  pub fn new() -> Self {
    Self::with_executor(Arc::new(ThreadPerTask))
  }

  /// Creates an empty registry running asynchronous invocations on
  /// `executor`.
  pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
    Self {
      inner: Mutex::new(Slots::starting_at(0)),
      pending_operation: AtomicBool::new(false),
      executor,
    }
  }

  /// Returns a builder to configure the executor.
  pub fn builder() -> CallbackRegistryBuilder<A> {
    CallbackRegistryBuilder::new()
  }

  /// Registers `callback` in the lowest free slot and returns its handle.
  pub fn add_callback<F, R>(&self, callback: F) -> CallbackHandle
  where
    F: Fn(A) -> R + Send + Sync + 'static,
    R: CallbackOutcome,
  {
    let callback: Callback<A> = Arc::new(move |args| callback(args).into_result());

    let mut inner = self.inner.lock();
    let generation = inner.next_generation;
    inner.next_generation += 1;
    inner.registered += 1;

    let index = match inner.slots.iter().position(|slot| slot.callback.is_none()) {
      Some(index) => {
        let slot = &mut inner.slots[index];
        slot.callback = Some(callback);
        slot.pending = None;
        slot.generation = generation;
        index
      }
      None => {
        inner.slots.push(Slot {
          callback: Some(callback),
          pending: None,
          generation,
        });
        inner.slots.len() - 1
      }
    };

    let handle = CallbackHandle::new(index, generation);
    trace!(%handle, "callback added");
    handle
  }

  /// Unregisters the callback behind `handle`.
  ///
  /// Returns `false` if the handle is not valid. An outstanding asynchronous
  /// invocation is awaited first and its result discarded.
  pub fn remove_callback(&self, handle: CallbackHandle) -> bool {
    let mut inner = self.inner.lock();
    let Some(slot) = inner.get_mut(handle) else {
      return false;
    };
    if let Some(completion) = slot.pending.take() {
      if let Err(err) = completion.into_result() {
        debug!(%handle, error = %err, "discarding result of removed callback");
      }
    }
    slot.callback = None;
    inner.registered -= 1;
    trace!(%handle, "callback removed");
    true
  }

  /// Unregisters every callback, waiting for outstanding asynchronous
  /// invocations first. Their results are discarded.
  pub fn remove_all_callbacks(&self) {
    let mut inner = self.inner.lock();
    let running = inner.drain();
    if running > 0 {
      warn!(running, "removing callbacks while asynchronous invocations were still running");
    }
  }

  /// Returns `true` if `handle` refers to a registered callback.
  pub fn is_valid(&self, handle: CallbackHandle) -> bool {
    self.inner.lock().get(handle).is_some()
  }

  /// The number of registered callbacks.
  pub fn len(&self) -> usize {
    self.inner.lock().registered
  }

  /// Returns `true` if no callback is registered.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns `true` while a synchronous pass or a wait operation holds the
  /// registry. Never blocks.
  pub fn is_pending_operation(&self) -> bool {
    self.pending_operation.load(Ordering::Acquire)
  }

  /// Returns `true` if the callback behind `handle` has an asynchronous
  /// invocation that has not finished yet.
  pub fn is_callback_pending(&self, handle: CallbackHandle) -> bool {
    let inner = self.inner.lock();
    inner
      .get(handle)
      .and_then(|slot| slot.pending.as_ref())
      .is_some_and(|completion| !completion.is_finished())
  }

  /// Returns `true` if any asynchronous invocation has not finished yet.
  pub fn is_any_callback_pending(&self) -> bool {
    let inner = self.inner.lock();
    inner
      .slots
      .iter()
      .filter_map(|slot| slot.pending.as_ref())
      .any(|completion| !completion.is_finished())
  }

  /// Invokes every callback on the calling thread.
  ///
  /// Stops at the first failure and returns it; callbacks with higher
  /// handles are not invoked in that pass.
  pub fn call_all(&self, args: A) -> Result<(), CallbackError> {
    let inner = self.inner.lock();
    let _operation = PendingOperationGuard::enter(&self.pending_operation);

    for (index, slot) in inner.slots.iter().enumerate() {
      let Some(callback) = &slot.callback else {
        continue;
      };
      // Never overlap with this callback's own asynchronous run.
      if let Some(completion) = &slot.pending {
        completion.wait();
      }
      if let Err(err) = invoke(callback, args.clone()) {
        debug!(index, error = %err, "callback failed; aborting pass");
        return Err(err);
      }
    }
    Ok(())
  }

  /// Invokes every callback on the calling thread, capturing failures.
  ///
  /// Returns `true` if every callback succeeded.
  pub fn call_all_quiet(&self, args: A) -> bool {
    let inner = self.inner.lock();
    let _operation = PendingOperationGuard::enter(&self.pending_operation);

    let mut success = true;
    for (index, slot) in inner.slots.iter().enumerate() {
      let Some(callback) = &slot.callback else {
        continue;
      };
      if let Some(completion) = &slot.pending {
        completion.wait();
      }
      if let Err(err) = invoke(callback, args.clone()) {
        warn!(index, error = %err, "callback failed");
        success = false;
      }
    }
    success
  }

  /// Launches every callback on the executor and returns without waiting.
  ///
  /// A callback whose previous asynchronous invocation is still running is
  /// skipped, so no callback ever runs concurrently with itself. Returns
  /// `false` if any callback was skipped. A finished but unobserved result
  /// is superseded by the new launch.
  pub fn call_all_async(&self, args: A) -> bool {
    let mut inner = self.inner.lock();
    let mut launched_all = true;

    for (index, slot) in inner.slots.iter_mut().enumerate() {
      let Some(callback) = &slot.callback else {
        continue;
      };
      if let Some(previous) = &slot.pending {
        if !previous.is_finished() {
          trace!(index, "callback still running; skipped");
          launched_all = false;
          continue;
        }
      }

      let callback = Arc::clone(callback);
      let args = args.clone();
      let (completer, completion) = completion::pair();
      if let Some(superseded) = slot.pending.replace(completion) {
        if let Err(err) = superseded.into_result() {
          trace!(index, error = %err, "unobserved failure superseded");
        }
      }
      self
        .executor
        .execute(Box::new(move || completer.complete(invoke(&callback, args))));
    }

    if !launched_all {
      debug!("call_all_async skipped callbacks that were still running");
    }
    launched_all
  }

  /// Waits for the outstanding asynchronous invocation of one callback and
  /// consumes its result.
  ///
  /// `timeout` of `None` waits without limit; `Some(Duration::ZERO)` only
  /// polls. Returns `Ok(false)` on timeout (the invocation stays
  /// outstanding) and `Ok(true)` on success or when nothing is outstanding
  /// for `handle`. A failed invocation yields `Ok(false)` with
  /// [`FailureMode::Capture`] and the error with [`FailureMode::Propagate`].
  pub fn wait_for_callback(
    &self,
    handle: CallbackHandle,
    mode: FailureMode,
    timeout: Option<Duration>,
  ) -> Result<bool, CallbackError> {
    let mut inner = self.inner.lock();
    let _operation = PendingOperationGuard::enter(&self.pending_operation);

    let Some(slot) = inner.get_mut(handle) else {
      return Ok(true);
    };
    let finished = match &slot.pending {
      Some(completion) => completion.wait_for(timeout),
      None => return Ok(true),
    };
    if !finished {
      return Ok(false);
    }
    match slot.pending.take() {
      Some(completion) => settle(handle.index(), completion.into_result(), mode),
      None => Ok(true),
    }
  }

  /// Waits for every outstanding asynchronous invocation, in ascending
  /// handle order, consuming the results.
  ///
  /// All handles share one `timeout` budget, recomputed after each handle;
  /// once it is spent, the remaining handles are only polled. A slow
  /// callback can therefore starve later ones of waiting time. Returns
  /// `Ok(true)` only if every outstanding invocation finished cleanly in
  /// time. With [`FailureMode::Propagate`] the first failure is returned
  /// and later results are left unconsumed.
  pub fn wait_for_all_callbacks(&self, mode: FailureMode, timeout: Option<Duration>) -> Result<bool, CallbackError> {
    let mut inner = self.inner.lock();
    let _operation = PendingOperationGuard::enter(&self.pending_operation);

    let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
    let mut success = true;

    for (index, slot) in inner.slots.iter_mut().enumerate() {
      if slot.callback.is_none() {
        continue;
      }
      let Some(completion) = &slot.pending else {
        continue;
      };
      // A budget too large to represent as an instant waits without limit.
      let remaining = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
      if !completion.wait_for(remaining) {
        trace!(index, "async callback still running after wait budget");
        success = false;
        continue;
      }
      if let Some(completion) = slot.pending.take() {
        success &= settle(index, completion.into_result(), mode)?;
      }
    }
    Ok(success)
  }

  /// Moves every callback and outstanding invocation into a new registry
  /// that shares this registry's executor. `self` is left empty.
  ///
  /// Handles issued by `self` remain valid for the returned registry.
  pub fn take(&self) -> CallbackRegistry<A> {
    let mut inner = self.inner.lock();
    let next_generation = inner.next_generation;
    let slots = mem::replace(&mut *inner, Slots::starting_at(next_generation));
    CallbackRegistry {
      inner: Mutex::new(slots),
      pending_operation: AtomicBool::new(false),
      executor: Arc::clone(&self.executor),
    }
  }
}

impl<A> Default for CallbackRegistry<A>
where
  A: Clone + Send + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<A> Drop for CallbackRegistry<A> {
  fn drop(&mut self) {
    let running = self.inner.get_mut().drain();
    if running > 0 {
      debug!(running, "registry dropped; waited for running callbacks");
    }
  }
}

impl<A> fmt::Debug for CallbackRegistry<A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut debug = f.debug_struct("CallbackRegistry");
    match self.inner.try_lock() {
      Some(inner) => debug.field("len", &inner.registered).field("slots", &inner.slots.len()),
      None => debug.field("len", &"<locked>"),
    };
    debug
      .field("pending_operation", &self.pending_operation.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use std::thread;

  #[test]
  fn lowest_free_slot_is_reused_with_new_generation() {
    let registry = CallbackRegistry::<()>::new();
    let a = registry.add_callback(|_| {});
    let b = registry.add_callback(|_| {});
    assert_eq!((a.index(), b.index()), (0, 1));

    assert!(registry.remove_callback(a));
    assert!(!registry.remove_callback(a));
    let c = registry.add_callback(|_| {});
    assert_eq!(c.index(), 0);
    assert_ne!(c, a);
    assert!(!registry.is_valid(a));
    assert!(registry.is_valid(c));
    assert_eq!(registry.len(), 2);
  }

  #[test]
  fn pending_operation_flag_is_raised_during_pass() {
    let registry = Arc::new(CallbackRegistry::<()>::new());
    let observed = Arc::new(AtomicBool::new(false));
    let entered = Arc::new(AtomicBool::new(false));
    {
      let entered = Arc::clone(&entered);
      registry.add_callback(move |_| {
        entered.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
      });
    }

    let watcher = {
      let registry = Arc::clone(&registry);
      let observed = Arc::clone(&observed);
      thread::spawn(move || {
        while !entered.load(Ordering::SeqCst) {
          thread::yield_now();
        }
        observed.store(registry.is_pending_operation(), Ordering::SeqCst);
      })
    };

    registry.call_all(()).unwrap();
    watcher.join().unwrap();
    assert!(observed.load(Ordering::SeqCst));
    assert!(!registry.is_pending_operation());
  }

  #[test]
  fn drop_waits_for_running_callbacks() {
    let finished = Arc::new(AtomicUsize::new(0));
    let registry = CallbackRegistry::<u64>::new();
    for _ in 0..3 {
      let finished = Arc::clone(&finished);
      registry.add_callback(move |ms| {
        thread::sleep(Duration::from_millis(ms));
        finished.fetch_add(1, Ordering::SeqCst);
      });
    }
    assert!(registry.call_all_async(50));
    drop(registry);
    assert_eq!(finished.load(Ordering::SeqCst), 3);
  }
}
