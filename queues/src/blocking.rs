//! An unbounded FIFO queue with a blocking `pop`.
//!
//! `BlockingQueue` guards a `VecDeque` and its closed flag with a single
//! `parking_lot::Mutex`. Consumers park on a `parking_lot::Condvar` whose wait
//! predicate is "not empty or closed". Pushing never blocks: the queue has no
//! capacity limit and a closed queue refuses elements immediately.
//!
//! The length and the closed flag are mirrored into atomics so that
//! `len`, `is_empty` and `is_closed` never touch the lock. Those reads are
//! snapshots and may lag behind an in-flight operation.
//!
//! ### Wake-up policy
//!
//! A notify is only issued when the wait predicate may have become true.
//! After a `pop` that leaves elements behind, an open queue wakes one more
//! consumer (avoiding a thundering herd) while a closed queue wakes all of
//! them so every blocked consumer observes the closure promptly.

use crate::error::PushError;

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

struct State<T> {
  queue: VecDeque<T>,
  closed: bool,
}

/// A thread-safe, unbounded FIFO queue with a blocking consumer interface.
///
/// Any number of threads may push and pop concurrently through a shared
/// reference (typically an `Arc<BlockingQueue<T>>`). Each element is
/// delivered to exactly one consumer.
pub struct BlockingQueue<T> {
  state: Mutex<State<T>>,
  available: Condvar,
  len: CachePadded<AtomicUsize>,
  closed: AtomicBool,
}

impl<T> BlockingQueue<T> {
  /// Creates a new, empty and open queue.
  pub fn new() -> Self {
    Self {
      state: Mutex::new(State {
        queue: VecDeque::new(),
        closed: false,
      }),
      available: Condvar::new(),
      len: CachePadded::new(AtomicUsize::new(0)),
      closed: AtomicBool::new(false),
    }
  }

  /// Appends `value` to the back of the queue.
  ///
  /// Returns immediately in every case. If the queue is closed the value is
  /// handed back inside the error and all blocked consumers are woken so
  /// they can observe the closure.
  pub fn push(&self, value: T) -> Result<(), PushError<T>> {
    let mut state = self.state.lock();
    if state.closed {
      self.available.notify_all();
      return Err(PushError(value));
    }
    state.queue.push_back(value);
    self.len.store(state.queue.len(), Ordering::Release);
    self.available.notify_one();
    Ok(())
  }

  /// Removes and returns the front element, blocking while the queue is
  /// open and empty.
  ///
  /// Returns `None` once the queue is closed and fully drained.
  pub fn pop(&self) -> Option<T> {
    let mut state = self.state.lock();
    self
      .available
      .wait_while(&mut state, |s| s.queue.is_empty() && !s.closed);
    self.take_front(&mut state)
  }

  /// Like [`pop`](Self::pop), but gives up after `timeout`.
  ///
  /// Returns `None` on timeout, leaving the queue untouched, or when the
  /// queue is closed and empty.
  pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
    let mut state = self.state.lock();
    // An element that lands right at the deadline is still taken.
    self
      .available
      .wait_while_for(&mut state, |s| s.queue.is_empty() && !s.closed, timeout);
    self.take_front(&mut state)
  }

  /// Pops with an optional bound: `None` waits without limit.
  #[inline]
  pub fn pop_for(&self, timeout: Option<Duration>) -> Option<T> {
    match timeout {
      Some(timeout) => self.pop_timeout(timeout),
      None => self.pop(),
    }
  }

  // Called with the lock held once the wait predicate holds.
  fn take_front(&self, state: &mut MutexGuard<'_, State<T>>) -> Option<T> {
    let value = state.queue.pop_front()?;
    self.len.store(state.queue.len(), Ordering::Release);
    if !state.queue.is_empty() {
      self.wake_after_change(state.closed);
    }
    Some(value)
  }

  #[inline]
  fn wake_after_change(&self, closed: bool) {
    if closed {
      self.available.notify_all();
    } else {
      self.available.notify_one();
    }
  }

  /// Closes the queue. Subsequent pushes fail; buffered elements can still
  /// be popped. Closing is permanent and idempotent.
  pub fn close(&self) {
    {
      let mut state = self.state.lock();
      state.closed = true;
      self.closed.store(true, Ordering::Release);
    }
    self.available.notify_all();
  }

  /// Discards every buffered element.
  ///
  /// With `reopen == false` the queue is also closed. An already closed
  /// queue stays closed either way. All blocked consumers are woken.
  pub fn reset(&self, reopen: bool) {
    let drained = {
      let mut state = self.state.lock();
      if !reopen {
        state.closed = true;
        self.closed.store(true, Ordering::Release);
      }
      self.len.store(0, Ordering::Release);
      mem::take(&mut state.queue)
    };
    self.available.notify_all();
    // Drop the elements outside the lock.
    drop(drained);
  }

  /// Removes every element for which `filter` returns `true`, keeping the
  /// relative order of the remaining elements.
  ///
  /// Returns `true` if at least one element was removed. If `filter` panics
  /// the queue is left unchanged.
  pub fn remove_by_filter<F>(&self, mut filter: F) -> bool
  where
    F: FnMut(&T) -> bool,
  {
    let mut state = self.state.lock();
    // The filter runs before anything moves, so a panicking filter leaves
    // the queue as it was.
    let doomed: Vec<bool> = state.queue.iter().map(|value| filter(value)).collect();
    if !doomed.contains(&true) {
      return false;
    }
    let mut doomed = doomed.into_iter();
    state.queue.retain(|_| !doomed.next().unwrap_or(false));
    let after = state.queue.len();
    self.len.store(after, Ordering::Release);
    if after != 0 {
      self.wake_after_change(state.closed);
    }
    true
  }

  /// Returns `true` if the queue is non-empty and `predicate` holds for the
  /// front element. The element is not removed.
  pub fn is_front<P>(&self, predicate: P) -> bool
  where
    P: FnOnce(&T) -> bool,
  {
    if self.is_empty() {
      return false;
    }
    let state = self.state.lock();
    state.queue.front().is_some_and(predicate)
  }

  /// Moves every buffered element and the closed state into a new queue.
  ///
  /// `self` is left empty and closed, and its blocked consumers are woken
  /// (they will observe the closure and return `None`).
  pub fn take(&self) -> BlockingQueue<T> {
    let (queue, closed) = {
      let mut state = self.state.lock();
      let queue = mem::take(&mut state.queue);
      let closed = mem::replace(&mut state.closed, true);
      self.closed.store(true, Ordering::Release);
      self.len.store(0, Ordering::Release);
      (queue, closed)
    };
    self.available.notify_all();

    let len = queue.len();
    BlockingQueue {
      state: Mutex::new(State { queue, closed }),
      available: Condvar::new(),
      len: CachePadded::new(AtomicUsize::new(len)),
      closed: AtomicBool::new(closed),
    }
  }

  /// Returns `true` if the queue has been closed.
  #[inline]
  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Relaxed)
  }

  /// Returns `true` if the queue currently holds no elements (snapshot).
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len.load(Ordering::Relaxed) == 0
  }

  /// Returns the number of buffered elements (snapshot).
  ///
  /// A concurrent push or pop may be in progress, so the value can be stale
  /// by the time it is observed.
  #[inline]
  pub fn len(&self) -> usize {
    self.len.load(Ordering::Relaxed)
  }
}

impl<T> Default for BlockingQueue<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for BlockingQueue<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BlockingQueue")
      .field("len", &self.len())
      .field("closed", &self.is_closed())
      .finish_non_exhaustive()
  }
}
