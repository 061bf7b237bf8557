//! A spin-locked, optionally bounded FIFO queue with a try-only interface.
//!
//! Despite never blocking, this queue is **not** lock-free: every mutation
//! runs inside a critical section guarded by a [`SpinFlag`]. Contending
//! threads busy-wait for the duration of one enqueue, one dequeue or one
//! filter pass. That makes it a good fit when elements are cheap to move and
//! contention is low. For expensive element types, queue a `Box<T>` or an
//! `Arc<T>` instead so the critical section stays short.
//!
//! `is_empty` and `is_closed` read cached atomics and never take the flag.
//! `try_pop` uses the cached emptiness as a fast path, so a pop racing an
//! in-flight push on an empty queue may return `None` even though the push
//! completes an instant later.

use crate::error::TryPushError;
use crate::spin_flag::SpinFlag;

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};

/// A thread-safe FIFO queue guarded by a spin flag, with an optional
/// capacity limit.
pub struct SpinQueue<T> {
  flag: CachePadded<SpinFlag>,
  is_empty: CachePadded<AtomicBool>,
  is_closed: AtomicBool,
  max_size: usize,
  queue: UnsafeCell<VecDeque<T>>,
}

// The VecDeque is only ever accessed while `flag` is held.
unsafe impl<T: Send> Send for SpinQueue<T> {}
unsafe impl<T: Send> Sync for SpinQueue<T> {}

impl<T> SpinQueue<T> {
  /// Creates an empty, open queue without a capacity limit.
  pub fn new() -> Self {
    Self::with_capacity(usize::MAX)
  }

  /// Creates an empty, open queue that holds at most `max_size` elements.
  ///
  /// A `max_size` of `0` yields a queue that refuses every push.
  pub fn with_capacity(max_size: usize) -> Self {
    Self::from_parts(VecDeque::new(), max_size, false)
  }

  fn from_parts(queue: VecDeque<T>, max_size: usize, closed: bool) -> Self {
    Self {
      flag: CachePadded::new(SpinFlag::new()),
      is_empty: CachePadded::new(AtomicBool::new(queue.is_empty())),
      is_closed: AtomicBool::new(closed),
      max_size,
      queue: UnsafeCell::new(queue),
    }
  }

  /// Runs `f` on the underlying deque while holding the spin flag.
  #[inline]
  fn locked<R>(&self, f: impl FnOnce(&mut VecDeque<T>) -> R) -> R {
    let _guard = self.flag.lock();
    // Safety: the flag grants exclusive access to the deque until `_guard`
    // is dropped.
    let queue = unsafe { &mut *self.queue.get() };
    f(queue)
  }

  /// Appends `value` if the queue is open and below its capacity.
  ///
  /// On failure the value is handed back inside the error.
  pub fn try_push(&self, value: T) -> Result<(), TryPushError<T>> {
    if self.is_closed.load(Ordering::Relaxed) {
      return Err(TryPushError::Closed(value));
    }
    self.locked(|queue| {
      if self.is_closed.load(Ordering::Acquire) {
        return Err(TryPushError::Closed(value));
      }
      if queue.len() >= self.max_size {
        return Err(TryPushError::Full(value));
      }
      queue.push_back(value);
      self.is_empty.store(false, Ordering::Release);
      Ok(())
    })
  }

  /// Removes and returns the front element, or `None` if the queue is empty.
  pub fn try_pop(&self) -> Option<T> {
    if self.is_empty.load(Ordering::Acquire) {
      return None;
    }
    self.locked(|queue| {
      let value = queue.pop_front();
      if queue.is_empty() {
        self.is_empty.store(true, Ordering::Release);
      }
      value
    })
  }

  /// Closes the queue. Subsequent pushes fail with
  /// [`TryPushError::Closed`]; buffered elements remain poppable.
  /// Closing is permanent.
  pub fn close(&self) {
    if !self.is_closed.load(Ordering::Relaxed) {
      let _guard = self.flag.lock();
      self.is_closed.store(true, Ordering::Release);
    }
  }

  /// Discards every buffered element. The closed state is unchanged.
  pub fn reset(&self) {
    let drained = self.locked(|queue| {
      self.is_empty.store(true, Ordering::Release);
      mem::take(queue)
    });
    drop(drained);
  }

  /// Removes every element for which `filter` returns `true`, keeping the
  /// relative order of the rest. Returns `true` if anything was removed.
  ///
  /// The whole pass runs inside the critical section; keep `filter` cheap. If
  /// `filter` panics the queue is left unchanged.
  pub fn remove_by_filter<F>(&self, mut filter: F) -> bool
  where
    F: FnMut(&T) -> bool,
  {
    self.locked(|queue| {
      let doomed: Vec<bool> = queue.iter().map(|value| filter(value)).collect();
      if !doomed.contains(&true) {
        return false;
      }
      let mut doomed = doomed.into_iter();
      queue.retain(|_| !doomed.next().unwrap_or(false));
      self.is_empty.store(queue.is_empty(), Ordering::Release);
      true
    })
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
    self.locked(|queue| queue.front().is_some_and(predicate))
  }

  /// Moves every buffered element, the capacity and the closed state into a
  /// new queue. `self` is left empty and closed.
  pub fn take(&self) -> SpinQueue<T> {
    let (queue, closed) = self.locked(|queue| {
      let closed = self.is_closed.swap(true, Ordering::AcqRel);
      self.is_empty.store(true, Ordering::Release);
      (mem::take(queue), closed)
    });
    Self::from_parts(queue, self.max_size, closed)
  }

  /// Returns `true` if the queue has been closed.
  #[inline]
  pub fn is_closed(&self) -> bool {
    self.is_closed.load(Ordering::Relaxed)
  }

  /// Returns `true` if the queue holds no elements (cached, lock-free).
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.is_empty.load(Ordering::Relaxed)
  }

  /// Returns `true` if the queue holds `max_size` elements.
  pub fn is_full(&self) -> bool {
    self.locked(|queue| queue.len() >= self.max_size)
  }

  /// Returns the exact number of buffered elements.
  pub fn len(&self) -> usize {
    self.locked(|queue| queue.len())
  }

  /// Returns the capacity fixed at construction (`usize::MAX` if unbounded).
  #[inline]
  pub fn max_size(&self) -> usize {
    self.max_size
  }
}

impl<T> Default for SpinQueue<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for SpinQueue<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SpinQueue")
      .field("max_size", &self.max_size)
      .field("is_empty", &self.is_empty())
      .field("is_closed", &self.is_closed())
      .finish_non_exhaustive()
  }
}
