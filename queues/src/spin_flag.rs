//! A minimal test-and-set spin flag.
//!
//! `SpinFlag` is the mutual-exclusion primitive behind [`SpinQueue`](crate::SpinQueue).
//! It never parks or yields the thread: a contended `lock` busy-waits until the
//! holder clears the flag. Critical sections guarded by it must be short.

use crossbeam_utils::Backoff;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// An atomic test-and-set flag used as a spin lock.
pub struct SpinFlag {
  locked: AtomicBool,
}

impl SpinFlag {
  /// Creates a new, cleared flag.
  pub const fn new() -> Self {
    Self {
      locked: AtomicBool::new(false),
    }
  }

  /// Sets the flag, spinning until it was previously clear.
  ///
  /// The flag is cleared again when the returned guard is dropped.
  #[inline]
  pub fn lock(&self) -> SpinFlagGuard<'_> {
    let backoff = Backoff::new();
    loop {
      if !self.locked.swap(true, Ordering::Acquire) {
        return SpinFlagGuard { flag: self };
      }
      // Test-and-test-and-set: wait on a plain load so contending threads
      // don't keep invalidating the cache line with writes.
      while self.locked.load(Ordering::Relaxed) {
        backoff.spin();
      }
    }
  }

  /// Sets the flag if it is currently clear, without spinning.
  #[inline]
  pub fn try_lock(&self) -> Option<SpinFlagGuard<'_>> {
    if self.locked.swap(true, Ordering::Acquire) {
      None
    } else {
      Some(SpinFlagGuard { flag: self })
    }
  }

  /// Returns `true` if some guard currently holds the flag.
  #[inline]
  pub fn is_locked(&self) -> bool {
    self.locked.load(Ordering::Relaxed)
  }
}

impl Default for SpinFlag {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for SpinFlag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SpinFlag")
      .field("locked", &self.is_locked())
      .finish()
  }
}

/// RAII guard returned by [`SpinFlag::lock`]. Clears the flag on drop.
#[must_use = "dropping the guard immediately clears the flag"]
pub struct SpinFlagGuard<'a> {
  flag: &'a SpinFlag,
}

impl Drop for SpinFlagGuard<'_> {
  #[inline]
  fn drop(&mut self) {
    self.flag.locked.store(false, Ordering::Release);
  }
}

impl fmt::Debug for SpinFlagGuard<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("SpinFlagGuard")
  }
}
