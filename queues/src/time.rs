//! A small monotonic stopwatch for measuring how long queue workloads take.
//!
//! Nothing in the queues themselves depends on this module; it exists for
//! callers (benchmarks, demos, diagnostics) that want wall-clock numbers.

use chrono::{DateTime, Timelike, Utc};
use once_cell::sync::Lazy;
use std::fmt;
use std::time::{Duration, Instant};

// Process-wide pairing of a monotonic instant with the wall clock, taken once.
// Every UTC time point handed out is derived from this pair plus monotonic
// elapsed time, so it never jumps when the system clock is adjusted.
static ANCHOR: Lazy<(Instant, DateTime<Utc>)> = Lazy::new(|| (Instant::now(), Utc::now()));

/// Returns the current UTC time, derived from the monotonic clock.
pub fn monotonic_utc_now() -> DateTime<Utc> {
  let (instant, utc) = *ANCHOR;
  let elapsed = chrono::Duration::from_std(instant.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
  utc.checked_add_signed(elapsed).unwrap_or(utc)
}

/// A start/stop timer over `std::time::Instant`.
///
/// The stopwatch starts running on construction. `stop` freezes the measured
/// span; `elapsed` always measures up to now.
#[derive(Clone, Copy)]
pub struct Stopwatch {
  start: Instant,
  stop: Instant,
  created: Instant,
  since_midnight_at_creation: Duration,
}

impl Stopwatch {
  /// Creates a stopwatch and starts it.
  pub fn new() -> Self {
    let now = Instant::now();
    let utc = monotonic_utc_now();
    let since_midnight_at_creation = Duration::from_secs(u64::from(utc.num_seconds_from_midnight()))
      + Duration::from_nanos(u64::from(utc.nanosecond()));
    Self {
      start: now,
      stop: now,
      created: now,
      since_midnight_at_creation,
    }
  }

  /// Restarts the measurement from now.
  pub fn start(&mut self) {
    self.start = Instant::now();
    self.stop = self.start;
  }

  /// Records the stop time.
  pub fn stop(&mut self) {
    self.stop = Instant::now();
  }

  /// Records the stop time and returns the measured span.
  pub fn stop_elapsed(&mut self) -> Duration {
    self.stop();
    self.measured()
  }

  /// The span between the last `start` and the last `stop`.
  #[inline]
  pub fn measured(&self) -> Duration {
    self.stop.saturating_duration_since(self.start)
  }

  /// The span between the last `start` and now.
  #[inline]
  pub fn elapsed(&self) -> Duration {
    self.start.elapsed()
  }

  /// Time elapsed since UTC midnight of the day this stopwatch was created.
  pub fn since_creation_midnight(&self) -> Duration {
    self.since_midnight_at_creation + self.created.elapsed()
  }

  /// Same as [`monotonic_utc_now`].
  #[inline]
  pub fn utc_now() -> DateTime<Utc> {
    monotonic_utc_now()
  }
}

impl Default for Stopwatch {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Stopwatch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Stopwatch")
      .field("measured", &self.measured())
      .field("elapsed", &self.elapsed())
      .finish()
  }
}

/// Formats the measured span in milliseconds with microsecond precision.
impl fmt::Display for Stopwatch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:.3} ms", self.measured().as_secs_f64() * 1000.0)
  }
}
