mod common;
use common::*;

use skein_callbacks::{CallbackError, CallbackRegistry, FailureMode};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn sleeper(ms: u64) -> impl Fn(u64) + Send + Sync + 'static {
  move |_| thread::sleep(Duration::from_millis(ms))
}

fn sleep_for_arg(ms: u64) {
  thread::sleep(Duration::from_millis(ms));
}

/// Tracks how many invocations of one callback overlap.
#[derive(Clone, Default)]
struct Overlap {
  active: Arc<AtomicUsize>,
  max: Arc<AtomicUsize>,
  runs: Counter,
}

impl Overlap {
  fn callback(&self) -> impl Fn(u64) + Send + Sync + 'static {
    let this = self.clone();
    move |ms| {
      let now = this.active.fetch_add(1, Ordering::SeqCst) + 1;
      this.max.fetch_max(now, Ordering::SeqCst);
      thread::sleep(Duration::from_millis(ms));
      this.active.fetch_sub(1, Ordering::SeqCst);
      this.runs.hit();
    }
  }
}

fn wait_until_idle(registry: &CallbackRegistry<u64>) {
  let start = Instant::now();
  while registry.is_any_callback_pending() {
    assert!(start.elapsed() < LONG_TIMEOUT, "callbacks never finished");
    thread::sleep(Duration::from_millis(5));
  }
}

#[test]
fn async_running_callbacks_are_skipped() {
  let registry = CallbackRegistry::<u64>::new();
  let overlap = Overlap::default();
  let h1 = registry.add_callback(sleeper(10));
  let _h2 = registry.add_callback(sleeper(10));
  let h3 = registry.add_callback(overlap.callback());

  assert!(registry.call_all_async(200));
  assert!(!registry.call_all_async(200));
  assert!(registry.is_callback_pending(h3));
  assert!(registry.is_any_callback_pending());

  assert!(registry.wait_for_callback(h1, FailureMode::Capture, Some(LONG_TIMEOUT)).unwrap());
  assert!(!registry.is_callback_pending(h1));

  assert!(registry.wait_for_all_callbacks(FailureMode::Capture, None).unwrap());
  assert!(!registry.is_callback_pending(h3));
  assert_eq!(overlap.runs.get(), 1);
  assert_eq!(overlap.max.load(Ordering::SeqCst), 1);
}

#[test]
fn async_wait_for_single_callback() {
  let registry = CallbackRegistry::<u64>::new();
  let h1 = registry.add_callback(sleeper(10));
  let h2 = registry.add_callback(sleeper(100));

  // Nothing outstanding yet.
  assert!(registry.wait_for_callback(h1, FailureMode::Capture, Some(Duration::ZERO)).unwrap());

  assert!(registry.call_all_async(0));
  assert!(registry.wait_for_callback(h1, FailureMode::Capture, Some(MEDIUM_TIMEOUT)).unwrap());
  assert!(!registry.wait_for_callback(h2, FailureMode::Capture, Some(SHORT_TIMEOUT)).unwrap());
  // The timeout left the invocation outstanding.
  assert!(registry.is_callback_pending(h2));
  assert!(registry.wait_for_callback(h2, FailureMode::Capture, None).unwrap());
  assert!(!registry.is_callback_pending(h2));
}

#[test]
fn async_wait_for_all_shares_one_budget() {
  let registry = CallbackRegistry::<u64>::new();
  registry.add_callback(sleeper(200));
  registry.add_callback(sleep_for_arg);

  let start = Instant::now();
  assert!(registry.call_all_async(600));

  // The first handle eats the whole budget; the second is only polled.
  assert!(!registry.wait_for_all_callbacks(FailureMode::Capture, Some(Duration::from_millis(100))).unwrap());
  let after_first = start.elapsed();
  assert!(after_first >= Duration::from_millis(100));
  assert!(after_first < Duration::from_millis(200));

  // The first handle completes partway through; the rest of the budget is
  // not enough for the second.
  assert!(!registry.wait_for_all_callbacks(FailureMode::Capture, Some(Duration::from_millis(200))).unwrap());

  assert!(registry.wait_for_all_callbacks(FailureMode::Capture, Some(Duration::from_millis(400))).unwrap());
  assert!(start.elapsed() >= Duration::from_millis(600));
  assert!(!registry.is_any_callback_pending());
}

#[test]
fn async_failures_are_captured_or_propagated() {
  let registry = CallbackRegistry::<u64>::new();
  let _ok = registry.add_callback(sleeper(10));
  let failing = registry.add_callback(|ms: u64| -> Result<(), String> {
    thread::sleep(Duration::from_millis(ms));
    Err("async failure".into())
  });

  assert!(registry.call_all_async(10));
  assert!(!registry.wait_for_all_callbacks(FailureMode::Capture, Some(LONG_TIMEOUT)).unwrap());

  assert!(registry.call_all_async(10));
  assert!(!registry.wait_for_callback(failing, FailureMode::Capture, Some(LONG_TIMEOUT)).unwrap());

  assert!(!registry.call_all_quiet(10));
  assert!(registry.call_all(10).unwrap_err().is_failed());

  assert!(registry.call_all_async(10));
  let err = registry.wait_for_all_callbacks(FailureMode::Propagate, Some(LONG_TIMEOUT)).unwrap_err();
  assert_eq!(err.to_string(), "callback failed: async failure");

  assert!(registry.call_all_async(10));
  let err = registry.wait_for_callback(failing, FailureMode::Propagate, Some(LONG_TIMEOUT)).unwrap_err();
  assert!(err.is_failed());
  assert!(!registry.is_pending_operation());
}

#[test]
fn async_panics_surface_as_errors() {
  let registry = CallbackRegistry::<u64>::new();
  let handle = registry.add_callback(|_: u64| -> Result<(), String> { panic!("async panic") });

  assert!(registry.call_all_async(0));
  match registry.wait_for_callback(handle, FailureMode::Propagate, Some(LONG_TIMEOUT)) {
    Err(CallbackError::Panicked(msg)) => assert_eq!(msg, "async panic"),
    other => panic!("unexpected result: {:?}", other),
  }
}

#[test]
fn async_sync_call_waits_for_outstanding_run() {
  let registry = CallbackRegistry::<u64>::new();
  let overlap = Overlap::default();
  let handle = registry.add_callback(overlap.callback());

  assert!(registry.call_all_async(50));
  registry.call_all(0).unwrap();
  assert_eq!(overlap.runs.get(), 2);
  assert_eq!(overlap.max.load(Ordering::SeqCst), 1);

  // The async result was kept for the wait call.
  assert!(!registry.is_callback_pending(handle));
  assert!(registry.wait_for_callback(handle, FailureMode::Propagate, Some(Duration::ZERO)).unwrap());
}

#[test]
fn async_finished_result_is_superseded_by_next_launch() {
  let registry = CallbackRegistry::<u64>::new();
  let runs = Counter::new();
  let handle = {
    let runs = runs.clone();
    registry.add_callback(move |_| -> Result<(), &'static str> {
      runs.hit();
      if runs.get() == 1 {
        Err("first run fails")
      } else {
        Ok(())
      }
    })
  };

  assert!(registry.call_all_async(0));
  wait_until_idle(&registry);
  // The failed result was never observed; relaunching replaces it.
  assert!(registry.call_all_async(0));
  assert!(registry.wait_for_callback(handle, FailureMode::Propagate, Some(LONG_TIMEOUT)).unwrap());
  assert_eq!(runs.get(), 2);
}

#[test]
fn async_remove_waits_for_outstanding_run() {
  let registry = CallbackRegistry::<u64>::new();
  let finished = Arc::new(AtomicBool::new(false));
  let handle = {
    let finished = Arc::clone(&finished);
    registry.add_callback(move |ms| {
      thread::sleep(Duration::from_millis(ms));
      finished.store(true, Ordering::SeqCst);
    })
  };

  assert!(registry.call_all_async(100));
  assert!(registry.remove_callback(handle));
  assert!(finished.load(Ordering::SeqCst));
  assert!(!registry.is_valid(handle));
  assert!(!registry.is_any_callback_pending());
}

#[test]
fn async_remove_all_drains() {
  let registry = CallbackRegistry::<u64>::new();
  let overlap = Overlap::default();
  for _ in 0..3 {
    registry.add_callback(overlap.callback());
  }

  assert!(registry.call_all_async(50));
  registry.remove_all_callbacks();
  assert_eq!(overlap.runs.get(), 3);
  assert!(registry.is_empty());
  assert!(!registry.is_any_callback_pending());
  assert!(registry.call_all_async(0));
}

#[test]
fn async_pending_operation_visible_during_wait() {
  let registry = Arc::new(CallbackRegistry::<u64>::new());
  registry.add_callback(sleeper(200));
  assert!(registry.call_all_async(0));
  assert!(!registry.is_pending_operation());

  let waiter = {
    let registry = Arc::clone(&registry);
    thread::spawn(move || registry.wait_for_all_callbacks(FailureMode::Capture, None))
  };

  let start = Instant::now();
  while !registry.is_pending_operation() {
    assert!(start.elapsed() < LONG_TIMEOUT);
    thread::yield_now();
  }
  assert!(waiter.join().unwrap().unwrap());
  assert!(!registry.is_pending_operation());
}

#[test]
fn async_take_keeps_outstanding_results() {
  let registry = CallbackRegistry::<u64>::new();
  let handle = registry.add_callback(|ms: u64| -> Result<(), String> {
    thread::sleep(Duration::from_millis(ms));
    Err("moved failure".into())
  });

  assert!(registry.call_all_async(50));
  let moved = registry.take();
  assert!(registry.is_empty());
  assert!(!registry.is_any_callback_pending());

  let err = moved.wait_for_callback(handle, FailureMode::Propagate, None).unwrap_err();
  assert_eq!(err.to_string(), "callback failed: moved failure");
}

#[test]
fn async_pooled_registry_runs_every_callback() {
  let registry = CallbackRegistry::<u64>::builder().thread_pool(2).build().unwrap();
  let runs = Counter::new();
  for _ in 0..ITEMS_LOW {
    let runs = runs.clone();
    registry.add_callback(move |ms| {
      thread::sleep(Duration::from_millis(ms));
      runs.hit();
    });
  }

  assert!(registry.call_all_async(1));
  assert!(registry.wait_for_all_callbacks(FailureMode::Propagate, Some(LONG_TIMEOUT)).unwrap());
  assert_eq!(runs.get(), ITEMS_LOW);
}
