//! Thread-safe FIFO queues for handing values between threads.
//!
//! Skein provides two queue flavours sharing one surface of close, reset and
//! filter semantics:
//!
//! - [`BlockingQueue`]: unbounded, mutex + condition variable. `pop` parks the
//!   calling thread until an element arrives or the queue is closed.
//! - [`SpinQueue`]: optionally bounded, guarded by a [`SpinFlag`]. Every
//!   operation is try-style and never parks the thread.
//!
//! Both queues hand refused elements back through their error types, so
//! move-only values are never lost on a failed push.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod error;
pub mod time;

mod blocking;
mod spin_flag;
mod spin_queue;

pub use blocking::BlockingQueue;
pub use error::{PushError, TryPushError};
pub use spin_flag::{SpinFlag, SpinFlagGuard};
pub use spin_queue::SpinQueue;
pub use time::Stopwatch;
