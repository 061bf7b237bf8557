//! A thread-safe callback registry with synchronous and asynchronous fan-out.
//!
//! Register handlers with [`CallbackRegistry::add_callback`], keep the
//! returned [`CallbackHandle`] to remove them later, and invoke all of them
//! with one of the `call_all*` methods:
//!
//! - [`call_all`](CallbackRegistry::call_all) runs them on the calling thread
//!   and stops at the first failure.
//! - [`call_all_quiet`](CallbackRegistry::call_all_quiet) runs them all and
//!   reports whether any failed.
//! - [`call_all_async`](CallbackRegistry::call_all_async) hands them to an
//!   [`Executor`]. The `wait_for*` methods collect the results.
//!
//! Handles are generational: a handle to a removed callback never becomes
//! valid again, even when its slot is reused.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod builder;
pub mod error;
pub mod executor;
pub mod outcome;

mod completion;
mod handle;
mod pool;
mod registry;

pub use builder::CallbackRegistryBuilder;
pub use error::{BoxError, BuildError, CallbackError, FailureMode};
pub use executor::{Executor, Task, ThreadPerTask};
pub use handle::CallbackHandle;
pub use outcome::CallbackOutcome;
pub use pool::ThreadPool;
pub use registry::CallbackRegistry;

#[cfg(feature = "tokio")]
pub use executor::TokioExecutor;
