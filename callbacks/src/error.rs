//! Error types for callback invocation and registry construction.

use std::any::Any;
use std::fmt;
use std::io;

/// A boxed, thread-safe error as returned by fallible callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The reason a callback invocation did not complete cleanly.
#[derive(Debug)]
pub enum CallbackError {
  /// The callback returned an error.
  Failed(BoxError),
  /// The callback panicked. Holds the panic message when it was a string.
  Panicked(String),
  /// The executor dropped the invocation without running it, e.g. because
  /// it had already been shut down.
  Rejected,
}

impl CallbackError {
  pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
    let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
      (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
      s.clone()
    } else {
      "non-string panic payload".to_string()
    };
    CallbackError::Panicked(message)
  }

  /// Returns `true` if the callback returned an error.
  pub fn is_failed(&self) -> bool {
    matches!(self, CallbackError::Failed(_))
  }

  /// Returns `true` if the callback panicked.
  pub fn is_panicked(&self) -> bool {
    matches!(self, CallbackError::Panicked(_))
  }

  /// Returns `true` if the invocation never ran.
  pub fn is_rejected(&self) -> bool {
    matches!(self, CallbackError::Rejected)
  }
}

impl fmt::Display for CallbackError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CallbackError::Failed(err) => write!(f, "callback failed: {}", err),
      CallbackError::Panicked(msg) => write!(f, "callback panicked: {}", msg),
      CallbackError::Rejected => write!(f, "callback invocation was rejected by the executor"),
    }
  }
}

impl std::error::Error for CallbackError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      CallbackError::Failed(err) => Some(err.as_ref()),
      _ => None,
    }
  }
}

/// How the wait operations treat a callback that finished with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
  /// Swallow the error and report `Ok(false)`.
  #[default]
  Capture,
  /// Return the error to the caller.
  Propagate,
}

/// Errors that can occur when building an executor or a registry.
#[derive(Debug)]
pub enum BuildError {
  /// A thread pool was configured with zero workers.
  ZeroWorkers,
  /// The operating system refused to spawn a worker thread.
  Spawn(io::Error),
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroWorkers => write!(f, "thread pool worker count cannot be zero"),
      BuildError::Spawn(err) => write!(f, "failed to spawn worker thread: {}", err),
    }
  }
}

impl std::error::Error for BuildError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      BuildError::Spawn(err) => Some(err),
      BuildError::ZeroWorkers => None,
    }
  }
}
