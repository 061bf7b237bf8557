//! Errors returned when a queue refuses an element.

use core::fmt;

// Implements `into_inner`, `Display` and `Error` for an enum whose every
// variant carries the rejected element.
macro_rules! impl_error_for_enum_with_inner {
  (
    $enum_name:ident < $generic_param:ident >,
    $($variant:ident ( $message:expr ) ),+
    $(,)?
  ) => {
    impl<$generic_param> $enum_name<$generic_param> {
      /// Consumes the error, returning the element that could not be enqueued.
      #[inline]
      pub fn into_inner(self) -> $generic_param {
        match self {
          $( $enum_name::$variant(v) => v, )+
        }
      }
    }

    impl<$generic_param> fmt::Display for $enum_name<$generic_param> {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
          $( $enum_name::$variant(_) => f.write_str($message), )+
        }
      }
    }

    impl<$generic_param> std::error::Error for $enum_name<$generic_param> {}
  };
}

/// Error returned by [`BlockingQueue::push`](crate::BlockingQueue::push).
///
/// The blocking queue is unbounded, so the only reason for a refusal is that
/// the queue has been closed. The element is handed back to the caller.
#[derive(PartialEq, Eq, Clone)]
pub struct PushError<T>(pub T);

impl<T> PushError<T> {
  /// Consumes the error, returning the element that could not be enqueued.
  #[inline]
  pub fn into_inner(self) -> T {
    self.0
  }
}

impl<T> fmt::Debug for PushError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("PushError(..)")
  }
}

impl<T> fmt::Display for PushError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("queue closed")
  }
}

impl<T> std::error::Error for PushError<T> {}

/// Error returned by [`SpinQueue::try_push`](crate::SpinQueue::try_push) when
/// the element could not be enqueued. The element is handed back.
#[derive(PartialEq, Eq, Clone)]
pub enum TryPushError<T> {
  /// The queue already holds `max_size` elements.
  Full(T),
  /// The queue has been closed and accepts no new elements.
  Closed(T),
}

impl<T> TryPushError<T> {
  /// Returns `true` if the push failed because the queue was full.
  #[inline]
  pub fn is_full(&self) -> bool {
    matches!(self, TryPushError::Full(_))
  }

  /// Returns `true` if the push failed because the queue was closed.
  #[inline]
  pub fn is_closed(&self) -> bool {
    matches!(self, TryPushError::Closed(_))
  }
}

impl<T> fmt::Debug for TryPushError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TryPushError::Full(_) => write!(f, "TryPushError::Full(..)"),
      TryPushError::Closed(_) => write!(f, "TryPushError::Closed(..)"),
    }
  }
}

impl_error_for_enum_with_inner!(
  TryPushError<T>,
  Full("queue full"),
  Closed("queue closed"),
);
