//! Conversion of callback return values into a uniform result.

use crate::error::{BoxError, CallbackError};

/// Return types accepted from a registered callback.
///
/// Implemented for `()` (infallible callbacks) and for `Result<(), E>` where
/// the error converts into a [`BoxError`].
pub trait CallbackOutcome {
  /// Folds the value into the registry's result type.
  fn into_result(self) -> Result<(), CallbackError>;
}

impl CallbackOutcome for () {
  #[inline]
  fn into_result(self) -> Result<(), CallbackError> {
    Ok(())
  }
}

impl<E> CallbackOutcome for Result<(), E>
where
  E: Into<BoxError>,
{
  #[inline]
  fn into_result(self) -> Result<(), CallbackError> {
    self.map_err(|err| CallbackError::Failed(err.into()))
  }
}
