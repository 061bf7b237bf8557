use std::fmt;

/// Identifies one registration in a [`CallbackRegistry`](crate::CallbackRegistry).
///
/// A handle pairs the slot index with the generation assigned when the
/// callback was added. Slots are reused after removal, but generations are
/// never reused within a registry, so a handle to a removed callback stays
/// invalid even after its slot is taken by a new registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackHandle {
  index: usize,
  generation: u64,
}

impl CallbackHandle {
  pub(crate) fn new(index: usize, generation: u64) -> Self {
    Self { index, generation }
  }

  /// The slot this handle refers to. Lower indices are invoked first.
  #[inline]
  pub fn index(&self) -> usize {
    self.index
  }

  /// The registration generation.
  #[inline]
  pub fn generation(&self) -> u64 {
    self.generation
  }
}

impl fmt::Display for CallbackHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}@{}", self.index, self.generation)
  }
}
