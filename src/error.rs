use thiserror::Error;

/// Failures reported by [`Heap::try_allocate`](crate::Heap::try_allocate) and table bookkeeping.
///
/// The sentinel-style entry points ([`Heap::allocate`](crate::Heap::allocate),
/// [`Heap::release`](crate::Heap::release)) fold all of these into `None` or silence.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
  /// A zero-byte request. Not a heap failure, there is simply nothing to hand out.
  #[error("zero-sized allocation request")]
  ZeroSize,

  /// Rounding the request up to a whole word overflowed `usize`.
  #[error("request of {requested} bytes overflows word rounding")]
  SizeOverflow {
    /// Bytes asked for.
    requested: usize,
  },

  /// No free block fits, even after coalescing.
  #[error("out of memory: no free block of {requested} bytes after coalescing")]
  OutOfMemory {
    /// Bytes asked for, after word rounding.
    requested: usize,
  },

  /// A table slot past the fixed capacity was addressed.
  #[error("block table slot {index} out of range (capacity {capacity})")]
  SlotIndexOutOfRange {
    /// Slot that was addressed.
    index: usize,
    /// Fixed table capacity.
    capacity: usize,
  },

  /// The backing arena could not be reserved.
  #[error("could not reserve a {bytes} byte arena")]
  ArenaUnavailable {
    /// Arena size that was requested.
    bytes: usize,
  },
}

/// Result type for heap operations.
pub type HeapResult<T> = Result<T, HeapError>;
