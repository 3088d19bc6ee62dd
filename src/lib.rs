//! Fixed-capacity heap for targets without a system allocator.
//!
//! One arena is reserved up front and carved up by a fixed-size table of block
//! descriptors. Allocation is first-fit with splitting, release just marks a
//! block free, and adjacent free blocks are coalesced only when an allocation
//! would otherwise fail.
//!
//! [`Heap`] is the single-owner engine. [`LockedHeap`] puts one behind a spin
//! lock for `static` use, and `fixheap_malloc` / `fixheap_free` expose a
//! process-wide instance over the C ABI (unmangled with `--features c_api`).
#![allow(clippy::missing_safety_doc)]

mod arena;
mod error;
mod global;
mod heap;
mod table;

pub use error::{HeapError, HeapResult};
pub use global::{LockedHeap, fixheap_free, fixheap_malloc};
pub use heap::{Heap, HeapStats};
pub use table::Block;

// =============================================================================
// Constants
// =============================================================================

/// Allocation granularity and alignment, in bytes.
pub const WORD_SIZE: usize = 4;

/// Default arena size: 16 MiB.
pub const DEFAULT_ARENA_BYTES: usize = 16 * 1024 * 1024;

/// Default number of block table entries.
pub const DEFAULT_TABLE_ENTRIES: usize = 1024;

const _: () = assert!(WORD_SIZE.is_power_of_two());
const _: () = assert!(DEFAULT_ARENA_BYTES % WORD_SIZE == 0);

// =============================================================================
// Utils
// =============================================================================

/// Rounds `x` up to the next multiple of `align`, or `None` on overflow. Alignment must be a power of 2.
#[inline(always)]
const fn align_up(x: usize, align: usize) -> Option<usize> {
  let mask = align - 1;
  match x.checked_add(mask) {
    Some(sum) => Some(sum & !mask),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align_up() {
    assert_eq!(align_up(1, WORD_SIZE), Some(4));
    assert_eq!(align_up(4, WORD_SIZE), Some(4));
    assert_eq!(align_up(100, WORD_SIZE), Some(100));
    assert_eq!(align_up(101, WORD_SIZE), Some(104));
    assert_eq!(align_up(usize::MAX - 3, WORD_SIZE), Some(usize::MAX - 3));
    assert_eq!(align_up(usize::MAX - 2, WORD_SIZE), None);
  }
}
