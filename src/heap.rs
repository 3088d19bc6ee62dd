use core::ptr::NonNull;

use tracing::{debug, trace};

use crate::{
  DEFAULT_ARENA_BYTES, DEFAULT_TABLE_ENTRIES, WORD_SIZE, align_up,
  arena::Arena,
  error::{HeapError, HeapResult},
  table::{Block, BlockTable},
};

// =============================================================================
// Heap
// =============================================================================

/// A fixed-capacity heap: one arena of `ARENA_BYTES` carved up by a table of at
/// most `TABLE_ENTRIES` block descriptors.
///
/// Allocation is first-fit in slot order with splitting. Release only flips the
/// block's free flag; adjacent free blocks are merged lazily, when an
/// allocation finds nothing that fits. The heap is single-owner: wrap it in
/// [`LockedHeap`](crate::LockedHeap) to share it.
///
/// ```
/// let mut heap: fixheap::Heap<4096, 16> = fixheap::Heap::new().unwrap();
/// let p = heap.allocate(100).unwrap();
/// assert_eq!(heap.usable_size(p.as_ptr()), Some(100));
/// heap.release(p.as_ptr());
/// ```
pub struct Heap<
  const ARENA_BYTES: usize = DEFAULT_ARENA_BYTES,
  const TABLE_ENTRIES: usize = DEFAULT_TABLE_ENTRIES,
> {
  arena: Arena,
  table: BlockTable<TABLE_ENTRIES>,
}

/// Snapshot of the block table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Slots describing a live block, free or allocated.
  pub valid_blocks: usize,
  /// Valid blocks available for allocation.
  pub free_blocks: usize,
  /// Valid blocks currently handed out.
  pub allocated_blocks: usize,
  /// Bytes in free blocks. Adjacent free blocks may not be merged yet.
  pub free_bytes: usize,
  /// Bytes handed out, including any surplus granted when a split was skipped.
  pub allocated_bytes: usize,
  /// Largest single free block. Coalescing may produce a larger one.
  pub largest_free: usize,
  /// High-water mark of table slots ever used.
  pub table_entries: usize,
}

impl<const ARENA_BYTES: usize, const TABLE_ENTRIES: usize> Heap<ARENA_BYTES, TABLE_ENTRIES> {
  const ARENA_OK: () = assert!(
    ARENA_BYTES > 0 && ARENA_BYTES % WORD_SIZE == 0,
    "arena size must be a non-zero multiple of the word size"
  );

  /// Reserves the arena and registers it as a single free block.
  pub fn new() -> HeapResult<Self> {
    let () = Self::ARENA_OK;
    Ok(Self {
      arena: Arena::new(ARENA_BYTES)?,
      table: BlockTable::new(ARENA_BYTES),
    })
  }

  /// Arena size in bytes.
  #[inline]
  pub const fn capacity(&self) -> usize {
    ARENA_BYTES
  }

  /// Maximum number of blocks the table can describe.
  #[inline]
  pub const fn table_capacity(&self) -> usize {
    TABLE_ENTRIES
  }

  /// Allocates `size` bytes, word aligned. `None` on a zero-sized request or any failure.
  #[inline]
  pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
    self.try_allocate(size).ok()
  }

  /// Allocates `size` bytes, word aligned.
  ///
  /// Searches first-fit; if nothing fits, coalesces once and searches again.
  /// The block may be larger than requested when the table had no slot left
  /// to hold the split remainder.
  pub fn try_allocate(&mut self, size: usize) -> HeapResult<NonNull<u8>> {
    if size == 0 {
      return Err(HeapError::ZeroSize);
    }
    let rounded = align_up(size, WORD_SIZE).ok_or(HeapError::SizeOverflow { requested: size })?;

    if let Some(ptr) = self.allocate_first_fit(rounded) {
      return Ok(ptr);
    }

    self.collect();

    self.allocate_first_fit(rounded).ok_or_else(|| {
      debug!(requested = rounded, "allocation failed after coalescing");
      HeapError::OutOfMemory { requested: rounded }
    })
  }

  /// One first-fit search. `rounded` is a non-zero multiple of the word size.
  fn allocate_first_fit(&mut self, rounded: usize) -> Option<NonNull<u8>> {
    let (index, &Block { start_word, len, .. }) = self
      .table
      .iter()
      .find(|(_, block)| block.free && block.len >= rounded)?;
    let ptr = self.arena.word_ptr(start_word)?;

    let mut granted = len;
    let remainder = len - rounded;
    if remainder > 0 {
      let slot = self
        .table
        .find_reusable_slot()
        .unwrap_or(self.table.entries());
      if self
        .table
        .init_slot(slot, start_word + rounded / WORD_SIZE, remainder)
        .is_ok()
      {
        granted = rounded;
      } else {
        trace!(granted = len, requested = rounded, "block table full, not splitting");
      }
    }

    let block = self.table.get_mut(index)?;
    block.free = false;
    block.len = granted;
    Some(ptr)
  }

  /// Merges every run of address-adjacent free blocks into one block.
  ///
  /// Repeats full pairwise passes until one merges nothing. Returns the number
  /// of merges. Running it again right away is a no-op.
  pub fn collect(&mut self) -> usize {
    let mut merges = 0;
    let mut passes = 0;

    loop {
      passes += 1;
      let mut merged = false;

      for i in 0..self.table.entries() {
        if !self.table.get(i).is_some_and(|block| block.free) {
          continue;
        }

        for j in 0..self.table.entries() {
          if i == j {
            continue;
          }
          let (Some(head), Some(tail)) = (self.table.get(i), self.table.get(j)) else {
            continue;
          };
          if !tail.free || head.end_word() != tail.start_word {
            continue;
          }

          let tail_len = tail.len;
          self.table.invalidate(j);
          if let Some(head) = self.table.get_mut(i) {
            head.len += tail_len;
          }
          merged = true;
          merges += 1;
        }
      }

      if !merged {
        break;
      }
    }

    debug!(passes, merges, "coalesced free blocks");
    merges
  }

  /// Marks the block starting exactly at `ptr` free.
  ///
  /// Null, foreign and interior pointers are ignored, as is releasing a block
  /// that is already free. Nothing is merged here.
  pub fn release(&mut self, ptr: *mut u8) {
    let Some(word) = self.arena.word_offset(ptr) else {
      trace!(?ptr, "release of address outside the arena ignored");
      return;
    };

    let found = self
      .table
      .iter()
      .find(|(_, block)| block.start_word == word)
      .map(|(index, _)| index);

    match found.and_then(|index| self.table.get_mut(index)) {
      Some(block) => block.free = true,
      None => trace!(?ptr, "release of unknown address ignored"),
    }
  }

  /// Granted length of the allocated block starting at `ptr`.
  pub fn usable_size(&self, ptr: *const u8) -> Option<usize> {
    let word = self.arena.word_offset(ptr)?;
    self
      .table
      .iter()
      .find(|(_, block)| block.start_word == word && !block.free)
      .map(|(_, block)| block.len)
  }

  /// Whether `ptr` lies inside the arena.
  #[inline]
  pub fn contains(&self, ptr: *const u8) -> bool {
    self.arena.contains(ptr)
  }

  /// Valid blocks in slot order.
  pub fn blocks(&self) -> impl Iterator<Item = (usize, Block)> + '_ {
    self.table.iter().map(|(index, block)| (index, *block))
  }

  /// Address of the first byte of the valid block in `slot`.
  #[inline]
  pub fn block_ptr(&self, slot: usize) -> Option<NonNull<u8>> {
    let block = self.table.get(slot)?;
    self.arena.word_ptr(block.start_word)
  }

  /// Counts and byte totals over the valid blocks.
  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      table_entries: self.table.entries(),
      ..HeapStats::default()
    };

    for (_, block) in self.table.iter() {
      stats.valid_blocks += 1;
      if block.free {
        stats.free_blocks += 1;
        stats.free_bytes += block.len;
        stats.largest_free = stats.largest_free.max(block.len);
      } else {
        stats.allocated_blocks += 1;
        stats.allocated_bytes += block.len;
      }
    }
    stats
  }

  #[cfg(test)]
  pub(crate) fn valid_count(&self) -> usize {
    self.table.valid_count()
  }
}
