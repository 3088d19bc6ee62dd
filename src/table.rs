use crate::{
  WORD_SIZE,
  error::{HeapError, HeapResult},
};

// =============================================================================
// Block
// =============================================================================

/// Descriptor for one contiguous byte range of the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
  pub(crate) valid: bool,
  pub(crate) free: bool,
  pub(crate) start_word: usize,
  pub(crate) len: usize,
}

impl Block {
  const INVALID: Self = Self {
    valid: false,
    free: false,
    start_word: 0,
    len: 0,
  };

  /// Whether the slot describes a live block.
  #[inline]
  pub fn is_valid(&self) -> bool {
    self.valid
  }

  /// Whether the block is available for allocation.
  #[inline]
  pub fn is_free(&self) -> bool {
    self.free
  }

  /// First word of the block.
  #[inline]
  pub fn start_word(&self) -> usize {
    self.start_word
  }

  /// Length in bytes. Always a multiple of the word size.
  #[inline]
  pub fn len_bytes(&self) -> usize {
    self.len
  }

  /// First word past the block.
  #[inline]
  pub fn end_word(&self) -> usize {
    self.start_word + self.len / WORD_SIZE
  }
}

// =============================================================================
// Block Table
// =============================================================================

/// Fixed-capacity registry of block descriptors, addressed by slot index.
///
/// `entries` is a high-water mark: every slot below it has been used at least
/// once. Slots invalidated by coalescing are parked on the `vacant` stack,
/// kept in descending order so the top is always the lowest invalid slot, and
/// handed out again before the high-water mark advances.
pub(crate) struct BlockTable<const M: usize> {
  slots: [Block; M],
  entries: usize,
  vacant: [u32; M],
  vacant_len: usize,
}

impl<const M: usize> BlockTable<M> {
  const CAPACITY_OK: () = assert!(M > 0 && M <= u32::MAX as usize, "table capacity out of range");

  /// A table whose only valid slot is one free block covering `arena_bytes`.
  pub(crate) const fn new(arena_bytes: usize) -> Self {
    let () = Self::CAPACITY_OK;

    let mut slots = [Block::INVALID; M];
    slots[0] = Block {
      valid: true,
      free: true,
      start_word: 0,
      len: arena_bytes,
    };

    Self {
      slots,
      entries: 1,
      vacant: [0; M],
      vacant_len: 0,
    }
  }

  #[inline]
  pub(crate) fn entries(&self) -> usize {
    self.entries
  }

  #[cfg(test)]
  pub(crate) fn valid_count(&self) -> usize {
    self.iter().count()
  }

  /// Lowest invalid slot below the high-water mark, if any.
  #[inline]
  pub(crate) fn find_reusable_slot(&self) -> Option<usize> {
    self.vacant_len.checked_sub(1).map(|top| self.vacant[top] as usize)
  }

  /// Turns `index` into a valid, free block. Advances the high-water mark when
  /// `index` is the next unused slot.
  pub(crate) fn init_slot(&mut self, index: usize, start_word: usize, len: usize) -> HeapResult<()> {
    if index >= M || index > self.entries {
      return Err(HeapError::SlotIndexOutOfRange { index, capacity: M });
    }
    debug_assert!(!self.slots[index].valid, "slot {index} is still live");

    if index < self.entries {
      self.unpark(index);
    }

    self.slots[index] = Block {
      valid: true,
      free: true,
      start_word,
      len,
    };

    if index == self.entries {
      self.entries += 1;
    }
    Ok(())
  }

  /// Drops the block in `index` and parks the slot for reuse.
  pub(crate) fn invalidate(&mut self, index: usize) {
    let Some(block) = self.slots[..self.entries].get_mut(index) else {
      return;
    };
    if !block.valid {
      return;
    }
    block.valid = false;

    let pos = self.vacant[..self.vacant_len].partition_point(|&slot| slot as usize > index);
    self.vacant.copy_within(pos..self.vacant_len, pos + 1);
    self.vacant[pos] = index as u32;
    self.vacant_len += 1;
  }

  /// Removes `index` from the vacant stack.
  fn unpark(&mut self, index: usize) {
    let parked = &self.vacant[..self.vacant_len];
    if let Some(pos) = parked.iter().rposition(|&slot| slot as usize == index) {
      self.vacant.copy_within(pos + 1..self.vacant_len, pos);
      self.vacant_len -= 1;
    }
  }

  /// Valid block in `index`.
  #[inline]
  pub(crate) fn get(&self, index: usize) -> Option<&Block> {
    self.slots[..self.entries].get(index).filter(|block| block.valid)
  }

  #[inline]
  pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Block> {
    self.slots[..self.entries].get_mut(index).filter(|block| block.valid)
  }

  /// Valid blocks in slot order.
  pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &Block)> {
    self.slots[..self.entries]
      .iter()
      .enumerate()
      .filter(|(_, block)| block.valid)
  }
}
