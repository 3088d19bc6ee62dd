use core::ptr::NonNull;

use crate::{
  WORD_SIZE,
  error::{HeapError, HeapResult},
};

// =============================================================================
// Platform
// =============================================================================

#[cfg(unix)]
unsafe fn os_mmap(size: usize) -> *mut u8 {
  let ptr = unsafe {
    libc::mmap(
      core::ptr::null_mut(),
      size,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  if ptr == libc::MAP_FAILED {
    core::ptr::null_mut()
  } else {
    ptr as *mut u8
  }
}

#[cfg(unix)]
unsafe fn os_munmap(ptr: *mut u8, size: usize) {
  unsafe { libc::munmap(ptr.cast(), size) };
}

#[cfg(not(unix))]
const PAGE_SIZE: usize = 4096;

#[cfg(not(unix))]
unsafe fn os_mmap(size: usize) -> *mut u8 {
  match std::alloc::Layout::from_size_align(size, PAGE_SIZE) {
    Ok(layout) => unsafe { std::alloc::alloc_zeroed(layout) },
    Err(_) => core::ptr::null_mut(),
  }
}

#[cfg(not(unix))]
unsafe fn os_munmap(ptr: *mut u8, size: usize) {
  // Same layout that `os_mmap` accepted.
  let layout = unsafe { std::alloc::Layout::from_size_align_unchecked(size, PAGE_SIZE) };
  unsafe { std::alloc::dealloc(ptr, layout) };
}

// =============================================================================
// Arena
// =============================================================================

/// One contiguous, zero-filled, page-aligned byte region. Word `n` lives at byte `4 * n`.
pub(crate) struct Arena {
  base: NonNull<u8>,
  len: usize,
}

// The arena is plain memory owned by a single heap.
unsafe impl Send for Arena {}

impl Arena {
  /// Reserves `len` bytes. `len` must be non-zero.
  pub(crate) fn new(len: usize) -> HeapResult<Self> {
    debug_assert!(len > 0);
    let raw = unsafe { os_mmap(len) };
    NonNull::new(raw)
      .map(|base| Self { base, len })
      .ok_or(HeapError::ArenaUnavailable { bytes: len })
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.len
  }

  #[cfg(test)]
  pub(crate) fn base(&self) -> NonNull<u8> {
    self.base
  }

  /// Address of word `start_word`, if it lies inside the arena.
  #[inline]
  pub(crate) fn word_ptr(&self, start_word: usize) -> Option<NonNull<u8>> {
    let offset = start_word.checked_mul(WORD_SIZE).filter(|&offset| offset < self.len)?;
    Some(unsafe { self.base.add(offset) })
  }

  #[inline]
  pub(crate) fn contains(&self, ptr: *const u8) -> bool {
    let base = self.base.as_ptr() as usize;
    let addr = ptr as usize;
    addr >= base && addr < base + self.len
  }

  /// Word index of `ptr`, if it is a word-aligned address inside the arena.
  #[inline]
  pub(crate) fn word_offset(&self, ptr: *const u8) -> Option<usize> {
    if !self.contains(ptr) {
      return None;
    }
    let offset = ptr as usize - self.base.as_ptr() as usize;
    (offset % WORD_SIZE == 0).then_some(offset / WORD_SIZE)
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    unsafe { os_munmap(self.base.as_ptr(), self.len) };
  }
}
