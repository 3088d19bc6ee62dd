use core::{
  alloc::{GlobalAlloc, Layout},
  cell::UnsafeCell,
  hint,
  ptr::{NonNull, null_mut},
  sync::atomic::{AtomicBool, Ordering},
};
use std::sync::OnceLock;

use crate::{DEFAULT_ARENA_BYTES, DEFAULT_TABLE_ENTRIES, Heap, HeapStats, WORD_SIZE};

// =============================================================================
// Spin Lock
// =============================================================================

struct SpinLock {
  locked: AtomicBool,
}

impl SpinLock {
  const fn new() -> Self {
    Self {
      locked: AtomicBool::new(false),
    }
  }

  #[inline]
  fn lock(&self) -> SpinGuard<'_> {
    while self
      .locked
      .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
      .is_err()
    {
      while self.locked.load(Ordering::Relaxed) {
        hint::spin_loop();
      }
    }
    SpinGuard { lock: self }
  }
}

struct SpinGuard<'a> {
  lock: &'a SpinLock,
}

impl Drop for SpinGuard<'_> {
  #[inline]
  fn drop(&mut self) {
    self.lock.locked.store(false, Ordering::Release);
  }
}

// =============================================================================
// Locked Heap
// =============================================================================

/// A [`Heap`] behind a spin lock, usable from a `static` and as a [`GlobalAlloc`].
///
/// The arena is reserved on first use and lives as long as the value, which for
/// a `static` is the whole process. Only word alignment is provided: layouts
/// asking for more get a null pointer.
///
/// The heap emits its `tracing` events while the lock is held. When this type
/// is the `#[global_allocator]`, the installed subscriber must not allocate
/// through it (or must filter out `fixheap` events), otherwise the nested
/// allocation spins on the lock forever. The same holds for any code run
/// inside [`LockedHeap::with`].
pub struct LockedHeap<
  const ARENA_BYTES: usize = DEFAULT_ARENA_BYTES,
  const TABLE_ENTRIES: usize = DEFAULT_TABLE_ENTRIES,
> {
  lock: SpinLock,
  heap: OnceLock<Option<UnsafeCell<Heap<ARENA_BYTES, TABLE_ENTRIES>>>>,
}

// All access to the inner heap goes through `lock`.
unsafe impl<const A: usize, const T: usize> Sync for LockedHeap<A, T> {}

impl<const ARENA_BYTES: usize, const TABLE_ENTRIES: usize> LockedHeap<ARENA_BYTES, TABLE_ENTRIES> {
  pub const fn new() -> Self {
    Self {
      lock: SpinLock::new(),
      heap: OnceLock::new(),
    }
  }

  /// Runs `f` with exclusive access to the heap. `None` if the arena could not be reserved.
  ///
  /// `f` must not call back into this `LockedHeap`; the lock is not reentrant.
  pub fn with<R>(&self, f: impl FnOnce(&mut Heap<ARENA_BYTES, TABLE_ENTRIES>) -> R) -> Option<R> {
    let cell = self
      .heap
      .get_or_init(|| Heap::new().ok().map(UnsafeCell::new))
      .as_ref()?;

    let _guard = self.lock.lock();
    Some(f(unsafe { &mut *cell.get() }))
  }

  #[inline]
  pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
    self.with(|heap| heap.allocate(size)).flatten()
  }

  #[inline]
  pub fn release(&self, ptr: *mut u8) {
    self.with(|heap| heap.release(ptr));
  }

  pub fn collect(&self) -> usize {
    self.with(Heap::collect).unwrap_or(0)
  }

  pub fn stats(&self) -> Option<HeapStats> {
    self.with(|heap| heap.stats())
  }
}

impl<const A: usize, const T: usize> Default for LockedHeap<A, T> {
  fn default() -> Self {
    Self::new()
  }
}

unsafe impl<const A: usize, const T: usize> GlobalAlloc for LockedHeap<A, T> {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    if layout.align() > WORD_SIZE {
      return null_mut();
    }
    self
      .allocate(layout.size())
      .map_or(null_mut(), NonNull::as_ptr)
  }

  unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
    self.release(ptr);
  }
}

// =============================================================================
// C API (unmangled with --features c_api)
// =============================================================================

static DEFAULT_HEAP: LockedHeap = LockedHeap::new();

/// Allocates from the process-wide heap. Null on a zero size or when out of memory.
#[cfg_attr(feature = "c_api", unsafe(no_mangle))]
pub unsafe extern "C" fn fixheap_malloc(size: usize) -> *mut u8 {
  DEFAULT_HEAP
    .allocate(size)
    .map_or(null_mut(), NonNull::as_ptr)
}

/// Returns a pointer obtained from [`fixheap_malloc`]. Anything else is ignored.
#[cfg_attr(feature = "c_api", unsafe(no_mangle))]
pub unsafe extern "C" fn fixheap_free(ptr: *mut u8) {
  DEFAULT_HEAP.release(ptr);
}
