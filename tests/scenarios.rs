use fixheap::{Block, Heap, HeapError, LockedHeap};

const MIB: usize = 1 << 20;

fn blocks<const A: usize, const T: usize>(heap: &Heap<A, T>) -> Vec<Block> {
  heap.blocks().map(|(_, block)| block).collect()
}

#[test]
fn fresh_allocation_splits_the_arena() {
  let mut heap: Heap<MIB, 1024> = Heap::new().unwrap();
  let p = heap.allocate(100).unwrap();

  let table = blocks(&heap);
  assert_eq!(table.len(), 2);
  assert_eq!(heap.block_ptr(0), Some(p));
  assert_eq!(table[0].start_word(), 0);
  assert_eq!(table[0].len_bytes(), 100);
  assert!(!table[0].is_free());
  assert_eq!(table[1].start_word(), 25);
  assert_eq!(table[1].len_bytes(), 1_048_476);
  assert!(table[1].is_free());
}

#[test]
fn request_larger_than_arena_fails() {
  let mut heap: Heap<MIB, 1024> = Heap::new().unwrap();

  assert!(heap.allocate(MIB + 1).is_none());
  assert_eq!(blocks(&heap).len(), 1);
}

#[test]
fn released_halves_coalesce_on_demand() {
  let mut heap: Heap<MIB, 1024> = Heap::new().unwrap();
  let p = heap.allocate(100).unwrap();
  heap.release(p.as_ptr());

  assert_eq!(
    heap.try_allocate(2_000_000),
    Err(HeapError::OutOfMemory { requested: 2_000_000 })
  );
  assert_eq!(heap.allocate(MIB), Some(p));
}

#[test]
fn releasing_null_changes_nothing() {
  let mut heap: Heap<MIB, 1024> = Heap::new().unwrap();
  heap.allocate(100).unwrap();
  let before = blocks(&heap);

  heap.release(core::ptr::null_mut());
  assert_eq!(blocks(&heap), before);
}

#[test]
fn conservation_and_capacity_bound() {
  let mut heap: Heap<{ 16 * 1024 }, 8> = Heap::new().unwrap();
  let mut live = Vec::new();

  for size in [10, 200, 33, 4, 1000, 7, 64, 300, 12, 48] {
    if let Some(p) = heap.allocate(size) {
      live.push(p);
    }
    let total: usize = blocks(&heap).iter().map(Block::len_bytes).sum();
    assert_eq!(total, 16 * 1024);
    assert!(blocks(&heap).len() <= 8);
  }

  for p in live.drain(..) {
    heap.release(p.as_ptr());
  }
  heap.collect();
  assert_eq!(blocks(&heap).len(), 1);
  assert_eq!(heap.stats().largest_free, 16 * 1024);
}

static SHARED: LockedHeap<{ 64 * 1024 }, 64> = LockedHeap::new();

#[test]
fn static_locked_heap() {
  let p = SHARED.allocate(128).unwrap();
  assert_eq!(SHARED.with(|heap| heap.usable_size(p.as_ptr())).flatten(), Some(128));
  SHARED.release(p.as_ptr());
  assert_eq!(SHARED.stats().unwrap().allocated_blocks, 0);
}
