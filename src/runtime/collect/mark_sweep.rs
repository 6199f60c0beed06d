//! Mark-sweep (§5): marks reachable objects, then sweeps the heap
//! linearly, returning dead slots to a free list. Non-moving — the
//! stack walker has nothing to fix up after this collector runs.

use crate::runtime::collect::{Collector, GCStats};
use crate::runtime::heap::Heap;
use crate::runtime::mark::{mark_tricolor, PointerMap};
use crate::runtime::object::{MarkState, ObjectRef};
use crate::runtime::stackmap::RelocationMap;

/// One free run, `(offset, size_in_bytes)`. Sweep marks a dead slot's
/// header `Unused` first (§3 "freed but not yet coalesced") and only
/// merges it into an adjacent run afterward, matching the mark word's
/// three-state contract.
#[derive(Default)]
pub struct MarkSweep {
    pub free_list: Vec<(u32, u32)>,
    pub stats: GCStats,
}

impl MarkSweep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coalesces adjacent free runs, in address order. Called after
    /// every sweep so repeated small frees don't fragment the list
    /// indefinitely.
    fn coalesce(&mut self) {
        self.free_list.sort_by_key(|&(off, _)| off);
        let mut merged: Vec<(u32, u32)> = Vec::new();
        for &(off, size) in &self.free_list {
            if let Some(last) = merged.last_mut() {
                if last.0 + last.1 == off {
                    last.1 += size;
                    continue;
                }
            }
            merged.push((off, size));
        }
        self.free_list = merged;
    }
}

impl Collector for MarkSweep {
    fn collect(&mut self, heap: &mut Heap, roots: &[ObjectRef], pointers: &dyn PointerMap) -> RelocationMap {
        let live = mark_tricolor(heap, roots, pointers);

        let mut reclaimed_bytes = 0u64;
        let mut reclaimed_objects = 0u64;
        let mut objects: Vec<ObjectRef> = Vec::new();
        for obj in heap.iter_objects() {
            if live.contains(&obj) {
                heap.set_mark(obj, MarkState::Unset); // reset for next cycle
            } else if heap.mark_of(obj) != MarkState::Unused {
                let size = heap.size_of(obj);
                heap.set_mark(obj, MarkState::Unused);
                self.free_list.push((obj.0, size));
                reclaimed_bytes += size as u64;
                reclaimed_objects += 1;
            }
            objects.push(obj);
        }
        self.coalesce();

        // `bump_alloc` never consults the free list, so the only space
        // this pass can hand back to it directly is a contiguous dead
        // suffix: walk `heap.bump` back over trailing dead slots. They
        // stay recorded in `free_list` too (coalesced below) — a
        // non-moving collector's free list is bookkeeping here, not a
        // reuse path `bump_alloc` draws from, so the overlap is benign.
        while let Some(&last) = objects.last() {
            if live.contains(&last) {
                break;
            }
            heap.bump = last.0 as usize;
            objects.pop();
        }

        self.stats.cycles += 1;
        self.stats.bytes_reclaimed += reclaimed_bytes;
        self.stats.objects_reclaimed += reclaimed_objects;

        RelocationMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::klass::HEADER_SIZE;
    use std::collections::BTreeMap;

    struct TestMap(BTreeMap<u32, Vec<u32>>);
    impl PointerMap for TestMap {
        fn pointer_offsets(&self, tag: u32) -> &[u32] {
            self.0.get(&tag).map(|v| v.as_slice()).unwrap_or(&[])
        }
    }

    #[test]
    fn test_unreachable_object_is_swept() {
        let mut heap = Heap::new(4096);
        let garbage = heap.bump_alloc(0, HEADER_SIZE, 0).unwrap();
        let root = heap.bump_alloc(1, HEADER_SIZE, 0).unwrap();

        let mut gc = MarkSweep::new();
        let pointers = TestMap(BTreeMap::new());
        gc.collect(&mut heap, &[root], &pointers);

        assert_eq!(heap.mark_of(garbage), MarkState::Unused);
        assert_eq!(gc.free_list, vec![(garbage.0, HEADER_SIZE)]);
    }

    #[test]
    fn test_reachable_object_survives_and_resets_mark() {
        let mut heap = Heap::new(4096);
        let root = heap.bump_alloc(0, HEADER_SIZE, 0).unwrap();

        let mut gc = MarkSweep::new();
        let pointers = TestMap(BTreeMap::new());
        gc.collect(&mut heap, &[root], &pointers);

        assert_eq!(heap.mark_of(root), MarkState::Unset);
        assert!(gc.free_list.is_empty());
    }

    #[test]
    fn test_adjacent_free_runs_coalesce() {
        let mut heap = Heap::new(4096);
        let a = heap.bump_alloc(0, HEADER_SIZE, 0).unwrap();
        let b = heap.bump_alloc(0, HEADER_SIZE, 0).unwrap();

        let mut gc = MarkSweep::new();
        let pointers = TestMap(BTreeMap::new());
        gc.collect(&mut heap, &[], &pointers); // nothing rooted: both die

        assert_eq!(gc.free_list, vec![(a.0, 2 * HEADER_SIZE)]);
        assert!(a.0 + HEADER_SIZE == b.0);
    }
}
