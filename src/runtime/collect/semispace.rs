//! Semispace copying (§5): Cheney's algorithm. Live objects are copied
//! breadth-first from the from-space into a fresh to-space by a single
//! scan pointer that trails the allocation pointer — every object
//! between the heap base and the scan pointer has already had its own
//! pointer fields rewritten to to-space addresses; everything between
//! scan and the allocation pointer has been copied but not yet
//! scanned. No separate mark phase or bitmap: "already copied" *is*
//! "reachable".

use crate::runtime::collect::{Collector, GCStats};
use crate::runtime::heap::Heap;
use crate::runtime::mark::PointerMap;
use crate::runtime::object::ObjectRef;
use crate::runtime::stackmap::RelocationMap;

#[derive(Default)]
pub struct SemispaceCopying {
    pub stats: GCStats,
}

impl SemispaceCopying {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `obj` to `to` if not already relocated, returning its
    /// to-space address either way.
    fn forward(from: &Heap, to: &mut Heap, relocation: &mut RelocationMap, obj: ObjectRef) -> ObjectRef {
        if let Some(&existing) = relocation.get(&obj) {
            return existing;
        }
        let size = from.size_of(obj);
        let new_obj = to
            .bump_alloc(from.tag_of(obj), size, from.disp_tab_of(obj))
            .expect("to-space must be at least as large as reachable live data");
        let word = crate::klass::WORD_SIZE as usize;
        // Copy the payload verbatim; bump_alloc already wrote a fresh
        // header, so only the bytes past it need copying.
        to.memory[new_obj.0 as usize + word..new_obj.0 as usize + size as usize]
            .copy_from_slice(&from.memory[obj.0 as usize + word..obj.0 as usize + size as usize]);
        relocation.insert(obj, new_obj);
        new_obj
    }
}

impl Collector for SemispaceCopying {
    fn collect(&mut self, heap: &mut Heap, roots: &[ObjectRef], pointers: &dyn PointerMap) -> RelocationMap {
        let mut to_space = Heap::new(heap.capacity);
        let mut relocation = RelocationMap::new();

        // Copy roots first; they seed the scan.
        for &root in roots {
            if !root.is_null() {
                Self::forward(heap, &mut to_space, &mut relocation, root);
            }
        }

        let mut scan = crate::klass::WORD_SIZE as usize;
        while scan < to_space.bump {
            let obj = ObjectRef(scan as u32);
            let tag = to_space.tag_of(obj);
            let size = to_space.size_of(obj);
            for &offset in pointers.pointer_offsets(tag) {
                let old_child = to_space.field(obj, offset);
                if old_child == 0 {
                    continue;
                }
                let new_child = Self::forward(heap, &mut to_space, &mut relocation, ObjectRef(old_child as u32));
                to_space.set_field(obj, offset, new_child.0 as u64);
            }
            scan += size as usize;
        }

        let before = heap.bump;
        let after = to_space.bump;
        *heap = to_space;

        self.stats.cycles += 1;
        self.stats.bytes_reclaimed += before.saturating_sub(after) as u64;

        relocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::klass::{HEADER_SIZE, WORD_SIZE};
    use std::collections::BTreeMap;

    struct TestMap(BTreeMap<u32, Vec<u32>>);
    impl PointerMap for TestMap {
        fn pointer_offsets(&self, tag: u32) -> &[u32] {
            self.0.get(&tag).map(|v| v.as_slice()).unwrap_or(&[])
        }
    }

    #[test]
    fn test_only_reachable_objects_survive_the_copy() {
        let mut heap = Heap::new(4096);
        let garbage = heap.bump_alloc(0, HEADER_SIZE, 0).unwrap();
        let root = heap.bump_alloc(1, HEADER_SIZE, 0).unwrap();
        let _ = garbage;

        let mut gc = SemispaceCopying::new();
        let pointers = TestMap(BTreeMap::new());
        let relocation = gc.collect(&mut heap, &[root], &pointers);

        assert_eq!(relocation.len(), 1);
        assert!(relocation.contains_key(&root));
        assert_eq!(heap.bump, WORD_SIZE as usize + HEADER_SIZE as usize);
    }

    #[test]
    fn test_transitive_children_are_copied_and_rewired() {
        let mut heap = Heap::new(4096);
        let leaf = heap.bump_alloc(0, HEADER_SIZE, 0).unwrap();
        let root = heap.bump_alloc(1, HEADER_SIZE + WORD_SIZE, 0).unwrap();
        heap.set_field(root, HEADER_SIZE, leaf.0 as u64);

        let mut map = BTreeMap::new();
        map.insert(1, vec![HEADER_SIZE]);
        let pointers = TestMap(map);

        let mut gc = SemispaceCopying::new();
        let relocation = gc.collect(&mut heap, &[root], &pointers);

        let new_root = relocation[&root];
        let new_leaf = relocation[&leaf];
        assert_eq!(heap.field(new_root, HEADER_SIZE), new_leaf.0 as u64);
    }

    #[test]
    fn test_payload_preserved_across_copy() {
        let mut heap = Heap::new(4096);
        let root = heap.bump_alloc(0, HEADER_SIZE + WORD_SIZE, 0).unwrap();
        heap.set_field(root, HEADER_SIZE, 999);

        let mut gc = SemispaceCopying::new();
        let pointers = TestMap(BTreeMap::new());
        let relocation = gc.collect(&mut heap, &[root], &pointers);

        assert_eq!(heap.field(relocation[&root], HEADER_SIZE), 999);
    }
}
