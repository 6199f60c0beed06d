//! The Compressor (§5): a bitmap-and-offset-table sliding compactor.
//! Liveness comes from a dense mark bitmap ([`MarkBitmap`]) rather than
//! per-object mark words; forwarding addresses are computed from a
//! block-level prefix-sum table instead of a per-object hashmap, so
//! the address of any live object can be found in O(1) block lookups
//! plus a linear scan of its own block, rather than one hashmap lookup
//! per object (the trade real "offset table" compactors make to avoid
//! an auxiliary entry per live object).

use crate::runtime::collect::{copy_and_fixup, Collector, GCStats};
use crate::runtime::heap::Heap;
use crate::runtime::mark::{MarkBitmap, PointerMap};
use crate::runtime::object::ObjectRef;
use crate::runtime::stackmap::RelocationMap;

/// Block size for the offset table, in bytes. Any value that divides
/// evenly into the word size's multiples works; 256B keeps the table
/// small without making the intra-block scan expensive.
const BLOCK_SIZE: usize = 256;

#[derive(Default)]
pub struct Compressor {
    pub stats: GCStats,
}

impl Compressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `offsets[i]` = total live bytes in every block before block `i`.
    /// Computed once per cycle by scanning objects in address order and
    /// accumulating into the block their start address falls in.
    fn build_offset_table(heap: &Heap, bitmap: &MarkBitmap, objects: &[ObjectRef]) -> Vec<u64> {
        let block_count = heap.capacity.div_ceil(BLOCK_SIZE);
        let mut live_bytes_per_block = vec![0u64; block_count];
        for &obj in objects {
            if bitmap.is_marked(obj) {
                live_bytes_per_block[obj.0 as usize / BLOCK_SIZE] += heap.size_of(obj) as u64;
            }
        }
        let mut offsets = vec![0u64; block_count];
        let mut running = 0u64;
        for i in 0..block_count {
            offsets[i] = running;
            running += live_bytes_per_block[i];
        }
        offsets
    }
}

impl Collector for Compressor {
    fn collect(&mut self, heap: &mut Heap, roots: &[ObjectRef], pointers: &dyn PointerMap) -> RelocationMap {
        let bitmap = MarkBitmap::build(heap, roots, pointers);
        let objects: Vec<ObjectRef> = heap.iter_objects().collect();
        let offsets = Self::build_offset_table(heap, &bitmap, &objects);

        let mut relocation = RelocationMap::new();
        let mut within_block = vec![0u64; offsets.len()];
        for &obj in &objects {
            if !bitmap.is_marked(obj) {
                continue;
            }
            let block = obj.0 as usize / BLOCK_SIZE;
            let new_addr = crate::klass::WORD_SIZE as u64 + offsets[block] + within_block[block];
            relocation.insert(obj, ObjectRef(new_addr as u32));
            within_block[block] += heap.size_of(obj) as u64;
        }

        let before = heap.bump;
        copy_and_fixup(heap, &relocation, pointers);
        self.stats.cycles += 1;
        self.stats.bytes_reclaimed += before.saturating_sub(heap.bump) as u64;

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
    fn test_offset_table_compaction_packs_survivors() {
        let mut heap = Heap::new(4096);
        let dead = heap.bump_alloc(0, HEADER_SIZE, 0).unwrap();
        let keep_a = heap.bump_alloc(1, HEADER_SIZE, 0).unwrap();
        let keep_b = heap.bump_alloc(1, HEADER_SIZE, 0).unwrap();
        let _ = dead;

        let mut gc = Compressor::new();
        let pointers = TestMap(BTreeMap::new());
        let relocation = gc.collect(&mut heap, &[keep_a, keep_b], &pointers);

        assert_eq!(relocation[&keep_a].0, WORD_SIZE as u32);
        assert_eq!(relocation[&keep_b].0, WORD_SIZE as u32 + HEADER_SIZE);
        assert_eq!(heap.bump as u32, WORD_SIZE as u32 + 2 * HEADER_SIZE);
    }

    #[test]
    fn test_compressor_preserves_reachable_payload() {
        let mut heap = Heap::new(4096);
        let keep = heap.bump_alloc(1, HEADER_SIZE + WORD_SIZE, 0).unwrap();
        heap.set_field(keep, HEADER_SIZE, 77);

        let mut gc = Compressor::new();
        let pointers = TestMap(BTreeMap::new());
        let relocation = gc.collect(&mut heap, &[keep], &pointers);

        let new_keep = relocation[&keep];
        assert_eq!(heap.field(new_keep, HEADER_SIZE), 77);
    }
}
