//! The four collectors (§5 "Collectors: mark-sweep, threaded
//! mark-compact (Jonkers), compressor (bitmap-and-offset-table sliding
//! compactor), and semispace copying. Each exposes `collect()`; all are
//! stop-the-world, non-interruptible").

pub mod compressor;
pub mod mark_compact;
pub mod mark_sweep;
pub mod semispace;

use crate::runtime::heap::Heap;
use crate::runtime::mark::PointerMap;
use crate::runtime::object::ObjectRef;
use crate::runtime::stackmap::RelocationMap;

/// Selects one of the four collectors (§6 runtime argv `GCAlgo`).
/// `ZeroGC` never collects — OOM is terminal, matching a program run
/// with collection disabled for measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GCAlgo {
    ZeroGC = 0,
    MarkSweep = 1,
    ThreadedMarkCompact = 2,
    Compressor = 3,
    SemispaceCopying = 4,
}

impl GCAlgo {
    pub fn from_index(n: u32) -> Option<GCAlgo> {
        match n {
            0 => Some(GCAlgo::ZeroGC),
            1 => Some(GCAlgo::MarkSweep),
            2 => Some(GCAlgo::ThreadedMarkCompact),
            3 => Some(GCAlgo::Compressor),
            4 => Some(GCAlgo::SemispaceCopying),
            _ => None,
        }
    }
}

/// Every collector mutates `heap` in place, given the current root set,
/// and returns where (if anywhere) it moved objects to — the stack
/// walker (§runtime::stackmap) uses the returned map to fix up every
/// live pointer still held in a mutator frame. Non-moving collectors
/// return an empty map.
pub trait Collector {
    fn collect(&mut self, heap: &mut Heap, roots: &[ObjectRef], pointers: &dyn PointerMap) -> RelocationMap;
}

/// GC run statistics, surfaced when `PrintGCStatistics`/`TraceGCCycles`
/// (§6 runtime argv) are set.
#[derive(Clone, Copy, Debug, Default)]
pub struct GCStats {
    pub cycles: u32,
    pub bytes_reclaimed: u64,
    pub objects_reclaimed: u64,
}

/// Computes a left-packed forwarding address for every object in
/// `live_in_order` (already sorted by old address), placed contiguously
/// right after the reserved null word, preserving relative order.
pub(crate) fn left_pack_addresses(heap: &Heap, live_in_order: &[ObjectRef]) -> RelocationMap {
    let word = crate::klass::WORD_SIZE as usize;
    let mut relocation = RelocationMap::new();
    let mut cursor = word;
    for &obj in live_in_order {
        relocation.insert(obj, ObjectRef(cursor as u32));
        cursor += heap.size_of(obj) as usize;
    }
    relocation
}

/// The mechanical half every compacting collector shares once it has
/// decided, by its own characteristic algorithm, a `relocation` map:
/// copies every surviving object to its new address and fixes up the
/// pointer fields of the relocated copies against the same map.
pub(crate) fn copy_and_fixup(heap: &mut Heap, relocation: &RelocationMap, pointers: &dyn PointerMap) {
    let mut compacted = vec![0u8; heap.capacity];
    let mut new_top = crate::klass::WORD_SIZE as usize;
    for (&old, &new_obj) in relocation.iter() {
        let size = heap.size_of(old) as usize;
        compacted[new_obj.0 as usize..new_obj.0 as usize + size]
            .copy_from_slice(&heap.memory[old.0 as usize..old.0 as usize + size]);
        new_top = new_top.max(new_obj.0 as usize + size);
    }
    heap.memory = compacted;
    heap.bump = new_top;

    for &new_obj in relocation.values() {
        let tag = heap.tag_of(new_obj);
        for &offset in pointers.pointer_offsets(tag) {
            let old_child = heap.field(new_obj, offset);
            if old_child == 0 {
                continue;
            }
            if let Some(&new_child) = relocation.get(&ObjectRef(old_child as u32)) {
                heap.set_field(new_obj, offset, new_child.0 as u64);
            }
        }
    }
}

/// Relocates every live object named in `live_in_order` into a
/// contiguous left-packed region, then applies [`copy_and_fixup`] —
/// the straightforward single-pass slide every mark-compact variant
/// that doesn't need a block-level offset table (§5 "threaded
/// mark-compact") performs once liveness is known.
pub(crate) fn slide_compact(
    heap: &mut Heap,
    live_in_order: &[ObjectRef],
    pointers: &dyn PointerMap,
) -> RelocationMap {
    let relocation = left_pack_addresses(heap, live_in_order);
    copy_and_fixup(heap, &relocation, pointers);
    relocation
}
