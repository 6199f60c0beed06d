//! The stack map and stack walker (§3 "Stack map", §5 "Stack walker").
//! Only the GC-integrated IR backend needs these — the stack-machine
//! backend has no safepoints of its own (§1 scope note: MIPS text
//! emission, including its runtime glue, is out of core scope).

use std::collections::BTreeMap;

use crate::runtime::heap::Heap;
use crate::runtime::object::ObjectRef;

/// One live GC-managed slot at a safepoint: `base_offset` is where the
/// object's original address lives in the frame; `derived_offset`, if
/// present, is a second frame slot holding a pointer computed *from*
/// the base (e.g. `base + field_offset`) that must be re-derived after
/// the base moves, not independently relocated (§3 "a list of
/// (base-offset, derived-offset) pairs").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootSlot {
    pub base_offset: i32,
    pub derived_offset: Option<i32>,
}

/// One safepoint's worth of frame metadata (§3 "each entry describing
/// the frame size at that safepoint and a list of ... pairs").
#[derive(Clone, Debug, Default)]
pub struct StackMapEntry {
    pub frame_size: u32,
    pub roots: Vec<RootSlot>,
}

/// Keyed by return address (§3: "a table keyed by return address").
/// Addresses are opaque `u64`s here — the IR backend's safepoint
/// bookkeeping assigns them, this table doesn't care how.
#[derive(Clone, Debug, Default)]
pub struct StackMapTable {
    pub entries: BTreeMap<u64, StackMapEntry>,
}

impl StackMapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, return_address: u64, entry: StackMapEntry) {
        self.entries.insert(return_address, entry);
    }

    pub fn get(&self, return_address: u64) -> Option<&StackMapEntry> {
        self.entries.get(&return_address)
    }
}

/// A single activation frame as the walker sees it: a byte buffer
/// (the mutator's real stack, in generated code) and the return
/// address that selects which `StackMapEntry` describes it.
pub struct Frame<'a> {
    pub memory: &'a mut [u8],
    pub return_address: u64,
}

fn read_ptr(mem: &[u8], offset: i32) -> u32 {
    let o = offset as usize;
    u32::from_le_bytes(mem[o..o + 4].try_into().unwrap())
}

fn write_ptr(mem: &mut [u8], offset: i32, value: u32) {
    let o = offset as usize;
    mem[o..o + 4].copy_from_slice(&value.to_le_bytes());
}

/// Walks every frame, looks up its safepoint in `table`, and rewrites
/// every live pointer through `relocate`. Base pointers are updated
/// first, in every frame, before any derived pointer is recomputed
/// (§5: "Derived pointers are fixed after all base pointers have been
/// updated") — a derived pointer's correct new value depends only on
/// its own base's *new* address, never on another frame's base, but
/// computing it from a stale base before that base is rewritten would
/// silently use the pre-collection address.
pub fn walk_and_relocate(
    frames: &mut [Frame<'_>],
    table: &StackMapTable,
    relocate: impl Fn(ObjectRef) -> ObjectRef,
) {
    let mut base_deltas: Vec<Vec<(i32, i32)>> = Vec::with_capacity(frames.len());

    for frame in frames.iter_mut() {
        let mut deltas = Vec::new();
        let Some(entry) = table.get(frame.return_address) else {
            base_deltas.push(deltas);
            continue;
        };
        for slot in &entry.roots {
            let old = ObjectRef(read_ptr(frame.memory, slot.base_offset));
            if old.is_null() {
                continue;
            }
            let new = relocate(old);
            write_ptr(frame.memory, slot.base_offset, new.0);
            if slot.derived_offset.is_some() {
                deltas.push((slot.base_offset, new.0 as i32 - old.0 as i32));
            }
        }
        base_deltas.push(deltas);
    }

    for (frame, deltas) in frames.iter_mut().zip(base_deltas.iter()) {
        let Some(entry) = table.get(frame.return_address) else { continue };
        for slot in &entry.roots {
            let Some(derived_offset) = slot.derived_offset else { continue };
            if let Some(&(_, delta)) = deltas.iter().find(|(b, _)| *b == slot.base_offset) {
                let old_derived = read_ptr(frame.memory, derived_offset) as i32;
                write_ptr(frame.memory, derived_offset, (old_derived + delta) as u32);
            }
        }
    }
}

/// The relocation a compacting/copying collector hands the walker:
/// old address -> new address, for every object it moved this cycle.
pub type RelocationMap = BTreeMap<ObjectRef, ObjectRef>;

pub fn relocation_lookup(map: &RelocationMap) -> impl Fn(ObjectRef) -> ObjectRef + '_ {
    move |old| *map.get(&old).unwrap_or(&old)
}
