//! The marker (§5 "Marker: single-pass tri-color FIFO (gray queue) or
//! bitmap-based; marking is *not* re-entrant"). Both variants share the
//! same pointer-field contract: a `PointerMap` tells the marker which
//! field offsets of an object whose tag is `t` hold outgoing
//! references, so it never has to guess at payload layout.

use std::collections::{HashSet, VecDeque};

use crate::klass::{HEADER_SIZE, WORD_SIZE};
use crate::runtime::heap::Heap;
use crate::runtime::object::{MarkState, ObjectRef};

/// Per-tag field layout: which field offsets (from the object base)
/// hold outgoing heap pointers. Every attribute slot in the Cool object
/// model is a full-word reference (even boxed Int/Bool/String
/// attributes are pointers to their box — §6), so in practice this is
/// "every field slot" for ordinary classes; Int/Bool/String prototypes
/// have no pointer fields of their own (their one extra payload word is
/// a raw scalar, not a reference).
pub trait PointerMap {
    fn pointer_offsets(&self, tag: u32) -> &[u32];
}

/// Walks from `roots`, marking every transitively reachable object
/// `Set`. Uses an explicit FIFO gray queue rather than recursion so
/// marking terminates on cyclic graphs without blowing the native
/// stack (§5 "marking is *not* re-entrant" — the original cannot
/// recurse into `mark()` while already marking, which is exactly what
/// an explicit worklist avoids).
pub fn mark_tricolor(heap: &mut Heap, roots: &[ObjectRef], pointers: &dyn PointerMap) -> HashSet<ObjectRef> {
    let mut gray: VecDeque<ObjectRef> = VecDeque::new();
    let mut black: HashSet<ObjectRef> = HashSet::new();

    for &root in roots {
        if root.is_null() {
            continue;
        }
        if heap.mark_of(root) == MarkState::Unset {
            heap.set_mark(root, MarkState::Set);
            gray.push_back(root);
        }
    }

    while let Some(obj) = gray.pop_front() {
        black.insert(obj);
        let tag = heap.tag_of(obj);
        for &offset in pointers.pointer_offsets(tag) {
            let child_word = heap.field(obj, offset);
            if child_word == 0 {
                continue;
            }
            let child = ObjectRef(child_word as u32);
            if heap.mark_of(child) == MarkState::Unset {
                heap.set_mark(child, MarkState::Set);
                gray.push_back(child);
            }
        }
    }

    black
}

/// A bitmap-based marker: one bit per `WORD_SIZE`-aligned slot, sized
/// to cover the whole heap. Equivalent reachability result to
/// `mark_tricolor`, used by the compacting collectors that need a dense
/// liveness bitmap rather than a header-word mark state (§5 collectors
/// list: "bitmap-based" marking feeds directly into the Compressor's
/// "bitmap-and-offset-table" compaction).
pub struct MarkBitmap {
    bits: Vec<bool>,
}

impl MarkBitmap {
    pub fn new(heap_capacity: usize) -> Self {
        Self { bits: vec![false; heap_capacity / WORD_SIZE as usize] }
    }

    fn slot(obj: ObjectRef) -> usize {
        obj.0 as usize / WORD_SIZE as usize
    }

    pub fn is_marked(&self, obj: ObjectRef) -> bool {
        self.bits[Self::slot(obj)]
    }

    pub fn mark(&mut self, obj: ObjectRef) {
        self.bits[Self::slot(obj)] = true;
    }

    pub fn build(heap: &Heap, roots: &[ObjectRef], pointers: &dyn PointerMap) -> MarkBitmap {
        let mut bitmap = MarkBitmap::new(heap.capacity);
        let mut gray: VecDeque<ObjectRef> = VecDeque::new();

        for &root in roots {
            if !root.is_null() && !bitmap.is_marked(root) {
                bitmap.mark(root);
                gray.push_back(root);
            }
        }

        while let Some(obj) = gray.pop_front() {
            let tag = heap.tag_of(obj);
            for &offset in pointers.pointer_offsets(tag) {
                let child_word = heap.field(obj, offset);
                if child_word == 0 {
                    continue;
                }
                let child = ObjectRef(child_word as u32);
                if !bitmap.is_marked(child) {
                    bitmap.mark(child);
                    gray.push_back(child);
                }
            }
        }

        bitmap
    }
}
