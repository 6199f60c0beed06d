//! The GC heap: a flat byte buffer addressed the way generated code
//! addresses it (§6 object layout), plus the bump pointer the
//! allocator advances (§5 "Allocator: bump-style within a heap
//! region").

use crate::klass::WORD_SIZE;
use crate::runtime::object::{
    MarkState, ObjectRef, DISP_OFFSET, HEADER_SIZE, MARK_OFFSET, SIZE_OFFSET, TAG_OFFSET,
};

const WORD: usize = WORD_SIZE as usize;

/// A single contiguous semispace-or-whole-heap buffer. `Heap` itself
/// has no GC policy — allocation, marking and collection are layered
/// on top (`alloc`, `mark`, `collect`) so every collector in §5 shares
/// the same addressing and header contract.
pub struct Heap {
    pub memory: Vec<u8>,
    /// Next free byte; the allocator's bump pointer.
    pub bump: usize,
    pub capacity: usize,
}

impl Heap {
    pub fn new(capacity: usize) -> Self {
        Self {
            memory: vec![0u8; capacity],
            // Reserve offset 0 so `ObjectRef::NULL` never aliases a
            // real object (§3 object header: "payload follows at
            // sizeof(header)" assumes a non-zero base).
            bump: WORD,
            capacity,
        }
    }

    pub fn read_word(&self, offset: usize) -> u64 {
        let bytes = &self.memory[offset..offset + WORD];
        u64::from_le_bytes(bytes.try_into().unwrap())
    }

    pub fn write_word(&mut self, offset: usize, value: u64) {
        self.memory[offset..offset + WORD].copy_from_slice(&value.to_le_bytes());
    }

    pub fn mark_of(&self, obj: ObjectRef) -> MarkState {
        MarkState::decode(self.read_word(obj.0 as usize + MARK_OFFSET))
    }

    pub fn set_mark(&mut self, obj: ObjectRef, state: MarkState) {
        self.write_word(obj.0 as usize + MARK_OFFSET, state.encode());
    }

    pub fn tag_of(&self, obj: ObjectRef) -> u32 {
        self.read_word(obj.0 as usize + TAG_OFFSET) as u32
    }

    pub fn size_of(&self, obj: ObjectRef) -> u32 {
        self.read_word(obj.0 as usize + SIZE_OFFSET) as u32
    }

    pub fn disp_tab_of(&self, obj: ObjectRef) -> u64 {
        self.read_word(obj.0 as usize + DISP_OFFSET)
    }

    pub fn field(&self, obj: ObjectRef, field_offset: u32) -> u64 {
        self.read_word(obj.0 as usize + field_offset as usize)
    }

    pub fn set_field(&mut self, obj: ObjectRef, field_offset: u32, value: u64) {
        self.write_word(obj.0 as usize + field_offset as usize, value);
    }

    /// Bump-allocates `size_in_bytes` and writes the header (§4.7 "gc_alloc(tag,
    /// size, disp_tab)"). Payload words are left zeroed; the init method
    /// generated code calls next is what fills them in (§4.7 "a class init
    /// method that zero-initializes declared fields").
    pub fn bump_alloc(&mut self, tag: u32, size_in_bytes: u32, disp_tab: u64) -> Option<ObjectRef> {
        let start = self.bump;
        let end = start + size_in_bytes as usize;
        if end > self.capacity {
            return None;
        }
        self.bump = end;
        let obj = ObjectRef(start as u32);
        self.set_mark(obj, MarkState::Unset);
        self.write_word(start + TAG_OFFSET, tag as u64);
        self.write_word(start + SIZE_OFFSET, size_in_bytes as u64);
        self.write_word(start + DISP_OFFSET, disp_tab);
        Some(obj)
    }

    /// Iterates live object headers from the heap's base up to the bump
    /// pointer, without consulting mark state — used by sweep/compact
    /// phases that must visit every allocated slot, live or dead.
    pub fn iter_objects(&self) -> HeapObjectIter<'_> {
        HeapObjectIter { heap: self, cursor: WORD }
    }

    pub fn bytes_in_use(&self) -> usize {
        self.bump - WORD
    }

    pub fn bytes_free(&self) -> usize {
        self.capacity - self.bump
    }
}

pub struct HeapObjectIter<'a> {
    heap: &'a Heap,
    cursor: usize,
}

impl<'a> Iterator for HeapObjectIter<'a> {
    type Item = ObjectRef;

    fn next(&mut self) -> Option<ObjectRef> {
        if self.cursor >= self.heap.bump {
            return None;
        }
        let obj = ObjectRef(self.cursor as u32);
        let size = self.heap.size_of(obj).max(HEADER_SIZE as u32);
        self.cursor += size as usize;
        Some(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_alloc_writes_header_and_advances() {
        let mut heap = Heap::new(4096);
        let obj = heap.bump_alloc(3, HEADER_SIZE as u32 + WORD as u32, 0xBEEF).unwrap();
        assert_eq!(heap.tag_of(obj), 3);
        assert_eq!(heap.size_of(obj), HEADER_SIZE as u32 + WORD as u32);
        assert_eq!(heap.disp_tab_of(obj), 0xBEEF);
        assert_eq!(heap.mark_of(obj), MarkState::Unset);
    }

    #[test]
    fn test_bump_alloc_fails_past_capacity() {
        let mut heap = Heap::new(HEADER_SIZE + WORD);
        assert!(heap.bump_alloc(0, HEADER_SIZE as u32, 0).is_some());
        assert!(heap.bump_alloc(0, HEADER_SIZE as u32 * 2, 0).is_none());
    }

    #[test]
    fn test_iter_objects_visits_every_allocation() {
        let mut heap = Heap::new(4096);
        let a = heap.bump_alloc(0, HEADER_SIZE as u32, 0).unwrap();
        let b = heap.bump_alloc(1, HEADER_SIZE as u32, 0).unwrap();
        let seen: Vec<_> = heap.iter_objects().collect();
        assert_eq!(seen, vec![a, b]);
    }
}
