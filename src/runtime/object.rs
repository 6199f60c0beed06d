//! Bit-exact object layout (§6) shared by every collector and by the
//! stack walker: `[mark, tag, size_in_bytes, dispatch_table_ptr]`
//! followed by the payload, all words little-endian and `WORD_SIZE`
//! bytes wide (§3 "Object header").

use crate::klass::WORD_SIZE;

/// Byte offset, from an object's base, of each header word.
pub const MARK_OFFSET: usize = 0;
pub const TAG_OFFSET: usize = WORD_SIZE as usize;
pub const SIZE_OFFSET: usize = 2 * WORD_SIZE as usize;
pub const DISP_OFFSET: usize = 3 * WORD_SIZE as usize;
pub const HEADER_WORDS: usize = 4;
pub const HEADER_SIZE: usize = HEADER_WORDS * WORD_SIZE as usize;

/// The mark word's three observable values (§3 "Object header").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkState {
    /// Zero. The object has not been visited by the current cycle.
    Unset,
    /// A non-zero canonical pattern. The object is live.
    Set,
    /// A distinct canonical pattern: freed but not yet coalesced back
    /// into the free list (mark-sweep's sweep phase transitions
    /// through this before merging adjacent free runs).
    Unused,
}

pub const MARK_UNSET: u64 = 0;
pub const MARK_SET: u64 = 0x5A5A_5A5A_5A5A_5A5A;
pub const MARK_UNUSED: u64 = 0xDEAD_DEAD_DEAD_DEAD;

impl MarkState {
    pub fn encode(self) -> u64 {
        match self {
            MarkState::Unset => MARK_UNSET,
            MarkState::Set => MARK_SET,
            MarkState::Unused => MARK_UNUSED,
        }
    }

    pub fn decode(word: u64) -> MarkState {
        match word {
            MARK_UNSET => MarkState::Unset,
            MARK_SET => MarkState::Set,
            _ => MarkState::Unused,
        }
    }
}

/// A reference to an object is just its byte offset into the heap's
/// backing buffer. `0` is reserved as the null pointer (no object is
/// ever allocated at offset zero — the allocator's bump pointer starts
/// past it) so `Option<ObjectRef>` can be represented as a plain
/// `ObjectRef` with `NULL` standing in for `None` the way generated
/// code represents void references (§3 object-reference typing rule).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef(pub u32);

impl ObjectRef {
    pub const NULL: ObjectRef = ObjectRef(0);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

/// Reserved header word value (`-1` as an unsigned 64-bit pattern)
/// placed immediately before every constant descriptor in rodata (§6),
/// so the GC can recognize "this is a constant, not a heap object"
/// while scanning the rodata region and leave it unmoved/unmarked.
pub const CONST_MARKER: u64 = u64::MAX;

/// Every field slot (attribute, or the one extra payload word on a
/// boxed Int/Bool) is a full machine word holding either a pointer to
/// another heap object or an unboxed scalar. The GC must know, per
/// class tag, which field offsets are live pointers; that information
/// comes from the Klass table's flattened field list, not from this
/// module — see [`crate::runtime::entry::pointer_field_offsets`].
pub fn payload_offset() -> usize {
    HEADER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_state_round_trips() {
        assert_eq!(MarkState::decode(MarkState::Unset.encode()), MarkState::Unset);
        assert_eq!(MarkState::decode(MarkState::Set.encode()), MarkState::Set);
        assert_eq!(MarkState::decode(MarkState::Unused.encode()), MarkState::Unused);
    }

    #[test]
    fn test_null_is_distinct_from_any_real_offset() {
        assert!(ObjectRef::NULL.is_null());
        assert!(!ObjectRef(HEADER_SIZE as u32).is_null());
    }
}
