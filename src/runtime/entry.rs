//! The runtime entry-point contract (§6 "Runtime entry points
//! (linker-visible)"): the symbol names generated code calls into, and
//! — for the ones whose behavior is specified precisely enough to be
//! testable independent of a real machine-code target (§8 "Round-trip",
//! "GC preservation") — a reference implementation against [`Heap`].
//!
//! Symbols with no behavioral spec beyond "exists and is callable"
//! (`_init_runtime`, `_finish_runtime`, the `IO_*`/`String_*` primitive
//! methods) are listed for the linker contract but not modeled here —
//! their bodies are target-specific glue (§1 "the target-specific
//! runtime C glue" is explicitly out of scope).

use crate::klass::KlassTable;
use crate::runtime::heap::Heap;
use crate::runtime::mark::PointerMap;
use crate::runtime::object::ObjectRef;

/// Every symbol a generated program links against (§6). The driver
/// never calls these directly — they describe the interface the core
/// exposes to the collaborator that owns real code generation for
/// them (§1).
pub const RUNTIME_ENTRY_POINTS: &[&str] = &[
    "_init_runtime",
    "_finish_runtime",
    "_equals",
    "_case_abort",
    "_dispatch_abort",
    "_case_abort_2",
    "_gc_alloc",
    "Object_copy",
    "Object_abort",
    "Object_type_name",
    "String_length",
    "String_concat",
    "String_substr",
    "IO_out_string",
    "IO_out_int",
    "IO_in_string",
    "IO_in_int",
];

/// Every generated program's mandatory entry symbols (§6: "Every
/// generated program must contain a symbol `Main_init` and `Main.main`").
pub fn mandatory_program_symbols() -> [String; 2] {
    ["Main_init".to_string(), "Main.main".to_string()]
}

/// A [`PointerMap`] grounded directly in the Klass table: every
/// attribute slot is a full-word reference (§6), so the pointer
/// offsets for a class's tag are exactly its flattened field offsets —
/// the same list `Klass::field_offset` indexes into for codegen.
pub struct KlassPointerMap<'a> {
    klasses: &'a KlassTable,
    offsets_by_tag: Vec<Vec<u32>>,
}

impl<'a> KlassPointerMap<'a> {
    pub fn new(klasses: &'a KlassTable) -> Self {
        let offsets_by_tag = klasses
            .by_tag
            .iter()
            .map(|name| {
                let klass = klasses.get(name);
                (0..klass.fields.len()).map(|i| klass.field_offset(i)).collect()
            })
            .collect();
        Self { klasses, offsets_by_tag }
    }
}

impl<'a> PointerMap for KlassPointerMap<'a> {
    fn pointer_offsets(&self, tag: u32) -> &[u32] {
        self.offsets_by_tag
            .get(tag as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// `_equals` (§6): reference equality for non-primitives; for a
/// primitive type, same-type payload equality — two distinct `Int`
/// boxes holding `5` are `_equals` even though they're different
/// objects, the one place object identity isn't what Cool `=` means
/// (§4.3 "Equality `=`").
pub fn equals(heap: &Heap, klasses: &KlassTable, a: ObjectRef, b: ObjectRef) -> bool {
    if a == b {
        return true;
    }
    if a.is_null() || b.is_null() {
        return false;
    }
    let (ta, tb) = (heap.tag_of(a), heap.tag_of(b));
    if ta != tb {
        return false;
    }
    let class_name = klasses.by_tag(ta).name.clone();
    match class_name.as_str() {
        crate::ast::INT | crate::ast::BOOL => {
            let payload_offset = crate::runtime::object::HEADER_SIZE as u32;
            heap.field(a, payload_offset) == heap.field(b, payload_offset)
        }
        crate::ast::STRING => string_bytes(heap, a) == string_bytes(heap, b),
        _ => false,
    }
}

fn string_bytes(heap: &Heap, obj: ObjectRef) -> Vec<u8> {
    let len_offset = crate::runtime::object::HEADER_SIZE as u32;
    let len = heap.field(obj, len_offset) as usize;
    let start = obj.0 as usize + len_offset as usize + 8;
    heap.memory[start..start + len].to_vec()
}

/// A runtime abort, carrying the reason the generated abort call sites
/// give the three specified abort routines (§4.7 "Case dispatch",
/// "Dispatch"; §7 "_gc_alloc on exhaustion ... aborts with an
/// out-of-memory message").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeAbort {
    /// `_case_abort`: no branch in a `case` matched the scrutinee's
    /// dynamic tag.
    CaseNoMatch { dynamic_tag: u32 },
    /// `_case_abort_2`: the scrutinee of a `case` was void, carrying
    /// file/line the way a dispatch-on-void abort does.
    CaseOnVoid { file: String, line: u32 },
    /// `_dispatch_abort`: dispatch (virtual or static) was attempted on
    /// a void receiver.
    DispatchOnVoid { file: String, line: u32 },
    OutOfMemory,
}

/// The linear-search oracle §8's "Round-trip" property compares
/// case-dispatch emission against: walk arms in the order given,
/// testing ancestor-chain membership with `ClassTree::conforms`
/// instead of a tag-interval test. Returns the chosen arm's index, or
/// an abort if the scrutinee is void or no arm matches.
pub fn case_dispatch_oracle(
    tree: &crate::semant::ClassTree,
    scrutinee_class: Option<&str>,
    arm_types: &[String],
) -> Result<usize, RuntimeAbort> {
    let Some(dynamic_class) = scrutinee_class else {
        return Err(RuntimeAbort::CaseOnVoid { file: String::new(), line: 0 });
    };
    let mut best: Option<(usize, usize)> = None; // (arm index, ancestor distance)
    for (i, arm_ty) in arm_types.iter().enumerate() {
        if let Some(distance) = tree.ancestors(dynamic_class).iter().position(|a| a == arm_ty) {
            if best.map(|(_, d)| distance < d).unwrap_or(true) {
                best = Some((i, distance));
            }
        }
    }
    best.map(|(i, _)| i).ok_or_else(|| RuntimeAbort::CaseNoMatch { dynamic_tag: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::semant;

    fn klasses(src: &str) -> KlassTable {
        let mut sources = crate::ast::SourceMap::new();
        sources.add("t.cl", src);
        let (tokens, _) = Lexer::new(src, 0).tokenize();
        let program = Parser::new(tokens, src, "t.cl").parse_program().unwrap();
        let tree = semant::build_inheritance_graph(&program, &sources).unwrap();
        let flat = semant::collect_features(&tree, &sources).unwrap();
        let typed = semant::type_check(&tree, &flat, &sources).unwrap();
        crate::klass::build_klass_table(&tree, &typed)
    }

    #[test]
    fn test_mandatory_symbols_present() {
        let symbols = mandatory_program_symbols();
        assert!(symbols.contains(&"Main_init".to_string()));
        assert!(symbols.contains(&"Main.main".to_string()));
    }

    #[test]
    fn test_klass_pointer_map_matches_field_offsets() {
        let k = klasses("class A { x: Int; y: Object; }; class Main { main(): Int { 0 }; };");
        let map = KlassPointerMap::new(&k);
        let a = k.get("A");
        assert_eq!(map.pointer_offsets(a.tag), vec![a.field_offset(0), a.field_offset(1)]);
    }

    #[test]
    fn test_equals_same_object_is_reflexive() {
        let k = klasses("class Main { main(): Int { 0 }; };");
        let mut heap = Heap::new(4096);
        let obj = heap.bump_alloc(k.get("Main").tag, k.get("Main").size_in_bytes(), 0).unwrap();
        assert!(equals(&heap, &k, obj, obj));
    }

    #[test]
    fn test_equals_distinct_int_boxes_with_same_payload() {
        let k = klasses("class Main { main(): Int { 0 }; };");
        let int_tag = k.get("Int").tag;
        let mut heap = Heap::new(4096);
        let a = heap.bump_alloc(int_tag, crate::runtime::object::HEADER_SIZE as u32 + 8, 0).unwrap();
        let b = heap.bump_alloc(int_tag, crate::runtime::object::HEADER_SIZE as u32 + 8, 0).unwrap();
        heap.set_field(a, crate::runtime::object::HEADER_SIZE as u32, 5);
        heap.set_field(b, crate::runtime::object::HEADER_SIZE as u32, 5);
        assert!(equals(&heap, &k, a, b));
        heap.set_field(b, crate::runtime::object::HEADER_SIZE as u32, 6);
        assert!(!equals(&heap, &k, a, b));
    }

    #[test]
    fn test_case_dispatch_oracle_picks_most_specific_ancestor() {
        let src = "class A {}; class B inherits A {}; class Main { main(): Int { 0 }; };";
        let mut sources = crate::ast::SourceMap::new();
        sources.add("t.cl", src);
        let (tokens, _) = Lexer::new(src, 0).tokenize();
        let program = Parser::new(tokens, src, "t.cl").parse_program().unwrap();
        let tree = semant::build_inheritance_graph(&program, &sources).unwrap();

        let arm_types = vec!["Object".to_string(), "A".to_string()];
        let chosen = case_dispatch_oracle(&tree, Some("B"), &arm_types).unwrap();
        assert_eq!(chosen, 1, "A is more specific than Object for a B instance");
    }

    #[test]
    fn test_case_dispatch_oracle_aborts_on_void() {
        let src = "class Main { main(): Int { 0 }; };";
        let mut sources = crate::ast::SourceMap::new();
        sources.add("t.cl", src);
        let (tokens, _) = Lexer::new(src, 0).tokenize();
        let program = Parser::new(tokens, src, "t.cl").parse_program().unwrap();
        let tree = semant::build_inheritance_graph(&program, &sources).unwrap();

        let err = case_dispatch_oracle(&tree, None, &["Object".to_string()]).unwrap_err();
        assert_eq!(err, RuntimeAbort::CaseOnVoid { file: String::new(), line: 0 });
    }
}
