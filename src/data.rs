//! The backend-independent Data layer (§4.4): memoizes constant
//! descriptors and emits the tables every backend needs — dispatch
//! tables, prototypes, the class-name table, and the class-object table.
//! Both backends request these lazily through the same `Data` value;
//! each descriptor is emitted exactly once, identity-per-key.

use std::collections::BTreeMap;

use crate::klass::{KlassTable, WORD_SIZE};

/// `tag + size + dispatch-table-slot + length` — the fixed header words
/// every String constant descriptor carries before its content (mirrors
/// `STRING_CONST_BASE_SIZE_IN_WORDS` in the original's MIPS data
/// emitter).
pub const STRING_CONST_BASE_WORDS: u32 = 4;

/// Rounds a byte length up to the next whole `WORD_SIZE` multiple, never
/// below one word — the original's `DataSection` pads every string
/// constant's content to a word boundary before emitting its descriptor
/// (§6 "String constants ... padded to a word boundary"), the same way
/// `Utils.cpp`'s helpers round sizes for the assembler's `.align`.
pub fn pad_to_word_boundary(byte_len: usize) -> usize {
    let word = WORD_SIZE as usize;
    byte_len.div_ceil(word).max(1) * word
}

/// A String constant's full descriptor size, in words: the fixed header
/// plus its word-padded content (§6 object layout).
pub fn string_const_size_words(s: &str) -> u32 {
    STRING_CONST_BASE_WORDS + (pad_to_word_boundary(s.len()) / WORD_SIZE as usize) as u32
}

/// Renders `s` the way the original's `printable_string` renders a Cool
/// string literal back out as source text: the five named C escapes,
/// `"` and `\`, and any other non-printable byte as a three-digit octal
/// escape. Used wherever a String constant needs a readable label (debug
/// dumps, diagnostics) rather than its raw bytes.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'\n' => out.push_str("\\n"),
            0x08 => out.push_str("\\b"),
            b'\t' => out.push_str("\\t"),
            0x0c => out.push_str("\\f"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            0x20..=0x7e => out.push(b as char),
            other => out.push_str(&format!("\\{other:03o}")),
        }
    }
    out
}

/// A memoized constant descriptor, identified by its key. The runtime
/// reserves a header word set to `-1` immediately before each constant
/// descriptor (§6) so the GC can recognize rodata constants while
/// scanning; that header word is implicit here — `Data` only tracks
/// *which* constants exist and their stable index, not their emitted
/// bytes (that's a backend concern, §4.7).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConstKey {
    Str(String),
    Int(u64),
    Bool(bool),
}

/// One dispatch-table entry: the selector name and the fully-qualified
/// method symbol that currently occupies it (§3 "Dispatch-table indices
/// are stable across inheritance").
#[derive(Clone, Debug)]
pub struct DispatchEntry {
    pub selector: String,
    pub symbol: String,
}

#[derive(Clone, Debug)]
pub struct DispatchTable {
    pub class: String,
    pub entries: Vec<DispatchEntry>,
}

/// `class_objTab[tag]` pairs a prototype pointer with its init method
/// symbol (§6); `class_nameTab[tag]` is the parallel string-constant
/// index. Both are emitted once the full Klass table is known, since
/// their slot count equals the number of classes.
#[derive(Clone, Debug)]
pub struct ClassObjEntry {
    pub class: String,
    pub prototype_symbol: String,
    pub init_symbol: String,
}

/// The memoization store. `constants` preserves first-seen order so
/// emission order is deterministic across runs (§8 "Parser determinism"
/// extends informally to every deterministic compiler stage).
pub struct Data {
    constants: BTreeMap<ConstKey, usize>,
    order: Vec<ConstKey>,
    /// Word-padded descriptor size for every interned String constant,
    /// by its `intern` index — computed once, at the same moment the
    /// constant itself is first declared (§6 word-boundary padding).
    string_words: BTreeMap<usize, u32>,
    dispatch_tables: BTreeMap<String, DispatchTable>,
    class_name_table: Vec<String>,
    class_obj_table: Vec<ClassObjEntry>,
}

impl Data {
    pub fn new() -> Self {
        Self {
            constants: BTreeMap::new(),
            order: Vec::new(),
            string_words: BTreeMap::new(),
            dispatch_tables: BTreeMap::new(),
            class_name_table: Vec::new(),
            class_obj_table: Vec::new(),
        }
    }

    /// Returns the stable index for `key`, creating its descriptor on
    /// first request. Emitting the same key twice yields the same index —
    /// this is what "exactly one descriptor per key" means in practice.
    pub fn intern(&mut self, key: ConstKey) -> usize {
        if let Some(&idx) = self.constants.get(&key) {
            return idx;
        }
        let idx = self.order.len();
        if let ConstKey::Str(s) = &key {
            self.string_words.insert(idx, string_const_size_words(s));
        }
        self.order.push(key.clone());
        self.constants.insert(key, idx);
        idx
    }

    pub fn constants_in_order(&self) -> &[ConstKey] {
        &self.order
    }

    /// The word-padded descriptor size recorded for the String constant
    /// at `idx` (`None` if `idx` wasn't interned as a `ConstKey::Str`).
    pub fn string_const_words(&self, idx: usize) -> Option<u32> {
        self.string_words.get(&idx).copied()
    }

    /// Builds (or returns the cached) dispatch table for `class`, an
    /// ordered list of (selector, symbol) pairs by method index — the
    /// literal array a virtual-dispatch load indexes into at
    /// `method_index(selector) * WORD_SIZE` (§4.7).
    pub fn dispatch_table(&mut self, klasses: &KlassTable, class: &str) -> &DispatchTable {
        if !self.dispatch_tables.contains_key(class) {
            let k = klasses.get(class);
            let entries = k
                .methods
                .iter()
                .map(|m| DispatchEntry {
                    selector: m.method.name.node.clone(),
                    symbol: format!("{}.{}", m.defining_class, m.method.name.node),
                })
                .collect();
            self.dispatch_tables
                .insert(class.to_string(), DispatchTable { class: class.to_string(), entries });
        }
        &self.dispatch_tables[class]
    }

    /// Emits the class-name table (`class_nameTab[tag] -> String
    /// constant`) and interns one string constant per class name.
    pub fn build_class_name_table(&mut self, klasses: &KlassTable) {
        if !self.class_name_table.is_empty() {
            return;
        }
        for name in &klasses.by_tag {
            self.intern(ConstKey::Str(name.clone()));
            self.class_name_table.push(name.clone());
        }
    }

    pub fn class_name_table(&self) -> &[String] {
        &self.class_name_table
    }

    /// Emits the class-object table (`class_objTab[tag] -> (prototype,
    /// init)`), one entry per class in tag order — the table `new
    /// SELF_TYPE` indexes at `tag * 2` (§4.7).
    pub fn build_class_obj_table(&mut self, klasses: &KlassTable) {
        if !self.class_obj_table.is_empty() {
            return;
        }
        for name in &klasses.by_tag {
            self.class_obj_table.push(ClassObjEntry {
                class: name.clone(),
                prototype_symbol: format!("{name}_protObj"),
                init_symbol: format!("{name}_init"),
            });
        }
    }

    pub fn class_obj_table(&self) -> &[ClassObjEntry] {
        &self.class_obj_table
    }

    /// Offset (in bytes) of the class-object-table entry for `tag`,
    /// matching the "(prototype, init_method)" pair layout of §6.
    pub fn class_obj_entry_offset(tag: u32) -> u32 {
        tag * 2 * WORD_SIZE
    }
}

impl Default for Data {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::klass::build_klass_table;
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
        build_klass_table(&tree, &typed)
    }

    #[test]
    fn test_constants_deduplicate_by_key() {
        let mut data = Data::new();
        let a = data.intern(ConstKey::Str("hi".to_string()));
        let b = data.intern(ConstKey::Str("hi".to_string()));
        let c = data.intern(ConstKey::Str("bye".to_string()));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(data.constants_in_order().len(), 2);
    }

    #[test]
    fn test_dispatch_table_indices_match_klass() {
        let k = klasses(
            "class A { m(): Int { 1 }; }; class Main { main(): Int { 0 }; };",
        );
        let mut data = Data::new();
        let table = data.dispatch_table(&k, "A").clone();
        assert_eq!(table.entries[k.get("A").method_index("m").unwrap()].symbol, "A.m");
    }

    #[test]
    fn test_class_obj_table_offset_doubles_tag() {
        assert_eq!(Data::class_obj_entry_offset(3), 3 * 2 * WORD_SIZE);
    }

    #[test]
    fn test_class_name_table_one_per_class() {
        let k = klasses("class Main { main(): Int { 0 }; };");
        let mut data = Data::new();
        data.build_class_name_table(&k);
        assert_eq!(data.class_name_table().len(), k.by_tag.len());
    }

    #[test]
    fn test_pad_to_word_boundary_rounds_up_and_never_below_one_word() {
        assert_eq!(pad_to_word_boundary(0), WORD_SIZE as usize);
        assert_eq!(pad_to_word_boundary(1), WORD_SIZE as usize);
        assert_eq!(pad_to_word_boundary(WORD_SIZE as usize), WORD_SIZE as usize);
        assert_eq!(pad_to_word_boundary(WORD_SIZE as usize + 1), 2 * WORD_SIZE as usize);
    }

    #[test]
    fn test_string_const_size_words_adds_base_header_to_padded_content() {
        assert_eq!(string_const_size_words(""), STRING_CONST_BASE_WORDS + 1);
        assert_eq!(string_const_size_words("hi"), STRING_CONST_BASE_WORDS + 1);
        let exactly_one_word = "x".repeat(WORD_SIZE as usize);
        assert_eq!(string_const_size_words(&exactly_one_word), STRING_CONST_BASE_WORDS + 1);
        let just_over = "x".repeat(WORD_SIZE as usize + 1);
        assert_eq!(string_const_size_words(&just_over), STRING_CONST_BASE_WORDS + 2);
    }

    #[test]
    fn test_escape_string_matches_cool_source_escapes() {
        assert_eq!(escape_string("a\nb"), "a\\nb");
        assert_eq!(escape_string("tab\there"), "tab\\there");
        assert_eq!(escape_string("quote\""), "quote\\\"");
        assert_eq!(escape_string("back\\slash"), "back\\\\slash");
        assert_eq!(escape_string("\x01"), "\\001");
    }

    #[test]
    fn test_intern_caches_string_const_words_by_index() {
        let mut data = Data::new();
        let idx = data.intern(ConstKey::Str("hello".to_string()));
        assert_eq!(data.string_const_words(idx), Some(string_const_size_words("hello")));
        let int_idx = data.intern(ConstKey::Int(1));
        assert_eq!(data.string_const_words(int_idx), None);
    }
}
