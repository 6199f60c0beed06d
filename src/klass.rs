//! The Klass descriptor table (§3, §4.4): a per-class, flattened view of
//! fields, methods, tag interval and size, built bottom-up from the typed
//! class hierarchy. This is the contract both backends (`backend::stack`
//! and `backend::ir_backend`) consume — neither backend re-derives field
//! offsets or method indices on its own.

use std::collections::BTreeMap;

use crate::ast::{Class, Feature, Method, OBJECT};
use crate::semant::ClassTree;

/// Word size in bytes, matching the object-header layout of §6 (four
/// header words, little-endian, each `WORD_SIZE` bytes).
pub const WORD_SIZE: u32 = 8;
/// `[mark, tag, size_in_bytes, dispatch_table_ptr]`.
pub const HEADER_WORDS: u32 = 4;
pub const HEADER_SIZE: u32 = HEADER_WORDS * WORD_SIZE;

/// One flattened field: its name and declared (static) type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub declared_type: String,
}

/// One flattened method table entry: which class defines the body that
/// runs at this index, and the feature itself (for codegen to lower).
#[derive(Clone, Debug)]
pub struct MethodEntry {
    pub defining_class: String,
    pub method: Method,
}

/// Per-class descriptor (§3 "Klass descriptor"). `tag`/`child_max_tag`
/// form the half-open... no — half-*closed* interval `[tag, child_max_tag]`
/// used by case-dispatch and by `Klass::conforms`.
#[derive(Clone, Debug)]
pub struct Klass {
    pub name: String,
    pub parent: String,
    pub tag: u32,
    pub child_max_tag: u32,
    pub fields: Vec<Field>,
    pub methods: Vec<MethodEntry>,
}

impl Klass {
    pub fn field_offset(&self, index: usize) -> u32 {
        HEADER_SIZE + (index as u32) * WORD_SIZE
    }

    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.method.name.node == name)
    }

    pub fn method_full_name(&self, name: &str) -> Option<String> {
        self.methods
            .iter()
            .find(|m| m.method.name.node == name)
            .map(|m| format!("{}.{}", m.defining_class, name))
    }

    pub fn size_in_bytes(&self) -> u32 {
        HEADER_SIZE + (self.fields.len() as u32) * WORD_SIZE
    }

    /// Whether a class whose tag is `candidate` is this class or one of
    /// its transitive descendants (§8 "tag intervals" invariant).
    pub fn tag_in_subtree(&self, candidate: u32) -> bool {
        candidate >= self.tag && candidate <= self.child_max_tag
    }
}

/// The full table, keyed by class name, plus a tag→name index for
/// dispatch-table and case-branch lowering.
#[derive(Debug)]
pub struct KlassTable {
    pub by_name: BTreeMap<String, Klass>,
    pub by_tag: Vec<String>,
}

impl KlassTable {
    pub fn get(&self, name: &str) -> &Klass {
        &self.by_name[name]
    }

    pub fn by_tag(&self, tag: u32) -> &Klass {
        &self.by_name[&self.by_tag[tag as usize]]
    }

    /// `A ≤ B` (§4.3 Conformance): `B.tag ≤ A.tag ≤ B.child_max_tag`.
    pub fn conforms(&self, a: &str, b: &str) -> bool {
        let ka = self.get(a);
        let kb = self.get(b);
        kb.tag <= ka.tag && ka.tag <= kb.child_max_tag
    }
}

/// Builds the Klass table top-down from the hierarchy's processing order
/// (root first — §4.4 "Klass construction is top-down"). Tags are
/// assigned by the same DFS order the hierarchy was linearized in, which
/// is itself a valid pre-order traversal, so `tag` assignment and
/// `child_max_tag` computation only need one forward pass plus one
/// backward pass over `order`.
pub fn build_klass_table(tree: &ClassTree, typed: &BTreeMap<String, Class>) -> KlassTable {
    let mut by_name: BTreeMap<String, Klass> = BTreeMap::new();
    let mut by_tag: Vec<String> = Vec::new();

    for (tag, name) in tree.order.iter().enumerate() {
        let class = &typed[name];
        let tag = tag as u32;
        by_tag.push(name.clone());

        let (mut fields, mut methods) = if name == OBJECT {
            (Vec::new(), Vec::new())
        } else {
            let parent = by_name[&class.parent.node].clone();
            (parent.fields, parent.methods)
        };

        for feature in &class.features {
            match feature {
                Feature::Attribute(attr) => {
                    fields.push(Field {
                        name: attr.name.node.clone(),
                        declared_type: attr.declared_type.node.clone(),
                    });
                }
                Feature::Method(m) => {
                    if let Some(idx) = methods.iter().position(|e: &MethodEntry| e.method.name.node == m.name.node) {
                        methods[idx] = MethodEntry {
                            defining_class: name.clone(),
                            method: m.clone(),
                        };
                    } else {
                        methods.push(MethodEntry {
                            defining_class: name.clone(),
                            method: m.clone(),
                        });
                    }
                }
            }
        }

        by_name.insert(
            name.clone(),
            Klass {
                name: name.clone(),
                parent: class.parent.node.clone(),
                tag,
                child_max_tag: tag, // corrected below
                fields,
                methods,
            },
        );
    }

    // child_max_tag: largest tag in the subtree. `order` is a pre-order
    // (parent before every descendant), so processing it back-to-front
    // and folding each node's own child_max_tag into its parent gives
    // every node the max over its whole subtree in one linear pass.
    for name in tree.order.iter().rev() {
        let (parent, child_max) = {
            let k = &by_name[name];
            (k.parent.clone(), k.child_max_tag)
        };
        if name != OBJECT {
            let p = by_name.get_mut(&parent).unwrap();
            p.child_max_tag = p.child_max_tag.max(child_max);
        }
    }

    KlassTable { by_name, by_tag }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::semant;

    fn build(src: &str) -> KlassTable {
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
    fn test_object_is_tag_zero() {
        let table = build("class Main { main(): Int { 0 }; };");
        assert_eq!(table.get(OBJECT).tag, 0);
    }

    #[test]
    fn test_tag_interval_covers_subtree() {
        let table = build(
            "class A {}; class B inherits A {}; class Main { main(): Int { 0 }; };",
        );
        let a = table.get("A");
        let b = table.get("B");
        assert!(a.tag_in_subtree(b.tag));
        assert!(table.conforms("B", "A"));
        assert!(!table.conforms("A", "B"));
    }

    #[test]
    fn test_field_offsets_parent_first() {
        let table = build(
            "class A { x: Int; }; class B inherits A { y: Int; }; class Main { main(): Int { 0 }; };",
        );
        let b = table.get("B");
        assert_eq!(b.fields[0].name, "x");
        assert_eq!(b.fields[1].name, "y");
        assert_eq!(b.field_offset(0), HEADER_SIZE);
        assert_eq!(b.field_offset(1), HEADER_SIZE + WORD_SIZE);
    }

    #[test]
    fn test_method_index_stable_across_override() {
        let table = build(
            "class A { m(): Int { 1 }; }; class B inherits A { m(): Int { 2 }; }; class Main { main(): Int { 0 }; };",
        );
        let a = table.get("A");
        let b = table.get("B");
        assert_eq!(a.method_index("m"), b.method_index("m"));
        assert_eq!(b.method_full_name("m"), Some("B.m".to_string()));
    }

    #[test]
    fn test_size_in_bytes_grows_with_fields() {
        let table = build(
            "class A { x: Int; y: Int; }; class Main { main(): Int { 0 }; };",
        );
        let a = table.get("A");
        assert_eq!(a.size_in_bytes(), HEADER_SIZE + 2 * WORD_SIZE);
    }
}
