//! Backend-shared contract (§4.7): the two lowerings
//! (`backend::stack`, a direct stack-machine lowering, and
//! `backend::ir_backend`, lowering through the custom SSA IR) consume
//! the same typed AST and [`crate::klass::KlassTable`]/[`crate::data::Data`]
//! layer and agree on init-method structure, case-dispatch branch
//! ordering, virtual/static dispatch sequencing, and `new` lowering.
//!
//! §9 design note: the original shares emit logic between backends via
//! a `<Value, Symbol>` template parameter (stack backend: `Value = void`,
//! symbols carry frame-pointer offsets; IR backend: `Value` = operand
//! handle, symbols carry operand handles). Rust has no template
//! parameter of that shape without either dynamic dispatch per expression
//! (defeating the point: the two backends' "value" representations don't
//! share an interface worth abstracting over) or a generic associated
//! type per emitted value that would need to flow through every method on
//! a shared trait. Given only two call sites ever exist, each backend
//! implements §4.7's contract directly against its own value type instead
//! of through a shared trait; the contract stays enforced by sharing
//! ordering helpers (`case_branches_by_descending_tag`) and the Klass/Data
//! layer both lower against.

pub mod ir_backend;
pub mod stack;

use crate::klass::KlassTable;

/// Where a name resolves to at codegen time (§3 "SymbolTable").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symbol<L> {
    /// An attribute: byte offset from the object base, header included —
    /// `Klass::field_offset` already adds `HEADER_SIZE`.
    Field(u32),
    /// A formal or let/case binding. `L` is the backend's own value
    /// handle: a frame-pointer-relative byte offset for the stack
    /// backend, an IR operand id for the IR backend.
    Local(L),
}

/// A stack of name→Symbol frames (§3). Each backend instantiates this
/// with its own local-handle type.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable<L> {
    frames: Vec<Vec<(String, Symbol<L>)>>,
}

impl<L: Copy> SymbolTable<L> {
    pub fn new() -> Self {
        Self { frames: vec![Vec::new()] }
    }

    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn bind(&mut self, name: impl Into<String>, sym: Symbol<L>) {
        self.frames.last_mut().expect("no active scope").push((name.into(), sym));
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol<L>> {
        for frame in self.frames.iter().rev() {
            if let Some((_, sym)) = frame.iter().rev().find(|(n, _)| n == name) {
                return Some(*sym);
            }
        }
        None
    }

    /// Every name's *currently visible* `Local` binding (shadowed
    /// bindings excluded, same resolution order as `lookup`) — the IR
    /// backend's source of "which locals are live right here" when it
    /// records a GC safepoint at a call.
    pub fn live_locals(&self) -> Vec<L> {
        let mut seen: Vec<&str> = Vec::new();
        let mut out = Vec::new();
        for frame in self.frames.iter().rev() {
            for (name, sym) in frame.iter().rev() {
                if seen.contains(&name.as_str()) {
                    continue;
                }
                seen.push(name.as_str());
                if let Symbol::Local(l) = sym {
                    out.push(*l);
                }
            }
        }
        out
    }
}

/// Branches ordered by descending class tag (§4.7 "Case dispatch"): the
/// most specific match is tested first. Ties can't occur — `collect_features`
/// rejects duplicate branch types before codegen runs.
pub fn case_branches_by_descending_tag<'a>(
    klasses: &KlassTable,
    arms: &'a [crate::ast::CaseArm],
) -> Vec<&'a crate::ast::CaseArm> {
    let mut ordered: Vec<&crate::ast::CaseArm> = arms.iter().collect();
    ordered.sort_by_key(|arm| std::cmp::Reverse(klasses.get(&arm.declared_type.node).tag));
    ordered
}

/// The attribute zero-value per §4.7 "a class init method that
/// zero-initializes declared fields": boxed zero for Int/Bool/String,
/// null for every other reference type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldDefault {
    BoxedZeroInt,
    BoxedZeroBool,
    BoxedEmptyString,
    Null,
}

pub fn field_default(declared_type: &str) -> FieldDefault {
    match declared_type {
        crate::ast::INT => FieldDefault::BoxedZeroInt,
        crate::ast::BOOL => FieldDefault::BoxedZeroBool,
        crate::ast::STRING => FieldDefault::BoxedEmptyString,
        _ => FieldDefault::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_table_shadowing_resolves_innermost_first() {
        let mut t: SymbolTable<u32> = SymbolTable::new();
        t.bind("x", Symbol::Field(0));
        t.push();
        t.bind("x", Symbol::Local(8));
        assert_eq!(t.lookup("x"), Some(Symbol::Local(8)));
        t.pop();
        assert_eq!(t.lookup("x"), Some(Symbol::Field(0)));
    }

    #[test]
    fn test_live_locals_excludes_fields_and_shadowed_bindings() {
        let mut t: SymbolTable<u32> = SymbolTable::new();
        t.bind("self", Symbol::Local(0));
        t.bind("f", Symbol::Field(4));
        t.push();
        t.bind("x", Symbol::Local(8));
        t.push();
        t.bind("x", Symbol::Local(16));
        let live = t.live_locals();
        assert!(live.contains(&0));
        assert!(live.contains(&16));
        assert!(!live.contains(&8));
        assert_eq!(live.len(), 2);
    }

    #[test]
    fn test_field_default_matches_primitive_vs_reference() {
        assert_eq!(field_default("Int"), FieldDefault::BoxedZeroInt);
        assert_eq!(field_default("Bool"), FieldDefault::BoxedZeroBool);
        assert_eq!(field_default("String"), FieldDefault::BoxedEmptyString);
        assert_eq!(field_default("Widget"), FieldDefault::Null);
    }
}
