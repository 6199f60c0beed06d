//! The untyped (post-parse) and typed (post-semant) abstract syntax tree.
//!
//! Modeled as an arena of AST nodes indexed by stable integer ids rather
//! than a graph of reference-counted pointers (§9 design note): a `Class`
//! stores its children by name, never by direct node reference, and the
//! class-hierarchy tree built in `semant` is a separate adjacency
//! structure layered on top.

use crate::span::{Span, Spanned};

/// Computes the 1-based source line containing a byte offset.
pub fn line_of(source: &str, offset: u32) -> u32 {
    1 + source.as_bytes()[..offset as usize]
        .iter()
        .filter(|&&b| b == b'\n')
        .count() as u32
}

/// The set of source files fed to one compilation, indexed by `Span::file_id`
/// in the order they were given on the command line (§6: "every positional
/// argument is a source file; all are concatenated semantically").
#[derive(Clone, Debug, Default)]
pub struct SourceMap {
    files: Vec<(String, String)>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Registers a file, returning the `file_id` subsequent spans should use.
    pub fn add(&mut self, filename: impl Into<String>, source: impl Into<String>) -> u16 {
        self.files.push((filename.into(), source.into()));
        (self.files.len() - 1) as u16
    }

    pub fn filename(&self, file_id: u16) -> &str {
        self.files
            .get(file_id as usize)
            .map(|(name, _)| name.as_str())
            .unwrap_or("<builtin>")
    }

    pub fn source(&self, file_id: u16) -> &str {
        self.files
            .get(file_id as usize)
            .map(|(_, src)| src.as_str())
            .unwrap_or("")
    }

    pub fn line_of_span(&self, span: Span) -> u32 {
        let source = self.source(span.file_id);
        if (span.start as usize) > source.len() {
            return 1;
        }
        line_of(source, span.start)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &str, &str)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, (name, src))| (i as u16, name.as_str(), src.as_str()))
    }
}

pub const SELF_TYPE: &str = "SELF_TYPE";
pub const SELF: &str = "self";
pub const OBJECT: &str = "Object";
pub const INT: &str = "Int";
pub const BOOL: &str = "Bool";
pub const STRING: &str = "String";
pub const IO: &str = "IO";

#[derive(Clone, Debug)]
pub struct Program {
    pub classes: Vec<Class>,
}

#[derive(Clone, Debug)]
pub struct Class {
    pub name: Spanned<String>,
    pub parent: Spanned<String>,
    pub features: Vec<Feature>,
    pub file: String,
}

#[derive(Clone, Debug)]
pub enum Feature {
    Attribute(Attribute),
    Method(Method),
}

#[derive(Clone, Debug)]
pub struct Attribute {
    pub name: Spanned<String>,
    pub declared_type: Spanned<String>,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct Method {
    pub name: Spanned<String>,
    pub formals: Vec<Formal>,
    pub return_type: Spanned<String>,
    pub body: Expr,
}

#[derive(Clone, Debug)]
pub struct Formal {
    pub name: Spanned<String>,
    pub declared_type: Spanned<String>,
}

/// A fourteen-variant tagged union over every expression form (§3).
/// `static_type`/`allocates` are filled in by `semant`; both are `None`
/// in a freshly parsed tree.
#[derive(Clone, Debug)]
pub struct Expr {
    pub span: crate::span::Span,
    pub kind: ExprKind,
    pub static_type: Option<String>,
    pub allocates: bool,
}

impl Expr {
    pub fn new(span: crate::span::Span, kind: ExprKind) -> Self {
        Self {
            span,
            kind,
            static_type: None,
            allocates: false,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Assign {
        name: Spanned<String>,
        value: Box<Expr>,
    },
    DispatchVirtual {
        receiver: Box<Expr>,
        method: Spanned<String>,
        args: Vec<Expr>,
    },
    DispatchStatic {
        receiver: Box<Expr>,
        target_type: Spanned<String>,
        method: Spanned<String>,
        args: Vec<Expr>,
    },
    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    While {
        cond: Box<Expr>,
        body: Box<Expr>,
    },
    Block {
        exprs: Vec<Expr>,
    },
    Let {
        bindings: Vec<LetBinding>,
        body: Box<Expr>,
    },
    Case {
        scrutinee: Box<Expr>,
        arms: Vec<CaseArm>,
    },
    New {
        type_name: Spanned<String>,
    },
    ObjectRef {
        name: Spanned<String>,
    },
    IntLit(u64),
    StringLit(String),
    BoolLit(bool),
}

#[derive(Clone, Debug)]
pub struct LetBinding {
    pub name: Spanned<String>,
    pub declared_type: Spanned<String>,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct CaseArm {
    pub name: Spanned<String>,
    pub declared_type: Spanned<String>,
    pub body: Expr,
}

/// Seven binary arithmetic/comparison subvariants (§3): +, -, *, /, <, <=, =.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Eq,
}

/// Three unary subvariants: ~ (int negate), not (bool negate), isvoid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    IsVoid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_of_counts_newlines() {
        let src = "a\nb\nc";
        assert_eq!(line_of(src, 0), 1);
        assert_eq!(line_of(src, 2), 2);
        assert_eq!(line_of(src, 4), 3);
    }
}
