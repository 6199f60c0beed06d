//! Three-phase semantic analyzer (§4.3): inheritance graph, feature
//! collection, type inference. Errors from every class are batched per
//! phase rather than stopping at the first one (§7), but a phase with
//! any error does not hand a typed tree to the next phase.

pub mod scope;

use std::collections::BTreeMap;

use crate::ast::{
    self, Attribute, BinOp, Class, CaseArm, Expr, ExprKind, Feature, Formal, LetBinding, Method,
    Program, UnaryOp, BOOL, INT, IO, OBJECT, SELF, SELF_TYPE, STRING,
};
use crate::ast::SourceMap;
use crate::diagnostic::format_semantic_error;
use crate::span::Span;
use scope::{AddResult, Scope};

/// A node in the class-hierarchy tree (§3). Parent/child links are by
/// name, not by pointer — an arena-of-nodes keyed by name, per the design
/// note on avoiding reference-counted graph cycles (§9).
#[derive(Clone, Debug)]
pub struct ClassNode {
    pub class: Class,
    pub children: Vec<String>,
}

#[derive(Debug)]
pub struct ClassTree {
    pub nodes: BTreeMap<String, ClassNode>,
    /// Top-down class processing order (root first), used by every later
    /// phase and by Klass construction.
    pub order: Vec<String>,
}

impl ClassTree {
    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.nodes.get(name).map(|n| n.class.parent.node.as_str())
    }

    /// Ancestor-or-self walk from `a` up to `Object`; used to decide
    /// conformance without reference to Klass tag intervals (those are
    /// the codegen-facing representation of the same relation, built
    /// later in the pipeline from this same tree).
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut chain = vec![name.to_string()];
        let mut cur = name.to_string();
        while let Some(parent) = self.parent_of(&cur) {
            chain.push(parent.to_string());
            if parent == cur {
                break;
            }
            cur = parent.to_string();
        }
        chain
    }

    pub fn conforms(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        self.ancestors(a).iter().any(|c| c == b)
    }

    /// Least upper bound: the first common ancestor on both chains.
    pub fn lub(&self, a: &str, b: &str) -> String {
        let a_chain = self.ancestors(a);
        let b_chain: std::collections::HashSet<_> = self.ancestors(b).into_iter().collect();
        a_chain
            .into_iter()
            .find(|c| b_chain.contains(c))
            .unwrap_or_else(|| OBJECT.to_string())
    }
}

fn dummy_body(span: Span) -> Expr {
    Expr::new(span, ExprKind::ObjectRef { name: crate::span::Spanned::new(SELF.to_string(), span) })
}

fn synthetic_method(name: &str, formals: &[(&str, &str)], ret: &str) -> Feature {
    let span = Span::dummy();
    Feature::Method(Method {
        name: crate::span::Spanned::new(name.to_string(), span),
        formals: formals
            .iter()
            .map(|(n, t)| Formal {
                name: crate::span::Spanned::new(n.to_string(), span),
                declared_type: crate::span::Spanned::new(t.to_string(), span),
            })
            .collect(),
        return_type: crate::span::Spanned::new(ret.to_string(), span),
        body: dummy_body(span),
    })
}

/// Inserts the five built-in classes ahead of user classes (§4.3 phase 1).
fn builtin_classes() -> Vec<Class> {
    let span = Span::dummy();
    let name = |s: &str| crate::span::Spanned::new(s.to_string(), span);
    vec![
        Class {
            name: name(OBJECT),
            parent: name(OBJECT),
            file: "<builtin>".to_string(),
            features: vec![
                synthetic_method("abort", &[], OBJECT),
                synthetic_method("type_name", &[], STRING),
                synthetic_method("copy", &[], SELF_TYPE),
            ],
        },
        Class {
            name: name(INT),
            parent: name(OBJECT),
            file: "<builtin>".to_string(),
            features: vec![],
        },
        Class {
            name: name(BOOL),
            parent: name(OBJECT),
            file: "<builtin>".to_string(),
            features: vec![],
        },
        Class {
            name: name(STRING),
            parent: name(OBJECT),
            file: "<builtin>".to_string(),
            features: vec![
                synthetic_method("length", &[], INT),
                synthetic_method("concat", &[("s", STRING)], STRING),
                synthetic_method("substr", &[("i", INT), ("l", INT)], STRING),
            ],
        },
        Class {
            name: name(IO),
            parent: name(OBJECT),
            file: "<builtin>".to_string(),
            features: vec![
                synthetic_method("out_string", &[("x", STRING)], SELF_TYPE),
                synthetic_method("out_int", &[("x", INT)], SELF_TYPE),
                synthetic_method("in_string", &[], STRING),
                synthetic_method("in_int", &[], INT),
            ],
        },
    ]
}

/// Phase 1: builds the class hierarchy, validating parentage and
/// rejecting cycles, redefinitions, and inheritance from primitives.
pub fn build_inheritance_graph(program: &Program, sources: &SourceMap) -> Result<ClassTree, Vec<String>> {
    let mut errors = Vec::new();
    let mut nodes: BTreeMap<String, ClassNode> = BTreeMap::new();

    for class in builtin_classes().into_iter().chain(program.classes.iter().cloned()) {
        if nodes.contains_key(&class.name.node) {
            errors.push(format_semantic_error(
                &class.file,
                sources.line_of_span(class.name.span),
                &format!("class {} redefined", class.name.node),
            ));
            continue;
        }
        if class.name.node != OBJECT
            && (class.parent.node == INT || class.parent.node == BOOL || class.parent.node == STRING)
        {
            errors.push(format_semantic_error(
                &class.file,
                sources.line_of_span(class.name.span),
                &format!("class {} cannot inherit from {}", class.name.node, class.parent.node),
            ));
            continue;
        }
        nodes.insert(class.name.node.clone(), ClassNode { class, children: Vec::new() });
    }

    let names: Vec<String> = nodes.keys().cloned().collect();
    for name in &names {
        if name == OBJECT {
            continue;
        }
        let parent = nodes[name].class.parent.node.clone();
        if !nodes.contains_key(&parent) {
            errors.push(format_semantic_error(
                &nodes[name].class.file,
                sources.line_of_span(nodes[name].class.name.span),
                &format!("class {name} inherits from undefined class {parent}"),
            ));
            continue;
        }
        nodes.get_mut(&parent).unwrap().children.push(name.clone());
    }

    for name in &names {
        if name == OBJECT {
            continue;
        }
        let mut seen = vec![name.clone()];
        let mut cur = name.clone();
        loop {
            let parent = nodes[&cur].class.parent.node.clone();
            if parent == OBJECT {
                break;
            }
            if seen.contains(&parent) {
                errors.push(format_semantic_error(
                    &nodes[name].class.file,
                    sources.line_of_span(nodes[name].class.name.span),
                    &format!("inheritance cycle involving class {name}"),
                ));
                break;
            }
            seen.push(parent.clone());
            cur = parent;
        }
    }

    if !nodes.contains_key("Main") {
        errors.push("no class Main defined".to_string());
    } else if !has_main_method(&nodes) {
        errors.push("class Main has no method main() taking no arguments".to_string());
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let mut order = Vec::new();
    let mut stack = vec![OBJECT.to_string()];
    while let Some(name) = stack.pop() {
        order.push(name.clone());
        let mut children = nodes[&name].children.clone();
        children.sort();
        for c in children.into_iter().rev() {
            stack.push(c);
        }
    }

    Ok(ClassTree { nodes, order })
}

fn has_main_method(nodes: &BTreeMap<String, ClassNode>) -> bool {
    nodes["Main"].class.features.iter().any(|f| {
        matches!(f, Feature::Method(m) if m.name.node == "main" && m.formals.is_empty())
    })
}

/// A flattened, validated view of one class's features — used by
/// type inference and re-derived independently (from the typed tree)
/// by the Klass layer for codegen.
#[derive(Clone, Debug)]
pub struct MethodSig {
    pub defining_class: String,
    pub formals: Vec<String>,
    pub return_type: String,
}

#[derive(Default, Clone, Debug)]
pub struct FlatFeatures {
    pub attributes: Vec<(String, String)>,
    pub methods: Vec<(String, MethodSig)>,
}

/// Phase 2: flattened attribute/method tables per class, checking
/// attribute shadowing and override signature compatibility.
pub fn collect_features(tree: &ClassTree, sources: &SourceMap) -> Result<BTreeMap<String, FlatFeatures>, Vec<String>> {
    let mut errors = Vec::new();
    let mut flat: BTreeMap<String, FlatFeatures> = BTreeMap::new();

    for name in &tree.order {
        let node = &tree.nodes[name];
        let mut features = if name == OBJECT {
            FlatFeatures::default()
        } else {
            flat[&node.class.parent.node].clone()
        };

        for feature in &node.class.features {
            match feature {
                Feature::Attribute(attr) => {
                    if attr.name.node == SELF {
                        errors.push(format_semantic_error(
                            &node.class.file,
                            sources.line_of_span(attr.name.span),
                            "'self' cannot be used as an attribute name",
                        ));
                        continue;
                    }
                    if features.attributes.iter().any(|(n, _)| n == &attr.name.node) {
                        errors.push(format_semantic_error(
                            &node.class.file,
                            sources.line_of_span(attr.name.span),
                            &format!("attribute {} is an attribute of an inherited class", attr.name.node),
                        ));
                        continue;
                    }
                    features.attributes.push((attr.name.node.clone(), attr.declared_type.node.clone()));
                }
                Feature::Method(m) => {
                    let sig = MethodSig {
                        defining_class: name.clone(),
                        formals: m.formals.iter().map(|f| f.declared_type.node.clone()).collect(),
                        return_type: m.return_type.node.clone(),
                    };
                    if let Some(existing_idx) = features.methods.iter().position(|(n, _)| n == &m.name.node) {
                        let existing = &features.methods[existing_idx].1;
                        if existing.formals != sig.formals || existing.return_type != sig.return_type {
                            errors.push(format_semantic_error(
                                &node.class.file,
                                sources.line_of_span(m.name.span),
                                &format!("method {} redefined incompatibly", m.name.node),
                            ));
                            continue;
                        }
                        features.methods[existing_idx] = (m.name.node.clone(), sig);
                    } else {
                        features.methods.push((m.name.node.clone(), sig));
                    }
                }
            }
        }

        flat.insert(name.clone(), features);
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(flat)
}

pub struct Typer<'a> {
    tree: &'a ClassTree,
    flat: &'a BTreeMap<String, FlatFeatures>,
    sources: &'a SourceMap,
    current_class: String,
    errors: Vec<String>,
}

/// Phase 3: type inference over every method and attribute initializer,
/// annotating each `Expr` with its static type and allocation flag.
pub fn type_check(
    tree: &ClassTree,
    flat: &BTreeMap<String, FlatFeatures>,
    sources: &SourceMap,
) -> Result<BTreeMap<String, Class>, Vec<String>> {
    let mut typed: BTreeMap<String, Class> = BTreeMap::new();
    let mut all_errors = Vec::new();

    for name in &tree.order {
        let node = &tree.nodes[name];
        let mut class = node.class.clone();
        let mut typer = Typer { tree, flat, sources, current_class: name.clone(), errors: Vec::new() };

        let mut scope = Scope::new(SELF_TYPE);
        scope.push();
        for (attr_name, attr_ty) in &flat[name].attributes {
            scope.add_if_can(attr_name, attr_ty);
        }

        for feature in &mut class.features {
            match feature {
                Feature::Attribute(attr) => {
                    if let Some(init) = &mut attr.init {
                        let ty = typer.check_expr(init, &mut scope);
                        if !typer.conforms_self(&ty, &attr.declared_type.node) {
                            typer.error(init.span, &format!(
                                "initializer type {ty} does not conform to declared type {}",
                                attr.declared_type.node
                            ));
                        }
                    }
                }
                Feature::Method(m) => {
                    typer.check_method(m, &mut scope);
                }
            }
        }

        all_errors.extend(typer.errors);
        typed.insert(name.clone(), class);
    }

    if !all_errors.is_empty() {
        return Err(all_errors);
    }
    Ok(typed)
}

impl<'a> Typer<'a> {
    fn error(&mut self, span: Span, msg: &str) {
        self.errors.push(format_semantic_error(
            &self.tree.nodes[&self.current_class].class.file,
            self.sources.line_of_span(span),
            msg,
        ));
    }

    fn conforms_self(&self, a: &str, b: &str) -> bool {
        let a_real = if a == SELF_TYPE { self.current_class.as_str() } else { a };
        if b == SELF_TYPE {
            return a == SELF_TYPE;
        }
        self.tree.conforms(a_real, b)
    }

    fn lub_self(&self, a: &str, b: &str) -> String {
        if a == b {
            return a.to_string();
        }
        let a_real = if a == SELF_TYPE { self.current_class.as_str() } else { a };
        let b_real = if b == SELF_TYPE { self.current_class.as_str() } else { b };
        self.tree.lub(a_real, b_real)
    }

    fn method_sig(&self, class_name: &str, method: &str) -> Option<&MethodSig> {
        self.flat.get(class_name)?.methods.iter().find(|(n, _)| n == method).map(|(_, s)| s)
    }

    fn check_method(&mut self, m: &mut Method, scope: &mut Scope) {
        scope.push();
        for f in &m.formals {
            if scope.add_if_can(&f.name.node, &f.declared_type.node) == AddResult::Redefined {
                self.error(f.name.span, &format!("formal parameter {} already defined", f.name.node));
            }
        }
        let body_ty = self.check_expr(&mut m.body, scope);
        if !self.conforms_self(&body_ty, &m.return_type.node) {
            self.error(
                m.body.span,
                &format!("body type {body_ty} does not conform to declared return type {}", m.return_type.node),
            );
        }
        scope.pop();
    }

    fn check_expr(&mut self, expr: &mut Expr, scope: &mut Scope) -> String {
        let span = expr.span;
        let ty = match &mut expr.kind {
            ExprKind::IntLit(_) => INT.to_string(),
            ExprKind::StringLit(_) => STRING.to_string(),
            ExprKind::BoolLit(_) => BOOL.to_string(),
            ExprKind::ObjectRef { name } => {
                if name.node == SELF {
                    SELF_TYPE.to_string()
                } else {
                    match scope.find(&name.node, 0) {
                        Some(t) => t.to_string(),
                        None => {
                            self.error(span, &format!("undeclared identifier {}", name.node));
                            OBJECT.to_string()
                        }
                    }
                }
            }
            ExprKind::Assign { name, value } => {
                if name.node == SELF {
                    self.error(span, "cannot assign to 'self'");
                }
                let rhs_ty = self.check_expr(value, scope);
                let declared = scope.find(&name.node, 0).map(|s| s.to_string());
                match declared {
                    Some(declared) => {
                        if !self.conforms_self(&rhs_ty, &declared) {
                            self.error(span, &format!(
                                "assignment value type {rhs_ty} does not conform to {declared}"
                            ));
                        }
                    }
                    None => self.error(span, &format!("undeclared identifier {}", name.node)),
                }
                rhs_ty
            }
            ExprKind::BinOp { op, lhs, rhs } => {
                let lt = self.check_expr(lhs, scope);
                let rt = self.check_expr(rhs, scope);
                match op {
                    BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                        if lt != INT || rt != INT {
                            self.error(span, "arithmetic operands must be Int");
                        }
                        INT.to_string()
                    }
                    BinOp::Lt | BinOp::Le => {
                        if lt != INT || rt != INT {
                            self.error(span, "comparison operands must be Int");
                        }
                        BOOL.to_string()
                    }
                    BinOp::Eq => {
                        let primitives = [INT, BOOL, STRING];
                        if (primitives.contains(&lt.as_str()) || primitives.contains(&rt.as_str())) && lt != rt {
                            self.error(span, "comparing primitive type against a different type");
                        }
                        BOOL.to_string()
                    }
                }
            }
            ExprKind::UnaryOp { op, operand } => {
                let t = self.check_expr(operand, scope);
                match op {
                    UnaryOp::Neg => {
                        if t != INT {
                            self.error(span, "~ requires an Int operand");
                        }
                        INT.to_string()
                    }
                    UnaryOp::Not => {
                        if t != BOOL {
                            self.error(span, "not requires a Bool operand");
                        }
                        BOOL.to_string()
                    }
                    UnaryOp::IsVoid => BOOL.to_string(),
                }
            }
            ExprKind::If { cond, then_branch, else_branch } => {
                let ct = self.check_expr(cond, scope);
                if ct != BOOL {
                    self.error(span, "if condition must be Bool");
                }
                let tt = self.check_expr(then_branch, scope);
                let ft = self.check_expr(else_branch, scope);
                self.lub_self(&tt, &ft)
            }
            ExprKind::While { cond, body } => {
                let ct = self.check_expr(cond, scope);
                if ct != BOOL {
                    self.error(span, "while condition must be Bool");
                }
                self.check_expr(body, scope);
                OBJECT.to_string()
            }
            ExprKind::Block { exprs } => {
                let mut last = OBJECT.to_string();
                for e in exprs {
                    last = self.check_expr(e, scope);
                }
                last
            }
            ExprKind::Let { bindings, body } => {
                scope.push();
                for b in bindings {
                    if let Some(init) = &mut b.init {
                        let it = self.check_expr(init, scope);
                        if !self.conforms_self(&it, &b.declared_type.node) {
                            self.error(init.span, &format!(
                                "let-binding initializer type {it} does not conform to {}",
                                b.declared_type.node
                            ));
                        }
                    }
                    if scope.add_if_can(&b.name.node, &b.declared_type.node) == AddResult::Reserved {
                        self.error(b.name.span, "'self' cannot be let-bound");
                    }
                }
                let t = self.check_expr(body, scope);
                scope.pop();
                t
            }
            ExprKind::Case { scrutinee, arms } => {
                self.check_expr(scrutinee, scope);
                let mut seen_types = Vec::new();
                let mut result: Option<String> = None;
                for arm in arms.iter_mut() {
                    if seen_types.contains(&arm.declared_type.node) {
                        self.error(arm.name.span, &format!(
                            "duplicate branch type {} in case",
                            arm.declared_type.node
                        ));
                    }
                    seen_types.push(arm.declared_type.node.clone());
                    scope.push();
                    scope.add_if_can(&arm.name.node, &arm.declared_type.node);
                    let bt = self.check_expr(&mut arm.body, scope);
                    scope.pop();
                    result = Some(match result {
                        Some(r) => self.lub_self(&r, &bt),
                        None => bt,
                    });
                }
                result.unwrap_or_else(|| OBJECT.to_string())
            }
            ExprKind::New { type_name } => {
                if type_name.node != SELF_TYPE && !self.tree.nodes.contains_key(&type_name.node) {
                    self.error(span, &format!("new used with undefined class {}", type_name.node));
                }
                type_name.node.clone()
            }
            ExprKind::DispatchVirtual { receiver, method, args } => {
                let recv_ty = self.check_expr(receiver, scope);
                let arg_tys: Vec<String> = args.iter_mut().map(|a| self.check_expr(a, scope)).collect();
                let lookup_class = if recv_ty == SELF_TYPE { self.current_class.clone() } else { recv_ty.clone() };
                self.check_call(&lookup_class, method, &arg_tys, &recv_ty, span)
            }
            ExprKind::DispatchStatic { receiver, target_type, method, args } => {
                let recv_ty = self.check_expr(receiver, scope);
                let arg_tys: Vec<String> = args.iter_mut().map(|a| self.check_expr(a, scope)).collect();
                if !self.conforms_self(&recv_ty, &target_type.node) {
                    self.error(span, &format!(
                        "static dispatch receiver type {recv_ty} does not conform to {}",
                        target_type.node
                    ));
                }
                self.check_call(&target_type.node, method, &arg_tys, &recv_ty, span)
            }
        };
        expr.static_type = Some(ty.clone());
        // Literals resolve to a pre-interned constant box (no `_gc_alloc`
        // call); `New`, the boxing arithmetic/unary forms, and dispatch
        // (whose callee may itself allocate) are the forms that do.
        expr.allocates = matches!(
            expr.kind,
            ExprKind::New { .. }
                | ExprKind::BinOp { .. }
                | ExprKind::UnaryOp { .. }
                | ExprKind::DispatchVirtual { .. }
                | ExprKind::DispatchStatic { .. }
        );
        ty
    }

    fn check_call(&mut self, lookup_class: &str, method: &crate::span::Spanned<String>, arg_tys: &[String], recv_ty: &str, span: Span) -> String {
        let Some(sig) = self.method_sig(lookup_class, &method.node).cloned() else {
            self.error(span, &format!("dispatch to undefined method {} on {lookup_class}", method.node));
            return OBJECT.to_string();
        };
        if sig.formals.len() != arg_tys.len() {
            self.error(span, &format!("method {} called with wrong number of arguments", method.node));
        } else {
            for (expect, got) in sig.formals.iter().zip(arg_tys.iter()) {
                if !self.conforms_self(got, expect) {
                    self.error(span, &format!(
                        "argument type {got} does not conform to formal type {expect} in call to {}",
                        method.node
                    ));
                }
            }
        }
        if sig.return_type == SELF_TYPE {
            recv_ty.to_string()
        } else {
            sig.return_type
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn sources_for(src: &str) -> SourceMap {
        let mut sources = SourceMap::new();
        sources.add("t.cl", src);
        sources
    }

    fn analyze(src: &str) -> Result<BTreeMap<String, Class>, Vec<String>> {
        let sources = sources_for(src);
        let (tokens, _) = Lexer::new(src, 0).tokenize();
        let program = Parser::new(tokens, src, "t.cl").parse_program().unwrap();
        let tree = build_inheritance_graph(&program, &sources).map_err(|e| e)?;
        let flat = collect_features(&tree, &sources).map_err(|e| e)?;
        type_check(&tree, &flat, &sources)
    }

    #[test]
    fn test_minimal_program_type_checks() {
        let result = analyze("class Main { main(): Int { 42 }; };");
        assert!(result.is_ok(), "{:?}", result.err());
    }

    #[test]
    fn test_inheritance_cycle_detected() {
        let (tokens, _) = Lexer::new(
            "class A inherits B {}; class B inherits A {}; class Main { main(): Int { 0 }; };",
            0,
        )
        .tokenize();
        let program = Parser::new(tokens, "", "t.cl").parse_program().unwrap();
        let sources = sources_for("");
        let err = build_inheritance_graph(&program, &sources).unwrap_err();
        assert!(err.iter().any(|e| e.contains("cycle")));
    }

    #[test]
    fn test_inheriting_from_int_is_an_error() {
        let (tokens, _) = Lexer::new("class A inherits Int {}; class Main { main(): Int { 0 }; };", 0).tokenize();
        let program = Parser::new(tokens, "", "t.cl").parse_program().unwrap();
        let sources = sources_for("");
        let err = build_inheritance_graph(&program, &sources).unwrap_err();
        assert!(err.iter().any(|e| e.contains("cannot inherit")));
    }

    #[test]
    fn test_missing_main_is_an_error() {
        let (tokens, _) = Lexer::new("class A {};", 0).tokenize();
        let program = Parser::new(tokens, "", "t.cl").parse_program().unwrap();
        let sources = sources_for("");
        let err = build_inheritance_graph(&program, &sources).unwrap_err();
        assert!(err.iter().any(|e| e.contains("Main")));
    }

    #[test]
    fn test_case_with_duplicate_branch_type_is_error() {
        let result = analyze(
            "class Main { main(): Int { case (new Object) of x: Int => 1; y: Int => 2; esac }; };",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_let_default_int_body_type() {
        let result = analyze("class Main { main(): Int { let x: Int in x + 1 }; };");
        assert!(result.is_ok(), "{:?}", result.err());
    }

    #[test]
    fn test_io_dispatch_type_checks() {
        let result = analyze(
            "class Main inherits IO { main(): Object { out_string(\"hi\") }; };",
        );
        assert!(result.is_ok(), "{:?}", result.err());
    }

    #[test]
    fn test_self_assignment_is_flagged() {
        let result = analyze("class Main { main(): Int { self <- 5 }; };");
        assert!(result.is_err());
    }

    fn main_body(typed: &BTreeMap<String, Class>) -> &Expr {
        typed["Main"]
            .features
            .iter()
            .find_map(|f| match f {
                ast::Feature::Method(m) if m.name.node == "main" => Some(&m.body),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_literal_does_not_allocate() {
        let typed = analyze("class Main { main(): Int { 42 }; };").unwrap();
        assert!(!main_body(&typed).allocates, "a literal resolves to a pre-interned constant box");
    }

    #[test]
    fn test_arithmetic_allocates_for_its_rebox() {
        let typed = analyze("class Main { main(): Int { 1 + 2 }; };").unwrap();
        assert!(main_body(&typed).allocates, "arithmetic reboxes its result via _gc_alloc");
    }

    #[test]
    fn test_new_allocates() {
        let typed = analyze("class Main { main(): Object { new Object }; };").unwrap();
        assert!(main_body(&typed).allocates);
    }

    #[test]
    fn test_dispatch_allocates_since_the_callee_may() {
        let typed = analyze("class Main inherits IO { main(): Object { out_string(\"hi\") }; };").unwrap();
        assert!(main_body(&typed).allocates);
    }
}
