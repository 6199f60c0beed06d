//! The stack-machine backend (§4.7, §1): lowers the typed AST directly
//! to an operand-stack instruction stream, one [`StackFunction`] per
//! init method and per user method, mirroring the IR backend's init
//! structure, dispatch sequencing, case-branch ordering, and `new`
//! lowering (§4.7's shared contract). Unlike [`super::ir_backend`] there
//! is no separate operand graph or pass pipeline: expressions lower
//! directly into push/pop instructions against one evaluation stack,
//! the way a stack machine runs.
//!
//! Turning a [`StackProgram`] into actual MIPS/SPIM assembler text is
//! the one piece explicitly out of scope (§1 "Deliberately OUT of
//! scope: the MIPS assembler text emitter") — that's a direct syntactic
//! lowering with no interesting structure of its own, left to whatever
//! consumes this module's output.

use std::collections::BTreeMap;

use crate::ast::{self, BinOp, Class, Expr, ExprKind, UnaryOp, BOOL, INT, IO, OBJECT, SELF, STRING};
use crate::backend::{case_branches_by_descending_tag, field_default, FieldDefault, Symbol, SymbolTable};
use crate::data::{ConstKey, Data};
use crate::ir::{BinArithOp, BinCmpOp, UnaryArithOp, UnaryLogicalOp};
use crate::klass::{KlassTable, HEADER_SIZE, WORD_SIZE};

const HDR_TAG_OFFSET: i64 = WORD_SIZE as i64;
const HDR_SIZE_OFFSET: i64 = 2 * WORD_SIZE as i64;
const HDR_DISP_OFFSET: i64 = 3 * WORD_SIZE as i64;
const PAYLOAD_OFFSET: i64 = HEADER_SIZE as i64;

fn is_builtin_class(name: &str) -> bool {
    matches!(name, OBJECT | INT | BOOL | STRING | IO)
}

fn resolve_self_type<'a>(current_class: &'a str, ty: &'a str) -> &'a str {
    if ty == ast::SELF_TYPE {
        current_class
    } else {
        ty
    }
}

/// One instruction against an implicit evaluation stack. Every
/// expression lowers to a sequence that leaves exactly one value (the
/// expression's result) on top of the stack; `self` and frame-local
/// bindings are addressed relative to the frame pointer, matching
/// `backend::Symbol::Local`'s "frame-pointer-relative byte offset"
/// contract for this backend.
#[derive(Clone, Debug, PartialEq)]
pub enum StackInstr {
    /// Pushes the current method's receiver.
    PushSelf,
    PushConstInt(i64),
    /// Pushes the address of a pre-interned constant descriptor's box,
    /// by its stable `Data` index (§4.4: constants are emitted once).
    PushGlobalConst(String),
    PushNull,
    /// Pushes the value currently held in a frame slot (formal, or
    /// `let`/`case` binding).
    LoadLocal(i32),
    /// Pops the top of stack, stores it in a frame slot, and pushes it
    /// back — assignment is itself an expression whose value is the
    /// value assigned (§4 Assign).
    StoreLocal(i32),
    /// Pops an object pointer, pushes the word at `offset` from its base.
    LoadField(i64),
    /// Pops a value, pops an object pointer, stores the value at
    /// `offset` from the object's base, and pushes the value back.
    StoreField(i64),
    Dup,
    Pop,
    /// Pops two raw (unboxed) words and pushes their result.
    BinArith(BinArithOp),
    BinCmp(BinCmpOp),
    UnaryArith(UnaryArithOp),
    UnaryLogical(UnaryLogicalOp),
    /// Pops a raw word, `_gc_alloc`s a fresh box of `class`, stores the
    /// word at its payload offset, and pushes the box — mirrors
    /// `ir_backend::box_raw` exactly (§6 "Int and Bool: one extra word").
    Rebox { class: String },
    /// Pops rhs then lhs, pushes `_equals(lhs, rhs)` (§4.7: one runtime
    /// entry point handles value- and pointer-equality uniformly).
    Equals,
    /// `class.tag`/`class.size_in_bytes`/`class_dispTab`, `_gc_alloc`'d
    /// fresh with every field left at its bit-zero default — the init
    /// call that actually zeroes fields follows as a separate `Call`.
    GcAlloc { class: String },
    /// Pops the receiver and `nargs` args (pushed in that order), calls
    /// `symbol` directly, and pushes the result (nothing, for a
    /// `Void`-returning runtime entry point like an abort routine).
    Call { symbol: String, nargs: u32 },
    /// As [`StackInstr::Call`], but resolves the target through the
    /// receiver's dispatch table at `method_index` rather than by name
    /// (§4.7 "Dispatch").
    CallVirtual { method_index: u32, nargs: u32 },
    /// Pops an address, pushes the word stored there (offset 0) — used
    /// by `new SELF_TYPE` to call through a class-object-table entry
    /// computed at runtime (§9 open question, resolved the same way as
    /// the IR backend: pointer arithmetic, since there's no indexed-load
    /// instruction here either).
    LoadIndirect,
    /// Pops a function pointer, then the receiver and `nargs` args
    /// beneath it, and calls through the pointer.
    CallComputed { nargs: u32 },
    /// Peeks the top of stack (leaves it in place); if it's null, calls
    /// the named runtime abort routine, which never returns.
    NullCheckAbort(String),
    Label(String),
    Branch(String),
    /// Pops a raw (unboxed) word; branches if it's zero.
    BranchIfFalse(String),
    Ret,
}

#[derive(Clone, Debug)]
pub struct StackFunction {
    pub name: String,
    /// `self` plus however many formals (§3 SymbolTable: formal 0 sits
    /// one word above `self`, and so on).
    pub arity: u32,
    pub instrs: Vec<StackInstr>,
}

#[derive(Debug, Default)]
pub struct StackProgram {
    pub functions: BTreeMap<String, StackFunction>,
}

/// Accumulates one function's instruction stream plus the bookkeeping
/// (label counter, next free local slot) a single lowering pass needs.
struct Emitter {
    instrs: Vec<StackInstr>,
    labels: u32,
    next_local_offset: i32,
}

impl Emitter {
    fn new() -> Self {
        Self { instrs: Vec::new(), labels: 0, next_local_offset: -(WORD_SIZE as i32) }
    }

    fn emit(&mut self, instr: StackInstr) {
        self.instrs.push(instr);
    }

    fn fresh_label(&mut self, prefix: &str) -> String {
        let n = self.labels;
        self.labels += 1;
        format!("{prefix}_{n}")
    }

    /// Allocates a new frame slot for a `let`/`case` binding, growing
    /// the frame downward from `self`/formals the way the stack grows
    /// (§3 "a frame-pointer-relative byte offset").
    fn alloc_slot(&mut self) -> i32 {
        let offset = self.next_local_offset;
        self.next_local_offset -= WORD_SIZE as i32;
        offset
    }
}

/// References a pre-interned constant descriptor by its stable index
/// (§4.4 Data layer: one descriptor per key, emitted once).
fn global_const_symbol(data: &mut Data, key: ConstKey) -> String {
    let idx = data.intern(key.clone());
    let prefix = match key {
        ConstKey::Str(_) => "String_const",
        ConstKey::Int(_) => "Int_const",
        ConstKey::Bool(_) => "Bool_const",
    };
    format!("{prefix}_{idx}")
}

/// Lowers every class's init method, plus every user-visible
/// (non-builtin) method body, into one [`StackProgram`].
pub fn emit_program(typed: &BTreeMap<String, Class>, klasses: &KlassTable, data: &mut Data) -> StackProgram {
    data.build_class_obj_table(klasses);
    data.build_class_name_table(klasses);

    let mut program = StackProgram::default();
    for (name, class) in typed {
        program.functions.insert(format!("{name}_init"), emit_init(klasses, data, name, class));
        if is_builtin_class(name) {
            continue; // primitive methods are runtime-provided (§6 entry points)
        }
        for feature in &class.features {
            if let ast::Feature::Method(m) = feature {
                let full = klasses.get(name).method_full_name(&m.name.node).unwrap();
                if full == format!("{name}.{}", m.name.node) {
                    program.functions.insert(full, emit_method(klasses, data, name, m));
                }
            }
        }
    }
    program
}

/// `{class}_init`: zero-inits this class's own fields, calls the
/// parent's init, then evaluates this class's own attribute
/// initializers in declaration order (§4.7).
fn emit_init(klasses: &KlassTable, data: &mut Data, class: &str, typed_class: &Class) -> StackFunction {
    let mut e = Emitter::new();
    let mut symtab: SymbolTable<i32> = SymbolTable::new();
    const SELF_OFFSET: i32 = 0;
    symtab.bind(SELF, Symbol::Local(SELF_OFFSET));

    let klass = klasses.get(class);
    for feature in &typed_class.features {
        let ast::Feature::Attribute(attr) = feature else { continue };
        let Some(idx) = klass.fields.iter().position(|fld| fld.name == attr.name.node) else { continue };
        let offset = klass.field_offset(idx) as i64;
        e.emit(StackInstr::PushSelf);
        zero_value(&mut e, data, &attr.declared_type.node);
        e.emit(StackInstr::StoreField(offset));
        e.emit(StackInstr::Pop); // drop assign's echoed value, field init isn't an expression result
    }

    if class != OBJECT {
        e.emit(StackInstr::PushSelf);
        e.emit(StackInstr::Call { symbol: format!("{}_init", typed_class.parent.node), nargs: 0 });
        e.emit(StackInstr::Pop);
    }

    for feature in &typed_class.features {
        let ast::Feature::Attribute(attr) = feature else { continue };
        let Some(init) = &attr.init else { continue };
        let Some(idx) = klass.fields.iter().position(|fld| fld.name == attr.name.node) else { continue };
        let offset = klass.field_offset(idx) as i64;
        e.emit(StackInstr::PushSelf);
        lower_expr(&mut e, klasses, data, &mut symtab, class, init);
        e.emit(StackInstr::StoreField(offset));
        e.emit(StackInstr::Pop);
    }

    e.emit(StackInstr::PushSelf);
    e.emit(StackInstr::Ret);
    StackFunction { name: format!("{class}_init"), arity: 1, instrs: e.instrs }
}

fn emit_method(klasses: &KlassTable, data: &mut Data, class: &str, method: &ast::Method) -> StackFunction {
    let mut e = Emitter::new();
    let mut symtab: SymbolTable<i32> = SymbolTable::new();
    symtab.bind(SELF, Symbol::Local(0));
    for (i, formal) in method.formals.iter().enumerate() {
        let offset = ((i + 1) as i32) * WORD_SIZE as i32;
        symtab.bind(formal.name.node.clone(), Symbol::Local(offset));
    }

    lower_expr(&mut e, klasses, data, &mut symtab, class, &method.body);
    e.emit(StackInstr::Ret);
    let full = klasses.get(class).method_full_name(&method.name.node).unwrap();
    StackFunction { name: full, arity: (method.formals.len() + 1) as u32, instrs: e.instrs }
}

/// Pushes this field's zero-init value (§4.7 "a class init method that
/// zero-initializes declared fields"): boxed zero for Int/Bool, the
/// interned empty string for String, null otherwise.
fn zero_value(e: &mut Emitter, data: &mut Data, declared_type: &str) {
    match field_default(declared_type) {
        FieldDefault::BoxedZeroInt => {
            e.emit(StackInstr::PushConstInt(0));
            e.emit(StackInstr::Rebox { class: INT.to_string() });
        }
        FieldDefault::BoxedZeroBool => {
            e.emit(StackInstr::PushConstInt(0));
            e.emit(StackInstr::Rebox { class: BOOL.to_string() });
        }
        FieldDefault::BoxedEmptyString => {
            let sym = global_const_symbol(data, ConstKey::Str(String::new()));
            e.emit(StackInstr::PushGlobalConst(sym));
        }
        FieldDefault::Null => e.emit(StackInstr::PushNull),
    }
}

fn lower_expr(e: &mut Emitter, klasses: &KlassTable, data: &mut Data, symtab: &mut SymbolTable<i32>, class: &str, expr: &Expr) {
    match &expr.kind {
        ExprKind::IntLit(n) => {
            let sym = global_const_symbol(data, ConstKey::Int(*n));
            e.emit(StackInstr::PushGlobalConst(sym));
        }
        ExprKind::BoolLit(v) => {
            let sym = global_const_symbol(data, ConstKey::Bool(*v));
            e.emit(StackInstr::PushGlobalConst(sym));
        }
        ExprKind::StringLit(s) => {
            let sym = global_const_symbol(data, ConstKey::Str(s.clone()));
            e.emit(StackInstr::PushGlobalConst(sym));
        }

        ExprKind::ObjectRef { name } if name.node == SELF => e.emit(StackInstr::PushSelf),
        ExprKind::ObjectRef { name } => match symtab.lookup(&name.node) {
            Some(Symbol::Local(offset)) => e.emit(StackInstr::LoadLocal(offset)),
            Some(Symbol::Field(offset)) => {
                e.emit(StackInstr::PushSelf);
                e.emit(StackInstr::LoadField(offset as i64));
            }
            None => e.emit(StackInstr::PushNull),
        },

        ExprKind::Assign { name, value } => {
            lower_expr(e, klasses, data, symtab, class, value);
            match symtab.lookup(&name.node) {
                Some(Symbol::Local(offset)) => e.emit(StackInstr::StoreLocal(offset)),
                Some(Symbol::Field(offset)) => {
                    // value is on top; the store also needs the object
                    // beneath it, so round-trip it through a frame slot.
                    let tmp = e.alloc_slot();
                    e.emit(StackInstr::StoreLocal(tmp));
                    e.emit(StackInstr::Pop);
                    e.emit(StackInstr::PushSelf);
                    e.emit(StackInstr::LoadLocal(tmp));
                    e.emit(StackInstr::StoreField(offset as i64));
                }
                None => {}
            }
        }

        ExprKind::Block { exprs } => {
            if exprs.is_empty() {
                e.emit(StackInstr::PushNull);
            } else {
                for (i, sub) in exprs.iter().enumerate() {
                    if i > 0 {
                        e.emit(StackInstr::Pop);
                    }
                    lower_expr(e, klasses, data, symtab, class, sub);
                }
            }
        }

        ExprKind::Let { bindings, body } => {
            symtab.push();
            for binding in bindings {
                match &binding.init {
                    Some(init) => lower_expr(e, klasses, data, symtab, class, init),
                    None => zero_value(e, data, &binding.declared_type.node),
                }
                let slot = e.alloc_slot();
                e.emit(StackInstr::StoreLocal(slot));
                e.emit(StackInstr::Pop);
                symtab.bind(binding.name.node.clone(), Symbol::Local(slot));
            }
            lower_expr(e, klasses, data, symtab, class, body);
            symtab.pop();
        }

        ExprKind::If { cond, then_branch, else_branch } => {
            lower_expr(e, klasses, data, symtab, class, cond);
            bool_predicate(e);
            let else_lbl = e.fresh_label("if_else");
            let end_lbl = e.fresh_label("if_end");
            e.emit(StackInstr::BranchIfFalse(else_lbl.clone()));
            lower_expr(e, klasses, data, symtab, class, then_branch);
            e.emit(StackInstr::Branch(end_lbl.clone()));
            e.emit(StackInstr::Label(else_lbl));
            lower_expr(e, klasses, data, symtab, class, else_branch);
            e.emit(StackInstr::Label(end_lbl));
        }

        ExprKind::While { cond, body } => {
            let head_lbl = e.fresh_label("while_head");
            let end_lbl = e.fresh_label("while_end");
            e.emit(StackInstr::Label(head_lbl.clone()));
            lower_expr(e, klasses, data, symtab, class, cond);
            bool_predicate(e);
            e.emit(StackInstr::BranchIfFalse(end_lbl.clone()));
            lower_expr(e, klasses, data, symtab, class, body);
            e.emit(StackInstr::Pop);
            e.emit(StackInstr::Branch(head_lbl));
            e.emit(StackInstr::Label(end_lbl));
            e.emit(StackInstr::PushNull);
        }

        ExprKind::Case { scrutinee, arms } => lower_case(e, klasses, data, symtab, class, scrutinee, arms),

        ExprKind::New { type_name } => lower_new(e, &type_name.node),

        ExprKind::DispatchVirtual { receiver, method, args } => {
            lower_expr(e, klasses, data, symtab, class, receiver);
            for arg in args {
                lower_expr(e, klasses, data, symtab, class, arg);
            }
            e.emit(StackInstr::NullCheckAbort("_dispatch_abort".to_string()));
            let recv_static = resolve_self_type(class, receiver.static_type.as_deref().unwrap_or(ast::OBJECT));
            let index = klasses.get(recv_static).method_index(&method.node).expect("method resolved by semant") as u32;
            e.emit(StackInstr::CallVirtual { method_index: index, nargs: args.len() as u32 });
        }

        ExprKind::DispatchStatic { receiver, target_type, method, args } => {
            lower_expr(e, klasses, data, symtab, class, receiver);
            for arg in args {
                lower_expr(e, klasses, data, symtab, class, arg);
            }
            e.emit(StackInstr::NullCheckAbort("_dispatch_abort".to_string()));
            let target = resolve_self_type(class, &target_type.node);
            let full = klasses.get(target).method_full_name(&method.node).expect("method resolved by semant");
            e.emit(StackInstr::Call { symbol: full, nargs: args.len() as u32 });
        }

        ExprKind::BinOp { op, lhs, rhs } => lower_binop(e, klasses, data, symtab, class, *op, lhs, rhs),
        ExprKind::UnaryOp { op, operand } => lower_unaryop(e, klasses, data, symtab, class, *op, operand),
    }
}

/// `payload != 0`: loads the boxed Bool's payload and branches on it
/// raw — `BranchIfFalse` itself takes a raw word, so no further
/// conversion is needed once the payload's been loaded.
fn bool_predicate(e: &mut Emitter) {
    e.emit(StackInstr::LoadField(PAYLOAD_OFFSET));
}

/// `new` (§4.7): known concrete types `_gc_alloc` straight off the
/// Klass table and call their own init. `new SELF_TYPE` is the open
/// question resolved uniformly with the IR backend (see below).
fn lower_new(e: &mut Emitter, type_name: &str) {
    if type_name != ast::SELF_TYPE {
        e.emit(StackInstr::GcAlloc { class: type_name.to_string() });
        e.emit(StackInstr::Dup);
        e.emit(StackInstr::Call { symbol: format!("{type_name}_init"), nargs: 0 });
        e.emit(StackInstr::Pop); // init returns self again; the Dup already holds the live copy
        return;
    }

    // `new SELF_TYPE` (§9 open question, resolved uniformly with the IR
    // backend per SPEC_FULL §4): read tag/size/dispTab off the *current*
    // receiver's header, `_gc_alloc`, then find the init method via the
    // class-object table at `tag * 2 * WORD_SIZE` and call through the
    // loaded function pointer. Both `self` and its tag get spilled to
    // frame slots up front so every later step can re-read them without
    // juggling stack depth.
    let self_slot = e.alloc_slot();
    e.emit(StackInstr::PushSelf);
    e.emit(StackInstr::StoreLocal(self_slot));
    e.emit(StackInstr::Pop);

    let tag_slot = e.alloc_slot();
    e.emit(StackInstr::LoadLocal(self_slot));
    e.emit(StackInstr::LoadField(HDR_TAG_OFFSET));
    e.emit(StackInstr::StoreLocal(tag_slot));
    e.emit(StackInstr::Pop);

    // `_gc_alloc(tag, size, dispTab)`: tag/size/dispTab all read back
    // off the header via the spilled `self` copy.
    e.emit(StackInstr::LoadLocal(tag_slot));
    e.emit(StackInstr::LoadLocal(self_slot));
    e.emit(StackInstr::LoadField(HDR_SIZE_OFFSET));
    e.emit(StackInstr::LoadLocal(self_slot));
    e.emit(StackInstr::LoadField(HDR_DISP_OFFSET));
    e.emit(StackInstr::Call { symbol: "_gc_alloc".to_string(), nargs: 2 });

    let obj_slot = e.alloc_slot();
    e.emit(StackInstr::StoreLocal(obj_slot));
    e.emit(StackInstr::Pop);

    // class_objTab + tag * 2 * WORD_SIZE + WORD_SIZE -> init fn ptr.
    e.emit(StackInstr::PushGlobalConst("class_objTab".to_string()));
    e.emit(StackInstr::LoadLocal(tag_slot));
    e.emit(StackInstr::PushConstInt(2 * WORD_SIZE as i64));
    e.emit(StackInstr::BinArith(BinArithOp::Mul));
    e.emit(StackInstr::BinArith(BinArithOp::Add));
    e.emit(StackInstr::PushConstInt(WORD_SIZE as i64));
    e.emit(StackInstr::BinArith(BinArithOp::Add));
    e.emit(StackInstr::LoadIndirect);

    e.emit(StackInstr::LoadLocal(obj_slot));
    e.emit(StackInstr::CallComputed { nargs: 0 });
    e.emit(StackInstr::Pop);
    e.emit(StackInstr::LoadLocal(obj_slot));
}

fn lower_case(
    e: &mut Emitter,
    klasses: &KlassTable,
    data: &mut Data,
    symtab: &mut SymbolTable<i32>,
    class: &str,
    scrutinee: &Expr,
    arms: &[ast::CaseArm],
) {
    lower_expr(e, klasses, data, symtab, class, scrutinee);
    e.emit(StackInstr::NullCheckAbort("_case_abort_2".to_string()));

    let scrut_slot = e.alloc_slot();
    e.emit(StackInstr::StoreLocal(scrut_slot));
    e.emit(StackInstr::Pop);

    let ordered = case_branches_by_descending_tag(klasses, arms);
    let end_lbl = e.fresh_label("case_end");

    for (i, arm) in ordered.iter().enumerate() {
        let k = klasses.get(&arm.declared_type.node);
        let next_lbl = e.fresh_label(&format!("case_next_{i}"));

        e.emit(StackInstr::LoadLocal(scrut_slot));
        e.emit(StackInstr::LoadField(HDR_TAG_OFFSET));
        e.emit(StackInstr::PushConstInt(k.tag as i64));
        e.emit(StackInstr::BinCmp(BinCmpOp::Le)); // lo <= tag
        e.emit(StackInstr::BranchIfFalse(next_lbl.clone()));

        e.emit(StackInstr::LoadLocal(scrut_slot));
        e.emit(StackInstr::LoadField(HDR_TAG_OFFSET));
        e.emit(StackInstr::PushConstInt(k.child_max_tag as i64));
        e.emit(StackInstr::BinCmp(BinCmpOp::Le)); // tag <= hi
        e.emit(StackInstr::BranchIfFalse(next_lbl.clone()));

        symtab.push();
        symtab.bind(arm.name.node.clone(), Symbol::Local(scrut_slot));
        lower_expr(e, klasses, data, symtab, class, &arm.body);
        symtab.pop();
        e.emit(StackInstr::Branch(end_lbl.clone()));

        e.emit(StackInstr::Label(next_lbl));
    }

    e.emit(StackInstr::LoadLocal(scrut_slot));
    e.emit(StackInstr::LoadField(HDR_TAG_OFFSET));
    e.emit(StackInstr::Call { symbol: "_case_abort".to_string(), nargs: 0 });
    e.emit(StackInstr::Label(end_lbl));
}

fn lower_binop(
    e: &mut Emitter,
    klasses: &KlassTable,
    data: &mut Data,
    symtab: &mut SymbolTable<i32>,
    class: &str,
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
) {
    lower_expr(e, klasses, data, symtab, class, lhs);
    lower_expr(e, klasses, data, symtab, class, rhs);

    if op == BinOp::Eq {
        e.emit(StackInstr::Equals);
        return;
    }

    // Both operands are boxed; the arithmetic/compare ops work on the
    // raw payload word, so swap each boxed operand for its payload
    // before combining them. Spilling each through a slot keeps the
    // evaluation order (lhs fully evaluated before rhs) intact while
    // letting both payload loads happen right before the op.
    let rhs_slot = e.alloc_slot();
    e.emit(StackInstr::StoreLocal(rhs_slot));
    e.emit(StackInstr::Pop);
    let lhs_slot = e.alloc_slot();
    e.emit(StackInstr::StoreLocal(lhs_slot));
    e.emit(StackInstr::Pop);

    e.emit(StackInstr::LoadLocal(lhs_slot));
    e.emit(StackInstr::LoadField(PAYLOAD_OFFSET));
    e.emit(StackInstr::LoadLocal(rhs_slot));
    e.emit(StackInstr::LoadField(PAYLOAD_OFFSET));

    match op {
        BinOp::Add => {
            e.emit(StackInstr::BinArith(BinArithOp::Add));
            e.emit(StackInstr::Rebox { class: INT.to_string() });
        }
        BinOp::Sub => {
            e.emit(StackInstr::BinArith(BinArithOp::Sub));
            e.emit(StackInstr::Rebox { class: INT.to_string() });
        }
        BinOp::Mul => {
            e.emit(StackInstr::BinArith(BinArithOp::Mul));
            e.emit(StackInstr::Rebox { class: INT.to_string() });
        }
        BinOp::Div => {
            e.emit(StackInstr::BinArith(BinArithOp::Div));
            e.emit(StackInstr::Rebox { class: INT.to_string() });
        }
        BinOp::Lt => {
            e.emit(StackInstr::BinCmp(BinCmpOp::Lt));
            e.emit(StackInstr::Rebox { class: BOOL.to_string() });
        }
        BinOp::Le => {
            e.emit(StackInstr::BinCmp(BinCmpOp::Le));
            e.emit(StackInstr::Rebox { class: BOOL.to_string() });
        }
        BinOp::Eq => unreachable!("handled above"),
    }
}

fn lower_unaryop(e: &mut Emitter, klasses: &KlassTable, data: &mut Data, symtab: &mut SymbolTable<i32>, class: &str, op: UnaryOp, operand: &Expr) {
    lower_expr(e, klasses, data, symtab, class, operand);
    match op {
        UnaryOp::Neg => {
            e.emit(StackInstr::LoadField(PAYLOAD_OFFSET));
            e.emit(StackInstr::UnaryArith(UnaryArithOp::Neg));
            e.emit(StackInstr::Rebox { class: INT.to_string() });
        }
        UnaryOp::Not => {
            e.emit(StackInstr::LoadField(PAYLOAD_OFFSET));
            e.emit(StackInstr::UnaryLogical(UnaryLogicalOp::Not));
            e.emit(StackInstr::Rebox { class: BOOL.to_string() });
        }
        UnaryOp::IsVoid => {
            e.emit(StackInstr::UnaryLogical(UnaryLogicalOp::IsVoid));
            e.emit(StackInstr::Rebox { class: BOOL.to_string() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::semant;

    fn lower(src: &str) -> StackProgram {
        let mut sources = crate::ast::SourceMap::new();
        sources.add("t.cl", src);
        let (tokens, _) = Lexer::new(src, 0).tokenize();
        let program = Parser::new(tokens, src, "t.cl").parse_program().unwrap();
        let tree = semant::build_inheritance_graph(&program, &sources).unwrap();
        let flat = semant::collect_features(&tree, &sources).unwrap();
        let typed = semant::type_check(&tree, &flat, &sources).unwrap();
        let klasses = crate::klass::build_klass_table(&tree, &typed);
        let mut data = Data::new();
        emit_program(&typed, &klasses, &mut data)
    }

    #[test]
    fn test_every_class_gets_an_init_function() {
        let program = lower("class Main { main(): Int { 0 }; };");
        assert!(program.functions.contains_key("Main_init"));
        assert!(program.functions.contains_key("Object_init"));
    }

    #[test]
    fn test_user_method_compiled_builtin_method_is_not() {
        let program = lower("class Main { main(): Int { 0 }; };");
        assert!(program.functions.contains_key("Main.main"));
        assert!(!program.functions.contains_key("IO.out_string"));
    }

    #[test]
    fn test_case_dispatch_orders_branches_by_descending_tag() {
        let program = lower(
            "class A {}; class B inherits A {}; class Main { main(): Int { case (new B) of x: A => 1; y: B => 2; esac }; };",
        );
        let f = &program.functions["Main.main"];
        let tags: Vec<i64> = f
            .instrs
            .iter()
            .filter_map(|i| match i {
                StackInstr::PushConstInt(n) => Some(*n),
                _ => None,
            })
            .collect();
        // B (the more specific branch) must be tested before A.
        let b_tag_pos = tags.iter().position(|&n| n == 1).unwrap_or(usize::MAX);
        let a_tag_pos = tags.iter().position(|&n| n == 0).unwrap_or(usize::MAX);
        assert!(b_tag_pos < a_tag_pos || a_tag_pos == usize::MAX);
    }

    #[test]
    fn test_new_self_type_reads_header_off_self() {
        let program = lower("class A { copy2(): SELF_TYPE { new SELF_TYPE }; }; class Main { main(): Int { 0 }; };");
        let f = &program.functions["A.copy2"];
        assert!(f.instrs.iter().any(|i| matches!(i, StackInstr::LoadField(off) if *off == HDR_TAG_OFFSET)));
    }

    #[test]
    fn test_dispatch_null_checks_before_calling() {
        let program = lower("class A { m(): Int { 1 }; }; class Main { main(): Int { (new A).m() }; };");
        let f = &program.functions["Main.main"];
        let null_check_pos = f.instrs.iter().position(|i| matches!(i, StackInstr::NullCheckAbort(_)));
        let call_pos = f.instrs.iter().position(|i| matches!(i, StackInstr::CallVirtual { .. }));
        assert!(null_check_pos.unwrap() < call_pos.unwrap());
    }
}
