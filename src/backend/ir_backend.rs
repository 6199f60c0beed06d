//! The IR backend (§4.7): lowers the typed AST directly into
//! [`crate::ir::Module`] through [`crate::ir::builder::Builder`], then
//! hands the module to [`crate::ir::ssa::construct_module`] and the pass
//! pipeline. Locals (formals, `let`/`case` bindings) are emitted as a
//! single operand id reused across however many `Move`s the control flow
//! produces — exactly the pre-SSA shape `ssa::construct` expects to turn
//! into real SSA with φs at the joins.
//!
//! Every Int/Bool value is boxed at rest (§6 object layout); arithmetic
//! loads the payload word, computes on the raw value, and reboxes the
//! result via `_gc_alloc`. The Unboxing pass (§4.6) is what later removes
//! the redundant box/unbox round trips this lowering introduces freely.

use std::collections::BTreeMap;

use crate::ast::{self, BinOp, Class, Expr, ExprKind, UnaryOp, BOOL, INT, IO, OBJECT, SELF, STRING};
use crate::backend::{case_branches_by_descending_tag, field_default, FieldDefault, Symbol, SymbolTable};
use crate::data::{ConstKey, Data};
use crate::klass::{KlassTable, HEADER_SIZE, WORD_SIZE};
use crate::ir::builder::Builder;
use crate::ir::{Module, OperandId, OperandType};

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

fn dispatch_table_symbol(class: &str) -> String {
    format!("{class}_dispTab")
}

/// Lowers every class's init method, plus every user-visible (non-builtin)
/// method body, into one [`Module`].
pub fn emit_program(typed: &BTreeMap<String, Class>, klasses: &KlassTable, data: &mut Data) -> Module {
    data.build_class_obj_table(klasses);
    data.build_class_name_table(klasses);

    let mut module = Module::new();
    for (name, class) in typed {
        declare_init(&mut module, name);
        for feature in &class.features {
            if let ast::Feature::Method(m) = feature {
                declare_method(&mut module, klasses, name, &m.name.node, m.formals.len());
            }
        }
    }

    for (name, class) in typed {
        emit_init(&mut module, klasses, data, name, class, typed);
        if is_builtin_class(name) {
            continue; // primitive methods are runtime-provided (§6 entry points)
        }
        for feature in &class.features {
            if let ast::Feature::Method(m) = feature {
                emit_method(&mut module, klasses, data, name, m);
            }
        }
    }

    module
}

fn declare_init(module: &mut Module, class: &str) {
    let mut f = crate::ir::Function::new(format!("{class}_init"), OperandType::Pointer);
    f.param_types = vec![OperandType::Pointer];
    module.declare_function(f);
}

fn declare_method(module: &mut Module, klasses: &KlassTable, class: &str, method: &str, arity: usize) {
    let Some(full) = klasses.get(class).method_full_name(method) else { return };
    if module.functions.contains_key(&full) {
        return; // already declared by the class that actually defines it
    }
    let mut f = crate::ir::Function::new(full, OperandType::Pointer);
    f.param_types = vec![OperandType::Pointer; arity + 1];
    module.declare_function(f);
}

/// `{class}_init`: zero-inits this class's own fields, calls the parent's
/// init, then evaluates this class's own attribute initializers in
/// declaration order (§4.7).
fn emit_init(module: &mut Module, klasses: &KlassTable, data: &mut Data, class: &str, typed_class: &Class, typed: &BTreeMap<String, Class>) {
    let symbol = format!("{class}_init");
    let mut b = Builder::new();
    b.set_current_function(symbol);
    let entry = b.new_block(module, "entry");
    b.set_current_block(entry);

    let self_op = {
        let f = module.functions.get_mut(&format!("{class}_init")).unwrap();
        let id = f.new_operand(crate::ir::OperandKind::Value, OperandType::Pointer);
        f.params.push(id);
        id
    };

    let klass = klasses.get(class);
    for feature in &typed_class.features {
        let ast::Feature::Attribute(attr) = feature else { continue };
        let Some(idx) = klass.fields.iter().position(|fld| fld.name == attr.name.node) else { continue };
        let offset = klass.field_offset(idx) as i64;
        let zero = zero_value(module, &mut b, klasses, data, &attr.declared_type.node, self_op);
        b.st(module, self_op, offset, zero);
    }

    if class != OBJECT {
        let parent_init = b.func_operand(module, format!("{}_init", typed_class.parent.node));
        b.call(module, parent_init, vec![self_op], OperandType::Pointer);
    }

    let mut symtab: SymbolTable<OperandId> = SymbolTable::new();
    symtab.bind(SELF, Symbol::Local(self_op));
    for feature in &typed_class.features {
        let ast::Feature::Attribute(attr) = feature else { continue };
        let Some(init) = &attr.init else { continue };
        let Some(idx) = klass.fields.iter().position(|fld| fld.name == attr.name.node) else { continue };
        let offset = klass.field_offset(idx) as i64;
        let v = lower_expr(module, &mut b, klasses, data, &mut symtab, class, self_op, init);
        b.st(module, self_op, offset, v);
    }

    b.ret(module, Some(self_op));
}

fn emit_method(module: &mut Module, klasses: &KlassTable, data: &mut Data, class: &str, method: &ast::Method) {
    let full = klasses.get(class).method_full_name(&method.name.node).unwrap();
    let entry;
    let self_op;
    let formal_ops: Vec<OperandId>;
    {
        let f = module.functions.get_mut(&full).unwrap();
        entry = f.new_block("entry");
        f.entry = entry;
        self_op = f.new_operand(crate::ir::OperandKind::Value, OperandType::Pointer);
        f.params.push(self_op);
        formal_ops = method
            .formals
            .iter()
            .map(|_| f.new_operand(crate::ir::OperandKind::Value, OperandType::Pointer))
            .collect();
        f.params.extend(&formal_ops);
    }

    let mut b = Builder::new();
    b.set_current_function(full);
    b.set_current_block(entry);

    let mut symtab: SymbolTable<OperandId> = SymbolTable::new();
    symtab.bind(SELF, Symbol::Local(self_op));
    for (formal, op) in method.formals.iter().zip(formal_ops.iter()) {
        symtab.bind(formal.name.node.clone(), Symbol::Local(*op));
    }

    let result = lower_expr(module, &mut b, klasses, data, &mut symtab, class, self_op, &method.body);
    b.ret(module, Some(result));
}

fn zero_value(module: &mut Module, b: &mut Builder, klasses: &KlassTable, data: &mut Data, declared_type: &str, self_op: OperandId) -> OperandId {
    match field_default(declared_type) {
        FieldDefault::BoxedZeroInt => {
            let raw = b.const_int(module, 0);
            box_raw(module, b, klasses, data, INT, raw, &[self_op])
        }
        FieldDefault::BoxedZeroBool => {
            let raw = b.const_int(module, 0);
            box_raw(module, b, klasses, data, BOOL, raw, &[self_op])
        }
        FieldDefault::BoxedEmptyString => global_const_box(module, b, data, ConstKey::Str(String::new())),
        FieldDefault::Null => b.const_null(module, OperandType::Pointer),
    }
}

/// `gc_alloc(class.tag, class.size, class.dispTab)` followed by a store
/// of `raw` at the payload offset (§6 "Int and Bool: one extra word").
/// `live` is every other operand that must stay GC-visible across the
/// `_gc_alloc` call — recorded as a safepoint on the caller's function
/// (§3 `Expr::allocates`).
fn box_raw(module: &mut Module, b: &mut Builder, klasses: &KlassTable, _data: &Data, class: &str, raw: OperandId, live: &[OperandId]) -> OperandId {
    let k = klasses.get(class);
    let tag = b.const_int(module, k.tag as i64);
    let size = b.const_int(module, k.size_in_bytes() as i64);
    let disp = b.global_const(module, dispatch_table_symbol(class), OperandType::Pointer);
    let alloc = b.func_operand(module, "_gc_alloc");
    let ptr = b.call(module, alloc, vec![tag, size, disp], OperandType::Pointer).expect("_gc_alloc returns a pointer");
    let call_id = b.last_instr(module);
    b.record_safepoint(module, call_id, live.to_vec());
    b.st(module, ptr, PAYLOAD_OFFSET, raw);
    ptr
}

/// References a pre-interned constant descriptor's box directly, rather
/// than allocating afresh (§4.4 Data layer: constants are emitted once).
fn global_const_box(module: &mut Module, b: &mut Builder, data: &mut Data, key: ConstKey) -> OperandId {
    let idx = data.intern(key.clone());
    let prefix = match key {
        ConstKey::Str(_) => "String_const",
        ConstKey::Int(_) => "Int_const",
        ConstKey::Bool(_) => "Bool_const",
    };
    let sym = b.global_const(module, format!("{prefix}_{idx}"), OperandType::Pointer);
    b.mov(module, sym, OperandType::Pointer)
}

#[allow(clippy::too_many_arguments)]
fn lower_expr(
    module: &mut Module,
    b: &mut Builder,
    klasses: &KlassTable,
    data: &mut Data,
    symtab: &mut SymbolTable<OperandId>,
    class: &str,
    self_op: OperandId,
    e: &Expr,
) -> OperandId {
    match &e.kind {
        ExprKind::IntLit(n) => global_const_box(module, b, data, ConstKey::Int(*n)),
        ExprKind::BoolLit(v) => global_const_box(module, b, data, ConstKey::Bool(*v)),
        ExprKind::StringLit(s) => global_const_box(module, b, data, ConstKey::Str(s.clone())),

        ExprKind::ObjectRef { name } if name.node == SELF => self_op,
        ExprKind::ObjectRef { name } => match symtab.lookup(&name.node) {
            Some(Symbol::Local(op)) => op,
            Some(Symbol::Field(offset)) => b.ld(module, self_op, offset as i64, OperandType::Pointer),
            None => b.const_null(module, OperandType::Pointer),
        },

        ExprKind::Assign { name, value } => {
            let v = lower_expr(module, b, klasses, data, symtab, class, self_op, value);
            match symtab.lookup(&name.node) {
                Some(Symbol::Local(slot)) => {
                    b.mov_into(module, slot, v);
                }
                Some(Symbol::Field(offset)) => {
                    b.st(module, self_op, offset as i64, v);
                }
                None => {}
            }
            v
        }

        ExprKind::Block { exprs } => {
            let mut last = b.const_null(module, OperandType::Pointer);
            for sub in exprs {
                last = lower_expr(module, b, klasses, data, symtab, class, self_op, sub);
            }
            last
        }

        ExprKind::Let { bindings, body } => {
            symtab.push();
            for binding in bindings {
                let slot = b.fresh_value(module, OperandType::Pointer);
                let v = match &binding.init {
                    Some(init) => lower_expr(module, b, klasses, data, symtab, class, self_op, init),
                    None => zero_value(module, b, klasses, data, &binding.declared_type.node, self_op),
                };
                b.mov_into(module, slot, v);
                symtab.bind(binding.name.node.clone(), Symbol::Local(slot));
            }
            let result = lower_expr(module, b, klasses, data, symtab, class, self_op, body);
            symtab.pop();
            result
        }

        ExprKind::If { cond, then_branch, else_branch } => {
            let c = lower_expr(module, b, klasses, data, symtab, class, self_op, cond);
            let pred = bool_predicate(module, b, c);
            let then_blk = b.new_block(module, "if_then");
            let else_blk = b.new_block(module, "if_else");
            let merge_blk = b.new_block(module, "if_merge");
            b.cond_br(module, pred, then_blk, else_blk);

            let result = b.fresh_value(module, OperandType::Pointer);

            b.set_current_block(then_blk);
            let tv = lower_expr(module, b, klasses, data, symtab, class, self_op, then_branch);
            b.mov_into(module, result, tv);
            b.br(module, merge_blk);

            b.set_current_block(else_blk);
            let ev = lower_expr(module, b, klasses, data, symtab, class, self_op, else_branch);
            b.mov_into(module, result, ev);
            b.br(module, merge_blk);

            b.set_current_block(merge_blk);
            result
        }

        ExprKind::While { cond, body } => {
            let header = b.new_block(module, "while_head");
            let body_blk = b.new_block(module, "while_body");
            let after = b.new_block(module, "while_after");
            b.br(module, header);

            b.set_current_block(header);
            let c = lower_expr(module, b, klasses, data, symtab, class, self_op, cond);
            let pred = bool_predicate(module, b, c);
            b.cond_br(module, pred, body_blk, after);

            b.set_current_block(body_blk);
            let _ = lower_expr(module, b, klasses, data, symtab, class, self_op, body);
            b.br(module, header);

            b.set_current_block(after);
            b.const_null(module, OperandType::Pointer)
        }

        ExprKind::Case { scrutinee, arms } => lower_case(module, b, klasses, data, symtab, class, self_op, scrutinee, arms),

        ExprKind::New { type_name } => lower_new(module, b, klasses, data, symtab, self_op, &type_name.node),

        ExprKind::DispatchVirtual { receiver, method, args } => {
            let recv = lower_expr(module, b, klasses, data, symtab, class, self_op, receiver);
            let recv_static = resolve_self_type(class, receiver.static_type.as_deref().unwrap_or(ast::OBJECT)).to_string();
            let arg_ops: Vec<OperandId> = args.iter().map(|a| lower_expr(module, b, klasses, data, symtab, class, self_op, a)).collect();
            null_check_abort(module, b, recv, "_dispatch_abort");
            let disp = b.ld(module, recv, HDR_DISP_OFFSET, OperandType::Pointer);
            let index = klasses.get(&recv_static).method_index(&method.node).expect("method resolved by semant");
            let func = b.ld(module, disp, (index as i64) * WORD_SIZE as i64, OperandType::Pointer);
            let mut call_args = vec![recv];
            call_args.extend(arg_ops);
            let result = b.call(module, func, call_args, OperandType::Pointer).expect("method call returns a boxed value");
            record_call_safepoint(module, b, symtab, self_op, &[]);
            result
        }

        ExprKind::DispatchStatic { receiver, target_type, method, args } => {
            let recv = lower_expr(module, b, klasses, data, symtab, class, self_op, receiver);
            let arg_ops: Vec<OperandId> = args.iter().map(|a| lower_expr(module, b, klasses, data, symtab, class, self_op, a)).collect();
            null_check_abort(module, b, recv, "_dispatch_abort");
            let target = resolve_self_type(class, &target_type.node);
            let full = klasses.get(target).method_full_name(&method.node).expect("method resolved by semant");
            let func = b.func_operand(module, full);
            let mut call_args = vec![recv];
            call_args.extend(arg_ops);
            let result = b.call(module, func, call_args, OperandType::Pointer).expect("method call returns a boxed value");
            record_call_safepoint(module, b, symtab, self_op, &[]);
            result
        }

        ExprKind::BinOp { op, lhs, rhs } => lower_binop(module, b, klasses, data, symtab, class, self_op, *op, lhs, rhs),
        ExprKind::UnaryOp { op, operand } => lower_unaryop(module, b, klasses, data, symtab, class, self_op, *op, operand),
    }
}

/// `payload != 0`, computed as `!(payload == 0)` since `BinCmpOp` has no
/// `Ne` variant (§3).
fn bool_predicate(module: &mut Module, b: &mut Builder, boxed_bool: OperandId) -> OperandId {
    let payload = b.ld(module, boxed_bool, PAYLOAD_OFFSET, OperandType::Int64);
    let zero = b.const_int(module, 0);
    let is_zero = b.eq(module, payload, zero);
    b.not(module, is_zero)
}

/// Records a GC safepoint at the most recently emitted instruction,
/// using every currently-live local plus `self` and `extra` (e.g. a
/// just-allocated pointer not yet bound to a name) as the GC-visible set
/// (§3 `Expr::allocates`). Used right after a call that may allocate.
fn record_call_safepoint(module: &mut Module, b: &mut Builder, symtab: &SymbolTable<OperandId>, self_op: OperandId, extra: &[OperandId]) {
    let mut live = symtab.live_locals();
    live.push(self_op);
    live.extend_from_slice(extra);
    let call_id = b.last_instr(module);
    b.record_safepoint(module, call_id, live);
}

fn null_check_abort(module: &mut Module, b: &mut Builder, recv: OperandId, abort_symbol: &str) {
    let null = b.const_null(module, OperandType::Pointer);
    let is_null = b.eq(module, recv, null);
    let abort_blk = b.new_block(module, "abort");
    let ok_blk = b.new_block(module, "ok");
    b.cond_br(module, is_null, abort_blk, ok_blk);
    b.set_current_block(abort_blk);
    let abort = b.func_operand(module, abort_symbol);
    b.call(module, abort, vec![], OperandType::Void);
    b.br(module, ok_blk);
    b.set_current_block(ok_blk);
}

fn lower_new(
    module: &mut Module,
    b: &mut Builder,
    klasses: &KlassTable,
    data: &mut Data,
    symtab: &SymbolTable<OperandId>,
    self_op: OperandId,
    type_name: &str,
) -> OperandId {
    if type_name != ast::SELF_TYPE {
        let k = klasses.get(type_name);
        let tag = b.const_int(module, k.tag as i64);
        let size = b.const_int(module, k.size_in_bytes() as i64);
        let disp = b.global_const(module, dispatch_table_symbol(type_name), OperandType::Pointer);
        let alloc = b.func_operand(module, "_gc_alloc");
        let ptr = b.call(module, alloc, vec![tag, size, disp], OperandType::Pointer).expect("_gc_alloc returns a pointer");
        record_call_safepoint(module, b, symtab, self_op, &[ptr]);
        let entry = &data.class_obj_table()[k.tag as usize];
        let init = b.func_operand(module, entry.init_symbol.clone());
        b.call(module, init, vec![ptr], OperandType::Pointer);
        record_call_safepoint(module, b, symtab, self_op, &[]);
        return ptr;
    }

    // `new SELF_TYPE` (§9 open question, resolved uniformly per SPEC_FULL
    // §4): read tag/size/dispTab off the *current* receiver's header,
    // `_gc_alloc`, then find the init method via the class-object table
    // at `tag * 2 * WORD_SIZE` and call through the loaded function ptr.
    let tag = b.ld(module, self_op, HDR_TAG_OFFSET, OperandType::Int64);
    let size = b.ld(module, self_op, HDR_SIZE_OFFSET, OperandType::Int64);
    let disp = b.ld(module, self_op, HDR_DISP_OFFSET, OperandType::Pointer);
    let alloc = b.func_operand(module, "_gc_alloc");
    let ptr = b.call(module, alloc, vec![tag, size, disp], OperandType::Pointer).expect("_gc_alloc returns a pointer");
    record_call_safepoint(module, b, symtab, self_op, &[ptr]);

    let class_obj_tab = b.global_const(module, "class_objTab", OperandType::Pointer);
    let entry_size = b.const_int(module, 2 * WORD_SIZE as i64);
    let entry_off = b.mul(module, tag, entry_size);
    let entry_addr = b.add(module, class_obj_tab, entry_off);
    let word = b.const_int(module, WORD_SIZE as i64);
    let init_slot_addr = b.add(module, entry_addr, word);
    let init_fn = b.ld(module, init_slot_addr, 0, OperandType::Pointer);
    b.call(module, init_fn, vec![ptr], OperandType::Pointer);
    record_call_safepoint(module, b, symtab, self_op, &[]);
    ptr
}

#[allow(clippy::too_many_arguments)]
fn lower_case(
    module: &mut Module,
    b: &mut Builder,
    klasses: &KlassTable,
    data: &mut Data,
    symtab: &mut SymbolTable<OperandId>,
    class: &str,
    self_op: OperandId,
    scrutinee: &Expr,
    arms: &[ast::CaseArm],
) -> OperandId {
    let s = lower_expr(module, b, klasses, data, symtab, class, self_op, scrutinee);
    null_check_abort(module, b, s, "_case_abort_2");
    let tag = b.ld(module, s, HDR_TAG_OFFSET, OperandType::Int64);

    let ordered = case_branches_by_descending_tag(klasses, arms);
    let merge = b.new_block(module, "case_merge");
    let result = b.fresh_value(module, OperandType::Pointer);

    let mut next_test = b.new_block(module, "case_test_0");
    b.br(module, next_test);

    for (i, arm) in ordered.iter().enumerate() {
        b.set_current_block(next_test);
        let k = klasses.get(&arm.declared_type.node);
        let lo = b.const_int(module, k.tag as i64);
        let hi = b.const_int(module, k.child_max_tag as i64);
        let ge_lo = b.le(module, lo, tag);
        let check_upper = b.new_block(module, format!("case_upper_{i}"));
        let fallthrough = if i + 1 < ordered.len() {
            b.new_block(module, format!("case_test_{}", i + 1))
        } else {
            b.new_block(module, "case_abort")
        };
        b.cond_br(module, ge_lo, check_upper, fallthrough);

        b.set_current_block(check_upper);
        let le_hi = b.le(module, tag, hi);
        let match_blk = b.new_block(module, format!("case_match_{i}"));
        b.cond_br(module, le_hi, match_blk, fallthrough);

        b.set_current_block(match_blk);
        symtab.push();
        let slot = b.fresh_value(module, OperandType::Pointer);
        b.mov_into(module, slot, s);
        symtab.bind(arm.name.node.clone(), Symbol::Local(slot));
        let v = lower_expr(module, b, klasses, data, symtab, class, self_op, &arm.body);
        symtab.pop();
        b.mov_into(module, result, v);
        b.br(module, merge);

        next_test = fallthrough;
    }

    // `next_test` is now the final fallthrough block: no branch matched.
    b.set_current_block(next_test);
    let abort = b.func_operand(module, "_case_abort");
    b.call(module, abort, vec![tag], OperandType::Void);
    b.br(module, merge);

    b.set_current_block(merge);
    result
}

#[allow(clippy::too_many_arguments)]
fn lower_binop(
    module: &mut Module,
    b: &mut Builder,
    klasses: &KlassTable,
    data: &mut Data,
    symtab: &mut SymbolTable<OperandId>,
    class: &str,
    self_op: OperandId,
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
) -> OperandId {
    let l = lower_expr(module, b, klasses, data, symtab, class, self_op, lhs);
    let r = lower_expr(module, b, klasses, data, symtab, class, self_op, rhs);

    if op == BinOp::Eq {
        let equals = b.func_operand(module, "_equals");
        let result = b.call(module, equals, vec![l, r], OperandType::Pointer).expect("_equals returns a boxed Bool");
        record_call_safepoint(module, b, symtab, self_op, &[]);
        return result;
    }

    let live = {
        let mut v = symtab.live_locals();
        v.push(self_op);
        v
    };
    let lp = b.ld(module, l, PAYLOAD_OFFSET, OperandType::Int64);
    let rp = b.ld(module, r, PAYLOAD_OFFSET, OperandType::Int64);
    match op {
        BinOp::Add => {
            let raw = b.add(module, lp, rp);
            box_raw(module, b, klasses, data, INT, raw, &live)
        }
        BinOp::Sub => {
            let raw = b.sub(module, lp, rp);
            box_raw(module, b, klasses, data, INT, raw, &live)
        }
        BinOp::Mul => {
            let raw = b.mul(module, lp, rp);
            box_raw(module, b, klasses, data, INT, raw, &live)
        }
        BinOp::Div => {
            let raw = b.div(module, lp, rp);
            box_raw(module, b, klasses, data, INT, raw, &live)
        }
        BinOp::Lt => {
            let raw = b.lt(module, lp, rp);
            let widened = b.mov(module, raw, OperandType::Int64);
            box_raw(module, b, klasses, data, BOOL, widened, &live)
        }
        BinOp::Le => {
            let raw = b.le(module, lp, rp);
            let widened = b.mov(module, raw, OperandType::Int64);
            box_raw(module, b, klasses, data, BOOL, widened, &live)
        }
        BinOp::Eq => unreachable!("handled above"),
    }
}

#[allow(clippy::too_many_arguments)]
fn lower_unaryop(
    module: &mut Module,
    b: &mut Builder,
    klasses: &KlassTable,
    data: &mut Data,
    symtab: &mut SymbolTable<OperandId>,
    class: &str,
    self_op: OperandId,
    op: UnaryOp,
    operand: &Expr,
) -> OperandId {
    let v = lower_expr(module, b, klasses, data, symtab, class, self_op, operand);
    let live = {
        let mut live = symtab.live_locals();
        live.push(self_op);
        live
    };
    match op {
        UnaryOp::Neg => {
            let payload = b.ld(module, v, PAYLOAD_OFFSET, OperandType::Int64);
            let raw = b.neg(module, payload);
            box_raw(module, b, klasses, data, INT, raw, &live)
        }
        UnaryOp::Not => {
            let payload = b.ld(module, v, PAYLOAD_OFFSET, OperandType::Int64);
            let zero = b.const_int(module, 0);
            let raw = b.eq(module, payload, zero);
            let widened = b.mov(module, raw, OperandType::Int64);
            box_raw(module, b, klasses, data, BOOL, widened, &live)
        }
        UnaryOp::IsVoid => {
            let raw = b.isvoid(module, v);
            let widened = b.mov(module, raw, OperandType::Int64);
            box_raw(module, b, klasses, data, BOOL, widened, &live)
        }
    }
}
