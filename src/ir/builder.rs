//! IR construction front door (§4.5): `new_block` / `set_current_block` /
//! `set_current_function` plus per-instruction builders (`ld`, `st`,
//! `add`, `call`, `cond_br`, `br`, `ret`, …). Each builder returns the
//! def operand where applicable and appends to the current block;
//! `cond_br`/`br` additionally connect the CFG edges via `Function::connect`
//! (already done inside `Function::push_instr`, so the builder itself
//! stays a thin convenience layer over it).

use super::{
    BinArithOp, BinCmpOp, BlockId, ConstValue, Function, Instr, Module, Operand, OperandId,
    OperandKind, OperandType, UnaryArithOp, UnaryLogicalOp,
};

/// Tracks "where to build next" across a lowering pass. The backend
/// owns one of these; `Module` owns the functions it points into.
pub struct Builder {
    current_function: Option<String>,
    current_block: Option<BlockId>,
}

impl Builder {
    pub fn new() -> Self {
        Self { current_function: None, current_block: None }
    }

    pub fn set_current_function(&mut self, name: impl Into<String>) {
        self.current_function = Some(name.into());
        self.current_block = None;
    }

    pub fn set_current_block(&mut self, block: BlockId) {
        self.current_block = Some(block);
    }

    pub fn current_block(&self) -> BlockId {
        self.current_block.expect("no current block set")
    }

    fn func<'m>(&self, module: &'m mut Module) -> &'m mut Function {
        let name = self.current_function.as_ref().expect("no current function set");
        module.functions.get_mut(name).unwrap_or_else(|| panic!("unknown function {name}"))
    }

    /// Creates a block in the current function and, if none is set yet,
    /// selects it as both the function's entry and the current block.
    pub fn new_block(&mut self, module: &mut Module, name: impl Into<String>) -> BlockId {
        let f = self.func(module);
        let is_first = f.blocks.is_empty();
        let id = f.new_block(name);
        if is_first {
            f.entry = id;
        }
        if self.current_block.is_none() {
            self.current_block = Some(id);
        }
        id
    }

    fn push(&self, module: &mut Module, instr: Instr) -> super::InstrId {
        let block = self.current_block();
        self.func_ref(module).push_instr(block, instr)
    }

    fn func_ref<'m>(&self, module: &'m mut Module) -> &'m mut Function {
        self.func(module)
    }

    pub fn const_int(&self, module: &mut Module, v: i64) -> OperandId {
        self.func_ref(module).new_operand(OperandKind::Const(ConstValue::Int(v)), OperandType::Int64)
    }

    pub fn const_bool(&self, module: &mut Module, v: bool) -> OperandId {
        self.func_ref(module).new_operand(OperandKind::Const(ConstValue::Bool(v)), OperandType::Int8)
    }

    pub fn const_null(&self, module: &mut Module, ty: OperandType) -> OperandId {
        self.func_ref(module).new_operand(OperandKind::Const(ConstValue::Null), ty)
    }

    pub fn global(&self, module: &mut Module, name: impl Into<String>, ty: OperandType) -> OperandId {
        self.func_ref(module).new_operand(OperandKind::Global(name.into()), ty)
    }

    pub fn global_const(&self, module: &mut Module, name: impl Into<String>, ty: OperandType) -> OperandId {
        self.func_ref(module).new_operand(OperandKind::GlobalConst(name.into()), ty)
    }

    pub fn func_operand(&self, module: &mut Module, name: impl Into<String>) -> OperandId {
        self.func_ref(module).new_operand(OperandKind::Func(name.into()), OperandType::Pointer)
    }

    /// Allocates a fresh SSA value slot without defining it yet (used by
    /// the caller when the def is about to be produced by a builder call
    /// that takes `dest` explicitly, e.g. multi-result lowering).
    pub fn fresh_value(&self, module: &mut Module, ty: OperandType) -> OperandId {
        self.func_ref(module).new_operand(OperandKind::Value, ty)
    }

    pub fn ld(&self, module: &mut Module, base: OperandId, offset: i64, ty: OperandType) -> OperandId {
        let dest = self.fresh_value(module, ty);
        self.push(module, Instr::Load { dest, base, offset });
        dest
    }

    pub fn st(&self, module: &mut Module, base: OperandId, offset: i64, value: OperandId) {
        self.push(module, Instr::Store { base, offset, value });
    }

    fn bin_arith(&self, module: &mut Module, op: BinArithOp, lhs: OperandId, rhs: OperandId, ty: OperandType) -> OperandId {
        let dest = self.fresh_value(module, ty);
        self.push(module, Instr::BinArith { dest, op, lhs, rhs });
        dest
    }

    pub fn add(&self, module: &mut Module, lhs: OperandId, rhs: OperandId) -> OperandId {
        self.bin_arith(module, BinArithOp::Add, lhs, rhs, OperandType::Int64)
    }

    pub fn sub(&self, module: &mut Module, lhs: OperandId, rhs: OperandId) -> OperandId {
        self.bin_arith(module, BinArithOp::Sub, lhs, rhs, OperandType::Int64)
    }

    pub fn mul(&self, module: &mut Module, lhs: OperandId, rhs: OperandId) -> OperandId {
        self.bin_arith(module, BinArithOp::Mul, lhs, rhs, OperandType::Int64)
    }

    pub fn div(&self, module: &mut Module, lhs: OperandId, rhs: OperandId) -> OperandId {
        self.bin_arith(module, BinArithOp::Div, lhs, rhs, OperandType::Int64)
    }

    fn bin_cmp(&self, module: &mut Module, op: BinCmpOp, lhs: OperandId, rhs: OperandId) -> OperandId {
        let dest = self.fresh_value(module, OperandType::Int8);
        self.push(module, Instr::BinCmp { dest, op, lhs, rhs });
        dest
    }

    pub fn lt(&self, module: &mut Module, lhs: OperandId, rhs: OperandId) -> OperandId {
        self.bin_cmp(module, BinCmpOp::Lt, lhs, rhs)
    }

    pub fn le(&self, module: &mut Module, lhs: OperandId, rhs: OperandId) -> OperandId {
        self.bin_cmp(module, BinCmpOp::Le, lhs, rhs)
    }

    pub fn eq(&self, module: &mut Module, lhs: OperandId, rhs: OperandId) -> OperandId {
        self.bin_cmp(module, BinCmpOp::Eq, lhs, rhs)
    }

    pub fn neg(&self, module: &mut Module, src: OperandId) -> OperandId {
        let dest = self.fresh_value(module, OperandType::Int64);
        self.push(module, Instr::UnaryArith { dest, op: UnaryArithOp::Neg, src });
        dest
    }

    pub fn not(&self, module: &mut Module, src: OperandId) -> OperandId {
        let dest = self.fresh_value(module, OperandType::Int8);
        self.push(module, Instr::UnaryLogical { dest, op: UnaryLogicalOp::Not, src });
        dest
    }

    pub fn isvoid(&self, module: &mut Module, src: OperandId) -> OperandId {
        let dest = self.fresh_value(module, OperandType::Int8);
        self.push(module, Instr::UnaryLogical { dest, op: UnaryLogicalOp::IsVoid, src });
        dest
    }

    pub fn mov(&self, module: &mut Module, src: OperandId, ty: OperandType) -> OperandId {
        let dest = self.fresh_value(module, ty);
        self.push(module, Instr::Move { dest, src });
        dest
    }

    /// Like [`Builder::mov`], but writes into an already-allocated
    /// operand rather than a fresh one — used for pre-SSA variable slots
    /// (`let`/`case` bindings, reassignment) that `ssa::construct` later
    /// promotes to real SSA once it sees more than one def.
    pub fn mov_into(&self, module: &mut Module, dest: OperandId, src: OperandId) {
        self.push(module, Instr::Move { dest, src });
    }

    pub fn call(&self, module: &mut Module, func: OperandId, args: Vec<OperandId>, ret_ty: OperandType) -> Option<OperandId> {
        let dest = if matches!(ret_ty, OperandType::Void) { None } else { Some(self.fresh_value(module, ret_ty)) };
        self.push(module, Instr::Call { dest, func, args });
        dest
    }

    pub fn br(&self, module: &mut Module, target: BlockId) {
        self.push(module, Instr::Br { target });
    }

    /// `cond_br(pred, taken, fall_through)` (§4.5): both successors are
    /// connected by `Function::push_instr`, which reads `CondBr`'s
    /// `then_blk`/`else_blk` as the "taken"/"fall-through" edges.
    pub fn cond_br(&self, module: &mut Module, pred: OperandId, taken: BlockId, fall_through: BlockId) {
        self.push(module, Instr::CondBr { pred, then_blk: taken, else_blk: fall_through });
    }

    pub fn ret(&self, module: &mut Module, value: Option<OperandId>) {
        self.push(module, Instr::Ret { value });
    }

    pub fn operand(&self, module: &Module, id: OperandId) -> &Operand {
        let name = self.current_function.as_ref().expect("no current function set");
        module.functions[name].operand(id)
    }

    /// The id of the instruction most recently pushed into the current
    /// block — used right after a `call` to record a GC safepoint for it.
    pub fn last_instr(&self, module: &Module) -> super::InstrId {
        let block = self.current_block();
        *self.func_ref_const(module).block(block).instrs.last().expect("no instruction pushed into this block yet")
    }

    fn func_ref_const<'m>(&self, module: &'m Module) -> &'m Function {
        let name = self.current_function.as_ref().expect("no current function set");
        &module.functions[name]
    }

    /// Records that the currently-live pointer operands in `live` must
    /// stay GC-visible across the call at `at` (§3 "used by the IR
    /// backend to decide which values must be kept GC-visible across a
    /// call").
    pub fn record_safepoint(&self, module: &mut Module, at: super::InstrId, live: Vec<OperandId>) {
        self.func_ref(module).record_safepoint(at, live);
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with_function(name: &str, ret: OperandType) -> Module {
        let mut m = Module::new();
        m.declare_function(Function::new(name, ret));
        m
    }

    #[test]
    fn test_new_block_selects_entry_and_current() {
        let mut module = module_with_function("f", OperandType::Int64);
        let mut b = Builder::new();
        b.set_current_function("f");
        let entry = b.new_block(&mut module, "entry");
        assert_eq!(module.functions["f"].entry, entry);
        assert_eq!(b.current_block(), entry);
    }

    #[test]
    fn test_add_produces_value_operand_and_connects_cond_br() {
        let mut module = module_with_function("f", OperandType::Int64);
        let mut b = Builder::new();
        b.set_current_function("f");
        let entry = b.new_block(&mut module, "entry");
        let then_blk = b.new_block(&mut module, "then");
        let else_blk = b.new_block(&mut module, "else");
        b.set_current_block(entry);

        let one = b.const_int(&mut module, 1);
        let two = b.const_int(&mut module, 2);
        let sum = b.add(&mut module, one, two);
        let pred = b.const_bool(&mut module, true);
        b.cond_br(&mut module, pred, then_blk, else_blk);

        let f = &module.functions["f"];
        assert!(matches!(f.operand(sum).kind, OperandKind::Value));
        assert!(f.block(entry).succs.contains(&then_blk));
        assert!(f.block(entry).succs.contains(&else_blk));
        assert!(f.block(then_blk).preds.contains(&entry));
    }

    #[test]
    fn test_last_instr_and_record_safepoint_target_the_just_emitted_call() {
        let mut module = module_with_function("f", OperandType::Pointer);
        let mut b = Builder::new();
        b.set_current_function("f");
        b.new_block(&mut module, "entry");
        let alloc = b.func_operand(&mut module, "_gc_alloc");
        let live = b.const_int(&mut module, 7);
        b.call(&mut module, alloc, vec![], OperandType::Pointer);
        let call_id = b.last_instr(&module);
        b.record_safepoint(&mut module, call_id, vec![live]);

        assert_eq!(module.functions["f"].safepoints, vec![(call_id, vec![live])]);
    }

    #[test]
    fn test_call_with_void_return_has_no_dest() {
        let mut module = module_with_function("f", OperandType::Void);
        let mut b = Builder::new();
        b.set_current_function("f");
        b.new_block(&mut module, "entry");
        let target = b.func_operand(&mut module, "IO.out_string");
        let dest = b.call(&mut module, target, vec![], OperandType::Void);
        assert!(dest.is_none());
    }
}
