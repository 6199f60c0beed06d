//! The custom SSA intermediate representation (§3, §4.5) and its pass
//! pipeline (§4.6). Shared by both the IR backend (`backend::ir_backend`)
//! and, indirectly, the stack-machine backend, which lowers the typed AST
//! directly without going through this IR.
//!
//! Operands and instructions live in per-[`Function`] arenas indexed by
//! small stable integers (§9 "arena of AST nodes indexed by stable
//! integer ids", generalized here to IR objects) rather than as a graph
//! of reference-counted handles. A [`Module`] owns every `Function`; its
//! arena is released wholesale when the `Module` is dropped — passes
//! never free individual IR objects, matching §5's allocator contract.

pub mod builder;
pub mod cfg;
pub mod passes;
pub mod ssa;

use std::collections::BTreeMap;

/// Operands are polymorphic over {constant, SSA value, global variable,
/// global constant, function symbol} (§3). Every operand carries a
/// stable id used as a bitset index by the passes in §4.6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperandId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

/// `INT8/INT32/UINT32/INT64/UINT64/POINTER/STRUCTURE/VOID` (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandType {
    Int8,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Pointer,
    Structure,
    Void,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Int(i64),
    UInt(u64),
    Bool(bool),
    /// The null pointer constant; NCE's seed rules and the unboxing
    /// pass's escape analysis both compare operands against this.
    Null,
}

#[derive(Clone, Debug)]
pub enum OperandKind {
    Const(ConstValue),
    /// An SSA-defined value; the defining instruction(s) live in `defs`
    /// (more than one only transiently, before SSA renaming resolves
    /// to a single definition per name — see `ssa::construct`).
    Value,
    Global(String),
    GlobalConst(String),
    Func(String),
}

/// An IR operand (§3). `uses`/`defs` are the structural use-def chains;
/// every mutation to an instruction's operand list must update both
/// sides symmetrically (§8 "use-def symmetry").
#[derive(Clone, Debug)]
pub struct Operand {
    pub id: OperandId,
    pub kind: OperandKind,
    pub ty: OperandType,
    pub uses: Vec<InstrId>,
    pub defs: Vec<InstrId>,
}

impl Operand {
    pub fn is_const(&self) -> bool {
        matches!(self.kind, OperandKind::Const(_))
    }

    pub fn is_null_const(&self) -> bool {
        matches!(self.kind, OperandKind::Const(ConstValue::Null))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinCmpOp {
    Lt,
    Le,
    Eq,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryArithOp {
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryLogicalOp {
    Not,
    IsVoid,
}

/// An IR instruction (§3): phi, memory, control, call, binary
/// arithmetic/comparison, unary arithmetic/logical, move. Uses and defs
/// are exposed uniformly via [`Instr::uses`]/[`Instr::defs`] so the pass
/// manager and the use-def maintenance code never match on the variant.
#[derive(Clone, Debug)]
pub enum Instr {
    Phi {
        dest: OperandId,
        incoming: Vec<(BlockId, OperandId)>,
    },
    Load {
        dest: OperandId,
        base: OperandId,
        offset: i64,
    },
    Store {
        base: OperandId,
        offset: i64,
        value: OperandId,
    },
    Br {
        target: BlockId,
    },
    CondBr {
        pred: OperandId,
        then_blk: BlockId,
        else_blk: BlockId,
    },
    Ret {
        value: Option<OperandId>,
    },
    Call {
        dest: Option<OperandId>,
        func: OperandId,
        args: Vec<OperandId>,
    },
    BinArith {
        dest: OperandId,
        op: BinArithOp,
        lhs: OperandId,
        rhs: OperandId,
    },
    BinCmp {
        dest: OperandId,
        op: BinCmpOp,
        lhs: OperandId,
        rhs: OperandId,
    },
    UnaryArith {
        dest: OperandId,
        op: UnaryArithOp,
        src: OperandId,
    },
    UnaryLogical {
        dest: OperandId,
        op: UnaryLogicalOp,
        src: OperandId,
    },
    Move {
        dest: OperandId,
        src: OperandId,
    },
}

impl Instr {
    pub fn uses(&self) -> Vec<OperandId> {
        match self {
            Instr::Phi { incoming, .. } => incoming.iter().map(|(_, v)| *v).collect(),
            Instr::Load { base, .. } => vec![*base],
            Instr::Store { base, value, .. } => vec![*base, *value],
            Instr::Br { .. } => vec![],
            Instr::CondBr { pred, .. } => vec![*pred],
            Instr::Ret { value } => value.iter().copied().collect(),
            Instr::Call { func, args, .. } => {
                let mut u = vec![*func];
                u.extend(args.iter().copied());
                u
            }
            Instr::BinArith { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instr::BinCmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instr::UnaryArith { src, .. } => vec![*src],
            Instr::UnaryLogical { src, .. } => vec![*src],
            Instr::Move { src, .. } => vec![*src],
        }
    }

    pub fn defs(&self) -> Vec<OperandId> {
        match self {
            Instr::Phi { dest, .. } => vec![*dest],
            Instr::Load { dest, .. } => vec![*dest],
            Instr::Store { .. } => vec![],
            Instr::Br { .. } => vec![],
            Instr::CondBr { .. } => vec![],
            Instr::Ret { .. } => vec![],
            Instr::Call { dest, .. } => dest.iter().copied().collect(),
            Instr::BinArith { dest, .. } => vec![*dest],
            Instr::BinCmp { dest, .. } => vec![*dest],
            Instr::UnaryArith { dest, .. } => vec![*dest],
            Instr::UnaryLogical { dest, .. } => vec![*dest],
            Instr::Move { dest, .. } => vec![*dest],
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Instr::Br { .. } | Instr::CondBr { .. } | Instr::Ret { .. })
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Instr::Store { .. })
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Instr::Call { .. })
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Instr::Phi { .. })
    }

    /// Rewrites one use-site operand in place (`update_use`, §3): the
    /// caller is responsible for updating the old/new operands' `uses`
    /// lists symmetrically (done by `Function::replace_operand_use`).
    pub fn rewrite_use(&mut self, old: OperandId, new: OperandId) {
        let map = |v: &mut OperandId| {
            if *v == old {
                *v = new;
            }
        };
        match self {
            Instr::Phi { incoming, .. } => incoming.iter_mut().for_each(|(_, v)| map(v)),
            Instr::Load { base, .. } => map(base),
            Instr::Store { base, value, .. } => {
                map(base);
                map(value);
            }
            Instr::Br { .. } => {}
            Instr::CondBr { pred, .. } => map(pred),
            Instr::Ret { value } => {
                if let Some(v) = value {
                    map(v);
                }
            }
            Instr::Call { func, args, .. } => {
                map(func);
                args.iter_mut().for_each(map);
            }
            Instr::BinArith { lhs, rhs, .. } => {
                map(lhs);
                map(rhs);
            }
            Instr::BinCmp { lhs, rhs, .. } => {
                map(lhs);
                map(rhs);
            }
            Instr::UnaryArith { src, .. } => map(src),
            Instr::UnaryLogical { src, .. } => map(src),
            Instr::Move { src, .. } => map(src),
        }
    }
}

/// A basic block (§3): ordered instruction list plus predecessor and
/// successor lists. Exactly one terminator at the end; phis only at the
/// head (the builder and passes both preserve this).
#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    pub id: BlockId,
    pub name: String,
    pub instrs: Vec<InstrId>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
}

impl BasicBlock {
    pub fn phi_count(&self, arena: &[Option<Instr>]) -> usize {
        self.instrs
            .iter()
            .take_while(|id| arena[id.0 as usize].as_ref().is_some_and(Instr::is_phi))
            .count()
    }
}

/// One function's IR: its operand/instruction arenas and block list,
/// plus the cached CFG analyses (`cfg::CfgCache`) invalidated on any
/// structural mutation.
pub struct Function {
    pub name: String,
    pub param_types: Vec<OperandType>,
    pub params: Vec<OperandId>,
    pub return_type: OperandType,
    pub entry: BlockId,
    pub(crate) operands: Vec<Operand>,
    pub(crate) instrs: Vec<Option<Instr>>,
    pub blocks: Vec<BasicBlock>,
    pub(crate) cfg_cache: cfg::CfgCache,
    /// One entry per call that may trigger allocation (§3 `Expr::allocates`):
    /// the operands live across that call which the stack walker must
    /// treat as GC roots. Populated by the IR backend, consumed by
    /// `runtime::stackmap` once a real register allocator assigns frame
    /// slots to these operands (out of scope here — see §1).
    pub safepoints: Vec<(InstrId, Vec<OperandId>)>,
}

impl Function {
    pub fn new(name: impl Into<String>, return_type: OperandType) -> Self {
        Self {
            name: name.into(),
            param_types: Vec::new(),
            params: Vec::new(),
            return_type,
            entry: BlockId(0),
            operands: Vec::new(),
            instrs: Vec::new(),
            blocks: Vec::new(),
            cfg_cache: cfg::CfgCache::default(),
            safepoints: Vec::new(),
        }
    }

    /// Records `live` as the GC-visible operands at the call instruction
    /// `at`. Called once per allocating expression as the IR backend
    /// lowers it; never removed, since DIE only erases dead instructions
    /// and a call that allocates is never dead by itself (it's kept for
    /// its side effect even with an unused result).
    pub fn record_safepoint(&mut self, at: InstrId, live: Vec<OperandId>) {
        self.safepoints.push((at, live));
    }

    pub fn max_operand_id(&self) -> u32 {
        self.operands.len() as u32
    }

    pub fn max_instr_id(&self) -> u32 {
        self.instrs.len() as u32
    }

    pub fn operand(&self, id: OperandId) -> &Operand {
        &self.operands[id.0 as usize]
    }

    pub fn operand_mut(&mut self, id: OperandId) -> &mut Operand {
        &mut self.operands[id.0 as usize]
    }

    pub fn instr(&self, id: InstrId) -> Option<&Instr> {
        self.instrs[id.0 as usize].as_ref()
    }

    pub fn instr_mut(&mut self, id: InstrId) -> Option<&mut Instr> {
        self.instrs[id.0 as usize].as_mut()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.cfg_cache.invalidate();
        &mut self.blocks[id.0 as usize]
    }

    pub fn new_operand(&mut self, kind: OperandKind, ty: OperandType) -> OperandId {
        let id = OperandId(self.operands.len() as u32);
        self.operands.push(Operand { id, kind, ty, uses: Vec::new(), defs: Vec::new() });
        id
    }

    pub fn new_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock { id, name: name.into(), instrs: Vec::new(), preds: Vec::new(), succs: Vec::new() });
        self.cfg_cache.invalidate();
        id
    }

    /// Appends `instr` to `block`, registering use→instruction and
    /// def→instruction back-edges (§3 "constructing an instruction with
    /// operand x in uses appends the instruction to x.uses").
    pub fn push_instr(&mut self, block: BlockId, instr: Instr) -> InstrId {
        let id = InstrId(self.instrs.len() as u32);
        for u in instr.uses() {
            self.operand_mut(u).uses.push(id);
        }
        for d in instr.defs() {
            self.operand_mut(d).defs.push(id);
        }
        let is_terminator = instr.is_terminator();
        let targets: Vec<BlockId> = match &instr {
            Instr::Br { target } => vec![*target],
            Instr::CondBr { then_blk, else_blk, .. } => vec![*then_blk, *else_blk],
            _ => vec![],
        };
        self.instrs.push(Some(instr));
        self.blocks[block.0 as usize].instrs.push(id);
        for t in targets {
            self.connect(block, t);
        }
        let _ = is_terminator;
        self.cfg_cache.invalidate();
        id
    }

    /// Connects a CFG edge `from -> to` (idempotent).
    pub fn connect(&mut self, from: BlockId, to: BlockId) {
        if !self.blocks[from.0 as usize].succs.contains(&to) {
            self.blocks[from.0 as usize].succs.push(to);
        }
        if !self.blocks[to.0 as usize].preds.contains(&from) {
            self.blocks[to.0 as usize].preds.push(from);
        }
        self.cfg_cache.invalidate();
    }

    /// Rewrites every use of `old` at instruction `at` to `new`,
    /// maintaining use-list symmetry (`update_use`, §3).
    pub fn update_use(&mut self, at: InstrId, old: OperandId, new: OperandId) {
        if let Some(instr) = self.instrs[at.0 as usize].as_mut() {
            instr.rewrite_use(old, new);
        }
        self.operands[old.0 as usize].uses.retain(|i| *i != at);
        if !self.operands[new.0 as usize].uses.contains(&at) {
            self.operands[new.0 as usize].uses.push(at);
        }
    }

    /// Erases an instruction: removes it from its block and decrements
    /// use-counts on its operands (§4.6 DIE). The arena slot becomes a
    /// tombstone; ids already handed out elsewhere stay stable.
    pub fn erase_instr(&mut self, block: BlockId, id: InstrId) {
        let Some(instr) = self.instrs[id.0 as usize].take() else { return };
        for u in instr.uses() {
            self.operands[u.0 as usize].uses.retain(|i| *i != id);
        }
        for d in instr.defs() {
            self.operands[d.0 as usize].defs.retain(|i| *i != id);
        }
        self.blocks[block.0 as usize].instrs.retain(|i| *i != id);
        self.cfg_cache.invalidate();
    }

    pub fn instr_count(&self) -> usize {
        self.instrs.iter().filter(|i| i.is_some()).count()
    }

    pub fn all_operand_ids(&self) -> Vec<OperandId> {
        (0..self.operands.len() as u32).map(OperandId).collect()
    }

    /// Recomputes every operand's `uses`/`defs` from the current
    /// instruction stream. SSA construction inserts/renames phis by
    /// mutating the instruction arena directly (not through
    /// `push_instr`), so it calls this once at the end rather than
    /// maintaining the chains incrementally mid-rewrite.
    pub fn rebuild_use_def_chains(&mut self) {
        for o in &mut self.operands {
            o.uses.clear();
            o.defs.clear();
        }
        let entries: Vec<(InstrId, Vec<OperandId>, Vec<OperandId>)> = self
            .instrs
            .iter()
            .enumerate()
            .filter_map(|(i, instr)| instr.as_ref().map(|ins| (InstrId(i as u32), ins.uses(), ins.defs())))
            .collect();
        for (id, uses, defs) in entries {
            for u in uses {
                self.operands[u.0 as usize].uses.push(id);
            }
            for d in defs {
                self.operands[d.0 as usize].defs.push(id);
            }
        }
    }

    /// Owning block of an instruction, by linear scan. Used by SSA
    /// construction and the passes; functions are small enough that
    /// this doesn't warrant a maintained reverse index.
    pub fn block_of(&self, id: InstrId) -> Option<BlockId> {
        self.blocks.iter().find(|b| b.instrs.contains(&id)).map(|b| b.id)
    }
}

/// Three disjoint maps keyed by symbolic name (§3 "Module"): functions,
/// immutable global constants, and mutable global variables. No two
/// symbols share a name across the three maps — `Module::declare_*`
/// enforces this.
#[derive(Default)]
pub struct Module {
    pub functions: BTreeMap<String, Function>,
    pub global_constants: BTreeMap<String, ConstValue>,
    pub global_variables: BTreeMap<String, OperandType>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    fn name_taken(&self, name: &str) -> bool {
        self.functions.contains_key(name)
            || self.global_constants.contains_key(name)
            || self.global_variables.contains_key(name)
    }

    pub fn declare_function(&mut self, f: Function) {
        debug_assert!(!self.name_taken(&f.name), "symbol {} already declared", f.name);
        self.functions.insert(f.name.clone(), f);
    }

    pub fn declare_global_constant(&mut self, name: impl Into<String>, value: ConstValue) {
        let name = name.into();
        debug_assert!(!self.name_taken(&name), "symbol {name} already declared");
        self.global_constants.insert(name, value);
    }

    pub fn declare_global_variable(&mut self, name: impl Into<String>, ty: OperandType) {
        let name = name.into();
        debug_assert!(!self.name_taken(&name), "symbol {name} already declared");
        self.global_variables.insert(name, ty);
    }
}
