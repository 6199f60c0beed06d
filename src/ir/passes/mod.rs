//! Pass manager (§4.6): iterates a module's functions and applies each
//! registered pass per function, resetting per-function id counters
//! before each pass so passes may reuse bitsets sized to `max_id()`.

pub mod die;
pub mod nce;
pub mod unboxing;

use std::collections::{HashSet, VecDeque};

use super::{BlockId, Function, InstrId, OperandId};

/// One registered transformation. Implementations read/mutate the
/// function in place; `name()` is used only for trace output
/// (`+TraceOpts`, §6).
pub trait Pass {
    fn name(&self) -> &'static str;
    fn run(&self, f: &mut Function);
}

/// Runs `passes` over every function in `module`, in order, resetting
/// nothing but the passes' own per-run scratch state (ids stay stable
/// across passes — only a pass's *bitsets*, sized from `max_operand_id`/
/// `max_instr_id` at the time it runs, are "reset" in the sense of being
/// freshly allocated each time).
pub fn run_pipeline(module: &mut crate::ir::Module, passes: &[Box<dyn Pass>]) {
    for f in module.functions.values_mut() {
        for pass in passes {
            pass.run(f);
        }
    }
}

pub fn default_pipeline() -> Vec<Box<dyn Pass>> {
    vec![Box::new(die::Die), Box::new(nce::Nce), Box::new(unboxing::Unboxing)]
}

/// A generic sparse conditional constant/dataflow driver (§4.6): a CFG
/// worklist plus an SSA worklist. Initially only the entry block is
/// executable; a block becomes executable when some edge into it is
/// marked taken. The caller supplies a `Visitor` that updates its own
/// lattice and reports which uses/successors became newly relevant.
pub trait Visitor {
    /// Called once for every instruction in an executable block (may be
    /// called again if one of its operands' lattice values changed).
    /// Returns the successor blocks this instruction makes executable
    /// (only meaningful for branch instructions).
    fn visit(&mut self, f: &Function, id: InstrId, ssa_worklist: &mut VecDeque<OperandId>) -> Vec<BlockId>;
}

pub struct SparseConditionalDataflow<'a> {
    f: &'a Function,
}

impl<'a> SparseConditionalDataflow<'a> {
    pub fn new(f: &'a Function) -> Self {
        Self { f }
    }

    /// Drives `visitor` to a fixed point. Returns the final executable
    /// set, which callers use to decide e.g. which blocks are now
    /// provably unreachable.
    pub fn run(&self, visitor: &mut dyn Visitor) -> HashSet<BlockId> {
        let mut executable: HashSet<BlockId> = HashSet::new();
        let mut cfg_worklist: VecDeque<BlockId> = VecDeque::new();
        let mut ssa_worklist: VecDeque<OperandId> = VecDeque::new();

        cfg_worklist.push_back(self.f.entry);

        loop {
            if let Some(block) = cfg_worklist.pop_front() {
                let first_visit = executable.insert(block);
                for &id in &self.f.block(block).instrs {
                    if !first_visit && !self.f.instr(id).is_some_and(|i| i.is_phi()) {
                        continue;
                    }
                    let new_successors = visitor.visit(self.f, id, &mut ssa_worklist);
                    for s in new_successors {
                        cfg_worklist.push_back(s);
                    }
                }
                continue;
            }
            if let Some(v) = ssa_worklist.pop_front() {
                for &id in &self.f.operand(v).uses {
                    if let Some(block) = self.f.block_of(id) {
                        if executable.contains(&block) {
                            let new_successors = visitor.visit(self.f, id, &mut ssa_worklist);
                            for s in new_successors {
                                cfg_worklist.push_back(s);
                            }
                        }
                    }
                }
                continue;
            }
            break;
        }

        executable
    }
}
