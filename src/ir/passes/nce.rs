//! Null-check elimination (§4.6). Per-operand lattice `not_null: bool`,
//! seeded from: parameter 0 (the receiver), moves of global-constant
//! pointers, and results of the allocation runtime call (`_gc_alloc`).
//! Propagated via the sparse conditional dataflow template (φ = AND of
//! inputs; move propagates its source's value; an equality-against-null
//! branch whose compared operand is proven `not_null` is deterministic).
//!
//! After propagation, every proven-safe null check on the specific
//! "check-call-merge" idiom the lowering emits — `cond_br(is_null,
//! abort_block, call_block)` followed by a merge φ of the call result —
//! is rewritten away: the branch collapses to an unconditional jump into
//! `call_block`, the abort block is disconnected, and the merge's φ
//! becomes a move of `call_block`'s value.

use std::collections::{HashMap, VecDeque};

use super::{Pass, SparseConditionalDataflow, Visitor};
use crate::ir::{BinCmpOp, BlockId, Function, Instr, InstrId, OperandId, OperandKind};

pub struct Nce;

impl Pass for Nce {
    fn name(&self) -> &'static str {
        "NCE"
    }

    fn run(&self, f: &mut Function) {
        let not_null = propagate(f);
        rewrite_idiom(f, &not_null);
    }
}

fn is_gc_alloc(f: &Function, func: OperandId) -> bool {
    matches!(&f.operand(func).kind, OperandKind::Func(name) if name == "_gc_alloc")
}

fn propagate(f: &Function) -> HashMap<OperandId, bool> {
    struct NceVisitor<'a> {
        f: &'a Function,
        not_null: HashMap<OperandId, bool>,
    }

    impl NceVisitor<'_> {
        fn is_not_null(&self, v: OperandId) -> bool {
            if self.f.operand(v).is_null_const() {
                return false;
            }
            if self.f.operand(v).is_const() {
                return true; // non-null constants (ints, bools, strings) are trivially not null
            }
            *self.not_null.get(&v).unwrap_or(&false)
        }

        fn set(&mut self, v: OperandId, value: bool) -> bool {
            let prev = self.not_null.insert(v, value);
            prev != Some(value)
        }
    }

    impl Visitor for NceVisitor<'_> {
        fn visit(&mut self, f: &Function, id: InstrId, ssa_worklist: &mut VecDeque<OperandId>) -> Vec<BlockId> {
            let Some(instr) = f.instr(id) else { return vec![] };
            match instr {
                Instr::Phi { dest, incoming } => {
                    let all = incoming.iter().all(|(_, v)| self.is_not_null(*v));
                    if self.set(*dest, all) {
                        ssa_worklist.push_back(*dest);
                    }
                    vec![]
                }
                Instr::Move { dest, src } => {
                    let nn = self.is_not_null(*src);
                    if self.set(*dest, nn) {
                        ssa_worklist.push_back(*dest);
                    }
                    vec![]
                }
                Instr::Call { dest: Some(dest), func, .. } if is_gc_alloc(f, *func) => {
                    self.set(*dest, true);
                    vec![]
                }
                Instr::Br { target } => vec![*target],
                Instr::CondBr { pred, then_blk, else_blk } => {
                    if let Some(target) = self.deterministic_successor(f, *pred, *then_blk, *else_blk) {
                        vec![target]
                    } else {
                        vec![*then_blk, *else_blk]
                    }
                }
                _ => vec![],
            }
        }
    }

    impl NceVisitor<'_> {
        /// If `pred` is `x == null` (in either operand order) and `x` is
        /// proven not-null, the comparison is always false, so only the
        /// "not equal" successor (`else_blk` by the lowering's
        /// convention: `cond_br(is_null, abort_block, call_block)`) is
        /// reachable.
        fn deterministic_successor(&self, f: &Function, pred: OperandId, _then_blk: BlockId, else_blk: BlockId) -> Option<BlockId> {
            let def = f.operand(pred).defs.first()?;
            let Instr::BinCmp { op: BinCmpOp::Eq, lhs, rhs, .. } = f.instr(*def)? else { return None };
            let other = if f.operand(*lhs).is_null_const() {
                Some(*rhs)
            } else if f.operand(*rhs).is_null_const() {
                Some(*lhs)
            } else {
                None
            }?;
            self.is_not_null(other).then_some(else_blk)
        }
    }

    let mut visitor = NceVisitor { f, not_null: HashMap::new() };
    for (i, &p) in f.params.iter().enumerate() {
        if i == 0 {
            visitor.not_null.insert(p, true);
        }
    }
    // seed global-constant moves directly: a move whose source is a
    // GlobalConst pointer is not_null regardless of reachability, since
    // it has no data dependency on control flow.
    for id in (0..f.max_instr_id()).map(InstrId) {
        if let Some(Instr::Move { dest, src }) = f.instr(id) {
            if matches!(f.operand(*src).kind, OperandKind::GlobalConst(_)) {
                visitor.not_null.insert(*dest, true);
            }
        }
    }

    SparseConditionalDataflow::new(f).run(&mut visitor);
    visitor.not_null
}

/// Collapses every `cond_br(eq(x, null), abort_block, call_block)` where
/// `x` is proven `not_null` into an unconditional jump to `call_block`,
/// disconnects `abort_block`, and turns the merge block's φ into a move
/// of `call_block`'s contributed value.
fn rewrite_idiom(f: &mut Function, not_null: &HashMap<OperandId, bool>) {
    let is_not_null = |v: OperandId, f: &Function| -> bool {
        f.operand(v).is_const() && !f.operand(v).is_null_const() || *not_null.get(&v).unwrap_or(&false)
    };

    for block in f.reverse_post_order() {
        let Some(&term_id) = f.block(block).instrs.last() else { continue };
        let Some(Instr::CondBr { pred, then_blk: abort_block, else_blk: call_block }) = f.instr(term_id).cloned() else { continue };
        let Some(&def) = f.operand(pred).defs.first() else { continue };
        let Some(Instr::BinCmp { op: BinCmpOp::Eq, lhs, rhs, .. }) = f.instr(def).cloned() else { continue };
        let other = if f.operand(lhs).is_null_const() {
            rhs
        } else if f.operand(rhs).is_null_const() {
            lhs
        } else {
            continue;
        };
        if !is_not_null(other, f) {
            continue;
        }

        // Replace the terminator with an unconditional branch to call_block.
        f.instrs[term_id.0 as usize] = Some(Instr::Br { target: call_block });
        f.blocks[block.0 as usize].succs.retain(|&s| s == call_block);
        f.blocks[abort_block.0 as usize].preds.retain(|&p| p != block);
        f.cfg_cache.invalidate();

        // If call_block leads straight to a merge block with a φ sourced
        // from (abort_block, v), drop abort_block's contribution and
        // turn single-predecessor φs into moves.
        let Some(&merge_candidate) = f.block(call_block).succs.first() else { continue };
        if f.block(call_block).succs.len() != 1 {
            continue;
        }
        let phi_ids = f.block(merge_candidate).instrs.clone();
        for pid in phi_ids {
            let Some(Instr::Phi { dest, incoming }) = f.instr(pid).cloned() else { break };
            let mut remaining: Vec<(BlockId, OperandId)> = incoming.into_iter().filter(|(p, _)| *p != abort_block).collect();
            if remaining.len() == 1 {
                let (_, src) = remaining.remove(0);
                f.instrs[pid.0 as usize] = Some(Instr::Move { dest, src });
            } else {
                f.instrs[pid.0 as usize] = Some(Instr::Phi { dest, incoming: remaining });
            }
        }
        f.blocks[merge_candidate.0 as usize].preds.retain(|&p| p != abort_block);
        f.cfg_cache.invalidate();
    }
    f.rebuild_use_def_chains();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstValue, OperandType};

    /// `cond_br(x == null, abort, call) -> call -> merge { phi(call: v,
    /// abort: w) }`, with `x` proven not-null via being parameter 0.
    fn check_call_merge() -> Function {
        let mut f = Function::new("m", OperandType::Int64);
        f.param_types.push(OperandType::Pointer);
        let x = f.new_operand(OperandKind::Value, OperandType::Pointer);
        f.params.push(x);

        let entry = f.new_block("entry");
        let abort = f.new_block("abort");
        let call = f.new_block("call");
        let merge = f.new_block("merge");

        let null = f.new_operand(OperandKind::Const(ConstValue::Null), OperandType::Pointer);
        let pred = f.new_operand(OperandKind::Value, OperandType::Int8);
        f.push_instr(entry, Instr::BinCmp { dest: pred, op: BinCmpOp::Eq, lhs: x, rhs: null });
        f.push_instr(entry, Instr::CondBr { pred, then_blk: abort, else_blk: call });

        let abort_func = f.new_operand(OperandKind::Func("_dispatch_abort".to_string()), OperandType::Pointer);
        f.push_instr(abort, Instr::Call { dest: None, func: abort_func, args: vec![] });
        let w = f.new_operand(OperandKind::Const(ConstValue::Int(0)), OperandType::Int64);
        f.push_instr(abort, Instr::Br { target: merge });

        let method = f.new_operand(OperandKind::Func("A.m".to_string()), OperandType::Pointer);
        let v = f.new_operand(OperandKind::Value, OperandType::Int64);
        f.push_instr(call, Instr::Call { dest: Some(v), func: method, args: vec![x] });
        f.push_instr(call, Instr::Br { target: merge });

        let dest = f.new_operand(OperandKind::Value, OperandType::Int64);
        f.push_instr(merge, Instr::Phi { dest, incoming: vec![(call, v), (abort, w)] });
        f.push_instr(merge, Instr::Ret { value: Some(dest) });

        f
    }

    #[test]
    fn test_proven_not_null_check_collapses_to_unconditional_jump() {
        let mut f = check_call_merge();
        Nce.run(&mut f);
        let entry = BlockId(0);
        let term = *f.block(entry).instrs.last().unwrap();
        assert!(matches!(f.instr(term), Some(Instr::Br { .. })));
    }

    #[test]
    fn test_merge_phi_becomes_move_after_abort_disconnected() {
        let mut f = check_call_merge();
        Nce.run(&mut f);
        let merge = BlockId(3);
        let phi_id = f.block(merge).instrs[0];
        assert!(matches!(f.instr(phi_id), Some(Instr::Move { .. })));
    }

    #[test]
    fn test_abort_block_no_longer_a_predecessor_of_merge() {
        let mut f = check_call_merge();
        Nce.run(&mut f);
        let merge = BlockId(3);
        let abort = BlockId(1);
        assert!(!f.block(merge).preds.contains(&abort));
    }
}
