//! SSA construction per function (§4.5): pruned φ-insertion at the
//! iterated dominance frontier, followed by classical Cytron renaming.
//!
//! Construction treats any operand with two or more definitions as a
//! pre-SSA "variable" — the builder is free to emit ordinary `Move`s
//! into the same operand id from different blocks (e.g. lowering a
//! `while`-loop accumulator or a reassigned `let` binding); this pass
//! is what turns that into single-assignment form with φs at the joins.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{BlockId, Function, Instr, InstrId, OperandId};

/// Runs SSA construction over every function, and on `module` because
/// callers usually want this applied module-wide right after lowering.
pub fn construct_module(module: &mut crate::ir::Module) {
    for f in module.functions.values_mut() {
        construct(f);
    }
}

pub fn construct(f: &mut Function) {
    let candidates = operands_needing_ssa(f);
    if candidates.is_empty() {
        return;
    }
    insert_phis(f, &candidates);
    rename(f, &candidates);
    f.rebuild_use_def_chains();
}

/// Step 1: gather, per operand, the set of blocks where it's defined;
/// keep only operands with two or more definitions (§4.5).
fn operands_needing_ssa(f: &Function) -> Vec<OperandId> {
    f.all_operand_ids()
        .into_iter()
        .filter(|&v| f.operand(v).defs.len() >= 2)
        .collect()
}

fn def_blocks(f: &Function, v: OperandId) -> BTreeSet<BlockId> {
    f.operand(v).defs.iter().filter_map(|&id| f.block_of(id)).collect()
}

/// Step 2: insert a φ at every block in the iterated dominance frontier
/// of `v`'s definitions, via the standard worklist (§4.5): start with
/// def-blocks, pop a block `x`, add a φ to every `y` in `DF(x)` not yet
/// seen, and push `y` if it wasn't already a def-block.
fn insert_phis(f: &mut Function, candidates: &[OperandId]) {
    let df = f.dominance_frontier();

    for &v in candidates {
        let defs = def_blocks(f, v);
        let mut has_already: BTreeSet<BlockId> = BTreeSet::new();
        let mut ever_on_worklist: BTreeSet<BlockId> = defs.clone();
        let mut worklist: Vec<BlockId> = defs.into_iter().collect();

        while let Some(x) = worklist.pop() {
            for &y in df.get(&x).into_iter().flatten() {
                if has_already.contains(&y) {
                    continue;
                }
                has_already.insert(y);

                // `dest` is the original pre-SSA variable itself, just
                // like any other def site of `v`; renaming later gives
                // it (and every other def of `v`) a fresh name.
                let preds = f.block(y).preds.clone();
                let incoming = preds.iter().map(|&p| (p, v)).collect();
                let phi = Instr::Phi { dest: v, incoming };

                let id = InstrId(f.instrs.len() as u32);
                let at = f.block(y).phi_count(&f.instrs);
                f.instrs.push(Some(phi));
                f.blocks[y.0 as usize].instrs.insert(at, id);

                if !ever_on_worklist.contains(&y) {
                    ever_on_worklist.insert(y);
                    worklist.push(y);
                }
            }
        }
    }
}

/// Classical Cytron renaming (§4.5 step 3): walk the dominator tree;
/// for each definition, push a fresh name on the per-operand stack,
/// rewrite subsequent uses in the block and φ inputs in successors to
/// the top-of-stack name, and pop on exit.
fn rename(f: &mut Function, candidates: &[OperandId]) {
    let candidate_set: BTreeSet<OperandId> = candidates.iter().copied().collect();
    let idom = f.dominators();
    let mut children: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
    for (&b, &d) in &idom {
        children.entry(d).or_default().push(b);
    }
    for kids in children.values_mut() {
        kids.sort_by_key(|b| b.0);
    }

    let mut stacks: HashMap<OperandId, Vec<OperandId>> = candidates.iter().map(|&v| (v, Vec::new())).collect();

    rename_block(f, f.entry, &candidate_set, &mut stacks, &children);
}

fn rename_block(
    f: &mut Function,
    block: BlockId,
    candidates: &BTreeSet<OperandId>,
    stacks: &mut HashMap<OperandId, Vec<OperandId>>,
    children: &BTreeMap<BlockId, Vec<BlockId>>,
) {
    let mut pushed: Vec<OperandId> = Vec::new();
    let instr_ids = f.block(block).instrs.clone();

    for id in &instr_ids {
        let Some(instr) = f.instrs[id.0 as usize].clone() else { continue };

        if let Instr::Phi { dest, .. } = &instr {
            // `dest` is still the original pre-SSA variable here;
            // `insert_phis` never renamed it.
            if candidates.contains(dest) {
                let fresh = fresh_name(f, *dest);
                stacks.entry(*dest).or_default().push(fresh);
                pushed.push(*dest);
                f.instrs[id.0 as usize] = Some(Instr::Phi {
                    dest: fresh,
                    incoming: match &instr {
                        Instr::Phi { incoming, .. } => incoming.clone(),
                        _ => unreachable!(),
                    },
                });
            }
            continue;
        }

        // Rewrite every use of a tracked variable to the current
        // top-of-stack name before considering this instruction's own def.
        let mut rewritten = instr.clone();
        for v in rewritten.uses() {
            if candidates.contains(&v) {
                if let Some(&top) = stacks[&v].last() {
                    rewritten.rewrite_use(v, top);
                }
            }
        }
        f.instrs[id.0 as usize] = Some(rewritten.clone());

        for d in rewritten.defs() {
            if candidates.contains(&d) {
                let fresh = fresh_name(f, d);
                replace_def_in_place(f, *id, d, fresh);
                stacks.entry(d).or_default().push(fresh);
                pushed.push(d);
            }
        }
    }

    // Fill in this block's contribution to every successor's φs.
    let succs = f.block(block).succs.clone();
    for succ in succs {
        let phi_ids = f.block(succ).instrs.clone();
        for pid in phi_ids {
            let Some(Instr::Phi { incoming, .. }) = f.instrs[pid.0 as usize].clone() else { break };
            let mut new_incoming = incoming.clone();
            let mut changed = false;
            for (pred, val) in new_incoming.iter_mut() {
                if *pred == block && candidates.contains(val) {
                    if let Some(&top) = stacks.get(val).and_then(|s| s.last()) {
                        *val = top;
                        changed = true;
                    }
                }
            }
            if changed {
                if let Some(Instr::Phi { dest, .. }) = &f.instrs[pid.0 as usize] {
                    let dest = *dest;
                    f.instrs[pid.0 as usize] = Some(Instr::Phi { dest, incoming: new_incoming });
                }
            }
        }
    }

    for &child in children.get(&block).into_iter().flatten() {
        rename_block(f, child, candidates, stacks, children);
    }

    for v in pushed {
        stacks.get_mut(&v).unwrap().pop();
    }
}

fn fresh_name(f: &mut Function, original: OperandId) -> OperandId {
    let ty = f.operand(original).ty;
    f.new_operand(super::OperandKind::Value, ty)
}

/// Replaces instruction `id`'s def `old` with `new` in place (used only
/// during renaming; `Function::update_use` isn't reused here because it
/// targets *use* rewriting, not def rewriting, and renaming's use-list
/// bookkeeping is handled wholesale by `rebuild_use_def_chains`).
fn replace_def_in_place(f: &mut Function, id: InstrId, old: OperandId, new: OperandId) {
    let Some(instr) = f.instrs[id.0 as usize].as_mut() else { return };
    let swap = |d: &mut OperandId| {
        if *d == old {
            *d = new;
        }
    };
    match instr {
        Instr::Phi { dest, .. } => swap(dest),
        Instr::Load { dest, .. } => swap(dest),
        Instr::Call { dest: Some(dest), .. } => swap(dest),
        Instr::BinArith { dest, .. } => swap(dest),
        Instr::BinCmp { dest, .. } => swap(dest),
        Instr::UnaryArith { dest, .. } => swap(dest),
        Instr::UnaryLogical { dest, .. } => swap(dest),
        Instr::Move { dest, .. } => swap(dest),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinArithOp, ConstValue, Instr, OperandKind, OperandType};

    /// `let x = 0; if p { x = 1 } else { x = 2 }; use(x)` — classic
    /// diamond requiring one φ at the join.
    fn diamond_with_reassignment() -> (Function, OperandId) {
        let mut f = Function::new("f", OperandType::Int64);
        let entry = f.new_block("entry");
        let left = f.new_block("left");
        let right = f.new_block("right");
        let join = f.new_block("join");

        let x = f.new_operand(OperandKind::Value, OperandType::Int64);
        let zero = f.new_operand(OperandKind::Const(ConstValue::Int(0)), OperandType::Int64);
        let one = f.new_operand(OperandKind::Const(ConstValue::Int(1)), OperandType::Int64);
        let two = f.new_operand(OperandKind::Const(ConstValue::Int(2)), OperandType::Int64);
        let pred = f.new_operand(OperandKind::Const(ConstValue::Bool(true)), OperandType::Int8);

        f.push_instr(entry, Instr::Move { dest: x, src: zero });
        f.push_instr(entry, Instr::CondBr { pred, then_blk: left, else_blk: right });
        f.push_instr(left, Instr::Move { dest: x, src: one });
        f.push_instr(left, Instr::Br { target: join });
        f.push_instr(right, Instr::Move { dest: x, src: two });
        f.push_instr(right, Instr::Br { target: join });
        let sum_dest = f.new_operand(OperandKind::Value, OperandType::Int64);
        f.push_instr(join, Instr::BinArith { dest: sum_dest, op: BinArithOp::Add, lhs: x, rhs: x });
        f.push_instr(join, Instr::Ret { value: Some(sum_dest) });

        (f, x)
    }

    #[test]
    fn test_inserts_phi_at_join() {
        let (mut f, _x) = diamond_with_reassignment();
        construct(&mut f);
        let join = BlockId(3);
        let has_phi = f.block(join).instrs.iter().any(|id| matches!(f.instr(*id), Some(Instr::Phi { .. })));
        assert!(has_phi, "expected a phi at the join block");
    }

    #[test]
    fn test_every_operand_has_at_most_one_def_except_via_phi() {
        let (mut f, _x) = diamond_with_reassignment();
        construct(&mut f);
        for id in f.all_operand_ids() {
            let defs = &f.operand(id).defs;
            if defs.len() <= 1 {
                continue;
            }
            // more than one def is only legal if every def site is a phi
            for d in defs {
                assert!(matches!(f.instr(*d), Some(Instr::Phi { .. })));
            }
        }
    }

    #[test]
    fn test_uses_dominated_by_defs_after_construction() {
        let (mut f, _x) = diamond_with_reassignment();
        construct(&mut f);
        for id in f.all_operand_ids() {
            let op = f.operand(id);
            if op.is_const() {
                continue;
            }
            let Some(&def_instr) = op.defs.first() else { continue };
            let Some(def_block) = f.block_of(def_instr) else { continue };
            for &use_instr in &op.uses {
                if matches!(f.instr(use_instr), Some(Instr::Phi { .. })) {
                    continue; // phi uses are checked per-incoming-edge, not block-dominance
                }
                let Some(use_block) = f.block_of(use_instr) else { continue };
                assert!(
                    f.dominates(def_block, use_block) || def_block == use_block,
                    "def block {:?} must dominate use block {:?}",
                    def_block,
                    use_block
                );
            }
        }
    }

    #[test]
    fn test_phi_operand_count_matches_predecessors() {
        let (mut f, _x) = diamond_with_reassignment();
        construct(&mut f);
        let join = BlockId(3);
        for id in f.block(join).instrs.clone() {
            if let Some(Instr::Phi { incoming, .. }) = f.instr(id) {
                assert_eq!(incoming.len(), f.block(join).preds.len());
            }
        }
    }
}
