//! Dead-instruction elimination (§4.6): for every instruction in reverse
//! post-order, if it is not a store and not a call, and its def has no
//! uses, erase it. Calls and stores are conservatively side-effecting.
//!
//! §8 "Pass stability": DIE must never increase the instruction count.

use super::Pass;
use crate::ir::Function;

pub struct Die;

impl Pass for Die {
    fn name(&self) -> &'static str {
        "DIE"
    }

    fn run(&self, f: &mut Function) {
        // Repeats to a fixed point: erasing an instruction can drop the
        // last use of one of its own operands' *other* defining
        // instructions, e.g. `%a = add %b, %c; %x = add %a, 1` — erasing
        // the second instruction (dead) makes the first dead too.
        loop {
            let order = f.reverse_post_order();
            let mut changed = false;
            for block in order {
                let ids = f.block(block).instrs.clone();
                for id in ids {
                    let Some(instr) = f.instr(id) else { continue };
                    if instr.is_store() || instr.is_call() {
                        continue;
                    }
                    let defs = instr.defs();
                    if defs.is_empty() {
                        continue;
                    }
                    if defs.iter().all(|d| f.operand(*d).uses.is_empty()) {
                        f.erase_instr(block, id);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }
}
