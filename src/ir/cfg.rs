//! CFG analyses (§4.5): post-order/reverse-post-order traversal,
//! dominance (iterative intersection), and dominance frontiers. Cached
//! on [`Function`] and invalidated by any structural mutation
//! (`Function::new_block`/`push_instr`/`connect`/`block_mut` all call
//! `CfgCache::invalidate`).
//!
//! The block graph's adjacency is exactly `BasicBlock::{preds,succs}`;
//! `petgraph` is used as the traversal substrate for post-order so the
//! dominance algorithm below only has to reason about post-order numbers,
//! not raw adjacency lists.

use std::collections::{BTreeMap, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;

use super::{BlockId, Function};

#[derive(Default)]
pub struct CfgCache {
    post_order: Option<Vec<BlockId>>,
    idom: Option<BTreeMap<BlockId, BlockId>>,
    dom_frontier: Option<BTreeMap<BlockId, Vec<BlockId>>>,
}

impl CfgCache {
    pub fn invalidate(&mut self) {
        self.post_order = None;
        self.idom = None;
        self.dom_frontier = None;
    }
}

impl Function {
    /// Post-order traversal of the reachable block graph from `entry`.
    pub fn post_order(&mut self) -> Vec<BlockId> {
        if let Some(po) = &self.cfg_cache.post_order {
            return po.clone();
        }
        let po = compute_post_order(self);
        self.cfg_cache.post_order = Some(po.clone());
        po
    }

    /// Reverse post-order — the canonical traversal order between passes
    /// (§5 "Ordering guarantees").
    pub fn reverse_post_order(&mut self) -> Vec<BlockId> {
        let mut po = self.post_order();
        po.reverse();
        po
    }

    /// Immediate-dominator map, entry excluded (entry dominates itself
    /// trivially and has no idom).
    pub fn dominators(&mut self) -> BTreeMap<BlockId, BlockId> {
        if let Some(idom) = &self.cfg_cache.idom {
            return idom.clone();
        }
        let idom = compute_dominators(self);
        self.cfg_cache.idom = Some(idom.clone());
        idom
    }

    /// Dominance frontier for every block.
    pub fn dominance_frontier(&mut self) -> BTreeMap<BlockId, Vec<BlockId>> {
        if let Some(df) = &self.cfg_cache.dom_frontier {
            return df.clone();
        }
        let idom = self.dominators();
        let df = compute_dominance_frontier(self, &idom);
        self.cfg_cache.dom_frontier = Some(df.clone());
        df
    }

    pub fn dominates(&mut self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let idom = self.dominators();
        let mut cur = b;
        while let Some(&p) = idom.get(&cur) {
            if p == a {
                return true;
            }
            if p == cur {
                break;
            }
            cur = p;
        }
        false
    }
}

fn compute_post_order(f: &Function) -> Vec<BlockId> {
    let mut graph: DiGraph<BlockId, ()> = DiGraph::new();
    let mut node_of: HashMap<BlockId, NodeIndex> = HashMap::new();
    for b in &f.blocks {
        node_of.insert(b.id, graph.add_node(b.id));
    }
    for b in &f.blocks {
        for &s in &b.succs {
            graph.add_edge(node_of[&b.id], node_of[&s], ());
        }
    }
    let start = node_of[&f.entry];
    let mut dfs = DfsPostOrder::new(&graph, start);
    let mut order = Vec::new();
    while let Some(n) = dfs.next(&graph) {
        order.push(graph[n]);
    }
    order
}

/// Iterative dominance via post-order-number intersection (Cooper,
/// Harvey, Kennedy). `intersect` walks both fingers toward lower
/// post-order numbers through the current `idom` map until they meet
/// (§4.5).
fn compute_dominators(f: &mut Function) -> BTreeMap<BlockId, BlockId> {
    let rpo = f.reverse_post_order();
    if rpo.is_empty() {
        return BTreeMap::new();
    }
    let entry = rpo[0];
    let post_order_num: HashMap<BlockId, usize> =
        rpo.iter().enumerate().map(|(i, &b)| (b, rpo.len() - i)).collect();

    let mut idom: HashMap<BlockId, Option<BlockId>> = HashMap::new();
    idom.insert(entry, Some(entry));

    let intersect = |idom: &HashMap<BlockId, Option<BlockId>>, mut b1: BlockId, mut b2: BlockId| -> BlockId {
        while b1 != b2 {
            while post_order_num[&b1] < post_order_num[&b2] {
                b1 = idom[&b1].unwrap();
            }
            while post_order_num[&b2] < post_order_num[&b1] {
                b2 = idom[&b2].unwrap();
            }
        }
        b1
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter().skip(1) {
            let preds: Vec<BlockId> = f.block(b).preds.iter().copied().filter(|p| idom.get(p).map(|o| o.is_some()).unwrap_or(false)).collect();
            let Some(&first) = preds.first() else { continue };
            let mut new_idom = first;
            for &p in preds.iter().skip(1) {
                new_idom = intersect(&idom, new_idom, p);
            }
            if idom.get(&b).copied().flatten() != Some(new_idom) {
                idom.insert(b, Some(new_idom));
                changed = true;
            }
        }
    }

    idom.into_iter()
        .filter_map(|(b, d)| if b == entry { None } else { d.map(|d| (b, d)) })
        .collect()
}

/// For every join node (≥2 predecessors) and every predecessor `p`, walk
/// `p -> idom(p) -> ...` up to (not including) `idom(join)`, adding
/// `join` to each walked node's DF (§4.5).
fn compute_dominance_frontier(f: &Function, idom: &BTreeMap<BlockId, BlockId>) -> BTreeMap<BlockId, Vec<BlockId>> {
    let mut df: BTreeMap<BlockId, Vec<BlockId>> = f.blocks.iter().map(|b| (b.id, Vec::new())).collect();
    for b in &f.blocks {
        if b.preds.len() < 2 {
            continue;
        }
        for &p in &b.preds {
            let mut runner = p;
            while Some(&runner) != idom.get(&b.id) {
                let entry = df.entry(runner).or_default();
                if !entry.contains(&b.id) {
                    entry.push(b.id);
                }
                match idom.get(&runner) {
                    Some(&next) if next != runner => runner = next,
                    _ => break,
                }
            }
        }
    }
    df
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstValue, Instr, OperandKind, OperandType};

    /// Builds the diamond `entry -> {left, right} -> join`.
    fn diamond() -> Function {
        let mut f = Function::new("f", OperandType::Void);
        let entry = f.new_block("entry");
        let left = f.new_block("left");
        let right = f.new_block("right");
        let join = f.new_block("join");
        let pred = f.new_operand(OperandKind::Const(ConstValue::Bool(true)), OperandType::Int8);
        f.push_instr(entry, Instr::CondBr { pred, then_blk: left, else_blk: right });
        f.push_instr(left, Instr::Br { target: join });
        f.push_instr(right, Instr::Br { target: join });
        f.push_instr(join, Instr::Ret { value: None });
        f
    }

    #[test]
    fn test_post_order_visits_entry_last() {
        let mut f = diamond();
        let po = f.post_order();
        assert_eq!(*po.last().unwrap(), f.entry);
    }

    #[test]
    fn test_dominance_diamond() {
        let mut f = diamond();
        let entry = f.entry;
        let left = BlockId(1);
        let right = BlockId(2);
        let join = BlockId(3);
        let idom = f.dominators();
        assert_eq!(idom[&left], entry);
        assert_eq!(idom[&right], entry);
        assert_eq!(idom[&join], entry);
    }

    #[test]
    fn test_dominance_frontier_join_point() {
        let mut f = diamond();
        let left = BlockId(1);
        let right = BlockId(2);
        let join = BlockId(3);
        let df = f.dominance_frontier();
        assert_eq!(df[&left], vec![join]);
        assert_eq!(df[&right], vec![join]);
        assert!(df[&join].is_empty());
    }

    #[test]
    fn test_dominates_is_reflexive_and_transitive_on_diamond() {
        let mut f = diamond();
        let entry = f.entry;
        let join = BlockId(3);
        assert!(f.dominates(entry, join));
        assert!(f.dominates(join, join));
        assert!(!f.dominates(join, entry));
    }

    #[test]
    fn test_every_edge_idom_dominates_predecessor() {
        // §8: for every edge u->v (u != entry), idom(v) dominates u.
        let mut f = diamond();
        let entry = f.entry;
        let idom = f.dominators();
        for b in f.blocks.clone() {
            for succ in b.succs {
                if succ == entry {
                    continue;
                }
                let d = idom[&succ];
                assert!(f.dominates(d, b.id), "idom({:?})={:?} must dominate {:?}", succ, d, b.id);
            }
        }
    }
}
