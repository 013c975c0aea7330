//! Control-flow graph (CFG) abstractions and utilities.

use crate::{Block, FuncDefBody, Value};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// Block terminator, i.e. the only way for control-flow to leave a block.
#[derive(Clone)]
pub struct ControlInst {
    pub kind: ControlInstKind,

    pub inputs: SmallVec<[Value; 2]>,

    pub targets: SmallVec<[Block; 2]>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControlInstKind {
    /// Reaching this point in the control-flow is undefined behavior, e.g.:
    /// * after a discard that is known to kill every sample
    /// * after a function call, where the function never returns
    Unreachable,

    /// Leave the current function.
    Return,

    /// Unconditional branch to a single target.
    Branch,

    /// Conditional branch on a single `bool` input, to `targets[0]` if `true`,
    /// and to `targets[1]` otherwise.
    CondBranch,
}

impl ControlInstKind {
    pub fn name(self) -> &'static str {
        match self {
            ControlInstKind::Unreachable => "unreachable",
            ControlInstKind::Return => "return",
            ControlInstKind::Branch => "branch",
            ControlInstKind::CondBranch => "branch_if",
        }
    }
}

impl ControlInst {
    pub fn ret() -> Self {
        Self {
            kind: ControlInstKind::Return,
            inputs: [].into_iter().collect(),
            targets: [].into_iter().collect(),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            kind: ControlInstKind::Unreachable,
            inputs: [].into_iter().collect(),
            targets: [].into_iter().collect(),
        }
    }

    pub fn branch(target: Block) -> Self {
        Self {
            kind: ControlInstKind::Branch,
            inputs: [].into_iter().collect(),
            targets: [target].into_iter().collect(),
        }
    }

    pub fn cond_branch(cond: Value, if_true: Block, if_false: Block) -> Self {
        Self {
            kind: ControlInstKind::CondBranch,
            inputs: [cond].into_iter().collect(),
            targets: [if_true, if_false].into_iter().collect(),
        }
    }
}

/// The control-flow graph (CFG) of a function, as successor/predecessor edges
/// between its blocks (only those reachable from the entry block, however).
#[derive(Clone, Default)]
pub struct ControlFlowGraph {
    successors: FxHashMap<Block, SmallVec<[Block; 2]>>,
    predecessors: FxHashMap<Block, SmallVec<[Block; 4]>>,

    post_order: Vec<Block>,
}

impl ControlFlowGraph {
    pub fn for_func(func_def_body: &FuncDefBody) -> Self {
        let mut cfg = Self::default();
        let Some(entry) = func_def_body.entry_block() else {
            return cfg;
        };

        // Iterative DFS, with an explicit "all successors visited" marker,
        // to produce the post-order without recursion.
        let mut visited = FxHashSet::default();
        let mut stack = vec![(entry, false)];
        while let Some((block, expanded)) = stack.pop() {
            if expanded {
                cfg.post_order.push(block);
                continue;
            }
            if !visited.insert(block) {
                continue;
            }
            stack.push((block, true));

            let targets = &func_def_body.blocks[block].terminator.targets;
            for &target in targets {
                let preds = cfg.predecessors.entry(target).or_default();
                // NOTE: `CondBranch` can target the same block twice.
                if !preds.contains(&block) {
                    preds.push(block);
                }
            }
            cfg.successors.insert(block, targets.clone());

            // Pushed in reverse so that `targets[0]` is visited first.
            for &target in targets.iter().rev() {
                if !visited.contains(&target) {
                    stack.push((target, false));
                }
            }
        }

        cfg
    }

    pub fn successors(&self, block: Block) -> &[Block] {
        self.successors.get(&block).map_or(&[], |succs| &succs[..])
    }

    pub fn predecessors(&self, block: Block) -> &[Block] {
        self.predecessors.get(&block).map_or(&[], |preds| &preds[..])
    }

    /// Iterate over all reachable blocks, in reverse post-order (RPO).
    ///
    /// RPO iteration over a CFG provides certain guarantees, most importantly
    /// that SSA definitions are visited before any of their uses.
    pub fn rev_post_order(&self) -> impl DoubleEndedIterator<Item = Block> + '_ {
        self.post_order.iter().rev().copied()
    }
}

/// Dominator tree, as the immediate dominator of every reachable block.
///
/// Computed with the iterative algorithm from "A Simple, Fast Dominance
/// Algorithm" (Cooper, Harvey, Kennedy).
#[derive(Clone, Default, PartialEq)]
pub struct Dominators {
    idom: FxHashMap<Block, Block>,
    rpo_index: FxHashMap<Block, usize>,
}

impl Dominators {
    pub fn compute(func_def_body: &FuncDefBody) -> Self {
        Self::from_cfg(&ControlFlowGraph::for_func(func_def_body))
    }

    pub fn from_cfg(cfg: &ControlFlowGraph) -> Self {
        let rpo: Vec<_> = cfg.rev_post_order().collect();
        let Some(&entry) = rpo.first() else {
            return Self::default();
        };

        let rpo_index: FxHashMap<_, _> = rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let mut idom = FxHashMap::default();
        idom.insert(entry, entry);

        let intersect = |idom: &FxHashMap<Block, Block>, mut a: Block, mut b: Block| {
            while a != b {
                while rpo_index[&a] > rpo_index[&b] {
                    a = idom[&a];
                }
                while rpo_index[&b] > rpo_index[&a] {
                    b = idom[&b];
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;

            for &block in &rpo[1..] {
                let mut processed_preds =
                    cfg.predecessors(block).iter().copied().filter(|pred| idom.contains_key(pred));

                // Every non-entry block in RPO has at least one predecessor
                // earlier in RPO, which has been processed already.
                let Some(first) = processed_preds.next() else {
                    continue;
                };
                let new_idom =
                    processed_preds.fold(first, |new_idom, pred| intersect(&idom, pred, new_idom));

                if idom.insert(block, new_idom) != Some(new_idom) {
                    changed = true;
                }
            }
        }

        // NOTE: the entry's self-loop only exists during computation.
        idom.remove(&entry);

        Self { idom, rpo_index }
    }

    pub fn is_reachable(&self, block: Block) -> bool {
        self.rpo_index.contains_key(&block)
    }

    /// Returns `None` for the entry block, and unreachable blocks.
    pub fn immediate_dominator(&self, block: Block) -> Option<Block> {
        self.idom.get(&block).copied()
    }

    /// Returns `true` iff all paths from the entry block to `b` go through `a`
    /// (including `a == b`, and vacuously whenever `b` is unreachable).
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        if a == b || !self.is_reachable(b) {
            return true;
        }
        let Some(&a_idx) = self.rpo_index.get(&a) else {
            return false;
        };

        // Dominators always precede the blocks they dominate, in RPO.
        let mut cur = b;
        while self.rpo_index[&cur] > a_idx {
            match self.idom.get(&cur) {
                Some(&idom) => cur = idom,
                None => return false,
            }
        }
        cur == a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{scalar, Context};

    #[test]
    fn diamond() {
        let cx = Context::new();
        let mut body = FuncDefBody::default();
        let [entry, then, els, merge] = [(); 4].map(|()| body.define_block(&cx));
        let cond = Value::Const(cx.intern(scalar::Const::TRUE));
        body.blocks[entry].terminator = ControlInst::cond_branch(cond, then, els);
        body.blocks[then].terminator = ControlInst::branch(merge);
        body.blocks[els].terminator = ControlInst::branch(merge);

        let cfg = ControlFlowGraph::for_func(&body);
        assert!(cfg.successors(entry) == [then, els]);
        assert_eq!(cfg.predecessors(merge).len(), 2);
        assert!(cfg.rev_post_order().next() == Some(entry));
        assert!(cfg.rev_post_order().last() == Some(merge));

        let doms = Dominators::from_cfg(&cfg);
        assert!(doms.immediate_dominator(entry).is_none());
        assert!(doms.immediate_dominator(then) == Some(entry));
        assert!(doms.immediate_dominator(merge) == Some(entry));
        assert!(doms.dominates(entry, merge));
        assert!(!doms.dominates(then, merge));
        assert!(!doms.dominates(merge, then));
    }

    #[test]
    fn loop_and_unreachable() {
        let cx = Context::new();
        let mut body = FuncDefBody::default();
        let [entry, header, latch, exit, dead] = [(); 5].map(|()| body.define_block(&cx));
        let cond = Value::Const(cx.intern(scalar::Const::FALSE));
        body.blocks[entry].terminator = ControlInst::branch(header);
        body.blocks[header].terminator = ControlInst::cond_branch(cond, latch, exit);
        body.blocks[latch].terminator = ControlInst::branch(header);
        body.blocks[dead].terminator = ControlInst::branch(exit);

        let doms = Dominators::compute(&body);
        assert!(doms.immediate_dominator(latch) == Some(header));
        assert!(doms.immediate_dominator(exit) == Some(header));
        assert!(doms.dominates(header, latch));
        assert!(!doms.dominates(latch, header));

        assert!(!doms.is_reachable(dead));
        assert!(doms.immediate_dominator(dead).is_none());
        assert!(doms.dominates(latch, dead));
        assert!(!doms.dominates(dead, exit));
    }
}
