//! Cached per-function analyses ("metadata"), and their invalidation.
//!
//! Passes that modify a function body declare which analyses survived their
//! changes through [`FuncDefBody::metadata_preserve`], everything else being
//! dropped (and recomputed on demand, by [`FuncDefBody::metadata_require`]).

use crate::cfg::Dominators;
use crate::{Block, DataInst, FuncDefBody};
use rustc_hash::FxHashMap;

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct Metadata: u8 {
        /// Position of every block in `FuncDefBody::all_blocks`.
        const BLOCK_INDEX = 1 << 0;

        /// Dominator tree (see [`Dominators`]).
        const DOMINANCE = 1 << 1;

        /// Position of every instruction within its block, and the block
        /// itself (i.e. the inverse of `BlockDef::insts`).
        const INST_INDEX = 1 << 2;
    }
}

#[derive(Default)]
pub(crate) struct Analyses {
    block_index: Option<FxHashMap<Block, usize>>,
    dominance: Option<Dominators>,
    inst_index: Option<FxHashMap<DataInst, (Block, usize)>>,
}

impl FuncDefBody {
    /// Which analyses are currently cached (and assumed to be up to date).
    pub fn valid_metadata(&self) -> Metadata {
        let Analyses { block_index, dominance, inst_index } = &self.analyses;
        let mut valid = Metadata::empty();
        valid.set(Metadata::BLOCK_INDEX, block_index.is_some());
        valid.set(Metadata::DOMINANCE, dominance.is_some());
        valid.set(Metadata::INST_INDEX, inst_index.is_some());
        valid
    }

    /// Compute (and cache) every analysis in `required` that isn't cached yet.
    pub fn metadata_require(&mut self, required: Metadata) {
        let missing = required - self.valid_metadata();

        if missing.contains(Metadata::BLOCK_INDEX) {
            self.analyses.block_index =
                Some(self.all_blocks.iter().enumerate().map(|(i, &block)| (block, i)).collect());
        }
        if missing.contains(Metadata::DOMINANCE) {
            self.analyses.dominance = Some(Dominators::compute(self));
        }
        if missing.contains(Metadata::INST_INDEX) {
            let mut inst_index = FxHashMap::default();
            for &block in &self.all_blocks {
                for (i, func_at_inst) in self.at(block).insts().enumerate() {
                    inst_index.insert(func_at_inst.position, (block, i));
                }
            }
            self.analyses.inst_index = Some(inst_index);
        }
    }

    /// Drop every cached analysis not in `preserved`.
    pub fn metadata_preserve(&mut self, preserved: Metadata) {
        let Analyses { block_index, dominance, inst_index } = &mut self.analyses;
        if !preserved.contains(Metadata::BLOCK_INDEX) {
            *block_index = None;
        }
        if !preserved.contains(Metadata::DOMINANCE) {
            *dominance = None;
        }
        if !preserved.contains(Metadata::INST_INDEX) {
            *inst_index = None;
        }
    }

    /// Cached dominator tree, if [`Metadata::DOMINANCE`] is valid.
    pub fn cached_dominators(&self) -> Option<&Dominators> {
        self.analyses.dominance.as_ref()
    }

    pub fn cached_block_index(&self, block: Block) -> Option<usize> {
        self.analyses.block_index.as_ref()?.get(&block).copied()
    }

    /// Block containing `inst`, and its position within that block.
    pub fn cached_inst_index(&self, inst: DataInst) -> Option<(Block, usize)> {
        self.analyses.inst_index.as_ref()?.get(&inst).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::InsertPoint;
    use crate::cfg::ControlInst;
    use crate::{scalar, Context, Value};

    #[test]
    fn require_and_preserve() {
        let cx = Context::new();
        let mut body = FuncDefBody::default();
        let [entry, exit] = [(); 2].map(|()| body.define_block(&cx));
        body.blocks[entry].terminator = ControlInst::branch(exit);

        let one = Value::Const(cx.intern(scalar::Const::from_f32(1.0)));
        let (a, b) = {
            let mut cursor = body.at_mut(InsertPoint::block_end(exit));
            let a = cursor.store_output(&cx, crate::FragResult::Data(0), one);
            let b = cursor.discard(&cx);
            (a, b)
        };

        assert_eq!(body.valid_metadata(), Metadata::empty());

        body.metadata_require(Metadata::all());
        assert_eq!(body.valid_metadata(), Metadata::all());
        assert_eq!(body.cached_block_index(exit), Some(1));
        assert!(body.cached_inst_index(b) == Some((exit, 1)));
        assert!(body.cached_inst_index(a) == Some((exit, 0)));
        assert!(body.cached_dominators().unwrap().dominates(entry, exit));

        body.metadata_preserve(Metadata::BLOCK_INDEX | Metadata::DOMINANCE);
        assert_eq!(body.valid_metadata(), Metadata::BLOCK_INDEX | Metadata::DOMINANCE);
        assert!(body.cached_inst_index(a).is_none());

        body.metadata_require(Metadata::INST_INDEX);
        assert_eq!(body.valid_metadata(), Metadata::all());

        body.metadata_preserve(Metadata::all());
        assert_eq!(body.valid_metadata(), Metadata::all());
    }
}
