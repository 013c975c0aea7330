//! Traversal helpers for intra-function entities.
//!
//! `FuncAt<P>`/`FuncAtMut<P>` are like `(&FuncDefBody, P)`/`(&mut FuncDefBody, P`)
//! (where `P` is some type describing a "position" in the function), except:
//! * they only borrow the `EntityDefs` fields of `FuncDefBody`
//!   * this can prevent borrow conflicts, especially when mutating other fields
//!   * it also avoids accidentally accessing parts of the function definition
//!     without going through `P` (as `EntityDefs` requires keys for any access)
//! * they're dedicated types with inherent methods and trait `impl`s

use crate::{
    Block, BlockDef, ConstKind, Context, DataInst, DataInstDef, EntityDefs, EntityListIter,
    FuncDefBody, Type, Value,
};

/// Immutable traversal (i.e. visiting) helper for intra-function entities.
///
/// The point/position type `P` should be an entity or a shallow entity wrapper
/// (e.g. `EntityListIter<DataInst>` or `builder::InsertPoint`).
#[derive(Copy, Clone)]
pub struct FuncAt<'a, P: Copy> {
    pub blocks: &'a EntityDefs<Block>,
    pub data_insts: &'a EntityDefs<DataInst>,

    pub position: P,
}

impl<'a, P: Copy> FuncAt<'a, P> {
    /// Reposition to `new_position`.
    pub fn at<P2: Copy>(self, new_position: P2) -> FuncAt<'a, P2> {
        FuncAt { blocks: self.blocks, data_insts: self.data_insts, position: new_position }
    }
}

impl<'a> FuncAt<'a, Block> {
    pub fn def(self) -> &'a BlockDef {
        &self.blocks[self.position]
    }

    /// Iterate the instructions of this block, in program order
    /// (or in reverse, through `DoubleEndedIterator`).
    pub fn insts(self) -> FuncAt<'a, EntityListIter<DataInst>> {
        self.at(self.def().insts.iter())
    }
}

impl<'a> Iterator for FuncAt<'a, EntityListIter<DataInst>> {
    type Item = FuncAt<'a, DataInst>;
    fn next(&mut self) -> Option<Self::Item> {
        let (next, rest) = self.position.split_first(self.data_insts)?;
        self.position = rest;
        Some(self.at(next))
    }
}

impl DoubleEndedIterator for FuncAt<'_, EntityListIter<DataInst>> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let (prev, rest) = self.position.split_last(self.data_insts)?;
        self.position = rest;
        Some(self.at(prev))
    }
}

impl<'a> FuncAt<'a, DataInst> {
    pub fn def(self) -> &'a DataInstDef {
        &self.data_insts[self.position]
    }
}

impl FuncAt<'_, Value> {
    /// Return the [`Type`] of this [`Value`] ([`Context`] used for consts).
    ///
    /// Panics for outputs of instructions without an `output_type`, which
    /// can't be used as values in the first place.
    #[track_caller]
    pub fn type_of(self, cx: &Context) -> Type {
        match self.position {
            Value::Const(ct) => cx[ct].ty,
            Value::DataInstOutput(inst) => self.at(inst).def().output_type.unwrap_or_else(|| {
                unreachable!("using the output of an instruction without an output type")
            }),
        }
    }

    /// Returns `true` iff this [`Value`] is an `undef` constant.
    pub fn is_undef(self, cx: &Context) -> bool {
        match self.position {
            Value::Const(ct) => matches!(cx[ct].kind, ConstKind::Undef),
            Value::DataInstOutput(_) => false,
        }
    }
}

/// Mutable traversal (i.e. transforming) helper for intra-function entities.
///
/// The point/position type `P` should be an entity or a shallow entity wrapper
/// (e.g. `EntityListIter<DataInst>` or `builder::InsertPoint`).
pub struct FuncAtMut<'a, P: Copy> {
    pub blocks: &'a mut EntityDefs<Block>,
    pub data_insts: &'a mut EntityDefs<DataInst>,

    pub position: P,
}

impl<'a, P: Copy> FuncAtMut<'a, P> {
    /// Emulate a "reborrow", which is automatic only for `&mut` types.
    pub fn reborrow(&mut self) -> FuncAtMut<'_, P> {
        FuncAtMut { blocks: self.blocks, data_insts: self.data_insts, position: self.position }
    }

    /// Reposition to `new_position`.
    pub fn at<P2: Copy>(self, new_position: P2) -> FuncAtMut<'a, P2> {
        FuncAtMut { blocks: self.blocks, data_insts: self.data_insts, position: new_position }
    }

    /// Demote to a `FuncAt`, with the same `position`.
    //
    // FIXME: maybe find a better name for this?
    pub fn freeze(self) -> FuncAt<'a, P> {
        let FuncAtMut { blocks, data_insts, position } = self;
        FuncAt { blocks: &*blocks, data_insts: &*data_insts, position }
    }
}

impl<'a> FuncAtMut<'a, Block> {
    pub fn def(self) -> &'a mut BlockDef {
        &mut self.blocks[self.position]
    }
}

impl<'a> FuncAtMut<'a, DataInst> {
    pub fn def(self) -> &'a mut DataInstDef {
        &mut self.data_insts[self.position]
    }
}

impl FuncAtMut<'_, ()> {
    /// Unlink `inst` from `block`, and destroy its definition (which is returned).
    ///
    /// Any remaining uses of the output of `inst` will be left dangling.
    #[track_caller]
    pub fn remove_data_inst(&mut self, block: Block, inst: DataInst) -> DataInstDef {
        self.blocks[block].insts.remove(inst, self.data_insts);
        self.data_insts.remove(inst).into_inner_def()
    }
}

impl FuncDefBody {
    /// Start immutably traversing the function at `position`.
    pub fn at<P: Copy>(&self, position: P) -> FuncAt<'_, P> {
        FuncAt { blocks: &self.blocks, data_insts: &self.data_insts, position }
    }

    /// Start mutably traversing the function at `position`.
    pub fn at_mut<P: Copy>(&mut self, position: P) -> FuncAtMut<'_, P> {
        FuncAtMut { blocks: &mut self.blocks, data_insts: &mut self.data_insts, position }
    }
}
