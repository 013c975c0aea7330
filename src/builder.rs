//! Instruction building, through an insertion cursor into a block.
//!
//! ```ignore
//! let mut cursor = func_def_body.at_mut(InsertPoint::before(block, store));
//! let depth = cursor.fconvert(cx, value, scalar::Type::F32);
//! ```

use crate::func_at::FuncAtMut;
use crate::{
    scalar, AluOp, Block, Context, DataInst, DataInstDef, DataInstKind, Intrinsic, IoSemantics,
    Type, Value, ZsFields,
};

#[derive(Copy, Clone)]
pub struct InsertPoint {
    pub block: Block,
    pub anchor: InsertAnchor,
}

#[derive(Copy, Clone)]
pub enum InsertAnchor {
    /// Inserts each new `inst` after the existing one, then becomes `After(inst)`
    /// (in order to preserve the relative order of multiple inserted insts).
    After(DataInst),

    /// Inserts each new inst before the existing one, without any updates
    /// (the relative order of multiple inserted insts is inherently preserved).
    Before(DataInst),

    /// Inserts each new inst at the end of the block, without any updates
    /// (the relative order of multiple inserted insts is inherently preserved).
    Last,
}

impl InsertPoint {
    pub fn block_end(block: Block) -> Self {
        Self { block, anchor: InsertAnchor::Last }
    }

    pub fn before(block: Block, inst: DataInst) -> Self {
        Self { block, anchor: InsertAnchor::Before(inst) }
    }

    pub fn after(block: Block, inst: DataInst) -> Self {
        Self { block, anchor: InsertAnchor::After(inst) }
    }
}

// FIXME: consider moving `Context` into a field of `FuncAt`, or even
// keep an `Rc<Context>` in each `EntityDefs` map?
impl FuncAtMut<'_, InsertPoint> {
    pub fn insert_data_inst(&mut self, cx: &Context, def: DataInstDef) -> DataInst {
        let InsertPoint { block, anchor } = &mut self.position;
        let inst = self.data_insts.define(cx, def.into());
        let insts = &mut self.blocks[*block].insts;
        match *anchor {
            InsertAnchor::After(prev) => {
                insts.insert_after(inst, prev, self.data_insts);
                *anchor = InsertAnchor::After(inst);
            }
            InsertAnchor::Before(next) => insts.insert_before(inst, next, self.data_insts),
            InsertAnchor::Last => insts.insert_last(inst, self.data_insts),
        }
        inst
    }

    fn type_of(&mut self, cx: &Context, v: Value) -> Type {
        self.reborrow().freeze().at(v).type_of(cx)
    }

    pub fn alu(
        &mut self,
        cx: &Context,
        op: AluOp,
        inputs: impl IntoIterator<Item = Value>,
        output_type: Type,
    ) -> Value {
        let inst = self.insert_data_inst(
            cx,
            DataInstDef {
                kind: op.into(),
                inputs: inputs.into_iter().collect(),
                output_type: Some(output_type),
            },
        );
        Value::DataInstOutput(inst)
    }

    fn intrinsic(
        &mut self,
        cx: &Context,
        intrinsic: Intrinsic,
        inputs: impl IntoIterator<Item = Value>,
        output_type: Option<Type>,
    ) -> DataInst {
        self.insert_data_inst(
            cx,
            DataInstDef {
                kind: DataInstKind::Intrinsic(intrinsic),
                inputs: inputs.into_iter().collect(),
                output_type,
            },
        )
    }

    /// Convert the float `v` to the float type `to`, or return `v` unchanged
    /// if it's already of type `to` (no instruction is inserted in that case).
    #[track_caller]
    pub fn fconvert(&mut self, cx: &Context, v: Value, to: scalar::Type) -> Value {
        assert!(to.is_float(), "fconvert: `{to}` is not a float type");
        let to = cx.scalar_type(to);
        if self.type_of(cx, v) == to {
            return v;
        }
        self.alu(cx, AluOp::FConvert, [v], to)
    }

    /// Convert the integer `v` (of either signedness, as only its bits matter)
    /// to the unsigned integer type `to`, or return `v` unchanged if it's
    /// already of type `to`.
    #[track_caller]
    pub fn uconvert(&mut self, cx: &Context, v: Value, to: scalar::Type) -> Value {
        assert!(matches!(to, scalar::Type::UInt(_)), "uconvert: `{to}` is not unsigned");
        let to = cx.scalar_type(to);
        if self.type_of(cx, v) == to {
            return v;
        }
        self.alu(cx, AluOp::UConvert, [v], to)
    }

    pub fn select(&mut self, cx: &Context, cond: Value, if_true: Value, if_false: Value) -> Value {
        let ty = self.type_of(cx, if_true);
        self.alu(cx, AluOp::Select, [cond, if_true, if_false], ty)
    }

    pub fn fadd(&mut self, cx: &Context, a: Value, b: Value) -> Value {
        let ty = self.type_of(cx, a);
        self.alu(cx, AluOp::FAdd, [a, b], ty)
    }

    pub fn fmul(&mut self, cx: &Context, a: Value, b: Value) -> Value {
        let ty = self.type_of(cx, a);
        self.alu(cx, AluOp::FMul, [a, b], ty)
    }

    pub fn flt(&mut self, cx: &Context, a: Value, b: Value) -> Value {
        self.alu(cx, AluOp::FLt, [a, b], cx.scalar_type(scalar::Type::Bool))
    }

    pub fn ieq(&mut self, cx: &Context, a: Value, b: Value) -> Value {
        self.alu(cx, AluOp::IEq, [a, b], cx.scalar_type(scalar::Type::Bool))
    }

    pub fn load_input(&mut self, cx: &Context, location: u32, ty: Type) -> Value {
        Value::DataInstOutput(self.intrinsic(cx, Intrinsic::LoadInput { location }, [], Some(ty)))
    }

    pub fn store_output(
        &mut self,
        cx: &Context,
        semantics: impl Into<IoSemantics>,
        v: Value,
    ) -> DataInst {
        self.intrinsic(cx, Intrinsic::StoreOutput(semantics.into()), [v], None)
    }

    pub fn discard(&mut self, cx: &Context) -> DataInst {
        self.intrinsic(cx, Intrinsic::Discard, [], None)
    }

    pub fn discard_if(&mut self, cx: &Context, cond: Value) -> DataInst {
        self.intrinsic(cx, Intrinsic::DiscardIf, [cond], None)
    }

    /// Combined depth/stencil write, initially with neither field marked as
    /// written (see [`ZsFields::insert_once`]).
    pub fn zs_emit(
        &mut self,
        cx: &Context,
        sample_mask: Value,
        depth: Value,
        stencil: Value,
    ) -> DataInst {
        self.intrinsic(
            cx,
            Intrinsic::ZsEmit { written: ZsFields::empty() },
            [sample_mask, depth, stencil],
            None,
        )
    }

    pub fn discard_samples(&mut self, cx: &Context, mask: Value) -> DataInst {
        self.intrinsic(cx, Intrinsic::DiscardSamples, [mask], None)
    }
}
