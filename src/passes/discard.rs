//! `discard`/`discard_if` -> `discard_samples` (with an explicit kill mask).

use crate::builder::InsertPoint;
use crate::metadata::Metadata;
use crate::passes::discard_zs_emit::LowerConfig;
use crate::{scalar, transform, DataInstKind, Intrinsic, Module, Value};
use tracing::trace;

/// Replace every `discard` with `discard_samples(all_samples)`, and every
/// `discard_if(c)` with `discard_samples(select(c, all_samples, 0))`.
///
/// Returns `true` iff anything was changed.
pub fn lower_discard(module: &mut Module, config: &LowerConfig) -> bool {
    if !module.info.uses_discard {
        return false;
    }

    let cx = module.cx();
    let all_samples = cx.uint_const(scalar::Type::U16, config.all_samples_mask().into());
    let no_samples = cx.uint_const(scalar::Type::U16, 0);

    transform::instructions_pass(
        module,
        "lower_discard",
        Metadata::BLOCK_INDEX | Metadata::DOMINANCE,
        |cx, mut func_at, block, inst| {
            let inst_def = &func_at.data_insts[inst];
            let cond = match inst_def.kind {
                DataInstKind::Intrinsic(Intrinsic::Discard) => None,
                DataInstKind::Intrinsic(Intrinsic::DiscardIf) => Some(inst_def.inputs[0]),
                _ => return false,
            };

            let mut cursor = func_at.reborrow().at(InsertPoint::before(block, inst));
            let kill_mask = match cond {
                None => Value::Const(all_samples),
                Some(cond) => cursor.select(
                    cx,
                    cond,
                    Value::Const(all_samples),
                    Value::Const(no_samples),
                ),
            };
            cursor.discard_samples(cx, kill_mask);

            func_at.remove_data_inst(block, inst);
            trace!(conditional = cond.is_some(), "lowered discard");
            true
        },
    )
}
