//! Depth/stencil output writes -> one combined `zs_emit` per block.
//!
//! Every `store_output[depth]`/`store_output[stencil]` in a block is removed,
//! with its value (converted to the type the hardware expects) becoming an
//! input of a single `zs_emit`, placed where the last such store used to be
//! (values already of the expected type are used as-is):
//!
//! ```text
//! store_output[depth](v0)              v2: f32 = fconvert(v0)
//! store_output[stencil](v1)     =>     v3: u16 = uconvert(v1)
//!                                      zs_emit[depth|stencil](255u16, v2, v3)
//! ```

use crate::builder::InsertPoint;
use crate::func_at::FuncAtMut;
use crate::metadata::Metadata;
use crate::passes::discard_zs_emit::{LowerConfig, LowerError};
use crate::{
    scalar, Block, Context, DataInstKind, DeclDef, FragOutputs, Intrinsic, Module, Value, ZsField,
};
use tracing::{debug, trace};

/// Merge depth/stencil output writes into `zs_emit`s, in every function body.
///
/// Returns `Ok(true)` iff anything was changed, and fails on the first block
/// found to write depth (or stencil) more than once.
pub fn lower_zs_emit(module: &mut Module, config: &LowerConfig) -> Result<bool, LowerError> {
    if !module.info.outputs_written.intersects(FragOutputs::DEPTH | FragOutputs::STENCIL) {
        return Ok(false);
    }

    let cx = module.cx();
    let sample_mask =
        Value::Const(cx.uint_const(scalar::Type::U16, config.all_samples_mask().into()));

    let mut any_progress = false;
    for &func in &module.all_funcs {
        let func_decl = &mut module.funcs[func];
        let func_name = func_decl.name;
        let DeclDef::Present(func_def_body) = &mut func_decl.def else {
            continue;
        };

        let mut func_at = FuncAtMut {
            blocks: &mut func_def_body.blocks,
            data_insts: &mut func_def_body.data_insts,
            position: (),
        };

        let mut progress = false;
        let mut double_write = None;
        for &block in &func_def_body.all_blocks {
            match lower_zs_emit_in_block(&cx, func_at.reborrow(), block, sample_mask) {
                Ok(changed) => progress |= changed,
                Err(field) => {
                    double_write = Some(field);
                    break;
                }
            }
        }

        // NOTE: a double write is only found after the later store of the same
        // field was already merged and removed, so the body has changed either way.
        if progress || double_write.is_some() {
            debug!(func = &cx[func_name], "lower_zs_emit: changed");
            func_def_body.metadata_preserve(Metadata::BLOCK_INDEX | Metadata::DOMINANCE);
        } else {
            func_def_body.metadata_preserve(Metadata::all());
        }
        if let Some(field) = double_write {
            return Err(LowerError::DoubleWrite { func: cx[func_name].to_string(), field });
        }
        any_progress |= progress;
    }
    Ok(any_progress)
}

/// Returns `Err(field)` if `field` is written more than once in `block`.
fn lower_zs_emit_in_block(
    cx: &Context,
    mut func_at: FuncAtMut<'_, ()>,
    block: Block,
    sample_mask: Value,
) -> Result<bool, ZsField> {
    let mut merged_zs_emit = None;

    // NOTE: reverse order means `zs_emit` takes the place of the last
    // store, so that every value it uses has been computed by then.
    let mut insts = func_at.blocks[block].insts.iter();
    while let Some((store, rest)) = insts.split_last(func_at.data_insts) {
        insts = rest;

        let store_def = &func_at.data_insts[store];
        let field = match &store_def.kind {
            DataInstKind::Intrinsic(Intrinsic::StoreOutput(semantics)) => {
                match ZsField::from_output(semantics.location) {
                    Some(field) => field,
                    None => continue,
                }
            }
            _ => continue,
        };
        let value = store_def.inputs[0];

        let mut cursor = func_at.reborrow().at(InsertPoint::before(block, store));
        let converted = match field {
            ZsField::Depth => cursor.fconvert(cx, value, field.scalar_type()),
            ZsField::Stencil => cursor.uconvert(cx, value, field.scalar_type()),
        };
        let zs_emit = *merged_zs_emit.get_or_insert_with(|| {
            let undef_depth = cx.undef(cx.scalar_type(ZsField::Depth.scalar_type()));
            let undef_stencil = cx.undef(cx.scalar_type(ZsField::Stencil.scalar_type()));
            cursor.zs_emit(
                cx,
                sample_mask,
                Value::Const(undef_depth),
                Value::Const(undef_stencil),
            )
        });

        let zs_emit_def = &mut func_at.data_insts[zs_emit];
        match &mut zs_emit_def.kind {
            DataInstKind::Intrinsic(Intrinsic::ZsEmit { written }) => written.insert_once(field)?,
            _ => unreachable!(),
        }
        zs_emit_def.inputs[field.input_idx()] = converted;

        func_at.remove_data_inst(block, store);
        trace!(%field, "merged output store into zs_emit");
    }

    Ok(merged_zs_emit.is_some())
}
