//! Fragment-shader depth/stencil output and discard lowering, combined.
//!
//! The hardware this targets has no notion of "depth output" or "discard" as
//! separate operations: a fragment shader instead emits (at most once per
//! block) a single combined depth/stencil write, and kills samples through an
//! explicit mask. See [`super::zs_emit`] and [`super::discard`] for the two
//! halves, and [`lower_discard_zs_emit`] for running both.

use crate::{passes, Module, ShaderStage, ZsField};
use thiserror::Error;
use tracing::debug;

/// Target-specific knobs for fragment output/discard lowering.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LowerConfig {
    /// Maximum sample count of any render target, which determines the width
    /// of sample masks (all of them being broadcast to every sample, for now).
    pub max_samples: u32,
}

impl LowerConfig {
    /// Apple AGX GPUs (up to 8 samples per pixel).
    pub const AGX: Self = Self { max_samples: 8 };

    /// Sample mask covering every sample (e.g. `0xff` for 8 samples).
    #[track_caller]
    pub fn all_samples_mask(&self) -> u16 {
        let max_samples = self.max_samples;
        assert!(
            (1..=16).contains(&max_samples),
            "LowerConfig: `max_samples = {max_samples}` not in `1..=16`"
        );
        u16::MAX >> (16 - max_samples)
    }
}

impl Default for LowerConfig {
    fn default() -> Self {
        Self::AGX
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LowerError {
    #[error("function `{func}` writes {field} more than once in the same block")]
    DoubleWrite { func: String, field: ZsField },

    #[error("fragment output lowering requires a fragment shader, found {0:?} shader")]
    NotFragmentShader(ShaderStage),
}

/// Lower all depth/stencil output writes into `zs_emit`s, and then all
/// discards into `discard_samples`, in every function body of `module`.
///
/// Returns `Ok(true)` iff anything was changed. Errors leave `module` in a
/// partially lowered state, and should be treated as fatal.
pub fn lower_discard_zs_emit(
    module: &mut Module,
    config: &LowerConfig,
) -> Result<bool, LowerError> {
    let stage = module.info.stage;
    if stage != ShaderStage::Fragment {
        return Err(LowerError::NotFragmentShader(stage));
    }

    // NOTE: the order matters, as later discard lowering expects all
    // depth/stencil writes to already be in their final (merged) form.
    let zs_progress = passes::zs_emit::lower_zs_emit(module, config)?;
    let discard_progress = passes::discard::lower_discard(module, config);

    debug!(zs_progress, discard_progress, "lower_discard_zs_emit");
    Ok(zs_progress || discard_progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::InsertPoint;
    use crate::{
        scalar, Context, DataInstKind, DeclDef, FragOutputs, FragResult, FuncDecl, FuncDefBody,
        Intrinsic, ShaderInfo, Value,
    };
    use std::rc::Rc;

    #[test]
    fn sample_masks() {
        assert_eq!(LowerConfig::default().all_samples_mask(), 0xff);
        assert_eq!(LowerConfig { max_samples: 1 }.all_samples_mask(), 0x1);
        assert_eq!(LowerConfig { max_samples: 4 }.all_samples_mask(), 0xf);
        assert_eq!(LowerConfig { max_samples: 16 }.all_samples_mask(), 0xffff);
    }

    #[test]
    #[should_panic(expected = "not in `1..=16`")]
    fn too_many_samples() {
        LowerConfig { max_samples: 32 }.all_samples_mask();
    }

    // Entity allocation order reveals which pass created each instruction first.
    #[test]
    fn zs_emit_created_before_discard_samples() {
        let cx = Rc::new(Context::new());
        let mut module = Module::new(
            cx.clone(),
            ShaderInfo {
                outputs_written: FragOutputs::DEPTH,
                uses_discard: true,
                ..ShaderInfo::fragment()
            },
        );

        let mut body = FuncDefBody::default();
        let block = body.define_block(&cx);
        {
            let mut cursor = body.at_mut(InsertPoint::block_end(block));
            cursor.discard(&cx);
            let depth = Value::Const(cx.intern(scalar::Const::from_f32(0.25)));
            cursor.store_output(&cx, FragResult::Depth, depth);
        }
        let func =
            module.define_func(FuncDecl { name: cx.intern("main"), def: DeclDef::Present(body) });

        assert_eq!(lower_discard_zs_emit(&mut module, &LowerConfig::AGX), Ok(true));

        let DeclDef::Present(body) = &module.funcs[func].def else {
            unreachable!();
        };
        let find = |intrinsic_name: &str| {
            body.at(block)
                .insts()
                .find(|func_at_inst| match &func_at_inst.def().kind {
                    DataInstKind::Intrinsic(intrinsic) => intrinsic.name() == intrinsic_name,
                    DataInstKind::Alu(_) => false,
                })
                .unwrap()
                .position
        };
        let (zs_emit, discard_samples) = (find("zs_emit"), find("discard_samples"));
        assert!(zs_emit.alloc_index() < discard_samples.alloc_index());

        // Program order is still the original one, however.
        let mut kinds =
            body.at(block).insts().filter_map(|func_at_inst| match &func_at_inst.def().kind {
                DataInstKind::Intrinsic(intrinsic) => Some(intrinsic.clone()),
                DataInstKind::Alu(_) => None,
            });
        assert!(matches!(kinds.next(), Some(Intrinsic::DiscardSamples)));
        assert!(matches!(kinds.next(), Some(Intrinsic::ZsEmit { .. })));
        assert!(kinds.next().is_none());
    }

    #[test]
    fn rejects_non_fragment_shaders() {
        let cx = Rc::new(Context::new());
        let mut module =
            Module::new(cx, ShaderInfo { stage: ShaderStage::Vertex, ..ShaderInfo::fragment() });
        assert_eq!(
            lower_discard_zs_emit(&mut module, &LowerConfig::AGX),
            Err(LowerError::NotFragmentShader(ShaderStage::Vertex))
        );
    }
}
