//! Mutable IR traversal.

use crate::func_at::FuncAtMut;
use crate::metadata::Metadata;
use crate::{Block, Context, DataInst, DeclDef, Module};
use tracing::debug;

/// Call `per_inst` on every instruction of every function body in `module`,
/// in program order (per block, following `FuncDefBody::all_blocks`).
///
/// `per_inst` may insert new instructions anywhere in the block (which won't
/// be visited), and remove the current instruction, but not any other one.
///
/// It returns whether it changed anything, which is aggregated per function:
/// functions with changes keep only the `preserved` metadata, while the rest
/// keep everything (see [`crate::FuncDefBody::metadata_preserve`]).
///
/// Returns `true` iff any `per_inst` call did.
pub fn instructions_pass(
    module: &mut Module,
    pass_name: &str,
    preserved: Metadata,
    mut per_inst: impl FnMut(&Context, FuncAtMut<'_, ()>, Block, DataInst) -> bool,
) -> bool {
    let cx = module.cx();
    let mut any_progress = false;
    for &func in &module.all_funcs {
        let func_decl = &mut module.funcs[func];
        let DeclDef::Present(func_def_body) = &mut func_decl.def else {
            continue;
        };

        let mut func_at = FuncAtMut {
            blocks: &mut func_def_body.blocks,
            data_insts: &mut func_def_body.data_insts,
            position: (),
        };

        let mut progress = false;
        for &block in &func_def_body.all_blocks {
            let mut insts = func_at.blocks[block].insts.iter();
            while let Some((inst, rest)) = insts.split_first(func_at.data_insts) {
                insts = rest;
                progress |= per_inst(&cx, func_at.reborrow(), block, inst);
            }
        }

        if progress {
            debug!(pass = pass_name, func = &cx[func_decl.name], "changed");
        }
        func_def_body.metadata_preserve(if progress { preserved } else { Metadata::all() });
        any_progress |= progress;
    }
    any_progress
}
