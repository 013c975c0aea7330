//! IR well-formedness checks (SSA dominance, operand counts and types).
//!
//! Meant to be run after passes (e.g. in tests, or debug builds of a compiler
//! using this crate), as nothing else in this crate validates its inputs.

use crate::cfg::{ControlInstKind, Dominators};
use crate::{
    scalar, AluOp, Block, Context, DataInst, DataInstKind, DeclDef, FuncDefBody, Intrinsic,
    Module, Type, Value,
};
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("function `{func}`, block b{block_idx}: {kind}")]
pub struct ValidationError {
    pub func: String,

    /// Position of the offending block in `FuncDefBody::all_blocks`.
    pub block_idx: usize,

    pub kind: ValidationErrorKind,
}

/// What went wrong, with `user` being the name of the instruction (or terminator).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationErrorKind {
    #[error("`{user}` input #{input_idx} uses an instruction not found in any block")]
    DanglingUse { user: &'static str, input_idx: usize },

    #[error("`{user}` input #{input_idx} uses an instruction defined after it")]
    UseBeforeDef { user: &'static str, input_idx: usize },

    #[error("`{user}` input #{input_idx} is defined in b{def_block_idx}, not dominating its use")]
    DefDoesNotDominateUse { user: &'static str, input_idx: usize, def_block_idx: usize },

    #[error("`{user}` expects {expected} inputs, found {found}")]
    InputCount { user: &'static str, expected: usize, found: usize },

    #[error("`{user}` input #{input_idx} should have type `{expected}`, found `{found}`")]
    InputType { user: &'static str, input_idx: usize, expected: String, found: String },
}

pub fn validate_module(module: &Module) -> Result<(), ValidationError> {
    let cx = module.cx_ref();
    for &func in &module.all_funcs {
        let func_decl = &module.funcs[func];
        if let DeclDef::Present(func_def_body) = &func_decl.def {
            Validator::new(cx, func_def_body).validate().map_err(|(block_idx, kind)| {
                ValidationError { func: cx[func_decl.name].to_string(), block_idx, kind }
            })?;
        }
    }
    Ok(())
}

/// Expected type of an input, relative to the other inputs (or the output).
#[derive(Copy, Clone)]
enum Expected {
    Any,
    Exactly(scalar::Type),
    AnyFloat,
    AnyInt,
    SameAsOutput,
}

fn expected_inst_inputs(kind: &DataInstKind) -> &'static [Expected] {
    match kind {
        DataInstKind::Alu(op) => match op {
            AluOp::FConvert => &[Expected::AnyFloat],
            AluOp::UConvert => &[Expected::AnyInt],
            AluOp::Select => &[
                Expected::Exactly(scalar::Type::Bool),
                Expected::SameAsOutput,
                Expected::SameAsOutput,
            ],
            AluOp::FAdd | AluOp::FMul => &[Expected::SameAsOutput, Expected::SameAsOutput],
            AluOp::FLt => &[Expected::AnyFloat, Expected::AnyFloat],
            AluOp::IEq => &[Expected::Any, Expected::Any],
        },
        DataInstKind::Intrinsic(intrinsic) => match intrinsic {
            Intrinsic::LoadInput { .. } | Intrinsic::Discard => &[],
            Intrinsic::StoreOutput(_) => &[Expected::Any],
            Intrinsic::DiscardIf => &[Expected::Exactly(scalar::Type::Bool)],
            Intrinsic::ZsEmit { .. } => &[
                Expected::Exactly(scalar::Type::U16),
                Expected::Exactly(scalar::Type::F32),
                Expected::Exactly(scalar::Type::U16),
            ],
            Intrinsic::DiscardSamples => &[Expected::Exactly(scalar::Type::U16)],
        },
    }
}

fn expected_terminator_inputs(kind: ControlInstKind) -> &'static [Expected] {
    match kind {
        ControlInstKind::Unreachable | ControlInstKind::Return | ControlInstKind::Branch => &[],
        ControlInstKind::CondBranch => &[Expected::Exactly(scalar::Type::Bool)],
    }
}

struct Validator<'a> {
    cx: &'a Context,
    func_def_body: &'a FuncDefBody,

    dominators: Dominators,

    /// Block (index) and position within that block, for every linked instruction.
    def_sites: FxHashMap<DataInst, (usize, usize)>,
}

impl<'a> Validator<'a> {
    fn new(cx: &'a Context, func_def_body: &'a FuncDefBody) -> Self {
        let mut def_sites = FxHashMap::default();
        for (block_idx, &block) in func_def_body.all_blocks.iter().enumerate() {
            for (inst_idx, func_at_inst) in func_def_body.at(block).insts().enumerate() {
                def_sites.insert(func_at_inst.position, (block_idx, inst_idx));
            }
        }
        Self { cx, func_def_body, dominators: Dominators::compute(func_def_body), def_sites }
    }

    fn validate(&self) -> Result<(), (usize, ValidationErrorKind)> {
        for (block_idx, &block) in self.func_def_body.all_blocks.iter().enumerate() {
            self.validate_block(block_idx, block).map_err(|kind| (block_idx, kind))?;
        }
        Ok(())
    }

    fn validate_block(&self, block_idx: usize, block: Block) -> Result<(), ValidationErrorKind> {
        let mut inst_count = 0;
        for (inst_idx, func_at_inst) in self.func_def_body.at(block).insts().enumerate() {
            let inst_def = func_at_inst.def();
            self.validate_inputs(
                block_idx,
                inst_idx,
                inst_def.kind.name(),
                &inst_def.inputs,
                expected_inst_inputs(&inst_def.kind),
                inst_def.output_type,
            )?;
            inst_count = inst_idx + 1;
        }

        let terminator = &self.func_def_body.blocks[block].terminator;
        self.validate_inputs(
            block_idx,
            inst_count,
            terminator.kind.name(),
            &terminator.inputs,
            expected_terminator_inputs(terminator.kind),
            None,
        )
    }

    /// Validate the `inputs` of an instruction (or terminator) found at
    /// position `use_idx` in the block at position `block_idx`.
    fn validate_inputs(
        &self,
        block_idx: usize,
        use_idx: usize,
        user: &'static str,
        inputs: &[Value],
        expected_inputs: &[Expected],
        output_type: Option<Type>,
    ) -> Result<(), ValidationErrorKind> {
        if inputs.len() != expected_inputs.len() {
            return Err(ValidationErrorKind::InputCount {
                user,
                expected: expected_inputs.len(),
                found: inputs.len(),
            });
        }

        for (input_idx, (&input, &expected)) in inputs.iter().zip(expected_inputs).enumerate() {
            if let Value::DataInstOutput(def_inst) = input {
                let &(def_block_idx, def_idx) = self
                    .def_sites
                    .get(&def_inst)
                    .ok_or(ValidationErrorKind::DanglingUse { user, input_idx })?;
                if def_block_idx == block_idx {
                    if def_idx >= use_idx {
                        return Err(ValidationErrorKind::UseBeforeDef { user, input_idx });
                    }
                } else {
                    let all_blocks = &self.func_def_body.all_blocks;
                    let (def_block, use_block) = (all_blocks[def_block_idx], all_blocks[block_idx]);
                    if !self.dominators.dominates(def_block, use_block) {
                        return Err(ValidationErrorKind::DefDoesNotDominateUse {
                            user,
                            input_idx,
                            def_block_idx,
                        });
                    }
                }
            }

            let found = match input {
                Value::Const(ct) => Some(self.cx[ct].ty),
                Value::DataInstOutput(def_inst) => {
                    self.func_def_body.data_insts[def_inst].output_type
                }
            };
            let found_scalar = found.map(|ty| self.cx[ty].as_scalar());
            let matches = match expected {
                Expected::Any => found.is_some(),
                Expected::Exactly(ty) => found_scalar == Some(ty),
                Expected::AnyFloat => found_scalar.is_some_and(|ty| ty.is_float()),
                Expected::AnyInt => found_scalar.is_some_and(|ty| ty.is_int()),
                Expected::SameAsOutput => found.is_some() && found == output_type,
            };
            if !matches {
                let type_name = |ty: Option<Type>| match ty {
                    Some(ty) => self.cx[ty].to_string(),
                    None => "<none>".to_string(),
                };
                let expected = match expected {
                    Expected::Any => "<any>".to_string(),
                    Expected::Exactly(ty) => ty.to_string(),
                    Expected::AnyFloat => "<float>".to_string(),
                    Expected::AnyInt => "<integer>".to_string(),
                    Expected::SameAsOutput => type_name(output_type),
                };
                return Err(ValidationErrorKind::InputType {
                    user,
                    input_idx,
                    expected,
                    found: type_name(found),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::InsertPoint;
    use crate::cfg::ControlInst;
    use crate::{FragOutputs, FragResult, FuncDecl, ShaderInfo};
    use std::rc::Rc;

    fn module_with_body(cx: &Rc<Context>, body: FuncDefBody) -> Module {
        let mut module = Module::new(
            cx.clone(),
            ShaderInfo { outputs_written: FragOutputs::DATA0, ..ShaderInfo::fragment() },
        );
        module.define_func(FuncDecl { name: cx.intern("main"), def: DeclDef::Present(body) });
        module
    }

    #[test]
    fn valid_diamond() {
        let cx = Rc::new(Context::new());
        let mut body = FuncDefBody::default();
        let [entry, then, merge] = [(); 3].map(|()| body.define_block(&cx));

        let f32_ty = cx.intern(scalar::Type::F32);
        let half = Value::Const(cx.intern(scalar::Const::from_f32(0.5)));
        let x = body.at_mut(InsertPoint::block_end(entry)).load_input(&cx, 0, f32_ty);
        let cond = body.at_mut(InsertPoint::block_end(entry)).flt(&cx, x, half);
        body.blocks[entry].terminator = ControlInst::cond_branch(cond, then, merge);
        body.blocks[then].terminator = ControlInst::branch(merge);
        {
            let mut cursor = body.at_mut(InsertPoint::block_end(merge));
            let y = cursor.fmul(&cx, x, half);
            cursor.store_output(&cx, FragResult::Data(0), y);
        }

        assert_eq!(validate_module(&module_with_body(&cx, body)), Ok(()));
    }

    #[test]
    fn def_not_dominating_use() {
        let cx = Rc::new(Context::new());
        let mut body = FuncDefBody::default();
        let [entry, then, merge] = [(); 3].map(|()| body.define_block(&cx));

        let cond = Value::Const(cx.intern(scalar::Const::TRUE));
        body.blocks[entry].terminator = ControlInst::cond_branch(cond, then, merge);
        body.blocks[then].terminator = ControlInst::branch(merge);
        let f32_ty = cx.intern(scalar::Type::F32);
        let x = body.at_mut(InsertPoint::block_end(then)).load_input(&cx, 0, f32_ty);
        body.at_mut(InsertPoint::block_end(merge)).store_output(&cx, FragResult::Data(0), x);

        let err = validate_module(&module_with_body(&cx, body)).unwrap_err();
        assert_eq!(err.block_idx, 2);
        assert_eq!(
            err.kind,
            ValidationErrorKind::DefDoesNotDominateUse {
                user: "store_output",
                input_idx: 0,
                def_block_idx: 1
            }
        );
    }

    #[test]
    fn use_before_def_and_dangling() {
        let cx = Rc::new(Context::new());
        let f32_ty = cx.intern(scalar::Type::F32);

        let mut body = FuncDefBody::default();
        let block = body.define_block(&cx);
        let x = body.at_mut(InsertPoint::block_end(block)).load_input(&cx, 0, f32_ty);
        let Value::DataInstOutput(load) = x else {
            unreachable!();
        };
        body.at_mut(InsertPoint::before(block, load)).store_output(&cx, FragResult::Data(0), x);

        assert_eq!(
            validate_module(&module_with_body(&cx, body)).unwrap_err().kind,
            ValidationErrorKind::UseBeforeDef { user: "store_output", input_idx: 0 }
        );

        let mut body = FuncDefBody::default();
        let block = body.define_block(&cx);
        let x = body.at_mut(InsertPoint::block_end(block)).load_input(&cx, 0, f32_ty);
        body.at_mut(InsertPoint::block_end(block)).store_output(&cx, FragResult::Data(0), x);
        let Value::DataInstOutput(load) = x else {
            unreachable!();
        };
        body.blocks[block].insts.remove(load, &mut body.data_insts);

        let err = validate_module(&module_with_body(&cx, body)).unwrap_err();
        assert_eq!(
            err.kind,
            ValidationErrorKind::DanglingUse { user: "store_output", input_idx: 0 }
        );
        assert_eq!(
            err.to_string(),
            "function `main`, block b0: \
             `store_output` input #0 uses an instruction not found in any block"
        );
    }

    #[test]
    fn operand_types() {
        let cx = Rc::new(Context::new());
        let mut body = FuncDefBody::default();
        let block = body.define_block(&cx);
        {
            let mut cursor = body.at_mut(InsertPoint::block_end(block));
            let mask = Value::Const(cx.uint_const(scalar::Type::U32, 0xff));
            cursor.discard_samples(&cx, mask);
        }

        let err = validate_module(&module_with_body(&cx, body)).unwrap_err();
        assert_eq!(
            err.kind,
            ValidationErrorKind::InputType {
                user: "discard_samples",
                input_idx: 0,
                expected: "u16".to_string(),
                found: "u32".to_string(),
            }
        );
    }

    #[test]
    fn uconvert_takes_any_int() {
        let cx = Rc::new(Context::new());
        let i32_ty = cx.intern(scalar::Type::S32);
        let f32_ty = cx.intern(scalar::Type::F32);

        let mut body = FuncDefBody::default();
        let block = body.define_block(&cx);
        {
            let mut cursor = body.at_mut(InsertPoint::block_end(block));
            let signed = cursor.load_input(&cx, 0, i32_ty);
            let narrowed = cursor.uconvert(&cx, signed, scalar::Type::U16);
            cursor.store_output(&cx, FragResult::Stencil, narrowed);
        }
        assert_eq!(validate_module(&module_with_body(&cx, body)), Ok(()));

        let mut body = FuncDefBody::default();
        let block = body.define_block(&cx);
        {
            let mut cursor = body.at_mut(InsertPoint::block_end(block));
            let float = cursor.load_input(&cx, 0, f32_ty);
            let narrowed = cursor.uconvert(&cx, float, scalar::Type::U16);
            cursor.store_output(&cx, FragResult::Stencil, narrowed);
        }
        assert_eq!(
            validate_module(&module_with_body(&cx, body)).unwrap_err().kind,
            ValidationErrorKind::InputType {
                user: "uconvert",
                input_idx: 0,
                expected: "<integer>".to_string(),
                found: "f32".to_string(),
            }
        );
    }
}
