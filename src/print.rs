//! Deterministic textual representation of modules and functions.
//!
//! The output is meant for humans (and tests comparing IR before/after passes),
//! and isn't parsed back. A function looks like this:
//!
//! ```text
//! func main {
//!   b0:
//!     v0: f32 = load_input[location=0]()
//!     v1: bool = flt(v0, 0.5f32)
//!     branch_if v1, b1, b2
//!   b1:
//!     discard_samples(255u16)
//!     unreachable
//!   b2:
//!     store_output[data0](v0)
//!     return
//! }
//! ```
//!
//! Instruction outputs are named `v0`, `v1`, etc. (in program order, across
//! all blocks), constants and types are always printed inline.

use crate::cfg::ControlInst;
use crate::{
    Block, ConstKind, Context, DataInst, DataInstDef, DataInstKind, DeclDef, Func, FuncDecl,
    FuncDefBody, FxIndexSet, Import, Intrinsic, Module, Type, Value, ZsField,
};
use itertools::Itertools as _;
use std::fmt;

/// Printing "plan", i.e. everything selected for printing (in order), which
/// gets printed by formatting the `Plan` value with `fmt::Display`.
pub struct Plan<'a> {
    cx: &'a Context,
    func_decls: Vec<&'a FuncDecl>,
}

impl<'a> Plan<'a> {
    /// Plan printing every function in `module` (in definition order).
    pub fn for_module(module: &'a Module) -> Self {
        Self {
            cx: module.cx_ref(),
            func_decls: module.all_funcs.iter().map(|&func| &module.funcs[func]).collect(),
        }
    }

    pub fn for_func(module: &'a Module, func: Func) -> Self {
        Self { cx: module.cx_ref(), func_decls: vec![&module.funcs[func]] }
    }
}

impl fmt::Display for Plan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func_decl) in self.func_decls.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let name = &self.cx[func_decl.name];
            match &func_decl.def {
                DeclDef::Imported(Import::LinkName(link_name)) => {
                    writeln!(f, "func {name} = import {:?}", &self.cx[*link_name])?;
                }
                DeclDef::Present(func_def_body) => {
                    writeln!(f, "func {name} {{")?;
                    FuncPrinter::new(self.cx, func_def_body).print_body(f)?;
                    writeln!(f, "}}")?;
                }
            }
        }
        Ok(())
    }
}

struct FuncPrinter<'a> {
    cx: &'a Context,
    func_def_body: &'a FuncDefBody,

    /// Block names (`b{i}`) are positions in this set.
    blocks: FxIndexSet<Block>,

    /// Value names (`v{i}`) are positions in this set.
    values: FxIndexSet<DataInst>,
}

impl<'a> FuncPrinter<'a> {
    fn new(cx: &'a Context, func_def_body: &'a FuncDefBody) -> Self {
        let blocks: FxIndexSet<_> = func_def_body.all_blocks.iter().copied().collect();
        let values = blocks
            .iter()
            .flat_map(|&block| func_def_body.at(block).insts())
            .filter(|func_at_inst| func_at_inst.def().output_type.is_some())
            .map(|func_at_inst| func_at_inst.position)
            .collect();
        Self { cx, func_def_body, blocks, values }
    }

    fn print_body(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &block in &self.blocks {
            writeln!(f, "  {}:", self.block_name(block))?;
            for func_at_inst in self.func_def_body.at(block).insts() {
                write!(f, "    ")?;
                self.print_inst(f, func_at_inst.position, func_at_inst.def())?;
                writeln!(f)?;
            }
            write!(f, "    ")?;
            self.print_terminator(f, &self.func_def_body.blocks[block].terminator)?;
            writeln!(f)?;
        }
        Ok(())
    }

    fn block_name(&self, block: Block) -> String {
        match self.blocks.get_index_of(&block) {
            Some(i) => format!("b{i}"),
            None => "b?".to_string(),
        }
    }

    fn value(&self, v: Value) -> String {
        match v {
            Value::Const(ct) => {
                let ct_def = &self.cx[ct];
                match &ct_def.kind {
                    ConstKind::Undef => format!("undef<{}>", self.ty(ct_def.ty)),
                    ConstKind::Scalar(scalar) => scalar.to_string(),
                }
            }
            // NOTE: dangling uses are printed (instead of panicking), as
            // this is often used to debug broken IR.
            Value::DataInstOutput(inst) => match self.values.get_index_of(&inst) {
                Some(i) => format!("v{i}"),
                None => "v?".to_string(),
            },
        }
    }

    fn ty(&self, ty: Type) -> String {
        self.cx[ty].to_string()
    }

    fn print_inst(
        &self,
        f: &mut fmt::Formatter<'_>,
        inst: DataInst,
        inst_def: &DataInstDef,
    ) -> fmt::Result {
        if let Some(ty) = inst_def.output_type {
            write!(f, "{}: {} = ", self.value(Value::DataInstOutput(inst)), self.ty(ty))?;
        }

        f.write_str(inst_def.kind.name())?;
        match &inst_def.kind {
            DataInstKind::Intrinsic(Intrinsic::LoadInput { location }) => {
                write!(f, "[location={location}]")?;
            }
            DataInstKind::Intrinsic(Intrinsic::StoreOutput(semantics)) => {
                write!(f, "[{}", semantics.location)?;
                if semantics.index != 0 {
                    write!(f, ", index={}", semantics.index)?;
                }
                write!(f, "]")?;
            }
            DataInstKind::Intrinsic(Intrinsic::ZsEmit { written }) => {
                let fields = [ZsField::Depth, ZsField::Stencil]
                    .into_iter()
                    .filter(|field| written.contains(field.flag()));
                write!(f, "[{}]", fields.format("|"))?;
            }
            DataInstKind::Alu(_)
            | DataInstKind::Intrinsic(
                Intrinsic::Discard | Intrinsic::DiscardIf | Intrinsic::DiscardSamples,
            ) => {}
        }

        write!(f, "({})", inst_def.inputs.iter().map(|&v| self.value(v)).format(", "))
    }

    fn print_terminator(
        &self,
        f: &mut fmt::Formatter<'_>,
        terminator: &ControlInst,
    ) -> fmt::Result {
        f.write_str(terminator.kind.name())?;

        let operands = terminator
            .inputs
            .iter()
            .map(|&v| self.value(v))
            .chain(terminator.targets.iter().map(|&target| self.block_name(target)));
        let mut operands = operands.peekable();
        if operands.peek().is_some() {
            write!(f, " {}", operands.format(", "))?;
        }
        Ok(())
    }
}
