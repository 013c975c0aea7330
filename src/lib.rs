//! Small SSA shader IR, and the fragment-shader lowering passes that rewrite
//! depth/stencil output writes and discards into the forms a tile-based GPU
//! back end consumes (see [`passes::discard_zs_emit`]).

use smallvec::SmallVec;
use std::fmt;

mod context;
pub use context::{
    Block, Const, Context, DataInst, EntityDefs, EntityList, EntityListIter, EntityListNode, Func,
    InternInCx, InternedStr, Type,
};

pub mod builder;
pub mod cfg;
pub mod func_at;
pub mod metadata;
pub mod print;
pub mod scalar;
pub mod transform;
pub mod validate;
pub mod passes {
    // NOTE: inline `mod` to avoid adding APIs here, it's just namespacing.

    pub mod discard;
    pub mod discard_zs_emit;
    pub mod zs_emit;
}

pub type FxIndexSet<V> =
    indexmap::IndexSet<V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

// HACK: this only serves to disallow modifying the `cx` field of `Module`.
mod sealed {
    use super::*;
    use std::rc::Rc;

    pub struct Module {
        /// Context used for everything interned, in this module.
        ///
        /// Notable choices made for this field:
        /// * private to disallow switching the context of a module
        /// * `Rc` sharing to allow multiple modules to use the same context
        ///   (`Context: !Sync` because of the interners so it can't be `Arc`)
        cx: Rc<Context>,

        pub info: ShaderInfo,

        pub funcs: EntityDefs<Func>,

        /// Every function defined in `funcs`, in definition order.
        // FIXME: this can get out of sync with `funcs`, if the latter is
        // mutated directly, instead of going through `define_func`.
        pub all_funcs: Vec<Func>,
    }

    impl Module {
        pub fn new(cx: Rc<Context>, info: ShaderInfo) -> Self {
            Self {
                cx,

                info,

                funcs: Default::default(),
                all_funcs: vec![],
            }
        }

        // FIXME: `cx_ref` might be the better default in situations where
        // the module doesn't need to be modified, figure out if that's common.
        pub fn cx(&self) -> Rc<Context> {
            self.cx.clone()
        }

        pub fn cx_ref(&self) -> &Rc<Context> {
            &self.cx
        }

        pub fn define_func(&mut self, decl: FuncDecl) -> Func {
            let func = self.funcs.define(&self.cx, decl);
            self.all_funcs.push(func);
            func
        }
    }
}
pub use sealed::Module;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// Whole-shader information, gathered (and kept up to date) by whoever
/// produced the module, and only read by the passes in this crate.
#[derive(Clone, Debug)]
pub struct ShaderInfo {
    pub stage: ShaderStage,

    /// Fragment outputs written anywhere in the shader.
    pub outputs_written: FragOutputs,

    /// Whether any `discard`/`discard_if` appears anywhere in the shader.
    pub uses_discard: bool,
}

impl ShaderInfo {
    pub fn fragment() -> Self {
        Self {
            stage: ShaderStage::Fragment,
            outputs_written: FragOutputs::empty(),
            uses_discard: false,
        }
    }
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct FragOutputs: u64 {
        const DEPTH = 1 << 0;
        const STENCIL = 1 << 1;
        const SAMPLE_MASK = 1 << 2;

        const DATA0 = 1 << 4;
        const DATA1 = 1 << 5;
        const DATA2 = 1 << 6;
        const DATA3 = 1 << 7;
        const DATA4 = 1 << 8;
        const DATA5 = 1 << 9;
        const DATA6 = 1 << 10;
        const DATA7 = 1 << 11;
    }
}

/// Fragment output "slot" written by [`Intrinsic::StoreOutput`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FragResult {
    Depth,
    Stencil,
    SampleMask,

    /// Color attachment (render target), only `0..8` are valid.
    Data(u8),
}

impl fmt::Display for FragResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragResult::Depth => f.write_str("depth"),
            FragResult::Stencil => f.write_str("stencil"),
            FragResult::SampleMask => f.write_str("sample_mask"),
            FragResult::Data(rt) => write!(f, "data{rt}"),
        }
    }
}

/// Where an output write goes, i.e. the output slot, plus the dual-source
/// blending `index` (always `0` outside of dual-source blending).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IoSemantics {
    pub location: FragResult,
    pub index: u8,
}

impl From<FragResult> for IoSemantics {
    fn from(location: FragResult) -> Self {
        Self { location, index: 0 }
    }
}

#[derive(PartialEq, Eq, Hash)]
pub struct TypeDef {
    pub kind: TypeKind,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar(scalar::Type),
}

impl TypeDef {
    pub fn as_scalar(&self) -> scalar::Type {
        let TypeKind::Scalar(ty) = self.kind;
        ty
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeKind::Scalar(ty) => write!(f, "{ty}"),
        }
    }
}

impl InternInCx<Type> for TypeKind {
    fn intern_in_cx(self, cx: &Context) -> Type {
        cx.intern(TypeDef { kind: self })
    }
}

impl InternInCx<Type> for scalar::Type {
    fn intern_in_cx(self, cx: &Context) -> Type {
        cx.intern(TypeKind::Scalar(self))
    }
}

#[derive(PartialEq, Eq, Hash)]
pub struct ConstDef {
    pub ty: Type,
    pub kind: ConstKind,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConstKind {
    /// Placeholder for a value that was never written (reading it is allowed,
    /// but its contents are unspecified).
    Undef,

    Scalar(scalar::Const),
}

impl InternInCx<Const> for scalar::Const {
    fn intern_in_cx(self, cx: &Context) -> Const {
        cx.intern(ConstDef { ty: cx.intern(self.ty()), kind: ConstKind::Scalar(self) })
    }
}

impl Context {
    pub fn undef(&self, ty: Type) -> Const {
        self.intern(ConstDef { ty, kind: ConstKind::Undef })
    }

    /// Unsigned integer constant of type `ty`, panicking if `v` doesn't fit.
    #[track_caller]
    pub fn uint_const(&self, ty: scalar::Type, v: u128) -> Const {
        assert!(matches!(ty, scalar::Type::UInt(_)), "uint_const: `{ty}` is not unsigned");
        self.intern(scalar::Const::from_bits(ty, v))
    }

    pub fn scalar_type(&self, ty: scalar::Type) -> Type {
        self.intern(ty)
    }
}

/// Declarations (`FuncDecl`) can contain a full definition,
/// or only be an import of a definition (e.g. from another module).
pub enum DeclDef<D> {
    Imported(Import),
    Present(D),
}

/// An identifier (e.g. a link name, or "symbol") for an import declaration.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum Import {
    LinkName(InternedStr),
}

pub struct FuncDecl {
    pub name: InternedStr,

    pub def: DeclDef<FuncDefBody>,
}

#[derive(Default)]
pub struct FuncDefBody {
    pub blocks: EntityDefs<Block>,
    pub data_insts: EntityDefs<DataInst>,

    /// Every block of the function, starting with the entry block.
    pub all_blocks: Vec<Block>,

    /// Cached analyses, see [`metadata`].
    pub(crate) analyses: metadata::Analyses,
}

impl FuncDefBody {
    /// Define a new (empty) block, which returns from the function, until its
    /// `terminator` is replaced. The first block defined is the entry block.
    pub fn define_block(&mut self, cx: &Context) -> Block {
        let block = self.blocks.define(
            cx,
            BlockDef { insts: EntityList::empty(), terminator: cfg::ControlInst::ret() },
        );
        self.all_blocks.push(block);
        block
    }

    pub fn entry_block(&self) -> Option<Block> {
        self.all_blocks.first().copied()
    }
}

pub struct BlockDef {
    pub insts: EntityList<DataInst>,

    pub terminator: cfg::ControlInst,
}

#[derive(Clone)]
pub struct DataInstDef {
    pub kind: DataInstKind,

    pub inputs: SmallVec<[Value; 2]>,

    pub output_type: Option<Type>,
}

#[derive(Clone, PartialEq, Eq, derive_more::From)]
pub enum DataInstKind {
    Alu(AluOp),
    Intrinsic(Intrinsic),
}

impl DataInstKind {
    pub fn name(&self) -> &'static str {
        match self {
            DataInstKind::Alu(op) => op.name(),
            DataInstKind::Intrinsic(intrinsic) => intrinsic.name(),
        }
    }
}

/// Pure operations, their `output_type` determining e.g. the conversion target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AluOp {
    /// Float-to-float conversion (e.g. `f16` -> `f32`).
    FConvert,
    /// Unsigned integer conversion (truncating or zero-extending).
    UConvert,
    /// `select(cond, if_true, if_false)`.
    Select,
    FAdd,
    FMul,
    FLt,
    IEq,
}

impl AluOp {
    pub fn name(self) -> &'static str {
        match self {
            AluOp::FConvert => "fconvert",
            AluOp::UConvert => "uconvert",
            AluOp::Select => "select",
            AluOp::FAdd => "fadd",
            AluOp::FMul => "fmul",
            AluOp::FLt => "flt",
            AluOp::IEq => "ieq",
        }
    }
}

/// Operations with side-effects (or otherwise tied to the shader interface).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// Read fragment input `location` (e.g. an interpolated varying).
    LoadInput { location: u32 },

    /// Write the only input (the value) to a fragment output.
    StoreOutput(IoSemantics),

    /// Kill the fragment (all of its samples).
    Discard,

    /// Kill the fragment (all of its samples) iff the only input (a `bool`) is `true`.
    DiscardIf,

    /// Combined depth/stencil write, with inputs `[sample_mask, depth, stencil]`
    /// (`u16`, `f32`, `u16`), of which only the `written` ones are meaningful.
    ZsEmit { written: ZsFields },

    /// Kill the samples set in the only input (a `u16` mask, one bit per sample).
    DiscardSamples,
}

impl Intrinsic {
    pub fn name(&self) -> &'static str {
        match self {
            Intrinsic::LoadInput { .. } => "load_input",
            Intrinsic::StoreOutput(_) => "store_output",
            Intrinsic::Discard => "discard",
            Intrinsic::DiscardIf => "discard_if",
            Intrinsic::ZsEmit { .. } => "zs_emit",
            Intrinsic::DiscardSamples => "discard_samples",
        }
    }
}

bitflags::bitflags! {
    /// Which of the depth/stencil inputs of a [`Intrinsic::ZsEmit`] were written.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ZsFields: u8 {
        const DEPTH = 1 << 0;
        const STENCIL = 1 << 1;
    }
}

impl ZsFields {
    /// Mark `field` as written, unless it already was (which is an error).
    pub fn insert_once(&mut self, field: ZsField) -> Result<(), ZsField> {
        let flag = field.flag();
        if self.contains(flag) {
            return Err(field);
        }
        self.insert(flag);
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ZsField {
    Depth,
    Stencil,
}

impl ZsField {
    pub fn from_output(location: FragResult) -> Option<Self> {
        match location {
            FragResult::Depth => Some(ZsField::Depth),
            FragResult::Stencil => Some(ZsField::Stencil),
            FragResult::SampleMask | FragResult::Data(_) => None,
        }
    }

    pub fn flag(self) -> ZsFields {
        match self {
            ZsField::Depth => ZsFields::DEPTH,
            ZsField::Stencil => ZsFields::STENCIL,
        }
    }

    /// Index of the corresponding input of [`Intrinsic::ZsEmit`]
    /// (input `0` being the sample mask).
    pub fn input_idx(self) -> usize {
        match self {
            ZsField::Depth => 1,
            ZsField::Stencil => 2,
        }
    }

    /// Type the hardware expects for this field.
    pub fn scalar_type(self) -> scalar::Type {
        match self {
            ZsField::Depth => scalar::Type::F32,
            ZsField::Stencil => scalar::Type::U16,
        }
    }
}

impl fmt::Display for ZsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ZsField::Depth => "depth",
            ZsField::Stencil => "stencil",
        })
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Const(Const),
    DataInstOutput(DataInst),
}
