//! Scalar (`bool`, integer, and floating-point) types and constants.
//!
//! These are the only kinds of values fragment outputs and discard conditions
//! are built from (vectors only appear as e.g. color outputs, see [`crate::TypeKind`]).

use std::fmt;

// HACK: this could be some `struct` with private fields, but this `enum`
// is only 2 bytes in size, and has better ergonomics overall.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    SInt(IntWidth),
    UInt(IntWidth),
    Float(FloatWidth),
}

impl Type {
    // HACK: only common widths, as a convenience, expand as-needed.
    pub const U16: Type = Type::UInt(IntWidth::I16);
    pub const S32: Type = Type::SInt(IntWidth::I32);
    pub const U32: Type = Type::UInt(IntWidth::I32);
    pub const F16: Type = Type::Float(FloatWidth::F16);
    pub const F32: Type = Type::Float(FloatWidth::F32);

    pub const fn bit_width(self) -> u32 {
        match self {
            Type::Bool => 1,
            Type::SInt(w) | Type::UInt(w) => w.bits(),
            Type::Float(w) => w.bits(),
        }
    }

    pub const fn is_int(self) -> bool {
        matches!(self, Type::SInt(_) | Type::UInt(_))
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Type::Float(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Type::Bool => f.write_str("bool"),
            Type::SInt(w) => write!(f, "i{}", w.bits()),
            Type::UInt(w) => write!(f, "u{}", w.bits()),
            Type::Float(w) => write!(f, "f{}", w.bits()),
        }
    }
}

/// Bit-width of a supported integer type (only power-of-two multiples of a byte).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IntWidth {
    // HACK: this is so compact that only 3 bits of this byte are used
    // to encode integer types from `i8` to `i128`.
    log2_bytes: u8,
}

impl IntWidth {
    pub const I8: Self = Self::try_from_bits_unwrap(8);
    pub const I16: Self = Self::try_from_bits_unwrap(16);
    pub const I32: Self = Self::try_from_bits_unwrap(32);
    pub const I64: Self = Self::try_from_bits_unwrap(64);
    pub const I128: Self = Self::try_from_bits_unwrap(128);

    // FIXME: remove when `Option::unwrap` is stabilized.
    const fn try_from_bits_unwrap(bits: u32) -> Self {
        match Self::try_from_bits(bits) {
            Some(w) => w,
            None => unreachable!(),
        }
    }

    pub const fn try_from_bits(bits: u32) -> Option<Self> {
        if bits % 8 != 0 || bits > 128 {
            return None;
        }
        let bytes = bits / 8;
        match bytes.checked_ilog2() {
            Some(log2_bytes_u32) if bytes.is_power_of_two() => {
                Some(Self { log2_bytes: log2_bytes_u32 as u8 })
            }
            _ => None,
        }
    }

    pub const fn bits(self) -> u32 {
        8 * (1 << self.log2_bytes)
    }
}

/// Bit-width of a supported floating-point type (`f16`, `f32` and `f64` only).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FloatWidth(IntWidth);

impl FloatWidth {
    pub const F16: Self = Self::try_from_bits_unwrap(16);
    pub const F32: Self = Self::try_from_bits_unwrap(32);
    pub const F64: Self = Self::try_from_bits_unwrap(64);

    // FIXME: remove when `Option::unwrap` is stabilized.
    const fn try_from_bits_unwrap(bits: u32) -> Self {
        match Self::try_from_bits(bits) {
            Some(w) => w,
            None => unreachable!(),
        }
    }

    pub const fn try_from_bits(bits: u32) -> Option<Self> {
        match bits {
            16 | 32 | 64 => match IntWidth::try_from_bits(bits) {
                Some(w) => Some(Self(w)),
                None => None,
            },
            _ => None,
        }
    }

    pub const fn bits(self) -> u32 {
        self.0.bits()
    }
}

// HACK: `(Type, u128)` would waste almost half its size on padding, and
// packing will only impact accessing the `bits`, while allowing e.g. being
// wrapped in an outer `enum`, before reaching the same size as `(u128, u128)`.
#[repr(packed)]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Const {
    ty: Type,
    bits: u128,
}

impl Const {
    pub const FALSE: Const = Const::from_bool(false);
    pub const TRUE: Const = Const::from_bool(true);

    const fn from_bits_trunc(ty: Type, bits: u128) -> Const {
        let width = ty.bit_width();
        assert!(width <= 128);

        Const { ty, bits: bits & (!0u128 >> (128 - width)) }
    }

    /// Panics if `bits` doesn't fit in `ty` (i.e. any bits would be truncated).
    #[track_caller]
    pub const fn from_bits(ty: Type, bits: u128) -> Const {
        let ct_trunc = Const::from_bits_trunc(ty, bits);
        assert!(ct_trunc.bits == bits);
        ct_trunc
    }

    pub const fn try_from_bits(ty: Type, bits: u128) -> Option<Const> {
        let ct_trunc = Const::from_bits_trunc(ty, bits);
        if ct_trunc.bits == bits { Some(ct_trunc) } else { None }
    }

    pub const fn from_bool(v: bool) -> Const {
        Const::from_bits(Type::Bool, v as u128)
    }

    pub const fn from_u16(v: u16) -> Const {
        Const::from_bits(Type::U16, v as u128)
    }

    pub const fn from_u32(v: u32) -> Const {
        Const::from_bits(Type::U32, v as u128)
    }

    pub fn from_f16(v: half::f16) -> Const {
        Const::from_bits(Type::F16, v.to_bits() as u128)
    }

    pub fn from_f32(v: f32) -> Const {
        Const::from_bits(Type::F32, v.to_bits() as u128)
    }

    /// Returns `Some(ct)` iff `ty` is `{S,U}Int` and can represent `v: i128`
    /// (i.e. `ct` has the same sign and absolute value as `v` does).
    pub fn int_try_from_i128(ty: Type, v: i128) -> Option<Const> {
        let ct_trunc = Const::from_bits_trunc(ty, v as u128);
        (ct_trunc.int_as_i128() == Some(v)).then_some(ct_trunc)
    }

    pub const fn ty(&self) -> Type {
        self.ty
    }

    pub const fn bits(&self) -> u128 {
        self.bits
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.ty {
            Type::Bool => Some(self.bits != 0),
            _ => None,
        }
    }

    /// Returns `Some(v)` iff `self` is `{S,U}Int` and representable by `v: i128`
    /// (i.e. `self` has the same sign and absolute value as `v` does).
    pub fn int_as_i128(&self) -> Option<i128> {
        match self.ty {
            Type::Bool | Type::Float(_) => None,
            Type::SInt(_) => {
                let width = self.ty.bit_width();
                Some((self.bits as i128) << (128 - width) >> (128 - width))
            }
            Type::UInt(_) => self.bits.try_into().ok(),
        }
    }

    /// Returns `Some(v)` iff `self` is `{S,U}Int` and representable by `v: u128`
    /// (i.e. `self` is positive and has the same absolute value as `v` does).
    pub fn int_as_u128(&self) -> Option<u128> {
        match self.ty {
            Type::Bool | Type::Float(_) => None,
            Type::SInt(_) => self.int_as_i128()?.try_into().ok(),
            Type::UInt(_) => Some(self.bits),
        }
    }

    /// Returns `Some(v)` iff `self` is a float, converting it to `f64` (which
    /// is lossless for all of the supported `FloatWidth`s).
    pub fn float_as_f64(&self) -> Option<f64> {
        let bits = self.bits;
        match self.ty {
            Type::Float(FloatWidth::F16) => Some(half::f16::from_bits(bits as u16).to_f64()),
            Type::Float(FloatWidth::F32) => Some(f64::from(f32::from_bits(bits as u32))),
            Type::Float(FloatWidth::F64) => Some(f64::from_bits(bits as u64)),
            _ => None,
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.ty;
        match ty {
            Type::Bool => write!(f, "{}", self.bits != 0),
            Type::SInt(_) => write!(f, "{}{ty}", self.int_as_i128().unwrap()),
            Type::UInt(_) => write!(f, "{}{ty}", self.int_as_u128().unwrap()),
            Type::Float(_) => write!(f, "{}{ty}", self.float_as_f64().unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(IntWidth::try_from_bits(16).map(IntWidth::bits), Some(16));
        assert_eq!(IntWidth::try_from_bits(24), None);
        assert_eq!(IntWidth::try_from_bits(256), None);
        assert_eq!(FloatWidth::try_from_bits(8), None);
        assert_eq!(Type::F32.bit_width(), 32);
    }

    #[test]
    fn consts() {
        assert_eq!(Const::from_u16(0xff).int_as_u128(), Some(0xff));
        assert!(Const::try_from_bits(Type::U16, 0x1_0000).is_none());
        assert_eq!(Const::int_try_from_i128(Type::S32, -1).unwrap().bits(), 0xffff_ffff);
        assert_eq!(Const::from_f32(0.5).float_as_f64(), Some(0.5));
        assert_eq!(Const::from_f16(half::f16::from_f32(0.25)).float_as_f64(), Some(0.25));
        assert_eq!(Const::TRUE.as_bool(), Some(true));
    }

    #[test]
    fn display() {
        assert_eq!(Const::from_f32(0.5).to_string(), "0.5f32");
        assert_eq!(Const::from_u16(255).to_string(), "255u16");
        assert_eq!(Const::int_try_from_i128(Type::S32, -3).unwrap().to_string(), "-3i32");
        assert_eq!(Const::FALSE.to_string(), "false");
    }
}
