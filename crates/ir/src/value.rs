//! This module contains Waypoint IR value definitions.
use core::fmt;

use crate::function::ExtFuncRef;

use super::Type;

/// An opaque reference to [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct ValueId(pub u32);
cranelift_entity::entity_impl!(ValueId);

/// A value data definition.
#[derive(Debug, Clone)]
pub enum Value {
    /// The value is defined by an instruction. The defining instruction is
    /// opaque to the lowering; its node is installed into the value map by
    /// whoever lowered it.
    Inst { ty: Type },

    /// The value is a function argument.
    Arg { ty: Type, idx: usize },

    /// The value is an immediate.
    Immediate { imm: Immediate, ty: Type },

    /// The value is the address of an external function.
    Func { func: ExtFuncRef },
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Self::Inst { ty } | Self::Arg { ty, .. } | Self::Immediate { ty, .. } => *ty,
            Self::Func { .. } => Type::Ptr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Immediate {
    I1(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
}

impl Immediate {
    pub fn ty(&self) -> Type {
        match self {
            Self::I1(..) => Type::I1,
            Self::I8(..) => Type::I8,
            Self::I16(..) => Type::I16,
            Self::I32(..) => Type::I32,
            Self::I64(..) => Type::I64,
        }
    }

    /// The sign-extended 64-bit representation, which is how every immediate
    /// is recorded in a safepoint operand list.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::I1(val) => val as i64,
            Self::I8(val) => val as i64,
            Self::I16(val) => val as i64,
            Self::I32(val) => val as i64,
            Self::I64(val) => val,
        }
    }

    pub fn is_zero(self) -> bool {
        self.as_i64() == 0
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::I1(v) => write!(f, "{}", *v as u8),
            Self::I8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! imm_from_primary {
    ($prim_ty:ty, $inner_ty:ty, $immediate_variant:expr) => {
        impl From<$prim_ty> for Immediate {
            fn from(imm: $prim_ty) -> Self {
                $immediate_variant(imm as $inner_ty)
            }
        }
    };
}

imm_from_primary!(bool, bool, Immediate::I1);
imm_from_primary!(i8, i8, Immediate::I8);
imm_from_primary!(u8, i8, Immediate::I8);
imm_from_primary!(i16, i16, Immediate::I16);
imm_from_primary!(u16, i16, Immediate::I16);
imm_from_primary!(i32, i32, Immediate::I32);
imm_from_primary!(u32, i32, Immediate::I32);
imm_from_primary!(i64, i64, Immediate::I64);
imm_from_primary!(u64, i64, Immediate::I64);
