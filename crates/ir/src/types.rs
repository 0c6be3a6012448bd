//! This module contains Waypoint IR type definitions.
use std::fmt;

/// Value types known to the lowering. Pointers are 64-bit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    #[default]
    Unit,
    I1,
    I8,
    I16,
    I32,
    I64,
    Ptr,
}

impl Type {
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Self::I1 | Self::I8 | Self::I16 | Self::I32 | Self::I64
        )
    }

    pub fn is_pointer(self) -> bool {
        matches!(self, Self::Ptr)
    }

    pub fn size_of(self) -> usize {
        match self {
            Self::Unit => 0,
            Self::I1 | Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 => 4,
            Self::I64 | Self::Ptr => 8,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unit => write!(f, "unit"),
            Self::I1 => write!(f, "i1"),
            Self::I8 => write!(f, "i8"),
            Self::I16 => write!(f, "i16"),
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::Ptr => write!(f, "*i8"),
        }
    }
}
