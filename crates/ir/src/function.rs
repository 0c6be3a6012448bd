//! This module contains the per-function value store the lowering operates
//! over, together with signatures and calling conventions.
use cranelift_entity::PrimaryMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{Immediate, Type, Value, ValueId};

/// An opaque reference to a basic block. Blocks themselves are not modeled
/// here; the lowering only needs block identity (e.g. an invoke's landing
/// pad).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct BlockId(pub u32);
cranelift_entity::entity_impl!(BlockId);

/// An opaque reference to an external function declaration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct ExtFuncRef(pub u32);
cranelift_entity::entity_impl!(ExtFuncRef);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallConv {
    C,
    Fast,
    Cold,
    AnyReg,
}

impl CallConv {
    /// Stable numeric id, packed into the safepoint's flags operand.
    pub fn as_u64(self) -> u64 {
        match self {
            Self::C => 0,
            Self::Fast => 1,
            Self::Cold => 2,
            Self::AnyReg => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub args: SmallVec<[Type; 8]>,
    pub ret_ty: Type,
    pub call_conv: CallConv,
}

impl Signature {
    pub fn new(name: &str, args: &[Type], ret_ty: Type) -> Self {
        Self {
            name: name.to_string(),
            args: args.into(),
            ret_ty,
            call_conv: CallConv::C,
        }
    }
}

pub struct Function {
    pub sig: Signature,
    pub values: PrimaryMap<ValueId, Value>,
    pub ext_funcs: PrimaryMap<ExtFuncRef, Signature>,
    immediates: FxHashMap<Immediate, ValueId>,
}

impl Function {
    pub fn new(sig: Signature) -> Self {
        Self {
            sig,
            values: PrimaryMap::default(),
            ext_funcs: PrimaryMap::default(),
            immediates: FxHashMap::default(),
        }
    }

    pub fn make_value(&mut self, value: Value) -> ValueId {
        self.values.push(value)
    }

    /// Interned: repeated immediates yield the same `ValueId`, which is what
    /// lets duplicate constants collapse downstream.
    pub fn make_imm_value<Imm>(&mut self, imm: Imm) -> ValueId
    where
        Imm: Into<Immediate>,
    {
        let imm: Immediate = imm.into();
        if let Some(&value) = self.immediates.get(&imm) {
            return value;
        }

        let ty = imm.ty();
        let value = self.make_value(Value::Immediate { imm, ty });
        self.immediates.insert(imm, value);
        value
    }

    pub fn declare_ext_func(&mut self, sig: Signature) -> ExtFuncRef {
        self.ext_funcs.push(sig)
    }

    pub fn make_func_value(&mut self, func: ExtFuncRef) -> ValueId {
        self.make_value(Value::Func { func })
    }

    pub fn value(&self, value: ValueId) -> &Value {
        &self.values[value]
    }

    pub fn value_ty(&self, value: ValueId) -> Type {
        self.values[value].ty()
    }

    pub fn value_imm(&self, value: ValueId) -> Option<Immediate> {
        match self.values[value] {
            Value::Immediate { imm, .. } => Some(imm),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediates_are_interned() {
        let mut func = Function::new(Signature::new("f", &[], Type::Unit));
        let a = func.make_imm_value(42u64);
        let b = func.make_imm_value(42u64);
        let c = func.make_imm_value(42u32);
        assert_eq!(a, b);
        // Same numeric value, different width.
        assert_ne!(a, c);

        assert_eq!(func.value_imm(a), Some(Immediate::I64(42)));
        assert_eq!(func.value_ty(c), Type::I32);
    }
}
