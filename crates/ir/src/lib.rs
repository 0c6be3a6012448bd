pub mod function;
pub mod statepoint;
pub mod types;
pub mod value;

pub use function::{BlockId, CallConv, ExtFuncRef, Function, Signature};
pub use statepoint::{GcRelocate, StatepointKind, StatepointSite};
pub use types::Type;
pub use value::{Immediate, Value, ValueId};
