pub mod call;
pub mod dag;
pub mod frame;
pub mod lower;
pub mod statepoint;

pub use dag::{Dag, NodeId, NodeKind};
pub use frame::{FrameInfo, StackSlot, VReg};
pub use lower::LowerCtx;
