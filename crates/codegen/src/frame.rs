//! This module contains the function-level lowering info: stack frame
//! objects, virtual registers, and the stack-slot pool dedicated to
//! safepoint spilling.
//!
//! Everything here is owned by the function being lowered and lives until
//! its code generation completes; nothing is shared across functions.
use cranelift_entity::PrimaryMap;
use rustc_hash::FxHashMap;
use waypoint_ir::{Type, ValueId};

/// An opaque identifier of a stack frame object. Created once, reusable
/// across safepoints, never destroyed before the function finishes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct StackSlot(pub u32);
cranelift_entity::entity_impl!(StackSlot);

#[derive(Debug, Clone, Copy)]
pub struct StackSlotData {
    pub ty: Type,
}

impl StackSlotData {
    pub fn size(&self) -> usize {
        self.ty.size_of()
    }
}

/// A virtual register.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct VReg(pub u32);
cranelift_entity::entity_impl!(VReg);

/// Counters kept for diagnostics; queryable after lowering.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatepointStats {
    /// Stack slots created for safepoint spilling.
    pub slots_allocated: u32,
    /// Safepoint sites lowered.
    pub statepoints_lowered: u32,
    /// Maximum number of slots any single safepoint required.
    pub max_slots_required: u32,
}

pub struct FrameInfo {
    stack_slots: PrimaryMap<StackSlot, StackSlotData>,
    vregs: PrimaryMap<VReg, Type>,

    /// The Stack Slot Pool: slots dedicated to safepoint spilling, in
    /// allocation order. Append-only for the whole function.
    pub statepoint_slots: Vec<StackSlot>,

    /// Values whose result was copied into an explicitly created register
    /// because it is read from a different block (invoke safepoints).
    pub exported_values: FxHashMap<ValueId, VReg>,

    pub stats: StatepointStats,
}

impl FrameInfo {
    pub fn new() -> Self {
        Self {
            stack_slots: PrimaryMap::default(),
            vregs: PrimaryMap::default(),
            statepoint_slots: Vec::new(),
            exported_values: FxHashMap::default(),
            stats: StatepointStats::default(),
        }
    }

    /// Create a fresh stack frame object of the given type.
    pub fn create_stack_slot(&mut self, ty: Type) -> StackSlot {
        debug_assert_ne!(ty, Type::Unit, "stack slots must have a sized type");
        self.stack_slots.push(StackSlotData { ty })
    }

    pub fn stack_slot(&self, slot: StackSlot) -> StackSlotData {
        self.stack_slots[slot]
    }

    pub fn create_vreg(&mut self, ty: Type) -> VReg {
        self.vregs.push(ty)
    }

    pub fn vreg_ty(&self, reg: VReg) -> Type {
        self.vregs[reg]
    }

    /// Position of `slot` within the safepoint spill pool, if it belongs to
    /// it.
    pub fn statepoint_slot_index(&self, slot: StackSlot) -> Option<usize> {
        self.statepoint_slots.iter().position(|&s| s == slot)
    }
}

impl Default for FrameInfo {
    fn default() -> Self {
        Self::new()
    }
}
