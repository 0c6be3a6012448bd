//! This module contains the per-safepoint allocation state: a cursor and
//! reservation bitmap over the function's safepoint slot pool, plus the two
//! caches that keep one safepoint's spills and reloads deduplicated.
use rustc_hash::{FxHashMap, FxHashSet};
use waypoint_ir::{Type, ValueId};

use crate::{dag::NodeId, lower::LowerCtx};

/// Safepoint-scoped lowering state. One instance serves all safepoints of a
/// function in sequence; [`start_new_statepoint`] must be called before each
/// one.
///
/// [`start_new_statepoint`]: Self::start_new_statepoint
#[derive(Default)]
pub struct StatepointLoweringState {
    /// Value Spill Cache: incoming value -> stack address chosen for it.
    locations: FxHashMap<NodeId, NodeId>,
    /// Relocation Load Cache: spilled pointer -> the value reloading it.
    reloc_locations: FxHashMap<NodeId, NodeId>,

    /// One flag per pool slot; `true` means the slot is claimed by some
    /// value of the current safepoint.
    allocated_stack_slots: Vec<bool>,
    /// Next pool index the allocation scan will examine.
    next_slot_to_allocate: usize,

    /// Relocation records announced for the current safepoint and not yet
    /// resolved. Consistency bookkeeping only.
    pending_relocations: FxHashSet<ValueId>,
}

impl StatepointLoweringState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for the next safepoint. The bitmap is resized to the pool's
    /// current length and cleared; the caches and cursor are dropped.
    ///
    /// Precondition: every relocation of the previous safepoint has been
    /// resolved.
    pub fn start_new_statepoint(&mut self, ctx: &LowerCtx) {
        debug_assert!(
            self.pending_relocations.is_empty(),
            "starting a safepoint before the previous one's relocations were resolved"
        );
        self.locations.clear();
        self.reloc_locations.clear();
        self.next_slot_to_allocate = 0;
        // The pool may have grown since the last safepoint; the bitmap must
        // track its length exactly.
        self.allocated_stack_slots.clear();
        self.allocated_stack_slots
            .resize(ctx.frame.statepoint_slots.len(), false);
    }

    /// Allocate a stack slot for a value of `ty`, reusing a pool slot when
    /// one is free and growing the pool otherwise. Returns a frame-index
    /// node for the chosen slot.
    pub fn allocate_stack_slot(&mut self, ty: Type, ctx: &mut LowerCtx) -> NodeId {
        ctx.frame.stats.slots_allocated += 1;

        // Termination is structural: each iteration either returns or
        // advances the cursor past a reserved slot, and the pool grows by
        // exactly one when the cursor runs off the end.
        loop {
            let num_slots = self.allocated_stack_slots.len();
            debug_assert_eq!(
                ctx.frame.statepoint_slots.len(),
                num_slots,
                "reservation bitmap out of sync with the slot pool"
            );
            debug_assert!(
                self.next_slot_to_allocate <= num_slots,
                "allocation cursor ran past the pool"
            );

            if self.next_slot_to_allocate == num_slots {
                let slot = ctx.frame.create_stack_slot(ty);
                ctx.frame.statepoint_slots.push(slot);
                self.allocated_stack_slots.push(true);

                let required = num_slots as u32 + 1;
                if required > ctx.frame.stats.max_slots_required {
                    ctx.frame.stats.max_slots_required = required;
                }
                return ctx.dag.frame_index(slot, ty);
            }

            if !self.allocated_stack_slots[self.next_slot_to_allocate] {
                let slot = ctx.frame.statepoint_slots[self.next_slot_to_allocate];
                self.allocated_stack_slots[self.next_slot_to_allocate] = true;
                return ctx.dag.frame_index(slot, ty);
            }

            // The cursor advances only past reserved slots. Advancing on a
            // hit as well once caused a reuse bug; keep this asymmetric.
            self.next_slot_to_allocate += 1;
        }
    }

    /// Mark the pool slot at `index` reserved without scanning. Used by the
    /// reuse heuristic when it recognizes a reload of an existing slot.
    pub fn reserve_stack_slot(&mut self, index: usize) {
        debug_assert!(
            !self.allocated_stack_slots[index],
            "slot {index} reserved twice in one safepoint"
        );
        self.allocated_stack_slots[index] = true;
    }

    pub fn is_stack_slot_allocated(&self, index: usize) -> bool {
        self.allocated_stack_slots[index]
    }

    pub fn location(&self, value: NodeId) -> Option<NodeId> {
        self.locations.get(&value).copied()
    }

    pub fn set_location(&mut self, value: NodeId, loc: NodeId) {
        let prev = self.locations.insert(value, loc);
        debug_assert!(prev.is_none(), "spill location assigned twice");
    }

    pub fn reloc_location(&self, value: NodeId) -> Option<NodeId> {
        self.reloc_locations.get(&value).copied()
    }

    pub fn set_reloc_location(&mut self, value: NodeId, loaded: NodeId) {
        let prev = self.reloc_locations.insert(value, loaded);
        debug_assert!(prev.is_none(), "relocation reloaded twice");
    }

    /// Announce a relocation record of the safepoint being lowered.
    pub fn schedule_relocation(&mut self, site: ValueId) {
        self.pending_relocations.insert(site);
    }

    /// Note that the relocation defining `site` has been lowered.
    pub fn relocation_visited(&mut self, site: ValueId) {
        let was_pending = self.pending_relocations.remove(&site);
        debug_assert!(was_pending, "relocation lowered but never scheduled");
    }
}
