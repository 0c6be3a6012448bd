//! This module contains the meta-argument lowering for a safepoint: the
//! slot-reuse heuristic, value spilling, GC pair collection, and assembly of
//! the ordered operand block the final instruction carries.
use rustc_hash::FxHashSet;
use waypoint_ir::{StatepointSite, Type, ValueId};

use crate::{
    dag::{NodeId, NodeKind},
    frame::StackSlot,
    lower::LowerCtx,
    statepoint::{ops::CONSTANT_OP, slots::StatepointLoweringState},
};

/// Boundary classification of a value incoming to a safepoint. Decided once;
/// everything downstream matches on this and never re-inspects the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// Recorded inline in the operand list; never spilled.
    Constant(i64),
    /// Already a stack address; its address is the value.
    StackAddress(StackSlot),
    /// Needs a stack location to be locatable across the call.
    Spillable(NodeId),
}

pub fn classify_incoming(ctx: &LowerCtx, node: NodeId) -> Incoming {
    match ctx.dag.kind(node) {
        NodeKind::Constant(val) | NodeKind::TargetConstant(val) => Incoming::Constant(val),
        NodeKind::FrameIndex(slot) | NodeKind::TargetFrameIndex(slot) => {
            Incoming::StackAddress(slot)
        }
        _ => Incoming::Spillable(node),
    }
}

/// Try to reserve, for `incoming`, the pool slot it was last reloaded from.
///
/// If the value is a load whose address is a pool slot not yet reserved this
/// safepoint, claim that slot and seed the spill cache so no new store is
/// emitted for the value. Purely an optimization; skipping it only costs
/// moves.
pub(super) fn reserve_previous_stack_slot_for_value(
    state: &mut StatepointLoweringState,
    ctx: &mut LowerCtx,
    incoming: NodeId,
) {
    match classify_incoming(ctx, incoming) {
        // These never spill, so there is nothing to reserve.
        Incoming::Constant(_) | Incoming::StackAddress(_) => return,
        Incoming::Spillable(_) => {}
    }

    if state.location(incoming).is_some() {
        // Duplicate in the input; the first occurrence claimed a slot.
        return;
    }

    // Search for the reload-from-pool-slot pattern. Simple load/store
    // sequences are enough to catch the common shuffles between calls.
    if ctx.dag.kind(incoming) != NodeKind::Load {
        return;
    }
    let addr = ctx.dag.operands(incoming)[1];
    let slot = match ctx.dag.kind(addr) {
        NodeKind::FrameIndex(slot) | NodeKind::TargetFrameIndex(slot) => slot,
        _ => return,
    };

    let Some(index) = ctx.frame.statepoint_slot_index(slot) else {
        // Not one of our dedicated lowering slots; the frame object could
        // have been written since, so it cannot be reused.
        return;
    };
    if state.is_stack_slot_allocated(index) {
        // Already claimed by another value this safepoint.
        return;
    }
    state.reserve_stack_slot(index);

    let ty = ctx.dag.ty(incoming);
    let loc = ctx.dag.target_frame_index(slot, ty);
    state.set_location(incoming, loc);
}

/// Spill `incoming`, reusing a cached location when one exists. Returns the
/// stack address operand and the outgoing chain (unchanged on a cache hit).
fn spill_incoming_statepoint_value(
    state: &mut StatepointLoweringState,
    ctx: &mut LowerCtx,
    incoming: NodeId,
    chain: NodeId,
) -> (NodeId, NodeId) {
    if let Some(loc) = state.location(incoming) {
        return (loc, chain);
    }

    let ty = ctx.dag.ty(incoming);
    let slot_addr = state.allocate_stack_slot(ty, ctx);
    let NodeKind::FrameIndex(slot) = ctx.dag.kind(slot_addr) else {
        unreachable!("allocate_stack_slot must return a frame index");
    };
    // Pin the address as a direct operand so selection leaves it alone.
    let loc = ctx.dag.target_frame_index(slot, ty);

    // Chained after every prior store: writes into the shared frame must
    // stay ordered.
    let chain = ctx.dag.store(chain, incoming, loc);
    state.set_location(incoming, loc);
    (loc, chain)
}

/// Lower one value incoming to the safepoint, VM-state or GC alike, pushing
/// its operand encoding onto `ops`.
pub(super) fn lower_incoming_statepoint_value(
    state: &mut StatepointLoweringState,
    ctx: &mut LowerCtx,
    incoming: NodeId,
    ops: &mut Vec<NodeId>,
) {
    let chain = ctx.root();

    match classify_incoming(ctx, incoming) {
        Incoming::Constant(val) => {
            // Recorded as a tagged pair so the consumer can tell an inlined
            // constant from a location. Also covers null pointers in GC
            // state.
            let tag = ctx.dag.target_constant(CONSTANT_OP, Type::I64);
            let imm = ctx.dag.target_constant(val, Type::I64);
            ops.push(tag);
            ops.push(imm);
        }
        Incoming::StackAddress(slot) => {
            let ty = ctx.dag.ty(incoming);
            ops.push(ctx.dag.target_frame_index(slot, ty));
        }
        Incoming::Spillable(node) => {
            let (loc, chain) = spill_incoming_statepoint_value(state, ctx, node, chain);
            ops.push(loc);
            ctx.set_root(chain);
        }
    }
}

/// Collect the (base, derived, relocation-site) triples of a safepoint in
/// declaration order, then drop entries whose lowered derived value repeats
/// an earlier one.
pub(super) fn incoming_gc_values(
    ctx: &mut LowerCtx,
    site: &StatepointSite,
) -> (Vec<ValueId>, Vec<ValueId>, Vec<ValueId>) {
    let mut bases = Vec::with_capacity(site.relocates.len());
    let mut ptrs = Vec::with_capacity(site.relocates.len());
    let mut relocs = Vec::with_capacity(site.relocates.len());
    for reloc in &site.relocates {
        bases.push(reloc.base);
        ptrs.push(reloc.derived);
        relocs.push(reloc.site);
    }

    remove_duplicate_gc_ptrs(ctx, &mut bases, &mut ptrs, &mut relocs);
    debug_assert!(bases.len() == ptrs.len() && ptrs.len() == relocs.len());
    (bases, ptrs, relocs)
}

/// Drop derived-pointer duplicates, keeping first occurrences. Not required
/// for correctness; it only shrinks the emitted record.
fn remove_duplicate_gc_ptrs(
    ctx: &mut LowerCtx,
    bases: &mut Vec<ValueId>,
    ptrs: &mut Vec<ValueId>,
    relocs: &mut Vec<ValueId>,
) {
    let mut seen: FxHashSet<NodeId> = FxHashSet::default();
    let mut keep = Vec::with_capacity(ptrs.len());
    for &ptr in ptrs.iter() {
        let node = ctx.get_value(ptr);
        keep.push(seen.insert(node));
    }

    let mut it = keep.iter().copied();
    bases.retain(|_| it.next().unwrap());
    let mut it = keep.iter().copied();
    ptrs.retain(|_| it.next().unwrap());
    let mut it = keep.iter().copied();
    relocs.retain(|_| it.next().unwrap());
}

/// Lower the VM-state and GC arguments of `site` into `ops`.
///
/// Layout: VM-state count (constant-encoded), the VM-state values, the GC
/// pairs interleaved base-then-derived, then any user-placed stack
/// addresses. The reuse pass runs over the union of VM-state and GC
/// candidates before either group lowers, so neither starves the other of
/// slot preferences. On return the context root is the last spill store, if
/// any were emitted.
pub(super) fn lower_statepoint_meta_args(
    state: &mut StatepointLoweringState,
    ctx: &mut LowerCtx,
    site: &StatepointSite,
    ops: &mut Vec<NodeId>,
) {
    let (bases, ptrs, _relocs) = incoming_gc_values(ctx, site);

    // Reservation pass over every spill candidate, before any real
    // allocation happens for any value of this safepoint.
    for value in site.vm_state_args() {
        let incoming = ctx.get_value(value);
        reserve_previous_stack_slot_for_value(state, ctx, incoming);
    }
    for i in 0..bases.len() * 2 {
        let value = if i % 2 == 0 { bases[i / 2] } else { ptrs[i / 2] };
        let incoming = ctx.get_value(value);
        reserve_previous_stack_slot_for_value(state, ctx, incoming);
    }

    // Count prefix: the number of VM-state *values*, not operands.
    let num_vm_state = site.num_vm_state_args();
    debug_assert_eq!(
        ctx.func
            .value_imm(site.vm_state[0])
            .map(|imm| imm.as_i64()),
        Some(num_vm_state as i64),
        "recorded VM-state count placeholder disagrees with the operand list"
    );
    let tag = ctx.dag.target_constant(CONSTANT_OP, Type::I64);
    let count = ctx.dag.target_constant(num_vm_state as i64, Type::I64);
    ops.push(tag);
    ops.push(count);

    // The VM-state values are opaque to us; lower them in declaration
    // order, skipping the count placeholder handled above.
    for value in site.vm_state_args() {
        let incoming = ctx.get_value(value);
        lower_incoming_statepoint_value(state, ctx, incoming, ops);
    }

    // GC pairs, each base immediately followed by its derived pointer:
    // (base[0], ptr[0], base[1], ptr[1], ...).
    for i in 0..bases.len() * 2 {
        let value = if i % 2 == 0 { bases[i / 2] } else { ptrs[i / 2] };
        let incoming = ctx.get_value(value);
        lower_incoming_statepoint_value(state, ctx, incoming, ops);
    }

    // Explicit user-placed slots come last, with no count prefix. Only
    // stack addresses are recorded; anything else is dropped, since it is
    // the slot contents the consumer may update, not a pointer value.
    for &value in &site.gc_args {
        let incoming = ctx.get_value(value);
        if let Incoming::StackAddress(slot) = classify_incoming(ctx, incoming) {
            let ty = ctx.dag.ty(incoming);
            ops.push(ctx.dag.target_frame_index(slot, ty));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_ir::{Function, Signature, Value};

    fn setup() -> Function {
        Function::new(Signature::new("f", &[], Type::Unit))
    }

    #[test]
    fn classify_matches_node_kinds() {
        let func = setup();
        let mut ctx = LowerCtx::new(&func);

        let c = ctx.dag.constant(5, Type::I64);
        assert_eq!(classify_incoming(&ctx, c), Incoming::Constant(5));

        let slot = ctx.frame.create_stack_slot(Type::Ptr);
        let fi = ctx.dag.frame_index(slot, Type::Ptr);
        assert_eq!(classify_incoming(&ctx, fi), Incoming::StackAddress(slot));

        let reg = ctx.frame.create_vreg(Type::Ptr);
        let entry = ctx.dag.entry();
        let v = ctx.dag.copy_from_reg(entry, reg, Type::Ptr);
        assert_eq!(classify_incoming(&ctx, v), Incoming::Spillable(v));
    }

    #[test]
    fn dedup_keeps_first_occurrence_and_is_idempotent() {
        let mut func = setup();
        let p = func.make_value(Value::Inst { ty: Type::Ptr });
        let q = func.make_value(Value::Inst { ty: Type::Ptr });
        let b1 = func.make_value(Value::Inst { ty: Type::Ptr });
        let b2 = func.make_value(Value::Inst { ty: Type::Ptr });
        let r1 = func.make_value(Value::Inst { ty: Type::Ptr });
        let r2 = func.make_value(Value::Inst { ty: Type::Ptr });
        let r3 = func.make_value(Value::Inst { ty: Type::Ptr });

        let mut ctx = LowerCtx::new(&func);
        let entry = ctx.dag.entry();
        for v in [p, q, b1, b2] {
            let reg = ctx.frame.create_vreg(Type::Ptr);
            let node = ctx.dag.copy_from_reg(entry, reg, Type::Ptr);
            ctx.set_value(v, node);
        }

        // p relocated twice (under different bases, even), q once.
        let mut bases = vec![b1, b2, b1];
        let mut ptrs = vec![p, p, q];
        let mut relocs = vec![r1, r2, r3];
        remove_duplicate_gc_ptrs(&mut ctx, &mut bases, &mut ptrs, &mut relocs);
        assert_eq!(bases, vec![b1, b1]);
        assert_eq!(ptrs, vec![p, q]);
        assert_eq!(relocs, vec![r1, r3]);

        // Running it again must be a no-op.
        let (b_before, p_before, r_before) = (bases.clone(), ptrs.clone(), relocs.clone());
        remove_duplicate_gc_ptrs(&mut ctx, &mut bases, &mut ptrs, &mut relocs);
        assert_eq!(bases, b_before);
        assert_eq!(ptrs, p_before);
        assert_eq!(relocs, r_before);
    }

    #[test]
    fn reuse_heuristic_claims_pool_slot_of_a_reload() {
        let func = setup();
        let mut ctx = LowerCtx::new(&func);
        let mut state = StatepointLoweringState::new();

        // Seed the pool with one slot, as a previous safepoint would have.
        state.start_new_statepoint(&ctx);
        let fi = state.allocate_stack_slot(Type::Ptr, &mut ctx);
        let crate::dag::NodeKind::FrameIndex(slot) = ctx.dag.kind(fi) else {
            unreachable!()
        };

        // A reload of that slot arrives at the next safepoint.
        state.start_new_statepoint(&ctx);
        let entry = ctx.dag.entry();
        let addr = ctx.dag.target_frame_index(slot, Type::Ptr);
        let reload = ctx.dag.load(Type::Ptr, entry, addr);

        reserve_previous_stack_slot_for_value(&mut state, &mut ctx, reload);
        assert!(state.is_stack_slot_allocated(0));
        let loc = state.location(reload).expect("cache must be seeded");
        assert_eq!(ctx.dag.kind(loc), NodeKind::TargetFrameIndex(slot));

        // Spilling the value now emits no store and returns the cached
        // address.
        let stores_before = ctx.dag.count_kind(|k| k == NodeKind::Store);
        let chain = ctx.root();
        let (loc2, chain2) = spill_incoming_statepoint_value(&mut state, &mut ctx, reload, chain);
        assert_eq!(loc2, loc);
        assert_eq!(chain2, chain);
        assert_eq!(ctx.dag.count_kind(|k| k == NodeKind::Store), stores_before);
    }

    #[test]
    fn reuse_heuristic_ignores_foreign_frame_objects() {
        let func = setup();
        let mut ctx = LowerCtx::new(&func);
        let mut state = StatepointLoweringState::new();
        state.start_new_statepoint(&ctx);

        // A load from an alloca that is not part of the pool.
        let foreign = ctx.frame.create_stack_slot(Type::Ptr);
        let entry = ctx.dag.entry();
        let addr = ctx.dag.frame_index(foreign, Type::Ptr);
        let reload = ctx.dag.load(Type::Ptr, entry, addr);

        reserve_previous_stack_slot_for_value(&mut state, &mut ctx, reload);
        assert!(state.location(reload).is_none());
    }
}
