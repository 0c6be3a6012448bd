//! This module contains the post-safepoint lowering: reading a relocated
//! pointer back out of its spill slot, and reading the safepoint's call
//! result.
use waypoint_ir::{GcRelocate, StatepointSite, ValueId};

use crate::{
    dag::NodeId,
    lower::LowerCtx,
    statepoint::{
        call::callee_return_ty,
        meta_args::{classify_incoming, Incoming},
        slots::StatepointLoweringState,
    },
};

/// Lower a `gc.result` reading the return value of `site`, defining
/// `result`.
pub fn lower_gc_result(ctx: &mut LowerCtx, site: &StatepointSite, result: ValueId) -> NodeId {
    let node = if site.is_invoke() {
        // The value was exported into a register because it is read from a
        // different block. The default value map would hand back a copy of
        // the safepoint's declared type, which may not match the call's
        // native return representation, so read the register with the
        // callee's own return type.
        let ret_ty = callee_return_ty(ctx, site);
        let reg = *ctx
            .frame
            .exported_values
            .get(&site.result)
            .unwrap_or_else(|| panic!("invoke safepoint result was never exported"));
        let chain = ctx.root();
        ctx.dag.copy_from_reg(chain, reg, ret_ty)
    } else {
        // The call's value was remembered in place when the call sequence
        // was reconstructed.
        ctx.get_value(site.result)
    };
    ctx.set_value(result, node);
    node
}

/// Lower one relocation reference after its safepoint, defining the value
/// `reloc.site`. Returns that value's node.
pub fn lower_gc_relocate(
    state: &mut StatepointLoweringState,
    ctx: &mut LowerCtx,
    reloc: &GcRelocate,
) -> NodeId {
    state.relocation_visited(reloc.site);

    let derived = ctx.get_value(reloc.derived);
    match classify_incoming(ctx, derived) {
        // Constants and frame addresses were never spilled; there is
        // nothing to reload.
        Incoming::Constant(_) | Incoming::StackAddress(_) => {
            ctx.set_value(reloc.site, derived);
            return derived;
        }
        Incoming::Spillable(_) => {}
    }

    if let Some(loaded) = state.reloc_location(derived) {
        // Another relocation of the same pointer already reloaded it.
        ctx.set_value(reloc.site, loaded);
        return loaded;
    }

    // A relocation reference implies the pointer was a declared GC value,
    // so meta-arg lowering must have recorded a spill slot for it.
    let spill_slot = state
        .location(derived)
        .unwrap_or_else(|| panic!("relocated pointer was never spilled"));

    // Conservatively order the reload after everything pending; nothing may
    // drift back across the safepoint.
    let chain = ctx.root();
    let ty = ctx.dag.ty(derived);
    let loaded = ctx.dag.load(ty, chain, spill_slot);
    state.set_reloc_location(derived, loaded);
    ctx.set_root(loaded);

    ctx.set_value(reloc.site, loaded);
    loaded
}
