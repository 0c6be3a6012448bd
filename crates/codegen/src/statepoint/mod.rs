//! This module contains the safepoint lowering subsystem.
//!
//! A safepoint call site wraps an ordinary call together with a VM-state
//! snapshot and a set of GC pointers that must stay locatable across the
//! call. Lowering turns the whole construct into one instruction whose
//! operand list records, for the runtime's consumer, where every tracked
//! value lives at the call: a register, a stack slot, or an inlined
//! constant.
//!
//! One safepoint is lowered as a single uninterrupted unit of work:
//! per-safepoint state is reset, the slot-reuse pass runs over all spill
//! candidates, VM-state and GC operands are lowered, the wrapped call is
//! lowered through the ordinary path and mined for its pieces, and the
//! final node is spliced in place of the intermediate call. Relocation
//! references are resolved separately afterwards via [`lower_gc_relocate`].
mod call;
mod meta_args;
pub mod ops;
pub mod relocate;
pub mod slots;
pub mod verify;

pub use meta_args::{classify_incoming, Incoming};
pub use ops::{MetaOperand, StatepointOpers, CONSTANT_OP};
pub use relocate::{lower_gc_relocate, lower_gc_result};
pub use slots::StatepointLoweringState;

use waypoint_ir::{StatepointSite, Type};

use crate::{
    dag::{NodeId, NodeKind},
    lower::LowerCtx,
};

/// Lower one safepoint site into its final instruction node.
///
/// On return the intermediate call node has been replaced and removed; the
/// returned node carries the full operand contract (see [`ops`]) and
/// produces an ordering token and an outgoing glue.
pub fn lower_statepoint(
    state: &mut StatepointLoweringState,
    ctx: &mut LowerCtx,
    site: &StatepointSite,
) -> NodeId {
    ctx.frame.stats.statepoints_lowered += 1;

    state.start_new_statepoint(ctx);
    for reloc in &site.relocates {
        state.schedule_relocation(reloc.site);
    }

    #[cfg(debug_assertions)]
    if let Some(strategy) = ctx.gc_strategy() {
        let diags = verify::check_statepoint_gc_values(ctx.func, site, strategy);
        assert!(
            diags.is_empty(),
            "non GC-managed values in safepoint GC operands: {diags:?}"
        );
    }

    // Lower VM-state and GC operands first; this leaves the root at the
    // last spill store so the call sequence chains after every spill.
    let mut meta_ops = Vec::new();
    meta_args::lower_statepoint_meta_args(state, ctx, site, &mut meta_ops);

    // Lower the wrapped call and recover its pieces.
    let call_node = call::lower_call_from_statepoint(ctx, site);

    // Call node shape: chain, target, args.., regmask, glue?
    let glue = ctx.dag.glued_operand(call_node);
    let call_ops: Vec<NodeId> = ctx.dag.operands(call_node).to_vec();
    let num_call_args = call_ops.len() - if glue.is_some() { 4 } else { 3 };

    let mut ops = Vec::with_capacity(call_ops.len() + meta_ops.len() + 8);
    ops.push(ctx.dag.target_constant(num_call_args as i64, Type::I32));
    ops.push(call_ops[1]);

    let regmask_pos = call_ops.len() - if glue.is_some() { 2 } else { 1 };
    ops.extend_from_slice(&call_ops[2..regmask_pos]);

    // Flags and calling convention travel as one packed constant.
    assert_eq!(site.flags, 0, "safepoint flags are reserved and must be zero");
    let packed = (site.flags | (site.call_conv.as_u64() << 1)) as i64;
    ops.push(ctx.dag.target_constant(CONSTANT_OP, Type::I64));
    ops.push(ctx.dag.target_constant(packed, Type::I64));

    ops.extend_from_slice(&meta_ops);

    ops.push(call_ops[regmask_pos]);
    // Chain.
    ops.push(call_ops[0]);
    if let Some(glue) = glue {
        ops.push(glue);
    }

    let statepoint = ctx.dag.make_node(NodeKind::Statepoint, Type::Unit, &ops);

    // The intermediate call ceases to exist; everything that referenced it
    // now orders itself after the safepoint instruction instead.
    ctx.dag.replace_all_uses_with(call_node, statepoint);
    ctx.dag.remove_node(call_node);

    // The root is not touched here: it already points past the call
    // sequence, and the use rewrite above redirected it if it went through
    // the call node.
    statepoint
}
