//! This module contains the reconstruction of a safepoint's wrapped call:
//! the call is lowered through the ordinary path and the resulting node
//! sequence is walked backward to recover the pieces the final instruction
//! needs.
use waypoint_ir::{CallConv, StatepointSite, Type, Value};

use crate::{
    call::lower_ordinary_call,
    dag::{NodeId, NodeKind},
    lower::LowerCtx,
};

/// Lower the call wrapped by `site` and return the produced call node. The
/// safepoint's logical result is recorded so later `gc.result` lowering can
/// find it.
///
/// The expected node shape after ordinary call lowering is:
///
///   ch, glue = callseq_start ch
///   ch, glue = call ch, target, args.., regmask, glue
///   ch, glue = callseq_end ch, glue
///   copy_from_reg ch        (return materialization, if any)
///
/// We walk back from the last node, past the return materialization, to the
/// callseq_end, whose first operand is the call itself.
pub(super) fn lower_call_from_statepoint(ctx: &mut LowerCtx, site: &StatepointSite) -> NodeId {
    let mut callee = ctx.get_value(site.callee);

    // Immediate and symbolic callees become direct operands of the final
    // instruction.
    match ctx.dag.kind(callee) {
        NodeKind::Constant(addr) => {
            callee = ctx.dag.target_constant(addr, Type::Ptr);
        }
        NodeKind::GlobalAddress(func) => {
            callee = ctx.dag.target_global_address(func);
        }
        _ => {}
    }

    assert!(
        site.call_conv != CallConv::AnyReg,
        "anyreg calling convention is not supported on safepoints"
    );

    let has_def = site.ret_ty != Type::Unit;

    let args: Vec<NodeId> = site.call_args.iter().map(|&v| ctx.get_value(v)).collect();
    let (return_value, call_end_val) = lower_ordinary_call(ctx, callee, &args, site.ret_ty);

    let mut call_end = call_end_val;
    if has_def
        && matches!(
            ctx.dag.kind(call_end),
            NodeKind::CopyFromReg(_) | NodeKind::Load
        )
    {
        // Skip the return materialization; it can be a register copy or a
        // load of a value returned by reference through the stack.
        call_end = ctx.dag.operands(call_end)[0];
    }
    assert_eq!(
        ctx.dag.kind(call_end),
        NodeKind::CallSeqEnd,
        "ordinary call lowering produced an unexpected sequence"
    );

    if has_def {
        let return_value = return_value
            .unwrap_or_else(|| panic!("non-void call lowered without a return value"));
        if site.is_invoke() {
            // The result is read from a different block, so it must travel
            // through a register. The register is created with the
            // safepoint's declared type, which may differ from the call's
            // native return representation; the default export path would
            // pick the wrong one.
            let reg = ctx.frame.create_vreg(site.ret_ty);
            let entry = ctx.dag.entry();
            let copy = ctx.dag.copy_to_reg(entry, reg, return_value);
            ctx.pending_exports.push(copy);
            ctx.frame.exported_values.insert(site.result, reg);
        } else {
            // The safepoint's value is the call's value; the node itself is
            // about to be replaced, `gc.result` will pick this up.
            ctx.set_value(site.result, return_value);
        }
    } else {
        // The token is never read; give it a recognizable placeholder.
        let poison = ctx.dag.constant(-1, Type::Ptr);
        ctx.set_value(site.result, poison);
    }

    ctx.dag.operands(call_end)[0]
}

/// The callee's native return type, used when reading an invoke's result
/// back out of the exported register.
pub(super) fn callee_return_ty(ctx: &LowerCtx, site: &StatepointSite) -> Type {
    match *ctx.func.value(site.callee) {
        Value::Func { func } => ctx.func.ext_funcs[func].ret_ty,
        _ => site.ret_ty,
    }
}
