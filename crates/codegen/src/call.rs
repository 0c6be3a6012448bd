//! This module contains generic call lowering. The safepoint subsystem
//! lowers its wrapped call through this path and then mines the produced
//! node sequence, so the shape emitted here is a contract:
//!
//!   ch, glue = callseq_start ch
//!   ch, glue = call ch, target, args.., regmask, glue
//!   ch, glue = callseq_end ch, glue
//!   copy_from_reg ch   (only for a non-void return)
//!
//! Tail calls are never produced.
use waypoint_ir::Type;

use crate::{
    dag::{NodeId, NodeKind},
    lower::LowerCtx,
};

/// Lower a call to `callee` with already-lowered `args`.
///
/// Returns the return value (if `ret_ty` is non-void) and the last node of
/// the call sequence; the latter is the copy-from-reg when a return value
/// exists, otherwise the callseq_end itself. The context root is advanced
/// past the whole sequence.
pub fn lower_ordinary_call(
    ctx: &mut LowerCtx,
    callee: NodeId,
    args: &[NodeId],
    ret_ty: Type,
) -> (Option<NodeId>, NodeId) {
    let start = ctx
        .dag
        .make_node(NodeKind::CallSeqStart, Type::Unit, &[ctx.root()]);

    let regmask = ctx.dag.register_mask();
    let mut operands = Vec::with_capacity(args.len() + 4);
    operands.push(start);
    operands.push(callee);
    operands.extend_from_slice(args);
    operands.push(regmask);
    // Glue the call to its sequence start.
    operands.push(start);
    let call = ctx.dag.make_node(NodeKind::Call, ret_ty, &operands);

    let end = ctx
        .dag
        .make_node(NodeKind::CallSeqEnd, Type::Unit, &[call, call]);
    ctx.set_root(end);

    if ret_ty == Type::Unit {
        return (None, end);
    }

    let ret_reg = ctx.frame.create_vreg(ret_ty);
    let ret = ctx.dag.copy_from_reg(end, ret_reg, ret_ty);
    (Some(ret), ret)
}
