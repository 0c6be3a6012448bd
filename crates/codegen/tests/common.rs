use waypoint_codegen::{
    dag::{NodeId, NodeKind},
    lower::LowerCtx,
};
use waypoint_ir::{
    CallConv, Function, GcRelocate, Signature, StatepointKind, StatepointSite, Type, Value,
    ValueId,
};

/// Declare an external function and return the value of its address.
pub fn declare_callee(func: &mut Function, name: &str, ret_ty: Type) -> ValueId {
    let ext = func.declare_ext_func(Signature::new(name, &[], ret_ty));
    func.make_func_value(ext)
}

/// A safepoint site around a call to `callee` with the given VM-state
/// values and relocation records. The count placeholder is prepended the
/// way the frontend records it.
pub fn make_site(
    func: &mut Function,
    callee: ValueId,
    ret_ty: Type,
    deopt: &[ValueId],
    relocates: Vec<GcRelocate>,
) -> StatepointSite {
    let count = func.make_imm_value(deopt.len() as u64);
    let mut vm_state = vec![count];
    vm_state.extend_from_slice(deopt);
    let result = func.make_value(Value::Inst { ty: ret_ty });
    StatepointSite {
        id: 0,
        kind: StatepointKind::Call,
        callee,
        call_conv: CallConv::C,
        flags: 0,
        ret_ty,
        call_args: Vec::new(),
        vm_state,
        relocates,
        gc_args: Vec::new(),
        result,
    }
}

/// Install a register-resident node for an instruction-defined value, as
/// instruction selection would have before reaching the safepoint.
pub fn seed_reg_value(ctx: &mut LowerCtx, value: ValueId) -> NodeId {
    let ty = ctx.value_ty(value);
    let reg = ctx.frame.create_vreg(ty);
    let entry = ctx.dag.entry();
    let node = ctx.dag.copy_from_reg(entry, reg, ty);
    ctx.set_value(value, node);
    node
}

/// Install a frame-address node for a value, as lowering an alloca would.
pub fn seed_alloca_value(ctx: &mut LowerCtx, value: ValueId) -> NodeId {
    let ty = ctx.value_ty(value);
    let slot = ctx.frame.create_stack_slot(ty);
    let node = ctx.dag.frame_index(slot, ty);
    ctx.set_value(value, node);
    node
}

pub fn count_stores(ctx: &LowerCtx) -> usize {
    ctx.dag.count_kind(|k| k == NodeKind::Store)
}

pub fn count_loads(ctx: &LowerCtx) -> usize {
    ctx.dag.count_kind(|k| k == NodeKind::Load)
}

pub fn count_calls(ctx: &LowerCtx) -> usize {
    ctx.dag.count_kind(|k| k == NodeKind::Call)
}
