//! This module contains the source-level description of a safepoint call
//! site: the wrapped call, the VM-state snapshot carried across it, and the
//! GC pointer relocations attached to it.
use crate::{function::BlockId, CallConv, Type, ValueId};

/// How the safepoint is reached. The distinction matters only for the return
/// value: an invoke's result is read from a different block than the call,
/// so it must travel through an explicitly created register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatepointKind {
    Call,
    Invoke { landing_pad: BlockId },
}

/// One `gc.relocate` attached to a safepoint: the (base, derived) pointer
/// pair it tracks and the value the relocation itself defines.
#[derive(Debug, Clone, Copy)]
pub struct GcRelocate {
    pub base: ValueId,
    pub derived: ValueId,
    /// The relocation-site identity; also the value the reload defines.
    pub site: ValueId,
}

/// A fully-verified safepoint call site.
///
/// Produced by an earlier pass; this crate does not decide which values are
/// tracked, it only describes them. `vm_state` keeps the frontend's layout:
/// the first element is the recorded count of the values that follow it.
#[derive(Debug, Clone)]
pub struct StatepointSite {
    pub id: u64,
    pub kind: StatepointKind,

    pub callee: ValueId,
    pub call_conv: CallConv,
    /// Reserved; must currently be zero.
    pub flags: u64,
    /// The safepoint's declared return type. May differ from the callee's
    /// native return representation.
    pub ret_ty: Type,
    pub call_args: Vec<ValueId>,

    /// VM-state values, prefixed by the frontend-recorded count placeholder.
    pub vm_state: Vec<ValueId>,
    /// Relocation records, in declaration order.
    pub relocates: Vec<GcRelocate>,
    /// Explicitly user-placed stack addresses, appended verbatim to the
    /// operand list.
    pub gc_args: Vec<ValueId>,

    /// The value the safepoint itself defines (what `gc.result` reads).
    pub result: ValueId,
}

impl StatepointSite {
    /// Number of VM-state values, excluding the leading count placeholder.
    pub fn num_vm_state_args(&self) -> usize {
        debug_assert!(
            !self.vm_state.is_empty(),
            "vm_state must carry at least the count placeholder"
        );
        self.vm_state.len() - 1
    }

    /// The VM-state values proper, skipping the count placeholder.
    pub fn vm_state_args(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.vm_state.iter().skip(1).copied()
    }

    pub fn is_invoke(&self) -> bool {
        matches!(self.kind, StatepointKind::Invoke { .. })
    }
}
