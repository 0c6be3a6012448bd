//! This module contains an optional validation pass cross-checking the GC
//! values of a safepoint against the collector's strategy. It runs
//! independently of the lowering and reports findings as a diagnostic list;
//! the lowering driver invokes it in debug builds only and trusts the
//! upstream verifier otherwise.
use waypoint_ir::{Function, StatepointSite, ValueId};

/// The collector's view of which values are managed pointers. `None` means
/// the strategy cannot tell for this value.
pub trait GcStrategy {
    fn is_gc_managed_pointer(&self, func: &Function, value: ValueId) -> Option<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcValueRole {
    Base,
    Derived,
    Relocated,
}

/// A value the strategy positively identified as not GC-managed even though
/// it flows through a safepoint's GC operand set.
#[derive(Debug, Clone, Copy)]
pub struct GcPointerDiag {
    pub role: GcValueRole,
    pub value: ValueId,
}

/// Check every base, derived, and relocated value of `site` against the
/// strategy. A well-formed safepoint produces an empty list.
pub fn check_statepoint_gc_values(
    func: &Function,
    site: &StatepointSite,
    strategy: &dyn GcStrategy,
) -> Vec<GcPointerDiag> {
    let mut diags = Vec::new();
    let mut check = |role: GcValueRole, value: ValueId| {
        if strategy.is_gc_managed_pointer(func, value) == Some(false) {
            diags.push(GcPointerDiag { role, value });
        }
    };

    for reloc in &site.relocates {
        check(GcValueRole::Base, reloc.base);
        check(GcValueRole::Derived, reloc.derived);
        check(GcValueRole::Relocated, reloc.site);
    }
    diags
}
