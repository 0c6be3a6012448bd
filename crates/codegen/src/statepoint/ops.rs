//! This module contains an accessor over the assembled safepoint operand
//! list. The layout is a binding contract for the downstream record
//! encoder:
//!
//! ```text
//! [0]                  arg count (direct call args)
//! [1]                  call target
//! [2 .. 2+argc-1]      call arguments
//! [next, next+1]       ConstantOp tag, flags | (call_conv << 1)
//! [next, next+1]       ConstantOp tag, VM-state count
//! [next ..]            VM-state operands (1 or 2 each)
//! [next ..]            GC pairs, base then derived, interleaved
//! [next ..]            explicit user slots (no count prefix)
//! [next]               register mask
//! [next]               chain
//! [next, optional]     glue
//! ```
use std::fmt;

use crate::{
    dag::{Dag, NodeId, NodeKind},
    frame::StackSlot,
};

/// Marker distinguishing a literal operand from a location in the record.
pub const CONSTANT_OP: i64 = 4096;

/// A decoded meta-block operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaOperand {
    /// An inlined constant (a `[ConstantOp, imm]` pair in the raw list).
    Constant(i64),
    /// A stack address; the runtime reads the value out of the frame.
    Slot(StackSlot),
    /// Anything else; does not occur in well-formed safepoints.
    Other(NodeId),
}

pub struct StatepointOpers<'a> {
    dag: &'a Dag,
    ops: &'a [NodeId],
}

impl<'a> StatepointOpers<'a> {
    /// Wrap the operand list of an assembled safepoint node.
    pub fn new(dag: &'a Dag, node: NodeId) -> Self {
        assert_eq!(dag.kind(node), NodeKind::Statepoint);
        Self {
            dag,
            ops: dag.operands(node),
        }
    }

    fn expect_const(&self, idx: usize) -> i64 {
        match self.dag.kind(self.ops[idx]) {
            NodeKind::TargetConstant(val) | NodeKind::Constant(val) => val,
            kind => panic!("operand {idx}: expected constant, found {kind:?}"),
        }
    }

    /// Number of direct call arguments.
    pub fn arg_count(&self) -> usize {
        self.expect_const(0) as usize
    }

    pub fn call_target(&self) -> NodeId {
        self.ops[1]
    }

    pub fn call_args(&self) -> &[NodeId] {
        &self.ops[2..2 + self.arg_count()]
    }

    fn flags_pos(&self) -> usize {
        2 + self.arg_count()
    }

    /// The packed `flags | (call_conv << 1)` constant.
    pub fn flags_and_call_conv(&self) -> i64 {
        let pos = self.flags_pos();
        debug_assert_eq!(self.expect_const(pos), CONSTANT_OP);
        self.expect_const(pos + 1)
    }

    fn vm_state_count_pos(&self) -> usize {
        self.flags_pos() + 2
    }

    /// Number of VM-state values recorded (not raw operands).
    pub fn vm_state_count(&self) -> usize {
        let pos = self.vm_state_count_pos();
        debug_assert_eq!(self.expect_const(pos), CONSTANT_OP);
        self.expect_const(pos + 1) as usize
    }

    fn decode_meta(&self, mut pos: usize, entries: usize) -> (Vec<MetaOperand>, usize) {
        let mut out = Vec::with_capacity(entries);
        while out.len() < entries {
            let op = self.ops[pos];
            match self.dag.kind(op) {
                NodeKind::TargetConstant(tag) if tag == CONSTANT_OP => {
                    out.push(MetaOperand::Constant(self.expect_const(pos + 1)));
                    pos += 2;
                }
                NodeKind::TargetFrameIndex(slot) | NodeKind::FrameIndex(slot) => {
                    out.push(MetaOperand::Slot(slot));
                    pos += 1;
                }
                _ => {
                    out.push(MetaOperand::Other(op));
                    pos += 1;
                }
            }
        }
        (out, pos)
    }

    /// Decode the VM-state block using the emitted count.
    pub fn vm_state(&self) -> Vec<MetaOperand> {
        let (block, _) = self.decode_meta(self.vm_state_count_pos() + 2, self.vm_state_count());
        block
    }

    fn gc_section_start(&self) -> usize {
        let (_, end) = self.decode_meta(self.vm_state_count_pos() + 2, self.vm_state_count());
        end
    }

    fn register_mask_pos(&self) -> usize {
        self.ops
            .iter()
            .rposition(|&op| self.dag.kind(op) == NodeKind::RegisterMask)
            .unwrap_or_else(|| panic!("safepoint node has no register mask operand"))
    }

    /// The GC section: interleaved pairs followed by explicit user slots.
    /// `pairs` is external knowledge (the pair count is not encoded in the
    /// operand list itself); the remainder of the section is the explicit
    /// slots.
    pub fn gc_pairs(&self, pairs: usize) -> Vec<(MetaOperand, MetaOperand)> {
        let (block, _) = self.decode_meta(self.gc_section_start(), pairs * 2);
        block
            .chunks(2)
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }

    /// Explicit user-placed slots given how many GC pairs precede them.
    pub fn explicit_slots(&self, pairs: usize) -> Vec<StackSlot> {
        let (_, mut pos) = self.decode_meta(self.gc_section_start(), pairs * 2);
        let mut out = Vec::new();
        let end = self.register_mask_pos();
        while pos < end {
            match self.dag.kind(self.ops[pos]) {
                NodeKind::TargetFrameIndex(slot) | NodeKind::FrameIndex(slot) => out.push(slot),
                kind => panic!("unexpected operand in explicit slot section: {kind:?}"),
            }
            pos += 1;
        }
        out
    }

    pub fn register_mask(&self) -> NodeId {
        self.ops[self.register_mask_pos()]
    }

    pub fn chain(&self) -> NodeId {
        self.ops[self.register_mask_pos() + 1]
    }

    pub fn glue(&self) -> Option<NodeId> {
        self.ops.get(self.register_mask_pos() + 2).copied()
    }
}

impl fmt::Display for StatepointOpers<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "arg_count: {}", self.arg_count())?;
        writeln!(f, "flags_and_cc: {}", self.flags_and_call_conv())?;
        writeln!(f, "vm_state:")?;
        for op in self.vm_state() {
            match op {
                MetaOperand::Constant(val) => writeln!(f, "  const {val}")?,
                MetaOperand::Slot(slot) => writeln!(f, "  slot{}", slot.0)?,
                MetaOperand::Other(node) => writeln!(f, "  node{}", node.0)?,
            }
        }
        writeln!(f, "glue: {}", self.glue().is_some())
    }
}
