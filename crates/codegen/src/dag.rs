//! This module contains the low-level node graph produced by lowering.
//!
//! The graph is deliberately sequential: loads and stores double as chain
//! values, so side effects are totally ordered by construction. Nodes are
//! single-valued; a node that logically produces a chain or glue alongside
//! its value is referenced directly wherever that chain or glue is consumed.
use cranelift_entity::PrimaryMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use waypoint_ir::{ExtFuncRef, Type};

use crate::frame::{StackSlot, VReg};

/// An opaque reference to a [`NodeData`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct NodeId(pub u32);
cranelift_entity::entity_impl!(NodeId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The function's incoming chain.
    Entry,
    Constant(i64),
    /// A constant that must stay an operand of the instruction selecting it,
    /// never materialized on its own.
    TargetConstant(i64),
    FrameIndex(StackSlot),
    /// Frame address pinned as a direct operand so selection does not turn
    /// it into an address computation.
    TargetFrameIndex(StackSlot),
    GlobalAddress(ExtFuncRef),
    TargetGlobalAddress(ExtFuncRef),
    RegisterMask,
    /// operands: [chain, addr]
    Load,
    /// operands: [chain, value, addr]
    Store,
    CopyFromReg(VReg),
    /// operands: [chain, value]
    CopyToReg(VReg),
    /// operands: [chain]
    CallSeqStart,
    /// operands: [chain, target, args.., regmask, glue?]
    Call,
    /// operands: [chain, glue]
    CallSeqEnd,
    /// The assembled safepoint instruction. Produces two logical results:
    /// value 0 is an ordering token, value 1 an outgoing glue.
    Statepoint,
}

impl NodeKind {
    /// Whether a node of this kind produces a glue result that a following
    /// node may consume as its last operand.
    pub fn produces_glue(self) -> bool {
        matches!(
            self,
            Self::CallSeqStart
                | Self::Call
                | Self::CallSeqEnd
                | Self::CopyToReg(_)
                | Self::Statepoint
        )
    }

    /// Whether a node of this kind carries a chain result that later memory
    /// operations can be ordered after.
    pub fn is_chain(self) -> bool {
        matches!(
            self,
            Self::Entry
                | Self::Load
                | Self::Store
                | Self::CopyToReg(_)
                | Self::CallSeqStart
                | Self::Call
                | Self::CallSeqEnd
                | Self::Statepoint
        )
    }
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    pub ty: Type,
    pub operands: SmallVec<[NodeId; 4]>,
}

pub struct Dag {
    nodes: PrimaryMap<NodeId, NodeData>,
    entry: NodeId,
    /// Interning for plain constants, mirroring how repeated source
    /// immediates collapse to one value.
    constants: FxHashMap<(i64, Type), NodeId>,
    removed: FxHashSet<NodeId>,
}

impl Dag {
    pub fn new() -> Self {
        let mut nodes = PrimaryMap::default();
        let entry = nodes.push(NodeData {
            kind: NodeKind::Entry,
            ty: Type::Unit,
            operands: SmallVec::new(),
        });
        Self {
            nodes,
            entry,
            constants: FxHashMap::default(),
            removed: FxHashSet::default(),
        }
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn node(&self, node: NodeId) -> &NodeData {
        &self.nodes[node]
    }

    pub fn kind(&self, node: NodeId) -> NodeKind {
        self.nodes[node].kind
    }

    pub fn ty(&self, node: NodeId) -> Type {
        self.nodes[node].ty
    }

    pub fn operands(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node].operands
    }

    pub fn make_node(&mut self, kind: NodeKind, ty: Type, operands: &[NodeId]) -> NodeId {
        self.nodes.push(NodeData {
            kind,
            ty,
            operands: operands.into(),
        })
    }

    pub fn constant(&mut self, val: i64, ty: Type) -> NodeId {
        if let Some(&node) = self.constants.get(&(val, ty)) {
            return node;
        }
        let node = self.make_node(NodeKind::Constant(val), ty, &[]);
        self.constants.insert((val, ty), node);
        node
    }

    pub fn target_constant(&mut self, val: i64, ty: Type) -> NodeId {
        self.make_node(NodeKind::TargetConstant(val), ty, &[])
    }

    pub fn frame_index(&mut self, slot: StackSlot, ty: Type) -> NodeId {
        self.make_node(NodeKind::FrameIndex(slot), ty, &[])
    }

    pub fn target_frame_index(&mut self, slot: StackSlot, ty: Type) -> NodeId {
        self.make_node(NodeKind::TargetFrameIndex(slot), ty, &[])
    }

    pub fn global_address(&mut self, func: ExtFuncRef) -> NodeId {
        self.make_node(NodeKind::GlobalAddress(func), Type::Ptr, &[])
    }

    pub fn target_global_address(&mut self, func: ExtFuncRef) -> NodeId {
        self.make_node(NodeKind::TargetGlobalAddress(func), Type::Ptr, &[])
    }

    pub fn register_mask(&mut self) -> NodeId {
        self.make_node(NodeKind::RegisterMask, Type::Unit, &[])
    }

    /// The returned node is both the loaded value and the outgoing chain.
    pub fn load(&mut self, ty: Type, chain: NodeId, addr: NodeId) -> NodeId {
        self.make_node(NodeKind::Load, ty, &[chain, addr])
    }

    /// The returned node is the outgoing chain.
    pub fn store(&mut self, chain: NodeId, value: NodeId, addr: NodeId) -> NodeId {
        let ty = self.ty(value);
        self.make_node(NodeKind::Store, ty, &[chain, value, addr])
    }

    pub fn copy_from_reg(&mut self, chain: NodeId, reg: VReg, ty: Type) -> NodeId {
        self.make_node(NodeKind::CopyFromReg(reg), ty, &[chain])
    }

    pub fn copy_to_reg(&mut self, chain: NodeId, reg: VReg, value: NodeId) -> NodeId {
        self.make_node(NodeKind::CopyToReg(reg), Type::Unit, &[chain, value])
    }

    /// The glue operand of `node`, if its last operand produces one.
    pub fn glued_operand(&self, node: NodeId) -> Option<NodeId> {
        let last = *self.operands(node).last()?;
        self.kind(last).produces_glue().then_some(last)
    }

    /// Rewrite every use of `from` as an operand into a use of `to`.
    pub fn replace_all_uses_with(&mut self, from: NodeId, to: NodeId) {
        debug_assert_ne!(from, to);
        for (_, data) in self.nodes.iter_mut() {
            for opr in data.operands.iter_mut() {
                if *opr == from {
                    *opr = to;
                }
            }
        }
    }

    /// Mark `node` dead. The slot is not recycled; `is_removed` and the live
    /// iterators are the observable effect.
    pub fn remove_node(&mut self, node: NodeId) {
        debug_assert_ne!(node, self.entry, "cannot remove the entry token");
        self.removed.insert(node);
    }

    pub fn is_removed(&self, node: NodeId) -> bool {
        self.removed.contains(&node)
    }

    pub fn live_nodes(&self) -> impl Iterator<Item = (NodeId, &NodeData)> {
        self.nodes
            .iter()
            .filter(|(id, _)| !self.removed.contains(id))
    }

    pub fn count_kind(&self, pred: impl Fn(NodeKind) -> bool) -> usize {
        self.live_nodes().filter(|(_, data)| pred(data.kind)).count()
    }
}

impl Default for Dag {
    fn default() -> Self {
        Self::new()
    }
}
