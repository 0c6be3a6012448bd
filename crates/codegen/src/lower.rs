//! This module contains the lowering context shared by all lowering code for
//! one function.
//!
//! There is no ambient builder state: every operation receives the context
//! by reference. The context owns the node graph, the frame info, and the
//! source-value-to-node map.
use rustc_hash::FxHashMap;
use waypoint_ir::{Function, Type, Value, ValueId};

use crate::{
    dag::{Dag, NodeId},
    frame::FrameInfo,
    statepoint::verify::GcStrategy,
};

pub struct LowerCtx<'a> {
    pub func: &'a Function,
    pub dag: Dag,
    pub frame: FrameInfo,

    value_map: FxHashMap<ValueId, NodeId>,
    root: NodeId,

    /// Chains that must be glued into the function's exit (copies of values
    /// read from other blocks).
    pub pending_exports: Vec<NodeId>,

    gc_strategy: Option<&'a dyn GcStrategy>,
}

impl<'a> LowerCtx<'a> {
    pub fn new(func: &'a Function) -> Self {
        let dag = Dag::new();
        let root = dag.entry();
        Self {
            func,
            dag,
            frame: FrameInfo::new(),
            value_map: FxHashMap::default(),
            root,
            pending_exports: Vec::new(),
            gc_strategy: None,
        }
    }

    pub fn set_gc_strategy(&mut self, strategy: &'a dyn GcStrategy) {
        self.gc_strategy = Some(strategy);
    }

    pub fn gc_strategy(&self) -> Option<&'a dyn GcStrategy> {
        self.gc_strategy
    }

    /// The current end of the sequential side-effect chain.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        debug_assert!(
            self.dag.kind(root).is_chain(),
            "root must carry a chain result"
        );
        self.root = root;
    }

    /// Classification and materialization of a source-level value.
    ///
    /// Immediates and function addresses materialize on demand; anything
    /// else must already have been lowered and installed via [`set_value`].
    ///
    /// [`set_value`]: Self::set_value
    pub fn get_value(&mut self, value: ValueId) -> NodeId {
        if let Some(&node) = self.value_map.get(&value) {
            return node;
        }

        let node = match *self.func.value(value) {
            Value::Immediate { imm, ty } => self.dag.constant(imm.as_i64(), ty),
            Value::Func { func } => self.dag.global_address(func),
            Value::Inst { .. } | Value::Arg { .. } => {
                panic!("use of value v{} before it was lowered", value.0)
            }
        };
        self.value_map.insert(value, node);
        node
    }

    pub fn set_value(&mut self, value: ValueId, node: NodeId) {
        self.value_map.insert(value, node);
    }

    pub fn value_ty(&self, value: ValueId) -> Type {
        self.func.value_ty(value)
    }
}
