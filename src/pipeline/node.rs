//! Node abstraction for the analysis graph.
//!
//! Nodes come in four kinds, each with its own capability trait:
//! - **Source**: fed raw module words, produces output pipes.
//! - **Operator**: reads input slots, writes output pipes.
//! - **Condition**: reads input slots, produces a vector of bits that gate
//!   other operators through condition links.
//! - **Sink**: reads input slots, accumulates into histograms or rate
//!   histories.
//!
//! `NodeKind` is a closed enum over the four kinds, and each kind is again an
//! enum over the built-in node types. Dispatch is a `match` all the way down,
//! so there is no dynamic dispatch on the event path.

use crate::config::AnalysisSettings;
use crate::pipeline::id::{ObjectId, PipeId};
use crate::pipeline::nodes::{ConditionNode, OperatorNode, SinkNode, SourceNode};
use crate::pipeline::parameter::{Parameter, ParameterVector};
use crate::pipeline::port::{Pipe, Slot, SlotDescriptor};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// What `begin_run` does with accumulated sink state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BeginRunMode {
    /// Keep histogram contents when their shape did not change.
    KeepState,
    /// Zero all accumulated state.
    #[default]
    ClearState,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u32 {
        /// The object was modified and its run state must be rebuilt.
        const NEEDS_REBUILD = 1 << 0;
    }
}

/// Header shared by every analysis object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMeta {
    pub id: ObjectId,
    pub name: String,
    /// VME event this object belongs to.
    pub event_id: ObjectId,
    /// VME module a source reads from. `None` for every other kind.
    pub module_id: Option<ObjectId>,
    pub user_level: i32,
    /// Only meaningful for sinks.
    pub enabled: bool,
    pub flags: ObjectFlags,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>, event_id: ObjectId) -> Self {
        Self {
            id: ObjectId::new(),
            name: name.into(),
            event_id,
            module_id: None,
            user_level: 0,
            enabled: true,
            flags: ObjectFlags::NEEDS_REBUILD,
        }
    }

    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = id;
        self
    }

    pub fn with_module(mut self, module_id: ObjectId) -> Self {
        self.module_id = Some(module_id);
        self
    }

    pub fn with_user_level(mut self, user_level: i32) -> Self {
        self.user_level = user_level;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Read-only view of one connected input.
#[derive(Debug, Clone, Copy)]
pub struct InputRef<'a> {
    pub params: &'a ParameterVector,
    /// `Some` if the slot is connected to a single element.
    pub param_index: Option<usize>,
}

impl<'a> InputRef<'a> {
    /// Number of parameters visible through this input.
    #[inline]
    pub fn len(&self) -> usize {
        match self.param_index {
            Some(_) => 1,
            None => self.params.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&'a Parameter> {
        match self.param_index {
            Some(pi) if index == 0 => self.params.get(pi),
            Some(_) => None,
            None => self.params.get(index),
        }
    }

    #[inline]
    pub fn first(&self) -> Option<&'a Parameter> {
        self.get(0)
    }

    pub fn iter(&self) -> std::slice::Iter<'a, Parameter> {
        let all = self.params.as_slice();
        match self.param_index {
            Some(pi) => all.get(pi..pi + 1).unwrap_or(&[]).iter(),
            None => all.iter(),
        }
    }

    pub fn name(&self) -> &'a str {
        &self.params.name
    }
}

/// The inputs of one node: its slots resolved against the pipe arena.
#[derive(Clone, Copy)]
pub struct Inputs<'a> {
    slots: &'a [Slot],
    pipes: &'a [Option<Pipe>],
}

impl<'a> Inputs<'a> {
    pub fn new(slots: &'a [Slot], pipes: &'a [Option<Pipe>]) -> Self {
        Self { slots, pipes }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The input connected to `slot`, if any.
    #[inline]
    pub fn get(&self, slot: usize) -> Option<InputRef<'a>> {
        let slot = self.slots.get(slot)?;
        let pipe = resolve_pipe(self.pipes, slot.input?)?;
        Some(InputRef {
            params: &pipe.params,
            param_index: slot.param_index,
        })
    }

    /// Length of the input on `slot`, zero when unconnected.
    pub fn len_of(&self, slot: usize) -> usize {
        self.get(slot).map_or(0, |input| input.len())
    }
}

#[inline]
fn resolve_pipe(pipes: &[Option<Pipe>], id: PipeId) -> Option<&Pipe> {
    pipes.get(id.index()).and_then(Option::as_ref)
}

/// Behavior common to all nodes.
pub trait NodeBehavior {
    /// Stable class name written to analysis documents.
    fn class_name(&self) -> &'static str;

    /// Serialize the node configuration into its opaque data blob.
    fn write_data(&self) -> serde_json::Result<serde_json::Value>;

    fn output_count(&self) -> usize {
        0
    }

    fn output_name(&self, _index: usize) -> String {
        String::new()
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        Vec::new()
    }
}

pub trait SourceBehavior: NodeBehavior {
    /// Size and reset the outputs for a new run.
    fn begin_run(&mut self, outputs: &mut [ParameterVector], settings: &AnalysisSettings);

    /// Invalidate outputs and reset per-event state.
    fn begin_event(&mut self, outputs: &mut [ParameterVector]);

    fn process_module_data(&mut self, words: &[u32], outputs: &mut [ParameterVector]);
}

pub trait OperatorBehavior: NodeBehavior {
    /// Size outputs and set their limits from the current inputs.
    fn begin_run(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]);

    fn step(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]);

    /// Append an input slot. `None` if the operator has a fixed slot list.
    fn add_input_slot(&mut self) -> Option<SlotDescriptor> {
        None
    }

    /// Remove the last input slot. Returns false if not supported or at the
    /// minimum slot count.
    fn remove_input_slot(&mut self) -> bool {
        false
    }
}

pub trait ConditionBehavior: NodeBehavior {
    /// Number of bits this condition produces for the current inputs.
    fn bit_count(&self, inputs: &Inputs<'_>) -> usize;

    fn begin_run(&mut self, _inputs: &Inputs<'_>) {}

    /// Evaluate into `bits`, which has `bit_count` elements.
    fn evaluate(&mut self, inputs: &Inputs<'_>, bits: &mut [bool]);
}

pub trait SinkBehavior: NodeBehavior {
    fn begin_run(&mut self, inputs: &Inputs<'_>, mode: BeginRunMode, settings: &AnalysisSettings);

    fn accumulate(&mut self, inputs: &Inputs<'_>);

    /// Called once per timetick while a run is active.
    fn timetick(&mut self) {}

    fn end_run(&mut self) {}

    /// Zero accumulated state.
    fn clear(&mut self);

    /// Approximate bytes of accumulated state.
    fn storage_size(&self) -> usize;
}

/// All node kinds.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Source(SourceNode),
    Operator(OperatorNode),
    Condition(ConditionNode),
    Sink(SinkNode),
}

impl NodeKind {
    pub fn is_source(&self) -> bool {
        matches!(self, NodeKind::Source(_))
    }

    pub fn is_condition(&self) -> bool {
        matches!(self, NodeKind::Condition(_))
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, NodeKind::Sink(_))
    }

    /// Operators and conditions and sinks. These have input slots and a rank.
    pub fn has_inputs(&self) -> bool {
        !self.is_source()
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Source(_) => "source",
            NodeKind::Operator(_) => "operator",
            NodeKind::Condition(_) => "condition",
            NodeKind::Sink(_) => "sink",
        }
    }

    pub fn as_source(&self) -> Option<&SourceNode> {
        match self {
            NodeKind::Source(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_operator(&self) -> Option<&OperatorNode> {
        match self {
            NodeKind::Operator(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_condition(&self) -> Option<&ConditionNode> {
        match self {
            NodeKind::Condition(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_sink(&self) -> Option<&SinkNode> {
        match self {
            NodeKind::Sink(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_sink_mut(&mut self) -> Option<&mut SinkNode> {
        match self {
            NodeKind::Sink(n) => Some(n),
            _ => None,
        }
    }
}

impl NodeBehavior for NodeKind {
    fn class_name(&self) -> &'static str {
        match self {
            NodeKind::Source(n) => n.class_name(),
            NodeKind::Operator(n) => n.class_name(),
            NodeKind::Condition(n) => n.class_name(),
            NodeKind::Sink(n) => n.class_name(),
        }
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            NodeKind::Source(n) => n.write_data(),
            NodeKind::Operator(n) => n.write_data(),
            NodeKind::Condition(n) => n.write_data(),
            NodeKind::Sink(n) => n.write_data(),
        }
    }

    fn output_count(&self) -> usize {
        match self {
            NodeKind::Source(n) => n.output_count(),
            NodeKind::Operator(n) => n.output_count(),
            NodeKind::Condition(n) => n.output_count(),
            NodeKind::Sink(n) => n.output_count(),
        }
    }

    fn output_name(&self, index: usize) -> String {
        match self {
            NodeKind::Source(n) => n.output_name(index),
            NodeKind::Operator(n) => n.output_name(index),
            NodeKind::Condition(n) => n.output_name(index),
            NodeKind::Sink(n) => n.output_name(index),
        }
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        match self {
            NodeKind::Source(n) => n.slot_descriptors(),
            NodeKind::Operator(n) => n.slot_descriptors(),
            NodeKind::Condition(n) => n.slot_descriptors(),
            NodeKind::Sink(n) => n.slot_descriptors(),
        }
    }
}

impl From<SourceNode> for NodeKind {
    fn from(value: SourceNode) -> Self {
        NodeKind::Source(value)
    }
}

impl From<OperatorNode> for NodeKind {
    fn from(value: OperatorNode) -> Self {
        NodeKind::Operator(value)
    }
}

impl From<ConditionNode> for NodeKind {
    fn from(value: ConditionNode) -> Self {
        NodeKind::Condition(value)
    }
}

impl From<SinkNode> for NodeKind {
    fn from(value: SinkNode) -> Self {
        NodeKind::Sink(value)
    }
}
