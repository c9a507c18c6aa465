//! Slots and pipes, the connection endpoints of the analysis graph.
//!
//! Every node output owns a `Pipe`. Operator and sink inputs are `Slot`s that
//! reference a pipe, either as a whole array or as one element of it.

use crate::pipeline::id::{NodeId, PipeId};
use crate::pipeline::parameter::ParameterVector;
use bitflags::bitflags;
use std::borrow::Cow;

bitflags! {
    /// What a slot accepts as input.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InputType: u8 {
        /// A whole parameter vector.
        const ARRAY = 1 << 0;
        /// A single element of a parameter vector.
        const VALUE = 1 << 1;
        const BOTH = Self::ARRAY.bits() | Self::VALUE.bits();
    }
}

/// Static description of an input slot, declared by the node.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDescriptor {
    pub name: Cow<'static, str>,
    pub accepted: InputType,
    pub optional: bool,
}

impl SlotDescriptor {
    pub const fn array(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            accepted: InputType::ARRAY,
            optional: false,
        }
    }

    pub const fn value(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            accepted: InputType::VALUE,
            optional: false,
        }
    }

    pub const fn both(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            accepted: InputType::BOTH,
            optional: false,
        }
    }

    pub fn named(name: String, accepted: InputType) -> Self {
        Self {
            name: Cow::Owned(name),
            accepted,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Reference to one input slot of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub node: NodeId,
    pub slot_index: usize,
}

/// Input endpoint of an operator, condition or sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub name: String,
    pub accepted_input_types: InputType,
    /// `None` connects the whole array.
    pub param_index: Option<usize>,
    pub input: Option<PipeId>,
    pub parent: NodeId,
    pub parent_slot_index: usize,
    pub is_optional: bool,
}

impl Slot {
    pub fn new(descriptor: &SlotDescriptor, parent: NodeId, parent_slot_index: usize) -> Self {
        Self {
            name: descriptor.name.to_string(),
            accepted_input_types: descriptor.accepted,
            param_index: None,
            input: None,
            parent,
            parent_slot_index,
            is_optional: descriptor.optional,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.input.is_some()
    }

    /// True if the slot is connected or allowed to stay empty.
    #[inline]
    pub fn is_satisfied(&self) -> bool {
        self.is_optional || self.input.is_some()
    }

    pub fn slot_ref(&self) -> SlotRef {
        SlotRef {
            node: self.parent,
            slot_index: self.parent_slot_index,
        }
    }

    pub fn disconnect(&mut self) {
        self.input = None;
        self.param_index = None;
    }
}

/// Output of a node. Owns the parameter vector its producer writes.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipe {
    pub params: ParameterVector,
    pub source: NodeId,
    pub source_output_index: usize,
    pub rank: i32,
    destinations: Vec<SlotRef>,
}

impl Pipe {
    pub fn new(source: NodeId, source_output_index: usize, name: impl Into<String>) -> Self {
        Self {
            params: ParameterVector::new(name),
            source,
            source_output_index,
            rank: 0,
            destinations: Vec::new(),
        }
    }

    pub fn destinations(&self) -> &[SlotRef] {
        &self.destinations
    }

    pub fn add_destination(&mut self, slot: SlotRef) {
        if !self.destinations.contains(&slot) {
            self.destinations.push(slot);
        }
    }

    pub fn remove_destination(&mut self, slot: SlotRef) {
        self.destinations.retain(|d| *d != slot);
    }

    pub(crate) fn take_destinations(&mut self) -> Vec<SlotRef> {
        std::mem::take(&mut self.destinations)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
