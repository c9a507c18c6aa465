//! Pipeline-specific error types.

use crate::pipeline::id::{NodeId, ObjectId};
use thiserror::Error;

/// Structural and protocol errors of the analysis graph.
///
/// None of these are raised on the per-event hot path for data problems;
/// invalid data is represented in-band through `Parameter::valid`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("Unknown object {0}")]
    UnknownObject(ObjectId),

    #[error("Duplicate object id {0}")]
    DuplicateObject(ObjectId),

    #[error("Source {0} is not bound to a module")]
    MissingModule(ObjectId),

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    #[error("Connecting {from} -> {to} would create a cycle")]
    WouldCreateCycle { from: ObjectId, to: ObjectId },

    #[error("Cycle detected in analysis graph involving {nodes:?}")]
    CycleDetected { nodes: Vec<ObjectId> },

    #[error("Invalid condition link: {0}")]
    InvalidConditionLink(String),

    #[error("Node {0} does not support dynamic input slots")]
    StaticSlots(ObjectId),

    #[error("Invalid run state: expected {expected}, found {found}")]
    InvalidRunState {
        expected: &'static str,
        found: String,
    },

    #[error("Event index {0} is not part of the current run")]
    UnknownEventIndex(usize),

    #[error("Module index {module} is not part of event {event}")]
    UnknownModuleIndex { event: usize, module: usize },

    #[error("Node {id} error: {message}")]
    Node { id: ObjectId, message: String },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
