//! The analysis dataflow graph.
//!
//! Raw module words enter through source nodes, flow through operators as
//! `ParameterVector`s held in pipes, and end up in sinks. Conditions produce
//! bits that gate other nodes through condition links.
//!
//! # Architecture
//!
//! ```text
//! module words ──► [Extractor] ──► [CalibrationMinMax] ──► [Histo1DSink]
//!                        │
//!                        └──► [IntervalCondition] ··gates··► [Histo1DSink]
//! ```
//!
//! # Design
//!
//! - **Arenas with stable handles**: nodes and pipes live in `Vec<Option<_>>`
//!   arenas addressed by `NodeId` and `PipeId`; removal leaves a hole.
//! - **Enum dispatch on the hot path**: `NodeKind` and the per-kind enums in
//!   `nodes` are matched, never boxed.
//! - **No per-event allocation**: output vectors are swapped out of their
//!   pipes while a node steps and swapped back afterwards.
//! - **Compiled plan**: ranks and the per-event execution order are
//!   recomputed lazily after structural edits.

pub mod compiled_plan;
pub mod compiler;
pub mod directory;
pub mod error;
pub mod executor;
pub mod graph;
pub mod id;
pub mod logger;
pub mod node;
pub mod node_type;
pub mod nodes;
pub mod parameter;
pub mod port;

pub use compiled_plan::{CompiledPlan, PlanStats};
pub use compiler::{PipelineCompiler, RankResult};
pub use directory::Directory;
pub use error::{PipelineError, PipelineResult};
pub use executor::{Analysis, ConditionLink, NodeEntry, RunState};
pub use id::{NodeId, ObjectId, PipeId};
pub use logger::AnalysisLogger;
pub use node::{
    BeginRunMode, ConditionBehavior, InputRef, Inputs, NodeBehavior, NodeKind, ObjectFlags,
    ObjectMeta, OperatorBehavior, SinkBehavior, SourceBehavior,
};
pub use node_type::{create_node, NodeCategory, NodeClass, NodeFactoryError};
pub use parameter::{Parameter, ParameterVector};
pub use port::{InputType, Pipe, Slot, SlotDescriptor, SlotRef};
