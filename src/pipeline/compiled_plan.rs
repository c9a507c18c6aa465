use crate::pipeline::id::NodeId;

/// Compiled execution plan for one run.
///
/// Event and module positions are the readout indexes resolved through the
/// VME config when the run began.
#[derive(Debug, Clone, Default)]
pub struct CompiledPlan {
    /// Operators, conditions and sinks of all events in dependency order.
    pub global_order: Vec<NodeId>,

    /// Per event index: the event's non-source nodes in dependency order.
    pub event_order: Vec<Vec<NodeId>>,

    /// Per event index: the event's sources.
    pub event_sources: Vec<Vec<NodeId>>,

    /// Per event index and module index: sources reading that module.
    pub module_sources: Vec<Vec<Vec<NodeId>>>,

    /// Cache invalidation generation number
    pub generation: u64,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    pub total_nodes: usize,
    pub source_nodes: usize,
    pub operator_nodes: usize,
    pub condition_nodes: usize,
    pub sink_nodes: usize,

    /// Nodes left out of the order because they sit on a cycle.
    pub unscheduled_nodes: usize,

    /// Nodes whose event or module is not part of the VME config.
    pub unresolved_nodes: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl CompiledPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.global_order.is_empty() && self.event_sources.iter().all(Vec::is_empty)
    }

    pub fn event_count(&self) -> usize {
        self.event_order.len()
    }

    pub fn event_operators(&self, event_index: usize) -> &[NodeId] {
        self.event_order
            .get(event_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn sources_for_module(&self, event_index: usize, module_index: usize) -> Option<&[NodeId]> {
        self.module_sources
            .get(event_index)?
            .get(module_index)
            .map(Vec::as_slice)
    }
}
