//! The analysis container and its per-event driver.
//!
//! `Analysis` owns all nodes and pipes in arenas addressed by `NodeId` and
//! `PipeId`. Handles are never reused, so a stale handle resolves to `None`
//! instead of to a different object.
//!
//! The driver is a small state machine:
//!
//! ```text
//! Idle --begin_run--> Ready --begin_event--> InEvent --end_event--> Ready
//!                       |                       |
//!                       |              process_module_data
//!                       +--end_run--> Idle
//! ```
//!
//! Structural edits made while idle take effect at `begin_run`. Edits made
//! during a run are applied by the next `begin_event`, which recompiles the
//! plan against the VME layout captured at `begin_run` and resizes only the
//! nodes that changed and their consumers.

use super::compiled_plan::CompiledPlan;
use super::compiler::PipelineCompiler;
use super::directory::Directory;
use super::error::{PipelineError, PipelineResult};
use super::id::{NodeId, ObjectId, PipeId};
use super::logger::AnalysisLogger;
use super::node::{
    BeginRunMode, ConditionBehavior, Inputs, NodeKind, ObjectFlags, ObjectMeta, OperatorBehavior,
    SinkBehavior, SourceBehavior,
};
use super::parameter::ParameterVector;
use super::port::{Pipe, Slot};
use crate::config::{AnalysisSettings, RunInfo, VmeConfigLookup, VmeSnapshot};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// One node in the arena.
#[derive(Debug, Clone)]
pub struct NodeEntry {
    pub meta: ObjectMeta,
    pub kind: NodeKind,
    pub slots: Vec<Slot>,
    pub outputs: Vec<PipeId>,
    pub rank: i32,
    /// Result bits of a condition node for the current event.
    pub condition_bits: Vec<bool>,
}

impl NodeEntry {
    pub fn id(&self) -> ObjectId {
        self.meta.id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Required slots that are not connected.
    pub fn missing_inputs(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_satisfied())
            .map(|(i, _)| i)
    }
}

/// Gates an operator on one bit of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionLink {
    pub condition: NodeId,
    pub sub_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Ready,
    InEvent(usize),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("Idle"),
            RunState::Ready => f.write_str("Ready"),
            RunState::InEvent(ei) => write!(f, "InEvent({ei})"),
        }
    }
}

/// The analysis graph and its run state.
#[derive(Debug, Default)]
pub struct Analysis {
    pub(crate) nodes: Vec<Option<NodeEntry>>,
    pub(crate) pipes: Vec<Option<Pipe>>,
    pub(crate) ids: HashMap<ObjectId, NodeId>,
    pub(crate) directories: Vec<Directory>,
    /// Keyed by the gated node.
    pub(crate) condition_links: BTreeMap<NodeId, ConditionLink>,
    pub(crate) vme_object_settings: serde_json::Map<String, serde_json::Value>,
    pub(crate) properties: serde_json::Map<String, serde_json::Value>,
    pub(crate) settings: AnalysisSettings,

    plan: CompiledPlan,
    ranks_dirty: bool,
    plan_dirty: bool,
    sizes_dirty: bool,
    generation: u64,

    state: RunState,
    run_info: Option<RunInfo>,
    /// VME layout of the current run.
    vme: VmeSnapshot,
    timeticks: u64,

    /// Output vectors of the node being stepped.
    scratch: Vec<ParameterVector>,
    logger: Option<AnalysisLogger>,
}

impl Analysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: AnalysisSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn set_logger(&mut self, logger: AnalysisLogger) {
        self.logger = Some(logger);
    }

    /// Emit a user-facing message to tracing and to the installed logger.
    pub(crate) fn log(&self, message: &str) {
        tracing::info!("{}", message);
        if let Some(logger) = &self.logger {
            logger.log(message);
        }
    }

    pub(crate) fn log_warning(&self, message: &str) {
        tracing::warn!("{}", message);
        if let Some(logger) = &self.logger {
            logger.log(message);
        }
    }

    // ==================== Lookups ====================

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: AnalysisSettings) {
        self.settings = settings;
    }

    pub fn node_id(&self, id: &ObjectId) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeEntry> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeEntry> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn node_by_object(&self, id: &ObjectId) -> Option<&NodeEntry> {
        self.node_id(id).and_then(|nid| self.node(nid))
    }

    /// All live nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeEntry)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i as u32), n)))
    }

    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn pipe(&self, id: PipeId) -> Option<&Pipe> {
        self.pipes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn pipe_count(&self) -> usize {
        self.pipes.iter().filter(|p| p.is_some()).count()
    }

    /// Output pipe `index` of `node`.
    pub fn output(&self, node: NodeId, index: usize) -> Option<&Pipe> {
        let pid = *self.node(node)?.outputs.get(index)?;
        self.pipe(pid)
    }

    /// Parameters of output `index` of the object `id`.
    pub fn output_params(&self, id: &ObjectId, index: usize) -> Option<&ParameterVector> {
        self.output(self.node_id(id)?, index).map(|p| &p.params)
    }

    pub fn rank(&self, id: NodeId) -> Option<i32> {
        self.node(id).map(|n| n.rank)
    }

    pub fn condition_link(&self, node: NodeId) -> Option<&ConditionLink> {
        self.condition_links.get(&node)
    }

    pub fn condition_links(&self) -> impl Iterator<Item = (NodeId, &ConditionLink)> {
        self.condition_links.iter().map(|(k, v)| (*k, v))
    }

    /// Current result bits of a condition node.
    pub fn condition_bits(&self, id: NodeId) -> Option<&[bool]> {
        let entry = self.node(id)?;
        entry
            .kind
            .is_condition()
            .then_some(entry.condition_bits.as_slice())
    }

    pub fn directories(&self) -> &[Directory] {
        &self.directories
    }

    pub fn vme_object_settings(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.vme_object_settings
    }

    pub fn set_vme_object_settings(
        &mut self,
        id: ObjectId,
        settings: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.vme_object_settings.insert(id.to_string(), settings)
    }

    pub fn properties(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut serde_json::Map<String, serde_json::Value> {
        &mut self.properties
    }

    pub fn run_state(&self) -> RunState {
        self.state
    }

    pub fn run_info(&self) -> Option<&RunInfo> {
        self.run_info.as_ref()
    }

    pub fn timeticks(&self) -> u64 {
        self.timeticks
    }

    pub fn compiled_plan(&self) -> &CompiledPlan {
        &self.plan
    }

    /// Approximate bytes of accumulated sink state.
    pub fn storage_size(&self) -> usize {
        self.nodes()
            .filter_map(|(_, n)| n.kind.as_sink())
            .map(|s| s.storage_size())
            .sum()
    }

    // ==================== Structure bookkeeping ====================

    /// Mark ranks and plan stale after a structural change.
    pub(crate) fn invalidate_compiled_plan(&mut self) {
        self.ranks_dirty = true;
        self.plan_dirty = true;
        self.sizes_dirty = true;
        self.generation += 1;
    }

    /// Size operator outputs and condition bits from the current connections
    /// so that element indexes and bit counts can be validated while editing.
    ///
    /// Only runs while idle; during a run sizes change at `begin_run`.
    pub fn refresh_pipe_sizes(&mut self) {
        if !self.sizes_dirty || self.state != RunState::Idle {
            return;
        }
        if self.ranks_dirty {
            // update_ranks logs any cycle it finds.
            let _ = self.update_ranks();
        }
        let (order, _) =
            PipelineCompiler::execution_order(&self.nodes, &self.pipes, &self.condition_links);
        for id in order {
            if self.node(id).is_some_and(|n| !n.kind.is_sink()) {
                self.begin_run_node(id, BeginRunMode::KeepState);
            }
        }
        self.sizes_dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.ranks_dirty || self.plan_dirty
    }

    /// Recompute ranks of all nodes and propagate them to their output pipes.
    ///
    /// Ranks are still assigned when a cycle is found; the error names the
    /// nodes involved.
    pub fn update_ranks(&mut self) -> PipelineResult<()> {
        let result = PipelineCompiler::compute_ranks(&self.nodes, &self.pipes);

        for (idx, rank) in result.ranks.iter().enumerate() {
            let Some(entry) = self.nodes[idx].as_mut() else {
                continue;
            };
            entry.rank = *rank;
            for pid in &entry.outputs {
                if let Some(pipe) = self.pipes.get_mut(pid.index()).and_then(Option::as_mut) {
                    pipe.rank = *rank;
                }
            }
        }
        self.ranks_dirty = false;

        if result.cycle_nodes.is_empty() {
            return Ok(());
        }

        let nodes: Vec<ObjectId> = result
            .cycle_nodes
            .iter()
            .filter_map(|id| self.node(*id).map(NodeEntry::id))
            .collect();
        self.log_warning(&format!("Cycle detected in analysis graph: {nodes:?}"));
        Err(PipelineError::CycleDetected { nodes })
    }

    fn recompile_if_needed(&mut self) {
        if self.ranks_dirty {
            // Cycles were already reported; the plan leaves those nodes out.
            let _ = self.update_ranks();
        }

        self.plan = PipelineCompiler::compile(
            &self.nodes,
            &self.pipes,
            &self.condition_links,
            &self.vme,
            self.generation,
        );
        self.plan_dirty = false;

        let stats = &self.plan.stats;
        tracing::info!(
            "Compiled analysis plan: {} nodes ({} sources, {} operators, {} conditions, {} sinks) in {}us",
            stats.total_nodes,
            stats.source_nodes,
            stats.operator_nodes,
            stats.condition_nodes,
            stats.sink_nodes,
            stats.compile_time_us
        );
        if stats.unscheduled_nodes > 0 {
            tracing::warn!(
                "{} nodes on cycles are not scheduled",
                stats.unscheduled_nodes
            );
        }
    }

    /// Structural validity: required slots that are not connected.
    pub fn missing_required_inputs(&self) -> Vec<(ObjectId, usize)> {
        self.nodes()
            .flat_map(|(_, n)| n.missing_inputs().map(move |slot| (n.id(), slot)))
            .collect()
    }

    // ==================== Driver ====================

    fn require_state(&self, expected: &'static str, ok: bool) -> PipelineResult<()> {
        if ok {
            Ok(())
        } else {
            Err(PipelineError::InvalidRunState {
                expected,
                found: self.state.to_string(),
            })
        }
    }

    /// Prepare for a run.
    ///
    /// Resyncs output pipes, recomputes ranks and the plan, resolves events and
    /// modules through `vme` and sizes every pipe in dependency order.
    pub fn begin_run(
        &mut self,
        run_info: RunInfo,
        vme: &dyn VmeConfigLookup,
        mode: BeginRunMode,
    ) -> PipelineResult<()> {
        self.require_state(
            "Idle or Ready",
            !matches!(self.state, RunState::InEvent(_)),
        )?;

        let ids: Vec<NodeId> = self.nodes().map(|(id, _)| id).collect();
        for &id in &ids {
            self.sync_node_ports(id);
        }
        self.vme = VmeSnapshot::capture(vme);
        self.recompile_if_needed();

        for &id in &ids {
            if self.node(id).is_some_and(|n| n.kind.is_source()) {
                self.begin_run_node(id, mode);
            }
        }
        for i in 0..self.plan.global_order.len() {
            let id = self.plan.global_order[i];
            self.begin_run_node(id, mode);
        }

        for (id, slot) in self.missing_required_inputs() {
            let name = self.node_by_object(&id).map_or("", |n| n.name()).to_string();
            self.log_warning(&format!(
                "'{name}' ({id}) has no input connected to required slot {slot}"
            ));
        }
        for (op, link) in &self.condition_links {
            let bits = self.node(link.condition).map_or(0, |n| n.condition_bits.len());
            if link.sub_index >= bits {
                tracing::warn!(
                    "Condition link on {:?} uses bit {} of a {}-bit condition",
                    op,
                    link.sub_index,
                    bits
                );
            }
        }

        for entry in self.nodes.iter_mut().flatten() {
            entry.meta.flags.remove(ObjectFlags::NEEDS_REBUILD);
        }

        self.log(&format!(
            "Run '{}' started ({}, {} bytes of histogram storage)",
            run_info.run_id,
            if run_info.is_replay { "replay" } else { "live" },
            self.storage_size()
        ));
        self.sizes_dirty = false;
        self.timeticks = 0;
        self.run_info = Some(run_info);
        self.state = RunState::Ready;
        Ok(())
    }

    pub(crate) fn begin_run_node(&mut self, id: NodeId, mode: BeginRunMode) {
        let Self {
            nodes,
            pipes,
            scratch,
            settings,
            ..
        } = self;
        let Some(entry) = nodes.get_mut(id.index()).and_then(Option::as_mut) else {
            return;
        };

        take_outputs(pipes, &entry.outputs, scratch);
        let inputs = Inputs::new(&entry.slots, pipes);
        match &mut entry.kind {
            NodeKind::Source(source) => source.begin_run(scratch, settings),
            NodeKind::Operator(op) => op.begin_run(&inputs, scratch),
            NodeKind::Condition(cond) => {
                cond.begin_run(&inputs);
                let bits = cond.bit_count(&inputs);
                entry.condition_bits.clear();
                entry.condition_bits.resize(bits, false);
            }
            NodeKind::Sink(sink) => sink.begin_run(&inputs, mode, settings),
        }
        restore_outputs(pipes, &entry.outputs, scratch);
    }

    /// Apply structural edits made during a run.
    ///
    /// Nodes flagged `NEEDS_REBUILD` and everything fed by them are resized
    /// with `KeepState`; untouched nodes keep their state as is.
    fn rebuild_between_events(&mut self) {
        let ids: Vec<NodeId> = self.nodes().map(|(id, _)| id).collect();
        for &id in &ids {
            self.sync_node_ports(id);
        }
        self.recompile_if_needed();

        let mut rebuilt: HashSet<NodeId> = HashSet::new();
        for &id in &ids {
            let flagged = self.node(id).is_some_and(|n| {
                n.kind.is_source() && n.meta.flags.contains(ObjectFlags::NEEDS_REBUILD)
            });
            if flagged {
                self.begin_run_node(id, BeginRunMode::KeepState);
                rebuilt.insert(id);
            }
        }
        for i in 0..self.plan.global_order.len() {
            let id = self.plan.global_order[i];
            let Some(entry) = self.node(id) else {
                continue;
            };
            let fed_by_rebuilt = entry
                .slots
                .iter()
                .filter_map(|slot| slot.input.and_then(|pid| self.pipe(pid)))
                .any(|pipe| rebuilt.contains(&pipe.source));
            if fed_by_rebuilt || entry.meta.flags.contains(ObjectFlags::NEEDS_REBUILD) {
                self.begin_run_node(id, BeginRunMode::KeepState);
                rebuilt.insert(id);
            }
        }

        for entry in self.nodes.iter_mut().flatten() {
            entry.meta.flags.remove(ObjectFlags::NEEDS_REBUILD);
        }
        self.sizes_dirty = false;
        self.log(&format!(
            "Analysis changed during run: {} objects rebuilt",
            rebuilt.len()
        ));
    }

    /// Start processing an event: invalidates the event's source outputs and
    /// clears all condition bits.
    ///
    /// Structural edits made since the last event are applied first.
    pub fn begin_event(&mut self, event_index: usize) -> PipelineResult<()> {
        self.require_state("Ready", self.state == RunState::Ready)?;
        if self.is_dirty() {
            self.rebuild_between_events();
        }
        if event_index >= self.plan.event_count() {
            return Err(PipelineError::UnknownEventIndex(event_index));
        }

        let Self {
            nodes,
            pipes,
            plan,
            scratch,
            ..
        } = self;

        for id in &plan.event_sources[event_index] {
            let Some(entry) = nodes.get_mut(id.index()).and_then(Option::as_mut) else {
                continue;
            };
            if let NodeKind::Source(source) = &mut entry.kind {
                take_outputs(pipes, &entry.outputs, scratch);
                source.begin_event(scratch);
                restore_outputs(pipes, &entry.outputs, scratch);
            }
        }

        for id in &plan.event_order[event_index] {
            if let Some(entry) = nodes.get_mut(id.index()).and_then(Option::as_mut) {
                entry.condition_bits.fill(false);
            }
        }

        self.state = RunState::InEvent(event_index);
        Ok(())
    }

    /// Feed one module's readout words to the sources bound to that module.
    pub fn process_module_data(
        &mut self,
        event_index: usize,
        module_index: usize,
        words: &[u32],
    ) -> PipelineResult<()> {
        self.require_state(
            "InEvent for this event",
            self.state == RunState::InEvent(event_index),
        )?;

        let Self {
            nodes,
            pipes,
            plan,
            scratch,
            ..
        } = self;

        let Some(sources) = plan.sources_for_module(event_index, module_index) else {
            // Modules without any source are legal; they just have no consumers.
            return Ok(());
        };

        for id in sources {
            let Some(entry) = nodes.get_mut(id.index()).and_then(Option::as_mut) else {
                continue;
            };
            if let NodeKind::Source(source) = &mut entry.kind {
                take_outputs(pipes, &entry.outputs, scratch);
                source.process_module_data(words, scratch);
                restore_outputs(pipes, &entry.outputs, scratch);
            }
        }

        tracing::trace!(
            "Event {} module {}: {} words to {} sources",
            event_index,
            module_index,
            words.len(),
            sources.len()
        );
        Ok(())
    }

    /// Step the event's operators, conditions and sinks in plan order.
    pub fn end_event(&mut self, event_index: usize) -> PipelineResult<()> {
        self.require_state(
            "InEvent for this event",
            self.state == RunState::InEvent(event_index),
        )?;

        let Self {
            nodes,
            pipes,
            plan,
            scratch,
            condition_links,
            ..
        } = self;

        for &id in &plan.event_order[event_index] {
            step_node(nodes, pipes, scratch, condition_links, id);
        }

        self.state = RunState::Ready;
        Ok(())
    }

    /// Advance the run clock by one tick. Rate monitors sample here.
    pub fn process_timetick(&mut self) -> PipelineResult<()> {
        self.require_state("Ready or InEvent", self.state != RunState::Idle)?;
        self.timeticks += 1;
        for entry in self.nodes.iter_mut().flatten() {
            if !entry.meta.enabled {
                continue;
            }
            if let Some(sink) = entry.kind.as_sink_mut() {
                sink.timetick();
            }
        }
        Ok(())
    }

    pub fn end_run(&mut self) -> PipelineResult<()> {
        self.require_state("Ready", self.state == RunState::Ready)?;
        for entry in self.nodes.iter_mut().flatten() {
            if let Some(sink) = entry.kind.as_sink_mut() {
                sink.end_run();
            }
        }
        let run_id = self.run_info.as_ref().map_or("", |r| r.run_id.as_str());
        self.log(&format!(
            "Run '{}' stopped after {} timeticks",
            run_id, self.timeticks
        ));
        self.state = RunState::Idle;
        Ok(())
    }

    /// Zero the accumulated state of every sink.
    pub fn clear_sinks(&mut self) {
        for entry in self.nodes.iter_mut().flatten() {
            if let Some(sink) = entry.kind.as_sink_mut() {
                sink.clear();
            }
        }
    }
}

/// Move a node's output vectors out of their pipes into `scratch`.
///
/// A missing pipe gets an empty placeholder so indexes stay aligned.
#[inline]
fn take_outputs(pipes: &mut [Option<Pipe>], outputs: &[PipeId], scratch: &mut Vec<ParameterVector>) {
    scratch.clear();
    for pid in outputs {
        match pipes.get_mut(pid.index()).and_then(Option::as_mut) {
            Some(pipe) => scratch.push(std::mem::take(&mut pipe.params)),
            None => scratch.push(ParameterVector::default()),
        }
    }
}

#[inline]
fn restore_outputs(pipes: &mut [Option<Pipe>], outputs: &[PipeId], scratch: &mut Vec<ParameterVector>) {
    for (pid, params) in outputs.iter().zip(scratch.drain(..)) {
        if let Some(pipe) = pipes.get_mut(pid.index()).and_then(Option::as_mut) {
            pipe.params = params;
        }
    }
}

#[inline]
fn condition_bit(nodes: &[Option<NodeEntry>], link: &ConditionLink) -> bool {
    nodes
        .get(link.condition.index())
        .and_then(Option::as_ref)
        .and_then(|c| c.condition_bits.get(link.sub_index).copied())
        .unwrap_or(false)
}

/// Step one non-source node for the current event.
///
/// A node whose gate is closed or whose required inputs are missing is not
/// stepped: an operator's outputs are invalidated, a condition's bits are
/// cleared and a sink does not accumulate.
#[inline]
fn step_node(
    nodes: &mut [Option<NodeEntry>],
    pipes: &mut [Option<Pipe>],
    scratch: &mut Vec<ParameterVector>,
    links: &BTreeMap<NodeId, ConditionLink>,
    id: NodeId,
) {
    let gate_open = links.get(&id).map_or(true, |link| condition_bit(nodes, link));
    let Some(entry) = nodes.get_mut(id.index()).and_then(Option::as_mut) else {
        return;
    };
    let runnable = gate_open && entry.slots.iter().all(Slot::is_satisfied);

    match &mut entry.kind {
        NodeKind::Source(_) => {}
        NodeKind::Operator(op) => {
            take_outputs(pipes, &entry.outputs, scratch);
            if runnable {
                op.step(&Inputs::new(&entry.slots, pipes), scratch);
            } else {
                for output in scratch.iter_mut() {
                    output.invalidate_all();
                }
            }
            restore_outputs(pipes, &entry.outputs, scratch);
        }
        NodeKind::Condition(cond) => {
            if runnable {
                cond.evaluate(&Inputs::new(&entry.slots, pipes), &mut entry.condition_bits);
            } else {
                entry.condition_bits.fill(false);
            }
        }
        NodeKind::Sink(sink) => {
            if runnable && entry.meta.enabled {
                sink.accumulate(&Inputs::new(&entry.slots, pipes));
            }
        }
    }
}
