use super::compiled_plan::{CompiledPlan, PlanStats};
use super::executor::{ConditionLink, NodeEntry};
use super::id::NodeId;
use super::node::NodeKind;
use super::port::Pipe;
use crate::config::VmeConfigLookup;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

/// Result of a rank computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankResult {
    /// Rank per node index. Removed nodes get rank 0.
    pub ranks: Vec<i32>,
    /// Nodes on a cycle, from the back edge's target down to its source.
    pub cycle_nodes: Vec<NodeId>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

struct RankWalk<'a> {
    nodes: &'a [Option<NodeEntry>],
    pipes: &'a [Option<Pipe>],
    ranks: Vec<i32>,
    marks: Vec<Mark>,
    /// Nodes currently being visited, outermost first.
    path: Vec<usize>,
    cycle_nodes: Vec<NodeId>,
}

impl RankWalk<'_> {
    /// Rank of `idx`, or `None` if `idx` is on the current path.
    fn visit(&mut self, idx: usize) -> Option<i32> {
        match self.marks[idx] {
            Mark::Done => return Some(self.ranks[idx]),
            Mark::Visiting => {
                let start = self.path.iter().rposition(|&i| i == idx).unwrap_or(0);
                self.cycle_nodes
                    .extend(self.path[start..].iter().map(|&i| NodeId(i as u32)));
                return None;
            }
            Mark::Unvisited => {}
        }

        let nodes = self.nodes;
        let pipes = self.pipes;
        let Some(entry) = nodes[idx].as_ref() else {
            self.marks[idx] = Mark::Done;
            return Some(0);
        };

        if entry.kind.is_source() {
            self.marks[idx] = Mark::Done;
            self.ranks[idx] = 0;
            return Some(0);
        }

        self.marks[idx] = Mark::Visiting;
        self.path.push(idx);
        let mut max_input = 0;

        for slot in &entry.slots {
            let Some(pipe) = slot
                .input
                .and_then(|pid| pipes.get(pid.index()))
                .and_then(Option::as_ref)
            else {
                continue;
            };
            let producer = pipe.source.index();
            if producer >= nodes.len() {
                continue;
            }
            if let Some(rank) = self.visit(producer) {
                max_input = max_input.max(rank);
            }
        }

        self.path.pop();
        let rank = max_input + 1;
        self.ranks[idx] = rank;
        self.marks[idx] = Mark::Done;
        Some(rank)
    }
}

/// Compiles the analysis graph into ranks and an execution plan.
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Compute ranks for all nodes.
    ///
    /// Sources are rank 0. Every other node is one more than the highest rank
    /// among its connected inputs' producers, so a node without connected
    /// inputs is rank 1. An edge that closes a cycle is ignored and the nodes
    /// involved are reported.
    pub fn compute_ranks(nodes: &[Option<NodeEntry>], pipes: &[Option<Pipe>]) -> RankResult {
        let mut walk = RankWalk {
            nodes,
            pipes,
            ranks: vec![0; nodes.len()],
            marks: vec![Mark::Unvisited; nodes.len()],
            path: Vec::new(),
            cycle_nodes: Vec::new(),
        };

        for idx in 0..nodes.len() {
            walk.visit(idx);
        }

        walk.cycle_nodes.sort();
        walk.cycle_nodes.dedup();

        RankResult {
            ranks: walk.ranks,
            cycle_nodes: walk.cycle_nodes,
        }
    }

    /// Order all non-source nodes by Kahn's algorithm over data edges and
    /// condition-link edges. Ready nodes are taken lowest rank first, then by
    /// insertion order. Returns the order and the nodes left on cycles.
    pub fn execution_order(
        nodes: &[Option<NodeEntry>],
        pipes: &[Option<Pipe>],
        links: &BTreeMap<NodeId, ConditionLink>,
    ) -> (Vec<NodeId>, Vec<NodeId>) {
        let n = nodes.len();
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0u32; n];

        let is_scheduled = |idx: usize| {
            nodes
                .get(idx)
                .and_then(Option::as_ref)
                .is_some_and(|e| e.kind.has_inputs())
        };

        for (idx, entry) in nodes.iter().enumerate() {
            let Some(entry) = entry else { continue };
            if !entry.kind.has_inputs() {
                continue;
            }
            for slot in &entry.slots {
                let Some(pipe) = slot
                    .input
                    .and_then(|pid| pipes.get(pid.index()))
                    .and_then(Option::as_ref)
                else {
                    continue;
                };
                let from = pipe.source.index();
                if is_scheduled(from) {
                    adj[from].push(idx);
                    in_degree[idx] += 1;
                }
            }
        }

        for (op, link) in links {
            let (from, to) = (link.condition.index(), op.index());
            if is_scheduled(from) && is_scheduled(to) {
                adj[from].push(to);
                in_degree[to] += 1;
            }
        }

        let rank_of = |idx: usize| {
            nodes
                .get(idx)
                .and_then(Option::as_ref)
                .map_or(0, |e| e.rank)
        };

        let mut ready = BinaryHeap::new();
        for idx in 0..n {
            if is_scheduled(idx) && in_degree[idx] == 0 {
                ready.push(Reverse((rank_of(idx), idx)));
            }
        }

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse((_, idx))) = ready.pop() {
            order.push(NodeId(idx as u32));
            for &next in &adj[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse((rank_of(next), next)));
                }
            }
        }

        let unscheduled: Vec<NodeId> = (0..n)
            .filter(|&idx| is_scheduled(idx) && in_degree[idx] > 0)
            .map(|idx| NodeId(idx as u32))
            .collect();

        (order, unscheduled)
    }

    /// Compile the plan for a run against the given VME config.
    pub fn compile(
        nodes: &[Option<NodeEntry>],
        pipes: &[Option<Pipe>],
        links: &BTreeMap<NodeId, ConditionLink>,
        vme: &dyn VmeConfigLookup,
        generation: u64,
    ) -> CompiledPlan {
        let start_time = std::time::Instant::now();

        let event_count = vme.event_count();
        let mut plan = CompiledPlan {
            generation,
            event_order: vec![Vec::new(); event_count],
            event_sources: vec![Vec::new(); event_count],
            module_sources: vec![Vec::new(); event_count],
            ..Default::default()
        };
        let mut stats = PlanStats::default();

        for (idx, entry) in nodes.iter().enumerate() {
            let Some(entry) = entry else { continue };
            stats.total_nodes += 1;
            match entry.kind {
                NodeKind::Source(_) => stats.source_nodes += 1,
                NodeKind::Operator(_) => stats.operator_nodes += 1,
                NodeKind::Condition(_) => stats.condition_nodes += 1,
                NodeKind::Sink(_) => stats.sink_nodes += 1,
            }

            if !entry.kind.is_source() {
                continue;
            }

            let resolved = entry
                .meta
                .module_id
                .and_then(|module| vme.module_index(&module));
            let Some((event_index, module_index)) = resolved else {
                stats.unresolved_nodes += 1;
                tracing::warn!(
                    "Source '{}' ({}) is bound to a module missing from the VME config",
                    entry.meta.name,
                    entry.meta.id
                );
                continue;
            };

            if event_index >= event_count {
                stats.unresolved_nodes += 1;
                continue;
            }
            let id = NodeId(idx as u32);
            plan.event_sources[event_index].push(id);
            let modules = &mut plan.module_sources[event_index];
            if modules.len() <= module_index {
                modules.resize(module_index + 1, Vec::new());
            }
            modules[module_index].push(id);
        }

        let (order, unscheduled) = Self::execution_order(nodes, pipes, links);
        stats.unscheduled_nodes = unscheduled.len();

        for &id in &order {
            let Some(entry) = nodes.get(id.index()).and_then(Option::as_ref) else {
                continue;
            };
            match vme
                .event_index(&entry.meta.event_id)
                .filter(|&i| i < event_count)
            {
                Some(event_index) => plan.event_order[event_index].push(id),
                None => {
                    stats.unresolved_nodes += 1;
                    tracing::warn!(
                        "'{}' ({}) belongs to an event missing from the VME config",
                        entry.meta.name,
                        entry.meta.id
                    );
                }
            }
        }

        plan.global_order = order;
        stats.compile_time_us = start_time.elapsed().as_micros() as u64;
        plan.stats = stats;
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::{ObjectId, PipeId};
    use crate::pipeline::node::{NodeBehavior, ObjectMeta};
    use crate::pipeline::nodes::*;
    use crate::pipeline::port::Slot;

    /// Arena where pipe `i` is the single output of node `i`.
    struct Arena {
        nodes: Vec<Option<NodeEntry>>,
        pipes: Vec<Option<Pipe>>,
    }

    impl Arena {
        fn new() -> Self {
            Self {
                nodes: Vec::new(),
                pipes: Vec::new(),
            }
        }

        fn push(&mut self, kind: NodeKind, input: Option<usize>) -> NodeId {
            let id = NodeId(self.nodes.len() as u32);
            let mut slots: Vec<Slot> = kind
                .slot_descriptors()
                .iter()
                .enumerate()
                .map(|(i, desc)| Slot::new(desc, id, i))
                .collect();
            if let (Some(slot), Some(producer)) = (slots.first_mut(), input) {
                slot.input = Some(PipeId(producer as u32));
            }
            self.nodes.push(Some(NodeEntry {
                meta: ObjectMeta::new(format!("node{}", id.index()), ObjectId::new()),
                kind,
                slots,
                outputs: vec![PipeId(id.0)],
                rank: 0,
                condition_bits: Vec::new(),
            }));
            self.pipes.push(Some(Pipe::new(id, 0, "out")));
            id
        }

        fn source(&mut self) -> NodeId {
            let extractor = Extractor::new(ExtractorConfig::single("AAAADDDD")).unwrap();
            self.push(SourceNode::Extractor(extractor).into(), None)
        }

        fn calibration(&mut self, input: Option<usize>) -> NodeId {
            let calib = CalibrationMinMax::new(CalibrationConfig::new(0.0, 1.0));
            self.push(OperatorNode::Calibration(calib).into(), input)
        }

        fn condition(&mut self, input: usize) -> NodeId {
            let cond = IntervalCondition::new(vec![Interval::new(0.0, 1.0)]);
            self.push(ConditionNode::Interval(cond).into(), Some(input))
        }

        fn assign_ranks(&mut self) -> RankResult {
            let result = PipelineCompiler::compute_ranks(&self.nodes, &self.pipes);
            for (entry, rank) in self.nodes.iter_mut().zip(&result.ranks) {
                if let Some(entry) = entry {
                    entry.rank = *rank;
                }
            }
            result
        }
    }

    #[test]
    fn test_ranks_follow_inputs() {
        let mut arena = Arena::new();
        let src = arena.source();
        let a = arena.calibration(Some(src.index()));
        let b = arena.calibration(Some(a.index()));
        let unconnected = arena.calibration(None);

        let result = arena.assign_ranks();
        assert!(result.cycle_nodes.is_empty());
        assert_eq!(result.ranks[src.index()], 0);
        assert_eq!(result.ranks[a.index()], 1);
        assert_eq!(result.ranks[b.index()], 2);
        assert_eq!(result.ranks[unconnected.index()], 1);
    }

    #[test]
    fn test_cycle_is_reported_and_left_unscheduled() {
        let mut arena = Arena::new();
        let src = arena.source();
        // Nodes 1, 2 and 3 feed each other in a ring.
        let a = arena.calibration(Some(3));
        let b = arena.calibration(Some(a.index()));
        let c = arena.calibration(Some(b.index()));
        let fed_by_ring = arena.calibration(Some(c.index()));
        let independent = arena.calibration(Some(src.index()));

        let result = arena.assign_ranks();
        assert_eq!(result.cycle_nodes, vec![a, b, c]);
        assert!(result.ranks.iter().all(|r| *r >= 0));

        let (order, unscheduled) =
            PipelineCompiler::execution_order(&arena.nodes, &arena.pipes, &BTreeMap::new());
        assert_eq!(order, vec![independent]);
        assert_eq!(unscheduled, vec![a, b, c, fed_by_ring]);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let mut arena = Arena::new();
        let looped = arena.calibration(Some(0));

        let result = arena.assign_ranks();
        assert_eq!(result.cycle_nodes, vec![looped]);

        let (order, unscheduled) =
            PipelineCompiler::execution_order(&arena.nodes, &arena.pipes, &BTreeMap::new());
        assert!(order.is_empty());
        assert_eq!(unscheduled, vec![looped]);
    }

    #[test]
    fn test_order_ties_break_on_rank_then_index() {
        let mut arena = Arena::new();
        let src = arena.source();
        let deep = arena.calibration(Some(3));
        let gated = arena.calibration(Some(src.index()));
        let shallow = arena.calibration(Some(src.index()));
        let unconnected = arena.calibration(None);
        let cond = arena.condition(src.index());
        arena.assign_ranks();

        let (order, unscheduled) =
            PipelineCompiler::execution_order(&arena.nodes, &arena.pipes, &BTreeMap::new());
        assert!(unscheduled.is_empty());
        assert_eq!(order, vec![gated, shallow, unconnected, cond, deep]);

        // A condition link holds the gated node back until its condition ran.
        let links = BTreeMap::from([(
            gated,
            ConditionLink {
                condition: cond,
                sub_index: 0,
            },
        )]);
        let (order, _) = PipelineCompiler::execution_order(&arena.nodes, &arena.pipes, &links);
        assert_eq!(order, vec![shallow, unconnected, cond, gated, deep]);
    }
}
