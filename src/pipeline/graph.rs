//! Structural mutation of the analysis graph.
//!
//! Every mutation keeps pipe and slot back-references consistent and marks
//! ranks and plan dirty.

use super::directory::Directory;
use super::error::{PipelineError, PipelineResult};
use super::executor::{Analysis, ConditionLink, NodeEntry};
use super::id::{NodeId, ObjectId, PipeId};
use super::node::{BeginRunMode, NodeBehavior, NodeKind, ObjectFlags, ObjectMeta, OperatorBehavior};
use super::nodes::SourceNode;
use super::port::{InputType, Pipe, Slot, SlotRef};
use std::collections::HashSet;

impl Analysis {
    /// Add a node of any kind. Sources must be bound to a module.
    pub fn add_node(&mut self, meta: ObjectMeta, kind: NodeKind) -> PipelineResult<NodeId> {
        if self.ids.contains_key(&meta.id) || self.directory(&meta.id).is_some() {
            return Err(PipelineError::DuplicateObject(meta.id));
        }
        if kind.is_source() && meta.module_id.is_none() {
            return Err(PipelineError::MissingModule(meta.id));
        }

        let id = NodeId(self.nodes.len() as u32);
        let slots = kind
            .slot_descriptors()
            .iter()
            .enumerate()
            .map(|(i, desc)| Slot::new(desc, id, i))
            .collect();
        let object_id = meta.id;
        let is_source = kind.is_source();

        tracing::debug!(
            "Adding {} '{}' ({}) as {:?}",
            kind.class_name(),
            meta.name,
            object_id,
            id
        );

        self.nodes.push(Some(NodeEntry {
            meta,
            kind,
            slots,
            outputs: Vec::new(),
            rank: if is_source { 0 } else { 1 },
            condition_bits: Vec::new(),
        }));
        self.ids.insert(object_id, id);

        self.sync_node_ports(id);
        if is_source {
            // Source outputs depend only on the filter, so they can be sized now.
            self.begin_run_node(id, BeginRunMode::KeepState);
        }
        self.invalidate_compiled_plan();
        Ok(id)
    }

    pub fn add_source(&mut self, meta: ObjectMeta, source: SourceNode) -> PipelineResult<NodeId> {
        self.add_node(meta, NodeKind::Source(source))
    }

    /// Add an operator, condition or sink.
    pub fn add_operator(
        &mut self,
        meta: ObjectMeta,
        node: impl Into<NodeKind>,
    ) -> PipelineResult<NodeId> {
        let kind = node.into();
        if kind.is_source() {
            return Err(PipelineError::Node {
                id: meta.id,
                message: "sources must be added with add_source".to_string(),
            });
        }
        self.add_node(meta, kind)
    }

    /// Remove a node or directory.
    ///
    /// A node's inputs are disconnected, its output pipes destroyed (leaving
    /// the consumer slots in place but unconnected) and any condition links
    /// that name it are dropped.
    pub fn remove_object(&mut self, id: &ObjectId) -> PipelineResult<()> {
        if let Some(pos) = self.directories.iter().position(|d| d.id == *id) {
            self.directories.remove(pos);
            return Ok(());
        }

        let node = self
            .node_id(id)
            .ok_or(PipelineError::UnknownObject(*id))?;

        let slot_count = self.node(node).map_or(0, |n| n.slots.len());
        for slot_index in 0..slot_count {
            self.disconnect_slot(node, slot_index);
        }
        let outputs = self.node(node).map(|n| n.outputs.clone()).unwrap_or_default();
        for pid in outputs {
            self.destroy_pipe(pid);
        }

        self.condition_links
            .retain(|gated, link| *gated != node && link.condition != node);
        for dir in &mut self.directories {
            dir.remove_member(id);
        }

        if let Some(slot) = self.nodes.get_mut(node.index()) {
            *slot = None;
        }
        self.ids.remove(id);
        self.invalidate_compiled_plan();
        tracing::debug!("Removed {} ({:?})", id, node);
        Ok(())
    }

    /// Connect output `output_index` of `src` to input `slot_index` of `dst`.
    ///
    /// `param_index` selects one element of the output; `None` connects the
    /// whole array. A slot that is already connected is reconnected.
    pub fn connect_input(
        &mut self,
        dst: NodeId,
        slot_index: usize,
        src: NodeId,
        output_index: usize,
        param_index: Option<usize>,
    ) -> PipelineResult<()> {
        self.refresh_pipe_sizes();
        self.validate_connection(dst, slot_index, src, output_index, param_index, true)?;
        self.link_slot(dst, slot_index, src, output_index, param_index);
        Ok(())
    }

    /// Like `connect_input` but without the element range check, for loading
    /// documents whose producers are not sized yet.
    pub(crate) fn connect_input_unsized(
        &mut self,
        dst: NodeId,
        slot_index: usize,
        src: NodeId,
        output_index: usize,
        param_index: Option<usize>,
    ) -> PipelineResult<()> {
        self.validate_connection(dst, slot_index, src, output_index, param_index, false)?;
        self.link_slot(dst, slot_index, src, output_index, param_index);
        Ok(())
    }

    fn validate_connection(
        &self,
        dst: NodeId,
        slot_index: usize,
        src: NodeId,
        output_index: usize,
        param_index: Option<usize>,
        check_range: bool,
    ) -> PipelineResult<()> {
        let src_entry = self.node(src).ok_or(PipelineError::UnknownNode(src))?;
        let dst_entry = self.node(dst).ok_or(PipelineError::UnknownNode(dst))?;

        let pid = *src_entry.outputs.get(output_index).ok_or_else(|| {
            PipelineError::InvalidConnection(format!(
                "'{}' has no output {}",
                src_entry.name(),
                output_index
            ))
        })?;
        let slot = dst_entry.slots.get(slot_index).ok_or_else(|| {
            PipelineError::InvalidConnection(format!(
                "'{}' has no input slot {}",
                dst_entry.name(),
                slot_index
            ))
        })?;

        let wanted = match param_index {
            Some(_) => InputType::VALUE,
            None => InputType::ARRAY,
        };
        if !slot.accepted_input_types.contains(wanted) {
            return Err(PipelineError::InvalidConnection(format!(
                "slot '{}' of '{}' does not accept {}",
                slot.name,
                dst_entry.name(),
                if param_index.is_some() { "single values" } else { "arrays" }
            )));
        }

        if let (true, Some(pi)) = (check_range, param_index) {
            let len = self.pipe(pid).map_or(0, Pipe::len);
            if pi >= len {
                return Err(PipelineError::InvalidConnection(format!(
                    "element {} is out of range for output '{}' of size {}",
                    pi,
                    self.pipe(pid).map_or("", |p| p.params.name.as_str()),
                    len
                )));
            }
        }

        if self.would_create_cycle(src, dst) {
            return Err(PipelineError::WouldCreateCycle {
                from: src_entry.id(),
                to: dst_entry.id(),
            });
        }
        Ok(())
    }

    fn link_slot(
        &mut self,
        dst: NodeId,
        slot_index: usize,
        src: NodeId,
        output_index: usize,
        param_index: Option<usize>,
    ) {
        let Some(pid) = self
            .node(src)
            .and_then(|n| n.outputs.get(output_index).copied())
        else {
            return;
        };

        self.disconnect_slot(dst, slot_index);

        let Some(slot) = self
            .node_mut(dst)
            .and_then(|n| n.slots.get_mut(slot_index))
        else {
            return;
        };
        slot.input = Some(pid);
        slot.param_index = param_index;
        if let Some(entry) = self.node_mut(dst) {
            entry.meta.flags.insert(ObjectFlags::NEEDS_REBUILD);
        }

        if let Some(pipe) = self.pipes.get_mut(pid.index()).and_then(Option::as_mut) {
            pipe.add_destination(SlotRef {
                node: dst,
                slot_index,
            });
        }

        tracing::debug!(
            "Connected {:?}[{}] -> {:?}[{}] ({:?})",
            src,
            output_index,
            dst,
            slot_index,
            param_index
        );
        self.invalidate_compiled_plan();
    }

    /// Disconnect input `slot_index` of `dst`. Returns whether it was connected.
    pub fn disconnect_input(&mut self, dst: NodeId, slot_index: usize) -> PipelineResult<bool> {
        let entry = self.node(dst).ok_or(PipelineError::UnknownNode(dst))?;
        if slot_index >= entry.slots.len() {
            return Err(PipelineError::InvalidConnection(format!(
                "'{}' has no input slot {}",
                entry.name(),
                slot_index
            )));
        }
        let changed = self.disconnect_slot(dst, slot_index);
        if changed {
            self.invalidate_compiled_plan();
        }
        Ok(changed)
    }

    fn disconnect_slot(&mut self, node: NodeId, slot_index: usize) -> bool {
        let Some(slot) = self
            .node_mut(node)
            .and_then(|n| n.slots.get_mut(slot_index))
        else {
            return false;
        };
        let Some(pid) = slot.input else {
            return false;
        };
        slot.disconnect();
        if let Some(entry) = self.node_mut(node) {
            entry.meta.flags.insert(ObjectFlags::NEEDS_REBUILD);
        }

        if let Some(pipe) = self.pipes.get_mut(pid.index()).and_then(Option::as_mut) {
            pipe.remove_destination(SlotRef { node, slot_index });
        }
        true
    }

    fn destroy_pipe(&mut self, pid: PipeId) {
        let Some(mut pipe) = self.pipes.get_mut(pid.index()).and_then(Option::take) else {
            return;
        };
        for dest in pipe.take_destinations() {
            let Some(entry) = self.node_mut(dest.node) else {
                continue;
            };
            if let Some(slot) = entry.slots.get_mut(dest.slot_index) {
                if slot.input == Some(pid) {
                    slot.disconnect();
                    entry.meta.flags.insert(ObjectFlags::NEEDS_REBUILD);
                }
            }
        }
    }

    /// True if an edge `from -> to` would close a cycle, following data
    /// edges and condition links.
    pub fn would_create_cycle(&self, from: NodeId, to: NodeId) -> bool {
        if from == to {
            return true;
        }

        let mut visited = HashSet::new();
        let mut stack = vec![to];

        while let Some(current) = stack.pop() {
            if current == from {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            let Some(entry) = self.node(current) else {
                continue;
            };

            for pipe in entry.outputs.iter().filter_map(|pid| self.pipe(*pid)) {
                stack.extend(
                    pipe.destinations()
                        .iter()
                        .map(|d| d.node)
                        .filter(|n| !visited.contains(n)),
                );
            }
            if entry.kind.is_condition() {
                stack.extend(
                    self.condition_links
                        .iter()
                        .filter(|(gated, link)| link.condition == current && !visited.contains(*gated))
                        .map(|(gated, _)| *gated),
                );
            }
        }

        false
    }

    /// Append an input slot to an operator with a variable slot list.
    pub fn add_input_slot(&mut self, node: NodeId) -> PipelineResult<usize> {
        let entry = self.node_mut(node).ok_or(PipelineError::UnknownNode(node))?;
        let object_id = entry.id();
        let descriptor = match &mut entry.kind {
            NodeKind::Operator(op) => op.add_input_slot(),
            _ => None,
        }
        .ok_or(PipelineError::StaticSlots(object_id))?;

        let index = entry.slots.len();
        entry.slots.push(Slot::new(&descriptor, node, index));
        entry.meta.flags.insert(ObjectFlags::NEEDS_REBUILD);
        self.invalidate_compiled_plan();
        Ok(index)
    }

    /// Remove the last input slot of an operator with a variable slot list.
    pub fn remove_input_slot(&mut self, node: NodeId) -> PipelineResult<()> {
        let entry = self.node_mut(node).ok_or(PipelineError::UnknownNode(node))?;
        let object_id = entry.id();
        let removed = match &mut entry.kind {
            NodeKind::Operator(op) => op.remove_input_slot(),
            _ => false,
        };
        if !removed {
            return Err(PipelineError::StaticSlots(object_id));
        }

        let last = entry.slots.len().saturating_sub(1);
        self.disconnect_slot(node, last);
        if let Some(entry) = self.node_mut(node) {
            entry.slots.truncate(last);
            entry.meta.flags.insert(ObjectFlags::NEEDS_REBUILD);
        }
        self.invalidate_compiled_plan();
        Ok(())
    }

    /// Replace a node's configuration, keeping its id, name and every
    /// connection the new slot list can still accept.
    pub fn replace_node(&mut self, node: NodeId, kind: NodeKind) -> PipelineResult<()> {
        let entry = self.node(node).ok_or(PipelineError::UnknownNode(node))?;
        if entry.kind.kind_name() != kind.kind_name() {
            return Err(PipelineError::Node {
                id: entry.id(),
                message: format!(
                    "cannot replace a {} with a {}",
                    entry.kind.kind_name(),
                    kind.kind_name()
                ),
            });
        }

        let descriptors = kind.slot_descriptors();
        for slot_index in descriptors.len()..entry.slots.len() {
            self.disconnect_slot(node, slot_index);
        }

        let mut incompatible = Vec::new();
        if let Some(entry) = self.node_mut(node) {
            entry.slots.truncate(descriptors.len());
            for (i, desc) in descriptors.iter().enumerate() {
                match entry.slots.get_mut(i) {
                    Some(slot) => {
                        slot.name = desc.name.to_string();
                        slot.accepted_input_types = desc.accepted;
                        slot.is_optional = desc.optional;
                        let connected_as = match slot.param_index {
                            Some(_) => InputType::VALUE,
                            None => InputType::ARRAY,
                        };
                        if slot.is_connected() && !desc.accepted.contains(connected_as) {
                            incompatible.push(i);
                        }
                    }
                    None => entry.slots.push(Slot::new(desc, node, i)),
                }
            }
            entry.kind = kind;
            entry.meta.flags.insert(ObjectFlags::NEEDS_REBUILD);
        }
        for slot_index in incompatible {
            self.disconnect_slot(node, slot_index);
        }

        self.sync_node_ports(node);
        if self.node(node).is_some_and(|n| n.kind.is_source()) {
            self.begin_run_node(node, BeginRunMode::KeepState);
        }
        self.invalidate_compiled_plan();
        Ok(())
    }

    /// Make the node's output pipes match its output count and names.
    pub(crate) fn sync_node_ports(&mut self, node: NodeId) {
        let Some(entry) = self.node(node) else {
            return;
        };
        let wanted = entry.kind.output_count();
        let names: Vec<String> = (0..wanted).map(|i| entry.kind.output_name(i)).collect();

        let removed = match self.node_mut(node) {
            Some(entry) if entry.outputs.len() > wanted => entry.outputs.split_off(wanted),
            _ => Vec::new(),
        };
        for pid in removed {
            self.destroy_pipe(pid);
        }

        let have = self.node(node).map_or(0, |n| n.outputs.len());
        for (index, name) in names.iter().enumerate().skip(have) {
            let pid = PipeId(self.pipes.len() as u32);
            self.pipes.push(Some(Pipe::new(node, index, name.clone())));
            if let Some(entry) = self.node_mut(node) {
                entry.outputs.push(pid);
            }
        }

        if let Some(entry) = self.nodes.get(node.index()).and_then(Option::as_ref) {
            for (pid, name) in entry.outputs.iter().zip(names) {
                if let Some(pipe) = self.pipes.get_mut(pid.index()).and_then(Option::as_mut) {
                    pipe.params.name = name;
                    pipe.rank = entry.rank;
                }
            }
        }
    }

    // ==================== Condition links ====================

    /// Gate `node` on bit `sub_index` of `condition`, replacing any previous
    /// link of `node`.
    pub fn set_condition_link(
        &mut self,
        node: NodeId,
        condition: NodeId,
        sub_index: usize,
    ) -> PipelineResult<()> {
        self.refresh_pipe_sizes();

        let cond = self
            .node(condition)
            .ok_or(PipelineError::UnknownNode(condition))?;
        if !cond.kind.is_condition() {
            return Err(PipelineError::InvalidConditionLink(format!(
                "'{}' is not a condition",
                cond.name()
            )));
        }
        let bits = cond.condition_bits.len();
        if sub_index >= bits {
            return Err(PipelineError::InvalidConditionLink(format!(
                "bit {} is outside the {}-bit condition '{}'",
                sub_index,
                bits,
                cond.name()
            )));
        }

        let target = self.node(node).ok_or(PipelineError::UnknownNode(node))?;
        if target.kind.is_source() {
            return Err(PipelineError::InvalidConditionLink(format!(
                "source '{}' cannot be gated",
                target.name()
            )));
        }
        if self.would_create_cycle(condition, node) {
            return Err(PipelineError::WouldCreateCycle {
                from: cond.id(),
                to: target.id(),
            });
        }

        self.condition_links.insert(
            node,
            ConditionLink {
                condition,
                sub_index,
            },
        );
        self.invalidate_compiled_plan();
        Ok(())
    }

    pub fn clear_condition_link(&mut self, node: NodeId) -> Option<ConditionLink> {
        let removed = self.condition_links.remove(&node);
        if removed.is_some() {
            self.invalidate_compiled_plan();
        }
        removed
    }

    // ==================== Objects & directories ====================

    pub fn set_enabled(&mut self, node: NodeId, enabled: bool) -> PipelineResult<()> {
        let entry = self.node_mut(node).ok_or(PipelineError::UnknownNode(node))?;
        entry.meta.enabled = enabled;
        Ok(())
    }

    pub fn rename(&mut self, node: NodeId, name: impl Into<String>) -> PipelineResult<()> {
        let entry = self.node_mut(node).ok_or(PipelineError::UnknownNode(node))?;
        entry.meta.name = name.into();
        Ok(())
    }

    pub fn add_directory(&mut self, directory: Directory) -> PipelineResult<ObjectId> {
        if self.ids.contains_key(&directory.id) || self.directory(&directory.id).is_some() {
            return Err(PipelineError::DuplicateObject(directory.id));
        }
        let id = directory.id;
        self.directories.push(directory);
        Ok(id)
    }

    pub fn directory(&self, id: &ObjectId) -> Option<&Directory> {
        self.directories.iter().find(|d| d.id == *id)
    }

    pub fn directory_mut(&mut self, id: &ObjectId) -> Option<&mut Directory> {
        self.directories.iter_mut().find(|d| d.id == *id)
    }

    /// The directory containing `member`, if any.
    pub fn directory_of(&self, member: &ObjectId) -> Option<&Directory> {
        self.directories.iter().find(|d| d.contains(member))
    }

    /// Move `member` into `directory`, removing it from any other directory.
    pub fn add_to_directory(&mut self, directory: &ObjectId, member: ObjectId) -> PipelineResult<()> {
        if self.directory(directory).is_none() {
            return Err(PipelineError::UnknownObject(*directory));
        }
        if !self.ids.contains_key(&member) && self.directory(&member).is_none() {
            return Err(PipelineError::UnknownObject(member));
        }
        for dir in &mut self.directories {
            dir.remove_member(&member);
        }
        if let Some(dir) = self.directory_mut(directory) {
            dir.push_member(member);
        }
        Ok(())
    }

    // ==================== Consistency ====================

    /// Verify pipe and slot back-references, the id index and condition links.
    pub fn check_consistency(&self) -> PipelineResult<()> {
        let fail = |msg: String| Err(PipelineError::InvalidConnection(msg));

        for (id, entry) in self.nodes() {
            if self.ids.get(&entry.id()) != Some(&id) {
                return fail(format!("{} is not indexed as {:?}", entry.id(), id));
            }
            for (slot_index, slot) in entry.slots.iter().enumerate() {
                if slot.parent != id || slot.parent_slot_index != slot_index {
                    return fail(format!("slot {slot_index} of {id:?} has a wrong parent"));
                }
                let Some(pid) = slot.input else { continue };
                let Some(pipe) = self.pipe(pid) else {
                    return fail(format!("slot {slot_index} of {id:?} uses removed pipe {pid:?}"));
                };
                if !pipe.destinations().contains(&SlotRef { node: id, slot_index }) {
                    return fail(format!(
                        "pipe {pid:?} does not list slot {slot_index} of {id:?}"
                    ));
                }
            }
            for (index, pid) in entry.outputs.iter().enumerate() {
                let Some(pipe) = self.pipe(*pid) else {
                    return fail(format!("output {index} of {id:?} is missing"));
                };
                if pipe.source != id || pipe.source_output_index != index {
                    return fail(format!("pipe {pid:?} has a wrong source"));
                }
            }
        }

        for (i, pipe) in self.pipes.iter().enumerate() {
            let Some(pipe) = pipe else { continue };
            let pid = PipeId(i as u32);
            if self.node(pipe.source).and_then(|n| n.outputs.get(pipe.source_output_index))
                != Some(&pid)
            {
                return fail(format!("pipe {pid:?} is not owned by {:?}", pipe.source));
            }
            for dest in pipe.destinations() {
                let input = self
                    .node(dest.node)
                    .and_then(|n| n.slots.get(dest.slot_index))
                    .and_then(|s| s.input);
                if input != Some(pid) {
                    return fail(format!("pipe {pid:?} lists a slot that is not connected to it"));
                }
            }
        }

        if self.ids.len() != self.nodes().count() {
            return fail("object index has stale entries".to_string());
        }

        for (gated, link) in &self.condition_links {
            if self.node(*gated).is_none() {
                return fail(format!("condition link on removed node {gated:?}"));
            }
            if !self.node(link.condition).is_some_and(|c| c.kind.is_condition()) {
                return fail(format!("{gated:?} is gated by a non-condition"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::nodes::*;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta::new(name, ObjectId::nil())
    }

    fn add_extractor(analysis: &mut Analysis, template: &str) -> NodeId {
        let extractor = Extractor::new(ExtractorConfig::single(template)).unwrap();
        analysis
            .add_source(
                meta("raw").with_module(ObjectId::new()),
                SourceNode::Extractor(extractor),
            )
            .unwrap()
    }

    fn add_calibration(analysis: &mut Analysis) -> NodeId {
        let cal = CalibrationMinMax::new(CalibrationConfig::new(0.0, 1.0));
        analysis
            .add_operator(meta("cal"), OperatorNode::Calibration(cal))
            .unwrap()
    }

    #[test]
    fn test_source_requires_module() {
        let mut analysis = Analysis::new();
        let extractor = Extractor::new(ExtractorConfig::single("AAAADDDD")).unwrap();
        let result = analysis.add_source(meta("raw"), SourceNode::Extractor(extractor));
        assert!(matches!(result, Err(PipelineError::MissingModule(_))));
    }

    #[test]
    fn test_duplicate_id_is_refused() {
        let mut analysis = Analysis::new();
        let m = meta("cal");
        let op = OperatorNode::Difference(Difference::new());
        analysis.add_operator(m.clone(), op.clone()).unwrap();
        assert!(matches!(
            analysis.add_operator(m, op),
            Err(PipelineError::DuplicateObject(_))
        ));
    }

    #[test]
    fn test_source_is_sized_on_add() {
        let mut analysis = Analysis::new();
        let src = add_extractor(&mut analysis, "AAAADDDD");
        assert_eq!(analysis.output(src, 0).map(Pipe::len), Some(16));
    }

    #[test]
    fn test_connect_and_disconnect_keep_back_references() {
        let mut analysis = Analysis::new();
        let src = add_extractor(&mut analysis, "AAAADDDD");
        let cal = add_calibration(&mut analysis);

        analysis.connect_input(cal, 0, src, 0, None).unwrap();
        analysis.check_consistency().unwrap();
        assert_eq!(analysis.output(src, 0).unwrap().destinations().len(), 1);

        assert!(analysis.disconnect_input(cal, 0).unwrap());
        assert!(!analysis.disconnect_input(cal, 0).unwrap());
        analysis.check_consistency().unwrap();
        assert!(analysis.output(src, 0).unwrap().destinations().is_empty());
    }

    #[test]
    fn test_param_index_out_of_range_is_refused() {
        let mut analysis = Analysis::new();
        let src = add_extractor(&mut analysis, "AAAADDDD");
        let sel = analysis
            .add_operator(meta("sel"), OperatorNode::Difference(Difference::new()))
            .unwrap();
        assert!(analysis.connect_input(sel, 0, src, 0, Some(15)).is_ok());
        assert!(matches!(
            analysis.connect_input(sel, 1, src, 0, Some(16)),
            Err(PipelineError::InvalidConnection(_))
        ));
    }

    #[test]
    fn test_cycle_is_refused() {
        let mut analysis = Analysis::new();
        let a = add_calibration(&mut analysis);
        let b = add_calibration(&mut analysis);
        analysis.connect_input(b, 0, a, 0, None).unwrap();
        assert!(matches!(
            analysis.connect_input(a, 0, b, 0, None),
            Err(PipelineError::WouldCreateCycle { .. })
        ));
        assert!(matches!(
            analysis.connect_input(a, 0, a, 0, None),
            Err(PipelineError::WouldCreateCycle { .. })
        ));
    }

    #[test]
    fn test_remove_object_disconnects_consumers() {
        let mut analysis = Analysis::new();
        let src = add_extractor(&mut analysis, "AAAADDDD");
        let cal = add_calibration(&mut analysis);
        analysis.connect_input(cal, 0, src, 0, None).unwrap();

        let src_id = analysis.node(src).unwrap().id();
        analysis.remove_object(&src_id).unwrap();

        assert!(analysis.node(src).is_none());
        let cal_entry = analysis.node(cal).unwrap();
        assert_eq!(cal_entry.slots.len(), 1);
        assert!(!cal_entry.slots[0].is_connected());
        analysis.check_consistency().unwrap();
        assert!(matches!(
            analysis.remove_object(&src_id),
            Err(PipelineError::UnknownObject(_))
        ));
    }

    #[test]
    fn test_dynamic_slots() {
        let mut analysis = Analysis::new();
        let concat = analysis
            .add_operator(meta("concat"), OperatorNode::ArrayConcat(ArrayConcat::new(1)))
            .unwrap();
        assert_eq!(analysis.add_input_slot(concat).unwrap(), 1);
        analysis.remove_input_slot(concat).unwrap();
        assert!(analysis.remove_input_slot(concat).is_err());

        let cal = add_calibration(&mut analysis);
        assert!(matches!(
            analysis.add_input_slot(cal),
            Err(PipelineError::StaticSlots(_))
        ));
    }

    #[test]
    fn test_condition_link_validation() {
        let mut analysis = Analysis::new();
        let src = add_extractor(&mut analysis, "AAAADDDD");
        let cal = add_calibration(&mut analysis);
        let cond = analysis
            .add_operator(
                meta("gate"),
                ConditionNode::Interval(IntervalCondition::new(vec![Interval::new(0.0, 8.0); 16])),
            )
            .unwrap();
        analysis.connect_input(cal, 0, src, 0, None).unwrap();
        analysis.connect_input(cond, 0, src, 0, None).unwrap();

        assert!(matches!(
            analysis.set_condition_link(cal, cond, 16),
            Err(PipelineError::InvalidConditionLink(_))
        ));
        assert!(matches!(
            analysis.set_condition_link(cal, src, 0),
            Err(PipelineError::InvalidConditionLink(_))
        ));
        analysis.set_condition_link(cal, cond, 3).unwrap();
        assert_eq!(
            analysis.condition_link(cal).map(|l| l.sub_index),
            Some(3)
        );

        // The gated operator must not feed its own condition.
        assert!(matches!(
            analysis.connect_input(cond, 0, cal, 0, None),
            Err(PipelineError::WouldCreateCycle { .. })
        ));

        assert!(analysis.clear_condition_link(cal).is_some());
        assert!(analysis.clear_condition_link(cal).is_none());
    }

    #[test]
    fn test_replace_keeps_compatible_connections() {
        let mut analysis = Analysis::new();
        let src = add_extractor(&mut analysis, "AAAADDDD");
        let cal = add_calibration(&mut analysis);
        analysis.connect_input(cal, 0, src, 0, None).unwrap();

        let replacement = CalibrationMinMax::new(CalibrationConfig::new(0.0, 100.0));
        analysis
            .replace_node(cal, OperatorNode::Calibration(replacement).into())
            .unwrap();
        assert!(analysis.node(cal).unwrap().slots[0].is_connected());

        let bad = Histo1DSink::new(Histo1DSinkConfig::default());
        assert!(analysis
            .replace_node(cal, SinkNode::Histo1D(bad).into())
            .is_err());
        analysis.check_consistency().unwrap();
    }

    #[test]
    fn test_directory_membership_moves() {
        let mut analysis = Analysis::new();
        let cal = add_calibration(&mut analysis);
        let cal_id = analysis.node(cal).unwrap().id();
        let a = analysis.add_directory(Directory::new("a", ObjectId::nil())).unwrap();
        let b = analysis.add_directory(Directory::new("b", ObjectId::nil())).unwrap();

        analysis.add_to_directory(&a, cal_id).unwrap();
        analysis.add_to_directory(&b, cal_id).unwrap();
        assert_eq!(analysis.directory_of(&cal_id).map(|d| d.id), Some(b));
        assert!(analysis.directory(&a).unwrap().members.is_empty());

        analysis.remove_object(&cal_id).unwrap();
        assert!(analysis.directory(&b).unwrap().members.is_empty());
        analysis.remove_object(&b).unwrap();
        assert!(analysis.directory(&b).is_none());
    }
}
