//! JSON analysis documents.
//!
//! A document stores every node as `{id, name, eventId, class, data}` where
//! `data` is the node's own configuration blob, plus the connection and
//! condition-link tables. Loading is best-effort: objects that cannot be
//! rebuilt are skipped and reported in a `LoadReport`.

pub mod migration;

pub use migration::{document_version, upgrade, MigrationError, SchemaError};

use crate::config::VmeConfigLookup;
use crate::error::Result;
use crate::pipeline::{
    create_node, Analysis, Directory, NodeBehavior, NodeCategory, NodeClass, NodeId, ObjectId,
    ObjectMeta, PipelineError, PipelineResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Schema version written by this crate.
pub const CURRENT_VERSION: i64 = 4;

pub const VERSION_KEY: &str = "MVMEAnalysisVersion";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub module_id: String,
    pub class: String,
    #[serde(default)]
    pub data: Value,
}

/// Operators, conditions and sinks. Only sinks carry `enabled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub event_id: String,
    pub class: String,
    #[serde(default)]
    pub user_level: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryData {
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub user_level: i32,
    #[serde(default)]
    pub data: DirectoryData,
}

impl From<&Directory> for DirectoryEntry {
    fn from(dir: &Directory) -> Self {
        Self {
            id: dir.id.to_string(),
            name: dir.name.clone(),
            event_id: dir.event_id.to_string(),
            user_level: dir.user_level,
            data: DirectoryData {
                members: dir.members.iter().map(ToString::to_string).collect(),
            },
        }
    }
}

/// `dstParamIndex` is `-1` for a whole-array connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEntry {
    pub src_id: String,
    pub src_index: usize,
    pub dst_id: String,
    pub dst_index: usize,
    #[serde(default = "whole_array")]
    pub dst_param_index: i64,
}

fn whole_array() -> i64 {
    -1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionLinkEntry {
    pub operator_id: String,
    pub condition_id: String,
    pub sub_index: usize,
}

/// The serialized form of an `Analysis`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDocument {
    #[serde(rename = "MVMEAnalysisVersion", default = "current_version")]
    pub version: i64,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub operators: Vec<OperatorEntry>,
    #[serde(default)]
    pub directories: Vec<DirectoryEntry>,
    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,
    #[serde(rename = "conditionLinks", default)]
    pub condition_links: Vec<ConditionLinkEntry>,
    #[serde(rename = "VMEObjectSettings", default)]
    pub vme_object_settings: Map<String, Value>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

fn current_version() -> i64 {
    CURRENT_VERSION
}

/// What happened while loading a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Version of the document before migration.
    pub original_version: i64,
    /// Objects or references that were skipped.
    pub diagnostics: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn was_migrated(&self) -> bool {
        self.original_version != CURRENT_VERSION
    }

    fn skip(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.diagnostics.push(message);
    }
}

fn parse_id(text: &str) -> Option<ObjectId> {
    text.parse().ok()
}

impl Analysis {
    /// Serialize into a document at the current version.
    pub fn to_document(&self) -> Result<AnalysisDocument> {
        let mut doc = AnalysisDocument {
            version: CURRENT_VERSION,
            vme_object_settings: self.vme_object_settings.clone(),
            properties: self.properties.clone(),
            ..Default::default()
        };

        for (_, entry) in self.nodes() {
            let meta = &entry.meta;
            let data = entry.kind.write_data()?;
            if entry.kind.is_source() {
                doc.sources.push(SourceEntry {
                    id: meta.id.to_string(),
                    name: meta.name.clone(),
                    event_id: meta.event_id.to_string(),
                    module_id: meta.module_id.unwrap_or_default().to_string(),
                    class: entry.kind.class_name().to_string(),
                    data,
                });
            } else {
                doc.operators.push(OperatorEntry {
                    id: meta.id.to_string(),
                    name: meta.name.clone(),
                    event_id: meta.event_id.to_string(),
                    class: entry.kind.class_name().to_string(),
                    user_level: meta.user_level,
                    enabled: entry.kind.is_sink().then_some(meta.enabled),
                    data,
                });
            }

            for (dst_index, slot) in entry.slots.iter().enumerate() {
                let Some(pipe) = slot.input.and_then(|pid| self.pipe(pid)) else {
                    continue;
                };
                let Some(src) = self.node(pipe.source) else {
                    continue;
                };
                doc.connections.push(ConnectionEntry {
                    src_id: src.id().to_string(),
                    src_index: pipe.source_output_index,
                    dst_id: meta.id.to_string(),
                    dst_index,
                    dst_param_index: slot.param_index.map_or(-1, |i| i as i64),
                });
            }
        }

        doc.directories = self.directories.iter().map(DirectoryEntry::from).collect();

        for (gated, link) in self.condition_links() {
            let (Some(op), Some(cond)) = (self.node(gated), self.node(link.condition)) else {
                continue;
            };
            doc.condition_links.push(ConditionLinkEntry {
                operator_id: op.id().to_string(),
                condition_id: cond.id().to_string(),
                sub_index: link.sub_index,
            });
        }

        Ok(doc)
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.to_document()?)?)
    }

    /// Load from JSON, migrating older documents first.
    ///
    /// Version 1 documents need `vme` to resolve their event and module
    /// indexes. Schema and migration failures return no graph.
    pub fn from_json(
        json: Value,
        vme: Option<&dyn VmeConfigLookup>,
    ) -> Result<(Analysis, LoadReport)> {
        let Value::Object(map) = json else {
            return Err(SchemaError::InvalidDocument("expected a JSON object".into()).into());
        };

        let (upgraded, original_version) = upgrade(map, vme)?;
        let doc: AnalysisDocument = serde_json::from_value(Value::Object(upgraded))
            .map_err(|e| SchemaError::InvalidDocument(e.to_string()))?;

        let (analysis, mut report) = Analysis::from_document(doc);
        report.original_version = original_version;
        if report.was_migrated() {
            analysis.log(&format!(
                "Converted analysis from version {} to {}",
                original_version, CURRENT_VERSION
            ));
        }
        Ok((analysis, report))
    }

    /// Rebuild an analysis from an already current document.
    pub fn from_document(doc: AnalysisDocument) -> (Analysis, LoadReport) {
        let mut analysis = Analysis::new();
        let mut report = LoadReport {
            original_version: doc.version,
            ..Default::default()
        };

        for entry in doc.sources {
            let (Some(id), Some(event_id), Some(module_id)) = (
                parse_id(&entry.id),
                parse_id(&entry.event_id),
                parse_id(&entry.module_id),
            ) else {
                report.skip(format!("Source '{}' has a malformed id", entry.name));
                continue;
            };
            let category = NodeClass::from_class_name(&entry.class).map(|c| c.category());
            if category != Some(NodeCategory::Source) {
                report.skip(format!(
                    "Source '{}' has non-source class '{}'",
                    entry.name, entry.class
                ));
                continue;
            }
            let meta = ObjectMeta::new(entry.name.clone(), event_id)
                .with_id(id)
                .with_module(module_id);
            load_node(&mut analysis, &mut report, meta, &entry.class, &entry.data);
        }

        for entry in doc.operators {
            let (Some(id), Some(event_id)) = (parse_id(&entry.id), parse_id(&entry.event_id))
            else {
                report.skip(format!("Operator '{}' has a malformed id", entry.name));
                continue;
            };
            let category = NodeClass::from_class_name(&entry.class).map(|c| c.category());
            if category == Some(NodeCategory::Source) {
                report.skip(format!(
                    "Operator '{}' has source class '{}'",
                    entry.name, entry.class
                ));
                continue;
            }
            let meta = ObjectMeta::new(entry.name.clone(), event_id)
                .with_id(id)
                .with_user_level(entry.user_level)
                .with_enabled(entry.enabled.unwrap_or(true));
            load_node(&mut analysis, &mut report, meta, &entry.class, &entry.data);
        }

        for entry in doc.directories {
            let (Some(id), Some(event_id)) = (parse_id(&entry.id), parse_id(&entry.event_id))
            else {
                report.skip(format!("Directory '{}' has a malformed id", entry.name));
                continue;
            };
            let mut dir = Directory::new(entry.name, event_id).with_user_level(entry.user_level);
            dir.id = id;
            for member in &entry.data.members {
                match parse_id(member) {
                    Some(member) => dir.push_member(member),
                    None => report.skip(format!("Directory member '{member}' is malformed")),
                }
            }
            if let Err(e) = analysis.add_directory(dir) {
                report.skip(format!("Directory skipped: {e}"));
            }
        }
        // Members may be directories that come later in the list.
        let known: Vec<ObjectId> = analysis.directories.iter().map(|d| d.id).collect();
        for dir in &mut analysis.directories {
            dir.members
                .retain(|m| analysis.ids.contains_key(m) || known.contains(m));
        }

        for con in doc.connections {
            let resolve = |text: &str| parse_id(text).and_then(|id| analysis.node_id(&id));
            let (Some(src), Some(dst)) = (resolve(&con.src_id), resolve(&con.dst_id)) else {
                report.skip(format!(
                    "Connection {}[{}] -> {}[{}] references a missing object",
                    con.src_id, con.src_index, con.dst_id, con.dst_index
                ));
                continue;
            };
            let param_index = usize::try_from(con.dst_param_index).ok();
            if let Err(e) =
                analysis.connect_input_unsized(dst, con.dst_index, src, con.src_index, param_index)
            {
                report.skip(format!("Connection skipped: {e}"));
            }
        }

        analysis.refresh_pipe_sizes();
        report_out_of_range_params(&analysis, &mut report);

        for link in doc.condition_links {
            let resolve = |text: &str| parse_id(text).and_then(|id| analysis.node_id(&id));
            let (Some(op), Some(cond)) = (resolve(&link.operator_id), resolve(&link.condition_id))
            else {
                report.skip(format!(
                    "Condition link {} -> {} references a missing object",
                    link.condition_id, link.operator_id
                ));
                continue;
            };
            if let Err(e) = analysis.set_condition_link(op, cond, link.sub_index) {
                report.skip(format!("Condition link skipped: {e}"));
            }
        }

        analysis.vme_object_settings = doc.vme_object_settings;
        analysis.properties = doc.properties;

        tracing::info!(
            "Loaded analysis: {} objects, {} directories, {} skipped",
            analysis.node_count(),
            analysis.directories().len(),
            report.diagnostics.len()
        );
        (analysis, report)
    }

    /// Copy objects with fresh ids.
    ///
    /// Connections between copied objects are reproduced between the copies;
    /// inputs from objects outside the set stay connected to the originals.
    /// Condition links follow the same rule. Copied directories keep only
    /// copied members. Returns the original-to-copy id map.
    pub fn duplicate_objects(
        &mut self,
        ids: &[ObjectId],
    ) -> PipelineResult<HashMap<ObjectId, ObjectId>> {
        let mut id_map = HashMap::new();
        let mut node_map: HashMap<NodeId, NodeId> = HashMap::new();

        for id in ids {
            let Some(original) = self.node_id(id) else {
                continue;
            };
            let Some(entry) = self.node(original) else {
                continue;
            };

            let data = entry.kind.write_data().map_err(|e| PipelineError::Node {
                id: *id,
                message: e.to_string(),
            })?;
            let kind = create_node(entry.kind.class_name(), &data).map_err(|e| {
                PipelineError::Node {
                    id: *id,
                    message: e.to_string(),
                }
            })?;
            let mut meta = entry.meta.clone();
            meta.id = ObjectId::new();

            let new_id = meta.id;
            let copy = self.add_node(meta, kind)?;
            id_map.insert(*id, new_id);
            node_map.insert(original, copy);
        }

        for (&original, &copy) in &node_map {
            let inputs: Vec<_> = self
                .node(original)
                .map(|n| {
                    n.slots
                        .iter()
                        .enumerate()
                        .filter_map(|(i, s)| s.input.map(|pid| (i, pid, s.param_index)))
                        .collect()
                })
                .unwrap_or_default();

            for (slot_index, pid, param_index) in inputs {
                let Some(pipe) = self.pipe(pid) else { continue };
                let (producer, output_index) = (pipe.source, pipe.source_output_index);
                let producer = node_map.get(&producer).copied().unwrap_or(producer);
                self.connect_input_unsized(copy, slot_index, producer, output_index, param_index)?;
            }
        }

        for (&original, &copy) in &node_map {
            if let Some(link) = self.condition_link(original).copied() {
                let condition = node_map
                    .get(&link.condition)
                    .copied()
                    .unwrap_or(link.condition);
                self.set_condition_link(copy, condition, link.sub_index)?;
            }
        }

        let dirs: Vec<Directory> = ids.iter().filter_map(|id| self.directory(id).cloned()).collect();
        for dir in &dirs {
            id_map.insert(dir.id, ObjectId::new());
        }
        for dir in &dirs {
            let mut copy = dir.clone_with_ids(&id_map);
            if let Some(new_id) = id_map.get(&dir.id) {
                copy.id = *new_id;
            }
            self.add_directory(copy)?;
        }

        tracing::debug!("Duplicated {} objects", id_map.len());
        Ok(id_map)
    }
}

fn load_node(
    analysis: &mut Analysis,
    report: &mut LoadReport,
    meta: ObjectMeta,
    class: &str,
    data: &Value,
) {
    let name = meta.name.clone();
    match create_node(class, data) {
        Ok(kind) => {
            if let Err(e) = analysis.add_node(meta, kind) {
                report.skip(format!("'{name}' skipped: {e}"));
            }
        }
        Err(e) => report.skip(format!("'{name}' ({class}) skipped: {e}")),
    }
}

fn report_out_of_range_params(analysis: &Analysis, report: &mut LoadReport) {
    for (_, entry) in analysis.nodes() {
        for slot in &entry.slots {
            let (Some(pid), Some(pi)) = (slot.input, slot.param_index) else {
                continue;
            };
            let len = analysis.pipe(pid).map_or(0, |p| p.len());
            if pi >= len {
                report.skip(format!(
                    "'{}' slot '{}' uses element {} of an input of size {}",
                    entry.name(),
                    slot.name,
                    pi,
                    len
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::nodes::*;
    use serde_json::json;

    fn sample() -> (Analysis, NodeId, NodeId, NodeId) {
        let event = ObjectId::new();
        let mut analysis = Analysis::new();
        let src = analysis
            .add_source(
                ObjectMeta::new("amplitude", event).with_module(ObjectId::new()),
                SourceNode::Extractor(Extractor::new(ExtractorConfig::single("AAAADDDD")).unwrap()),
            )
            .unwrap();
        let cond = analysis
            .add_operator(
                ObjectMeta::new("gate", event),
                ConditionNode::Interval(IntervalCondition::new(vec![Interval::new(0.0, 4.0); 16])),
            )
            .unwrap();
        let sink = analysis
            .add_operator(
                ObjectMeta::new("amplitude_raw", event).with_enabled(false),
                SinkNode::Histo1D(Histo1DSink::new(Histo1DSinkConfig::default())),
            )
            .unwrap();
        analysis.connect_input(cond, 0, src, 0, None).unwrap();
        analysis.connect_input(sink, 0, src, 0, Some(3)).unwrap();
        analysis.set_condition_link(sink, cond, 3).unwrap();
        (analysis, src, cond, sink)
    }

    #[test]
    fn test_document_round_trip() {
        let (analysis, _, _, sink) = sample();
        let json = analysis.to_json().unwrap();
        assert_eq!(json[VERSION_KEY], json!(CURRENT_VERSION));
        assert_eq!(json["operators"][1]["enabled"], json!(false));
        assert!(json["operators"][0].get("enabled").is_none());
        assert_eq!(json["connections"][0]["dstParamIndex"], json!(-1));

        let (loaded, report) = Analysis::from_json(json.clone(), None).unwrap();
        assert!(report.is_clean(), "{:?}", report.diagnostics);
        assert!(!report.was_migrated());
        assert_eq!(loaded.to_json().unwrap(), json);

        let sink_id = analysis.node(sink).unwrap().id();
        let loaded_sink = loaded.node_by_object(&sink_id).unwrap();
        assert!(!loaded_sink.meta.enabled);
        assert_eq!(loaded_sink.slots[0].param_index, Some(3));
    }

    #[test]
    fn test_best_effort_skips_unknown_classes() {
        let (analysis, ..) = sample();
        let mut json = analysis.to_json().unwrap();
        json["operators"][0]["class"] = json!("FancyNewCondition");

        let (loaded, report) = Analysis::from_json(json, None).unwrap();
        assert_eq!(loaded.node_count(), 2);
        // unknown class, its connection and the link that referenced it
        assert_eq!(report.diagnostics.len(), 3);
        loaded.check_consistency().unwrap();
    }

    #[test]
    fn test_braced_ids_are_accepted() {
        let (analysis, ..) = sample();
        let mut json = analysis.to_json().unwrap();
        let id = json["sources"][0]["id"].as_str().unwrap().to_string();
        json["sources"][0]["id"] = json!(format!("{{{id}}}"));
        let (loaded, report) = Analysis::from_json(json, None).unwrap();
        assert!(report.is_clean(), "{:?}", report.diagnostics);
        assert!(loaded.node_by_object(&id.parse().unwrap()).is_some());
    }

    #[test]
    fn test_duplicate_objects() {
        let (mut analysis, src, cond, sink) = sample();
        let cond_id = analysis.node(cond).unwrap().id();
        let sink_id = analysis.node(sink).unwrap().id();
        let event = analysis.node(sink).unwrap().meta.event_id;

        let mut dir = Directory::new("raw", event);
        dir.push_member(sink_id);
        dir.push_member(ObjectId::new());
        let dir_id = analysis.add_directory(dir).unwrap();

        let map = analysis.duplicate_objects(&[sink_id, dir_id]).unwrap();
        assert_eq!(map.len(), 2);

        let copy = analysis.node_by_object(&map[&sink_id]).unwrap();
        let copy_input = copy.slots[0].input.and_then(|pid| analysis.pipe(pid)).unwrap();
        assert_eq!(copy_input.source, src);
        assert_eq!(copy.slots[0].param_index, Some(3));

        let copy_node = analysis.node_id(&map[&sink_id]).unwrap();
        assert_eq!(
            analysis.condition_link(copy_node).map(|l| l.condition),
            Some(cond)
        );
        assert_eq!(
            analysis.directory(&map[&dir_id]).unwrap().members,
            vec![map[&sink_id]]
        );
        assert!(analysis.node_by_object(&cond_id).is_some());
        analysis.check_consistency().unwrap();
    }
}
