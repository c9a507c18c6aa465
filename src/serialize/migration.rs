//! Schema version upgrades for analysis documents.
//!
//! Each converter lifts a document by exactly one version. `upgrade` applies
//! them in order until the document is current.

use super::{AnalysisDocument, DirectoryEntry, CURRENT_VERSION, VERSION_KEY};
use crate::config::VmeConfigLookup;
use crate::error::Result;
use crate::pipeline::{Analysis, Directory, NodeBehavior, ObjectId};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Document version {found} is newer than the supported version {supported}")]
    VersionTooNew { found: i64, supported: i64 },

    #[error("Document version {found} is too old to be converted")]
    VersionTooOld { found: i64 },

    #[error("Malformed analysis document: {0}")]
    InvalidDocument(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MigrationError {
    #[error("Could not resolve legacy event/module indexes: {}", failures.join("; "))]
    UnresolvedLegacyIndex { failures: Vec<String> },

    #[error("Converting a version 1 document requires a VME config")]
    LegacyConfigRequired,
}

type Converter = fn(Map<String, Value>, Option<&dyn VmeConfigLookup>) -> Result<Map<String, Value>>;

/// Converter lifting version `n` to `n + 1`, indexed by `n`.
const CONVERTERS: &[(i64, Converter)] = &[(1, v1_to_v2), (2, v2_to_v3), (3, v3_to_v4)];

/// Version tag of a document. Documents without a tag are version 1.
pub fn document_version(json: &Map<String, Value>) -> i64 {
    json.get(VERSION_KEY).and_then(Value::as_i64).unwrap_or(1)
}

/// Bring a document up to the current version.
///
/// Returns the upgraded document and the version it started at.
pub fn upgrade(
    mut json: Map<String, Value>,
    vme: Option<&dyn VmeConfigLookup>,
) -> Result<(Map<String, Value>, i64)> {
    let original = document_version(&json);

    if original > CURRENT_VERSION {
        return Err(SchemaError::VersionTooNew {
            found: original,
            supported: CURRENT_VERSION,
        }
        .into());
    }
    if original < 1 {
        return Err(SchemaError::VersionTooOld { found: original }.into());
    }

    let mut version = original;
    while version < CURRENT_VERSION {
        let converter = CONVERTERS
            .iter()
            .find(|(from, _)| *from == version)
            .map(|(_, c)| *c)
            .ok_or(SchemaError::VersionTooOld { found: version })?;

        json = converter(json, vme)?;
        json.insert(VERSION_KEY.to_string(), Value::from(version + 1));
        tracing::debug!("Converted analysis from version {} to {}", version, version + 1);
        version += 1;
    }

    Ok((json, original))
}

fn entries_mut<'a>(json: &'a mut Map<String, Value>, key: &str) -> Vec<&'a mut Map<String, Value>> {
    match json.get_mut(key) {
        Some(Value::Array(items)) => items.iter_mut().filter_map(Value::as_object_mut).collect(),
        _ => Vec::new(),
    }
}

fn describe(entry: &Map<String, Value>) -> String {
    format!(
        "'{}' ({})",
        entry.get("name").and_then(Value::as_str).unwrap_or(""),
        entry.get("id").and_then(Value::as_str).unwrap_or("?")
    )
}

fn index_field(entry: &Map<String, Value>, key: &str) -> Option<usize> {
    entry
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
}

/// Replace `eventIndex`/`moduleIndex` with `eventId`/`moduleId`.
///
/// All or nothing: if any object fails to resolve the whole conversion fails
/// and lists every failure.
fn v1_to_v2(
    mut json: Map<String, Value>,
    vme: Option<&dyn VmeConfigLookup>,
) -> Result<Map<String, Value>> {
    let vme = vme.ok_or(MigrationError::LegacyConfigRequired)?;
    let mut failures = Vec::new();

    for source in entries_mut(&mut json, "sources") {
        let event_index = index_field(source, "eventIndex");
        let module_index = index_field(source, "moduleIndex");
        let resolved = event_index.zip(module_index).and_then(|(ei, mi)| {
            Some((vme.event_id(ei)?, vme.module_id(ei, mi)?))
        });
        match resolved {
            Some((event_id, module_id)) => {
                source.insert("eventId".into(), Value::from(event_id.to_string()));
                source.insert("moduleId".into(), Value::from(module_id.to_string()));
                source.remove("eventIndex");
                source.remove("moduleIndex");
            }
            None => failures.push(format!(
                "source {}: event {:?} module {:?}",
                describe(source),
                event_index,
                module_index
            )),
        }
    }

    for op in entries_mut(&mut json, "operators") {
        let event_index = index_field(op, "eventIndex");
        match event_index.and_then(|ei| vme.event_id(ei)) {
            Some(event_id) => {
                op.insert("eventId".into(), Value::from(event_id.to_string()));
                op.remove("eventIndex");
            }
            None => failures.push(format!(
                "operator {}: event {:?}",
                describe(op),
                event_index
            )),
        }
    }

    if !failures.is_empty() {
        return Err(MigrationError::UnresolvedLegacyIndex { failures }.into());
    }
    Ok(json)
}

/// Group raw histograms into one directory per module.
///
/// A raw histogram is a user level 0 `Histo1DSink` fed directly by a source.
/// The graph is materialized to find them; only the resulting directories
/// are merged back into the document.
fn v2_to_v3(
    mut json: Map<String, Value>,
    vme: Option<&dyn VmeConfigLookup>,
) -> Result<Map<String, Value>> {
    let document: AnalysisDocument = serde_json::from_value(Value::Object(json.clone()))
        .map_err(|e| SchemaError::InvalidDocument(e.to_string()))?;
    let (analysis, _) = Analysis::from_document(document);

    let mut by_module: BTreeMap<ObjectId, Directory> = BTreeMap::new();

    for (_, sink) in analysis.nodes() {
        if sink.kind.class_name() != "Histo1DSink" || sink.meta.user_level != 0 {
            continue;
        }
        if analysis.directory_of(&sink.id()).is_some() {
            continue;
        }
        let source = sink
            .slots
            .first()
            .and_then(|slot| slot.input)
            .and_then(|pid| analysis.pipe(pid))
            .and_then(|pipe| analysis.node(pipe.source))
            .filter(|n| n.kind.is_source());
        let Some(module_id) = source.and_then(|s| s.meta.module_id) else {
            continue;
        };

        by_module
            .entry(module_id)
            .or_insert_with(|| {
                let name = vme
                    .and_then(|v| v.module_name(&module_id))
                    .unwrap_or_else(|| format!("module {module_id}"));
                Directory::new(name, sink.meta.event_id)
            })
            .push_member(sink.id());
    }

    if by_module.is_empty() {
        return Ok(json);
    }
    tracing::info!("Grouped raw histograms into {} module directories", by_module.len());

    let mut directories = match json.remove("directories") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    for dir in by_module.values() {
        directories.push(serde_json::to_value(DirectoryEntry::from(dir))?);
    }
    json.insert("directories".into(), Value::Array(directories));
    Ok(json)
}

/// Add an empty condition link table.
fn v3_to_v4(
    mut json: Map<String, Value>,
    _vme: Option<&dyn VmeConfigLookup>,
) -> Result<Map<String, Value>> {
    json.entry("conditionLinks")
        .or_insert_with(|| Value::Array(Vec::new()));
    Ok(json)
}
