//! Description of the VME setup the analysis runs against.
//!
//! The analysis only needs to map event and module ids to their positions in
//! the readout and back. `VmeConfigLookup` is that seam; `VmeConfig` is a
//! plain JSON-backed implementation of it.

use crate::error::{AnalysisError, Result};
use crate::pipeline::id::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Resolves VME event and module ids to readout indexes.
pub trait VmeConfigLookup {
    fn event_index(&self, event_id: &ObjectId) -> Option<usize>;

    /// Returns `(event_index, module_index)`.
    fn module_index(&self, module_id: &ObjectId) -> Option<(usize, usize)>;

    fn event_id(&self, event_index: usize) -> Option<ObjectId>;

    /// `None` past the last module of the event.
    fn module_id(&self, event_index: usize, module_index: usize) -> Option<ObjectId>;

    fn module_name(&self, module_id: &ObjectId) -> Option<String>;

    fn event_count(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub id: ObjectId,
    pub name: String,
    #[serde(default, rename = "type")]
    pub module_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

/// Ordered list of events with their modules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmeConfig {
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

impl VmeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AnalysisError::Config(format!("Failed to parse VME config {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Append an event and return its id.
    pub fn add_event(&mut self, name: impl Into<String>) -> ObjectId {
        let id = ObjectId::new();
        self.events.push(EventConfig {
            id,
            name: name.into(),
            modules: Vec::new(),
        });
        id
    }

    /// Append a module to an existing event and return its id.
    pub fn add_module(
        &mut self,
        event_index: usize,
        name: impl Into<String>,
        module_type: impl Into<String>,
    ) -> Option<ObjectId> {
        let event = self.events.get_mut(event_index)?;
        let id = ObjectId::new();
        event.modules.push(ModuleConfig {
            id,
            name: name.into(),
            module_type: module_type.into(),
        });
        Some(id)
    }

    fn find_module(&self, module_id: &ObjectId) -> Option<(usize, usize, &ModuleConfig)> {
        self.events.iter().enumerate().find_map(|(ei, event)| {
            event
                .modules
                .iter()
                .enumerate()
                .find(|(_, m)| m.id == *module_id)
                .map(|(mi, m)| (ei, mi, m))
        })
    }
}

impl VmeConfigLookup for VmeConfig {
    fn event_index(&self, event_id: &ObjectId) -> Option<usize> {
        self.events.iter().position(|e| e.id == *event_id)
    }

    fn module_index(&self, module_id: &ObjectId) -> Option<(usize, usize)> {
        self.find_module(module_id).map(|(ei, mi, _)| (ei, mi))
    }

    fn event_id(&self, event_index: usize) -> Option<ObjectId> {
        self.events.get(event_index).map(|e| e.id)
    }

    fn module_id(&self, event_index: usize, module_index: usize) -> Option<ObjectId> {
        self.events
            .get(event_index)?
            .modules
            .get(module_index)
            .map(|m| m.id)
    }

    fn module_name(&self, module_id: &ObjectId) -> Option<String> {
        self.find_module(module_id).map(|(_, _, m)| m.name.clone())
    }

    fn event_count(&self) -> usize {
        self.events.len()
    }
}

/// Owned copy of a lookup's id/index mapping, held for the duration of a run
/// so the plan can be rebuilt between events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmeSnapshot {
    events: Vec<ObjectId>,
    modules: Vec<Vec<ObjectId>>,
    module_names: HashMap<ObjectId, String>,
}

impl VmeSnapshot {
    pub fn capture(vme: &dyn VmeConfigLookup) -> Self {
        let mut snapshot = Self::default();
        for ei in 0..vme.event_count() {
            let Some(event_id) = vme.event_id(ei) else {
                break;
            };
            let modules: Vec<ObjectId> = (0..).map_while(|mi| vme.module_id(ei, mi)).collect();
            for module in &modules {
                if let Some(name) = vme.module_name(module) {
                    snapshot.module_names.insert(*module, name);
                }
            }
            snapshot.events.push(event_id);
            snapshot.modules.push(modules);
        }
        snapshot
    }
}

impl VmeConfigLookup for VmeSnapshot {
    fn event_index(&self, event_id: &ObjectId) -> Option<usize> {
        self.events.iter().position(|e| e == event_id)
    }

    fn module_index(&self, module_id: &ObjectId) -> Option<(usize, usize)> {
        self.modules.iter().enumerate().find_map(|(ei, modules)| {
            modules
                .iter()
                .position(|m| m == module_id)
                .map(|mi| (ei, mi))
        })
    }

    fn event_id(&self, event_index: usize) -> Option<ObjectId> {
        self.events.get(event_index).copied()
    }

    fn module_id(&self, event_index: usize, module_index: usize) -> Option<ObjectId> {
        self.modules.get(event_index)?.get(module_index).copied()
    }

    fn module_name(&self, module_id: &ObjectId) -> Option<String> {
        self.module_names.get(module_id).cloned()
    }

    fn event_count(&self) -> usize {
        self.events.len()
    }
}

/// Information about the run being started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub is_replay: bool,
    pub started: DateTime<Utc>,
}

impl RunInfo {
    pub fn new(run_id: impl Into<String>, is_replay: bool) -> Self {
        Self {
            run_id: run_id.into(),
            is_replay,
            started: Utc::now(),
        }
    }
}
