//! Configuration and files for vme-analysis
//!
//! This module handles:
//! - Runtime settings (`settings.toml` in the config directory)
//! - The VME setup description the analysis resolves events and modules against
//! - Analysis files (`.analysis`), JSON documents with migration applied on load
//!
//! # Config Location
//!
//! Settings are stored in the platform-appropriate location:
//! - **Linux**: `~/.config/vme-analysis/`
//! - **macOS**: `~/Library/Application Support/vme-analysis/`
//! - **Windows**: `%APPDATA%\vme-analysis\`
//!
//! # Example
//!
//! ```ignore
//! use vme_analysis::config::{AnalysisFile, AnalysisSettings, VmeConfig};
//!
//! let settings = AnalysisSettings::load_or_default();
//! let vme = VmeConfig::load("setup.json")?;
//! let file = AnalysisFile::load("run.analysis", Some(&vme))?;
//! file.save("run_v4.analysis")?;
//! ```

pub mod settings;
pub mod vme_config;

pub use settings::*;
pub use vme_config::*;

use crate::error::{AnalysisError, Result};
use crate::pipeline::Analysis;
use crate::serialize::LoadReport;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "vme-analysis";

/// Analysis file extension
pub const ANALYSIS_FILE_EXTENSION: &str = "analysis";

/// Top-level key wrapping the analysis document in analysis files.
pub const ANALYSIS_FILE_KEY: &str = "AnalysisNG";

// ==================== Config Directory ====================

pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Ensure the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().ok_or_else(|| {
        AnalysisError::Config("Could not determine config directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            AnalysisError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the settings file
pub fn settings_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(SETTINGS_FILE))
}

// ==================== Analysis File ====================

/// An analysis loaded from disk together with what happened while loading.
#[derive(Debug)]
pub struct AnalysisFile {
    pub analysis: Analysis,
    pub report: LoadReport,
    pub path: Option<PathBuf>,
}

impl AnalysisFile {
    pub fn new(analysis: Analysis) -> Self {
        Self {
            analysis,
            report: LoadReport::default(),
            path: None,
        }
    }

    /// Load and migrate an analysis file.
    ///
    /// Accepts both the wrapped form `{"AnalysisNG": {...}}` and a bare
    /// document. `vme` is needed for version 1 documents.
    pub fn load(path: impl AsRef<Path>, vme: Option<&dyn VmeConfigLookup>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("Failed to read analysis file {:?}: {}", path, e))
        })?;

        let mut json: Value = serde_json::from_str(&content).map_err(|e| {
            AnalysisError::Config(format!("Failed to parse analysis file {:?}: {}", path, e))
        })?;
        if let Some(inner) = json.get_mut(ANALYSIS_FILE_KEY) {
            json = inner.take();
        }

        let (analysis, report) = Analysis::from_json(json, vme)
            .map_err(|e| e.with_context(format!("Failed to load {}", path.display())))?;

        tracing::info!(
            "Loaded analysis file {:?} (version {}, {} diagnostics)",
            path,
            report.original_version,
            report.diagnostics.len()
        );

        Ok(Self {
            analysis,
            report,
            path: Some(path.to_path_buf()),
        })
    }

    /// Save as a wrapped document at the current version.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AnalysisError::Config(format!("Failed to create directory: {}", e))
            })?;
        }

        let mut root = serde_json::Map::new();
        root.insert(ANALYSIS_FILE_KEY.to_string(), self.analysis.to_json()?);
        let content = serde_json::to_string_pretty(&Value::Object(root))
            .map_err(|e| AnalysisError::Config(format!("Failed to serialize analysis: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            AnalysisError::Config(format!("Failed to write analysis file {:?}: {}", path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::nodes::{Extractor, ExtractorConfig, SourceNode};
    use crate::pipeline::{ObjectId, ObjectMeta};
    use tempfile::tempdir;

    #[test]
    fn test_analysis_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("run.analysis");

        let mut analysis = Analysis::new();
        analysis
            .add_source(
                ObjectMeta::new("amplitude", ObjectId::new()).with_module(ObjectId::new()),
                SourceNode::Extractor(Extractor::new(ExtractorConfig::single("AAAADDDD")).unwrap()),
            )
            .unwrap();
        AnalysisFile::new(analysis).save(&path).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get(ANALYSIS_FILE_KEY).is_some());

        let loaded = AnalysisFile::load(&path, None).unwrap();
        assert_eq!(loaded.analysis.node_count(), 1);
        assert!(loaded.report.is_clean());
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = AnalysisFile::load(dir.path().join("nope.analysis"), None);
        assert!(matches!(result, Err(AnalysisError::Config(_))));
    }
}
