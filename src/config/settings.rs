//! Analysis runtime settings.
//!
//! These are user preferences applied when a run begins, separate from the
//! analysis document itself. They are stored as TOML in the application
//! config directory.

use crate::error::{AnalysisError, Result};
use crate::pipeline::node::BeginRunMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of bins for newly created 1D histograms.
pub const DEFAULT_HISTO_BINS: u32 = 1 << 16;

/// Default number of rate samples kept per rate monitor element.
pub const DEFAULT_RATE_HISTORY_CAPACITY: usize = 3600;

/// Settings file name inside the config directory.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Settings consumed by the analysis at run start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Bin count used when a histogram sink does not specify one.
    pub default_histo_bins: u32,

    /// Samples kept per rate monitor element.
    pub rate_history_capacity: usize,

    /// Seed for extractor dithering when the extractor has none of its own.
    pub rng_seed: u64,

    /// `tracing` filter directive used by the binary when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Mode used by the CLI when starting a replay.
    pub begin_run_mode: BeginRunMode,

    /// Optional directory for rolling log files.
    pub log_directory: Option<std::path::PathBuf>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            default_histo_bins: DEFAULT_HISTO_BINS,
            rate_history_capacity: DEFAULT_RATE_HISTORY_CAPACITY,
            rng_seed: 0x5eed,
            log_filter: "info,vme_analysis=debug".to_string(),
            begin_run_mode: BeginRunMode::ClearState,
            log_directory: None,
        }
    }
}

impl AnalysisSettings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| AnalysisError::Config(format!("Failed to parse settings: {}", e)))
    }

    /// Load from the default location, falling back to defaults on any error.
    pub fn load_or_default() -> Self {
        let Some(path) = super::settings_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AnalysisError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| AnalysisError::Config(format!("Failed to write settings: {}", e)))
    }

    /// Save to the default location, creating the directory if needed.
    pub fn save_default(&self) -> Result<()> {
        let dir = super::ensure_config_dir()?;
        self.save(dir.join(SETTINGS_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = AnalysisSettings::default();
        assert_eq!(settings.default_histo_bins, 65536);
        assert_eq!(settings.begin_run_mode, BeginRunMode::ClearState);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);

        let settings = AnalysisSettings {
            default_histo_bins: 1024,
            rng_seed: 7,
            begin_run_mode: BeginRunMode::KeepState,
            ..Default::default()
        };
        settings.save(&path).unwrap();

        let loaded = AnalysisSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: AnalysisSettings = toml::from_str("rng_seed = 3").unwrap();
        assert_eq!(settings.rng_seed, 3);
        assert_eq!(settings.rate_history_capacity, DEFAULT_RATE_HISTORY_CAPACITY);
    }
}
