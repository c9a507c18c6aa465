//! # vme-analysis: dataflow analysis for VME data acquisition
//!
//! Raw 32-bit readout words from VME modules are turned into parameters by
//! bit-pattern filters, transformed by a graph of operators, gated by
//! conditions and accumulated into histograms and rate monitors.
//!
//! ## Architecture
//!
//! - **Filters**: `DataFilter`, `MultiWordFilter` and `ListFilter` extract
//!   address/value pairs from raw words
//! - **Pipeline**: the `Analysis` graph of sources, operators, conditions and
//!   sinks, with rank computation and a compiled execution order
//! - **Serialization**: versioned JSON documents, migrated on load
//! - **Config**: runtime settings (TOML) and the VME setup description
//!
//! ## Configuration
//!
//! Settings are stored in the platform config directory under `vme-analysis`:
//!
//! - **Linux**: `~/.config/vme-analysis/`
//! - **macOS**: `~/Library/Application Support/vme-analysis/`
//! - **Windows**: `%APPDATA%\vme-analysis\`
//!
//! ## Example
//!
//! ```ignore
//! use vme_analysis::{
//!     config::{AnalysisFile, RunInfo, VmeConfig},
//!     pipeline::BeginRunMode,
//! };
//!
//! let vme = VmeConfig::load("setup.json")?;
//! let mut file = AnalysisFile::load("run.analysis", Some(&vme))?;
//! let analysis = &mut file.analysis;
//!
//! analysis.begin_run(RunInfo::new("run001", true), &vme, BeginRunMode::ClearState)?;
//! analysis.begin_event(0)?;
//! analysis.process_module_data(0, 0, &[0x0001_0123])?;
//! analysis.end_event(0)?;
//! analysis.end_run()?;
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod histo;
pub mod pipeline;
pub mod serialize;

// Re-export commonly used types
pub use config::{AnalysisFile, AnalysisSettings, RunInfo, VmeConfig, VmeConfigLookup};
pub use error::{AnalysisError, Result, ResultExt};
pub use filter::{DataFilter, FilterError, ListFilter, MultiWordFilter};
pub use pipeline::{Analysis, BeginRunMode, NodeId, ObjectId, PipelineError, RunState};
pub use serialize::LoadReport;
