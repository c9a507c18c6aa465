//! Histo1DSink: one 1D histogram per input element.
//!
//! The binning range defaults to the element's limits. All histograms share
//! one arena allocated at run start.

use crate::config::AnalysisSettings;
use crate::histo::{Binning, Histo1D, HistoArena};
use crate::pipeline::node::{BeginRunMode, Inputs, NodeBehavior, SinkBehavior};
use crate::pipeline::nodes::interval_condition::Interval;
use crate::pipeline::port::SlotDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Histo1DSinkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bins: Option<u32>,
    /// Overrides the input limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Interval>,
}

#[derive(Debug, Clone)]
pub struct Histo1DSink {
    config: Histo1DSinkConfig,
    arena: HistoArena,
    histos: Vec<Histo1D>,
}

impl Histo1DSink {
    pub fn new(config: Histo1DSinkConfig) -> Self {
        Self {
            config,
            arena: HistoArena::new(),
            histos: Vec::new(),
        }
    }

    pub fn config(&self) -> Histo1DSinkConfig {
        self.config
    }

    pub fn histo_count(&self) -> usize {
        self.histos.len()
    }

    pub fn histo(&self, index: usize) -> Option<&Histo1D> {
        self.histos.get(index)
    }

    pub fn counts(&self, index: usize) -> Option<&[f64]> {
        self.histos.get(index).map(|h| h.counts(&self.arena))
    }

    /// Total number of entries over all histograms.
    pub fn entry_count(&self) -> u64 {
        self.histos.iter().map(|h| h.stats.entry_count).sum()
    }

    fn binnings(&self, inputs: &Inputs<'_>, settings: &AnalysisSettings) -> Vec<Binning> {
        let bins = self.config.bins.unwrap_or(settings.default_histo_bins);
        let Some(input) = inputs.get(0) else {
            return Vec::new();
        };
        input
            .iter()
            .map(|p| match self.config.range {
                Some(range) => Binning::new(bins, range.min, range.max),
                None => Binning::new(bins, p.lower_limit, p.upper_limit),
            })
            .collect()
    }
}

impl NodeBehavior for Histo1DSink {
    fn class_name(&self) -> &'static str {
        "Histo1DSink"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.config)
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        vec![SlotDescriptor::both("input")]
    }
}

impl SinkBehavior for Histo1DSink {
    fn begin_run(&mut self, inputs: &Inputs<'_>, mode: BeginRunMode, settings: &AnalysisSettings) {
        let binnings = self.binnings(inputs, settings);

        let unchanged = binnings.len() == self.histos.len()
            && binnings.iter().zip(&self.histos).all(|(b, h)| *b == h.binning);
        if mode == BeginRunMode::KeepState && unchanged {
            return;
        }

        let total = binnings.iter().map(|b| b.bins as usize).sum();
        self.arena.reset(total);
        self.histos = binnings
            .into_iter()
            .map(|b| Histo1D::new(b, &mut self.arena))
            .collect();
    }

    fn accumulate(&mut self, inputs: &Inputs<'_>) {
        let Some(input) = inputs.get(0) else {
            return;
        };
        for (histo, param) in self.histos.iter_mut().zip(input.iter()) {
            if param.valid {
                histo.fill(&mut self.arena, param.value);
            }
        }
    }

    fn clear(&mut self) {
        for histo in &mut self.histos {
            histo.clear(&mut self.arena);
        }
    }

    fn storage_size(&self) -> usize {
        self.arena.storage_size()
    }
}
