//! Histo2DSink: a single 2D histogram of two value inputs.

use crate::config::AnalysisSettings;
use crate::histo::{Binning, Histo2D, HistoArena};
use crate::pipeline::node::{BeginRunMode, Inputs, NodeBehavior, SinkBehavior};
use crate::pipeline::nodes::interval_condition::Interval;
use crate::pipeline::port::SlotDescriptor;
use serde::{Deserialize, Serialize};

const DEFAULT_2D_BINS: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Histo2DSinkConfig {
    pub x_bins: u32,
    pub y_bins: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_range: Option<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_range: Option<Interval>,
}

impl Default for Histo2DSinkConfig {
    fn default() -> Self {
        Self {
            x_bins: DEFAULT_2D_BINS,
            y_bins: DEFAULT_2D_BINS,
            x_range: None,
            y_range: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Histo2DSink {
    config: Histo2DSinkConfig,
    arena: HistoArena,
    histo: Option<Histo2D>,
}

impl Histo2DSink {
    pub fn new(config: Histo2DSinkConfig) -> Self {
        Self {
            config,
            arena: HistoArena::new(),
            histo: None,
        }
    }

    pub fn config(&self) -> Histo2DSinkConfig {
        self.config
    }

    pub fn histo(&self) -> Option<&Histo2D> {
        self.histo.as_ref()
    }

    pub fn value(&self, bx: usize, by: usize) -> Option<f64> {
        self.histo.as_ref()?.value(&self.arena, bx, by)
    }

    fn binning(inputs: &Inputs<'_>, slot: usize, bins: u32, range: Option<Interval>) -> Binning {
        match range {
            Some(range) => Binning::new(bins, range.min, range.max),
            None => {
                let (lower, upper) = inputs
                    .get(slot)
                    .and_then(|i| i.first())
                    .map(|p| (p.lower_limit, p.upper_limit))
                    .unwrap_or((0.0, 0.0));
                Binning::new(bins, lower, upper)
            }
        }
    }
}

impl NodeBehavior for Histo2DSink {
    fn class_name(&self) -> &'static str {
        "Histo2DSink"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.config)
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        vec![SlotDescriptor::value("x"), SlotDescriptor::value("y")]
    }
}

impl SinkBehavior for Histo2DSink {
    fn begin_run(&mut self, inputs: &Inputs<'_>, mode: BeginRunMode, _settings: &AnalysisSettings) {
        let x = Self::binning(inputs, 0, self.config.x_bins, self.config.x_range);
        let y = Self::binning(inputs, 1, self.config.y_bins, self.config.y_range);

        if mode == BeginRunMode::KeepState {
            if let Some(histo) = &self.histo {
                if histo.x_binning == x && histo.y_binning == y {
                    return;
                }
            }
        }

        self.arena.reset(x.bins as usize * y.bins as usize);
        self.histo = Some(Histo2D::new(x, y, &mut self.arena));
    }

    fn accumulate(&mut self, inputs: &Inputs<'_>) {
        let x = inputs.get(0).and_then(|i| i.first()).and_then(|p| p.get());
        let y = inputs.get(1).and_then(|i| i.first()).and_then(|p| p.get());
        if let (Some(x), Some(y), Some(histo)) = (x, y, self.histo.as_mut()) {
            histo.fill(&mut self.arena, x, y);
        }
    }

    fn clear(&mut self) {
        if let Some(histo) = self.histo.as_mut() {
            histo.clear(&mut self.arena);
        }
    }

    fn storage_size(&self) -> usize {
        self.arena.storage_size()
    }
}
