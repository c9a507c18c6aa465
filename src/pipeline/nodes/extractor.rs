//! Extractor: address/data extraction from module readout words.
//!
//! Each completed match of the `MultiWordFilter` yields one `(address, data)`
//! pair. The data value is written to `output[address]` unless that element
//! is already valid for the current event, so the first hit wins.

use crate::config::AnalysisSettings;
use crate::filter::{DataFilter, FilterError, MultiWordFilter};
use crate::pipeline::node::{NodeBehavior, SourceBehavior};
use crate::pipeline::parameter::ParameterVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubFilterConfig {
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_index: Option<u32>,
}

impl SubFilterConfig {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            word_index: None,
        }
    }

    pub fn build(&self) -> Result<DataFilter, FilterError> {
        DataFilter::new(&self.template, self.word_index)
    }
}

pub(crate) fn build_multiword(subs: &[SubFilterConfig]) -> Result<MultiWordFilter, FilterError> {
    let filters = subs
        .iter()
        .map(SubFilterConfig::build)
        .collect::<Result<Vec<_>, _>>()?;
    MultiWordFilter::new(filters)
}

/// Uniform `[0, 1)` dithering for extracted integer values.
#[derive(Debug, Clone)]
pub(crate) struct Dither {
    enabled: bool,
    seed: Option<u64>,
    rng: StdRng,
}

impl Dither {
    pub(crate) fn new(enabled: bool, seed: Option<u64>) -> Self {
        Self {
            enabled,
            seed,
            rng: StdRng::seed_from_u64(seed.unwrap_or_default()),
        }
    }

    /// Reseed at run start so replays are reproducible.
    pub(crate) fn reseed(&mut self, settings: &AnalysisSettings) {
        self.rng = StdRng::seed_from_u64(self.seed.unwrap_or(settings.rng_seed));
    }

    #[inline]
    pub(crate) fn apply(&mut self, value: u64) -> f64 {
        let value = value as f64;
        if self.enabled {
            value + self.rng.gen::<f64>()
        } else {
            value
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_completion_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractorConfig {
    pub sub_filters: Vec<SubFilterConfig>,
    /// Number of filter completions needed before a value is written.
    #[serde(default = "default_completion_count")]
    pub required_completion_count: u32,
    #[serde(default = "default_true")]
    pub add_random: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl ExtractorConfig {
    /// Single-word extractor without dithering.
    pub fn single(template: impl Into<String>) -> Self {
        Self {
            sub_filters: vec![SubFilterConfig::new(template)],
            required_completion_count: 1,
            add_random: false,
            rng_seed: None,
        }
    }

    pub fn with_random(mut self, add_random: bool) -> Self {
        self.add_random = add_random;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Extractor {
    config: ExtractorConfig,
    filter: MultiWordFilter,
    completion_count: u32,
    dither: Dither,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Result<Self, FilterError> {
        let filter = build_multiword(&config.sub_filters)?;
        let dither = Dither::new(config.add_random, config.rng_seed);
        Ok(Self {
            config,
            filter,
            completion_count: 0,
            dither,
        })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn filter(&self) -> &MultiWordFilter {
        &self.filter
    }

    fn required_completions(&self) -> u32 {
        self.config.required_completion_count.max(1)
    }
}

impl NodeBehavior for Extractor {
    fn class_name(&self) -> &'static str {
        "Extractor"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.config)
    }

    fn output_count(&self) -> usize {
        1
    }

    fn output_name(&self, _index: usize) -> String {
        "data".to_string()
    }
}

impl SourceBehavior for Extractor {
    fn begin_run(&mut self, outputs: &mut [ParameterVector], settings: &AnalysisSettings) {
        let upper = 2f64.powi(self.filter.data_bits() as i32);
        if let Some(out) = outputs.first_mut() {
            out.resize(self.filter.address_count());
            out.set_limits(0.0, upper);
            out.invalidate_all();
        }
        self.dither.reseed(settings);
        self.completion_count = 0;
        self.filter.clear_completion();
    }

    fn begin_event(&mut self, outputs: &mut [ParameterVector]) {
        for out in outputs.iter_mut() {
            out.invalidate_all();
        }
        self.completion_count = 0;
        self.filter.clear_completion();
    }

    fn process_module_data(&mut self, words: &[u32], outputs: &mut [ParameterVector]) {
        let Some(out) = outputs.first_mut() else {
            return;
        };

        for (index, &word) in words.iter().enumerate() {
            if !self.filter.process_word(word, index as u32) {
                continue;
            }

            self.completion_count += 1;
            if self.completion_count >= self.required_completions() {
                let address = self.filter.address() as usize;
                if let Some(param) = out.get_mut(address) {
                    if !param.valid {
                        param.set(self.dither.apply(self.filter.data()));
                    }
                }
                self.completion_count = 0;
            }
            self.filter.clear_completion();
        }
    }
}
