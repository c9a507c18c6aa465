//! MultiHitExtractor: keeps up to `max_hits` values per address.
//!
//! Output layout depends on the shape:
//!
//! ```text
//! ArrayPerHit      outputs[hit][address]      max_hits arrays of 2^A, then hitCounts
//! ArrayPerAddress  outputs[address][hit]      2^A arrays of max_hits, then hitCounts
//! ```
//!
//! `hitCounts` has one element per address holding the number of hits seen in
//! the event, including those past `max_hits`. Those extra hits are not
//! stored; `dropped_hits` counts them over the run.

use crate::config::AnalysisSettings;
use crate::filter::{FilterError, MultiWordFilter};
use crate::pipeline::node::{NodeBehavior, SourceBehavior};
use crate::pipeline::nodes::extractor::{build_multiword, Dither, SubFilterConfig};
use crate::pipeline::parameter::ParameterVector;
use serde::{Deserialize, Serialize};

pub const HIT_COUNTS_NAME: &str = "hitCounts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MultiHitShape {
    #[default]
    ArrayPerHit,
    ArrayPerAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiHitExtractorConfig {
    pub sub_filters: Vec<SubFilterConfig>,
    pub max_hits: u32,
    #[serde(default)]
    pub shape: MultiHitShape,
    #[serde(default)]
    pub add_random: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl MultiHitExtractorConfig {
    pub fn new(template: impl Into<String>, max_hits: u32, shape: MultiHitShape) -> Self {
        Self {
            sub_filters: vec![SubFilterConfig::new(template)],
            max_hits,
            shape,
            add_random: false,
            rng_seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MultiHitExtractor {
    config: MultiHitExtractorConfig,
    filter: MultiWordFilter,
    hit_counts: Vec<u32>,
    dropped_hits: u64,
    dither: Dither,
}

impl MultiHitExtractor {
    pub fn new(config: MultiHitExtractorConfig) -> Result<Self, FilterError> {
        if config.max_hits == 0 {
            return Err(FilterError::InvalidMaxHits(config.max_hits));
        }
        let filter = build_multiword(&config.sub_filters)?;
        let hit_counts = vec![0; filter.address_count()];
        let dither = Dither::new(config.add_random, config.rng_seed);

        Ok(Self {
            config,
            filter,
            hit_counts,
            dropped_hits: 0,
            dither,
        })
    }

    pub fn config(&self) -> &MultiHitExtractorConfig {
        &self.config
    }

    pub fn filter(&self) -> &MultiWordFilter {
        &self.filter
    }

    pub fn shape(&self) -> MultiHitShape {
        self.config.shape
    }

    /// Hits dropped because an address already had `max_hits` values, since
    /// the start of the run.
    pub fn dropped_hits(&self) -> u64 {
        self.dropped_hits
    }

    fn data_outputs(&self) -> usize {
        match self.config.shape {
            MultiHitShape::ArrayPerHit => self.config.max_hits as usize,
            MultiHitShape::ArrayPerAddress => self.filter.address_count(),
        }
    }

    fn data_output_size(&self) -> usize {
        match self.config.shape {
            MultiHitShape::ArrayPerHit => self.filter.address_count(),
            MultiHitShape::ArrayPerAddress => self.config.max_hits as usize,
        }
    }
}

impl NodeBehavior for MultiHitExtractor {
    fn class_name(&self) -> &'static str {
        "MultiHitExtractor"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.config)
    }

    fn output_count(&self) -> usize {
        self.data_outputs() + 1
    }

    fn output_name(&self, index: usize) -> String {
        if index == self.data_outputs() {
            return HIT_COUNTS_NAME.to_string();
        }
        match self.config.shape {
            MultiHitShape::ArrayPerHit => format!("hit{}", index),
            MultiHitShape::ArrayPerAddress => format!("address{}", index),
        }
    }
}

impl SourceBehavior for MultiHitExtractor {
    fn begin_run(&mut self, outputs: &mut [ParameterVector], settings: &AnalysisSettings) {
        let data_outputs = self.data_outputs();
        let size = self.data_output_size();
        let upper = 2f64.powi(self.filter.data_bits() as i32);

        for (i, out) in outputs.iter_mut().enumerate() {
            if i < data_outputs {
                out.resize(size);
                out.set_limits(0.0, upper);
            } else {
                out.resize(self.filter.address_count());
                out.set_limits(0.0, self.config.max_hits as f64 + 1.0);
            }
            out.invalidate_all();
        }

        self.hit_counts.clear();
        self.hit_counts.resize(self.filter.address_count(), 0);
        self.dropped_hits = 0;
        self.dither.reseed(settings);
        self.filter.clear_completion();
    }

    fn begin_event(&mut self, outputs: &mut [ParameterVector]) {
        for out in outputs.iter_mut() {
            out.invalidate_all();
        }
        self.hit_counts.fill(0);
        self.filter.clear_completion();
    }

    fn process_module_data(&mut self, words: &[u32], outputs: &mut [ParameterVector]) {
        let data_outputs = self.data_outputs();
        if outputs.len() <= data_outputs {
            return;
        }

        for (index, &word) in words.iter().enumerate() {
            if !self.filter.process_word(word, index as u32) {
                continue;
            }

            let address = self.filter.address() as usize;
            let data = self.filter.data();
            self.filter.clear_completion();

            let Some(hits) = self.hit_counts.get_mut(address) else {
                continue;
            };
            let hit = *hits;
            *hits += 1;
            if let Some(param) = outputs[data_outputs].get_mut(address) {
                param.set(f64::from(*hits));
            }
            if hit >= self.config.max_hits {
                self.dropped_hits += 1;
                continue;
            }
            let hit = hit as usize;

            let value = self.dither.apply(data);
            let (array, element) = match self.config.shape {
                MultiHitShape::ArrayPerHit => (hit, address),
                MultiHitShape::ArrayPerAddress => (address, hit),
            };
            if let Some(param) = outputs[array].get_mut(element) {
                param.set(value);
            }
        }
    }
}
