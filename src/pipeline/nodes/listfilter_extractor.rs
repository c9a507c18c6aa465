//! ListFilterExtractor: repeated extraction over consecutive word groups.
//!
//! The module data is consumed in groups of `word_count` words. Each group is
//! combined and run through the list filter; the repetition index becomes
//! part of the output address.

use crate::config::AnalysisSettings;
use crate::filter::{FilterError, ListFilter, WordSize};
use crate::pipeline::node::{NodeBehavior, SourceBehavior};
use crate::pipeline::nodes::extractor::Dither;
use crate::pipeline::parameter::ParameterVector;
use serde::{Deserialize, Serialize};

/// Address bits contributed by the repetition index.
pub fn repetition_bits(repetitions: u32) -> u32 {
    if repetitions <= 1 {
        0
    } else {
        32 - (repetitions - 1).leading_zeros()
    }
}

fn default_repetitions() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilterExtractorConfig {
    pub template: String,
    pub word_count: u8,
    #[serde(default)]
    pub word_size: WordSize,
    #[serde(default)]
    pub reverse_combine: bool,
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    #[serde(default)]
    pub repetition_contributes_low_address_bits: bool,
    #[serde(default)]
    pub add_random: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ListFilterExtractor {
    config: ListFilterExtractorConfig,
    filter: ListFilter,
    repetition_bits: u32,
    dither: Dither,
}

impl ListFilterExtractor {
    pub fn new(config: ListFilterExtractorConfig) -> Result<Self, FilterError> {
        if config.repetitions == 0 {
            return Err(FilterError::InvalidRepetitions(config.repetitions));
        }

        let filter = ListFilter::new(
            &config.template,
            config.word_count,
            config.word_size,
            config.reverse_combine,
        )?;

        let repetition_bits = repetition_bits(config.repetitions);
        let total = filter.address_bits() + repetition_bits;
        if total > crate::filter::MAX_ADDRESS_BITS {
            return Err(FilterError::TooManyAddressBits {
                bits: total,
                max: crate::filter::MAX_ADDRESS_BITS,
            });
        }

        let dither = Dither::new(config.add_random, config.rng_seed);

        Ok(Self {
            config,
            filter,
            repetition_bits,
            dither,
        })
    }

    pub fn config(&self) -> &ListFilterExtractorConfig {
        &self.config
    }

    pub fn filter(&self) -> &ListFilter {
        &self.filter
    }

    pub fn address_bits(&self) -> u32 {
        self.filter.address_bits() + self.repetition_bits
    }

    pub fn address_count(&self) -> usize {
        1usize << self.address_bits()
    }

    #[inline]
    fn output_address(&self, base: u64, repetition: u64) -> usize {
        let address = if self.config.repetition_contributes_low_address_bits {
            (base << self.repetition_bits) | repetition
        } else {
            (repetition << self.filter.address_bits()) | base
        };
        address as usize
    }
}

impl NodeBehavior for ListFilterExtractor {
    fn class_name(&self) -> &'static str {
        "ListFilterExtractor"
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

impl SourceBehavior for ListFilterExtractor {
    fn begin_run(&mut self, outputs: &mut [ParameterVector], settings: &AnalysisSettings) {
        let upper = 2f64.powi(self.filter.data_bits() as i32);
        if let Some(out) = outputs.first_mut() {
            out.resize(self.address_count());
            out.set_limits(0.0, upper);
            out.invalidate_all();
        }
        self.dither.reseed(settings);
    }

    fn begin_event(&mut self, outputs: &mut [ParameterVector]) {
        for out in outputs.iter_mut() {
            out.invalidate_all();
        }
    }

    fn process_module_data(&mut self, words: &[u32], outputs: &mut [ParameterVector]) {
        let Some(out) = outputs.first_mut() else {
            return;
        };

        let group = self.filter.word_count() as usize;
        for (repetition, chunk) in words
            .chunks_exact(group)
            .take(self.config.repetitions as usize)
            .enumerate()
        {
            let Some(result) = self.filter.combine_and_extract(chunk) else {
                continue;
            };

            let address = self.output_address(result.address, repetition as u64);
            if let Some(param) = out.get_mut(address) {
                if !param.valid {
                    param.set(self.dither.apply(result.data));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(template: &str, word_count: u8, repetitions: u32) -> ListFilterExtractorConfig {
        ListFilterExtractorConfig {
            template: template.to_string(),
            word_count,
            word_size: WordSize::Bits16,
            reverse_combine: false,
            repetitions,
            repetition_contributes_low_address_bits: false,
            add_random: false,
            rng_seed: None,
        }
    }

    #[test]
    fn test_repetition_bits() {
        assert_eq!(repetition_bits(1), 0);
        assert_eq!(repetition_bits(2), 1);
        assert_eq!(repetition_bits(3), 2);
        assert_eq!(repetition_bits(4), 2);
        assert_eq!(repetition_bits(5), 3);
    }

    #[test]
    fn test_repetitions_fill_high_address_bits() {
        let mut ex = ListFilterExtractor::new(config("A DDDD", 1, 3)).unwrap();
        let mut outputs = vec![ParameterVector::new("data")];
        ex.begin_run(&mut outputs, &AnalysisSettings::default());
        // 1 template address bit + 2 repetition bits
        assert_eq!(outputs[0].len(), 8);

        ex.begin_event(&mut outputs);
        ex.process_module_data(&[0b1_0011, 0b0_0101, 0b1_1111, 0xffff], &mut outputs);

        assert_eq!(outputs[0][0b00_1].get(), Some(3.0));
        assert_eq!(outputs[0][0b01_0].get(), Some(5.0));
        assert_eq!(outputs[0][0b10_1].get(), Some(15.0));
        assert_eq!(outputs[0].valid_count(), 3);
    }

    #[test]
    fn test_repetitions_in_low_address_bits() {
        let mut cfg = config("A DDDD", 1, 2);
        cfg.repetition_contributes_low_address_bits = true;
        let mut ex = ListFilterExtractor::new(cfg).unwrap();
        let mut outputs = vec![ParameterVector::new("data")];
        ex.begin_run(&mut outputs, &AnalysisSettings::default());

        ex.begin_event(&mut outputs);
        ex.process_module_data(&[0b1_0011, 0b0_0101], &mut outputs);
        assert_eq!(outputs[0][0b1_0].get(), Some(3.0));
        assert_eq!(outputs[0][0b0_1].get(), Some(5.0));
    }

    #[test]
    fn test_combined_words_without_address() {
        let mut ex = ListFilterExtractor::new(config(&"D".repeat(32), 2, 1)).unwrap();
        let mut outputs = vec![ParameterVector::new("data")];
        ex.begin_run(&mut outputs, &AnalysisSettings::default());
        assert_eq!(outputs[0].len(), 1);

        ex.begin_event(&mut outputs);
        ex.process_module_data(&[0x0001, 0x0002, 0x0003], &mut outputs);
        assert_eq!(outputs[0][0].get(), Some(0x0002_0001 as f64));
    }

    #[test]
    fn test_rejects_zero_repetitions() {
        assert_eq!(
            ListFilterExtractor::new(config("DDDD", 1, 0)).unwrap_err(),
            FilterError::InvalidRepetitions(0)
        );
    }
}
