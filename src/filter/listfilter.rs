//! Combine several 16 or 32 bit words into one value before extraction.
//!
//! The combined word is always filled from the low bits upward. In natural
//! order the first input word lands in the low bits, with `reverse_combine`
//! the last one does.

use crate::filter::data_filter::BitTemplate;
use crate::filter::error::FilterError;
use crate::filter::multiword::MAX_ADDRESS_BITS;
use serde::{Deserialize, Serialize};

const COMBINED_BITS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WordSize {
    #[default]
    Bits16,
    Bits32,
}

impl WordSize {
    pub fn bits(self) -> u32 {
        match self {
            WordSize::Bits16 => 16,
            WordSize::Bits32 => 32,
        }
    }

    pub fn max_word_count(self) -> u8 {
        (COMBINED_BITS as u32 / self.bits()) as u8
    }

    fn part_mask(self) -> u64 {
        (1u64 << self.bits()) - 1
    }
}

/// Address and data extracted from one combined word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListFilterResult {
    pub address: u64,
    pub data: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    template: String,
    extraction: BitTemplate,
    word_count: u8,
    word_size: WordSize,
    reverse_combine: bool,
}

impl ListFilter {
    pub fn new(
        template: &str,
        word_count: u8,
        word_size: WordSize,
        reverse_combine: bool,
    ) -> Result<Self, FilterError> {
        let max = word_size.max_word_count();
        if word_count == 0 || word_count > max {
            return Err(FilterError::InvalidWordCount {
                count: word_count,
                word_bits: word_size.bits(),
                max,
            });
        }

        let combined_bits = word_count as usize * word_size.bits() as usize;
        let extraction = BitTemplate::parse(template, combined_bits)?;

        if extraction.data_bits() == 0 {
            return Err(FilterError::NoDataBits);
        }
        if extraction.address_bits() > MAX_ADDRESS_BITS {
            return Err(FilterError::TooManyAddressBits {
                bits: extraction.address_bits(),
                max: MAX_ADDRESS_BITS,
            });
        }

        Ok(Self {
            template: template.to_string(),
            extraction,
            word_count,
            word_size,
            reverse_combine,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn word_count(&self) -> u8 {
        self.word_count
    }

    pub fn word_size(&self) -> WordSize {
        self.word_size
    }

    pub fn reverse_combine(&self) -> bool {
        self.reverse_combine
    }

    pub fn combined_bits(&self) -> u32 {
        self.word_count as u32 * self.word_size.bits()
    }

    pub fn address_bits(&self) -> u32 {
        self.extraction.address_bits()
    }

    pub fn data_bits(&self) -> u32 {
        self.extraction.data_bits()
    }

    /// Combine the first `word_count` words. Missing words count as zero.
    #[inline]
    pub fn combine(&self, words: &[u32]) -> u64 {
        let count = (self.word_count as usize).min(words.len());
        let words = &words[..count];
        let part_bits = self.word_size.bits();
        let part_mask = self.word_size.part_mask();

        let mut result = 0u64;
        for (i, &word) in words.iter().enumerate() {
            let slot = if self.reverse_combine {
                count - 1 - i
            } else {
                i
            };
            result |= (word as u64 & part_mask) << (slot as u32 * part_bits);
        }
        result
    }

    /// Apply the extraction template. `None` if the literal bits do not match.
    #[inline]
    pub fn extract(&self, combined: u64) -> Option<ListFilterResult> {
        if !self.extraction.matches(combined) {
            return None;
        }
        Some(ListFilterResult {
            address: self.extraction.address(combined),
            data: self.extraction.data(combined),
        })
    }

    #[inline]
    pub fn combine_and_extract(&self, words: &[u32]) -> Option<ListFilterResult> {
        self.extract(self.combine(words))
    }
}
