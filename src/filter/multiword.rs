//! Filters spanning several readout words.

use crate::filter::data_filter::DataFilter;
use crate::filter::error::FilterError;

pub const MAX_SUB_FILTERS: usize = 16;
pub const MAX_ADDRESS_BITS: u32 = 20;
pub const MAX_DATA_BITS: u32 = 64;

/// A sequence of `DataFilter`s that together extract one address/data pair.
///
/// Each incoming word is offered to the sub-filters in order and is taken by
/// the first one that has not completed yet and matches it. The filter is
/// complete once every sub-filter has matched a word. The extracted address
/// and data values are concatenated with sub-filter 0 in the low bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiWordFilter {
    filters: Vec<DataFilter>,
    results: Vec<u32>,
    completion_mask: u32,
    address_bits: u32,
    data_bits: u32,
}

impl MultiWordFilter {
    pub fn new(filters: Vec<DataFilter>) -> Result<Self, FilterError> {
        if filters.is_empty() || filters.len() > MAX_SUB_FILTERS {
            return Err(FilterError::InvalidSubFilterCount {
                count: filters.len(),
                max: MAX_SUB_FILTERS,
            });
        }

        let address_bits: u32 = filters.iter().map(DataFilter::address_bits).sum();
        let data_bits: u32 = filters.iter().map(DataFilter::data_bits).sum();

        if address_bits == 0 {
            return Err(FilterError::NoAddressBits);
        }
        if address_bits > MAX_ADDRESS_BITS {
            return Err(FilterError::TooManyAddressBits {
                bits: address_bits,
                max: MAX_ADDRESS_BITS,
            });
        }
        if data_bits == 0 {
            return Err(FilterError::NoDataBits);
        }
        if data_bits > MAX_DATA_BITS {
            return Err(FilterError::TooManyDataBits {
                bits: data_bits,
                max: MAX_DATA_BITS,
            });
        }

        let results = vec![0; filters.len()];

        Ok(Self {
            filters,
            results,
            completion_mask: 0,
            address_bits,
            data_bits,
        })
    }

    /// Build from template strings, none of them pinned to a word index.
    pub fn from_templates<S: AsRef<str>>(templates: &[S]) -> Result<Self, FilterError> {
        let filters = templates
            .iter()
            .map(|t| DataFilter::new(t.as_ref(), None))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(filters)
    }

    pub fn sub_filters(&self) -> &[DataFilter] {
        &self.filters
    }

    pub fn address_bits(&self) -> u32 {
        self.address_bits
    }

    pub fn data_bits(&self) -> u32 {
        self.data_bits
    }

    /// Number of distinct addresses, `2^address_bits`.
    pub fn address_count(&self) -> usize {
        1usize << self.address_bits
    }

    /// Offer one word. Returns true if the filter is complete afterwards.
    #[inline]
    pub fn process_word(&mut self, word: u32, word_index: u32) -> bool {
        for (i, filter) in self.filters.iter().enumerate() {
            let bit = 1u32 << i;
            if self.completion_mask & bit == 0 && filter.matches(word, word_index) {
                self.results[i] = word;
                self.completion_mask |= bit;
                break;
            }
        }
        self.is_complete()
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.completion_mask == (1u32 << self.filters.len()) - 1
    }

    #[inline]
    pub fn clear_completion(&mut self) {
        self.completion_mask = 0;
    }

    /// Concatenated address of the stored words.
    pub fn address(&self) -> u64 {
        let mut result = 0u64;
        let mut shift = 0u32;
        for (filter, &word) in self.filters.iter().zip(&self.results) {
            result |= (filter.extract_address(word) as u64) << shift;
            shift += filter.address_bits();
        }
        result
    }

    /// Concatenated data value of the stored words.
    pub fn data(&self) -> u64 {
        let mut result = 0u64;
        let mut shift = 0u32;
        for (filter, &word) in self.filters.iter().zip(&self.results) {
            if shift < 64 {
                result |= (filter.extract_data(word) as u64) << shift;
            }
            shift += filter.data_bits();
        }
        result
    }
}
