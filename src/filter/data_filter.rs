//! Single-word bit-pattern filters.
//!
//! A template is a string of one character per bit, rightmost character is
//! bit 0:
//!
//! ```text
//!   0 / 1       literal bit that must match
//!   A           address bit
//!   D           data bit
//!   X / x / .   don't care
//! ```
//!
//! Matching is case-insensitive and spaces are ignored, so `"0001 AAAA DDDD
//! DDDD"` is a valid 16-bit template. Bits above the template width are
//! don't-care.

use crate::filter::error::FilterError;

/// Width of a single readout word.
pub const WORD_BITS: usize = 32;

/// Gather the bits of `value` selected by `mask` into the low bits of the
/// result. The highest selected bit ends up as the highest result bit.
#[inline]
pub fn bit_gather(value: u64, mut mask: u64) -> u64 {
    let mut result = 0u64;
    let mut out_bit = 0u32;

    while mask != 0 {
        let lowest = mask & mask.wrapping_neg();
        if value & lowest != 0 {
            result |= 1u64 << out_bit;
        }
        out_bit += 1;
        mask &= mask - 1;
    }

    result
}

/// Inverse of `bit_gather`: spread the low bits of `value` over the positions
/// selected by `mask`.
#[inline]
pub fn bit_scatter(value: u64, mut mask: u64) -> u64 {
    let mut result = 0u64;
    let mut in_bit = 0u32;

    while mask != 0 {
        let lowest = mask & mask.wrapping_neg();
        if value & (1u64 << in_bit) != 0 {
            result |= lowest;
        }
        in_bit += 1;
        mask &= mask - 1;
    }

    result
}

/// Parsed template masks, up to 64 bits wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BitTemplate {
    pub match_mask: u64,
    pub match_value: u64,
    pub address_mask: u64,
    pub data_mask: u64,
    pub width: u8,
}

impl BitTemplate {
    pub fn parse(template: &str, max_width: usize) -> Result<Self, FilterError> {
        let chars: Vec<(usize, char)> = template
            .char_indices()
            .filter(|(_, c)| *c != ' ')
            .collect();

        if chars.is_empty() {
            return Err(FilterError::EmptyTemplate);
        }

        if chars.len() > max_width {
            return Err(FilterError::TooWide {
                template: template.to_string(),
                width: chars.len(),
                max: max_width,
            });
        }

        let mut result = BitTemplate {
            width: chars.len() as u8,
            ..Default::default()
        };

        for (bit, &(position, ch)) in chars.iter().rev().enumerate() {
            let bit_mask = 1u64 << bit;

            match ch.to_ascii_uppercase() {
                '0' => result.match_mask |= bit_mask,
                '1' => {
                    result.match_mask |= bit_mask;
                    result.match_value |= bit_mask;
                }
                'A' => result.address_mask |= bit_mask,
                'D' => result.data_mask |= bit_mask,
                'X' | '.' => {}
                _ => {
                    return Err(FilterError::InvalidCharacter {
                        template: template.to_string(),
                        ch,
                        position,
                    })
                }
            }
        }

        Ok(result)
    }

    #[inline]
    pub fn matches(&self, value: u64) -> bool {
        value & self.match_mask == self.match_value
    }

    #[inline]
    pub fn address(&self, value: u64) -> u64 {
        bit_gather(value, self.address_mask)
    }

    #[inline]
    pub fn data(&self, value: u64) -> u64 {
        bit_gather(value, self.data_mask)
    }

    pub fn address_bits(&self) -> u32 {
        self.address_mask.count_ones()
    }

    pub fn data_bits(&self) -> u32 {
        self.data_mask.count_ones()
    }
}

/// Filter applied to one 32-bit readout word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFilter {
    template: String,
    word_index: Option<u32>,
    masks: BitTemplate,
}

impl DataFilter {
    pub fn new(template: &str, word_index: Option<u32>) -> Result<Self, FilterError> {
        let masks = BitTemplate::parse(template, WORD_BITS)?;
        Ok(Self {
            template: template.to_string(),
            word_index,
            masks,
        })
    }

    /// The template as given at construction.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn word_index(&self) -> Option<u32> {
        self.word_index
    }

    pub fn masks(&self) -> &BitTemplate {
        &self.masks
    }

    /// Check the literal bits and, if pinned, the word position.
    #[inline]
    pub fn matches(&self, word: u32, word_index: u32) -> bool {
        if let Some(pinned) = self.word_index {
            if pinned != word_index {
                return false;
            }
        }
        self.masks.matches(word as u64)
    }

    #[inline]
    pub fn extract_address(&self, word: u32) -> u32 {
        self.masks.address(word as u64) as u32
    }

    #[inline]
    pub fn extract_data(&self, word: u32) -> u32 {
        self.masks.data(word as u64) as u32
    }

    pub fn address_bits(&self) -> u32 {
        self.masks.address_bits()
    }

    pub fn data_bits(&self) -> u32 {
        self.masks.data_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_address_and_data() {
        let filter = DataFilter::new("AAAADDDD", None).unwrap();
        assert!(filter.matches(0b1010_0110, 0));
        assert_eq!(filter.extract_address(0b1010_0110), 10);
        assert_eq!(filter.extract_data(0b1010_0110), 6);
        assert_eq!(filter.address_bits(), 4);
        assert_eq!(filter.data_bits(), 4);
    }

    #[test]
    fn test_literal_bits() {
        let filter = DataFilter::new("0001 XXXX AAAA DDDD", None).unwrap();
        assert!(filter.matches(0x1f34, 0));
        assert!(!filter.matches(0x2f34, 0));
        assert_eq!(filter.extract_address(0x1f34), 3);
        assert_eq!(filter.extract_data(0x1f34), 4);
        // Bits above the template width are ignored.
        assert!(filter.matches(0xffff_1034, 0));
    }

    #[test]
    fn test_case_insensitive_and_dont_care() {
        let upper = DataFilter::new("1XAD", None).unwrap();
        let lower = DataFilter::new("1.ad", None).unwrap();
        assert_eq!(upper.masks(), lower.masks());
    }

    #[test]
    fn test_non_contiguous_bits_keep_order() {
        let filter = DataFilter::new("DAXDA", None).unwrap();
        // D at bits 4 and 1, A at bits 3 and 0
        let word = 0b1_0_0_0_1;
        assert_eq!(filter.extract_data(word), 0b10);
        assert_eq!(filter.extract_address(word), 0b01);
    }

    #[test]
    fn test_word_index_pinning() {
        let filter = DataFilter::new("DDDD", Some(2)).unwrap();
        assert!(!filter.matches(5, 0));
        assert!(filter.matches(5, 2));
    }

    #[test]
    fn test_rejects_invalid_templates() {
        assert_eq!(DataFilter::new("", None), Err(FilterError::EmptyTemplate));
        assert_eq!(DataFilter::new("   ", None), Err(FilterError::EmptyTemplate));
        assert!(matches!(
            DataFilter::new("AAZD", None),
            Err(FilterError::InvalidCharacter { ch: 'Z', position: 2, .. })
        ));
        let too_wide = "D".repeat(33);
        assert!(matches!(
            DataFilter::new(&too_wide, None),
            Err(FilterError::TooWide { width: 33, max: 32, .. })
        ));
    }

    #[test]
    fn test_full_width_template() {
        let template = "D".repeat(32);
        let filter = DataFilter::new(&template, None).unwrap();
        assert_eq!(filter.extract_data(0xdead_beef), 0xdead_beef);
    }

    fn template_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop::sample::select(vec!['0', '1', 'A', 'D', 'X', 'a', 'd', 'x', '.']),
            1..=32,
        )
        .prop_map(|chars| chars.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_round_trip(template in template_strategy(), address in any::<u64>(), data in any::<u64>(), noise in any::<u32>()) {
            let filter = DataFilter::new(&template, None).unwrap();
            let masks = *filter.masks();

            let address = address & ((1u64 << filter.address_bits()) - 1);
            let data = data & ((1u64 << filter.data_bits()) - 1);

            let free = !(masks.match_mask | masks.address_mask | masks.data_mask) & 0xffff_ffff;
            let word = masks.match_value
                | bit_scatter(address, masks.address_mask)
                | bit_scatter(data, masks.data_mask)
                | (noise as u64 & free);
            let word = word as u32;

            prop_assert!(filter.matches(word, 0));
            prop_assert_eq!(filter.extract_address(word) as u64, address);
            prop_assert_eq!(filter.extract_data(word) as u64, data);
        }

        #[test]
        fn prop_gather_scatter_inverse(value in any::<u64>(), mask in any::<u64>()) {
            let gathered = bit_gather(value, mask);
            prop_assert_eq!(bit_scatter(gathered, mask), value & mask);
        }
    }
}
