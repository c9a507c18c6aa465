//! Filter construction errors.

use thiserror::Error;

/// Raised when a template or filter configuration is rejected.
///
/// Filters are validated once at construction; matching never fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Filter template is empty")]
    EmptyTemplate,

    #[error("Invalid character {ch:?} at position {position} in template {template:?}")]
    InvalidCharacter {
        template: String,
        ch: char,
        position: usize,
    },

    #[error("Template {template:?} is {width} bits wide, maximum is {max}")]
    TooWide {
        template: String,
        width: usize,
        max: usize,
    },

    #[error("Filter has no address bits")]
    NoAddressBits,

    #[error("Filter has no data bits")]
    NoDataBits,

    #[error("Filter has {bits} address bits, maximum is {max}")]
    TooManyAddressBits { bits: u32, max: u32 },

    #[error("Filter has {bits} data bits, maximum is {max}")]
    TooManyDataBits { bits: u32, max: u32 },

    #[error("Invalid sub-filter count {count}, expected 1..={max}")]
    InvalidSubFilterCount { count: usize, max: usize },

    #[error("Invalid word count {count} for {word_bits}-bit parts, expected 1..={max}")]
    InvalidWordCount { count: u8, word_bits: u32, max: u8 },

    #[error("Invalid repetition count {0}")]
    InvalidRepetitions(u32),

    #[error("Invalid maximum hit count {0}")]
    InvalidMaxHits(u32),
}
