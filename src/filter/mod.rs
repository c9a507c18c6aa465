//! Bit-pattern extraction of raw module readout words.

pub mod data_filter;
pub mod error;
pub mod listfilter;
pub mod multiword;

pub use data_filter::{bit_gather, bit_scatter, BitTemplate, DataFilter, WORD_BITS};
pub use error::FilterError;
pub use listfilter::{ListFilter, ListFilterResult, WordSize};
pub use multiword::{MultiWordFilter, MAX_ADDRESS_BITS, MAX_DATA_BITS, MAX_SUB_FILTERS};
