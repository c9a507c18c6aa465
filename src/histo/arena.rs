//! Contiguous storage for histogram bins.
//!
//! A sink allocates one arena when a run begins and hands out ranges of it to
//! its histograms. Filling never allocates.

use std::ops::Range;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoArena {
    data: Vec<f64>,
}

impl HistoArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all ranges and reserve room for `capacity` bins.
    pub fn reset(&mut self, capacity: usize) {
        self.data.clear();
        self.data.reserve_exact(capacity);
    }

    /// Append a zeroed range of `len` bins.
    pub fn allocate(&mut self, len: usize) -> Range<usize> {
        let start = self.data.len();
        self.data.resize(start + len, 0.0);
        start..start + len
    }

    #[inline]
    pub fn slice(&self, range: Range<usize>) -> &[f64] {
        self.data.get(range).unwrap_or(&[])
    }

    #[inline]
    pub fn slice_mut(&mut self, range: Range<usize>) -> &mut [f64] {
        self.data.get_mut(range).unwrap_or(&mut [])
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes used by bin storage.
    pub fn storage_size(&self) -> usize {
        self.data.capacity() * std::mem::size_of::<f64>()
    }
}
