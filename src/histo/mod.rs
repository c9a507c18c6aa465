//! Histogram bookkeeping for the histogram sinks.

pub mod arena;

pub use arena::HistoArena;

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Equal-width binning over `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    pub bins: u32,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinIndex {
    Underflow,
    Overflow,
    Bin(usize),
}

impl Binning {
    pub fn new(bins: u32, min: f64, max: f64) -> Self {
        Self { bins, min, max }
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn bin_width(&self) -> f64 {
        if self.bins == 0 {
            0.0
        } else {
            self.width() / self.bins as f64
        }
    }

    #[inline]
    pub fn bin_index(&self, x: f64) -> BinIndex {
        if x < self.min {
            return BinIndex::Underflow;
        }
        if x >= self.max || !x.is_finite() {
            return BinIndex::Overflow;
        }
        let bin = ((x - self.min) * self.bins as f64 / self.width()) as usize;
        // Rounding can push values right below max into the overflow bin.
        BinIndex::Bin(bin.min(self.bins.saturating_sub(1) as usize))
    }

    /// Lower edge of a bin.
    pub fn bin_low_edge(&self, bin: usize) -> f64 {
        self.min + bin as f64 * self.bin_width()
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.bin_low_edge(bin) + self.bin_width() * 0.5
    }

    pub fn is_valid(&self) -> bool {
        self.bins > 0 && self.min.is_finite() && self.max.is_finite() && self.max > self.min
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistoStats {
    pub entry_count: u64,
    pub underflow: u64,
    pub overflow: u64,
    pub max_value: f64,
    pub max_bin: usize,
}

/// One 1D histogram. Bin counts live in the owning sink's arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Histo1D {
    pub binning: Binning,
    pub stats: HistoStats,
    storage: Range<usize>,
}

impl Histo1D {
    pub fn new(binning: Binning, arena: &mut HistoArena) -> Self {
        let storage = arena.allocate(binning.bins as usize);
        Self {
            binning,
            stats: HistoStats::default(),
            storage,
        }
    }

    #[inline]
    pub fn fill(&mut self, arena: &mut HistoArena, x: f64) -> BinIndex {
        let index = self.binning.bin_index(x);
        match index {
            BinIndex::Underflow => self.stats.underflow += 1,
            BinIndex::Overflow => self.stats.overflow += 1,
            BinIndex::Bin(bin) => {
                let counts = arena.slice_mut(self.storage.clone());
                if let Some(count) = counts.get_mut(bin) {
                    *count += 1.0;
                    self.stats.entry_count += 1;
                    if *count > self.stats.max_value {
                        self.stats.max_value = *count;
                        self.stats.max_bin = bin;
                    }
                }
            }
        }
        index
    }

    pub fn counts<'a>(&self, arena: &'a HistoArena) -> &'a [f64] {
        arena.slice(self.storage.clone())
    }

    pub fn clear(&mut self, arena: &mut HistoArena) {
        arena.slice_mut(self.storage.clone()).fill(0.0);
        self.stats = HistoStats::default();
    }
}

/// A 2D histogram with row-major bin storage (x varies fastest).
#[derive(Debug, Clone, PartialEq)]
pub struct Histo2D {
    pub x_binning: Binning,
    pub y_binning: Binning,
    pub stats: HistoStats,
    storage: Range<usize>,
}

impl Histo2D {
    pub fn new(x_binning: Binning, y_binning: Binning, arena: &mut HistoArena) -> Self {
        let storage = arena.allocate(x_binning.bins as usize * y_binning.bins as usize);
        Self {
            x_binning,
            y_binning,
            stats: HistoStats::default(),
            storage,
        }
    }

    pub fn fill(&mut self, arena: &mut HistoArena, x: f64, y: f64) {
        let (bx, by) = match (self.x_binning.bin_index(x), self.y_binning.bin_index(y)) {
            (BinIndex::Bin(bx), BinIndex::Bin(by)) => (bx, by),
            (BinIndex::Underflow, _) | (_, BinIndex::Underflow) => {
                self.stats.underflow += 1;
                return;
            }
            _ => {
                self.stats.overflow += 1;
                return;
            }
        };

        let bin = by * self.x_binning.bins as usize + bx;
        let counts = arena.slice_mut(self.storage.clone());
        if let Some(count) = counts.get_mut(bin) {
            *count += 1.0;
            self.stats.entry_count += 1;
            if *count > self.stats.max_value {
                self.stats.max_value = *count;
                self.stats.max_bin = bin;
            }
        }
    }

    pub fn value(&self, arena: &HistoArena, bx: usize, by: usize) -> Option<f64> {
        if bx >= self.x_binning.bins as usize {
            return None;
        }
        self.counts(arena)
            .get(by * self.x_binning.bins as usize + bx)
            .copied()
    }

    pub fn counts<'a>(&self, arena: &'a HistoArena) -> &'a [f64] {
        arena.slice(self.storage.clone())
    }

    pub fn clear(&mut self, arena: &mut HistoArena) {
        arena.slice_mut(self.storage.clone()).fill(0.0);
        self.stats = HistoStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_index() {
        let binning = Binning::new(16, 0.0, 16.0);
        assert_eq!(binning.bin_index(-0.5), BinIndex::Underflow);
        assert_eq!(binning.bin_index(0.0), BinIndex::Bin(0));
        assert_eq!(binning.bin_index(6.7), BinIndex::Bin(6));
        assert_eq!(binning.bin_index(15.999), BinIndex::Bin(15));
        assert_eq!(binning.bin_index(16.0), BinIndex::Overflow);
        assert_eq!(binning.bin_index(f64::NAN), BinIndex::Overflow);
    }

    #[test]
    fn test_fill_tracks_stats() {
        let mut arena = HistoArena::new();
        let mut histo = Histo1D::new(Binning::new(4, 0.0, 4.0), &mut arena);

        histo.fill(&mut arena, 1.5);
        histo.fill(&mut arena, 1.2);
        histo.fill(&mut arena, 3.0);
        histo.fill(&mut arena, 7.0);
        histo.fill(&mut arena, -1.0);

        assert_eq!(histo.counts(&arena), &[0.0, 2.0, 0.0, 1.0]);
        assert_eq!(histo.stats.entry_count, 3);
        assert_eq!(histo.stats.overflow, 1);
        assert_eq!(histo.stats.underflow, 1);
        assert_eq!(histo.stats.max_bin, 1);
        assert_eq!(histo.stats.max_value, 2.0);

        histo.clear(&mut arena);
        assert_eq!(histo.stats, HistoStats::default());
        assert!(histo.counts(&arena).iter().all(|&c| c == 0.0));
    }

    #[test]
    fn test_histo2d_fill() {
        let mut arena = HistoArena::new();
        let mut histo = Histo2D::new(
            Binning::new(4, 0.0, 4.0),
            Binning::new(2, 0.0, 2.0),
            &mut arena,
        );
        histo.fill(&mut arena, 3.5, 1.5);
        histo.fill(&mut arena, 3.5, 5.0);
        assert_eq!(histo.value(&arena, 3, 1), Some(1.0));
        assert_eq!(histo.stats.entry_count, 1);
        assert_eq!(histo.stats.overflow, 1);
        assert_eq!(histo.counts(&arena).len(), 8);
    }
}
