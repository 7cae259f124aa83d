//! Uniform-bin 1-D histogram for activity-vs-depth curves.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A 1-D histogram with uniform binning over `[lo, hi)`.
///
/// Entries outside the axis are dropped (no under/overflow bins); the
/// reconstruction's depth axis is chosen wide enough that losing the tails is
/// intentional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram1d {
    lo: f64,
    hi: f64,
    bins: Vec<f64>,
}

impl Histogram1d {
    /// Create an empty histogram with `n_bins` uniform bins over `[lo, hi)`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidAxis`] if `n_bins` is zero or the axis is
    /// degenerate (`hi <= lo`, or non-finite bounds).
    pub fn new(n_bins: usize, lo: f64, hi: f64) -> Result<Self> {
        if n_bins == 0 {
            return Err(Error::InvalidAxis("n_bins must be positive".to_string()));
        }
        if !lo.is_finite() || !hi.is_finite() || hi <= lo {
            return Err(Error::InvalidAxis(format!("bad axis range [{lo}, {hi})")));
        }
        Ok(Self {
            lo,
            hi,
            bins: vec![0.0; n_bins],
        })
    }

    /// Number of bins.
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    /// Lower axis bound.
    #[must_use]
    pub const fn lo(&self) -> f64 {
        self.lo
    }

    /// Upper axis bound.
    #[must_use]
    pub const fn hi(&self) -> f64 {
        self.hi
    }

    /// Bin index a value would fall into, or `None` if off-axis.
    #[must_use]
    pub fn bin_of(&self, value: f64) -> Option<usize> {
        if value < self.lo || value >= self.hi {
            return None;
        }
        let idx = ((value - self.lo) / (self.hi - self.lo) * self.bins.len() as f64) as usize;
        Some(idx.min(self.bins.len() - 1))
    }

    /// Count one entry at `value`. Off-axis entries are dropped.
    pub fn fill(&mut self, value: f64) {
        if let Some(idx) = self.bin_of(value) {
            self.bins[idx] += 1.0;
        }
    }

    /// Count every value in `values`.
    pub fn fill_all(&mut self, values: &[f64]) {
        for &v in values {
            self.fill(v);
        }
    }

    /// Multiply every bin by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for b in &mut self.bins {
            *b *= factor;
        }
    }

    /// Bin contents.
    #[must_use]
    pub fn counts(&self) -> &[f64] {
        &self.bins
    }

    /// Bin centers.
    #[must_use]
    pub fn bin_centers(&self) -> Vec<f64> {
        let width = (self.hi - self.lo) / self.bins.len() as f64;
        (0..self.bins.len())
            .map(|i| self.lo + (i as f64 + 0.5) * width)
            .collect()
    }

    /// Largest bin content.
    #[must_use]
    pub fn max_value(&self) -> f64 {
        self.bins.iter().copied().fold(0.0, f64::max)
    }

    /// Sum of all bin contents.
    #[must_use]
    pub fn integral(&self) -> f64 {
        self.bins.iter().sum()
    }
}
