//! Deposited-energy histogram
//!
//! A fixed 2-D grid over (depth z, transverse x), filled once per step inside
//! the body region. Its z-projection is the dose curve whose peak anchors the
//! reconstruction's depth axis.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Float64Array, RecordBatch, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::{float64_column, uint32_column};
use crate::{Error, Result};

/// Default grid: 1000 x 1000 bins over z in [0, 300] mm, x in [-150, 150] mm.
pub const STANDARD_GRID_BINS: usize = 1000;

/// 2-D deposited-energy grid.
#[derive(Debug, Clone)]
pub struct EdepHistogram {
    n_z: usize,
    n_x: usize,
    z_min: f64,
    z_max: f64,
    x_min: f64,
    x_max: f64,
    /// Dense row-major weights, z-major
    weights: Vec<f64>,
}

impl Default for EdepHistogram {
    fn default() -> Self {
        Self::standard_grid()
    }
}

impl EdepHistogram {
    /// The grid used by the collection pipeline.
    #[must_use]
    pub fn standard_grid() -> Self {
        Self {
            n_z: STANDARD_GRID_BINS,
            n_x: STANDARD_GRID_BINS,
            z_min: 0.0,
            z_max: 300.0,
            x_min: -150.0,
            x_max: 150.0,
            weights: vec![0.0; STANDARD_GRID_BINS * STANDARD_GRID_BINS],
        }
    }

    /// Add a deposit of `de_mev` at `(z_mm, x_mm)`. Out-of-grid deposits are
    /// dropped.
    pub fn fill(&mut self, z_mm: f64, x_mm: f64, de_mev: f64) {
        let Some(iz) = bin_index(z_mm, self.z_min, self.z_max, self.n_z) else {
            return;
        };
        let Some(ix) = bin_index(x_mm, self.x_min, self.x_max, self.n_x) else {
            return;
        };
        self.weights[iz * self.n_x + ix] += de_mev;
    }

    /// Accumulate another grid into this one. Both must share the same shape.
    pub fn merge(&mut self, other: &Self) {
        assert_eq!(self.weights.len(), other.weights.len(), "edep grid shape mismatch");
        for (w, o) in self.weights.iter_mut().zip(&other.weights) {
            *w += o;
        }
    }

    /// Total deposited energy on the grid (MeV).
    #[must_use]
    pub fn total(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Project onto the depth axis, yielding the dose curve.
    #[must_use]
    pub fn z_projection(&self) -> DoseProfile {
        let width = (self.z_max - self.z_min) / self.n_z as f64;
        let bin_centers = (0..self.n_z)
            .map(|i| self.z_min + (i as f64 + 0.5) * width)
            .collect();
        let values = (0..self.n_z)
            .map(|iz| self.weights[iz * self.n_x..(iz + 1) * self.n_x].iter().sum())
            .collect();
        DoseProfile { bin_centers, values }
    }

    /// Persist the grid as a sparse Parquet table (z bin, x bin, weight).
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut z_bins = Vec::new();
        let mut x_bins = Vec::new();
        let mut values = Vec::new();
        for iz in 0..self.n_z {
            for ix in 0..self.n_x {
                let w = self.weights[iz * self.n_x + ix];
                if w != 0.0 {
                    z_bins.push(iz as u32);
                    x_bins.push(ix as u32);
                    values.push(w);
                }
            }
        }

        let batch = RecordBatch::try_new(
            Arc::new(Self::schema()),
            vec![
                Arc::new(UInt32Array::from(z_bins)),
                Arc::new(UInt32Array::from(x_bins)),
                Arc::new(Float64Array::from(values)),
            ],
        )?;

        let file = File::create(path.as_ref())?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Rebuild the dense grid from a sparse Parquet table written by
    /// [`write_parquet`](Self::write_parquet).
    ///
    /// # Errors
    /// Returns error if the file is missing or malformed.
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| Error::Config(format!("cannot open edep table: {e}")))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut grid = Self::standard_grid();
        for batch in reader {
            let batch = batch?;
            let z_bins = uint32_column(&batch, "z_bin")?;
            let x_bins = uint32_column(&batch, "x_bin")?;
            let values = float64_column(&batch, "weight")?;
            for i in 0..batch.num_rows() {
                let iz = z_bins.value(i) as usize;
                let ix = x_bins.value(i) as usize;
                if iz < grid.n_z && ix < grid.n_x {
                    grid.weights[iz * grid.n_x + ix] = values.value(i);
                }
            }
        }
        Ok(grid)
    }

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("z_bin", DataType::UInt32, false),
            Field::new("x_bin", DataType::UInt32, false),
            Field::new("weight", DataType::Float64, false),
        ])
    }
}

/// 1-D dose curve (the z-projection of the deposit grid).
#[derive(Debug, Clone, PartialEq)]
pub struct DoseProfile {
    /// Depth bin centers (mm)
    pub bin_centers: Vec<f64>,
    /// Deposited energy per bin (MeV)
    pub values: Vec<f64>,
}

impl DoseProfile {
    /// Depth of the maximum-dose bin (the Bragg peak), or `None` if the
    /// profile carries no dose at all.
    #[must_use]
    pub fn bragg_peak_depth(&self) -> Option<f64> {
        let (idx, max) = self
            .values
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
        if max > 0.0 {
            Some(self.bin_centers[idx])
        } else {
            None
        }
    }

    /// Maximum bin value.
    #[must_use]
    pub fn max_value(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Return a copy rescaled so the maximum bin equals `target_peak`.
    /// Purely a display alignment; a flat zero profile is returned unchanged.
    #[must_use]
    pub fn rescaled_to_peak(&self, target_peak: f64) -> Self {
        let max = self.max_value();
        if max <= 0.0 {
            return self.clone();
        }
        let factor = target_peak / max;
        Self {
            bin_centers: self.bin_centers.clone(),
            values: self.values.iter().map(|v| v * factor).collect(),
        }
    }
}

fn bin_index(value: f64, min: f64, max: f64, n: usize) -> Option<usize> {
    if value < min || value >= max {
        return None;
    }
    let idx = ((value - min) / (max - min) * n as f64) as usize;
    Some(idx.min(n - 1))
}
