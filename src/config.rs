//! Settings for the simulation-side collection and the offline reconstruction
//!
//! Both structs are serde-derived so runs can be described by a JSON settings
//! file and reproduced later. Numeric corrections (negative window begin,
//! inverted window, negative precision) are applied by [`ReconstructionConfig::normalized`]
//! rather than rejected: they are documented defaults, not errors.

use serde::{Deserialize, Serialize};

/// Measurement window end used when the configured end does not exceed the
/// begin, in minutes.
pub const DEFAULT_WINDOW_END_MIN: f64 = 120.0;

/// Settings for one simulation run (collection side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Base RNG seed; worker w derives its stream from `seed + w`
    pub seed: u64,
    /// Number of collection workers, each with its own tracker and sink partition
    pub n_workers: usize,
    /// Number of primary events to simulate
    pub n_events: u64,
    /// Primary particle name ("proton" or "carbon")
    pub particle: String,
    /// Mean beam kinetic energy per nucleon (MeV/u)
    pub beam_mean_energy_mev: f64,
    /// Gaussian beam energy spread (MeV/u)
    pub sigma_energy_mev: f64,
    /// Body phantom material name
    pub body_material: String,
    /// Body phantom width along the beam axis (mm)
    pub body_width_mm: f64,
    /// Exclude neutrons from the escaping-particle table
    pub omit_neutrons: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            n_workers: 1,
            n_events: 0,
            particle: "proton".to_string(),
            beam_mean_energy_mev: 0.0,
            sigma_energy_mev: 0.0,
            body_material: "waterGel".to_string(),
            body_width_mm: 150.0,
            omit_neutrons: false,
        }
    }
}

/// Summary persisted next to the record tables after a run.
///
/// The reconstruction needs the total simulated event count to assign virtual
/// emission times; the decay table alone cannot supply it (events without
/// decays leave no rows).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Total number of simulated primary events
    pub n_events: u64,
    /// Settings the run was produced with
    pub settings: SimulationSettings,
}

/// Configuration surface of the temporal reconstruction.
///
/// Window and irradiation times are given in minutes, matching the
/// measurement protocol; conversion to seconds happens internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// Measurement window begin, minutes after irradiation end
    pub time_begin_min: f64,
    /// Measurement window end, minutes after irradiation end
    pub time_end_min: f64,
    /// Irradiation duration, minutes
    pub irr_time_min: f64,
    /// Target absolute primary-particle count the histograms are scaled to
    pub n_irrad: f64,
    /// Detector spatial resolution as FWHM (mm); 0 means ideal detector
    pub precision_mm: f64,
    /// Number of uniform depth bins
    pub n_bins: usize,
    /// Overlay the rescaled dose profile on the output
    pub overlay_dose: bool,
    /// Seed for the smearing RNG; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            time_begin_min: 0.0,
            time_end_min: 0.0,
            irr_time_min: 0.0,
            n_irrad: 1e9,
            precision_mm: 0.0,
            n_bins: 120,
            overlay_dose: true,
            seed: None,
        }
    }
}

impl ReconstructionConfig {
    /// Apply the documented numeric corrections and return the result.
    ///
    /// - a negative window begin is clamped to 0
    /// - a window end not exceeding the begin becomes 120 min
    /// - a negative precision becomes 0 (ideal detector)
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.time_begin_min < 0.0 {
            self.time_begin_min = 0.0;
        }
        if self.time_end_min <= self.time_begin_min {
            self.time_end_min = DEFAULT_WINDOW_END_MIN;
        }
        if self.precision_mm < 0.0 {
            self.precision_mm = 0.0;
        }
        self
    }

    /// Measurement window in seconds after irradiation end.
    #[must_use]
    pub fn window_seconds(&self) -> (f64, f64) {
        (self.time_begin_min * 60.0, self.time_end_min * 60.0)
    }

    /// Irradiation duration in seconds.
    #[must_use]
    pub fn irr_time_seconds(&self) -> f64 {
        self.irr_time_min * 60.0
    }
}
