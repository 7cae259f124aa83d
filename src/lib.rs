//! # betarange: positron-emitter activity reconstruction
//!
//! Reconstructs a time-resolved, isotope-resolved radioactivity profile along
//! the beam axis of a particle-therapy irradiation, from per-event Monte-Carlo
//! decay records, for range-verification research.
//!
//! Two halves:
//!
//! - **Collection** ([`provenance`], [`run`], [`sink`]): a per-event lineage
//!   tracker classifies every particle at creation and termination, driven by
//!   the transport engine's callbacks, and persists decay/escape/beam records
//!   into append-only Arrow/Parquet tables, one partition per worker.
//! - **Reconstruction** ([`reconstruction`]): an offline batch transform
//!   assigns each event a virtual emission time under a uniform-delivery
//!   model, gates decays into the measurement window, optionally smears
//!   depths with the detector resolution, and bins per-isotope activity
//!   histograms with absolute physical scaling.
//!
//! ## Example
//!
//! ```rust,no_run
//! use betarange::config::ReconstructionConfig;
//! use betarange::reconstruction::TemporalReconstructor;
//! use betarange::sink::{DecayTable, EdepHistogram};
//!
//! let decays = DecayTable::load_parquet("run.decay.parquet")?;
//! let dose = EdepHistogram::load_parquet("run.edep.parquet")?.z_projection();
//!
//! let reconstructor = TemporalReconstructor::new(ReconstructionConfig {
//!     irr_time_min: 2.0,
//!     time_begin_min: 0.0,
//!     time_end_min: 30.0,
//!     ..Default::default()
//! });
//! let profiles = reconstructor.reconstruct(&decays, 1_000_000, &dose)?;
//! println!("{} decays in window", profiles.n_gated);
//! # Ok::<(), betarange::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod provenance;
pub mod reconstruction;
pub mod run;
pub mod sink;
pub mod species;

pub use error::{Error, Result};
