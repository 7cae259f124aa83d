//! Track-scoped data: lineage entries and the synthetic step/track inputs
//! the transport-engine adapter feeds into the tracker.

use serde::{Deserialize, Serialize};

use crate::species::Species;

/// Track identifier, unique within one event. The primary track is id 1.
pub type TrackId = u32;

/// Track id of the primary (root) particle.
pub const PRIMARY_TRACK_ID: TrackId = 1;

/// A point or direction in the detector frame (mm for positions).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// Transverse x (mm)
    pub x: f64,
    /// Transverse y (mm)
    pub y: f64,
    /// Depth along the beam axis (mm)
    pub z: f64,
}

impl Vec3 {
    /// Construct from components.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Linear interpolation: `self + u * (other - self)`.
    #[must_use]
    pub fn lerp(&self, other: &Self, u: f64) -> Self {
        Self {
            x: self.x + u * (other.x - self.x),
            y: self.y + u * (other.y - self.y),
            z: self.z + u * (other.z - self.z),
        }
    }

    /// Polar angle with respect to the beam axis (rad).
    #[must_use]
    pub fn theta(&self) -> f64 {
        let r = (self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if r == 0.0 {
            0.0
        } else {
            (self.z / r).acos()
        }
    }

    /// Azimuthal angle (rad).
    #[must_use]
    pub fn phi(&self) -> f64 {
        self.y.atan2(self.x)
    }
}

/// Logical geometry region a step point lies in.
///
/// The tracker only distinguishes the body phantom from the surrounding
/// world; detector volumes and everything else fold into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    /// The irradiated body phantom
    Body,
    /// The world volume surrounding the phantom
    World,
    /// Any other volume (detector planes, caps, ...)
    Other,
}

/// Per-track metadata tagged at creation and during transport.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackMetadata {
    /// The track was created inside the body region. A creation-site
    /// property: inherited from the declared originating volume, never from
    /// the parent track.
    pub originated_in_body: bool,
    /// Crossing position on the first detector plane, if seen
    pub detected_first_plane: Option<Vec3>,
    /// Crossing position on the second detector plane, if seen
    pub detected_second_plane: Option<Vec3>,
}

impl TrackMetadata {
    /// Whether the track was seen on both detector planes.
    #[must_use]
    pub const fn detected_at_both_planes(&self) -> bool {
        self.detected_first_plane.is_some() && self.detected_second_plane.is_some()
    }
}

/// Termination fields of a lineage entry, set once at track end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Termination {
    /// Final position (mm)
    pub position: Vec3,
    /// Final kinetic energy (MeV)
    pub kinetic_energy_mev: f64,
}

/// One particle's lineage entry, scoped to a single event.
///
/// Created at track start, mutated exactly once at track end, and discarded
/// wholesale when the tracker resets at the event boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct LineageEntry {
    /// Track id, unique within the event
    pub track_id: TrackId,
    /// Parent track id; `None` marks the primary
    pub parent_id: Option<TrackId>,
    /// Species at creation
    pub species: Species,
    /// Creation position (mm)
    pub creation_position: Vec3,
    /// Within-event creation time (s)
    pub creation_time_s: f64,
    /// Kinetic energy at creation (MeV)
    pub creation_kinetic_energy_mev: f64,
    /// Termination fields; `None` until the track ends
    pub termination: Option<Termination>,
    /// Creation-site metadata
    pub metadata: TrackMetadata,
}

/// Track-start notification from the transport engine.
#[derive(Debug, Clone)]
pub struct TrackStart {
    /// Track id assigned by the engine
    pub track_id: TrackId,
    /// Parent track id; `None` for the primary
    pub parent_id: Option<TrackId>,
    /// Species of the new track
    pub species: Species,
    /// Creation position (mm)
    pub position: Vec3,
    /// Within-event creation time (s)
    pub time_s: f64,
    /// Kinetic energy at creation (MeV)
    pub kinetic_energy_mev: f64,
    /// Region the track was created in
    pub region: Region,
}

/// One transport step, as reported by the stepping callback.
#[derive(Debug, Clone)]
pub struct Step {
    /// Track being stepped
    pub track_id: TrackId,
    /// Species of the stepped track
    pub species: Species,
    /// Pre-step position (mm)
    pub pre_position: Vec3,
    /// Post-step position (mm)
    pub post_position: Vec3,
    /// Region of the pre-step point
    pub pre_region: Region,
    /// Region of the post-step point
    pub post_region: Region,
    /// Energy deposited along the step (MeV)
    pub energy_deposit_mev: f64,
    /// Momentum direction at the post-step point (unit vector)
    pub post_momentum_dir: Vec3,
    /// Total energy at the post-step point (MeV)
    pub post_total_energy_mev: f64,
    /// Global time at the post-step point (s)
    pub post_time_s: f64,
}
