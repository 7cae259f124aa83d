//! Event provenance tracking
//!
//! Maintains truth about "who created whom" during one simulated event and
//! classifies particles at creation and termination. The tracker is a pure
//! state object: the transport engine reaches it through a thin adapter that
//! forwards its per-track and per-step callbacks, so every operation here is
//! testable with synthetic [`TrackStart`]/[`Step`] values.
//!
//! Lineage entries form a tree per event: the primary track (id 1) is the
//! root, and every other track's parent must have been registered earlier in
//! the same event. Violations of that sequencing are bugs in the callback
//! adapter and abort the run.

pub mod track;

use std::collections::{BTreeSet, HashMap};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::sink::{DecayRecord, EscapeRecord, NucleiRecord, RecordSink};
use crate::species::Isotope;

pub use track::{
    LineageEntry, Region, Step, Termination, TrackId, TrackMetadata, TrackStart, Vec3,
    PRIMARY_TRACK_ID,
};

/// Per-event particle lineage tracker and fate classifier.
#[derive(Debug)]
pub struct ProvenanceTracker {
    lineage: HashMap<TrackId, LineageEntry>,
    parent_of: HashMap<TrackId, Option<TrackId>>,
    children_of: HashMap<TrackId, BTreeSet<TrackId>>,
    omit_neutrons: bool,
    rng: SmallRng,
}

impl ProvenanceTracker {
    /// Create a tracker.
    ///
    /// `omit_neutrons` drops neutrons from the escaping-particle table;
    /// `seed` fixes the RNG used for step-segment sampling.
    #[must_use]
    pub fn new(omit_neutrons: bool, seed: u64) -> Self {
        Self {
            lineage: HashMap::new(),
            parent_of: HashMap::new(),
            children_of: HashMap::new(),
            omit_neutrons,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Number of lineage entries in the current event.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lineage.len()
    }

    /// Whether the current event has no lineage entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lineage.is_empty()
    }

    /// Lineage entry of a track, if registered.
    #[must_use]
    pub fn entry(&self, track_id: TrackId) -> Option<&LineageEntry> {
        self.lineage.get(&track_id)
    }

    /// Parent of a track (`None` for the primary), if the track is registered.
    #[must_use]
    pub fn parent_of(&self, track_id: TrackId) -> Option<Option<TrackId>> {
        self.parent_of.get(&track_id).copied()
    }

    /// Children created by a track so far.
    #[must_use]
    pub fn children_of(&self, track_id: TrackId) -> Option<&BTreeSet<TrackId>> {
        self.children_of.get(&track_id)
    }

    /// Register a new track and classify it at creation.
    ///
    /// Emits a nuclei observation for any heavy nuclear product, and a decay
    /// record when the track is a positron whose parent nuclide is a known
    /// emitter (C-11, N-13, O-15). The decay record carries the *parent*
    /// species: the emitter nucleus has already transmuted by the time the
    /// positron appears.
    ///
    /// # Panics
    /// Panics if the track id was already registered in this event, or if a
    /// non-primary track references an unregistered parent. Both indicate a
    /// broken callback sequence.
    pub fn on_track_start(&mut self, start: &TrackStart, sink: &mut RecordSink) {
        assert!(
            !self.lineage.contains_key(&start.track_id),
            "track {} registered twice in one event",
            start.track_id
        );

        let parent_species = match start.parent_id {
            None => None,
            Some(parent_id) => {
                let parent = self
                    .lineage
                    .get(&parent_id)
                    .unwrap_or_else(|| {
                        panic!(
                            "track {} references unregistered parent {parent_id}",
                            start.track_id
                        )
                    });
                self.children_of.entry(parent_id).or_default().insert(start.track_id);
                Some(parent.species)
            }
        };

        self.parent_of.insert(start.track_id, start.parent_id);
        self.children_of.entry(start.track_id).or_default();

        let metadata = TrackMetadata {
            // a creation-site property, taken from the declared originating
            // volume and never inherited from the parent
            originated_in_body: start.region == Region::Body,
            ..TrackMetadata::default()
        };

        self.lineage.insert(
            start.track_id,
            LineageEntry {
                track_id: start.track_id,
                parent_id: start.parent_id,
                species: start.species,
                creation_position: start.position,
                creation_time_s: start.time_s,
                creation_kinetic_energy_mev: start.kinetic_energy_mev,
                termination: None,
                metadata,
            },
        );

        if start.species.is_nucleus() {
            sink.add_nuclei(NucleiRecord {
                a: start.species.a,
                z: start.species.z,
                position: start.position,
            });
        }

        if start.species.is_positron() {
            if let Some(parent) = parent_species {
                if Isotope::from_species(parent).is_some() {
                    trace!(
                        track = start.track_id,
                        z = parent.z,
                        depth = start.position.z,
                        "positron emitter observed"
                    );
                    sink.add_decay(DecayRecord {
                        a: parent.a,
                        z: parent.z,
                        position: start.position,
                        time_s: start.time_s,
                    });
                }
            }
        }
    }

    /// Record a track's termination fields. For the primary track this also
    /// signals the primary range end to the sink.
    ///
    /// # Panics
    /// Panics if the track was never registered.
    pub fn on_track_end(
        &mut self,
        track_id: TrackId,
        final_position: Vec3,
        final_kinetic_energy_mev: f64,
        sink: &mut RecordSink,
    ) {
        let entry = self
            .lineage
            .get_mut(&track_id)
            .unwrap_or_else(|| panic!("track {track_id} terminated but never registered"));

        entry.termination = Some(Termination {
            position: final_position,
            kinetic_energy_mev: final_kinetic_energy_mev,
        });

        if track_id == PRIMARY_TRACK_ID {
            sink.set_primary_end(final_position);
        }
    }

    /// Tag a detector-plane crossing on a track's metadata. The first call
    /// for a track records the first-plane position, the second call the
    /// second-plane position; further crossings are ignored.
    ///
    /// # Panics
    /// Panics if the track was never registered.
    pub fn on_plane_crossing(&mut self, track_id: TrackId, position: Vec3) {
        let entry = self
            .lineage
            .get_mut(&track_id)
            .unwrap_or_else(|| panic!("plane crossing for unregistered track {track_id}"));

        let meta = &mut entry.metadata;
        if meta.detected_first_plane.is_none() {
            meta.detected_first_plane = Some(position);
        } else if meta.detected_second_plane.is_none() {
            meta.detected_second_plane = Some(position);
        }
    }

    /// Classify one transport step.
    ///
    /// Every step starting in the body region contributes its energy deposit
    /// to the dose grid, at a position sampled uniformly along the step
    /// segment rather than at the midpoint (avoids voxelization bias). A step
    /// leaving the body into the world emits an escape record for tracks that
    /// originated inside the body, subject to the neutron-exclusion policy.
    ///
    /// # Panics
    /// Panics if the stepped track was never registered.
    pub fn on_boundary_crossing(&mut self, step: &Step, sink: &mut RecordSink) {
        if step.pre_region == Region::Body {
            let u: f64 = self.rng.gen();
            let pos = step.pre_position.lerp(&step.post_position, u);
            sink.fill_edep(pos.z, pos.x, step.energy_deposit_mev);
        }

        if step.pre_region != Region::Body || step.post_region != Region::World {
            return;
        }

        let entry = self
            .lineage
            .get(&step.track_id)
            .unwrap_or_else(|| panic!("step for unregistered track {}", step.track_id));

        if !entry.metadata.originated_in_body {
            return;
        }
        if self.omit_neutrons && step.species.is_neutron() {
            return;
        }

        sink.add_escape(EscapeRecord {
            pdg: step.species.pdg,
            position: step.post_position,
            theta: step.post_momentum_dir.theta(),
            phi: step.post_momentum_dir.phi(),
            energy_mev: step.post_total_energy_mev,
            time_s: step.post_time_s,
            initial_position: entry.creation_position,
        });
    }

    /// Discard all event-scoped state. Called at the event boundary.
    ///
    /// # Panics
    /// Panics if any lineage entry is missing its termination fields: a track
    /// that started but never ended means the event/track callback sequence
    /// is broken, which is not a recoverable condition.
    pub fn reset(&mut self) {
        for entry in self.lineage.values() {
            assert!(
                entry.termination.is_some(),
                "reset with unterminated track {} (species pdg {})",
                entry.track_id,
                entry.species.pdg
            );
        }
        self.lineage.clear();
        self.parent_of.clear();
        self.children_of.clear();
    }
}
