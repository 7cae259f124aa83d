//! Integration tests for the event provenance pipeline:
//! tracker callbacks -> event aggregator -> record sink.

use betarange::provenance::{Region, Step, TrackStart, Vec3};
use betarange::run::EventAggregator;
use betarange::species::Species;

fn track(
    track_id: u32,
    parent_id: Option<u32>,
    species: Species,
    region: Region,
    depth: f64,
    time_s: f64,
) -> TrackStart {
    TrackStart {
        track_id,
        parent_id,
        species,
        position: Vec3::new(0.0, 0.0, depth),
        time_s,
        kinetic_energy_mev: 1.0,
        region,
    }
}

/// A proton event producing one O-15 and one C-11 decay plus an escaping
/// prompt gamma, played through the aggregator the way the engine adapter
/// would.
fn play_reference_event(aggregator: &mut EventAggregator, event_id: u32) {
    aggregator.on_event_begin(event_id);
    let (tracker, sink) = aggregator.parts_mut();

    tracker.on_track_start(
        &track(1, None, Species::PROTON, Region::World, -200.0, 0.0),
        sink,
    );

    // target fragmentation: O-15 emitter, then its positron
    tracker.on_track_start(&track(2, Some(1), Species::ion(15, 8), Region::Body, 40.0, 1e-9), sink);
    tracker.on_track_start(&track(3, Some(2), Species::POSITRON, Region::Body, 40.0, 120.5), sink);

    // projectile fragmentation: C-11 emitter, then its positron
    tracker.on_track_start(&track(4, Some(1), Species::ion(11, 6), Region::Body, 55.0, 2e-9), sink);
    tracker.on_track_start(&track(5, Some(4), Species::POSITRON, Region::Body, 55.0, 300.0), sink);

    // prompt gamma leaving the body
    tracker.on_track_start(&track(6, Some(1), Species::GAMMA, Region::Body, 50.0, 1e-9), sink);
    tracker.on_boundary_crossing(
        &Step {
            track_id: 6,
            species: Species::GAMMA,
            pre_position: Vec3::new(0.0, 40.0, 50.0),
            post_position: Vec3::new(0.0, 80.0, 50.0),
            pre_region: Region::Body,
            post_region: Region::World,
            energy_deposit_mev: 0.0,
            post_momentum_dir: Vec3::new(0.0, 1.0, 0.0),
            post_total_energy_mev: 4.4,
            post_time_s: 2e-9,
        },
        sink,
    );

    for id in [6, 5, 4, 3, 2] {
        tracker.on_track_end(id, Vec3::new(0.0, 0.0, 60.0), 0.0, sink);
    }
    tracker.on_track_end(1, Vec3::new(0.0, 0.0, 82.0), 0.0, sink);

    aggregator.on_event_end();
}

#[test]
fn test_reference_event_record_counts() {
    let mut aggregator = EventAggregator::new(false, 0);
    play_reference_event(&mut aggregator, 0);
    let sink = aggregator.into_sink();

    assert_eq!(sink.decay().len(), 2);
    assert_eq!(sink.decay().z, vec![8, 6]);
    assert_eq!(sink.escape().len(), 1);
    assert_eq!(sink.nuclei().len(), 3); // proton + two emitter nuclei
    assert_eq!(sink.primary_end().len(), 1);
}

#[test]
fn test_decay_set_equals_positrons_with_emitter_parents() {
    // Exactly the positron tracks whose parent is a known emitter produce
    // decay rows, independent of callback order noise.
    let mut aggregator = EventAggregator::new(false, 0);
    aggregator.on_event_begin(0);
    let (tracker, sink) = aggregator.parts_mut();

    tracker.on_track_start(&track(1, None, Species::PROTON, Region::World, -200.0, 0.0), sink);
    // positron from pair production (parent is the primary): no decay row
    tracker.on_track_start(&track(2, Some(1), Species::POSITRON, Region::Body, 30.0, 1e-9), sink);
    // N-13 emitter and its positron: one decay row
    tracker.on_track_start(&track(3, Some(1), Species::ion(13, 7), Region::Body, 45.0, 1e-9), sink);
    tracker.on_track_start(&track(4, Some(3), Species::POSITRON, Region::Body, 45.0, 60.0), sink);
    // stable fragment and a gamma: no decay rows
    tracker.on_track_start(&track(5, Some(1), Species::ion(16, 8), Region::Body, 48.0, 1e-9), sink);
    tracker.on_track_start(&track(6, Some(5), Species::GAMMA, Region::Body, 48.0, 2e-9), sink);

    for id in [6, 5, 4, 3, 2, 1] {
        tracker.on_track_end(id, Vec3::new(0.0, 0.0, 50.0), 0.0, sink);
    }
    aggregator.on_event_end();

    let sink = aggregator.into_sink();
    assert_eq!(sink.decay().len(), 1);
    assert_eq!(sink.decay().z, vec![7]);
    assert_eq!(sink.decay().a, vec![13]);
}

#[test]
fn test_decay_record_carries_creation_position_and_time() {
    let mut aggregator = EventAggregator::new(false, 0);
    play_reference_event(&mut aggregator, 0);
    let sink = aggregator.into_sink();

    // the O-15 positron was created at depth 40 mm, 120.5 s into the event
    assert!((sink.decay().depth[0] - 40.0).abs() < 1e-12);
    assert!((sink.decay().t[0] - 120.5).abs() < 1e-12);
}

#[test]
fn test_lineage_parent_ids_reference_earlier_tracks() {
    let mut aggregator = EventAggregator::new(false, 0);
    aggregator.on_event_begin(0);
    let (tracker, sink) = aggregator.parts_mut();

    let mut seen: Vec<u32> = Vec::new();
    let starts = [
        track(1, None, Species::PROTON, Region::World, -200.0, 0.0),
        track(2, Some(1), Species::NEUTRON, Region::Body, 20.0, 1e-9),
        track(3, Some(2), Species::GAMMA, Region::Body, 25.0, 2e-9),
        track(4, Some(1), Species::ion(12, 6), Region::Body, 30.0, 1e-9),
    ];
    for start in &starts {
        if let Some(parent) = start.parent_id {
            assert!(seen.contains(&parent), "parent {parent} not yet registered");
        }
        tracker.on_track_start(start, sink);
        seen.push(start.track_id);
    }
    for id in [4, 3, 2, 1] {
        tracker.on_track_end(id, Vec3::new(0.0, 0.0, 40.0), 0.0, sink);
    }
    aggregator.on_event_end();
}

#[test]
fn test_aggregator_sequences_multiple_events() {
    let mut aggregator = EventAggregator::new(false, 0);
    for event_id in 0..5 {
        play_reference_event(&mut aggregator, event_id);
    }
    let sink = aggregator.into_sink();

    assert_eq!(sink.decay().len(), 10);
    assert_eq!(sink.primary_end().len(), 5);
    // each event retagged its own rows
    assert_eq!(sink.decay().event_id, vec![0, 0, 1, 1, 2, 2, 3, 3, 4, 4]);
}

#[test]
#[should_panic(expected = "no open event")]
fn test_event_end_without_begin_panics() {
    let mut aggregator = EventAggregator::new(false, 0);
    aggregator.on_event_end();
}

#[test]
fn test_neutron_exclusion_applies_to_escapes_only() {
    let mut aggregator = EventAggregator::new(true, 0);
    aggregator.on_event_begin(0);
    let (tracker, sink) = aggregator.parts_mut();

    tracker.on_track_start(&track(1, None, Species::PROTON, Region::World, -200.0, 0.0), sink);
    tracker.on_track_start(&track(2, Some(1), Species::NEUTRON, Region::Body, 20.0, 1e-9), sink);
    tracker.on_boundary_crossing(
        &Step {
            track_id: 2,
            species: Species::NEUTRON,
            pre_position: Vec3::new(0.0, 0.0, 20.0),
            post_position: Vec3::new(0.0, 0.0, 160.0),
            pre_region: Region::Body,
            post_region: Region::World,
            energy_deposit_mev: 0.5,
            post_momentum_dir: Vec3::new(0.0, 0.0, 1.0),
            post_total_energy_mev: 10.0,
            post_time_s: 3e-9,
        },
        sink,
    );
    tracker.on_track_end(2, Vec3::new(0.0, 0.0, 160.0), 0.0, sink);
    tracker.on_track_end(1, Vec3::new(0.0, 0.0, 80.0), 0.0, sink);
    aggregator.on_event_end();

    let sink = aggregator.into_sink();
    assert_eq!(sink.escape().len(), 0);
    // the deposit along the body segment is still scored
    assert!((sink.edep().total() - 0.5).abs() < 1e-12);
}
