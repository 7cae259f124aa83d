//! Integration tests for the temporal reconstruction, exercising the
//! documented delivery-model and calibration behavior end to end.

use betarange::config::ReconstructionConfig;
use betarange::reconstruction::{Histogram1d, TemporalReconstructor};
use betarange::sink::{DecayTable, DoseProfile};
use betarange::Error;

/// Triangular dose curve peaking at `peak_mm`, 1 mm bins up to 300 mm.
fn bragg_dose(peak_mm: f64) -> DoseProfile {
    let bin_centers: Vec<f64> = (0..300).map(|i| f64::from(i) + 0.5).collect();
    let values = bin_centers
        .iter()
        .map(|&z| {
            if z <= peak_mm {
                z / peak_mm
            } else {
                ((2.0 * peak_mm - z) / peak_mm).max(0.0)
            }
        })
        .collect();
    DoseProfile { bin_centers, values }
}

fn decay_row(table: &mut DecayTable, event_id: u32, a: i32, z: i32, depth: f64, t: f64) {
    table.event_id.push(event_id);
    table.a.push(a);
    table.z.push(z);
    table.x.push(0.0);
    table.y.push(0.0);
    table.depth.push(depth);
    table.t.push(t);
}

#[test]
fn test_uniform_delivery_boundary_condition() {
    // N=1000, irrTime=120 s: virtual event times span [-120, -0.12] s and
    // are strictly increasing toward 0.
    let irr_s = 120.0;
    let n = 1000;
    assert_eq!(TemporalReconstructor::event_time(irr_s, 0, n), -120.0);
    assert!((TemporalReconstructor::event_time(irr_s, n - 1, n) + 0.12).abs() < 1e-12);

    let mut previous = f64::NEG_INFINITY;
    for i in 0..n {
        let t = TemporalReconstructor::event_time(irr_s, i, n);
        assert!(t >= previous);
        assert!(t < 0.0);
        previous = t;
    }
}

#[test]
fn test_two_hour_window_collects_late_decays() {
    // N=1000, irrTime=2 min, every event decays 130 s after its start:
    // absolute times lie in [10, 129.88] s, entirely inside (0 s, 7200 s),
    // so all 1000 records pass the gate.
    let mut table = DecayTable::default();
    for event in 0..1000 {
        decay_row(&mut table, event, 15, 8, 50.0, 130.0);
    }
    let config = ReconstructionConfig {
        irr_time_min: 2.0,
        time_begin_min: 0.0,
        time_end_min: 120.0,
        ..Default::default()
    };
    let profiles = TemporalReconstructor::new(config)
        .reconstruct(&table, 1000, &bragg_dose(80.0))
        .unwrap();
    assert_eq!(profiles.n_gated, 1000);

    // in-beam decays (t=0 within the event) all fall before the window
    let mut in_beam = DecayTable::default();
    for event in 0..1000 {
        decay_row(&mut in_beam, event, 15, 8, 50.0, 0.0);
    }
    let config = ReconstructionConfig {
        irr_time_min: 2.0,
        time_begin_min: 0.0,
        time_end_min: 120.0,
        ..Default::default()
    };
    let profiles = TemporalReconstructor::new(config)
        .reconstruct(&in_beam, 1000, &bragg_dose(80.0))
        .unwrap();
    assert_eq!(profiles.n_gated, 0);
    assert_eq!(profiles.all.integral(), 0.0);
}

#[test]
fn test_gating_is_idempotent() {
    let mut table = DecayTable::default();
    for event in 0..500 {
        // half the decays late enough to pass the window
        let t = if event % 2 == 0 { 200.0 } else { 0.0 };
        decay_row(&mut table, event, 11, 6, 60.0, t);
    }
    let config = ReconstructionConfig {
        irr_time_min: 2.0,
        ..Default::default()
    };
    let reconstructor = TemporalReconstructor::new(config);

    let first = reconstructor.gate(&table, 500).unwrap();
    assert_eq!(first.len(), 250);

    // rebuild a table from the surviving rows and gate again
    let mut survivors = DecayTable::default();
    for &row in &first.rows {
        decay_row(
            &mut survivors,
            table.event_id[row],
            table.a[row],
            table.z[row],
            table.depth[row],
            table.t[row],
        );
    }
    let second = reconstructor.gate(&survivors, 500).unwrap();
    assert_eq!(second.len(), first.len());
    assert_eq!(second.depth, first.depth);
    assert_eq!(second.z, first.z);
}

#[test]
fn test_depth_axis_anchored_at_1_4_bragg() {
    let mut table = DecayTable::default();
    decay_row(&mut table, 0, 15, 8, 50.0, 10.0);
    let profiles = TemporalReconstructor::new(ReconstructionConfig::default())
        .reconstruct(&table, 1, &bragg_dose(100.0))
        .unwrap();
    assert!((profiles.bragg_peak_depth_mm - 100.0).abs() <= 1.0);
    assert!((profiles.all.hi() - 1.4 * profiles.bragg_peak_depth_mm).abs() < 1e-9);
    assert_eq!(profiles.all.lo(), 0.0);
    assert_eq!(profiles.all.n_bins(), 120);
}

#[test]
fn test_o15_decay_lands_in_exactly_one_isotope_stream() {
    let mut table = DecayTable::default();
    decay_row(&mut table, 0, 15, 8, 50.0, 10.0);
    let profiles = TemporalReconstructor::new(ReconstructionConfig::default())
        .reconstruct(&table, 1, &bragg_dose(80.0))
        .unwrap();

    let occupied = |h: &Histogram1d| h.counts().iter().filter(|&&c| c > 0.0).count();
    assert_eq!(occupied(&profiles.o15), 1);
    assert_eq!(occupied(&profiles.c11), 0);
    assert_eq!(occupied(&profiles.n13), 0);

    let bin = profiles.o15.bin_of(50.0).unwrap();
    assert!(profiles.o15.counts()[bin] > 0.0);
}

#[test]
fn test_partition_completeness_bin_for_bin() {
    let mut table = DecayTable::default();
    for event in 0..300 {
        let (a, z, depth) = match event % 3 {
            0 => (15, 8, 40.0),
            1 => (11, 6, 60.0),
            _ => (13, 7, 75.0),
        };
        decay_row(&mut table, event, a, z, depth, 30.0);
    }
    let config = ReconstructionConfig {
        precision_mm: 3.0,
        seed: Some(7),
        ..Default::default()
    };
    let profiles = TemporalReconstructor::new(config)
        .reconstruct(&table, 300, &bragg_dose(80.0))
        .unwrap();

    for bin in 0..profiles.all.n_bins() {
        let sum = profiles.o15.counts()[bin] + profiles.c11.counts()[bin] + profiles.n13.counts()[bin];
        assert!(
            (sum - profiles.all.counts()[bin]).abs() < 1e-9,
            "bin {bin}: {sum} != {}",
            profiles.all.counts()[bin]
        );
    }
}

#[test]
fn test_scaling_linearity_and_zero() {
    let mut table = DecayTable::default();
    for event in 0..100 {
        decay_row(&mut table, event, 15, 8, 50.0, 20.0);
    }
    let dose = bragg_dose(80.0);

    let with_n = |n_irrad: f64| {
        TemporalReconstructor::new(ReconstructionConfig {
            n_irrad,
            ..Default::default()
        })
        .reconstruct(&table, 100, &dose)
        .unwrap()
    };

    let base = with_n(1e9);
    let doubled = with_n(2e9);
    for (a, b) in base.all.counts().iter().zip(doubled.all.counts()) {
        assert!((2.0 * a - b).abs() <= 1e-9 * b.abs().max(1.0));
    }

    let zeroed = with_n(0.0);
    assert!(zeroed.all.counts().iter().all(|&c| c == 0.0));
    assert_eq!(zeroed.scaling_factor, 0.0);
}

#[test]
fn test_no_events_fails_zero_survivors_does_not() {
    let table = DecayTable::default();
    let dose = bragg_dose(80.0);

    let err = TemporalReconstructor::new(ReconstructionConfig::default())
        .reconstruct(&table, 0, &dose)
        .unwrap_err();
    assert!(matches!(err, Error::NoEvents));

    let ok = TemporalReconstructor::new(ReconstructionConfig::default())
        .reconstruct(&table, 10, &dose)
        .unwrap();
    assert_eq!(ok.n_gated, 0);
}

#[test]
fn test_overlay_disabled_leaves_streams_untouched() {
    let mut table = DecayTable::default();
    for event in 0..50 {
        decay_row(&mut table, event, 11, 6, 45.0, 15.0);
    }
    let dose = bragg_dose(80.0);

    let with_overlay = TemporalReconstructor::new(ReconstructionConfig::default())
        .reconstruct(&table, 50, &dose)
        .unwrap();
    let without = TemporalReconstructor::new(ReconstructionConfig {
        overlay_dose: false,
        ..Default::default()
    })
    .reconstruct(&table, 50, &dose)
    .unwrap();

    assert!(with_overlay.dose_overlay.is_some());
    assert!(without.dose_overlay.is_none());
    // overlay choice never feeds back into the activity streams
    assert_eq!(with_overlay.all, without.all);
    assert_eq!(with_overlay.c11, without.c11);
}

#[test]
fn test_profiles_parquet_export() {
    let dir = tempfile::tempdir().unwrap();
    let stem = dir.path().join("out");

    let mut table = DecayTable::default();
    decay_row(&mut table, 0, 15, 8, 50.0, 10.0);
    let profiles = TemporalReconstructor::new(ReconstructionConfig::default())
        .reconstruct(&table, 1, &bragg_dose(80.0))
        .unwrap();

    let written = profiles.write_parquet(&stem).unwrap();
    assert_eq!(written.len(), 2); // activity + dose overlay
    for path in written {
        assert!(path.exists());
    }
}
