use std::sync::Arc;
use std::time::Duration;

use ballast_core::ManualClock;
use ballast_memory::{LeakDetector, LeakDetectorConfig, LeakSuspicion, MemorySnapshot};

const START: u64 = 10_000_000;

fn replay(resident: &[f64], step: Duration) -> Vec<LeakSuspicion> {
    let clock = Arc::new(ManualClock::new(START));
    let detector = LeakDetector::new(LeakDetectorConfig::default(), clock.clone());
    for (i, resident_mb) in resident.iter().enumerate() {
        detector.push_snapshot(MemorySnapshot {
            timestamp_ms: START + i as u64 * step.as_millis() as u64,
            resident_mb: *resident_mb,
            tracked_object_count: 0,
        });
    }
    detector.analyze()
}

#[test]
fn steady_growth_within_the_window_is_flagged() {
    // +1 MB every 10s: 6 MB over 60s.
    let resident: Vec<f64> = (0..7).map(|i| 100.0 + i as f64).collect();
    let suspicions = replay(&resident, Duration::from_secs(10));
    assert!(matches!(
        suspicions.as_slice(),
        [LeakSuspicion::SustainedGrowth { growth_mb, snapshots: 7, .. }] if *growth_mb > 5.0
    ));
}

#[test]
fn flat_usage_is_not_flagged() {
    let suspicions = replay(&[200.0; 20], Duration::from_secs(10));
    assert!(suspicions.is_empty());
}

#[test]
fn bounded_sawtooth_is_not_flagged() {
    let resident: Vec<f64> = (0..30)
        .map(|i| 100.0 + (i % 5) as f64 * 3.0)
        .collect();
    let suspicions = replay(&resident, Duration::from_secs(5));
    assert!(suspicions.is_empty());
}

#[test]
fn growth_spread_beyond_the_window_is_not_flagged() {
    // +6 MB, but over ten minutes.
    let resident: Vec<f64> = (0..11).map(|i| 100.0 + i as f64 * 0.6).collect();
    let suspicions = replay(&resident, Duration::from_secs(60));
    assert!(suspicions.is_empty());
}

#[test]
fn tick_reports_growth_from_live_snapshots() {
    let clock = Arc::new(ManualClock::new(START));
    let detector = LeakDetector::new(LeakDetectorConfig::default(), clock.clone());

    let mut last = None;
    for i in 0..4 {
        last = Some(detector.tick(50.0 + i as f64 * 3.0));
        clock.advance(Duration::from_secs(15));
    }
    let report = last.expect("ticked");
    assert_eq!(report.snapshot.resident_mb, 59.0);
    assert_eq!(report.suspicions.len(), 1);
}

#[test]
fn late_ticks_at_the_window_cadence_still_flag_growth() {
    let clock = Arc::new(ManualClock::new(START));
    let config = LeakDetectorConfig::default();
    let step = config.window + Duration::from_millis(5);
    let detector = LeakDetector::new(config, clock.clone());

    let mut flagged = 0;
    for i in 0..20 {
        let report = detector.tick(100.0 + i as f64 * 6.0);
        if report
            .suspicions
            .iter()
            .any(|suspicion| matches!(suspicion, LeakSuspicion::SustainedGrowth { .. }))
        {
            flagged += 1;
        }
        clock.advance(step);
    }
    // Every tick after the first has a baseline one window back.
    assert_eq!(flagged, 19);
}

#[test]
fn growth_baseline_does_not_reach_past_two_windows() {
    // Two samples ten minutes apart: the older one is too stale to anchor growth.
    let suspicions = replay(&[100.0, 120.0], Duration::from_secs(600));
    assert!(suspicions.is_empty());
}
