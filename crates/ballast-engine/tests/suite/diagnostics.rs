use std::sync::Arc;
use std::time::Duration;

use ballast_memory::{LeakSuspicion, PressureLevel, QualityLevel, TelemetrySignal};

use super::support::{harness, START_MS};

#[test]
fn reports_are_emitted_at_most_once_per_cooldown() {
    let h = harness();
    h.engine.tick_pressure();

    let first = h.engine.tick_diagnostics().unwrap();
    assert_eq!(first.timestamp_ms, START_MS);
    assert_eq!(first.pressure, PressureLevel::Normal);
    assert_eq!(first.usage_ratio, 0.5);
    assert_eq!(first.quality, QualityLevel::High);
    assert!(!first.quality_overridden);
    assert!(!first.thermal_emergency);
    assert!(first.failing_signals.is_empty());
    assert!(first.metrics.operation("monitor.pressure").is_some());

    assert!(h.engine.tick_diagnostics().is_none());
    h.clock.advance(Duration::from_secs(59));
    assert!(h.engine.tick_diagnostics().is_none());
    h.clock.advance(Duration::from_secs(1));
    assert!(h.engine.tick_diagnostics().is_some());
}

#[test]
fn failing_telemetry_is_reported_and_last_values_are_kept() {
    let h = harness();
    h.engine.tick_pressure();

    h.telemetry.set_resident_mb(900.0);
    h.telemetry.fail(TelemetrySignal::ResidentMemory);
    let sample = h.engine.tick_pressure();
    // The previous reading stands in for the failing signal.
    assert_eq!(sample.level, PressureLevel::Normal);

    let report = h.engine.diagnostics_report();
    assert_eq!(report.failing_signals, vec!["resident_memory".to_owned()]);
    assert_eq!(report.telemetry.resident_mb, 500.0);

    h.telemetry.restore(TelemetrySignal::ResidentMemory);
    h.engine.tick_pressure();
    assert!(h.engine.diagnostics_report().failing_signals.is_empty());
    assert_eq!(h.engine.pressure(), PressureLevel::Extreme);
}

#[test]
fn reports_serialize_with_camel_case_keys() {
    let h = harness();
    h.engine.tick_pressure();
    let value = serde_json::to_value(h.engine.diagnostics_report()).unwrap();

    assert_eq!(value["pressure"], "normal");
    assert_eq!(value["thermalEmergency"], false);
    assert_eq!(value["frameRate"]["effectiveFps"], 60);
    assert!(value["metrics"]["operations"]["cleanup.normal"].is_object());
}

#[test]
fn leak_monitor_reports_growth_and_tracked_objects() {
    let h = harness();
    let session = Arc::new(String::from("session"));
    h.engine.leak_detector().track(&session);

    assert!(h.engine.tick_leak().is_clean());
    h.clock.advance(Duration::from_secs(10));
    h.telemetry.set_resident_mb(510.0);

    let report = h.engine.tick_leak();
    assert!(matches!(
        report.suspicions.as_slice(),
        [LeakSuspicion::SustainedGrowth { snapshots: 2, .. }]
    ));
    assert_eq!(report.snapshot.tracked_object_count, 1);
    assert_eq!(h.engine.diagnostics_report().tracked_objects, 1);

    drop(session);
    h.clock.advance(Duration::from_secs(10));
    assert_eq!(h.engine.tick_leak().pruned_handles, 1);
    assert_eq!(h.engine.diagnostics_report().tracked_objects, 0);
}
