use std::sync::Arc;
use std::time::Duration;

use ballast_memory::{
    CleanupTier, ClearFn, ClearOutcome, ClearRequest, DeviceProfile, MemoryPressureEvent,
    PressureCause, PressureLevel,
};

use super::support::{harness, harness_with, quiet_config};

#[test]
fn normal_pressure_runs_routine_cleanup() {
    let h = harness();

    let sample = h.engine.tick_pressure();
    assert_eq!(sample.level, PressureLevel::Normal);
    assert_eq!(sample.ratio, 0.5);
    assert_eq!(h.cleared(), vec![CleanupTier::Normal]);

    // Second sample falls inside the normal cooldown.
    h.engine.tick_pressure();
    assert_eq!(h.cleared(), vec![CleanupTier::Normal]);
    let snapshot = h.engine.metrics().snapshot();
    assert_eq!(snapshot.operation("cleanup.normal").unwrap().skipped, 1);
    assert_eq!(snapshot.operation("monitor.pressure").unwrap().runs, 2);
}

#[test]
fn critical_memory_escalates_to_emergency_when_aggressive_is_not_enough() {
    let h = harness();
    h.telemetry.set_resident_mb(850.0);

    let sample = h.engine.tick_pressure();
    assert_eq!(sample.level, PressureLevel::Critical);
    assert_eq!(sample.cause, PressureCause::Memory);
    assert_eq!(
        h.cleared(),
        vec![CleanupTier::Aggressive, CleanupTier::Emergency]
    );
    assert_eq!(h.engine.pressure(), PressureLevel::Critical);
}

#[test]
fn aggressive_cleanup_that_frees_memory_does_not_escalate() {
    let h = harness();
    let sim = h.telemetry.clone();
    h.engine.register_clearable_for(
        Arc::new(ClearFn::new("textures", move |_: ClearRequest| {
            sim.set_resident_mb(400.0);
            ClearOutcome::new(1, 450 * 1024 * 1024)
        })),
        &[CleanupTier::Aggressive],
    );
    h.telemetry.set_resident_mb(850.0);

    h.engine.tick_pressure();
    assert_eq!(h.cleared(), vec![CleanupTier::Aggressive]);
}

#[test]
fn extreme_memory_goes_straight_to_emergency() {
    let h = harness();
    h.telemetry.set_resident_mb(950.0);

    let sample = h.engine.tick_pressure();
    assert_eq!(sample.level, PressureLevel::Extreme);
    assert_eq!(h.cleared(), vec![CleanupTier::Emergency]);
}

#[test]
fn sustained_critical_memory_is_bounded_by_cooldowns() {
    let h = harness();
    h.telemetry.set_resident_mb(850.0);

    h.engine.tick_pressure();
    h.engine.tick_pressure();
    assert_eq!(
        h.cleared(),
        vec![CleanupTier::Aggressive, CleanupTier::Emergency]
    );

    // Aggressive is due again, emergency is not.
    h.clock.advance(Duration::from_secs(31));
    h.engine.tick_pressure();
    assert_eq!(
        h.cleared(),
        vec![
            CleanupTier::Aggressive,
            CleanupTier::Emergency,
            CleanupTier::Aggressive
        ]
    );

    h.clock.advance(Duration::from_secs(30));
    h.engine.tick_pressure();
    assert_eq!(h.runs_of(CleanupTier::Emergency), 2);
}

#[test]
fn os_memory_events_map_to_tiers() {
    let h = harness();

    h.telemetry.emit_memory_pressure(MemoryPressureEvent::Warning);
    assert_eq!(h.cleared(), vec![CleanupTier::Aggressive]);

    h.telemetry.emit_memory_pressure(MemoryPressureEvent::Critical);
    assert_eq!(
        h.cleared(),
        vec![CleanupTier::Aggressive, CleanupTier::Emergency]
    );

    // Both tiers are cooling down now.
    h.telemetry.emit_memory_pressure(MemoryPressureEvent::Warning);
    h.telemetry.emit_memory_pressure(MemoryPressureEvent::Critical);
    assert_eq!(h.cleared().len(), 2);
}

#[test]
fn low_battery_forces_pressure_without_escalating_past_aggressive() {
    let h = harness();
    h.telemetry.set_battery_fraction(0.15);

    let sample = h.engine.tick_pressure();
    assert_eq!(sample.level, PressureLevel::Critical);
    assert_eq!(sample.cause, PressureCause::Battery);
    assert_eq!(sample.memory_level, PressureLevel::Normal);
    // Memory itself is fine, so the aggressive run is not followed by an emergency run.
    assert_eq!(h.cleared(), vec![CleanupTier::Aggressive]);
}

#[test]
fn low_end_devices_sit_at_warning() {
    let h = harness_with(quiet_config(), DeviceProfile::new(1000.0, 60, true));

    let sample = h.engine.tick_pressure();
    assert_eq!(sample.level, PressureLevel::Warning);
    assert_eq!(sample.cause, PressureCause::LowEndDevice);
    assert_eq!(h.cleared(), vec![CleanupTier::Normal]);
}

#[test]
fn pressure_drives_the_frame_rate_recommendation() {
    let h = harness();
    for _ in 0..10 {
        h.engine.frame_rate().record_frame(Duration::from_millis(20));
    }

    let relaxed = h.engine.tick_frame_rate();
    assert_eq!(relaxed.effective_fps, 60);
    assert_eq!(relaxed.recommended_fps, 60);
    assert!((relaxed.current_fps - 50.0).abs() < 1e-6);

    h.telemetry.set_resident_mb(850.0);
    h.engine.tick_pressure();
    let constrained = h.engine.tick_frame_rate();
    assert_eq!(constrained.effective_fps, 60);
    assert_eq!(constrained.recommended_fps, 30);
}
