use std::sync::{Arc, Mutex};

use ballast_engine::QualityChange;
use ballast_memory::{DeviceProfile, QualityLevel, TextureQuality, ThermalLevel};

use super::support::{harness, harness_with, quiet_config};

#[test]
fn observers_see_each_change_once() {
    let h = harness();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    h.engine
        .quality()
        .subscribe(Arc::new(move |change: &QualityChange| {
            sink.lock().unwrap().push(change.level)
        }));

    // Nominal conditions keep the default level.
    assert_eq!(h.engine.tick_quality(), None);

    h.telemetry.set_thermal(ThermalLevel::Serious);
    let change = h.engine.tick_quality().unwrap();
    assert_eq!(change.previous, QualityLevel::High);
    assert_eq!(change.level, QualityLevel::Low);
    assert_eq!(change.settings.texture_quality, TextureQuality::Low);
    assert_eq!(h.engine.tick_quality(), None);

    h.telemetry.set_thermal(ThermalLevel::Fair);
    h.engine.tick_quality();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![QualityLevel::Low, QualityLevel::Medium]
    );
}

#[test]
fn nearly_empty_battery_drops_to_minimal() {
    let h = harness();
    h.telemetry.set_battery_fraction(0.05);
    h.engine.tick_pressure();

    let change = h.engine.tick_quality().unwrap();
    assert_eq!(change.level, QualityLevel::Minimal);
    assert_eq!(h.engine.quality().settings(), QualityLevel::Minimal.settings());
}

#[test]
fn low_end_devices_are_capped_at_medium() {
    let h = harness_with(quiet_config(), DeviceProfile::new(1000.0, 60, true));
    h.engine.tick_pressure();
    assert_eq!(h.engine.tick_quality().unwrap().level, QualityLevel::Medium);
}

#[test]
fn configured_override_wins_until_cleared() {
    let mut config = quiet_config();
    config.quality.override_level = Some(QualityLevel::Ultra);
    let h = harness_with(config, DeviceProfile::new(1000.0, 60, false));
    assert_eq!(h.engine.quality().level(), QualityLevel::Ultra);

    h.telemetry.set_thermal(ThermalLevel::Critical);
    assert_eq!(h.engine.tick_quality(), None);
    assert_eq!(h.engine.quality().level(), QualityLevel::Ultra);
    assert!(h.engine.diagnostics_report().quality_overridden);

    let change = h.engine.set_quality_override(None).unwrap();
    assert_eq!(change.previous, QualityLevel::Ultra);
    assert_eq!(change.level, QualityLevel::Minimal);
}
