use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ballast_memory::{
    MemoryPressureEvent, SimulatedTelemetry, Telemetry, TelemetrySampler, TelemetrySignal,
    TelemetrySource, ThermalLevel,
};

#[test]
fn failed_signals_keep_the_last_known_value() {
    let sim = Arc::new(SimulatedTelemetry::new(Telemetry {
        resident_mb: 300.0,
        thermal: ThermalLevel::Fair,
        battery_fraction: 0.5,
        low_power: true,
    }));
    let sampler = TelemetrySampler::new(sim.clone());
    assert_eq!(sampler.sample().resident_mb, 300.0);

    sim.fail(TelemetrySignal::ResidentMemory);
    sim.fail(TelemetrySignal::Thermal);
    sim.set_resident_mb(900.0);
    sim.set_thermal(ThermalLevel::Critical);

    let telemetry = sampler.sample();
    assert_eq!(telemetry.resident_mb, 300.0);
    assert_eq!(telemetry.thermal, ThermalLevel::Fair);
    assert_eq!(
        sampler.failing_signals(),
        vec![TelemetrySignal::ResidentMemory, TelemetrySignal::Thermal]
    );

    sim.restore(TelemetrySignal::ResidentMemory);
    sim.restore(TelemetrySignal::Thermal);
    let telemetry = sampler.sample();
    assert_eq!(telemetry.resident_mb, 900.0);
    assert_eq!(telemetry.thermal, ThermalLevel::Critical);
    assert!(sampler.failing_signals().is_empty());
}

#[test]
fn signals_that_never_succeeded_use_conservative_defaults() {
    let sim = Arc::new(SimulatedTelemetry::new(Telemetry {
        resident_mb: 10.0,
        thermal: ThermalLevel::Critical,
        battery_fraction: 0.01,
        low_power: true,
    }));
    for signal in [
        TelemetrySignal::Thermal,
        TelemetrySignal::Battery,
        TelemetrySignal::LowPower,
    ] {
        sim.fail(signal);
    }

    let telemetry = TelemetrySampler::new(sim).sample();
    assert_eq!(telemetry.resident_mb, 10.0);
    assert_eq!(telemetry.thermal, ThermalLevel::Nominal);
    assert_eq!(telemetry.battery_fraction, 1.0);
    assert!(!telemetry.low_power);
}

#[test]
fn invalid_readings_are_rejected_or_clamped() {
    let sim = Arc::new(SimulatedTelemetry::new(Telemetry {
        resident_mb: 50.0,
        battery_fraction: 0.4,
        ..Telemetry::default()
    }));
    let sampler = TelemetrySampler::new(sim.clone());
    sampler.sample();

    sim.set_resident_mb(f64::NAN);
    sim.set_battery_fraction(1.7);
    let telemetry = sampler.sample();
    assert_eq!(telemetry.resident_mb, 50.0);
    assert_eq!(telemetry.battery_fraction, 1.0);
}

#[test]
fn memory_pressure_events_reach_subscribers() {
    let sim = SimulatedTelemetry::default();
    let critical = Arc::new(AtomicUsize::new(0));
    sim.subscribe_memory_pressure({
        let critical = critical.clone();
        Arc::new(move |event| {
            if event == MemoryPressureEvent::Critical {
                critical.fetch_add(1, Ordering::SeqCst);
            }
        })
    });

    sim.emit_memory_pressure(MemoryPressureEvent::Warning);
    sim.emit_memory_pressure(MemoryPressureEvent::Critical);
    assert_eq!(critical.load(Ordering::SeqCst), 1);
}
