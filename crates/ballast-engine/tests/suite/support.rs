use std::sync::{Arc, Mutex};

use ballast_config::BallastConfig;
use ballast_core::ManualClock;
use ballast_engine::Engine;
use ballast_memory::{
    CleanupTier, ClearFn, ClearOutcome, ClearRequest, DeviceProfile, SimulatedTelemetry,
    Telemetry, ThermalLevel,
};
use ballast_scheduler::Scheduler;

pub const START_MS: u64 = 1_700_000_000_000;

/// Every periodic monitor fires once an hour at most, so tests drive ticks by hand.
pub fn quiet_config() -> BallastConfig {
    let mut config = BallastConfig::default();
    config.pressure.sample_interval_ms = 3_600_000;
    config.quality.reevaluate_interval_ms = 3_600_000;
    config.frame_rate.bookkeeping_interval_ms = 3_600_000;
    config.disk_cache.gc_interval_secs = 3_600;
    config.leak.interval_secs = 3_600;
    config.cleanup.self_check_interval_secs = 3_600;
    config
}

pub fn telemetry(resident_mb: f64) -> Telemetry {
    Telemetry {
        resident_mb,
        thermal: ThermalLevel::Nominal,
        battery_fraction: 1.0,
        low_power: false,
    }
}

pub struct Harness {
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    pub telemetry: Arc<SimulatedTelemetry>,
    cleared: Arc<Mutex<Vec<CleanupTier>>>,
}

impl Harness {
    /// Tiers that reached the recorder, one entry per run.
    pub fn cleared(&self) -> Vec<CleanupTier> {
        self.cleared.lock().unwrap().clone()
    }

    pub fn runs_of(&self, tier: CleanupTier) -> usize {
        self.cleared().iter().filter(|&&t| t == tier).count()
    }
}

pub fn harness() -> Harness {
    harness_with(quiet_config(), DeviceProfile::new(1000.0, 60, false))
}

/// Inline scheduler, manual clock at [`START_MS`], simulated telemetry at 500 MB resident and a
/// recorder registered for every tier.
pub fn harness_with(config: BallastConfig, profile: DeviceProfile) -> Harness {
    let clock = Arc::new(ManualClock::new(START_MS));
    let sim = Arc::new(SimulatedTelemetry::new(telemetry(500.0)));
    let engine = Engine::builder(config)
        .telemetry(sim.clone())
        .clock(clock.clone())
        .scheduler(Scheduler::inline())
        .device_profile(profile)
        .build();

    let cleared = Arc::new(Mutex::new(Vec::new()));
    let sink = cleared.clone();
    engine.register_clearable(Arc::new(ClearFn::new(
        "recorder",
        move |request: ClearRequest| {
            if request.pass == 0 {
                sink.lock().unwrap().push(request.tier);
            }
            ClearOutcome::new(1, 1024)
        },
    )));

    Harness {
        engine,
        clock,
        telemetry: sim,
        cleared,
    }
}
