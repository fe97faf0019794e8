//! Resource-pressure model for Ballast.
//!
//! This crate holds the pure, synchronous half of the engine:
//! - [`DeviceProfile`] describes what the device can afford.
//! - [`TelemetrySource`] is the contract a platform adapter implements; [`TelemetrySampler`]
//!   absorbs sensor failures into a complete [`Telemetry`] snapshot.
//! - [`PressureEvaluator`] turns telemetry into a [`PressureLevel`].
//! - [`determine_level`] and [`FrameRatePolicy`] derive the quality and frame-rate policy.
//! - [`LeakDetector`] observes memory growth and long-lived objects.
//! - [`ClearableResource`] is what caches and resource pools implement so cleanup tiers can
//!   flush them.
//!
//! Scheduling, caching and orchestration live in the `ballast-scheduler`, `ballast-cache` and
//! `ballast-engine` crates.

mod cgroup;
mod clearable;
mod device;
mod frame_rate;
mod leak;
mod pressure;
mod process;
mod quality;
mod simulation;
mod telemetry;

pub use cgroup::{parse_memory_limit, MemoryCgroup};
pub use clearable::{ClearFn, ClearKind, ClearOutcome, ClearRequest, ClearableResource, CleanupTier};
pub use device::{DeviceProfile, DeviceProfileProvider, HostDeviceProfile, LOW_END_MEMORY_CEILING_MB};
pub use frame_rate::{FrameRateInputs, FrameRatePolicy};
pub use leak::{LeakDetector, LeakDetectorConfig, LeakReport, LeakSuspicion, MemorySnapshot};
pub use pressure::{
    PressureCause, PressureEvaluator, PressureLevel, PressureSample, PressureThresholds,
    PressureTransition, DEFAULT_HYSTERESIS, LOW_END_THRESHOLD_SCALE,
};
pub use process::current_rss_bytes;
pub use quality::{determine_level, QualityInputs, QualityLevel, QualitySettings, TextureQuality};
pub use simulation::SimulatedTelemetry;
pub use telemetry::{
    HostTelemetry, MemoryPressureEvent, MemoryPressureSink, Telemetry, TelemetryError,
    TelemetrySampler, TelemetrySignal, TelemetrySource, ThermalLevel,
};

/// Bytes per mebibyte.
pub const MB: u64 = 1024 * 1024;
