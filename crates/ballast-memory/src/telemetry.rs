use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::process;
use crate::MB;

/// Platform thermal state, ordered from coolest to hottest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalLevel {
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl ThermalLevel {
    /// Fraction of performance the platform is expected to be shedding at this level.
    pub fn throttle_factor(self) -> f32 {
        match self {
            ThermalLevel::Nominal => 0.0,
            ThermalLevel::Fair => 0.3,
            ThermalLevel::Serious => 0.7,
            ThermalLevel::Critical => 1.0,
        }
    }

    pub fn is_serious_or_worse(self) -> bool {
        self >= ThermalLevel::Serious
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThermalLevel::Nominal => "nominal",
            ThermalLevel::Fair => "fair",
            ThermalLevel::Serious => "serious",
            ThermalLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for ThermalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Memory warning pushed by the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressureEvent {
    Warning,
    Critical,
}

/// Receiver for push-style memory pressure events.
pub type MemoryPressureSink = Arc<dyn Fn(MemoryPressureEvent) + Send + Sync>;

/// One complete telemetry reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub resident_mb: f64,
    pub thermal: ThermalLevel,
    /// Remaining battery in `0.0..=1.0`.
    pub battery_fraction: f32,
    pub low_power: bool,
}

impl Default for Telemetry {
    /// The fallback used for signals that have never been read successfully.
    fn default() -> Self {
        Self {
            resident_mb: 0.0,
            thermal: ThermalLevel::Nominal,
            battery_fraction: 1.0,
            low_power: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetrySignal {
    ResidentMemory,
    Thermal,
    Battery,
    LowPower,
}

impl TelemetrySignal {
    const ALL: [TelemetrySignal; 4] = [
        TelemetrySignal::ResidentMemory,
        TelemetrySignal::Thermal,
        TelemetrySignal::Battery,
        TelemetrySignal::LowPower,
    ];

    fn index(self) -> usize {
        match self {
            TelemetrySignal::ResidentMemory => 0,
            TelemetrySignal::Thermal => 1,
            TelemetrySignal::Battery => 2,
            TelemetrySignal::LowPower => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TelemetrySignal::ResidentMemory => "resident_memory",
            TelemetrySignal::Thermal => "thermal",
            TelemetrySignal::Battery => "battery",
            TelemetrySignal::LowPower => "low_power",
        }
    }
}

impl fmt::Display for TelemetrySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TelemetryError {
    #[error("{signal} telemetry is unavailable")]
    Unavailable { signal: TelemetrySignal },
}

impl TelemetryError {
    pub fn unavailable(signal: TelemetrySignal) -> Self {
        TelemetryError::Unavailable { signal }
    }
}

/// Sensor contract implemented by the platform adapter.
///
/// Reads may fail; [`TelemetrySampler`] turns failures into fallback values.
pub trait TelemetrySource: Send + Sync {
    fn resident_memory_mb(&self) -> Result<f64, TelemetryError>;
    fn thermal_level(&self) -> Result<ThermalLevel, TelemetryError>;
    fn battery_fraction(&self) -> Result<f32, TelemetryError>;
    fn is_low_power_mode(&self) -> Result<bool, TelemetryError>;

    /// Register the receiver for OS memory pressure events.
    ///
    /// Sources without a push channel keep the default, which drops the sink.
    fn subscribe_memory_pressure(&self, sink: MemoryPressureSink) {
        let _ = sink;
    }
}

/// Reads every signal from a [`TelemetrySource`] and never fails.
///
/// A failed or invalid read falls back to the last successfully read value, or to
/// [`Telemetry::default`] when there is none. Each outage is logged once when it starts and once
/// when the signal recovers.
pub struct TelemetrySampler {
    source: Arc<dyn TelemetrySource>,
    last: Mutex<Telemetry>,
    failing: [AtomicBool; 4],
}

impl TelemetrySampler {
    pub fn new(source: Arc<dyn TelemetrySource>) -> Self {
        Self {
            source,
            last: Mutex::new(Telemetry::default()),
            failing: Default::default(),
        }
    }

    pub fn source(&self) -> &Arc<dyn TelemetrySource> {
        &self.source
    }

    /// Last value returned by [`TelemetrySampler::sample`].
    pub fn last(&self) -> Telemetry {
        *self.last.lock()
    }

    pub fn sample(&self) -> Telemetry {
        let resident = self
            .source
            .resident_memory_mb()
            .and_then(|mb| valid(mb.is_finite() && mb >= 0.0, mb, TelemetrySignal::ResidentMemory));
        let thermal = self.source.thermal_level();
        let battery = self.source.battery_fraction().and_then(|fraction| {
            valid(
                fraction.is_finite(),
                fraction.clamp(0.0, 1.0),
                TelemetrySignal::Battery,
            )
        });
        let low_power = self.source.is_low_power_mode();

        let mut last = self.last.lock();
        let next = Telemetry {
            resident_mb: self.absorb(TelemetrySignal::ResidentMemory, resident, last.resident_mb),
            thermal: self.absorb(TelemetrySignal::Thermal, thermal, last.thermal),
            battery_fraction: self.absorb(TelemetrySignal::Battery, battery, last.battery_fraction),
            low_power: self.absorb(TelemetrySignal::LowPower, low_power, last.low_power),
        };
        *last = next;
        next
    }

    /// Signals currently served from fallback values.
    pub fn failing_signals(&self) -> Vec<TelemetrySignal> {
        TelemetrySignal::ALL
            .into_iter()
            .filter(|signal| self.failing[signal.index()].load(Ordering::Relaxed))
            .collect()
    }

    fn absorb<T: Copy + fmt::Debug>(
        &self,
        signal: TelemetrySignal,
        read: Result<T, TelemetryError>,
        fallback: T,
    ) -> T {
        let failing = &self.failing[signal.index()];
        match read {
            Ok(value) => {
                if failing.swap(false, Ordering::Relaxed) {
                    tracing::info!(target = "ballast.memory", %signal, "telemetry signal recovered");
                }
                value
            }
            Err(err) => {
                if !failing.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        target = "ballast.memory",
                        %signal,
                        error = %err,
                        fallback = ?fallback,
                        "telemetry signal unavailable; using fallback"
                    );
                }
                fallback
            }
        }
    }
}

impl fmt::Debug for TelemetrySampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetrySampler")
            .field("last", &self.last())
            .field("failing", &self.failing_signals())
            .finish()
    }
}

fn valid<T>(ok: bool, value: T, signal: TelemetrySignal) -> Result<T, TelemetryError> {
    if ok {
        Ok(value)
    } else {
        Err(TelemetryError::unavailable(signal))
    }
}

/// Telemetry for desktop and server hosts.
///
/// Resident memory comes from the process RSS. Hosts expose no thermal, battery or low-power
/// signal, so those always report [`TelemetryError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct HostTelemetry;

impl TelemetrySource for HostTelemetry {
    fn resident_memory_mb(&self) -> Result<f64, TelemetryError> {
        process::current_rss_bytes()
            .map(|bytes| bytes as f64 / MB as f64)
            .ok_or(TelemetryError::unavailable(TelemetrySignal::ResidentMemory))
    }

    fn thermal_level(&self) -> Result<ThermalLevel, TelemetryError> {
        Err(TelemetryError::unavailable(TelemetrySignal::Thermal))
    }

    fn battery_fraction(&self) -> Result<f32, TelemetryError> {
        Err(TelemetryError::unavailable(TelemetrySignal::Battery))
    }

    fn is_low_power_mode(&self) -> Result<bool, TelemetryError> {
        Err(TelemetryError::unavailable(TelemetrySignal::LowPower))
    }
}
