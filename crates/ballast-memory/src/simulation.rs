use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::telemetry::{
    MemoryPressureEvent, MemoryPressureSink, Telemetry, TelemetryError, TelemetrySignal,
    TelemetrySource, ThermalLevel,
};

/// Deterministic, scriptable [`TelemetrySource`].
///
/// Values can be set directly, or queued as a script and stepped through with
/// [`SimulatedTelemetry::advance`]. Individual signals can be made to fail to exercise fallbacks,
/// and OS memory pressure events are delivered synchronously to subscribed sinks.
#[derive(Default)]
pub struct SimulatedTelemetry {
    state: Mutex<SimulationState>,
    sinks: Mutex<Vec<MemoryPressureSink>>,
}

#[derive(Debug, Default)]
struct SimulationState {
    current: Telemetry,
    script: VecDeque<Telemetry>,
    failing: HashSet<TelemetrySignal>,
}

impl SimulatedTelemetry {
    pub fn new(initial: Telemetry) -> Self {
        Self {
            state: Mutex::new(SimulationState {
                current: initial,
                ..SimulationState::default()
            }),
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// Start at the first step of `steps`; the rest are queued for [`SimulatedTelemetry::advance`].
    pub fn scripted(steps: impl IntoIterator<Item = Telemetry>) -> Self {
        let sim = Self::default();
        sim.push_steps(steps);
        sim.advance();
        sim
    }

    pub fn push_steps(&self, steps: impl IntoIterator<Item = Telemetry>) {
        self.state.lock().script.extend(steps);
    }

    /// Move to the next scripted step. Returns `false` when the script is exhausted, in which
    /// case the current values are kept.
    pub fn advance(&self) -> bool {
        let mut state = self.state.lock();
        match state.script.pop_front() {
            Some(next) => {
                state.current = next;
                true
            }
            None => false,
        }
    }

    pub fn remaining_steps(&self) -> usize {
        self.state.lock().script.len()
    }

    pub fn current(&self) -> Telemetry {
        self.state.lock().current
    }

    pub fn set(&self, telemetry: Telemetry) {
        self.state.lock().current = telemetry;
    }

    pub fn set_resident_mb(&self, resident_mb: f64) {
        self.state.lock().current.resident_mb = resident_mb;
    }

    pub fn set_thermal(&self, thermal: ThermalLevel) {
        self.state.lock().current.thermal = thermal;
    }

    pub fn set_battery_fraction(&self, battery_fraction: f32) {
        self.state.lock().current.battery_fraction = battery_fraction;
    }

    pub fn set_low_power(&self, low_power: bool) {
        self.state.lock().current.low_power = low_power;
    }

    pub fn fail(&self, signal: TelemetrySignal) {
        self.state.lock().failing.insert(signal);
    }

    pub fn restore(&self, signal: TelemetrySignal) {
        self.state.lock().failing.remove(&signal);
    }

    /// Deliver an OS memory pressure event to every subscribed sink.
    pub fn emit_memory_pressure(&self, event: MemoryPressureEvent) {
        let sinks = self.sinks.lock().clone();
        for sink in sinks {
            sink(event);
        }
    }

    fn read<T>(
        &self,
        signal: TelemetrySignal,
        f: impl FnOnce(&Telemetry) -> T,
    ) -> Result<T, TelemetryError> {
        let state = self.state.lock();
        if state.failing.contains(&signal) {
            return Err(TelemetryError::unavailable(signal));
        }
        Ok(f(&state.current))
    }
}

impl TelemetrySource for SimulatedTelemetry {
    fn resident_memory_mb(&self) -> Result<f64, TelemetryError> {
        self.read(TelemetrySignal::ResidentMemory, |t| t.resident_mb)
    }

    fn thermal_level(&self) -> Result<ThermalLevel, TelemetryError> {
        self.read(TelemetrySignal::Thermal, |t| t.thermal)
    }

    fn battery_fraction(&self) -> Result<f32, TelemetryError> {
        self.read(TelemetrySignal::Battery, |t| t.battery_fraction)
    }

    fn is_low_power_mode(&self) -> Result<bool, TelemetryError> {
        self.read(TelemetrySignal::LowPower, |t| t.low_power)
    }

    fn subscribe_memory_pressure(&self, sink: MemoryPressureSink) {
        self.sinks.lock().push(sink);
    }
}

impl std::fmt::Debug for SimulatedTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedTelemetry")
            .field("state", &*self.state.lock())
            .field("sinks", &self.sinks.lock().len())
            .finish()
    }
}
