use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::DeviceProfile;
use crate::telemetry::Telemetry;

/// Coarse-grained resource pressure, ordered from calm to most strained.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    #[default]
    Normal,
    Warning,
    Critical,
    Extreme,
}

impl PressureLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            PressureLevel::Normal => "normal",
            PressureLevel::Warning => "warning",
            PressureLevel::Critical => "critical",
            PressureLevel::Extreme => "extreme",
        }
    }

    /// `Critical` or `Extreme`.
    pub fn is_critical_or_worse(self) -> bool {
        self >= PressureLevel::Critical
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multiplier applied to every threshold on low-end devices, so they react earlier.
pub const LOW_END_THRESHOLD_SCALE: f64 = 0.85;

/// Band (as a fraction of the memory ceiling) the usage ratio must drop below a threshold before
/// the memory component de-escalates.
pub const DEFAULT_HYSTERESIS: f64 = 0.03;

/// Memory usage thresholds, as fractions of the device memory ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureThresholds {
    /// Enter `Warning` when `resident / ceiling >= warning`.
    pub warning: f64,
    /// Enter `Critical` when `resident / ceiling >= critical`.
    pub critical: f64,
    /// Enter `Extreme` when `resident / ceiling >= extreme`.
    pub extreme: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            warning: 0.65,
            critical: 0.80,
            extreme: 0.90,
        }
    }
}

impl PressureThresholds {
    pub fn for_device(profile: &DeviceProfile) -> Self {
        Self::default().scaled_for(profile)
    }

    /// Scale these base thresholds for `profile`.
    pub fn scaled_for(self, profile: &DeviceProfile) -> Self {
        if !profile.is_low_end() {
            return self;
        }
        Self {
            warning: self.warning * LOW_END_THRESHOLD_SCALE,
            critical: self.critical * LOW_END_THRESHOLD_SCALE,
            extreme: self.extreme * LOW_END_THRESHOLD_SCALE,
        }
    }

    pub fn level_for_ratio(self, ratio: f64) -> PressureLevel {
        if ratio >= self.extreme {
            PressureLevel::Extreme
        } else if ratio >= self.critical {
            PressureLevel::Critical
        } else if ratio >= self.warning {
            PressureLevel::Warning
        } else {
            PressureLevel::Normal
        }
    }

    /// Whether the thresholds are in `(0, 1]` and strictly increasing.
    pub fn is_well_formed(self) -> bool {
        0.0 < self.warning
            && self.warning < self.critical
            && self.critical < self.extreme
            && self.extreme <= 1.0
    }
}

/// The rule that produced a sample's level. When several rules agree on the level, memory wins,
/// then battery, then low-power mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureCause {
    Memory,
    Battery,
    LowPowerMode,
    LowEndDevice,
}

/// A change between two consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureTransition {
    pub from: PressureLevel,
    pub to: PressureLevel,
}

impl PressureTransition {
    pub fn is_escalation(&self) -> bool {
        self.to > self.from
    }
}

/// Result of [`PressureEvaluator::sample`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureSample {
    /// Most restrictive level across all rules.
    pub level: PressureLevel,
    /// Level implied by memory usage alone (after hysteresis).
    pub memory_level: PressureLevel,
    /// `resident / ceiling`.
    pub ratio: f64,
    pub cause: PressureCause,
    /// Level of the immediately preceding sample.
    pub previous: PressureLevel,
}

impl PressureSample {
    pub fn transition(&self) -> Option<PressureTransition> {
        (self.previous != self.level).then_some(PressureTransition {
            from: self.previous,
            to: self.level,
        })
    }
}

/// Converts telemetry into a [`PressureLevel`].
///
/// Classification ([`PressureEvaluator::classify`]) is a pure function of telemetry, the device
/// profile and the thresholds. [`PressureEvaluator::sample`] additionally remembers the previous
/// level to report transitions, and applies a de-escalation hysteresis band to the memory
/// component so usage hovering around a threshold does not flap.
#[derive(Debug, Clone)]
pub struct PressureEvaluator {
    profile: DeviceProfile,
    thresholds: PressureThresholds,
    hysteresis: f64,
    previous: PressureLevel,
    previous_memory: PressureLevel,
}

impl PressureEvaluator {
    pub fn new(profile: DeviceProfile) -> Self {
        Self::with_thresholds(profile, PressureThresholds::for_device(&profile))
    }

    /// `thresholds` are used as-is (they are expected to be scaled for the device already).
    pub fn with_thresholds(profile: DeviceProfile, thresholds: PressureThresholds) -> Self {
        Self {
            profile,
            thresholds,
            hysteresis: DEFAULT_HYSTERESIS,
            previous: PressureLevel::Normal,
            previous_memory: PressureLevel::Normal,
        }
    }

    pub fn with_hysteresis(mut self, hysteresis: f64) -> Self {
        self.hysteresis = if hysteresis.is_finite() {
            hysteresis.max(0.0)
        } else {
            0.0
        };
        self
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn thresholds(&self) -> PressureThresholds {
        self.thresholds
    }

    /// Level of the most recent sample.
    pub fn current(&self) -> PressureLevel {
        self.previous
    }

    pub fn usage_ratio(&self, telemetry: &Telemetry) -> f64 {
        let ratio = telemetry.resident_mb / self.profile.memory_ceiling_mb();
        if ratio.is_finite() {
            ratio.max(0.0)
        } else {
            0.0
        }
    }

    /// Level implied by memory usage alone, without hysteresis.
    pub fn memory_level(&self, telemetry: &Telemetry) -> PressureLevel {
        self.thresholds.level_for_ratio(self.usage_ratio(telemetry))
    }

    /// Stateless classification: the most restrictive of all rules.
    pub fn classify(&self, telemetry: &Telemetry) -> PressureLevel {
        let memory = self.memory_level(telemetry);
        let (forced, _) = self.forced_level(telemetry);
        memory.max(forced)
    }

    /// Classify `telemetry` relative to the previous sample.
    pub fn sample(&mut self, telemetry: &Telemetry) -> PressureSample {
        let ratio = self.usage_ratio(telemetry);
        let raw_memory = self.thresholds.level_for_ratio(ratio);
        let memory_level = if raw_memory < self.previous_memory {
            // Escalation is immediate; de-escalation waits until usage clears the band.
            self.thresholds
                .level_for_ratio(ratio + self.hysteresis)
                .min(self.previous_memory)
        } else {
            raw_memory
        };

        let (forced, forced_cause) = self.forced_level(telemetry);
        let (level, cause) = match forced_cause {
            Some(cause) if forced > memory_level => (forced, cause),
            _ => (memory_level, PressureCause::Memory),
        };

        let sample = PressureSample {
            level,
            memory_level,
            ratio,
            cause,
            previous: self.previous,
        };

        if let Some(transition) = sample.transition() {
            tracing::info!(
                target = "ballast.memory",
                from = %transition.from,
                to = %transition.to,
                ratio,
                cause = ?cause,
                "pressure level changed"
            );
        }

        self.previous = level;
        self.previous_memory = memory_level;
        sample
    }

    /// Non-memory rules, combined by taking the most restrictive.
    fn forced_level(&self, telemetry: &Telemetry) -> (PressureLevel, Option<PressureCause>) {
        let mut level = PressureLevel::Normal;
        let mut cause = None;
        let mut apply = |candidate: PressureLevel, candidate_cause: PressureCause| {
            if candidate > level {
                level = candidate;
                cause = Some(candidate_cause);
            }
        };

        if telemetry.battery_fraction < 0.10 {
            apply(PressureLevel::Extreme, PressureCause::Battery);
        } else if telemetry.battery_fraction < 0.20 {
            apply(PressureLevel::Critical, PressureCause::Battery);
        }
        if telemetry.low_power {
            apply(PressureLevel::Critical, PressureCause::LowPowerMode);
        }
        if self.profile.is_low_end() {
            apply(PressureLevel::Warning, PressureCause::LowEndDevice);
        }

        (level, cause)
    }
}
