use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pressure::PressureLevel;
use crate::telemetry::{Telemetry, ThermalLevel};

/// Presentation quality, ordered from cheapest to richest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Minimal,
    Low,
    Medium,
    High,
    Ultra,
}

impl QualityLevel {
    pub const ALL: [QualityLevel; 5] = [
        QualityLevel::Minimal,
        QualityLevel::Low,
        QualityLevel::Medium,
        QualityLevel::High,
        QualityLevel::Ultra,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QualityLevel::Minimal => "minimal",
            QualityLevel::Low => "low",
            QualityLevel::Medium => "medium",
            QualityLevel::High => "high",
            QualityLevel::Ultra => "ultra",
        }
    }

    /// Level implied by the thermal state alone.
    pub fn for_thermal(thermal: ThermalLevel) -> Self {
        match thermal {
            ThermalLevel::Nominal => QualityLevel::High,
            ThermalLevel::Fair => QualityLevel::Medium,
            ThermalLevel::Serious => QualityLevel::Low,
            ThermalLevel::Critical => QualityLevel::Minimal,
        }
    }

    pub fn settings(self) -> &'static QualitySettings {
        match self {
            QualityLevel::Ultra => &ULTRA,
            QualityLevel::High => &HIGH,
            QualityLevel::Medium => &MEDIUM,
            QualityLevel::Low => &LOW,
            QualityLevel::Minimal => &MINIMAL,
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureQuality {
    Low,
    Medium,
    High,
}

/// Feature toggles and budgets the presentation layer applies for a [`QualityLevel`].
///
/// One immutable instance exists per level; use [`QualityLevel::settings`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySettings {
    pub enable_particles: bool,
    pub enable_background_animations: bool,
    pub max_fps: u32,
    pub enable_shadows: bool,
    /// `0.0..=1.0`
    pub particle_intensity: f32,
    /// `0.0..=1.0`
    pub animation_intensity: f32,
    pub texture_quality: TextureQuality,
}

impl QualitySettings {
    pub fn for_level(level: QualityLevel) -> &'static QualitySettings {
        level.settings()
    }
}

static ULTRA: QualitySettings = QualitySettings {
    enable_particles: true,
    enable_background_animations: true,
    max_fps: 120,
    enable_shadows: true,
    particle_intensity: 1.0,
    animation_intensity: 1.0,
    texture_quality: TextureQuality::High,
};

static HIGH: QualitySettings = QualitySettings {
    enable_particles: true,
    enable_background_animations: true,
    max_fps: 60,
    enable_shadows: true,
    particle_intensity: 0.8,
    animation_intensity: 0.9,
    texture_quality: TextureQuality::High,
};

static MEDIUM: QualitySettings = QualitySettings {
    enable_particles: true,
    enable_background_animations: true,
    max_fps: 60,
    enable_shadows: false,
    particle_intensity: 0.5,
    animation_intensity: 0.7,
    texture_quality: TextureQuality::Medium,
};

static LOW: QualitySettings = QualitySettings {
    enable_particles: true,
    enable_background_animations: false,
    max_fps: 30,
    enable_shadows: false,
    particle_intensity: 0.25,
    animation_intensity: 0.4,
    texture_quality: TextureQuality::Low,
};

static MINIMAL: QualitySettings = QualitySettings {
    enable_particles: false,
    enable_background_animations: false,
    max_fps: 30,
    enable_shadows: false,
    particle_intensity: 0.0,
    animation_intensity: 0.1,
    texture_quality: TextureQuality::Low,
};

/// Everything [`determine_level`] looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityInputs {
    pub pressure: PressureLevel,
    pub thermal: ThermalLevel,
    pub battery_fraction: f32,
    pub low_power: bool,
    pub low_end: bool,
}

impl QualityInputs {
    pub fn from_telemetry(telemetry: &Telemetry, pressure: PressureLevel, low_end: bool) -> Self {
        Self {
            pressure,
            thermal: telemetry.thermal,
            battery_fraction: telemetry.battery_fraction,
            low_power: telemetry.low_power,
            low_end,
        }
    }
}

/// Derive the quality level for `inputs`.
///
/// Starts from the thermal-implied level and only ever clamps downward: by battery, low-power
/// mode, device class and finally by pressure level. Never returns [`QualityLevel::Ultra`].
pub fn determine_level(inputs: &QualityInputs) -> QualityLevel {
    let mut level = QualityLevel::for_thermal(inputs.thermal);

    if inputs.battery_fraction < 0.10 {
        level = QualityLevel::Minimal;
    } else if inputs.battery_fraction < 0.20 {
        level = level.min(QualityLevel::Low);
    } else if inputs.battery_fraction < 0.30 {
        level = level.min(QualityLevel::Medium);
    }

    if inputs.low_power {
        level = level.min(QualityLevel::Low);
    }
    if inputs.low_end {
        level = level.min(QualityLevel::Medium);
    }

    match inputs.pressure {
        PressureLevel::Normal => level,
        PressureLevel::Warning => level.min(QualityLevel::Medium),
        PressureLevel::Critical => level.min(QualityLevel::Low),
        PressureLevel::Extreme => QualityLevel::Minimal,
    }
}
