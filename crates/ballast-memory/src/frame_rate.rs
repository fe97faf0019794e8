use serde::{Deserialize, Serialize};

use crate::device::DeviceProfile;
use crate::pressure::PressureLevel;

/// Inputs to [`FrameRatePolicy::effective_fps`] and [`FrameRatePolicy::recommended_fps`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRateInputs {
    /// Requested frame rate; `0` means "unlimited" (the display's maximum).
    pub target: u32,
    pub pressure: PressureLevel,
    /// `0.0..=1.0`, see [`crate::ThermalLevel::throttle_factor`].
    pub throttle: f32,
}

/// Frame-rate math. Pure: the controller in `ballast-engine` owns the state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameRatePolicy {
    /// Throttle factor at or above which the frame rate is reduced.
    pub throttle_threshold: f32,
    pub reduction_factor: f32,
    pub low_end_reduction_factor: f32,
    /// Recommended under `Critical`+ pressure or heavy throttling.
    pub constrained_fps: u32,
    /// Recommended under `Warning` pressure.
    pub moderate_fps: u32,
}

impl Default for FrameRatePolicy {
    fn default() -> Self {
        Self {
            throttle_threshold: 0.7,
            reduction_factor: 0.75,
            low_end_reduction_factor: 0.5,
            constrained_fps: 30,
            moderate_fps: 60,
        }
    }
}

impl FrameRatePolicy {
    /// The frame rate the renderer should aim for after thermal throttling.
    ///
    /// Always at least 1.
    pub fn effective_fps(&self, inputs: FrameRateInputs, profile: &DeviceProfile) -> u32 {
        let target = if inputs.target == 0 {
            profile.max_refresh_rate_hz()
        } else {
            inputs.target
        };

        if !self.is_throttled(inputs.throttle) {
            return target.max(1);
        }

        let factor = if profile.is_low_end() {
            self.low_end_reduction_factor
        } else {
            self.reduction_factor
        };
        let reduced = (target as f64 * factor.clamp(0.0, 1.0) as f64).floor() as u32;
        reduced.max(1)
    }

    /// Advisory frame rate; never above [`FrameRatePolicy::effective_fps`].
    pub fn recommended_fps(&self, inputs: FrameRateInputs, profile: &DeviceProfile) -> u32 {
        let effective = self.effective_fps(inputs, profile);
        let recommended = if inputs.pressure.is_critical_or_worse() || self.is_throttled(inputs.throttle)
        {
            self.constrained_fps
        } else if inputs.pressure == PressureLevel::Warning {
            self.moderate_fps
        } else {
            effective
        };
        recommended.min(effective).max(1)
    }

    fn is_throttled(&self, throttle: f32) -> bool {
        throttle.is_finite() && throttle >= self.throttle_threshold
    }
}
