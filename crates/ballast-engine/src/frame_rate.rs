use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ballast_memory::{
    DeviceProfile, FrameRateInputs, FrameRatePolicy, PressureLevel, ThermalLevel,
};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRateSnapshot {
    pub target_fps: u32,
    /// Observed over the recent frame window; `0.0` before any frame was recorded.
    pub current_fps: f64,
    pub effective_fps: u32,
    pub recommended_fps: u32,
}

/// Tracks observed frame times and answers frame-rate queries for the renderer.
///
/// Recommendations are advisory; nothing here caps the render loop.
#[derive(Debug)]
pub struct FrameRateController {
    policy: FrameRatePolicy,
    profile: DeviceProfile,
    target: AtomicU32,
    inputs: Mutex<(PressureLevel, ThermalLevel)>,
    window: Mutex<FrameWindow>,
}

#[derive(Debug)]
struct FrameWindow {
    capacity: usize,
    frames: VecDeque<Duration>,
    total: Duration,
}

impl FrameRateController {
    pub fn new(
        policy: FrameRatePolicy,
        profile: DeviceProfile,
        target_fps: u32,
        window_frames: usize,
    ) -> Self {
        let capacity = window_frames.max(1);
        Self {
            policy,
            profile,
            target: AtomicU32::new(target_fps),
            inputs: Mutex::new((PressureLevel::Normal, ThermalLevel::Nominal)),
            window: Mutex::new(FrameWindow {
                capacity,
                frames: VecDeque::with_capacity(capacity),
                total: Duration::ZERO,
            }),
        }
    }

    pub fn policy(&self) -> &FrameRatePolicy {
        &self.policy
    }

    /// `0` means "as fast as the display allows".
    pub fn set_target(&self, target_fps: u32) {
        self.target.store(target_fps, Ordering::Relaxed);
    }

    pub fn target(&self) -> u32 {
        self.target.load(Ordering::Relaxed)
    }

    pub fn update(&self, pressure: PressureLevel, thermal: ThermalLevel) {
        *self.inputs.lock() = (pressure, thermal);
    }

    pub fn record_frame(&self, frame_time: Duration) {
        let mut window = self.window.lock();
        if window.frames.len() == window.capacity {
            if let Some(oldest) = window.frames.pop_front() {
                window.total = window.total.saturating_sub(oldest);
            }
        }
        window.frames.push_back(frame_time);
        window.total = window.total.saturating_add(frame_time);
    }

    pub fn current_fps(&self) -> f64 {
        let window = self.window.lock();
        let secs = window.total.as_secs_f64();
        if window.frames.is_empty() || secs <= 0.0 {
            return 0.0;
        }
        window.frames.len() as f64 / secs
    }

    pub fn effective_fps(&self) -> u32 {
        self.policy.effective_fps(self.inputs(), &self.profile)
    }

    pub fn recommended_fps(&self) -> u32 {
        self.policy.recommended_fps(self.inputs(), &self.profile)
    }

    pub fn snapshot(&self) -> FrameRateSnapshot {
        let inputs = self.inputs();
        FrameRateSnapshot {
            target_fps: inputs.target,
            current_fps: self.current_fps(),
            effective_fps: self.policy.effective_fps(inputs, &self.profile),
            recommended_fps: self.policy.recommended_fps(inputs, &self.profile),
        }
    }

    fn inputs(&self) -> FrameRateInputs {
        let (pressure, thermal) = *self.inputs.lock();
        FrameRateInputs {
            target: self.target(),
            pressure,
            throttle: thermal.throttle_factor(),
        }
    }
}
