use serde::{Deserialize, Serialize};

use crate::cgroup;
use crate::MB;

/// Devices whose memory ceiling is at or below this value are treated as low-end.
pub const LOW_END_MEMORY_CEILING_MB: f64 = 3.0 * 1024.0;

// Used when a provider reports a nonsensical ceiling.
const FALLBACK_MEMORY_CEILING_MB: f64 = 1024.0;
const FALLBACK_REFRESH_RATE_HZ: u32 = 60;

/// Capability provider implemented by the platform adapter.
pub trait DeviceProfileProvider: Send + Sync {
    /// Memory the process may use before the OS starts reclaiming it, in MB.
    fn memory_ceiling_mb(&self) -> f64;
    fn max_refresh_rate_hz(&self) -> u32;
    fn is_low_end_class(&self) -> bool;
}

/// Immutable description of what the device can afford.
///
/// Built once at startup (from a [`DeviceProfileProvider`] or a simulation override) and shared
/// by value afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    memory_ceiling_mb: f64,
    max_refresh_rate_hz: u32,
    is_low_end: bool,
}

impl DeviceProfile {
    /// Invalid values (non-finite or non-positive ceiling, zero refresh rate) are replaced by
    /// conservative fallbacks.
    pub fn new(memory_ceiling_mb: f64, max_refresh_rate_hz: u32, is_low_end: bool) -> Self {
        let memory_ceiling_mb = if memory_ceiling_mb.is_finite() && memory_ceiling_mb > 0.0 {
            memory_ceiling_mb
        } else {
            tracing::warn!(
                target = "ballast.memory",
                memory_ceiling_mb,
                fallback_mb = FALLBACK_MEMORY_CEILING_MB,
                "invalid device memory ceiling; using fallback"
            );
            FALLBACK_MEMORY_CEILING_MB
        };
        let max_refresh_rate_hz = if max_refresh_rate_hz == 0 {
            FALLBACK_REFRESH_RATE_HZ
        } else {
            max_refresh_rate_hz
        };

        Self {
            memory_ceiling_mb,
            max_refresh_rate_hz,
            is_low_end,
        }
    }

    pub fn from_provider(provider: &dyn DeviceProfileProvider) -> Self {
        Self::new(
            provider.memory_ceiling_mb(),
            provider.max_refresh_rate_hz(),
            provider.is_low_end_class(),
        )
    }

    pub fn memory_ceiling_mb(&self) -> f64 {
        self.memory_ceiling_mb
    }

    pub fn max_refresh_rate_hz(&self) -> u32 {
        self.max_refresh_rate_hz
    }

    pub fn is_low_end(&self) -> bool {
        self.is_low_end
    }
}

impl DeviceProfileProvider for DeviceProfile {
    fn memory_ceiling_mb(&self) -> f64 {
        self.memory_ceiling_mb
    }

    fn max_refresh_rate_hz(&self) -> u32 {
        self.max_refresh_rate_hz
    }

    fn is_low_end_class(&self) -> bool {
        self.is_low_end
    }
}

/// Detects the profile of the machine the process runs on.
///
/// The memory ceiling is total physical memory, tightened by a cgroup limit when one applies.
/// Desktop hosts do not expose a reliable display refresh rate, so it is supplied by the caller.
#[derive(Debug, Clone)]
pub struct HostDeviceProfile {
    memory_ceiling_mb: f64,
    max_refresh_rate_hz: u32,
    low_end_ceiling_mb: f64,
}

impl HostDeviceProfile {
    pub fn detect() -> Self {
        Self::detect_with(FALLBACK_REFRESH_RATE_HZ, LOW_END_MEMORY_CEILING_MB)
    }

    pub fn detect_with(max_refresh_rate_hz: u32, low_end_ceiling_mb: f64) -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        let total = system.total_memory();
        let total = (total > 0).then_some(total);

        let ceiling_bytes = match (total, cgroup::cgroup_memory_limit_bytes()) {
            (Some(total), Some(limit)) => Some(total.min(limit)),
            (total, limit) => total.or(limit),
        };

        let memory_ceiling_mb = match ceiling_bytes {
            Some(bytes) => bytes as f64 / MB as f64,
            None => {
                tracing::warn!(
                    target = "ballast.memory",
                    fallback_mb = FALLBACK_MEMORY_CEILING_MB,
                    "unable to detect host memory; using fallback ceiling"
                );
                FALLBACK_MEMORY_CEILING_MB
            }
        };

        tracing::debug!(
            target = "ballast.memory",
            memory_ceiling_mb,
            max_refresh_rate_hz,
            "detected host device profile"
        );

        Self {
            memory_ceiling_mb,
            max_refresh_rate_hz,
            low_end_ceiling_mb,
        }
    }

    pub fn profile(&self) -> DeviceProfile {
        DeviceProfile::from_provider(self)
    }
}

impl DeviceProfileProvider for HostDeviceProfile {
    fn memory_ceiling_mb(&self) -> f64 {
        self.memory_ceiling_mb
    }

    fn max_refresh_rate_hz(&self) -> u32 {
        self.max_refresh_rate_hz
    }

    fn is_low_end_class(&self) -> bool {
        self.memory_ceiling_mb <= self.low_end_ceiling_mb
    }
}
