//! Configuration for Ballast.
//!
//! [`BallastConfig`] is loaded from TOML. Every field has a default, so an empty file is a valid
//! config. Each section converts into the runtime type it configures (see
//! [`PressureConfig::thresholds`], [`DeviceConfig::profile`], [`MemoryCacheConfig::bounded_config`]
//! and friends).

mod byte_size;
mod diagnostics;
mod logging;
mod schema;
mod validation;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ballast_cache::{BoundedCacheConfig, PersistentCacheConfig};
use ballast_memory::{
    DeviceProfile, FrameRatePolicy, HostDeviceProfile, LeakDetectorConfig, PressureEvaluator,
    PressureThresholds, QualityLevel, DEFAULT_HYSTERESIS, LOW_END_MEMORY_CEILING_MB,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use byte_size::{parse_byte_size, ByteSize, ByteSizeError};
pub use diagnostics::{
    ConfigDiagnostics, ConfigValidationError, ConfigWarning, ValidationDiagnostics,
};
pub use logging::{init_tracing, LoggingConfig};
pub use schema::json_schema;

/// Conventional file name for a Ballast config.
pub const CONFIG_FILE_NAME: &str = "ballast.toml";

/// Upper bound on the number of repeated passes a cleanup tier may run.
pub const MAX_CLEANUP_PASSES: u32 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(deny_unknown_fields)]
pub struct BallastConfig {
    pub logging: LoggingConfig,
    pub device: DeviceConfig,
    pub pressure: PressureConfig,
    pub memory_cache: MemoryCacheConfig,
    pub disk_cache: DiskCacheConfig,
    pub cleanup: CleanupConfig,
    pub quality: QualityConfig,
    pub frame_rate: FrameRateConfig,
    pub leak: LeakConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// Overrides for the detected device profile.
///
/// Setting `memory_ceiling` replaces host detection entirely, which is how simulations pin a
/// device class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(deny_unknown_fields)]
pub struct DeviceConfig {
    pub memory_ceiling: Option<ByteSize>,
    #[schemars(range(min = 1))]
    pub max_refresh_rate_hz: u32,
    /// Force the low-end classification on or off.
    pub low_end: Option<bool>,
    /// Devices with a ceiling at or below this are low-end unless `low_end` says otherwise.
    pub low_end_ceiling: ByteSize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            memory_ceiling: None,
            max_refresh_rate_hz: 60,
            low_end: None,
            low_end_ceiling: ByteSize::mib(LOW_END_MEMORY_CEILING_MB as u64),
        }
    }
}

impl DeviceConfig {
    pub fn is_override(&self) -> bool {
        self.memory_ceiling.is_some()
    }

    /// The device profile: the configured override, or the detected host.
    pub fn profile(&self) -> DeviceProfile {
        let low_end_ceiling_mb = self.low_end_ceiling.as_mb();
        match self.memory_ceiling {
            Some(ceiling) => {
                let ceiling_mb = ceiling.as_mb();
                DeviceProfile::new(
                    ceiling_mb,
                    self.max_refresh_rate_hz,
                    self.low_end.unwrap_or(ceiling_mb <= low_end_ceiling_mb),
                )
            }
            None => {
                let host =
                    HostDeviceProfile::detect_with(self.max_refresh_rate_hz, low_end_ceiling_mb)
                        .profile();
                match self.low_end {
                    Some(low_end) => DeviceProfile::new(
                        host.memory_ceiling_mb(),
                        host.max_refresh_rate_hz(),
                        low_end,
                    ),
                    None => host,
                }
            }
        }
    }
}

/// Base memory thresholds as fractions of the device memory ceiling. Low-end devices scale them
/// down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(deny_unknown_fields)]
pub struct PressureConfig {
    #[schemars(range(min = 0.0, max = 1.0))]
    pub warning: f64,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub critical: f64,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub extreme: f64,
    /// De-escalation band, as a fraction of the ceiling.
    #[schemars(range(min = 0.0, max = 0.5))]
    pub hysteresis: f64,
    #[schemars(range(min = 1))]
    pub sample_interval_ms: u64,
}

impl Default for PressureConfig {
    fn default() -> Self {
        let thresholds = PressureThresholds::default();
        Self {
            warning: thresholds.warning,
            critical: thresholds.critical,
            extreme: thresholds.extreme,
            hysteresis: DEFAULT_HYSTERESIS,
            sample_interval_ms: 2_000,
        }
    }
}

impl PressureConfig {
    /// The unscaled thresholds.
    pub fn thresholds(&self) -> PressureThresholds {
        PressureThresholds {
            warning: self.warning,
            critical: self.critical,
            extreme: self.extreme,
        }
    }

    pub fn evaluator(&self, profile: DeviceProfile) -> PressureEvaluator {
        PressureEvaluator::with_thresholds(profile, self.thresholds().scaled_for(&profile))
            .with_hysteresis(self.hysteresis)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Limits for the in-memory cache tier. Unset limits are derived from the device profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(deny_unknown_fields)]
pub struct MemoryCacheConfig {
    pub cost_limit: Option<ByteSize>,
    pub max_entries: Option<usize>,
    pub default_ttl_secs: Option<u64>,
}

impl MemoryCacheConfig {
    pub fn bounded_config(&self, profile: &DeviceProfile) -> BoundedCacheConfig {
        let mut config = BoundedCacheConfig::for_device(profile);
        if let Some(limit) = self.cost_limit {
            config.cost_limit = limit.0;
        }
        if let Some(max_entries) = self.max_entries {
            config.max_entries = max_entries;
        }
        config.default_ttl = self.default_ttl_secs.map(Duration::from_secs);
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(deny_unknown_fields)]
pub struct DiskCacheConfig {
    /// Cache directory. Defaults to `<temp dir>/ballast-cache`.
    #[schemars(with = "Option<String>")]
    pub dir: Option<PathBuf>,
    pub max_size: ByteSize,
    #[schemars(range(min = 1))]
    pub default_ttl_secs: u64,
    /// Minimum time between GC sweeps.
    #[schemars(range(min = 1))]
    pub gc_interval_secs: u64,
    pub compression: bool,
    /// zstd level used when `compression` is enabled.
    #[schemars(range(min = 1, max = 22))]
    pub compression_level: i32,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        let defaults = PersistentCacheConfig::default();
        Self {
            dir: None,
            max_size: ByteSize(defaults.max_bytes),
            default_ttl_secs: defaults.default_ttl.as_secs(),
            gc_interval_secs: defaults.gc_interval.as_secs(),
            compression: defaults.compression_level.is_some(),
            compression_level: defaults.compression_level.unwrap_or(3),
        }
    }
}

impl DiskCacheConfig {
    pub fn dir_or_default(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("ballast-cache"))
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn persistent_config(&self) -> PersistentCacheConfig {
        PersistentCacheConfig {
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            max_bytes: self.max_size.0,
            gc_interval: self.gc_interval(),
            compression_level: self.compression.then_some(self.compression_level),
        }
    }
}

/// Cooldowns and pass counts for the cleanup tiers, plus the thermal dwell times.
///
/// `ThermalEmergency` has no cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(deny_unknown_fields)]
pub struct CleanupConfig {
    #[schemars(range(min = 1))]
    pub normal_interval_secs: u64,
    #[schemars(range(min = 1))]
    pub aggressive_interval_secs: u64,
    #[schemars(range(min = 1))]
    pub emergency_interval_secs: u64,
    #[schemars(range(min = 1, max = 5))]
    pub aggressive_passes: u32,
    #[schemars(range(min = 1, max = 5))]
    pub emergency_passes: u32,
    /// Longest a caller waiting on a cleanup run is blocked.
    #[schemars(range(min = 1))]
    pub wait_timeout_ms: u64,
    /// Directory whose stale files are purged by cleanup tiers. Unset disables the purger.
    #[schemars(with = "Option<String>")]
    pub temp_dir: Option<PathBuf>,
    #[schemars(range(min = 1))]
    pub temp_max_age_secs: u64,
    /// How long thermal state must stay `serious`+ before the thermal emergency starts.
    #[schemars(range(min = 1))]
    pub thermal_dwell_secs: u64,
    /// How long thermal state must stay `fair` or better before the emergency ends.
    #[schemars(range(min = 1))]
    pub thermal_recovery_secs: u64,
    /// Cadence of the self-check that keeps running during a thermal emergency.
    #[schemars(range(min = 1))]
    pub self_check_interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            normal_interval_secs: 5 * 60,
            aggressive_interval_secs: 30,
            emergency_interval_secs: 60,
            aggressive_passes: 2,
            emergency_passes: 3,
            wait_timeout_ms: 2_000,
            temp_dir: None,
            temp_max_age_secs: 10 * 60,
            thermal_dwell_secs: 30,
            thermal_recovery_secs: 30,
            self_check_interval_secs: 5 * 60,
        }
    }
}

impl CleanupConfig {
    pub fn normal_interval(&self) -> Duration {
        Duration::from_secs(self.normal_interval_secs)
    }

    pub fn aggressive_interval(&self) -> Duration {
        Duration::from_secs(self.aggressive_interval_secs)
    }

    pub fn emergency_interval(&self) -> Duration {
        Duration::from_secs(self.emergency_interval_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn temp_max_age(&self) -> Duration {
        Duration::from_secs(self.temp_max_age_secs)
    }

    pub fn thermal_dwell(&self) -> Duration {
        Duration::from_secs(self.thermal_dwell_secs)
    }

    pub fn thermal_recovery(&self) -> Duration {
        Duration::from_secs(self.thermal_recovery_secs)
    }

    pub fn self_check_interval(&self) -> Duration {
        Duration::from_secs(self.self_check_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(deny_unknown_fields)]
pub struct QualityConfig {
    #[schemars(range(min = 1))]
    pub reevaluate_interval_ms: u64,
    /// Pin the quality level (`minimal`, `low`, `medium`, `high` or `ultra`).
    #[schemars(with = "Option<String>")]
    pub override_level: Option<QualityLevel>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            reevaluate_interval_ms: 5_000,
            override_level: None,
        }
    }
}

impl QualityConfig {
    pub fn reevaluate_interval(&self) -> Duration {
        Duration::from_millis(self.reevaluate_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(deny_unknown_fields)]
pub struct FrameRateConfig {
    /// Requested frame rate; `0` means the display maximum.
    pub target_fps: u32,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub throttle_threshold: f32,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub reduction_factor: f32,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub low_end_reduction_factor: f32,
    /// Number of recent frames `current_fps` is averaged over.
    #[schemars(range(min = 1))]
    pub window_frames: usize,
    #[schemars(range(min = 1))]
    pub bookkeeping_interval_ms: u64,
}

impl Default for FrameRateConfig {
    fn default() -> Self {
        let policy = FrameRatePolicy::default();
        Self {
            target_fps: 0,
            throttle_threshold: policy.throttle_threshold,
            reduction_factor: policy.reduction_factor,
            low_end_reduction_factor: policy.low_end_reduction_factor,
            window_frames: 120,
            bookkeeping_interval_ms: 1_000,
        }
    }
}

impl FrameRateConfig {
    pub fn policy(&self) -> FrameRatePolicy {
        FrameRatePolicy {
            throttle_threshold: self.throttle_threshold,
            reduction_factor: self.reduction_factor,
            low_end_reduction_factor: self.low_end_reduction_factor,
            ..FrameRatePolicy::default()
        }
    }

    pub fn bookkeeping_interval(&self) -> Duration {
        Duration::from_millis(self.bookkeeping_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(deny_unknown_fields)]
pub struct LeakConfig {
    pub enabled: bool,
    #[schemars(range(min = 1))]
    pub interval_secs: u64,
    #[schemars(range(min = 2))]
    pub capacity: usize,
    #[schemars(range(min = 1))]
    pub window_secs: u64,
    pub growth_threshold_mb: f64,
    #[schemars(range(min = 1))]
    pub max_object_age_secs: u64,
    pub drop_tolerance_mb: f64,
}

impl Default for LeakConfig {
    fn default() -> Self {
        let defaults = LeakDetectorConfig::default();
        Self {
            enabled: true,
            interval_secs: 15,
            capacity: defaults.capacity,
            window_secs: defaults.window.as_secs(),
            growth_threshold_mb: defaults.growth_threshold_mb,
            max_object_age_secs: defaults.max_object_age.as_secs(),
            drop_tolerance_mb: defaults.drop_tolerance_mb,
        }
    }
}

impl LeakConfig {
    pub fn detector_config(&self) -> LeakDetectorConfig {
        LeakDetectorConfig {
            capacity: self.capacity,
            window: Duration::from_secs(self.window_secs),
            growth_threshold_mb: self.growth_threshold_mb,
            max_object_age: Duration::from_secs(self.max_object_age_secs),
            drop_tolerance_mb: self.drop_tolerance_mb,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(deny_unknown_fields)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    /// Minimum time between two diagnostics reports.
    #[schemars(range(min = 1))]
    pub cooldown_secs: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 60,
        }
    }
}

impl DiagnosticsConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The `Display` impl includes a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl BallastConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = read_config(path.as_ref())?;
        Ok(toml::from_str(&text)?)
    }

    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let text = read_config(path.as_ref())?;
        Self::load_from_str_with_diagnostics(&text)
    }

    /// Parse `text` and report unknown keys, warnings and validation errors.
    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (config, unknown_keys) =
            diagnostics::parse_tracking_unknown::<BallastConfig>(text)?;

        let mut diagnostics = ConfigDiagnostics {
            unknown_keys,
            ..ConfigDiagnostics::default()
        };
        diagnostics.absorb(config.validate());

        Ok((config, diagnostics))
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
