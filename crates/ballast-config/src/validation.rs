use crate::diagnostics::{ConfigValidationError, ConfigWarning, ValidationDiagnostics};
use crate::{BallastConfig, LoggingConfig, MAX_CLEANUP_PASSES};

impl BallastConfig {
    /// Check semantic invariants.
    ///
    /// Reports as many problems as it can find in one pass.
    #[must_use]
    pub fn validate(&self) -> ValidationDiagnostics {
        let mut out = ValidationDiagnostics::default();

        validate_pressure(self, &mut out);
        validate_intervals(self, &mut out);
        validate_cleanup_passes(self, &mut out);
        validate_caches(self, &mut out);
        validate_frame_rate(self, &mut out);
        validate_leak(self, &mut out);
        validate_logging(self, &mut out);

        out
    }
}

fn validate_pressure(config: &BallastConfig, out: &mut ValidationDiagnostics) {
    let pressure = &config.pressure;
    if !pressure.thresholds().is_well_formed() {
        out.errors.push(ConfigValidationError::ThresholdsOutOfOrder {
            warning: pressure.warning.to_string(),
            critical: pressure.critical.to_string(),
            extreme: pressure.extreme.to_string(),
        });
    }

    if !pressure.hysteresis.is_finite() || !(0.0..0.5).contains(&pressure.hysteresis) {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "pressure.hysteresis".to_string(),
            message: "must be in [0, 0.5)".to_string(),
        });
    }
}

fn validate_intervals(config: &BallastConfig, out: &mut ValidationDiagnostics) {
    let intervals = [
        ("pressure.sample_interval_ms", config.pressure.sample_interval_ms),
        ("disk_cache.default_ttl_secs", config.disk_cache.default_ttl_secs),
        ("disk_cache.gc_interval_secs", config.disk_cache.gc_interval_secs),
        ("cleanup.normal_interval_secs", config.cleanup.normal_interval_secs),
        (
            "cleanup.aggressive_interval_secs",
            config.cleanup.aggressive_interval_secs,
        ),
        (
            "cleanup.emergency_interval_secs",
            config.cleanup.emergency_interval_secs,
        ),
        ("cleanup.wait_timeout_ms", config.cleanup.wait_timeout_ms),
        ("cleanup.temp_max_age_secs", config.cleanup.temp_max_age_secs),
        ("cleanup.thermal_dwell_secs", config.cleanup.thermal_dwell_secs),
        (
            "cleanup.thermal_recovery_secs",
            config.cleanup.thermal_recovery_secs,
        ),
        (
            "cleanup.self_check_interval_secs",
            config.cleanup.self_check_interval_secs,
        ),
        (
            "quality.reevaluate_interval_ms",
            config.quality.reevaluate_interval_ms,
        ),
        (
            "frame_rate.bookkeeping_interval_ms",
            config.frame_rate.bookkeeping_interval_ms,
        ),
        ("leak.interval_secs", config.leak.interval_secs),
        ("leak.window_secs", config.leak.window_secs),
        ("leak.max_object_age_secs", config.leak.max_object_age_secs),
        ("diagnostics.cooldown_secs", config.diagnostics.cooldown_secs),
    ];

    for (toml_path, value) in intervals {
        if value == 0 {
            out.errors.push(ConfigValidationError::IntervalZero {
                toml_path: toml_path.to_string(),
            });
        }
    }

    if config.memory_cache.default_ttl_secs == Some(0) {
        out.errors.push(ConfigValidationError::IntervalZero {
            toml_path: "memory_cache.default_ttl_secs".to_string(),
        });
    }
}

fn validate_cleanup_passes(config: &BallastConfig, out: &mut ValidationDiagnostics) {
    let passes = [
        ("cleanup.aggressive_passes", config.cleanup.aggressive_passes),
        ("cleanup.emergency_passes", config.cleanup.emergency_passes),
    ];
    for (toml_path, passes) in passes {
        if !(1..=MAX_CLEANUP_PASSES).contains(&passes) {
            out.errors.push(ConfigValidationError::PassesOutOfRange {
                toml_path: toml_path.to_string(),
                passes,
            });
        }
    }

    if config.cleanup.emergency_passes < config.cleanup.aggressive_passes {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "cleanup.emergency_passes".to_string(),
            message: "is lower than cleanup.aggressive_passes".to_string(),
        });
    }
}

fn validate_caches(config: &BallastConfig, out: &mut ValidationDiagnostics) {
    if matches!(config.memory_cache.cost_limit, Some(limit) if limit.0 == 0) {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "memory_cache.cost_limit".to_string(),
            message: "must be >= 1".to_string(),
        });
    }
    if config.memory_cache.max_entries == Some(0) {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "memory_cache.max_entries".to_string(),
            message: "must be >= 1".to_string(),
        });
    }

    if config.disk_cache.max_size.0 == 0 {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "disk_cache.max_size".to_string(),
            message: "must be >= 1".to_string(),
        });
    }
    if config.disk_cache.compression && !(1..=22).contains(&config.disk_cache.compression_level) {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "disk_cache.compression_level".to_string(),
            message: "outside the usual zstd range 1..=22".to_string(),
        });
    }
}

fn validate_frame_rate(config: &BallastConfig, out: &mut ValidationDiagnostics) {
    let frame_rate = &config.frame_rate;
    let fractions = [
        ("frame_rate.throttle_threshold", frame_rate.throttle_threshold),
        ("frame_rate.reduction_factor", frame_rate.reduction_factor),
        (
            "frame_rate.low_end_reduction_factor",
            frame_rate.low_end_reduction_factor,
        ),
    ];
    for (toml_path, value) in fractions {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            out.errors.push(ConfigValidationError::InvalidValue {
                toml_path: toml_path.to_string(),
                message: "must be in [0, 1]".to_string(),
            });
        }
    }

    if frame_rate.window_frames == 0 {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "frame_rate.window_frames".to_string(),
            message: "must be >= 1".to_string(),
        });
    }
}

fn validate_leak(config: &BallastConfig, out: &mut ValidationDiagnostics) {
    if config.leak.capacity < 2 {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "leak.capacity".to_string(),
            message: "growth analysis needs at least 2 snapshots; 2 is used".to_string(),
        });
    }
    if config.leak.enabled
        && config.leak.window_secs < config.leak.interval_secs.saturating_mul(2)
    {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "leak.window_secs".to_string(),
            message: format!(
                "window of {}s holds fewer than two snapshots taken every {}s; use at least {}s",
                config.leak.window_secs,
                config.leak.interval_secs,
                config.leak.interval_secs.saturating_mul(2)
            ),
        });
    }
    if !config.leak.growth_threshold_mb.is_finite() || config.leak.growth_threshold_mb <= 0.0 {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "leak.growth_threshold_mb".to_string(),
            message: "must be > 0".to_string(),
        });
    }
    if !config.leak.drop_tolerance_mb.is_finite() || config.leak.drop_tolerance_mb < 0.0 {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "leak.drop_tolerance_mb".to_string(),
            message: "must be >= 0".to_string(),
        });
    }
}

fn validate_logging(config: &BallastConfig, out: &mut ValidationDiagnostics) {
    let normalized = LoggingConfig::normalize_level_directives(&config.logging.level);
    if !config.logging.level.trim().is_empty()
        && tracing_subscriber::EnvFilter::try_new(normalized.clone()).is_err()
    {
        out.warnings.push(ConfigWarning::LoggingLevelInvalid {
            value: config.logging.level.clone(),
            normalized,
        });
    }
}
