use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ballast_core::Clock;
use ballast_memory::{PressureLevel, QualityLevel, Telemetry};
use ballast_metrics::MetricsSnapshot;
use serde::Serialize;

use crate::frame_rate::FrameRateSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Memory,
    Disk,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheReport {
    pub name: String,
    pub tier: CacheTier,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    /// Unknown for disk caches.
    pub entries: Option<u64>,
    /// Total cost for memory caches; unknown for disk caches.
    pub bytes: Option<u64>,
}

/// Everything the engine knows at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub timestamp_ms: u64,
    pub pressure: PressureLevel,
    pub usage_ratio: f64,
    pub telemetry: Telemetry,
    pub failing_signals: Vec<String>,
    pub quality: QualityLevel,
    pub quality_overridden: bool,
    pub frame_rate: FrameRateSnapshot,
    pub thermal_emergency: bool,
    pub caches: Vec<CacheReport>,
    pub tracked_objects: usize,
    pub metrics: MetricsSnapshot,
}

/// Emits [`DiagnosticsReport`]s no more often than its cooldown.
///
/// The report is only assembled when the cooldown has elapsed, so callers can invoke
/// [`DiagnosticsLogger::try_emit`] from hot paths.
#[derive(Debug)]
pub struct DiagnosticsLogger {
    cooldown_ms: u64,
    clock: Arc<dyn Clock>,
    // 0 = never emitted.
    last_emit_ms: AtomicU64,
}

impl DiagnosticsLogger {
    pub fn new(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown_ms: cooldown.as_millis() as u64,
            clock,
            last_emit_ms: AtomicU64::new(0),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn try_emit(&self, build: impl FnOnce() -> DiagnosticsReport) -> Option<DiagnosticsReport> {
        let now = self.clock.now_millis().max(1);
        let last = self.last_emit_ms.load(Ordering::Acquire);
        if last != 0 && now.saturating_sub(last) < self.cooldown_ms {
            return None;
        }
        // Only one concurrent caller wins the slot.
        if self
            .last_emit_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let report = build();
        tracing::info!(
            target = "ballast.diagnostics",
            pressure = %report.pressure,
            usage_ratio = report.usage_ratio,
            quality = %report.quality,
            fps = report.frame_rate.current_fps,
            effective_fps = report.frame_rate.effective_fps,
            thermal = %report.telemetry.thermal,
            battery = report.telemetry.battery_fraction,
            thermal_emergency = report.thermal_emergency,
            caches = report.caches.len(),
            tracked_objects = report.tracked_objects,
            "diagnostics"
        );
        for cache in &report.caches {
            tracing::debug!(
                target = "ballast.diagnostics",
                cache = %cache.name,
                tier = ?cache.tier,
                hits = cache.hits,
                misses = cache.misses,
                hit_ratio = cache.hit_ratio,
                "cache diagnostics"
            );
        }
        Some(report)
    }
}
