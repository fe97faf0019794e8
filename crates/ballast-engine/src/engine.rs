use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use ballast_cache::{BoundedCache, CacheError, PersistentCache};
use ballast_config::BallastConfig;
use ballast_core::{Clock, SystemClock};
use ballast_memory::{
    ClearableResource, CleanupTier, DeviceProfile, HostTelemetry, LeakDetector, LeakReport,
    MemoryPressureEvent, PressureEvaluator, PressureLevel, PressureSample, QualityInputs,
    QualityLevel, Telemetry, TelemetrySampler, TelemetrySource, ThermalLevel,
};
use ballast_metrics::MetricsRegistry;
use ballast_scheduler::Scheduler;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cleanup::{
    CleanupDecision, CleanupError, CleanupOrchestrator, CleanupPolicy, CleanupReport,
    CleanupTrigger, ClearRegistration,
};
use crate::diagnostics::{CacheReport, CacheTier, DiagnosticsLogger, DiagnosticsReport};
use crate::frame_rate::{FrameRateController, FrameRateSnapshot};
use crate::monitor::{Monitor, Monitored};
use crate::purge::TempFilePurger;
use crate::quality::{QualityChange, QualityController};
use crate::thermal::{ThermalGovernor, ThermalTransition};

const TEMP_PURGER_NAME: &str = "temp_files";

/// Assembles an [`Engine`]. Anything not set is derived from the configuration or the host.
pub struct EngineBuilder {
    config: BallastConfig,
    telemetry: Option<Arc<dyn TelemetrySource>>,
    profile: Option<DeviceProfile>,
    clock: Option<Arc<dyn Clock>>,
    scheduler: Option<Scheduler>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl EngineBuilder {
    pub fn new(config: BallastConfig) -> Self {
        Self {
            config,
            telemetry: None,
            profile: None,
            clock: None,
            scheduler: None,
            metrics: None,
        }
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySource>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Use `profile` instead of `[device]` and host detection.
    pub fn device_profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Engine {
        let config = self.config;
        let profile = self.profile.unwrap_or_else(|| config.device.profile());
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let scheduler = self.scheduler.unwrap_or_default();
        let metrics = self.metrics.unwrap_or_default();
        let telemetry = self
            .telemetry
            .unwrap_or_else(|| Arc::new(HostTelemetry) as Arc<dyn TelemetrySource>);

        let orchestrator = CleanupOrchestrator::new(
            CleanupPolicy::from_config(&config.cleanup),
            scheduler.clone(),
            clock.clone(),
            metrics.clone(),
        );
        let quality = QualityController::default();
        if let Some(level) = config.quality.override_level {
            quality.set_override(Some(level));
        }

        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner>| {
            let monitors = builtin_monitors(weak, &config, &scheduler);
            let self_check = monitor(
                "self_check",
                config.cleanup.self_check_interval(),
                &scheduler,
                weak,
                EngineInner::tick_self_check,
            );

            EngineInner {
                profile,
                sampler: TelemetrySampler::new(telemetry.clone()),
                evaluator: Mutex::new(config.pressure.evaluator(profile)),
                last_sample: Mutex::new(None),
                frame_rate: FrameRateController::new(
                    config.frame_rate.policy(),
                    profile,
                    config.frame_rate.target_fps,
                    config.frame_rate.window_frames,
                ),
                leak: LeakDetector::new(config.leak.detector_config(), clock.clone()),
                thermal: ThermalGovernor::new(
                    config.cleanup.thermal_dwell(),
                    config.cleanup.thermal_recovery(),
                    clock.clone(),
                ),
                diagnostics: DiagnosticsLogger::new(config.diagnostics.cooldown(), clock.clone()),
                orchestrator,
                quality,
                caches: Mutex::new(Vec::new()),
                registrations: Mutex::new(Vec::new()),
                monitors: Mutex::new(monitors),
                paused: Mutex::new(Vec::new()),
                self_check,
                running: AtomicBool::new(false),
                config,
                clock,
                scheduler,
                metrics,
            }
        });

        if let Some(dir) = inner.config.cleanup.temp_dir.clone() {
            let purger = TempFilePurger::new(
                TEMP_PURGER_NAME,
                dir,
                inner.config.cleanup.temp_max_age(),
                inner.clock.clone(),
            );
            inner.register(Arc::new(purger));
        }

        let weak = Arc::downgrade(&inner);
        telemetry.subscribe_memory_pressure(Arc::new(move |event: MemoryPressureEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_memory_pressure_event(event);
            }
        }));

        tracing::info!(
            target = "ballast.engine",
            version = ballast_core::BALLAST_VERSION,
            memory_ceiling_mb = profile.memory_ceiling_mb(),
            max_refresh_rate_hz = profile.max_refresh_rate_hz(),
            low_end = profile.is_low_end(),
            simulated_device = inner.config.device.is_override(),
            "engine built"
        );

        Engine { inner }
    }
}

fn tick_with<T: 'static>(
    weak: &Weak<EngineInner>,
    tick: fn(&Arc<EngineInner>) -> T,
) -> impl Fn() + Send + Sync + 'static {
    let weak = weak.clone();
    move || {
        if let Some(inner) = weak.upgrade() {
            let _ = tick(&inner);
        }
    }
}

fn monitor<T: 'static>(
    name: &str,
    interval: Duration,
    scheduler: &Scheduler,
    weak: &Weak<EngineInner>,
    tick: fn(&Arc<EngineInner>) -> T,
) -> Arc<dyn Monitored> {
    Arc::new(Monitor::new(
        name,
        interval,
        scheduler.clone(),
        tick_with(weak, tick),
    ))
}

fn builtin_monitors(
    weak: &Weak<EngineInner>,
    config: &BallastConfig,
    scheduler: &Scheduler,
) -> Vec<Arc<dyn Monitored>> {
    let mut monitors = vec![
        monitor(
            "pressure",
            config.pressure.sample_interval(),
            scheduler,
            weak,
            EngineInner::tick_pressure,
        ),
        monitor(
            "quality",
            config.quality.reevaluate_interval(),
            scheduler,
            weak,
            EngineInner::tick_quality,
        ),
        monitor(
            "frame_rate",
            config.frame_rate.bookkeeping_interval(),
            scheduler,
            weak,
            EngineInner::tick_frame_rate,
        ),
        monitor(
            "disk_gc",
            config.disk_cache.gc_interval(),
            scheduler,
            weak,
            EngineInner::tick_disk_gc,
        ),
    ];
    if config.leak.enabled {
        monitors.push(monitor(
            "leak",
            config.leak.interval(),
            scheduler,
            weak,
            EngineInner::tick_leak,
        ));
    }
    if config.diagnostics.enabled {
        monitors.push(monitor(
            "diagnostics",
            config.diagnostics.cooldown(),
            scheduler,
            weak,
            EngineInner::tick_diagnostics,
        ));
    }
    monitors
}

type StatsFn = Box<dyn Fn() -> CacheReport + Send + Sync>;
type GcFn = Arc<dyn Fn() -> Result<u64, CacheError> + Send + Sync>;

struct CacheHandle {
    name: String,
    stats: StatsFn,
    gc: Option<GcFn>,
}

struct EngineInner {
    config: BallastConfig,
    profile: DeviceProfile,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler,
    metrics: Arc<MetricsRegistry>,
    sampler: TelemetrySampler,
    evaluator: Mutex<PressureEvaluator>,
    last_sample: Mutex<Option<PressureSample>>,
    orchestrator: CleanupOrchestrator,
    quality: QualityController,
    frame_rate: FrameRateController,
    leak: LeakDetector,
    thermal: ThermalGovernor,
    diagnostics: DiagnosticsLogger,
    caches: Mutex<Vec<CacheHandle>>,
    registrations: Mutex<Vec<ClearRegistration>>,
    monitors: Mutex<Vec<Arc<dyn Monitored>>>,
    /// Monitors stopped by the current thermal emergency.
    paused: Mutex<Vec<Arc<dyn Monitored>>>,
    self_check: Arc<dyn Monitored>,
    running: AtomicBool,
}

/// The resource-pressure engine: samples telemetry, runs cleanup tiers, and publishes quality
/// and frame-rate policy.
///
/// Dropping the engine stops every monitor it owns.
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn builder(config: BallastConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &BallastConfig {
        &self.inner.config
    }

    pub fn profile(&self) -> DeviceProfile {
        self.inner.profile
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.inner.metrics
    }

    pub fn orchestrator(&self) -> &CleanupOrchestrator {
        &self.inner.orchestrator
    }

    pub fn quality(&self) -> &QualityController {
        &self.inner.quality
    }

    pub fn frame_rate(&self) -> &FrameRateController {
        &self.inner.frame_rate
    }

    pub fn leak_detector(&self) -> &LeakDetector {
        &self.inner.leak
    }

    /// Level of the most recent pressure sample.
    pub fn pressure(&self) -> PressureLevel {
        self.inner.pressure()
    }

    pub fn last_sample(&self) -> Option<PressureSample> {
        *self.inner.last_sample.lock()
    }

    /// The most recent telemetry reading.
    pub fn telemetry(&self) -> Telemetry {
        self.inner.sampler.last()
    }

    pub fn is_thermal_emergency(&self) -> bool {
        self.inner.thermal.is_emergency()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Names of the monitors whose timers are currently running, sorted.
    pub fn running_monitors(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .monitors
            .lock()
            .iter()
            .chain(std::iter::once(&self.inner.self_check))
            .filter(|monitor| monitor.is_running())
            .map(|monitor| monitor.name().to_owned())
            .collect();
        names.sort();
        names
    }

    /// Create a memory-tier cache sized for this device and register it for cleanup.
    pub fn memory_cache<K, V>(&self, name: impl Into<String>) -> Arc<BoundedCache<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let config = self.inner.config.memory_cache.bounded_config(&self.inner.profile);
        let cache = Arc::new(BoundedCache::new(name, config, self.inner.clock.clone()));
        self.register_memory_cache(cache.clone());
        cache
    }

    pub fn register_memory_cache<K, V>(&self, cache: Arc<BoundedCache<K, V>>)
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let handle = cache.clone();
        self.inner.caches.lock().push(CacheHandle {
            name: cache.name().to_owned(),
            stats: Box::new(move || {
                let stats = handle.stats();
                CacheReport {
                    name: handle.name().to_owned(),
                    tier: CacheTier::Memory,
                    hits: stats.hits,
                    misses: stats.misses,
                    hit_ratio: stats.hit_ratio(),
                    entries: Some(stats.entries as u64),
                    bytes: Some(stats.total_cost),
                }
            }),
            gc: None,
        });
        self.inner.register(cache);
    }

    /// Open a disk-tier cache under `<disk_cache.dir>/<name>` and register it for cleanup and GC.
    pub fn open_disk_cache<K, V>(
        &self,
        name: impl Into<String>,
    ) -> Result<PersistentCache<K, V>, CacheError>
    where
        K: Serialize + Send + Sync + 'static,
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let name = name.into();
        let root = self.inner.config.disk_cache.dir_or_default().join(&name);
        let cache = PersistentCache::open(
            name,
            root,
            self.inner.config.disk_cache.persistent_config(),
            self.inner.clock.clone(),
        )?;
        self.register_disk_cache(cache.clone());
        Ok(cache)
    }

    pub fn register_disk_cache<K, V>(&self, cache: PersistentCache<K, V>)
    where
        K: Serialize + Send + Sync + 'static,
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let handle = cache.clone();
        let collector = cache.clone();
        self.inner.caches.lock().push(CacheHandle {
            name: cache.name().to_owned(),
            stats: Box::new(move || {
                let stats = handle.stats();
                CacheReport {
                    name: handle.name().to_owned(),
                    tier: CacheTier::Disk,
                    hits: stats.hits,
                    misses: stats.misses,
                    hit_ratio: stats.hit_ratio(),
                    entries: None,
                    bytes: None,
                }
            }),
            gc: Some(Arc::new(move || collector.gc().map(|report| report.removed()))),
        });
        self.inner.register(Arc::new(cache));
    }

    /// Register a host resource pool for every cleanup tier. It stays registered for the
    /// engine's lifetime.
    pub fn register_clearable(&self, resource: Arc<dyn ClearableResource>) {
        self.inner.register(resource);
    }

    /// Register a host resource pool for the given tiers only.
    pub fn register_clearable_for(
        &self,
        resource: Arc<dyn ClearableResource>,
        tiers: &[CleanupTier],
    ) {
        let registration = self.inner.orchestrator.register_for(resource, tiers);
        self.inner.registrations.lock().push(registration);
    }

    /// Add a host subsystem to the set paused by thermal emergencies and managed by
    /// [`Engine::start`]/[`Engine::stop`]. It starts right away when the engine is running, or
    /// once the current thermal emergency is over.
    pub fn register_monitor(&self, monitor: Arc<dyn Monitored>) {
        if self.is_running() {
            if self.is_thermal_emergency() {
                self.inner.paused.lock().push(monitor.clone());
            } else {
                monitor.start();
            }
        }
        self.inner.monitors.lock().push(monitor);
    }

    pub fn on_memory_pressure_event(&self, event: MemoryPressureEvent) {
        self.inner.on_memory_pressure_event(event);
    }

    /// Manual trigger. Subject to the tier's cooldown.
    pub fn request_cleanup(&self, tier: CleanupTier) -> CleanupDecision {
        self.inner.orchestrator.request(tier, CleanupTrigger::Manual)
    }

    pub fn request_cleanup_and_wait(
        &self,
        tier: CleanupTier,
    ) -> Result<CleanupReport, CleanupError> {
        self.inner
            .orchestrator
            .request_and_wait(tier, CleanupTrigger::Manual)
    }

    pub fn set_quality_override(&self, level: Option<QualityLevel>) -> Option<QualityChange> {
        self.inner.quality.set_override(level)
    }

    pub fn tick_pressure(&self) -> PressureSample {
        self.inner.tick_pressure()
    }

    pub fn tick_quality(&self) -> Option<QualityChange> {
        self.inner.tick_quality()
    }

    pub fn tick_frame_rate(&self) -> FrameRateSnapshot {
        self.inner.tick_frame_rate()
    }

    pub fn tick_leak(&self) -> LeakReport {
        self.inner.tick_leak()
    }

    /// Dispatch a GC sweep for every disk cache. Returns how many were dispatched.
    pub fn tick_disk_gc(&self) -> usize {
        self.inner.tick_disk_gc()
    }

    pub fn tick_diagnostics(&self) -> Option<DiagnosticsReport> {
        self.inner.tick_diagnostics()
    }

    pub fn tick_self_check(&self) -> PressureSample {
        self.inner.tick_self_check()
    }

    /// Build a diagnostics report now, ignoring the logger's cooldown. Nothing is logged.
    pub fn diagnostics_report(&self) -> DiagnosticsReport {
        self.inner.diagnostics_report()
    }

    /// Start every monitor (only the self-check during a thermal emergency).
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.inner.thermal.is_emergency() {
            let monitors = self.inner.monitors.lock().clone();
            self.inner.paused.lock().extend(monitors);
            self.inner.self_check.start();
        } else {
            for monitor in self.inner.monitors.lock().iter() {
                monitor.start();
            }
        }
        tracing::info!(target = "ballast.engine", "engine started");
    }

    /// Stop every monitor. Safe to call repeatedly and before [`Engine::start`].
    pub fn stop(&self) {
        let was_running = self.inner.running.swap(false, Ordering::AcqRel);
        self.inner.stop_all();
        if was_running {
            tracing::info!(target = "ballast.engine", "engine stopped");
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
        self.inner.monitors.lock().clear();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("profile", &self.inner.profile)
            .field("pressure", &self.inner.pressure())
            .field("quality", &self.inner.quality.level())
            .field("thermal_emergency", &self.inner.thermal.is_emergency())
            .field("running", &self.is_running())
            .finish()
    }
}

impl EngineInner {
    fn pressure(&self) -> PressureLevel {
        self.evaluator.lock().current()
    }

    fn register(&self, resource: Arc<dyn ClearableResource>) {
        let registration = self.orchestrator.register(resource);
        self.registrations.lock().push(registration);
    }

    fn tick_pressure(self: &Arc<Self>) -> PressureSample {
        let start = Instant::now();
        let telemetry = self.sampler.sample();
        let sample = self.evaluator.lock().sample(&telemetry);
        *self.last_sample.lock() = Some(sample);

        self.frame_rate.update(sample.level, telemetry.thermal);
        self.react_to_pressure(&sample);
        self.observe_thermal(telemetry.thermal);

        self.metrics.record_run("monitor.pressure", start.elapsed());
        sample
    }

    /// `Extreme` always maps to `Emergency`, `Critical` to `Aggressive`. The strong tiers run on
    /// an escalation edge, or on any sample whose memory component is still critical (the tier
    /// cooldowns bound how often that actually clears).
    fn react_to_pressure(self: &Arc<Self>, sample: &PressureSample) {
        let escalated = sample
            .transition()
            .is_some_and(|transition| transition.is_escalation());
        let memory_critical = sample.memory_level.is_critical_or_worse();

        match sample.level {
            PressureLevel::Extreme if escalated || memory_critical => {
                self.orchestrator
                    .request(CleanupTier::Emergency, CleanupTrigger::PressureEscalation);
            }
            PressureLevel::Critical if escalated || memory_critical => {
                self.request_aggressive(CleanupTrigger::PressureEscalation);
            }
            PressureLevel::Normal | PressureLevel::Warning => {
                self.orchestrator
                    .request(CleanupTier::Normal, CleanupTrigger::PressureRelief);
            }
            _ => {}
        }
    }

    /// Run `Aggressive`, then escalate once to `Emergency` if memory is still critical.
    fn request_aggressive(self: &Arc<Self>, trigger: CleanupTrigger) -> CleanupDecision {
        let weak = Arc::downgrade(self);
        self.orchestrator
            .request_then(CleanupTier::Aggressive, trigger, move |report| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let telemetry = inner.sampler.sample();
                let memory_level = inner.evaluator.lock().memory_level(&telemetry);
                if memory_level.is_critical_or_worse() {
                    tracing::info!(
                        target = "ballast.engine",
                        memory_level = %memory_level,
                        released_bytes = report.released.released_bytes,
                        "memory still critical after aggressive cleanup; escalating"
                    );
                    inner
                        .orchestrator
                        .request(CleanupTier::Emergency, CleanupTrigger::Escalation);
                }
            })
    }

    fn on_memory_pressure_event(self: &Arc<Self>, event: MemoryPressureEvent) {
        tracing::info!(target = "ballast.engine", event = ?event, "memory pressure event");
        match event {
            MemoryPressureEvent::Warning => {
                self.request_aggressive(CleanupTrigger::MemoryWarning);
            }
            MemoryPressureEvent::Critical => {
                self.orchestrator
                    .request(CleanupTier::Emergency, CleanupTrigger::MemoryWarning);
            }
        }
    }

    fn observe_thermal(self: &Arc<Self>, level: ThermalLevel) {
        match self.thermal.observe(level) {
            Some(ThermalTransition::Entered) => self.enter_thermal_emergency(level),
            Some(ThermalTransition::Exited) => self.exit_thermal_emergency(level),
            None => {}
        }
    }

    fn enter_thermal_emergency(self: &Arc<Self>, level: ThermalLevel) {
        let stopped: Vec<Arc<dyn Monitored>> = self
            .monitors
            .lock()
            .iter()
            .filter(|monitor| monitor.is_running())
            .cloned()
            .collect();
        for monitor in &stopped {
            monitor.stop();
        }
        let names: Vec<&str> = stopped.iter().map(|monitor| monitor.name()).collect();
        tracing::warn!(
            target = "ballast.engine",
            thermal = %level,
            paused = ?names,
            "entering thermal emergency"
        );
        self.paused.lock().extend(stopped);

        self.orchestrator
            .request(CleanupTier::ThermalEmergency, CleanupTrigger::Thermal);
        self.tick_quality();

        if self.running.load(Ordering::Acquire) {
            self.self_check.start();
        }
    }

    fn exit_thermal_emergency(self: &Arc<Self>, level: ThermalLevel) {
        self.self_check.stop();
        let paused = std::mem::take(&mut *self.paused.lock());
        if self.running.load(Ordering::Acquire) {
            for monitor in &paused {
                monitor.start();
            }
        }
        tracing::info!(
            target = "ballast.engine",
            thermal = %level,
            resumed = paused.len(),
            "thermal emergency over"
        );
        self.tick_quality();
    }

    fn tick_quality(self: &Arc<Self>) -> Option<QualityChange> {
        let telemetry = self.sampler.sample();
        let inputs =
            QualityInputs::from_telemetry(&telemetry, self.pressure(), self.profile.is_low_end());
        self.metrics
            .time("monitor.quality", || self.quality.update(&inputs))
    }

    fn tick_frame_rate(self: &Arc<Self>) -> FrameRateSnapshot {
        let telemetry = self.sampler.last();
        self.frame_rate.update(self.pressure(), telemetry.thermal);
        let snapshot = self.frame_rate.snapshot();
        tracing::trace!(
            target = "ballast.engine",
            current_fps = snapshot.current_fps,
            effective_fps = snapshot.effective_fps,
            recommended_fps = snapshot.recommended_fps,
            "frame rate bookkeeping"
        );
        snapshot
    }

    fn tick_leak(self: &Arc<Self>) -> LeakReport {
        let telemetry = self.sampler.sample();
        self.metrics
            .time("monitor.leak", || self.leak.tick(telemetry.resident_mb))
    }

    fn tick_disk_gc(self: &Arc<Self>) -> usize {
        let sweeps: Vec<(String, GcFn)> = self
            .caches
            .lock()
            .iter()
            .filter_map(|handle| handle.gc.clone().map(|gc| (handle.name.clone(), gc)))
            .collect();
        let dispatched = sweeps.len();

        for (name, gc) in sweeps {
            let metrics = self.metrics.clone();
            let _task = self.scheduler.spawn_background(move |_token| {
                let start = Instant::now();
                match gc() {
                    Ok(removed) => {
                        metrics.record_run("disk_cache.gc", start.elapsed());
                        tracing::debug!(
                            target = "ballast.cache",
                            cache = %name,
                            removed,
                            "disk cache gc finished"
                        );
                    }
                    Err(err) => {
                        metrics.record_error("disk_cache.gc");
                        tracing::warn!(
                            target = "ballast.cache",
                            cache = %name,
                            error = %err,
                            "disk cache gc failed"
                        );
                    }
                }
                Ok(())
            });
        }
        dispatched
    }

    fn tick_diagnostics(self: &Arc<Self>) -> Option<DiagnosticsReport> {
        self.diagnostics.try_emit(|| self.diagnostics_report())
    }

    /// Keeps thermal state and pressure current while every other monitor is paused.
    fn tick_self_check(self: &Arc<Self>) -> PressureSample {
        let telemetry = self.sampler.sample();
        let sample = self.evaluator.lock().sample(&telemetry);
        *self.last_sample.lock() = Some(sample);
        self.observe_thermal(telemetry.thermal);
        sample
    }

    fn diagnostics_report(&self) -> DiagnosticsReport {
        let telemetry = self.sampler.last();
        let last_ratio = self.last_sample.lock().map(|sample| sample.ratio);
        let (pressure, usage_ratio) = {
            let evaluator = self.evaluator.lock();
            let ratio = last_ratio.unwrap_or_else(|| evaluator.usage_ratio(&telemetry));
            (evaluator.current(), ratio)
        };
        let caches = self
            .caches
            .lock()
            .iter()
            .map(|handle| (handle.stats)())
            .collect();

        DiagnosticsReport {
            timestamp_ms: self.clock.now_millis(),
            pressure,
            usage_ratio,
            telemetry,
            failing_signals: self
                .sampler
                .failing_signals()
                .into_iter()
                .map(|signal| signal.as_str().to_owned())
                .collect(),
            quality: self.quality.level(),
            quality_overridden: self.quality.override_level().is_some(),
            frame_rate: self.frame_rate.snapshot(),
            thermal_emergency: self.thermal.is_emergency(),
            caches,
            tracked_objects: self.leak.tracked_count(),
            metrics: self.metrics.snapshot(),
        }
    }

    fn stop_all(&self) {
        for monitor in self.monitors.lock().iter() {
            monitor.stop();
        }
        self.self_check.stop();
        self.paused.lock().clear();
    }
}
