//! Tiered, rate-limited cleanup of registered [`ClearableResource`]s.
//!
//! Each [`CleanupTier`] has its own cooldown and pass count. A request first goes through the
//! cooldown gate (check and stamp happen under one lock, so two racing triggers can never both
//! get through), then runs on the scheduler's background pool:
//! - in-memory resources are cleared one after another, repeated for every configured pass;
//! - I/O resources are handed to the background pool individually and not waited on.
//!
//! `ThermalEmergency` skips the cooldown gate entirely.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use ballast_config::{CleanupConfig, MAX_CLEANUP_PASSES};
use ballast_core::{panic_payload_to_str, Clock};
use ballast_memory::{ClearKind, ClearOutcome, ClearRequest, ClearableResource, CleanupTier};
use ballast_metrics::MetricsRegistry;
use ballast_scheduler::{run_with_timeout, CancellationToken, Cancelled, Scheduler, TaskError};
use parking_lot::Mutex;
use serde::Serialize;

/// Cooldown and pass count for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    pub min_interval: Duration,
    /// How many times in-memory resources are cleared per run.
    pub passes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    pub normal: TierPolicy,
    pub aggressive: TierPolicy,
    pub emergency: TierPolicy,
    /// The interval is ignored; thermal emergencies always run.
    pub thermal_emergency: TierPolicy,
    /// Longest [`CleanupOrchestrator::request_and_wait`] blocks its caller.
    pub wait_timeout: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self::from_config(&CleanupConfig::default())
    }
}

impl CleanupPolicy {
    pub fn from_config(config: &CleanupConfig) -> Self {
        let clamp = |passes: u32| passes.clamp(1, MAX_CLEANUP_PASSES);
        let emergency_passes = clamp(config.emergency_passes);
        Self {
            normal: TierPolicy {
                min_interval: config.normal_interval(),
                passes: 1,
            },
            aggressive: TierPolicy {
                min_interval: config.aggressive_interval(),
                passes: clamp(config.aggressive_passes),
            },
            emergency: TierPolicy {
                min_interval: config.emergency_interval(),
                passes: emergency_passes,
            },
            thermal_emergency: TierPolicy {
                min_interval: Duration::ZERO,
                passes: emergency_passes,
            },
            wait_timeout: config.wait_timeout(),
        }
    }

    pub fn tier(&self, tier: CleanupTier) -> TierPolicy {
        match tier {
            CleanupTier::Normal => self.normal,
            CleanupTier::Aggressive => self.aggressive,
            CleanupTier::Emergency => self.emergency,
            CleanupTier::ThermalEmergency => self.thermal_emergency,
        }
    }
}

/// Why a cleanup was requested. Only used for logging and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTrigger {
    /// Pressure rose to `Critical` or above.
    PressureEscalation,
    /// Pressure settled at `Warning` or below; routine maintenance.
    PressureRelief,
    /// Memory was still critical right after an aggressive run.
    Escalation,
    /// Push notification from the platform.
    MemoryWarning,
    Thermal,
    Manual,
}

impl CleanupTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            CleanupTrigger::PressureEscalation => "pressure_escalation",
            CleanupTrigger::PressureRelief => "pressure_relief",
            CleanupTrigger::Escalation => "escalation",
            CleanupTrigger::MemoryWarning => "memory_warning",
            CleanupTrigger::Thermal => "thermal",
            CleanupTrigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupDecision {
    /// The run was admitted and dispatched.
    Started,
    /// The tier ran too recently; nothing happens.
    RateLimited { retry_after: Duration },
}

impl CleanupDecision {
    pub fn is_started(self) -> bool {
        matches!(self, CleanupDecision::Started)
    }
}

/// Summary of a single tier execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub tier: CleanupTier,
    pub trigger: CleanupTrigger,
    pub passes: u32,
    /// Resources that participated, including dispatched I/O resources.
    pub resources: usize,
    /// Released by in-memory resources. I/O resources report asynchronously.
    pub released: ClearOutcome,
    pub io_dispatched: usize,
    pub panicked: usize,
    /// The run stopped early because its token was cancelled.
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CleanupError {
    #[error("{tier} cleanup is cooling down; retry in {retry_after:?}")]
    RateLimited {
        tier: CleanupTier,
        retry_after: Duration,
    },
    #[error("{tier} cleanup did not complete: {source}")]
    Task {
        tier: CleanupTier,
        #[source]
        source: TaskError,
    },
}

struct Registration {
    resource: Arc<dyn ClearableResource>,
    tiers: [bool; 4],
}

struct Inner {
    policy: CleanupPolicy,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsRegistry>,
    next_id: AtomicU64,
    resources: Mutex<HashMap<u64, Registration>>,
    last_runs: Mutex<[Option<u64>; 4]>,
}

/// Runs cleanup tiers over the registered resources.
///
/// Cloning is cheap; all clones share registrations and cooldown state.
#[derive(Clone)]
pub struct CleanupOrchestrator {
    inner: Arc<Inner>,
}

impl CleanupOrchestrator {
    pub fn new(
        policy: CleanupPolicy,
        scheduler: Scheduler,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                scheduler,
                clock,
                metrics,
                next_id: AtomicU64::new(1),
                resources: Mutex::new(HashMap::new()),
                last_runs: Mutex::new([None; 4]),
            }),
        }
    }

    pub fn policy(&self) -> &CleanupPolicy {
        &self.inner.policy
    }

    /// Register `resource` for every tier.
    pub fn register(&self, resource: Arc<dyn ClearableResource>) -> ClearRegistration {
        self.register_for(resource, &CleanupTier::ALL)
    }

    /// Register `resource` for the given tiers only.
    pub fn register_for(
        &self,
        resource: Arc<dyn ClearableResource>,
        tiers: &[CleanupTier],
    ) -> ClearRegistration {
        let mut mask = [false; 4];
        for tier in tiers {
            mask[tier.index()] = true;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let name = resource.name().to_owned();
        self.inner.resources.lock().insert(
            id,
            Registration {
                resource,
                tiers: mask,
            },
        );
        tracing::debug!(target = "ballast.cleanup", resource = %name, "registered clearable resource");

        ClearRegistration {
            id,
            name,
            orchestrator: Arc::downgrade(&self.inner),
        }
    }

    /// Names of all registered resources, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .resources
            .lock()
            .values()
            .map(|registration| registration.resource.name().to_owned())
            .collect();
        names.sort();
        names
    }

    /// When `tier` was last admitted, in clock milliseconds.
    pub fn last_run(&self, tier: CleanupTier) -> Option<u64> {
        self.inner.last_runs.lock()[tier.index()]
    }

    /// Run `tier` in the background unless it is cooling down.
    pub fn request(&self, tier: CleanupTier, trigger: CleanupTrigger) -> CleanupDecision {
        self.request_then(tier, trigger, |_| {})
    }

    /// Like [`CleanupOrchestrator::request`], calling `then` on the worker once the synchronous
    /// part of the run is done. `then` is not called for rate-limited requests.
    pub fn request_then<F>(
        &self,
        tier: CleanupTier,
        trigger: CleanupTrigger,
        then: F,
    ) -> CleanupDecision
    where
        F: FnOnce(&CleanupReport) + Send + 'static,
    {
        let decision = self.inner.admit(tier, trigger);
        if decision.is_started() {
            let inner = self.inner.clone();
            // Fire and forget: the report reaches callers through `then`.
            let _task = self.inner.scheduler.spawn_background(move |token| {
                let report = inner.execute(tier, trigger, &token);
                then(&report);
                if report.cancelled {
                    return Err(Cancelled);
                }
                Ok(report)
            });
        }
        decision
    }

    /// Run `tier` and wait for its synchronous part, for at most the policy's wait timeout.
    ///
    /// On timeout the run is cancelled between resources and this returns
    /// [`TaskError::DeadlineExceeded`]; the cooldown stays stamped.
    pub fn request_and_wait(
        &self,
        tier: CleanupTier,
        trigger: CleanupTrigger,
    ) -> Result<CleanupReport, CleanupError> {
        if let CleanupDecision::RateLimited { retry_after } = self.inner.admit(tier, trigger) {
            return Err(CleanupError::RateLimited { tier, retry_after });
        }

        let inner = self.inner.clone();
        run_with_timeout(
            self.inner.policy.wait_timeout,
            CancellationToken::new(),
            move |token| inner.execute(tier, trigger, &token),
        )
        .map_err(|source| {
            if matches!(source, TaskError::DeadlineExceeded(_)) {
                self.inner.metrics.record_timeout(&tier_op(tier));
            }
            tracing::warn!(
                target = "ballast.cleanup",
                tier = %tier,
                error = %source,
                "cleanup did not complete in time"
            );
            CleanupError::Task { tier, source }
        })
    }
}

impl Inner {
    fn admit(&self, tier: CleanupTier, trigger: CleanupTrigger) -> CleanupDecision {
        let now = self.clock.now_millis();
        let decision = {
            let mut last_runs = self.last_runs.lock();
            let slot = &mut last_runs[tier.index()];
            let min_interval = self.policy.tier(tier).min_interval.as_millis() as u64;
            let previous = *slot;
            match previous {
                Some(last) if tier != CleanupTier::ThermalEmergency => {
                    let elapsed = now.saturating_sub(last);
                    if elapsed < min_interval {
                        CleanupDecision::RateLimited {
                            retry_after: Duration::from_millis(min_interval - elapsed),
                        }
                    } else {
                        *slot = Some(now);
                        CleanupDecision::Started
                    }
                }
                _ => {
                    *slot = Some(now);
                    CleanupDecision::Started
                }
            }
        };

        if let CleanupDecision::RateLimited { retry_after } = decision {
            self.metrics.record_skipped(&tier_op(tier));
            tracing::debug!(
                target = "ballast.cleanup",
                tier = %tier,
                trigger = trigger.as_str(),
                retry_after_ms = retry_after.as_millis() as u64,
                "cleanup request rate limited"
            );
        }
        decision
    }

    fn snapshot(&self, tier: CleanupTier) -> Vec<Arc<dyn ClearableResource>> {
        let resources = self.resources.lock();
        let mut ids: Vec<u64> = resources
            .iter()
            .filter(|(_, registration)| registration.tiers[tier.index()])
            .map(|(&id, _)| id)
            .collect();
        // Registration order.
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| resources.get(&id).map(|r| r.resource.clone()))
            .collect()
    }

    fn execute(
        &self,
        tier: CleanupTier,
        trigger: CleanupTrigger,
        token: &CancellationToken,
    ) -> CleanupReport {
        let start = Instant::now();
        let passes = self.policy.tier(tier).passes.max(1);
        let resources = self.snapshot(tier);

        let mut report = CleanupReport {
            tier,
            trigger,
            passes,
            resources: resources.len(),
            released: ClearOutcome::default(),
            io_dispatched: 0,
            panicked: 0,
            cancelled: false,
        };

        let (io, in_memory): (Vec<_>, Vec<_>) = resources
            .into_iter()
            .partition(|resource| resource.kind() == ClearKind::Io);

        for resource in io {
            let metrics = self.metrics.clone();
            let _task = self.scheduler.spawn_background(move |_token| {
                if let Some(outcome) = clear_isolated(&*resource, ClearRequest::new(tier), &metrics)
                {
                    tracing::debug!(
                        target = "ballast.cleanup",
                        tier = %tier,
                        resource = resource.name(),
                        released_items = outcome.released_items,
                        released_bytes = outcome.released_bytes,
                        "background clear finished"
                    );
                }
                Ok(())
            });
            report.io_dispatched += 1;
        }

        'passes: for pass in 0..passes {
            for resource in &in_memory {
                if token.is_cancelled() {
                    report.cancelled = true;
                    break 'passes;
                }
                let request = ClearRequest { tier, pass, passes };
                match clear_isolated(&**resource, request, &self.metrics) {
                    Some(outcome) => report.released += outcome,
                    // Counted once even when it panics on every pass.
                    None if pass == 0 => report.panicked += 1,
                    None => {}
                }
            }
        }

        let elapsed = start.elapsed();
        self.metrics.record_run(&tier_op(tier), elapsed);
        tracing::info!(
            target = "ballast.cleanup",
            tier = %tier,
            trigger = trigger.as_str(),
            passes,
            resources = report.resources,
            io_dispatched = report.io_dispatched,
            released_items = report.released.released_items,
            released_bytes = report.released.released_bytes,
            panicked = report.panicked,
            elapsed_ms = elapsed.as_millis() as u64,
            "cleanup tier executed"
        );
        report
    }
}

/// Clear one resource, containing panics. `None` means it panicked.
fn clear_isolated(
    resource: &dyn ClearableResource,
    request: ClearRequest,
    metrics: &MetricsRegistry,
) -> Option<ClearOutcome> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| resource.clear(request))) {
        Ok(outcome) => Some(outcome),
        Err(panic) => {
            metrics.record_panic(&format!("clear.{}", resource.name()));
            tracing::warn!(
                target = "ballast.cleanup",
                resource = resource.name(),
                tier = %request.tier,
                pass = request.pass,
                panic = %panic_payload_to_str(&*panic),
                "clearable resource panicked"
            );
            None
        }
    }
}

fn tier_op(tier: CleanupTier) -> String {
    format!("cleanup.{}", tier.as_str())
}

/// Keeps a resource registered; dropping it unregisters the resource.
#[must_use = "dropping the registration unregisters the resource"]
pub struct ClearRegistration {
    id: u64,
    name: String,
    orchestrator: Weak<Inner>,
}

impl ClearRegistration {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ClearRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClearRegistration")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl Drop for ClearRegistration {
    fn drop(&mut self) {
        if let Some(orchestrator) = self.orchestrator.upgrade() {
            orchestrator.resources.lock().remove(&self.id);
        }
    }
}

impl std::fmt::Debug for CleanupOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupOrchestrator")
            .field("policy", &self.inner.policy)
            .field("resources", &self.inner.resources.lock().len())
            .finish()
    }
}
