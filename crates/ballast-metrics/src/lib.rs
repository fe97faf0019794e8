//! Runtime metrics for Ballast: per-operation counters and latency histograms.
//!
//! Operations are free-form dotted names such as `cleanup.aggressive`, `monitor.pressure` or
//! `disk_cache.gc`. The registry is an ordinary value owned by the engine; there is no global
//! instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const LATENCY_SIGFIG: u8 = 3;
// Ten minutes comfortably covers a full disk-cache sweep. Longer samples are clamped.
const MAX_LATENCY_US: u64 = 10 * 60 * 1_000_000;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    inner: Mutex<HashMap<String, OperationMetrics>>,
}

#[derive(Debug)]
struct OperationMetrics {
    runs: u64,
    skipped: u64,
    errors: u64,
    timeouts: u64,
    panics: u64,
    latency_us: Option<Histogram<u64>>,
}

impl OperationMetrics {
    fn new() -> Self {
        Self {
            runs: 0,
            skipped: 0,
            errors: 0,
            timeouts: 0,
            panics: 0,
            latency_us: new_histogram(),
        }
    }
}

fn new_histogram() -> Option<Histogram<u64>> {
    static BOUNDS_ERROR_LOGGED: OnceLock<()> = OnceLock::new();

    match Histogram::<u64>::new_with_bounds(1, MAX_LATENCY_US, LATENCY_SIGFIG) {
        Ok(hist) => Some(hist),
        Err(err) => {
            if BOUNDS_ERROR_LOGGED.set(()).is_ok() {
                tracing::debug!(
                    target = "ballast.metrics",
                    error = %err,
                    "failed to construct bounded latency histogram; using an unbounded one"
                );
            }
            Histogram::<u64>::new(LATENCY_SIGFIG).ok()
        }
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed run of `op` and how long it took.
    pub fn record_run(&self, op: &str, duration: Duration) {
        static RECORD_ERROR_LOGGED: OnceLock<()> = OnceLock::new();

        let micros = (duration.as_micros().min(u128::from(MAX_LATENCY_US)) as u64).max(1);
        self.update(op, |metrics| {
            metrics.runs = metrics.runs.saturating_add(1);
            if let Some(hist) = metrics.latency_us.as_mut() {
                if let Err(err) = hist.record(micros) {
                    if RECORD_ERROR_LOGGED.set(()).is_ok() {
                        tracing::debug!(
                            target = "ballast.metrics",
                            op,
                            micros,
                            error = %err,
                            "failed to record latency sample"
                        );
                    }
                }
            }
        });
    }

    /// Run `f`, recording it as a run of `op`.
    pub fn time<T>(&self, op: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record_run(op, start.elapsed());
        out
    }

    /// A request for `op` was dropped by a rate limit or cooldown.
    pub fn record_skipped(&self, op: &str) {
        self.update(op, |metrics| metrics.skipped = metrics.skipped.saturating_add(1));
    }

    pub fn record_error(&self, op: &str) {
        self.update(op, |metrics| metrics.errors = metrics.errors.saturating_add(1));
    }

    /// `op` did not finish within the time its caller was willing to wait.
    pub fn record_timeout(&self, op: &str) {
        self.update(op, |metrics| metrics.timeouts = metrics.timeouts.saturating_add(1));
    }

    pub fn record_panic(&self, op: &str) {
        self.update(op, |metrics| metrics.panics = metrics.panics.saturating_add(1));
    }

    pub fn reset(&self) {
        self.inner.lock().clear();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        static MERGE_ERROR_LOGGED: OnceLock<()> = OnceLock::new();

        let inner = self.inner.lock();
        let mut operations = BTreeMap::new();
        let mut totals = OperationSnapshot::default();
        let mut total_hist = new_histogram();

        for (op, metrics) in inner.iter() {
            totals.runs = totals.runs.saturating_add(metrics.runs);
            totals.skipped = totals.skipped.saturating_add(metrics.skipped);
            totals.errors = totals.errors.saturating_add(metrics.errors);
            totals.timeouts = totals.timeouts.saturating_add(metrics.timeouts);
            totals.panics = totals.panics.saturating_add(metrics.panics);

            if let (Some(total), Some(hist)) = (total_hist.as_mut(), metrics.latency_us.as_ref()) {
                if let Err(err) = total.add(hist) {
                    if MERGE_ERROR_LOGGED.set(()).is_ok() {
                        tracing::debug!(
                            target = "ballast.metrics",
                            op = %op,
                            error = %err,
                            "failed to merge latency histogram into totals"
                        );
                    }
                }
            }

            operations.insert(
                op.clone(),
                OperationSnapshot {
                    runs: metrics.runs,
                    skipped: metrics.skipped,
                    errors: metrics.errors,
                    timeouts: metrics.timeouts,
                    panics: metrics.panics,
                    latency_us: latency_summary(metrics.latency_us.as_ref()),
                },
            );
        }
        totals.latency_us = latency_summary(total_hist.as_ref());

        MetricsSnapshot { totals, operations }
    }

    fn update(&self, op: &str, f: impl FnOnce(&mut OperationMetrics)) {
        let mut inner = self.inner.lock();
        // Avoid allocating the key once the operation has been seen.
        match inner.get_mut(op) {
            Some(metrics) => f(metrics),
            None => f(inner
                .entry(op.to_owned())
                .or_insert_with(OperationMetrics::new)),
        }
    }
}

fn latency_summary(hist: Option<&Histogram<u64>>) -> LatencySummary {
    match hist {
        Some(hist) if !hist.is_empty() => LatencySummary {
            p50_us: hist.value_at_quantile(0.50),
            p95_us: hist.value_at_quantile(0.95),
            max_us: hist.max(),
        },
        _ => LatencySummary::default(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub totals: OperationSnapshot,
    pub operations: BTreeMap<String, OperationSnapshot>,
}

impl MetricsSnapshot {
    pub fn operation(&self, op: &str) -> Option<&OperationSnapshot> {
        self.operations.get(op)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSnapshot {
    pub runs: u64,
    pub skipped: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub panics: u64,
    pub latency_us: LatencySummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub p50_us: u64,
    pub p95_us: u64,
    pub max_us: u64,
}
