use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in Unix milliseconds.
///
/// Every time-dependent component (cache TTLs, GC rate limits, cleanup cooldowns, thermal dwell,
/// leak snapshots) reads time through this trait so tests can drive time explicitly.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_millis(&self) -> u64;

    /// Milliseconds elapsed since `earlier`, saturating at zero when the clock went backwards.
    fn millis_since(&self, earlier: u64) -> u64 {
        self.now_millis().saturating_sub(earlier)
    }
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_millis() as u64,
            Err(err) => {
                // Extremely rare (system clock set before 1970); avoid spamming hot call sites.
                static REPORTED: OnceLock<()> = OnceLock::new();
                if REPORTED.set(()).is_ok() {
                    tracing::debug!(
                        target = "ballast.core",
                        error = %err,
                        "system time is before unix epoch; using 0 for now_millis"
                    );
                }
                0
            }
        }
    }
}

/// A manually driven clock for deterministic tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let delta = by.as_millis().min(u128::from(u64::MAX)) as u64;
        self.now.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
