use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use ballast_core::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakDetectorConfig {
    /// Ring buffer size; the oldest snapshot is evicted first.
    pub capacity: usize,
    /// Growth is measured over snapshots taken within this window of the newest one.
    pub window: Duration,
    /// Net growth over the window above which growth is suspicious.
    pub growth_threshold_mb: f64,
    /// Live tracked objects older than this are reported.
    pub max_object_age: Duration,
    /// A single step dropping by more than this means memory is being reclaimed, so the window
    /// is not monotonic growth.
    pub drop_tolerance_mb: f64,
}

impl Default for LeakDetectorConfig {
    fn default() -> Self {
        Self {
            capacity: 60,
            window: Duration::from_secs(60),
            growth_threshold_mb: 5.0,
            max_object_age: Duration::from_secs(5 * 60),
            drop_tolerance_mb: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    /// Unix milliseconds.
    pub timestamp_ms: u64,
    pub resident_mb: f64,
    pub tracked_object_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeakSuspicion {
    SustainedGrowth {
        growth_mb: f64,
        window_ms: u64,
        snapshots: usize,
    },
    LongLivedObject {
        type_name: String,
        age_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakReport {
    pub snapshot: MemorySnapshot,
    pub pruned_handles: usize,
    pub suspicions: Vec<LeakSuspicion>,
}

impl LeakReport {
    pub fn is_clean(&self) -> bool {
        self.suspicions.is_empty()
    }
}

struct TrackedHandle {
    type_name: &'static str,
    handle: Weak<dyn Any + Send + Sync>,
    created_at_ms: u64,
    reported: bool,
}

#[derive(Default)]
struct LeakState {
    snapshots: VecDeque<MemorySnapshot>,
    tracked: HashMap<(&'static str, usize), TrackedHandle>,
}

/// Observes memory growth and long-lived objects. Purely diagnostic: it never triggers cleanup.
///
/// Objects are tracked through [`Weak`] handles, so tracking never extends their lifetime.
pub struct LeakDetector {
    config: LeakDetectorConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<LeakState>,
}

impl LeakDetector {
    pub fn new(config: LeakDetectorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: LeakDetectorConfig {
                capacity: config.capacity.max(2),
                ..config
            },
            clock,
            state: Mutex::new(LeakState::default()),
        }
    }

    pub fn config(&self) -> &LeakDetectorConfig {
        &self.config
    }

    /// Start tracking `object`, keyed by its type and address. Re-tracking the same object resets
    /// its age.
    pub fn track<T: Any + Send + Sync>(&self, object: &Arc<T>) {
        let handle = Arc::downgrade(object);
        let handle: Weak<dyn Any + Send + Sync> = handle;
        let type_name = std::any::type_name::<T>();
        let key = (type_name, Arc::as_ptr(object) as *const () as usize);
        let created_at_ms = self.clock.now_millis();
        self.state.lock().tracked.insert(
            key,
            TrackedHandle {
                type_name,
                handle,
                created_at_ms,
                reported: false,
            },
        );
    }

    pub fn untrack<T: Any + Send + Sync>(&self, object: &Arc<T>) -> bool {
        let key = (
            std::any::type_name::<T>(),
            Arc::as_ptr(object) as *const () as usize,
        );
        self.state.lock().tracked.remove(&key).is_some()
    }

    /// Number of tracked handles whose object is still alive.
    pub fn tracked_count(&self) -> usize {
        self.state
            .lock()
            .tracked
            .values()
            .filter(|tracked| tracked.handle.strong_count() > 0)
            .count()
    }

    pub fn snapshots(&self) -> Vec<MemorySnapshot> {
        self.state.lock().snapshots.iter().copied().collect()
    }

    /// Prune dead handles and append a snapshot taken now.
    pub fn record_snapshot(&self, resident_mb: f64) -> MemorySnapshot {
        self.record(resident_mb).0
    }

    /// Append an externally produced snapshot (e.g. a replayed sequence).
    pub fn push_snapshot(&self, snapshot: MemorySnapshot) {
        let mut state = self.state.lock();
        push_bounded(&mut state.snapshots, snapshot, self.config.capacity);
    }

    /// Run growth and age analysis over the current state.
    pub fn analyze(&self) -> Vec<LeakSuspicion> {
        let state = self.state.lock();
        let mut suspicions = Vec::new();
        if let Some(growth) = self.growth_suspicion(&state.snapshots) {
            suspicions.push(growth);
        }

        let now = self.clock.now_millis();
        suspicions.extend(self.long_lived(&state, now).map(|(_, suspicion)| suspicion));
        suspicions
    }

    /// One periodic pass: snapshot, prune, analyze, and log each suspicion.
    ///
    /// A long-lived object is logged the first time it crosses the age limit only.
    pub fn tick(&self, resident_mb: f64) -> LeakReport {
        let (snapshot, pruned_handles) = self.record(resident_mb);
        let now = self.clock.now_millis();

        let mut state = self.state.lock();
        let mut suspicions = Vec::new();
        if let Some(growth) = self.growth_suspicion(&state.snapshots) {
            suspicions.push(growth);
        }

        let fresh: Vec<_> = self
            .long_lived(&state, now)
            .filter(|(key, _)| state.tracked.get(key).is_some_and(|t| !t.reported))
            .collect();
        for (key, suspicion) in fresh {
            if let Some(tracked) = state.tracked.get_mut(&key) {
                tracked.reported = true;
            }
            suspicions.push(suspicion);
        }
        drop(state);

        for suspicion in &suspicions {
            match suspicion {
                LeakSuspicion::SustainedGrowth {
                    growth_mb,
                    window_ms,
                    snapshots,
                } => tracing::warn!(
                    target = "ballast.leak",
                    growth_mb,
                    window_ms,
                    snapshots,
                    "sustained memory growth; possible leak"
                ),
                LeakSuspicion::LongLivedObject { type_name, age_ms } => tracing::warn!(
                    target = "ballast.leak",
                    type_name = %type_name,
                    age_ms,
                    "tracked object outlived its expected lifetime"
                ),
            }
        }

        LeakReport {
            snapshot,
            pruned_handles,
            suspicions,
        }
    }

    fn record(&self, resident_mb: f64) -> (MemorySnapshot, usize) {
        let timestamp_ms = self.clock.now_millis();
        let mut state = self.state.lock();

        let before = state.tracked.len();
        state.tracked.retain(|_, tracked| tracked.handle.strong_count() > 0);
        let pruned = before - state.tracked.len();

        let snapshot = MemorySnapshot {
            timestamp_ms,
            resident_mb,
            tracked_object_count: state.tracked.len(),
        };
        push_bounded(&mut state.snapshots, snapshot, self.config.capacity);

        if pruned > 0 {
            tracing::trace!(target = "ballast.leak", pruned, "pruned dead handles");
        }
        (snapshot, pruned)
    }

    fn growth_suspicion(&self, snapshots: &VecDeque<MemorySnapshot>) -> Option<LeakSuspicion> {
        let last = snapshots.back()?;
        let window_ms = u64::try_from(self.config.window.as_millis()).unwrap_or(u64::MAX);
        let start = last.timestamp_ms.saturating_sub(window_ms);
        // Growth is measured from the newest snapshot at or before the window start, so a late
        // tick does not leave the window holding a single sample. The anchor may not be older
        // than two windows.
        let horizon = start.saturating_sub(window_ms);
        let first_index = snapshots
            .iter()
            .rposition(|snapshot| snapshot.timestamp_ms <= start && snapshot.timestamp_ms >= horizon)
            .or_else(|| snapshots.iter().position(|snapshot| snapshot.timestamp_ms >= start))?;
        let window: Vec<&MemorySnapshot> = snapshots.iter().skip(first_index).collect();
        if window.len() < 2 {
            return None;
        }

        let reclaimed = window
            .windows(2)
            .any(|step| step[0].resident_mb - step[1].resident_mb > self.config.drop_tolerance_mb);
        if reclaimed {
            return None;
        }

        let first = window[0];
        let growth_mb = last.resident_mb - first.resident_mb;
        (growth_mb > self.config.growth_threshold_mb).then(|| LeakSuspicion::SustainedGrowth {
            growth_mb,
            window_ms: last.timestamp_ms - first.timestamp_ms,
            snapshots: window.len(),
        })
    }

    fn long_lived<'a>(
        &'a self,
        state: &'a LeakState,
        now: u64,
    ) -> impl Iterator<Item = ((&'static str, usize), LeakSuspicion)> + 'a {
        let max_age_ms = u64::try_from(self.config.max_object_age.as_millis()).unwrap_or(u64::MAX);
        state.tracked.iter().filter_map(move |(key, tracked)| {
            let age_ms = now.saturating_sub(tracked.created_at_ms);
            (tracked.handle.strong_count() > 0 && age_ms >= max_age_ms).then(|| {
                (
                    *key,
                    LeakSuspicion::LongLivedObject {
                        type_name: tracked.type_name.to_string(),
                        age_ms,
                    },
                )
            })
        })
    }
}

impl std::fmt::Debug for LeakDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LeakDetector")
            .field("config", &self.config)
            .field("snapshots", &state.snapshots.len())
            .field("tracked", &state.tracked.len())
            .finish()
    }
}

fn push_bounded(snapshots: &mut VecDeque<MemorySnapshot>, snapshot: MemorySnapshot, capacity: usize) {
    while snapshots.len() >= capacity {
        snapshots.pop_front();
    }
    snapshots.push_back(snapshot);
}
