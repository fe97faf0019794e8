use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ballast_memory::{determine_level, QualityInputs, QualityLevel, QualitySettings};
use parking_lot::Mutex;
use serde::Serialize;

/// Emitted whenever the effective quality level changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityChange {
    pub previous: QualityLevel,
    pub level: QualityLevel,
    pub settings: QualitySettings,
}

pub type QualityObserver = Arc<dyn Fn(&QualityChange) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Owns the current quality level and notifies observers when it changes.
///
/// The level is derived from the latest inputs unless an override is set. Observers are called
/// outside the controller's lock, on the thread that caused the change.
pub struct QualityController {
    state: Mutex<QualityState>,
    observers: Mutex<Vec<(ObserverId, QualityObserver)>>,
    next_observer: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
struct QualityState {
    level: QualityLevel,
    derived: QualityLevel,
    override_level: Option<QualityLevel>,
}

impl QualityController {
    pub fn new(initial: QualityLevel) -> Self {
        Self {
            state: Mutex::new(QualityState {
                level: initial,
                derived: initial,
                override_level: None,
            }),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        }
    }

    pub fn level(&self) -> QualityLevel {
        self.state.lock().level
    }

    pub fn settings(&self) -> &'static QualitySettings {
        self.level().settings()
    }

    pub fn override_level(&self) -> Option<QualityLevel> {
        self.state.lock().override_level
    }

    pub fn subscribe(&self, observer: QualityObserver) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    /// Re-derive the level from `inputs`. Returns the change that was published, if any.
    pub fn update(&self, inputs: &QualityInputs) -> Option<QualityChange> {
        let derived = determine_level(inputs);
        self.transition(|state| state.derived = derived)
    }

    /// Pin the level (`Some`) or go back to the derived level (`None`).
    pub fn set_override(&self, level: Option<QualityLevel>) -> Option<QualityChange> {
        self.transition(|state| state.override_level = level)
    }

    fn transition(&self, apply: impl FnOnce(&mut QualityState)) -> Option<QualityChange> {
        let change = {
            let mut state = self.state.lock();
            apply(&mut state);
            let next = state.override_level.unwrap_or(state.derived);
            if next == state.level {
                return None;
            }
            let previous = std::mem::replace(&mut state.level, next);
            QualityChange {
                previous,
                level: next,
                settings: *next.settings(),
            }
        };

        tracing::info!(
            target = "ballast.quality",
            from = %change.previous,
            to = %change.level,
            "quality level changed"
        );

        let observers: Vec<QualityObserver> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(&change);
        }

        Some(change)
    }
}

impl Default for QualityController {
    fn default() -> Self {
        Self::new(QualityLevel::High)
    }
}

impl std::fmt::Debug for QualityController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.lock();
        f.debug_struct("QualityController")
            .field("level", &state.level)
            .field("override", &state.override_level)
            .field("observers", &self.observers.lock().len())
            .finish()
    }
}
