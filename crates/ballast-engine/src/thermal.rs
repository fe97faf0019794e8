use std::sync::Arc;
use std::time::Duration;

use ballast_core::Clock;
use ballast_memory::ThermalLevel;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermalTransition {
    /// Thermal state stayed `serious` or worse for the dwell time.
    Entered,
    /// Thermal state stayed `fair` or better for the recovery time.
    Exited,
}

/// Debounces thermal readings into thermal-emergency transitions.
#[derive(Debug)]
pub struct ThermalGovernor {
    dwell: Duration,
    recovery: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<GovernorState>,
}

#[derive(Debug, Default)]
struct GovernorState {
    in_emergency: bool,
    hot_since_ms: Option<u64>,
    cool_since_ms: Option<u64>,
}

impl ThermalGovernor {
    pub fn new(dwell: Duration, recovery: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            dwell,
            recovery,
            clock,
            state: Mutex::new(GovernorState::default()),
        }
    }

    pub fn is_emergency(&self) -> bool {
        self.state.lock().in_emergency
    }

    /// Feed one thermal reading. Returns a transition at most once per change of state.
    pub fn observe(&self, level: ThermalLevel) -> Option<ThermalTransition> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();

        if !state.in_emergency {
            if !level.is_serious_or_worse() {
                state.hot_since_ms = None;
                return None;
            }
            let since = *state.hot_since_ms.get_or_insert(now);
            if now.saturating_sub(since) < duration_ms(self.dwell) {
                return None;
            }
            state.in_emergency = true;
            state.hot_since_ms = None;
            state.cool_since_ms = None;
            Some(ThermalTransition::Entered)
        } else {
            if level > ThermalLevel::Fair {
                state.cool_since_ms = None;
                return None;
            }
            let since = *state.cool_since_ms.get_or_insert(now);
            if now.saturating_sub(since) < duration_ms(self.recovery) {
                return None;
            }
            state.in_emergency = false;
            state.hot_since_ms = None;
            state.cool_since_ms = None;
            Some(ThermalTransition::Exited)
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
