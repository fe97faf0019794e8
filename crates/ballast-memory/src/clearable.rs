use std::fmt;

use serde::{Deserialize, Serialize};

/// Cleanup intensity, ordered from least to most disruptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTier {
    /// Routine housekeeping: drop expired entries, trim to budget.
    Normal,
    /// Release everything that can be rebuilt cheaply.
    Aggressive,
    /// Release everything that can be rebuilt at all.
    Emergency,
    /// Emergency clear issued by the thermal governor; bypasses cooldowns.
    ThermalEmergency,
}

impl CleanupTier {
    pub const ALL: [CleanupTier; 4] = [
        CleanupTier::Normal,
        CleanupTier::Aggressive,
        CleanupTier::Emergency,
        CleanupTier::ThermalEmergency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CleanupTier::Normal => "normal",
            CleanupTier::Aggressive => "aggressive",
            CleanupTier::Emergency => "emergency",
            CleanupTier::ThermalEmergency => "thermal_emergency",
        }
    }

    pub fn index(self) -> usize {
        match self {
            CleanupTier::Normal => 0,
            CleanupTier::Aggressive => 1,
            CleanupTier::Emergency => 2,
            CleanupTier::ThermalEmergency => 3,
        }
    }

    /// `Emergency` or `ThermalEmergency`.
    pub fn is_emergency(self) -> bool {
        self >= CleanupTier::Emergency
    }
}

impl fmt::Display for CleanupTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a resource's work happens. I/O resources are flushed on the I/O pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearKind {
    #[default]
    InMemory,
    Io,
}

/// Parameters of a single clear call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearRequest {
    pub tier: CleanupTier,
    /// Zero-based pass within the current cleanup run.
    pub pass: u32,
    /// Total passes configured for the tier.
    pub passes: u32,
}

impl ClearRequest {
    pub fn new(tier: CleanupTier) -> Self {
        Self {
            tier,
            pass: 0,
            passes: 1,
        }
    }

    pub fn is_last_pass(&self) -> bool {
        self.pass + 1 >= self.passes
    }
}

/// What a clear call released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearOutcome {
    pub released_items: u64,
    pub released_bytes: u64,
}

impl ClearOutcome {
    pub fn new(released_items: u64, released_bytes: u64) -> Self {
        Self {
            released_items,
            released_bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.released_items == 0 && self.released_bytes == 0
    }
}

impl std::ops::AddAssign for ClearOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.released_items = self.released_items.saturating_add(rhs.released_items);
        self.released_bytes = self.released_bytes.saturating_add(rhs.released_bytes);
    }
}

/// A component that can release memory or disk on request.
///
/// Implementations must tolerate being cleared concurrently with normal use; the cleanup
/// orchestrator never holds its own locks while calling [`ClearableResource::clear`].
pub trait ClearableResource: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ClearKind {
        ClearKind::InMemory
    }

    fn clear(&self, request: ClearRequest) -> ClearOutcome;
}

/// Adapts a closure into a [`ClearableResource`].
pub struct ClearFn<F> {
    name: String,
    kind: ClearKind,
    f: F,
}

impl<F> ClearFn<F>
where
    F: Fn(ClearRequest) -> ClearOutcome + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            kind: ClearKind::InMemory,
            f,
        }
    }

    pub fn io(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            kind: ClearKind::Io,
            f,
        }
    }
}

impl<F> ClearableResource for ClearFn<F>
where
    F: Fn(ClearRequest) -> ClearOutcome + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClearKind {
        self.kind
    }

    fn clear(&self, request: ClearRequest) -> ClearOutcome {
        (self.f)(request)
    }
}

impl<F> fmt::Debug for ClearFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClearFn")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
