//! The Ballast engine.
//!
//! [`Engine`] wires the pieces from the lower crates together:
//! - a periodic pressure sample feeds the [`CleanupOrchestrator`], the [`QualityController`] and
//!   the [`FrameRateController`];
//! - the [`ThermalGovernor`] pauses every [`Monitored`] subsystem during a sustained thermal
//!   emergency and resumes them afterwards;
//! - the [`DiagnosticsLogger`] reports the whole state at most once per cooldown.
//!
//! Every periodic monitor calls one of the engine's public `tick_*` methods, so tests can drive
//! the engine deterministically without timers.

mod cleanup;
mod diagnostics;
mod engine;
mod frame_rate;
mod monitor;
mod purge;
mod quality;
mod thermal;

pub use cleanup::{
    CleanupDecision, CleanupError, CleanupOrchestrator, CleanupPolicy, CleanupReport,
    CleanupTrigger, ClearRegistration, TierPolicy,
};
pub use diagnostics::{CacheReport, CacheTier, DiagnosticsLogger, DiagnosticsReport};
pub use engine::{Engine, EngineBuilder};
pub use frame_rate::{FrameRateController, FrameRateSnapshot};
pub use monitor::{Monitor, Monitored};
pub use purge::{PurgeReport, TempFilePurger};
pub use quality::{ObserverId, QualityChange, QualityController, QualityObserver};
pub use thermal::{ThermalGovernor, ThermalTransition};
