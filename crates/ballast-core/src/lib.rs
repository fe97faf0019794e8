//! Shared primitives used across the Ballast crates.

mod clock;
mod panic;

pub use clock::{Clock, ManualClock, SystemClock};
pub use panic::panic_payload_to_str;

/// Version stamped into persisted artifacts.
pub const BALLAST_VERSION: &str = env!("CARGO_PKG_VERSION");
