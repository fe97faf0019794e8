//! Caches for Ballast.
//!
//! - [`BoundedCache`] is the in-memory tier: bounded by total cost and entry count, optional TTL,
//!   oldest-inserted-first eviction.
//! - [`PersistentCache`] is the disk tier: one fingerprinted file per key, optional zstd
//!   compression, lazy TTL expiry and a size-capped GC.
//!
//! Both implement [`ballast_memory::ClearableResource`] so cleanup tiers can flush them.

mod bounded;
mod codec;
mod error;
mod fingerprint;
mod fs_io;
mod persistent;

pub use bounded::{BoundedCache, BoundedCacheConfig, CacheStats};
pub use codec::PAYLOAD_LIMIT_BYTES;
pub use error::{CacheError, Result};
pub use fingerprint::Fingerprint;
pub use persistent::{
    DiskCacheStats, GcReport, PersistentCache, PersistentCacheConfig, DISK_CACHE_SCHEMA_VERSION,
};
