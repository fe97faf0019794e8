use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Largest entry file read from disk and largest payload decoded from one.
///
/// A damaged length prefix then turns into a miss instead of an enormous allocation.
pub const PAYLOAD_LIMIT_BYTES: u64 = 64 * 1024 * 1024;

/// Fixed-width little-endian bincode, so entry files are byte-stable across platforms.
pub(crate) fn options() -> impl Options + Copy {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(options().serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(options().with_limit(PAYLOAD_LIMIT_BYTES).deserialize(bytes)?)
}
