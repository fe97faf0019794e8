use std::io::{self, Read};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use ballast_core::{Clock, BALLAST_VERSION};
use ballast_memory::{ClearKind, ClearOutcome, ClearRequest, ClearableResource, CleanupTier, MB};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::fingerprint::Fingerprint;
use crate::codec::{self, PAYLOAD_LIMIT_BYTES};
use crate::fs_io::{is_partial_write, read_bounded, remove_quietly, write_atomic};

pub const DISK_CACHE_SCHEMA_VERSION: u32 = 1;

const MAGIC: &[u8; 4] = b"BLC1";
const CODEC_RAW: u8 = 0;
const CODEC_ZSTD: u8 = 1;
const PREAMBLE_LEN: usize = MAGIC.len() + 1;

/// Temporary files from interrupted writes are only collected once they are this old, so GC
/// never races an in-flight write.
const TMP_FILE_GRACE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistentCacheConfig {
    /// TTL used by [`PersistentCache::put`].
    pub default_ttl: Duration,
    /// Total size of entry files GC trims down to.
    pub max_bytes: u64,
    /// Minimum time between opportunistic GC runs triggered by writes.
    pub gc_interval: Duration,
    /// zstd level; `None` stores entries uncompressed.
    pub compression_level: Option<i32>,
}

impl Default for PersistentCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(24 * 60 * 60),
            max_bytes: 256 * MB,
            gc_interval: Duration::from_secs(5 * 60),
            compression_level: Some(3),
        }
    }
}

/// What a GC pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    pub scanned: u64,
    pub expired: u64,
    pub corrupt: u64,
    pub evicted: u64,
    pub tmp_removed: u64,
    pub skipped: u64,
    pub freed_bytes: u64,
    pub remaining_bytes: u64,
}

impl GcReport {
    pub fn removed(&self) -> u64 {
        self.expired + self.corrupt + self.evicted + self.tmp_removed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

impl DiskCacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Metadata written before the payload of every entry.
#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    schema_version: u32,
    ballast_version: String,
    type_tag: String,
    key: Vec<u8>,
    created_at_ms: u64,
    expires_at_ms: u64,
    payload_len: u64,
}

struct Inner {
    name: String,
    root: PathBuf,
    config: PersistentCacheConfig,
    clock: Arc<dyn Clock>,
    last_gc_ms: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

/// Disk-backed cache with one file per key.
///
/// Entry file: `BLC1` magic, a codec byte (0 raw, 1 zstd), then the (possibly compressed) body:
/// a bincode [`EntryHeader`] followed by the bincode-encoded value. Every entry carries the schema
/// version, the Ballast version and `std::any::type_name::<V>()`; a mismatch is treated as
/// corruption. The file name is the SHA-256 of the encoded key, and the full key is stored to
/// detect fingerprint collisions.
///
/// The format is not stable across releases. The cache is advisory: every read failure short of
/// an I/O error on the directory itself is a miss.
///
/// Operations block on file I/O. Use the `*_async` variants from async code.
pub struct PersistentCache<K, V> {
    inner: Arc<Inner>,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V> Clone for PersistentCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K, V> PersistentCache<K, V>
where
    K: Serialize,
    V: Serialize + DeserializeOwned,
{
    pub fn open(
        name: impl Into<String>,
        root: impl AsRef<Path>,
        config: PersistentCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            inner: Arc::new(Inner {
                name: name.into(),
                root,
                config,
                clock,
                last_gc_ms: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                writes: AtomicU64::new(0),
            }),
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn config(&self) -> &PersistentCacheConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> DiskCacheStats {
        DiskCacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            writes: self.inner.writes.load(Ordering::Relaxed),
        }
    }

    pub fn put(&self, key: &K, value: &V) -> Result<()> {
        self.put_with_ttl(key, value, self.inner.config.default_ttl)
    }

    /// Nothing is written when encoding fails.
    pub fn put_with_ttl(&self, key: &K, value: &V, ttl: Duration) -> Result<()> {
        let key = codec::encode(key)?;
        let payload = codec::encode(value)?;
        let path = self.entry_path(&Fingerprint::from_bytes(&key));

        let created_at_ms = self.inner.clock.now_millis();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let header = EntryHeader {
            schema_version: DISK_CACHE_SCHEMA_VERSION,
            ballast_version: BALLAST_VERSION.to_string(),
            type_tag: type_tag::<V>().to_string(),
            key,
            created_at_ms,
            expires_at_ms: created_at_ms.saturating_add(ttl_ms),
            payload_len: payload.len() as u64,
        };

        let bytes = encode_entry(&header, &payload, self.inner.config.compression_level)?;
        write_atomic(&path, &bytes)?;
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        self.maybe_gc();
        Ok(())
    }

    /// `Ok(None)` for missing, expired, corrupt or mismatched entries. Expired and corrupt
    /// entries are deleted.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let value = self.load(key)?;
        let counter = if value.is_some() {
            &self.inner.hits
        } else {
            &self.inner.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    /// Returns whether an entry file was removed.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let key = codec::encode(key)?;
        let path = self.entry_path(&Fingerprint::from_bytes(&key));
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete every file in the cache directory.
    pub fn clear(&self) -> Result<ClearOutcome> {
        let mut outcome = ClearOutcome::default();
        for path in self.listing()? {
            let Ok(meta) = std::fs::symlink_metadata(&path) else {
                continue;
            };
            if meta.is_dir() {
                continue;
            }
            if remove_quietly(&path, "clear") {
                outcome += ClearOutcome::new(1, meta.len());
            }
        }
        tracing::debug!(
            target = "ballast.cache",
            cache = %self.inner.name,
            removed = outcome.released_items,
            "cleared disk cache"
        );
        Ok(outcome)
    }

    /// Delete expired, corrupt and stale entries, then the oldest entries until the directory is
    /// within `max_bytes`.
    pub fn gc(&self) -> Result<GcReport> {
        self.inner
            .last_gc_ms
            .store(self.inner.clock.now_millis(), Ordering::Relaxed);
        self.sweep(Some(self.inner.config.max_bytes))
    }

    /// Delete expired, corrupt and stale entries only.
    pub fn purge_expired(&self) -> Result<GcReport> {
        self.sweep(None)
    }

    fn load(&self, key: &K) -> Result<Option<V>> {
        let key = codec::encode(key)?;
        let path = self.entry_path(&Fingerprint::from_bytes(&key));

        let bytes = match read_bounded(&path) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(err @ CacheError::Corrupt { .. }) => {
                self.discard(&path, &err);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let (header, payload) = match decode_entry(&path, &bytes) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.discard(&path, &err);
                return Ok(None);
            }
        };

        if let Some(reason) = stale_reason::<V>(&header) {
            self.discard(&path, &CacheError::Corrupt { path: path.clone(), reason });
            return Ok(None);
        }

        if header.key != key {
            // Fingerprint collision: a miss, but the other key's entry stays.
            return Ok(None);
        }

        if self.inner.clock.now_millis() >= header.expires_at_ms {
            remove_quietly(&path, "get.expired");
            return Ok(None);
        }

        match codec::decode::<V>(&payload) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                self.discard(&path, &err);
                Ok(None)
            }
        }
    }

    fn discard(&self, path: &Path, err: &CacheError) {
        tracing::debug!(
            target = "ballast.cache",
            cache = %self.inner.name,
            path = %path.display(),
            error = %err,
            "discarding unreadable cache entry"
        );
        remove_quietly(path, "discard");
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.inner.root.join(format!("{fingerprint}.bin"))
    }

    fn maybe_gc(&self) {
        let interval_ms = u64::try_from(self.inner.config.gc_interval.as_millis()).unwrap_or(u64::MAX);
        let now = self.inner.clock.now_millis();
        let last = self.inner.last_gc_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < interval_ms {
            return;
        }
        if self
            .inner
            .last_gc_ms
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        if let Err(err) = self.sweep(Some(self.inner.config.max_bytes)) {
            tracing::debug!(
                target = "ballast.cache",
                cache = %self.inner.name,
                error = %err,
                "opportunistic disk cache gc failed"
            );
        }
    }

    /// Directory snapshot taken before any deletion.
    fn listing(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.inner.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(entries.filter_map(|entry| entry.ok().map(|e| e.path())).collect())
    }

    fn sweep(&self, max_bytes: Option<u64>) -> Result<GcReport> {
        let now = self.inner.clock.now_millis();
        let mut report = GcReport::default();
        let mut live: Vec<(u64, u64, PathBuf)> = Vec::new();
        let mut total_bytes: u64 = 0;

        for path in self.listing()? {
            let meta = match std::fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(_) => {
                    report.skipped += 1;
                    continue;
                }
            };
            if !meta.file_type().is_file() {
                continue;
            }

            if is_partial_write(&path) {
                let grace_ms = u64::try_from(TMP_FILE_GRACE.as_millis()).unwrap_or(u64::MAX);
                let stale = meta
                    .modified()
                    .ok()
                    .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
                    .and_then(|since_epoch| u64::try_from(since_epoch.as_millis()).ok())
                    .is_some_and(|modified_ms| now.saturating_sub(modified_ms) >= grace_ms);
                if stale && remove_quietly(&path, "gc.stale_tmp") {
                    report.tmp_removed += 1;
                    report.freed_bytes += meta.len();
                }
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some("bin") {
                continue;
            }
            report.scanned += 1;

            let header = match read_bounded(&path).and_then(|bytes| match bytes {
                Some(bytes) => read_header(&path, &bytes).map(Some),
                None => Ok(None),
            }) {
                Ok(Some(header)) => header,
                // Removed since the listing was taken.
                Ok(None) => continue,
                Err(CacheError::Io(_)) => {
                    report.skipped += 1;
                    continue;
                }
                Err(_) => {
                    if remove_quietly(&path, "gc.corrupt") {
                        report.corrupt += 1;
                        report.freed_bytes += meta.len();
                    }
                    continue;
                }
            };

            let misnamed = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem != Fingerprint::from_bytes(&header.key).to_hex());
            if misnamed || stale_reason::<V>(&header).is_some() {
                if remove_quietly(&path, "gc.stale") {
                    report.corrupt += 1;
                    report.freed_bytes += meta.len();
                }
                continue;
            }

            if now >= header.expires_at_ms {
                if remove_quietly(&path, "gc.expired") {
                    report.expired += 1;
                    report.freed_bytes += meta.len();
                }
                continue;
            }

            total_bytes = total_bytes.saturating_add(meta.len());
            live.push((header.created_at_ms, meta.len(), path));
        }

        if let Some(max_bytes) = max_bytes {
            if total_bytes > max_bytes {
                live.sort_by_key(|(created_at_ms, _, _)| *created_at_ms);
                for (_, len, path) in &live {
                    if total_bytes <= max_bytes {
                        break;
                    }
                    if remove_quietly(path, "gc.over_budget") {
                        total_bytes = total_bytes.saturating_sub(*len);
                        report.evicted += 1;
                        report.freed_bytes += len;
                    }
                }
            }
        }

        report.remaining_bytes = total_bytes;
        tracing::debug!(
            target = "ballast.cache",
            cache = %self.inner.name,
            scanned = report.scanned,
            expired = report.expired,
            corrupt = report.corrupt,
            evicted = report.evicted,
            tmp_removed = report.tmp_removed,
            skipped = report.skipped,
            remaining_bytes = report.remaining_bytes,
            "disk cache gc finished"
        );
        Ok(report)
    }
}

impl<K, V> PersistentCache<K, V>
where
    K: Serialize + Send + 'static,
    V: Serialize + DeserializeOwned + Send + 'static,
{
    /// [`PersistentCache::put`] on the blocking pool of the current tokio runtime.
    pub async fn put_async(&self, key: K, value: V) -> Result<()> {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || cache.put(&key, &value)).await?
    }

    pub async fn get_async(&self, key: K) -> Result<Option<V>> {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || cache.get(&key)).await?
    }

    pub async fn remove_async(&self, key: K) -> Result<bool> {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || cache.remove(&key)).await?
    }
}

impl<K, V> ClearableResource for PersistentCache<K, V>
where
    K: Serialize,
    V: Serialize + DeserializeOwned,
{
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn kind(&self) -> ClearKind {
        ClearKind::Io
    }

    fn clear(&self, request: ClearRequest) -> ClearOutcome {
        let result = match request.tier {
            CleanupTier::Normal => self.gc().map(gc_outcome),
            CleanupTier::Aggressive => self.purge_expired().map(gc_outcome),
            CleanupTier::Emergency | CleanupTier::ThermalEmergency => PersistentCache::clear(self),
        };
        result.unwrap_or_else(|err| {
            tracing::warn!(
                target = "ballast.cache",
                cache = %self.inner.name,
                tier = %request.tier,
                error = %err,
                "disk cache cleanup failed"
            );
            ClearOutcome::default()
        })
    }
}

impl<K, V> std::fmt::Debug for PersistentCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCache")
            .field("name", &self.inner.name)
            .field("root", &self.inner.root)
            .field("config", &self.inner.config)
            .finish()
    }
}

fn gc_outcome(report: GcReport) -> ClearOutcome {
    ClearOutcome::new(report.removed(), report.freed_bytes)
}

fn type_tag<V>() -> &'static str {
    std::any::type_name::<V>()
}

fn stale_reason<V>(header: &EntryHeader) -> Option<&'static str> {
    if header.schema_version != DISK_CACHE_SCHEMA_VERSION {
        Some("schema version mismatch")
    } else if header.ballast_version != BALLAST_VERSION {
        Some("ballast version mismatch")
    } else if header.type_tag != type_tag::<V>() {
        Some("value type mismatch")
    } else {
        None
    }
}

fn encode_entry(header: &EntryHeader, payload: &[u8], level: Option<i32>) -> Result<Vec<u8>> {
    let mut body = codec::encode(header)?;
    body.extend_from_slice(payload);

    let mut out = Vec::with_capacity(PREAMBLE_LEN + body.len());
    out.extend_from_slice(MAGIC);
    match level {
        Some(level) => {
            out.push(CODEC_ZSTD);
            let compressed = zstd::bulk::compress(&body, level).map_err(CacheError::Compression)?;
            out.extend_from_slice(&compressed);
        }
        None => {
            out.push(CODEC_RAW);
            out.extend_from_slice(&body);
        }
    }

    let size = out.len() as u64;
    if size > PAYLOAD_LIMIT_BYTES {
        return Err(CacheError::Oversize {
            size,
            limit: PAYLOAD_LIMIT_BYTES,
        });
    }
    Ok(out)
}

fn body_reader<'a>(path: &Path, bytes: &'a [u8]) -> Result<Box<dyn Read + 'a>> {
    if bytes.len() < PREAMBLE_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: "missing magic",
        });
    }
    let body = &bytes[PREAMBLE_LEN..];
    match bytes[MAGIC.len()] {
        CODEC_RAW => Ok(Box::new(body)),
        CODEC_ZSTD => {
            let decoder = zstd::stream::read::Decoder::new(body).map_err(CacheError::Compression)?;
            // Bound decompressed output so a crafted frame cannot balloon in memory.
            Ok(Box::new(decoder.take(PAYLOAD_LIMIT_BYTES + 1)))
        }
        _ => Err(CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: "unknown codec",
        }),
    }
}

fn read_header_from(reader: &mut dyn Read) -> Result<EntryHeader> {
    Ok(codec::options()
        .with_limit(PAYLOAD_LIMIT_BYTES)
        .deserialize_from(reader)?)
}

fn read_header(path: &Path, bytes: &[u8]) -> Result<EntryHeader> {
    let mut reader = body_reader(path, bytes)?;
    read_header_from(&mut reader)
}

fn decode_entry(path: &Path, bytes: &[u8]) -> Result<(EntryHeader, Vec<u8>)> {
    let mut reader = body_reader(path, bytes)?;
    let header = read_header_from(&mut reader)?;
    if header.payload_len > PAYLOAD_LIMIT_BYTES {
        return Err(CacheError::Oversize {
            size: header.payload_len,
            limit: PAYLOAD_LIMIT_BYTES,
        });
    }

    let mut payload = Vec::with_capacity(header.payload_len as usize);
    reader
        .take(header.payload_len)
        .read_to_end(&mut payload)
        .map_err(CacheError::Compression)?;
    if payload.len() as u64 != header.payload_len {
        return Err(CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: "truncated payload",
        });
    }
    Ok((header, payload))
}
