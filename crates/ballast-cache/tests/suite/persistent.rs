use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ballast_cache::{Fingerprint, PersistentCache, PersistentCacheConfig};
use ballast_core::{Clock, ManualClock, SystemClock};
use ballast_memory::{ClearRequest, ClearableResource, CleanupTier};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

const START: u64 = 1_700_000_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Thumbnail {
    id: u64,
    label: String,
    pixels: Vec<u8>,
}

fn config(compression_level: Option<i32>) -> PersistentCacheConfig {
    PersistentCacheConfig {
        default_ttl: Duration::from_secs(60),
        max_bytes: 1024 * 1024,
        gc_interval: Duration::from_secs(3600),
        compression_level,
    }
}

fn open<V>(dir: &Path, clock: &Arc<ManualClock>) -> PersistentCache<String, V>
where
    V: Serialize + for<'de> Deserialize<'de>,
{
    PersistentCache::open("test", dir, config(Some(3)), clock.clone()).unwrap()
}

fn entry_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "bin"))
        .collect();
    files.sort();
    files
}

/// File stem for a `String` key: bincode writes a little-endian u64 length, then the bytes.
fn stem_for(key: &str) -> String {
    let mut bytes = (key.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(key.as_bytes());
    Fingerprint::from_bytes(bytes).to_string()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn values_round_trip_with_and_without_compression(
        id in any::<u64>(),
        label in ".{0,40}",
        pixels in proptest::collection::vec(any::<u8>(), 0..2048),
        compressed in any::<bool>(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(START));
        let level = compressed.then_some(3);
        let cache: PersistentCache<String, Thumbnail> =
            PersistentCache::open("prop", dir.path(), config(level), clock).unwrap();

        let value = Thumbnail { id, label, pixels };
        cache.put(&"thumb".to_string(), &value).unwrap();
        prop_assert_eq!(cache.get(&"thumb".to_string()).unwrap(), Some(value));
    }
}

#[test]
fn entries_expire_at_their_ttl_and_are_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let cache = open::<u32>(dir.path(), &clock);
    let key = "session".to_string();

    cache
        .put_with_ttl(&key, &7, Duration::from_secs(10))
        .unwrap();
    clock.advance(Duration::from_millis(9_999));
    assert_eq!(cache.get(&key).unwrap(), Some(7));
    assert_eq!(entry_files(dir.path()).len(), 1);

    clock.advance(Duration::from_millis(1));
    assert_eq!(cache.get(&key).unwrap(), None);
    assert!(entry_files(dir.path()).is_empty());
}

#[test]
fn corrupt_entries_are_misses_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let cache = open::<Vec<u8>>(dir.path(), &clock);
    let key = "blob".to_string();

    cache.put(&key, &vec![1, 2, 3]).unwrap();
    let files = entry_files(dir.path());
    assert_eq!(files.len(), 1);
    fs::write(&files[0], b"BLC1\x01garbage").unwrap();

    assert_eq!(cache.get(&key).unwrap(), None);
    assert!(entry_files(dir.path()).is_empty());
}

#[test]
fn value_type_mismatch_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let strings = open::<String>(dir.path(), &clock);
    strings.put(&"k".to_string(), &"hello".to_string()).unwrap();

    let numbers = open::<u64>(dir.path(), &clock);
    assert_eq!(numbers.get(&"k".to_string()).unwrap(), None);
    assert!(entry_files(dir.path()).is_empty());
}

#[test]
fn fingerprint_collisions_are_misses_without_deleting() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let cache = open::<u32>(dir.path(), &clock);
    cache.put(&"a".to_string(), &1).unwrap();

    // Pretend `b` hashes to the same file as `a`.
    let a_path = dir.path().join(format!("{}.bin", stem_for("a")));
    let b_path = dir.path().join(format!("{}.bin", stem_for("b")));
    assert!(a_path.exists());
    fs::copy(&a_path, &b_path).unwrap();

    assert_eq!(cache.get(&"b".to_string()).unwrap(), None);
    assert!(b_path.exists());
    assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(1));
}

#[test]
fn remove_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let cache = open::<u32>(dir.path(), &clock);
    for i in 0..3u32 {
        cache.put(&format!("k{i}"), &i).unwrap();
    }

    assert!(cache.remove(&"k0".to_string()).unwrap());
    assert!(!cache.remove(&"k0".to_string()).unwrap());
    assert_eq!(cache.clear().unwrap().released_items, 2);
    assert!(entry_files(dir.path()).is_empty());
}

#[test]
fn gc_removes_expired_then_oldest_until_under_cap() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let cache: PersistentCache<String, Vec<u8>> =
        PersistentCache::open("gc", dir.path(), config(None), clock.clone()).unwrap();

    cache
        .put_with_ttl(&"expiring".to_string(), &vec![0; 100], Duration::from_secs(1))
        .unwrap();
    for i in 0..4 {
        clock.advance(Duration::from_secs(1));
        cache.put(&format!("k{i}"), &vec![i as u8; 1000]).unwrap();
    }
    let entry_len = fs::metadata(dir.path().join(format!("{}.bin", stem_for("k0"))))
        .unwrap()
        .len();

    let cache: PersistentCache<String, Vec<u8>> = PersistentCache::open(
        "gc",
        dir.path(),
        PersistentCacheConfig {
            max_bytes: entry_len * 2,
            ..config(None)
        },
        clock.clone(),
    )
    .unwrap();
    let report = cache.gc().unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.evicted, 2);
    assert_eq!(report.remaining_bytes, entry_len * 2);

    assert_eq!(cache.get(&"k0".to_string()).unwrap(), None);
    assert_eq!(cache.get(&"k1".to_string()).unwrap(), None);
    assert_eq!(cache.get(&"k2".to_string()).unwrap(), Some(vec![2; 1000]));
    assert_eq!(cache.get(&"k3".to_string()).unwrap(), Some(vec![3; 1000]));
}

#[test]
fn gc_skips_fresh_tmp_files_and_deletes_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let cache = open::<u32>(dir.path(), &clock);
    cache.put(&"live".to_string(), &1).unwrap();

    let tmp = dir.path().join("deadbeef.bin.tmp.1.0");
    fs::write(&tmp, b"partial").unwrap();
    fs::write(dir.path().join("junk.bin"), b"not an entry").unwrap();

    let report = cache.gc().unwrap();
    assert_eq!(report.corrupt, 1);
    assert_eq!(report.tmp_removed, 0);
    assert!(tmp.exists());
    assert_eq!(entry_files(dir.path()).len(), 1);
}

#[test]
fn gc_removes_tmp_files_older_than_the_grace_period_by_the_cache_clock() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let cache = open::<u32>(dir.path(), &clock);

    let tmp = dir.path().join("deadbeef.bin.tmp.1.0");
    fs::write(&tmp, b"partial").unwrap();

    clock.set(SystemClock.now_millis() + 2 * 60 * 60 * 1000);
    let report = cache.gc().unwrap();
    assert_eq!(report.tmp_removed, 1);
    assert!(!tmp.exists());
}

#[test]
fn cleanup_tiers_map_to_disk_operations() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let cache = open::<u32>(dir.path(), &clock);
    cache
        .put_with_ttl(&"short".to_string(), &1, Duration::from_secs(1))
        .unwrap();
    cache.put(&"long".to_string(), &2).unwrap();
    clock.advance(Duration::from_secs(2));

    let outcome = ClearableResource::clear(&cache, ClearRequest::new(CleanupTier::Aggressive));
    assert_eq!(outcome.released_items, 1);
    assert_eq!(entry_files(dir.path()).len(), 1);

    let outcome = ClearableResource::clear(&cache, ClearRequest::new(CleanupTier::Emergency));
    assert_eq!(outcome.released_items, 1);
    assert!(entry_files(dir.path()).is_empty());
}

#[tokio::test]
async fn async_wrappers_run_on_the_blocking_pool() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let cache = open::<Thumbnail>(dir.path(), &clock);
    let value = Thumbnail {
        id: 1,
        label: "avatar".into(),
        pixels: vec![9; 64],
    };

    cache.put_async("avatar".into(), value.clone()).await.unwrap();
    assert_eq!(cache.get_async("avatar".into()).await.unwrap(), Some(value));
    assert!(cache.remove_async("avatar".into()).await.unwrap());
    assert_eq!(cache.get_async("avatar".into()).await.unwrap(), None);
}
