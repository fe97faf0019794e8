use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ballast_core::{Clock, ManualClock, SystemClock};
use ballast_engine::{PurgeReport, TempFilePurger};
use ballast_memory::{CleanupTier, DeviceProfile};

use super::support::{harness_with, quiet_config};

const HOUR_MS: u64 = 60 * 60 * 1000;

fn write(path: &Path, len: usize) {
    fs::write(path, vec![0u8; len]).unwrap();
}

fn purger(dir: &Path, now_ms: u64) -> TempFilePurger {
    TempFilePurger::new(
        "temp_files",
        dir,
        Duration::from_secs(60 * 60),
        Arc::new(ManualClock::new(now_ms)),
    )
}

#[test]
fn stale_files_are_removed_and_subdirectories_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("a.tmp"), 100);
    write(&dir.path().join("b.tmp"), 50);
    fs::create_dir(dir.path().join("nested")).unwrap();
    write(&dir.path().join("nested").join("c.tmp"), 10);

    let report = purger(dir.path(), SystemClock.now_millis() + 2 * HOUR_MS)
        .purge()
        .unwrap();
    assert_eq!(
        report,
        PurgeReport {
            scanned: 3,
            removed: 2,
            removed_bytes: 150,
            skipped: 0,
        }
    );
    assert!(!dir.path().join("a.tmp").exists());
    assert!(dir.path().join("nested").join("c.tmp").exists());
}

#[test]
fn fresh_files_are_kept() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("download.part"), 64);

    let report = purger(dir.path(), SystemClock.now_millis()).purge().unwrap();
    assert_eq!(report.removed, 0);
    assert!(dir.path().join("download.part").exists());
}

#[test]
fn a_missing_directory_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let report = purger(&dir.path().join("gone"), SystemClock.now_millis())
        .purge()
        .unwrap();
    assert_eq!(report, PurgeReport::default());
}

#[test]
fn configured_temp_dir_is_purged_by_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("upload.tmp"), 32);

    let mut config = quiet_config();
    config.cleanup.temp_dir = Some(dir.path().to_path_buf());
    config.cleanup.temp_max_age_secs = 60;
    let h = harness_with(config, DeviceProfile::new(1000.0, 60, false));
    assert!(h
        .engine
        .orchestrator()
        .registered()
        .contains(&"temp_files".to_owned()));

    h.clock.set(SystemClock.now_millis() + HOUR_MS);
    let report = h
        .engine
        .request_cleanup_and_wait(CleanupTier::Normal)
        .unwrap();
    assert_eq!(report.io_dispatched, 1);
    assert!(!dir.path().join("upload.tmp").exists());
}
