use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use ballast_core::Clock;
use ballast_memory::{ClearKind, ClearOutcome, ClearRequest, ClearableResource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub scanned: u64,
    pub removed: u64,
    pub removed_bytes: u64,
    /// Entries whose metadata could not be read or that could not be deleted.
    pub skipped: u64,
}

/// Deletes regular files older than `max_age` from a single directory.
///
/// Subdirectories and symlinks are left alone. Age is measured from the file's modification time
/// against the injected clock.
pub struct TempFilePurger {
    name: String,
    dir: PathBuf,
    max_age: Duration,
    clock: Arc<dyn Clock>,
}

impl TempFilePurger {
    pub fn new(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        max_age: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            max_age,
            clock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn purge(&self) -> io::Result<PurgeReport> {
        let mut report = PurgeReport::default();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(err) => return Err(err),
        };

        // Work on a snapshot so files created mid-sweep are not considered.
        let paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .collect();

        let now = self.clock.now_millis();
        let max_age_ms = self.max_age.as_millis() as u64;

        for path in paths {
            report.scanned += 1;
            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(_) => {
                    report.skipped += 1;
                    continue;
                }
            };
            if !meta.file_type().is_file() {
                continue;
            }

            let modified_ms = match meta.modified().map(|t| t.duration_since(UNIX_EPOCH)) {
                Ok(Ok(since_epoch)) => since_epoch.as_millis() as u64,
                _ => {
                    report.skipped += 1;
                    continue;
                }
            };
            if now.saturating_sub(modified_ms) < max_age_ms {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    report.removed += 1;
                    report.removed_bytes = report.removed_bytes.saturating_add(meta.len());
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    report.skipped += 1;
                    tracing::debug!(
                        target = "ballast.cleanup",
                        path = %path.display(),
                        error = %err,
                        "failed to remove stale temp file"
                    );
                }
            }
        }

        Ok(report)
    }
}

impl ClearableResource for TempFilePurger {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClearKind {
        ClearKind::Io
    }

    fn clear(&self, _request: ClearRequest) -> ClearOutcome {
        match self.purge() {
            Ok(report) => ClearOutcome::new(report.removed, report.removed_bytes),
            Err(err) => {
                tracing::warn!(
                    target = "ballast.cleanup",
                    dir = %self.dir.display(),
                    error = %err,
                    "temp file purge failed"
                );
                ClearOutcome::default()
            }
        }
    }
}

impl std::fmt::Debug for TempFilePurger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempFilePurger")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("max_age", &self.max_age)
            .finish()
    }
}
