use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::codec::PAYLOAD_LIMIT_BYTES;
use crate::error::{CacheError, Result};

/// Infix of files that hold a write still in progress (or abandoned by a crash).
const PARTIAL_MARKER: &str = ".tmp.";

static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

fn corrupt(path: &Path, reason: &'static str) -> CacheError {
    CacheError::Corrupt {
        path: path.to_path_buf(),
        reason,
    }
}

/// Reads an entry file, refusing anything but a regular file within the payload limit.
///
/// `Ok(None)` when the file does not exist.
pub(crate) fn read_bounded(path: &Path) -> Result<Option<Vec<u8>>> {
    let file_type = match fs::symlink_metadata(path) {
        Ok(meta) => meta.file_type(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if !file_type.is_file() {
        return Err(corrupt(path, "not a regular file"));
    }

    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut bytes = Vec::new();
    file.take(PAYLOAD_LIMIT_BYTES + 1).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > PAYLOAD_LIMIT_BYTES {
        return Err(corrupt(path, "file exceeds the payload limit"));
    }
    Ok(Some(bytes))
}

/// Deletes `path`, treating an already-missing file as success. Failures are logged under
/// `reason`.
pub(crate) fn remove_quietly(path: &Path, reason: &'static str) -> bool {
    let err = match fs::remove_file(path) {
        Ok(()) => return true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return true,
        Err(err) => err,
    };
    tracing::debug!(
        target = "ballast.cache",
        path = %path.display(),
        reason,
        error = %err,
        "could not remove cache file"
    );
    false
}

pub(crate) fn is_partial_write(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(PARTIAL_MARKER))
}

/// Replaces `path` with `bytes` so that readers see either the old entry or the new one.
///
/// The data goes to a sibling partial file first, is synced, then renamed over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .map(|parent| if parent.as_os_str().is_empty() { Path::new(".") } else { parent })
        .ok_or_else(|| io::Error::other("entry path has no parent directory"))?;
    fs::create_dir_all(dir)?;

    let (partial, mut file) = open_partial(dir, path)?;
    let staged = file.write_all(bytes).and_then(|()| file.sync_all());
    drop(file);

    if let Err(err) = staged.and_then(|()| rename_over(&partial, path)) {
        remove_quietly(&partial, "write_atomic.abandoned");
        return Err(err.into());
    }

    sync_dir(dir);
    Ok(())
}

fn open_partial(dir: &Path, dest: &Path) -> io::Result<(PathBuf, File)> {
    let base = dest
        .file_name()
        .ok_or_else(|| io::Error::other("entry path has no file name"))?
        .to_string_lossy()
        .into_owned();
    let pid = std::process::id();

    loop {
        let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let candidate = dir.join(format!("{base}{PARTIAL_MARKER}{pid}.{seq}"));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err),
        }
    }
}

#[cfg(not(windows))]
fn rename_over(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}

// Renaming onto an existing file fails on Windows.
#[cfg(windows)]
fn rename_over(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    match fs::remove_file(to) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    fs::rename(from, to)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(err) = File::open(dir).and_then(|handle| handle.sync_all()) {
        tracing::trace!(
            target = "ballast.cache",
            dir = %dir.display(),
            error = %err,
            "directory sync skipped"
        );
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
