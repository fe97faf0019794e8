use std::path::Path;

/// Values this large are how container runtimes write "unlimited" under cgroup v1.
const UNLIMITED_BYTES: u64 = 1 << 60;

/// A cgroup that may carry a memory limit for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryCgroup {
    /// Path in the unified (v2) hierarchy.
    Unified(String),
    /// Path in the v1 `memory` controller hierarchy.
    Legacy(String),
}

impl MemoryCgroup {
    /// Reads the entries of a `/proc/<pid>/cgroup` file, unified hierarchy first.
    ///
    /// Hybrid hosts list both; the v1 entry is still returned so its limit can be consulted when
    /// the unified one has none.
    pub fn candidates(proc_cgroup: &str) -> Vec<Self> {
        let mut unified = None;
        let mut legacy = None;

        for line in proc_cgroup.lines() {
            let mut fields = line.trim().splitn(3, ':');
            let (Some(id), Some(controllers), Some(path)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            let path = path.trim();
            if path.is_empty() {
                continue;
            }
            if id == "0" && controllers.is_empty() {
                unified.get_or_insert_with(|| Self::Unified(path.to_owned()));
            } else if controllers.split(',').any(|name| name.trim() == "memory") {
                legacy.get_or_insert_with(|| Self::Legacy(path.to_owned()));
            }
        }

        unified.into_iter().chain(legacy).collect()
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Unified(path) | Self::Legacy(path) => path,
        }
    }

    fn limit_file(&self) -> &'static str {
        match self {
            Self::Unified(_) => "memory.max",
            Self::Legacy(_) => "memory.limit_in_bytes",
        }
    }

    /// Tightest limit between this cgroup and the root of the hierarchy mounted at `mount`.
    pub fn limit_bytes_under(&self, mount: &Path) -> Option<u64> {
        let limit_file = self.limit_file();
        Path::new(self.path().trim_start_matches('/'))
            .ancestors()
            .filter_map(|rel| std::fs::read_to_string(mount.join(rel).join(limit_file)).ok())
            .filter_map(|raw| parse_memory_limit(&raw))
            .min()
    }
}

/// Parses a `memory.max` or `memory.limit_in_bytes` value; `None` means unlimited or unreadable.
pub fn parse_memory_limit(raw: &str) -> Option<u64> {
    match raw.trim() {
        "" | "max" => None,
        value => value
            .parse::<u64>()
            .ok()
            .filter(|&bytes| bytes < UNLIMITED_BYTES),
    }
}

#[cfg(target_os = "linux")]
pub(crate) fn cgroup_memory_limit_bytes() -> Option<u64> {
    let proc_cgroup = match std::fs::read_to_string("/proc/self/cgroup") {
        Ok(contents) => contents,
        Err(err) => {
            tracing::debug!(
                target = "ballast.memory",
                error = %err,
                "no cgroup membership available"
            );
            return None;
        }
    };

    MemoryCgroup::candidates(&proc_cgroup)
        .iter()
        .find_map(|cgroup| {
            let mount = match cgroup {
                MemoryCgroup::Unified(_) => Path::new("/sys/fs/cgroup"),
                MemoryCgroup::Legacy(_) => Path::new("/sys/fs/cgroup/memory"),
            };
            cgroup.limit_bytes_under(mount)
        })
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn cgroup_memory_limit_bytes() -> Option<u64> {
    None
}
