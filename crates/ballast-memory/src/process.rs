use sysinfo::{Pid, System};

/// Resident set size of the current process, in bytes, or `None` when the OS will not say.
pub fn current_rss_bytes() -> Option<u64> {
    let pid = match sysinfo::get_current_pid() {
        Ok(pid) => pid,
        Err(reason) => {
            tracing::debug!(target = "ballast.memory", reason, "cannot resolve own pid");
            return None;
        }
    };
    rss_of(pid)
}

fn rss_of(pid: Pid) -> Option<u64> {
    let mut system = System::new();
    if !system.refresh_process(pid) {
        return None;
    }
    system
        .process(pid)
        .map(|process| process.memory())
        .filter(|&bytes| bytes > 0)
}
