use std::path::Path;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Kills backend processes left behind by an earlier shell run that crashed
/// before it could stop them. Only exact executable path matches are touched.
pub fn reap_stale_backends(program: &Path) -> usize {
    let target = normalize(program);
    let own_pid = std::process::id();

    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
    );

    let mut reaped = 0;
    for (pid, process) in system.processes() {
        if pid.as_u32() == own_pid || !is_same_executable(process.exe(), &target) {
            continue;
        }
        if process.kill() {
            log_info!("killed stale backend pid {} ({})", pid, target.display());
            reaped += 1;
        } else {
            log_warn!("could not kill stale backend pid {}", pid);
        }
    }
    reaped
}

fn normalize(path: &Path) -> std::path::PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn is_same_executable(exe: Option<&Path>, target: &Path) -> bool {
    exe.map(|exe| normalize(exe) == target).unwrap_or(false)
}
