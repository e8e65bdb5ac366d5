use std::{
    io,
    process::{Child, Command, Stdio},
};

use crate::{config::BuildVariant, error::ShellError};

use super::locator::LaunchPlan;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;
#[cfg(target_os = "windows")]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// A running backend the supervisor can terminate.
pub trait BackendProcess: Send {
    fn id(&self) -> u32;
    fn has_exited(&mut self) -> bool;
    /// Terminates the process along with anything it spawned, then reaps it.
    fn kill(&mut self) -> io::Result<()>;
}

impl BackendProcess for Child {
    fn id(&self) -> u32 {
        Child::id(self)
    }

    fn has_exited(&mut self) -> bool {
        matches!(self.try_wait(), Ok(Some(_)))
    }

    fn kill(&mut self) -> io::Result<()> {
        // The server may live in a grandchild (reloader, one-file bootloader),
        // which survives a kill of the direct child alone. A unix pgid is not
        // reused while group members live, but a Windows pid may be.
        let pid = Child::id(self);
        let exited = self.has_exited();
        if cfg!(unix) || !exited {
            if let Err(err) = kill_process_group(pid) {
                log_warn!("could not kill process group of pid {pid}: {err}");
            }
        }
        if !self.has_exited() {
            Child::kill(self)?;
        }
        self.wait().map(|_| ())
    }
}

/// The backend leads its own group, so the pgid is its pid.
#[cfg(unix)]
fn kill_process_group(pid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: killpg only sends a signal; no memory is shared with the callee.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        // Group already gone.
        Some(libc::ESRCH) => Ok(()),
        _ => Err(err),
    }
}

#[cfg(target_os = "windows")]
fn kill_process_group(pid: u32) -> io::Result<()> {
    use std::os::windows::process::CommandExt;

    let status = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .creation_flags(CREATE_NO_WINDOW)
        .status()?;
    if !status.success() {
        log_warn!("taskkill /T for pid {pid} exited with {status}");
    }
    Ok(())
}

#[cfg(not(any(unix, target_os = "windows")))]
fn kill_process_group(_pid: u32) -> io::Result<()> {
    Ok(())
}

pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, plan: &LaunchPlan) -> Result<Box<dyn BackendProcess>, ShellError>;
}

/// Spawns through `std::process`, detached from the shell's process group.
pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    fn spawn(&self, plan: &LaunchPlan) -> Result<Box<dyn BackendProcess>, ShellError> {
        let mut command = Command::new(&plan.program);
        command.args(&plan.args).current_dir(&plan.cwd);

        match plan.variant {
            BuildVariant::Packaged => {
                command
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());
            }
            BuildVariant::Development => {
                command
                    .stdin(Stdio::null())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            let flags = match plan.variant {
                BuildVariant::Packaged => CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP,
                BuildVariant::Development => CREATE_NEW_PROCESS_GROUP,
            };
            command.creation_flags(flags);
        }

        let child = command.spawn().map_err(|source| ShellError::BackendSpawn {
            program: plan.program.clone(),
            source,
        })?;
        Ok(Box::new(child))
    }
}

/// Owns the one backend process of an application run.
pub struct BackendSupervisor {
    spawner: Box<dyn ProcessSpawner>,
    child: Option<Box<dyn BackendProcess>>,
}

impl BackendSupervisor {
    pub fn new(spawner: Box<dyn ProcessSpawner>) -> Self {
        Self {
            spawner,
            child: None,
        }
    }

    pub fn system() -> Self {
        Self::new(Box::new(SystemSpawner))
    }

    /// Spawns the backend unless one is already running. Returns its pid.
    pub fn start(&mut self, plan: &LaunchPlan) -> Result<u32, ShellError> {
        if let Some(child) = self.child.as_mut() {
            if !child.has_exited() {
                log_warn!("backend already running (pid {}), not spawning again", child.id());
                return Ok(child.id());
            }
            log_warn!("previous backend (pid {}) exited, replacing it", child.id());
            self.child = None;
        }

        let child = self.spawner.spawn(plan).inspect_err(|err| {
            log_error!("{err}");
        })?;
        let pid = child.id();
        log_info!(
            "backend started: pid {pid}, {} (cwd {})",
            plan.program.display(),
            plan.cwd.display()
        );
        self.child = Some(child);
        Ok(pid)
    }

    /// Kills the recorded backend and clears the handle. Returns whether a kill was issued.
    pub fn stop(&mut self) -> bool {
        let Some(mut child) = self.child.take() else {
            return false;
        };
        let pid = child.id();
        match child.kill() {
            Ok(()) => log_info!("backend (pid {pid}) terminated"),
            Err(err) => log_error!("failed to terminate backend (pid {pid}): {err}"),
        }
        true
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(|child| child.id())
    }

    pub fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .map(|child| !child.has_exited())
            .unwrap_or(false)
    }
}

impl Drop for BackendSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeSpawner;
    use super::*;
    use crate::backend::locator::{locate_with, BackendLayout};
    use std::path::PathBuf;

    fn plan() -> LaunchPlan {
        LaunchPlan {
            program: PathBuf::from("/res/backend/dist/backend"),
            args: Vec::new(),
            cwd: PathBuf::from("/res/backend/dist"),
            variant: BuildVariant::Packaged,
        }
    }

    #[test]
    fn stop_after_start_kills_exactly_once() {
        let (spawner, log) = FakeSpawner::new();
        let mut supervisor = BackendSupervisor::new(Box::new(spawner));

        supervisor.start(&plan()).unwrap();
        assert!(supervisor.stop());
        assert!(!supervisor.stop());
        drop(supervisor);

        assert_eq!(log.kills(), 1);
        assert_eq!(log.spawns(), 1);
    }

    #[test]
    fn stop_without_start_kills_nothing() {
        let (spawner, log) = FakeSpawner::new();
        let mut supervisor = BackendSupervisor::new(Box::new(spawner));
        assert!(!supervisor.stop());
        assert_eq!(log.kills(), 0);
    }

    #[test]
    fn drop_terminates_a_live_backend() {
        let (spawner, log) = FakeSpawner::new();
        {
            let mut supervisor = BackendSupervisor::new(Box::new(spawner));
            supervisor.start(&plan()).unwrap();
        }
        assert_eq!(log.kills(), 1);
    }

    #[test]
    fn second_start_keeps_the_single_backend() {
        let (spawner, log) = FakeSpawner::new();
        let mut supervisor = BackendSupervisor::new(Box::new(spawner));

        let first = supervisor.start(&plan()).unwrap();
        let second = supervisor.start(&plan()).unwrap();

        assert_eq!(first, second);
        assert_eq!(log.spawns(), 1);
        assert!(supervisor.is_running());
    }

    #[test]
    fn spawn_failure_leaves_no_handle() {
        let (mut spawner, log) = FakeSpawner::new();
        spawner.fail = true;
        let mut supervisor = BackendSupervisor::new(Box::new(spawner));

        let err = supervisor.start(&plan()).unwrap_err();
        assert!(matches!(err, ShellError::BackendSpawn { .. }));
        assert_eq!(supervisor.pid(), None);
        assert!(!supervisor.stop());
        assert_eq!(log.kills(), 0);
    }

    #[test]
    fn located_third_candidate_is_spawned_from_its_directory() {
        let layout = BackendLayout::Packaged {
            resource_dir: PathBuf::from("/res"),
            exe_dir: Some(PathBuf::from("/app")),
        };
        let third = layout.candidates()[2].clone();
        let plan = locate_with(&layout, |p| p == third.as_path()).unwrap();

        let (spawner, log) = FakeSpawner::new();
        let mut supervisor = BackendSupervisor::new(Box::new(spawner));
        supervisor.start(&plan).unwrap();

        let spawned = log.plans.lock().unwrap()[0].clone();
        assert_eq!(spawned.program, third);
        assert_eq!(spawned.cwd, PathBuf::from("/app/backend/dist"));
    }

    #[cfg(unix)]
    #[test]
    fn real_child_is_killed_and_reaped() {
        let plan = LaunchPlan {
            program: PathBuf::from("sleep"),
            args: vec!["30".into()],
            cwd: std::env::temp_dir(),
            variant: BuildVariant::Packaged,
        };
        let mut supervisor = BackendSupervisor::system();
        supervisor.start(&plan).unwrap();
        assert!(supervisor.is_running());
        assert!(supervisor.stop());
        assert!(!supervisor.is_running());
    }

    #[cfg(unix)]
    fn is_alive(pid: u32) -> bool {
        use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), ProcessRefreshKind::new());
        system
            .process(pid)
            .map(|process| !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
            .unwrap_or(false)
    }

    #[cfg(unix)]
    fn poll<T>(mut check: impl FnMut() -> Option<T>) -> Option<T> {
        for _ in 0..100 {
            if let Some(value) = check() {
                return Some(value);
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        None
    }

    #[cfg(unix)]
    #[test]
    fn stop_kills_processes_the_backend_spawned() {
        let dir = std::env::temp_dir().join(format!("labware-group-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let plan = LaunchPlan {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "sleep 300 & echo $! > server.pid; wait".into()],
            cwd: dir.clone(),
            variant: BuildVariant::Packaged,
        };
        let mut supervisor = BackendSupervisor::system();
        supervisor.start(&plan).unwrap();

        let pid_file = dir.join("server.pid");
        let server = poll(|| {
            std::fs::read_to_string(&pid_file)
                .ok()
                .and_then(|pid| pid.trim().parse::<u32>().ok())
        })
        .expect("backend never wrote its server pid");
        assert!(is_alive(server));

        assert!(supervisor.stop());
        let gone = poll(|| (!is_alive(server)).then_some(()));
        std::fs::remove_dir_all(&dir).ok();
        assert!(gone.is_some(), "server pid {server} outlived stop()");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let plan = LaunchPlan {
            program: PathBuf::from("/definitely/not/here/backend"),
            args: Vec::new(),
            cwd: std::env::temp_dir(),
            variant: BuildVariant::Packaged,
        };
        let mut supervisor = BackendSupervisor::system();
        assert!(matches!(
            supervisor.start(&plan),
            Err(ShellError::BackendSpawn { .. })
        ));
    }
}
