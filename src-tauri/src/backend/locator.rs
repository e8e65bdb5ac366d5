use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::{config::BuildVariant, error::ShellError};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

const BACKEND_STEM: &str = "backend";
const DEV_SCRIPT: &str = "app.py";

/// Where to look for the backend, per build variant.
#[derive(Debug, Clone)]
pub enum BackendLayout {
    /// Bundled build: a frozen backend binary shipped with the app resources.
    Packaged {
        resource_dir: PathBuf,
        /// Directory of the running shell executable, used as the last fallback.
        exe_dir: Option<PathBuf>,
    },
    /// Source checkout: an interpreter runs the backend script.
    Development {
        source_root: PathBuf,
        interpreter: String,
    },
}

impl BackendLayout {
    pub fn variant(&self) -> BuildVariant {
        match self {
            BackendLayout::Packaged { .. } => BuildVariant::Packaged,
            BackendLayout::Development { .. } => BuildVariant::Development,
        }
    }

    /// Candidate paths in priority order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        match self {
            BackendLayout::Packaged {
                resource_dir,
                exe_dir,
            } => {
                let binary = backend_binary_name();
                let mut candidates = vec![
                    resource_dir.join("backend").join("dist").join(&binary),
                    resource_dir.join("backend").join(&binary),
                ];
                if let Some(exe_dir) = exe_dir {
                    candidates.push(exe_dir.join("backend").join("dist").join(&binary));
                }
                candidates
            }
            BackendLayout::Development { source_root, .. } => {
                vec![source_root.join("backend").join(DEV_SCRIPT)]
            }
        }
    }
}

pub fn backend_binary_name() -> String {
    format!("{BACKEND_STEM}{}", std::env::consts::EXE_SUFFIX)
}

pub fn default_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Everything needed to start the backend once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub variant: BuildVariant,
}

impl LaunchPlan {
    /// The file that was found on disk: the binary itself, or the dev script.
    pub fn entrypoint(&self) -> &Path {
        match self.variant {
            BuildVariant::Packaged => &self.program,
            BuildVariant::Development => self
                .args
                .first()
                .map(Path::new)
                .unwrap_or(self.program.as_path()),
        }
    }
}

pub fn select_first_existing<'a>(
    candidates: &'a [PathBuf],
    exists: impl Fn(&Path) -> bool,
) -> Option<&'a PathBuf> {
    candidates.iter().find(|path| exists(path))
}

pub fn locate(layout: &BackendLayout) -> Result<LaunchPlan, ShellError> {
    locate_with(layout, |path| path.is_file())
}

pub fn locate_with(
    layout: &BackendLayout,
    exists: impl Fn(&Path) -> bool,
) -> Result<LaunchPlan, ShellError> {
    let candidates = layout.candidates();
    let Some(found) = select_first_existing(&candidates, exists) else {
        for path in &candidates {
            log_error!("backend candidate missing: {}", path.display());
        }
        return Err(ShellError::BackendNotFound { candidates });
    };

    let cwd = found
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    log_info!("backend located at {}", found.display());

    let plan = match layout {
        BackendLayout::Packaged { .. } => LaunchPlan {
            program: found.clone(),
            args: Vec::new(),
            cwd,
            variant: BuildVariant::Packaged,
        },
        BackendLayout::Development { interpreter, .. } => LaunchPlan {
            program: PathBuf::from(interpreter),
            args: vec![found.clone().into_os_string()],
            cwd,
            variant: BuildVariant::Development,
        },
    };
    Ok(plan)
}
