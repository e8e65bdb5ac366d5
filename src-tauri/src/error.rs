use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Failures the shell can hit between launch and teardown.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("backend executable not found, checked: {}", display_paths(.candidates))]
    BackendNotFound { candidates: Vec<PathBuf> },

    #[error("failed to spawn backend {program}: {source}")]
    BackendSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backend process exited before it was ready")]
    BackendExited,

    #[error("backend is not ready")]
    NotReady,

    #[error("backend did not accept connections after {attempts} attempts ({}s)", .waited.as_secs())]
    BackendUnreachable { attempts: u32, waited: Duration },

    #[error("window error: {0}")]
    Window(String),

    #[error("request to backend failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
