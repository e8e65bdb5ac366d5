use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use tauri::{AppHandle, Manager};

use crate::{
    backend::{default_interpreter, BackendLayout},
    config::{BuildVariant, ShellConfig},
    lifecycle::ShellLifecycle,
    window,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

pub fn backend_layout(app: &AppHandle, config: &ShellConfig) -> Result<BackendLayout> {
    let layout = match config.variant() {
        BuildVariant::Packaged => BackendLayout::Packaged {
            resource_dir: app.path().resource_dir().map_err(|err| anyhow!(err))?,
            exe_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
        },
        BuildVariant::Development => BackendLayout::Development {
            source_root: source_root(),
            interpreter: config
                .python
                .clone()
                .unwrap_or_else(|| default_interpreter().to_string()),
        },
    };
    Ok(layout)
}

/// Repository root in a source checkout; the crate lives one level below it.
fn source_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

/// Starts the backend in the background. The main window opens once the
/// backend port accepts connections; any startup failure opens the error window.
pub fn spawn_backend_startup(app: AppHandle, layout: BackendLayout) {
    log_info!("starting {:?} backend", layout.variant());
    tauri::async_runtime::spawn(async move {
        let lifecycle = app.state::<ShellLifecycle>();
        let ready_app = app.clone();
        let config = lifecycle.config().clone();

        let result = lifecycle
            .start(&layout, move |report| {
                log_info!(
                    "backend ready after {} attempt(s) in {}ms",
                    report.attempts,
                    report.elapsed_ms
                );
                if let Err(err) = window::open_main_window(&ready_app, &config) {
                    log_error!("{err:#}");
                    show_error(&ready_app, &format!("{err:#}"));
                }
            })
            .await;

        if let Err(err) = result {
            show_error(&app, &err.to_string());
        }
    });
}

fn show_error(app: &AppHandle, reason: &str) {
    if let Err(err) = window::open_error_window(app, reason) {
        log_error!("could not open error window: {err:#}");
    }
}

/// Stops the backend. Runs on window-all-closed and on exit.
pub fn shutdown(app: &AppHandle) {
    if let Some(lifecycle) = app.try_state::<ShellLifecycle>() {
        if lifecycle.shutdown() {
            log_info!("backend stopped");
        }
    }
}

#[cfg(target_os = "macos")]
pub fn reopen(app: &AppHandle) {
    let Some(lifecycle) = app.try_state::<ShellLifecycle>() else {
        return;
    };
    if lifecycle.ensure_ready().is_ok() {
        if let Err(err) = window::open_main_window(app, lifecycle.config()) {
            log_error!("could not reopen main window: {err:#}");
        }
    }
}
