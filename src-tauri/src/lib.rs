mod analysis;
mod backend;
mod client;
mod commands;
mod config;
mod error;
mod lifecycle;
mod perception;
mod readiness;
mod startup;
mod utils;
mod window;

use backend::BackendSupervisor;
use commands::{analyze_batch, analyze_file, analyze_text, backend_status, validate_perception};
use config::{config_path, ShellConfig};
use lifecycle::ShellLifecycle;
use tauri::{Manager, RunEvent};

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    utils::logging::init();

    log::info!("Labware Sentiment Analyzer starting up...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let config_dir = app
                    .path()
                    .app_config_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                let config = ShellConfig::load(&config_path(&config_dir))?;
                let layout = startup::backend_layout(app.handle(), &config)?;

                app.manage(ShellLifecycle::new(config, BackendSupervisor::system())?);
                startup::spawn_backend_startup(app.handle().clone(), layout);

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            backend_status,
            validate_perception,
            analyze_text,
            analyze_file,
            analyze_batch,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| match event {
            RunEvent::ExitRequested { code, api, .. } => {
                // Last window closed on macOS: keep the app and its backend alive.
                if code.is_none() && cfg!(target_os = "macos") && keeps_running(app_handle) {
                    api.prevent_exit();
                    return;
                }
                startup::shutdown(app_handle);
            }
            RunEvent::Exit => startup::shutdown(app_handle),
            #[cfg(target_os = "macos")]
            RunEvent::Reopen {
                has_visible_windows: false,
                ..
            } => startup::reopen(app_handle),
            _ => {}
        });
}

fn keeps_running(app_handle: &tauri::AppHandle) -> bool {
    app_handle
        .try_state::<ShellLifecycle>()
        .map(|lifecycle| lifecycle.ensure_ready().is_ok())
        .unwrap_or(false)
}
