use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use tauri::{
    webview::PageLoadEvent, AppHandle, Manager, Runtime, Url, WebviewUrl, WebviewWindowBuilder,
};

use crate::{
    config::{BuildVariant, ShellConfig},
    error::ShellError,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub const MAIN_WINDOW: &str = "main";
pub const ERROR_WINDOW: &str = "error";

const WINDOW_TITLE: &str = "Labware Sentiment Analyzer";
const PACKAGED_ENTRY: &str = "index.html";
const ERROR_ENTRY: &str = "error.html";

/// Bundled page for packaged builds, the dev server otherwise.
pub fn content_url(config: &ShellConfig) -> Result<WebviewUrl> {
    match config.variant() {
        BuildVariant::Packaged => Ok(WebviewUrl::App(PACKAGED_ENTRY.into())),
        BuildVariant::Development => {
            let url: Url = config
                .dev_server_url
                .parse()
                .with_context(|| format!("invalid dev server url {}", config.dev_server_url))?;
            Ok(WebviewUrl::External(url))
        }
    }
}

/// Creates the main window hidden and shows it maximized after the first
/// completed page load. Focuses the existing window if there already is one.
pub fn open_main_window<R: Runtime>(app: &AppHandle<R>, config: &ShellConfig) -> Result<()> {
    if let Some(existing) = app.get_webview_window(MAIN_WINDOW) {
        existing.show()?;
        existing.set_focus()?;
        return Ok(());
    }

    let url = content_url(config)?;
    log_info!("opening main window at {url:?}");
    let shown = Arc::new(AtomicBool::new(false));

    WebviewWindowBuilder::new(app, MAIN_WINDOW, url)
        .title(WINDOW_TITLE)
        .inner_size(1200.0, 800.0)
        .visible(false)
        .on_page_load(move |window, payload| match payload.event() {
            PageLoadEvent::Started => log_info!("page-load started: {}", payload.url()),
            PageLoadEvent::Finished => {
                log_info!("page-load finished: {}", payload.url());
                if shown.swap(true, Ordering::SeqCst) {
                    return;
                }
                if let Err(err) = window.maximize() {
                    log_warn!("could not maximize main window: {err}");
                }
                if let Err(err) = window.show() {
                    log_error!("could not show main window: {err}");
                }
            }
        })
        .build()
        .map_err(|err| ShellError::Window(format!("failed to create main window: {err}")))?;

    Ok(())
}

/// Small window stating why the backend never came up.
pub fn open_error_window<R: Runtime>(app: &AppHandle<R>, reason: &str) -> Result<()> {
    if let Some(main) = app.get_webview_window(MAIN_WINDOW) {
        if let Err(err) = main.hide() {
            log_warn!("could not hide main window: {err}");
        }
    }
    if app.get_webview_window(ERROR_WINDOW).is_some() {
        return Ok(());
    }

    let script = format!(
        "window.__LABWARE_STARTUP_ERROR__ = {};",
        serde_json::to_string(reason)?
    );

    WebviewWindowBuilder::new(app, ERROR_WINDOW, WebviewUrl::App(ERROR_ENTRY.into()))
        .title(WINDOW_TITLE)
        .inner_size(560.0, 300.0)
        .resizable(false)
        .center()
        .initialization_script(&script)
        .build()
        .map_err(|err| ShellError::Window(format!("failed to create error window: {err}")))?;

    Ok(())
}
