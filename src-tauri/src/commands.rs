use std::path::{Path, PathBuf};

use serde::Serialize;
use tauri::{AppHandle, Manager, State};
use tauri_plugin_opener::OpenerExt;

use crate::{
    analysis::{AnalysisMetadata, AnalysisResult, FileUpload},
    lifecycle::{ShellLifecycle, ShellStatus},
    perception::{accepts_keystroke, Perception},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerceptionCheck {
    pub accepted: bool,
    pub submittable: bool,
    pub value: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedBatch {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: usize,
}

#[tauri::command]
pub fn backend_status(state: State<'_, ShellLifecycle>) -> ShellStatus {
    state.status()
}

#[tauri::command]
pub fn validate_perception(input: String) -> PerceptionCheck {
    let parsed = input.parse::<Perception>();
    PerceptionCheck {
        accepted: accepts_keystroke(&input),
        submittable: parsed.is_ok(),
        value: parsed.as_ref().ok().map(|p| p.value()),
        error: parsed.err().map(|err| err.to_string()),
    }
}

#[tauri::command]
pub async fn analyze_text(
    state: State<'_, ShellLifecycle>,
    text: String,
    metadata: AnalysisMetadata,
) -> Result<AnalysisResult, String> {
    state.ensure_ready().map_err(|e| e.to_string())?;
    let metadata = metadata.validate().map_err(|e| e.to_string())?;
    state
        .client()
        .analyze_text(&text, &metadata)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn analyze_file(
    state: State<'_, ShellLifecycle>,
    upload: FileUpload,
    metadata: AnalysisMetadata,
) -> Result<AnalysisResult, String> {
    state.ensure_ready().map_err(|e| e.to_string())?;
    let metadata = metadata.validate().map_err(|e| e.to_string())?;
    state
        .client()
        .analyze_file(upload, &metadata)
        .await
        .map_err(|e| e.to_string())
}

/// Runs a batch analysis and saves the returned file into the downloads folder.
#[tauri::command]
pub async fn analyze_batch(
    app: AppHandle,
    state: State<'_, ShellLifecycle>,
    upload: FileUpload,
    metadata: AnalysisMetadata,
) -> Result<SavedBatch, String> {
    state.ensure_ready().map_err(|e| e.to_string())?;
    let metadata = metadata.validate().map_err(|e| e.to_string())?;
    let output = state
        .client()
        .analyze_batch(upload, &metadata)
        .await
        .map_err(|e| e.to_string())?;

    let dir = app
        .path()
        .download_dir()
        .or_else(|_| app.path().app_data_dir())
        .map_err(|e| e.to_string())?;
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| e.to_string())?;
    let path = unique_destination(&dir, &output.file_name);
    tokio::fs::write(&path, &output.bytes)
        .await
        .map_err(|e| format!("failed to save {}: {e}", path.display()))?;
    log_info!("batch result saved to {}", path.display());

    if let Err(err) = app.opener().reveal_item_in_dir(&path) {
        log_warn!("could not reveal {}: {err}", path.display());
    }

    Ok(SavedBatch {
        file_name: output.file_name,
        content_type: output.content_type,
        bytes: output.bytes.len(),
        path,
    })
}

/// `dir/name`, or `dir/stem (n).ext` for the first free `n`.
fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (file_name, None),
    };
    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}
