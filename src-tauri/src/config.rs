use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::readiness::RetryPolicy;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const CONFIG_FILE_NAME: &str = "shell.json";

const PORT_ENV: &str = "LABWARE_BACKEND_PORT";
const MODE_ENV: &str = "LABWARE_SHELL_MODE";
const PYTHON_ENV: &str = "LABWARE_PYTHON";
const WAIT_ENV: &str = "LABWARE_BACKEND_WAIT_SECS";

/// Which layout the shell runs from: bundled resources or a source checkout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BuildVariant {
    Packaged,
    Development,
}

impl BuildVariant {
    pub fn from_build() -> Self {
        if cfg!(debug_assertions) {
            BuildVariant::Development
        } else {
            BuildVariant::Packaged
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "packaged" | "prod" | "production" => Some(BuildVariant::Packaged),
            "development" | "dev" => Some(BuildVariant::Development),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ShellConfig {
    pub backend_host: String,
    pub backend_port: u16,
    pub probe_timeout_ms: u64,
    pub retry_delay_ms: u64,
    /// `None` waits until shutdown.
    pub max_wait_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub dev_server_url: String,
    pub python: Option<String>,
    pub mode: Option<BuildVariant>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            backend_host: "127.0.0.1".into(),
            backend_port: 5000,
            probe_timeout_ms: 2_000,
            retry_delay_ms: 500,
            max_wait_secs: Some(120),
            max_attempts: None,
            dev_server_url: "http://localhost:5173".into(),
            python: None,
            mode: None,
        }
    }
}

impl ShellConfig {
    /// Reads `path`, falling back to defaults when the file is missing or unreadable
    /// as JSON, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read shell config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("Ignoring malformed {}: {err}", path.display());
                ShellConfig::default()
            })
        } else {
            let defaults = ShellConfig::default();
            if let Err(err) = defaults.persist(path) {
                log_warn!("Could not write default shell config: {err:#}");
            }
            defaults
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        log_info!(
            "Shell config: backend {}, mode {:?}",
            config.backend_addr(),
            config.variant()
        );
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup(PORT_ENV) {
            match port.trim().parse::<u16>() {
                Ok(port) => self.backend_port = port,
                Err(_) => log_warn!("{PORT_ENV}={port} is not a valid port"),
            }
        }
        if let Some(mode) = lookup(MODE_ENV) {
            match BuildVariant::parse(&mode) {
                Some(variant) => self.mode = Some(variant),
                None => log_warn!("{MODE_ENV}={mode} is not packaged or development"),
            }
        }
        if let Some(python) = lookup(PYTHON_ENV).filter(|value| !value.trim().is_empty()) {
            self.python = Some(python);
        }
        if let Some(wait) = lookup(WAIT_ENV) {
            match wait.trim() {
                "0" | "" => self.max_wait_secs = None,
                value => match value.parse::<u64>() {
                    Ok(secs) => self.max_wait_secs = Some(secs),
                    Err(_) => log_warn!("{WAIT_ENV}={wait} is not a number of seconds"),
                },
            }
        }
    }

    pub fn variant(&self) -> BuildVariant {
        self.mode.unwrap_or_else(BuildVariant::from_build)
    }

    pub fn backend_addr(&self) -> String {
        format!("{}:{}", self.backend_host, self.backend_port)
    }

    pub fn backend_base_url(&self) -> String {
        format!("http://{}", self.backend_addr())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_attempts: self.max_attempts,
            max_wait: self.max_wait_secs.map(Duration::from_secs),
        }
    }

    fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write shell config to {}", path.display()))
    }
}

pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}
