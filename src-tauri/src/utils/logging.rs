//! Logger setup plus module-gated logging macros.
//!
//! A module opts into the macros by defining its own switch:
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_info, log_warn, log_error};
//!
//! log_info!("backend located at {}", path.display());
//! ```

use log::LevelFilter;

/// Installs `env_logger`. `RUST_LOG` wins over the defaults; without it the
/// shell logs at info and the HTTP stack only at warn.
pub fn init() {
    let result = env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("hyper_util", LevelFilter::Warn)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();

    if let Err(err) = result {
        log::warn!("logger already initialised: {err}");
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    }
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    }
}

/// Errors are still gated, so a module can be fully silenced in tests.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    }
}
