// REVDB - Reversible Interpreter Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Logging configuration for REVDB components
//!
//! Provides centralized logging setup with:
//! - Colorful console output with structured formatting
//! - File logging to a temporary directory with daily rotation
//! - Environment variable support (RUST_LOG)

use eyre::Result;
use std::{env, fs, path::PathBuf, sync::Once};
use tracing::Level;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Name of the directory, under the system temp folder, holding all REVDB logs.
pub const LOG_DIR_NAME: &str = "revdb-logs";

/// Initialize logging for a REVDB component
///
/// This function sets up:
/// - Colorful, structured console logging with timestamps
/// - Optional file logging to `<tmp>/revdb-logs/<component>/` with daily rotation
/// - Environment variable support for log levels (RUST_LOG), INFO by default
///
/// # Arguments
/// * `component_name` - Name of the component (e.g., "revdb")
/// * `enable_file_logging` - Whether to also write logs to a file
///
/// # Examples
/// ```rust,no_run
/// use revdb_common::logging;
///
/// fn main() -> eyre::Result<()> {
///     logging::init_logging("revdb", true)?;
///     tracing::info!("Application started");
///     Ok(())
/// }
/// ```
pub fn init_logging(component_name: &str, enable_file_logging: bool) -> Result<()> {
    let env_filter = default_filter("info")?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(true)
        .with_writer(std::io::stderr);

    if enable_file_logging {
        let log_dir = create_log_directory(component_name)?;

        let file_appender = rolling::daily(&log_dir, format!("{component_name}.log"));
        let (non_blocking_appender, guard) = non_blocking(file_appender);

        // The guard flushes on drop; logging lives for the whole process.
        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(LocalTime::rfc_3339())
            .with_ansi(false)
            .with_writer(non_blocking_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer.with_filter(filter_for_file()))
            .try_init()
            .map_err(|e| eyre::eyre!("Failed to initialize tracing subscriber: {}", e))?;

        tracing::info!(
            component = component_name,
            log_dir = %log_dir.display(),
            "Logging initialized with console and file output"
        );
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init()
            .map_err(|e| eyre::eyre!("Failed to initialize tracing subscriber: {}", e))?;

        tracing::info!(component = component_name, "Logging initialized with console output only");
    }

    log_environment_info(component_name);

    Ok(())
}

/// `RUST_LOG` if set, otherwise the given level.
fn default_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| eyre::eyre!("Failed to create environment filter: {}", e))
}

/// Create log directory in system temp folder
fn create_log_directory(component_name: &str) -> Result<PathBuf> {
    let log_dir = env::temp_dir().join(LOG_DIR_NAME).join(component_name);
    fs::create_dir_all(&log_dir)?;
    Ok(log_dir)
}

/// Filter for file output
fn filter_for_file() -> EnvFilter {
    EnvFilter::from_default_env()
}

fn log_environment_info(component_name: &str) {
    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let args: Vec<String> = env::args().collect();

    tracing::info!(
        component = component_name,
        rust_log = %rust_log,
        args = ?args,
        "Environment information"
    );

    if let Ok(current_dir) = env::current_dir() {
        tracing::debug!(working_directory = %current_dir.display(), "Working directory");
    }
}

/// Initialize simple logging (console only, compact formatting)
///
/// Useful for tests and small utilities.
pub fn init_simple_logging(level: Level) -> Result<()> {
    let env_filter = default_filter(level.as_str())?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to initialize simple logging: {}", e))?;

    Ok(())
}

static TEST_LOGGING_INIT: Once = Once::new();

/// Safe logging initialization for tests - can be called multiple times
///
/// Console-only, INFO unless `default_level` or RUST_LOG says otherwise.
///
/// # Usage
/// ```rust
/// use revdb_common::logging;
///
/// logging::ensure_test_logging(None);
/// tracing::info!("This will work safely in any test!");
/// ```
pub fn ensure_test_logging(default_level: Option<Level>) {
    TEST_LOGGING_INIT.call_once(|| {
        // A subscriber installed by someone else is fine.
        let _ = init_simple_logging(default_level.unwrap_or(Level::INFO));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tracing::{debug, info, warn};

    #[test]
    fn test_logging_functions_work() {
        ensure_test_logging(None);

        info!("Test info message");
        warn!("Test warning message");
        debug!("Test debug message");
    }

    #[test]
    fn test_log_directory_creation() {
        let log_dir = create_log_directory("test-component").unwrap();
        assert!(log_dir.exists());
        assert!(log_dir.to_string_lossy().contains(LOG_DIR_NAME));
        assert!(log_dir.to_string_lossy().contains("test-component"));
    }

    #[test]
    #[serial]
    fn test_repeated_initialization_does_not_panic() {
        ensure_test_logging(None);

        // The global subscriber is already set, so these report an error instead of panicking.
        assert!(init_logging("revdb-test", false).is_err());
        assert!(init_simple_logging(Level::DEBUG).is_err());

        info!("Logging still works after re-initialization attempts");
    }
}
