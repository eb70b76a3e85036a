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


use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::DEFAULT_SYMBOL_PREFIX;

/// File name of the user configuration, placed in the home directory.
pub const CONFIG_FILE_NAME: &str = ".revdb.toml";

/// User configuration for REVDB.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevdbConfig {
    /// Injected runtime settings
    pub runtime: RuntimeConfig,
    /// Names of the interpreter and libc entry points used for injection
    pub interpreter: InterpreterConfig,
    /// Watch expression settings
    pub watch: WatchConfig,
}

/// Injected runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Prefix of every symbol exported by the runtime
    pub symbol_prefix: String,
    /// Path of the runtime library loaded by the startup script
    pub library_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { symbol_prefix: DEFAULT_SYMBOL_PREFIX.to_string(), library_path: None }
    }
}

/// Entry points of the interpreter (and of libc) called inside the debuggee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Any of these symbols marks the debuggee as the interpreter
    pub entry_symbols: Vec<String>,
    /// Returns 1 once the interpreter is initialized
    pub is_initialized: String,
    /// Acquires the interpreter lock and returns a token
    pub lock_ensure: String,
    /// Releases the interpreter lock given the token
    pub lock_release: String,
    /// Runs a script from an open `FILE*`, closing it afterwards
    pub run_file: String,
    /// libc `fopen`
    pub fopen: String,
    /// libc `malloc`
    pub malloc: String,
    /// libc `free`
    pub free: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            entry_symbols: vec!["Py_BytesMain".to_string(), "Py_IsInitialized".to_string()],
            is_initialized: "Py_IsInitialized".to_string(),
            lock_ensure: "PyGILState_Ensure".to_string(),
            lock_release: "PyGILState_Release".to_string(),
            run_file: "PyRun_SimpleFileEx".to_string(),
            fopen: "fopen".to_string(),
            malloc: "malloc".to_string(),
            free: "free".to_string(),
        }
    }
}

/// Watch expression configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Number of bytes covered by each hardware watchpoint
    pub width: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { width: 8 }
    }
}

impl RevdbConfig {
    /// Get the config file path (~/.revdb.toml)
    pub fn config_path() -> Result<PathBuf> {
        let home =
            dirs::home_dir().ok_or_else(|| eyre::eyre!("Unable to determine home directory"))?;
        Ok(home.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the home directory, creating the default file if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found, creating default at {:?}", config_path);
            let default_config = Self::default();
            default_config.save_to(&config_path)?;
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file. Missing keys take their default.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        debug!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")
    }

    /// Set the runtime symbol prefix
    pub fn with_symbol_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.runtime.symbol_prefix = prefix.into();
        self
    }

    /// Set the runtime library loaded by the startup script
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.runtime.library_path = Some(path.into());
        self
    }

    /// Set the number of bytes covered by each watchpoint
    pub fn with_watch_width(mut self, width: u64) -> Self {
        self.watch.width = width;
        self
    }
}
