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


//! REVDB - Reversible Interpreter Debugger
//!
//! Operator tools for the record/replay navigation engine: compute the hashes
//! and native conditions the engine places on the runtime hooks, render the
//! startup script that loads the runtime, check watch expressions and manage
//! the user configuration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::Result;
use revdb_common::RevdbConfig;

mod cmd;

/// Command-line interface for REVDB
#[derive(Debug, Parser)]
#[command(name = "revdb")]
#[command(about = "Reversible Interpreter Debugger - record/replay navigation tools")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: ~/.revdb.toml)
    #[arg(long, global = true, env = "REVDB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the prefix of the runtime symbols
    #[arg(long, global = true, env = "REVDB_SYMBOL_PREFIX")]
    pub symbol_prefix: Option<String>,

    /// Also write logs to the REVDB log directory
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Hash strings the way the injected runtime does
    Hash {
        /// Strings to hash (file paths, function names, exception types)
        #[arg(required = true)]
        values: Vec<String>,

        /// Print hashes in hexadecimal
        #[arg(long)]
        hex: bool,
    },
    /// Show the native condition placed for a breakpoint location
    Condition {
        /// `<file>:<line>` or `<function>`
        location: String,
    },
    /// Show the native condition used to stop on raised exceptions
    Exception {
        /// Only stop on exceptions of this exact type
        type_name: Option<String>,
    },
    /// Render the script that loads the runtime into the interpreter
    StartupScript {
        /// Runtime library (default: runtime.library_path from the configuration)
        #[arg(long)]
        library: Option<PathBuf>,
    },
    /// Parse a watch expression into its chain of lookups
    ParseWatch {
        /// Expression such as `a.b[0]`
        expression: String,

        /// Print the chain as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the symbols the engine expects the runtime to export
    Symbols,
    /// Show or create the configuration
    Config {
        /// Configuration action
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the path of the configuration file
    Path,
    /// Write the default configuration if no file exists yet
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    revdb_common::logging::init_logging("revdb", cli.log_file)?;

    let output = match &cli.command {
        Commands::Hash { values, hex } => cmd::hash_values(values, *hex),
        Commands::Condition { location } => {
            cmd::breakpoint_condition(location, &load_config(&cli)?)?
        }
        Commands::Exception { type_name } => {
            cmd::exception_condition(type_name.as_deref(), &load_config(&cli)?)
        }
        Commands::StartupScript { library } => {
            cmd::startup_script(library.as_deref(), &load_config(&cli)?)?
        }
        Commands::ParseWatch { expression, json } => cmd::parse_watch(expression, *json)?,
        Commands::Symbols => cmd::list_symbols(&load_config(&cli)?),
        Commands::Config { action } => cmd::config(*action, &cli)?,
    };

    println!("{output}");
    Ok(())
}

/// Where the configuration lives: `--config` or the home directory.
pub fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => RevdbConfig::config_path(),
    }
}

/// Load the effective configuration without creating any file.
///
/// A missing file yields the defaults. `--symbol-prefix` takes precedence
/// over the file.
pub fn load_config(cli: &Cli) -> Result<RevdbConfig> {
    let path = config_path(cli)?;
    let config = if path.exists() {
        RevdbConfig::load_from(&path)?
    } else {
        if cli.config.is_some() {
            eyre::bail!("Config file not found: {}", path.display());
        }
        tracing::debug!("No config file at {:?}, using defaults", path);
        RevdbConfig::default()
    };

    Ok(match &cli.symbol_prefix {
        Some(prefix) => config.with_symbol_prefix(prefix.clone()),
        None => config,
    })
}
