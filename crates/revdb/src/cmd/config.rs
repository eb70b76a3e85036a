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


//! Configuration command

use eyre::Result;
use revdb_common::RevdbConfig;

use crate::{config_path, load_config, Cli, ConfigAction};

/// Run a configuration action.
pub fn config(action: ConfigAction, cli: &Cli) -> Result<String> {
    match action {
        ConfigAction::Show => load_config(cli)?.to_toml(),
        ConfigAction::Path => Ok(config_path(cli)?.display().to_string()),
        ConfigAction::Init { force } => {
            let path = config_path(cli)?;
            if path.exists() && !force {
                eyre::bail!(
                    "Config file already exists at {}, use --force to overwrite",
                    path.display()
                );
            }
            RevdbConfig::default().save_to(&path)?;
            tracing::info!("Wrote default configuration to {:?}", path);
            Ok(format!("Wrote default configuration to {}", path.display()))
        }
    }
}
