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


//! Startup script command

use std::path::Path;

use eyre::Result;
use revdb_common::RevdbConfig;
use revdb_engine::{render_startup_script, EngineError};

/// Render the startup script for `library`, or for the configured runtime library.
pub fn startup_script(library: Option<&Path>, config: &RevdbConfig) -> Result<String> {
    let library = match library {
        Some(path) => path,
        None => config.runtime.library_path.as_deref().ok_or(EngineError::RuntimeLibraryMissing)?,
    };

    if !library.exists() {
        tracing::warn!("Runtime library {:?} does not exist on this machine", library);
    }
    Ok(render_startup_script(library))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_library_wins() {
        let config = RevdbConfig::default().with_library_path("/opt/configured.so");
        let script = startup_script(Some(Path::new("/opt/explicit.so")), &config).unwrap();
        assert!(script.contains("\"/opt/explicit.so\""));
        assert!(!script.contains("configured"));
    }

    #[test]
    fn test_configured_library() {
        let config = RevdbConfig::default().with_library_path("/opt/configured.so");
        let script = startup_script(None, &config).unwrap();
        assert!(script.contains("\"/opt/configured.so\""));
    }

    #[test]
    fn test_missing_library() {
        let err = startup_script(None, &RevdbConfig::default()).unwrap_err();
        assert!(err.to_string().contains("runtime.library_path"));
    }
}
