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


use std::{fmt::Display, str::FromStr};

use eyre::{bail, eyre, Error, Result};
use serde::{Deserialize, Serialize};

/// Location of a user breakpoint in interpreted source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakpointSpec {
    /// Stop whenever `line` of `file` is about to execute.
    FileLine {
        /// Absolute path of the source file, exactly as the interpreter reports it.
        file: String,
        /// Line number (1-based).
        line: u64,
    },
    /// Stop on the first line of every call to the named function.
    Function {
        /// Function name as the interpreter reports it.
        name: String,
    },
}

impl BreakpointSpec {
    /// Breakpoint on a source line.
    pub fn file_line(file: impl Into<String>, line: u64) -> Self {
        Self::FileLine { file: file.into(), line }
    }

    /// Breakpoint on function entry.
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function { name: name.into() }
    }
}

impl Display for BreakpointSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileLine { file, line } => write!(f, "{file}:{line}"),
            Self::Function { name } => write!(f, "{name} ()"),
        }
    }
}

impl FromStr for BreakpointSpec {
    type Err = Error;

    /// Parses a breakpoint location.
    /// Format: `<file>:<line>` or `<function>`
    /// Examples:
    /// - `/home/user/app.py:20` - Breakpoint on a line (the path must be absolute)
    /// - `main` - Breakpoint on entry of every call to `main`
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            bail!("A breakpoint location is required: <file>:<line> or <function>");
        }

        if let Some((file, line)) = trimmed.rsplit_once(':') {
            let file = file.trim();
            if file.is_empty() {
                bail!("Missing file name in breakpoint location: {trimmed}");
            }
            let line = line.trim().parse::<u64>().map_err(|e| eyre!("Invalid line number: {e}"))?;
            if line == 0 {
                bail!("Line numbers start at 1");
            }
            return Ok(Self::file_line(file, line));
        }

        if trimmed.chars().any(char::is_whitespace) {
            bail!("Invalid function name: {trimmed}");
        }
        Ok(Self::function(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_line() {
        let bp: BreakpointSpec = "/abs/path/app.py:10".parse().unwrap();
        assert_eq!(bp, BreakpointSpec::file_line("/abs/path/app.py", 10));
        assert_eq!(bp.to_string(), "/abs/path/app.py:10");
    }

    #[test]
    fn test_parse_function() {
        let bp: BreakpointSpec = "  handle_request ".parse().unwrap();
        assert_eq!(bp, BreakpointSpec::function("handle_request"));
        assert_eq!(bp.to_string(), "handle_request ()");
    }

    #[test]
    fn test_parse_windows_like_path_uses_last_colon() {
        let bp: BreakpointSpec = "C:/code/app.py:7".parse().unwrap();
        assert_eq!(bp, BreakpointSpec::file_line("C:/code/app.py", 7));
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<BreakpointSpec>().is_err());
        assert!("   ".parse::<BreakpointSpec>().is_err());
        assert!("/abs/app.py:".parse::<BreakpointSpec>().is_err());
        assert!("/abs/app.py:ten".parse::<BreakpointSpec>().is_err());
        assert!("/abs/app.py:0".parse::<BreakpointSpec>().is_err());
        assert!(":12".parse::<BreakpointSpec>().is_err());
        assert!("two words".parse::<BreakpointSpec>().is_err());
    }

    #[test]
    fn test_round_trip_through_display() {
        let bp = BreakpointSpec::file_line("/srv/job.py", 42);
        assert_eq!(bp.to_string().parse::<BreakpointSpec>().unwrap(), bp);
    }
}
