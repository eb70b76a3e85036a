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


//! Condition commands
//!
//! Show the exact native condition the engine hands to the debugger, rendered
//! against the configured state symbol.

use eyre::Result;
use revdb_common::{types::BreakpointSpec, RevdbConfig, RuntimeSymbols};
use revdb_engine::{compile_condition, Condition};

/// The hook a condition is placed on, followed by the rendered condition.
fn render(hook: String, condition: &Condition, symbols: &RuntimeSymbols) -> String {
    format!("break {hook} if {}", condition.render(symbols.state()))
}

/// Condition of a user breakpoint at `location`.
pub fn breakpoint_condition(location: &str, config: &RevdbConfig) -> Result<String> {
    let spec: BreakpointSpec = location.parse()?;
    tracing::debug!(%spec, "compiling breakpoint condition");

    let symbols = RuntimeSymbols::new(&config.runtime.symbol_prefix);
    let hook = symbols.hook(revdb_common::HookKind::Line);
    Ok(render(hook, &compile_condition(&spec), &symbols))
}

/// Condition used when searching for raised exceptions.
pub fn exception_condition(type_name: Option<&str>, config: &RevdbConfig) -> String {
    let symbols = RuntimeSymbols::new(&config.runtime.symbol_prefix);
    let hook = symbols.hook(revdb_common::HookKind::Exception);
    render(hook, &Condition::raised_exception(type_name), &symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use revdb_common::simple_hash;

    #[test]
    fn test_line_breakpoint_condition() {
        let rendered = breakpoint_condition("/srv/app.py:12", &RevdbConfig::default()).unwrap();
        assert_eq!(
            rendered,
            format!(
                "break s_revdb_trace_line if s_revdb.current_line == 12 && s_revdb.current_file_id == {}",
                simple_hash("/srv/app.py")
            )
        );
    }

    #[test]
    fn test_function_breakpoint_condition_uses_prefix() {
        let config = RevdbConfig::default().with_symbol_prefix("rt");
        let rendered = breakpoint_condition("handler", &config).unwrap();
        assert_eq!(
            rendered,
            format!(
                "break rt_trace_line if rt.current_func_id == {} && rt.first_line == 1",
                simple_hash("handler")
            )
        );
    }

    #[test]
    fn test_invalid_location() {
        assert!(breakpoint_condition("/srv/app.py:0", &RevdbConfig::default()).is_err());
    }

    #[test]
    fn test_exception_condition() {
        let config = RevdbConfig::default();
        assert_eq!(
            exception_condition(None, &config),
            "break s_revdb_trace_exception if s_revdb.exception_origin == 1"
        );
        assert!(exception_condition(Some("KeyError"), &config)
            .ends_with(&format!("s_revdb.exception_type_id == {}", simple_hash("KeyError"))));
    }
}
