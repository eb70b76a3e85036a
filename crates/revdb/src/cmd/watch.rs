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


//! Watch expression command

use eyre::Result;
use revdb_engine::{parse_watch_expression, render_watch_chain, WatchStep};

fn describe(step: &WatchStep) -> String {
    match step {
        WatchStep::Name { name } => format!("name {name}"),
        WatchStep::Attr { name } => format!("attribute {name}"),
        WatchStep::Index { index } => format!("index {index}"),
        WatchStep::Key { key } => format!("key {key:?}"),
    }
}

/// Parse `expression` and show the lookups a watch on it resolves.
pub fn parse_watch(expression: &str, json: bool) -> Result<String> {
    let steps = parse_watch_expression(expression)?;
    if json {
        return Ok(serde_json::to_string_pretty(&steps)?);
    }

    let mut lines = vec![render_watch_chain(&steps)];
    lines.extend(steps.iter().enumerate().map(|(i, step)| format!("  {i}: {}", describe(step))));
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch_listing() {
        let output = parse_watch(" a.b [0]['k'] ", false).unwrap();
        assert_eq!(output, "a.b[0][\"k\"]\n  0: name a\n  1: attribute b\n  2: index 0\n  3: key \"k\"");
    }

    #[test]
    fn test_parse_watch_json() {
        let output = parse_watch("a[-1]", true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                { "type": "name", "name": "a" },
                { "type": "index", "index": -1 }
            ])
        );
    }

    #[test]
    fn test_parse_watch_rejects_calls() {
        let err = parse_watch("f()", false).unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }
}
