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


//! Hash command

use revdb_common::simple_hash;

/// One line per value: the hash followed by the value it was computed from.
pub fn hash_values(values: &[String], hex: bool) -> String {
    values
        .iter()
        .map(|value| {
            let hash = simple_hash(value);
            if hex {
                format!("{hash:#018x}  {value}")
            } else {
                format!("{hash}  {value}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
