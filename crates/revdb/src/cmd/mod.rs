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


//! Command implementations for the REVDB CLI
//!
//! Every command returns the text to print so that it can be checked without
//! spawning the binary.

pub mod condition;
pub mod config;
pub mod hash;
pub mod script;
pub mod symbols;
pub mod watch;

pub use condition::{breakpoint_condition, exception_condition};
pub use config::config;
pub use hash::hash_values;
pub use script::startup_script;
pub use symbols::list_symbols;
pub use watch::parse_watch;
