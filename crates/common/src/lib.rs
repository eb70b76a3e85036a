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

//! REVDB Common - Shared functionality for REVDB components
//!
//! This crate provides the data model mirrored from the injected interpreter
//! runtime, the string hash shared with that runtime, runtime symbol naming,
//! user configuration and logging setup.

/// Common types used throughout REVDB: interpreter state, frames, locals and breakpoint specs
pub mod types;

/// User configuration stored as TOML in the home directory
pub mod config;
/// The string hash used by breakpoint conditions, bit-compatible with the injected runtime
pub mod hash;
/// Logging setup and utilities for consistent logging across REVDB components
pub mod logging;
/// Names of the symbols exported by the injected runtime
pub mod symbols;

pub use config::*;
pub use hash::*;
pub use logging::*;
pub use symbols::*;
