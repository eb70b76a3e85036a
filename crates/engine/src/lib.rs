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


//! REVDB Engine - source-level navigation over a record/replay debugger
//!
//! The engine turns source-level requests (step, next, finish, breakpoints,
//! exception search, watches) into native breakpoints with hash-based
//! conditions on the hooks of a runtime injected into the interpreter.

pub mod target;
pub use target::*;

pub mod error;
pub use error::*;

pub mod condition;
pub use condition::*;

pub mod bridge;
pub use bridge::*;

pub mod call;
pub use call::*;

pub mod runtime;
pub use runtime::*;

pub mod registry;
pub use registry::*;

pub mod watch;
pub use watch::*;

pub mod session;
pub use session::*;

pub mod navigation;
pub use navigation::*;

pub mod exception;

pub mod startup;
pub use startup::*;
