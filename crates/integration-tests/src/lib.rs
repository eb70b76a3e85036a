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


//! REVDB Integration Tests
//!
//! An in-memory record/replay target that plays back a scripted interpreter
//! history, plus the fixtures the end-to-end tests share.

/// Flat address space of the simulated process
pub mod memory;

/// Object layout of the simulated interpreter heap
pub mod heap;

/// Scripted interpreter histories
pub mod program;

/// The replaying [`revdb_engine::Target`]
pub mod replay_target;

/// Test utilities for integration tests
pub mod test_utils;
