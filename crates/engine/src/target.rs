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


//! The seam between the engine and the native record/replay debugger.
//!
//! The engine never talks to a debugger protocol directly. Everything it needs
//! from the native side (symbols, memory, registers, breakpoints, resuming in
//! either direction) goes through the [`Target`] trait, so the same navigation
//! logic drives a real debugger backend or the in-memory replay used in tests.

use std::ops::{Index, IndexMut};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Condition;

/// An address in the debuggee.
pub type Address = u64;

/// Identifier of a native breakpoint or watchpoint, owned by the target.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("#{_0}")]
pub struct BreakpointId(pub u64);

/// Direction of execution.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Run forward in time.
    #[display("forward")]
    Forward,
    /// Run backward through recorded history.
    #[display("reverse")]
    Reverse,
}

/// An end of recorded history.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// The very first recorded instruction.
    #[display("start")]
    Start,
    /// The last recorded instruction.
    #[display("end")]
    End,
}

/// What the native debugger is currently doing with the debuggee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// There is no process.
    NotRunning,
    /// The process runs without being recorded.
    Live,
    /// The process runs and is being recorded.
    Recording,
    /// A recording is being replayed.
    Replaying,
}

impl ExecutionMode {
    /// Source-level navigation needs recorded history.
    pub fn is_recording_or_replaying(self) -> bool {
        matches!(self, Self::Recording | Self::Replaying)
    }

    /// User-facing description of the mode.
    pub fn description(self) -> &'static str {
        match self {
            Self::NotRunning => "The program is not being run.",
            Self::Live => "The program is running but is not being recorded.",
            Self::Recording => "The program is being recorded.",
            Self::Replaying => "A recording is being replayed.",
        }
    }
}

/// x86-64 general purpose registers.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Rip,
    Eflags,
}

impl Register {
    /// Every general purpose register, in the order [`Registers`] stores them.
    pub const ALL: [Self; 18] = [
        Self::Rax,
        Self::Rbx,
        Self::Rcx,
        Self::Rdx,
        Self::Rsi,
        Self::Rdi,
        Self::Rbp,
        Self::Rsp,
        Self::R8,
        Self::R9,
        Self::R10,
        Self::R11,
        Self::R12,
        Self::R13,
        Self::R14,
        Self::R15,
        Self::Rip,
        Self::Eflags,
    ];

    /// Integer argument registers of the System V calling convention.
    pub const ARGUMENTS: [Self; 6] = [Self::Rdi, Self::Rsi, Self::Rdx, Self::Rcx, Self::R8, Self::R9];

    /// Register holding an integer return value.
    pub const RETURN_VALUE: Self = Self::Rax;

    /// Register name as the debugger spells it.
    pub fn name(self) -> &'static str {
        match self {
            Self::Rax => "rax",
            Self::Rbx => "rbx",
            Self::Rcx => "rcx",
            Self::Rdx => "rdx",
            Self::Rsi => "rsi",
            Self::Rdi => "rdi",
            Self::Rbp => "rbp",
            Self::Rsp => "rsp",
            Self::R8 => "r8",
            Self::R9 => "r9",
            Self::R10 => "r10",
            Self::R11 => "r11",
            Self::R12 => "r12",
            Self::R13 => "r13",
            Self::R14 => "r14",
            Self::R15 => "r15",
            Self::Rip => "rip",
            Self::Eflags => "eflags",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A snapshot of every general purpose register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers([u64; 18]);

impl Registers {
    /// Iterate over `(register, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Register, u64)> + '_ {
        Register::ALL.iter().map(|reg| (*reg, self[*reg]))
    }
}

impl Index<Register> for Registers {
    type Output = u64;

    fn index(&self, reg: Register) -> &u64 {
        &self.0[reg.slot()]
    }
}

impl IndexMut<Register> for Registers {
    fn index_mut(&mut self, reg: Register) -> &mut u64 {
        &mut self.0[reg.slot()]
    }
}

/// One entry of the debuggee's memory map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMap {
    /// First address of the mapping.
    pub start: Address,
    /// One past the last address of the mapping.
    pub end: Address,
    /// Backing file, or a pseudo name such as `[heap]`.
    pub path: String,
    /// Readable mapping.
    pub readable: bool,
    /// Writable mapping.
    pub writable: bool,
    /// Executable mapping.
    pub executable: bool,
}

impl MemoryMap {
    /// Size in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pseudo mappings (`[stack]`, `[vdso]`, ...) are never used for injection.
    pub fn is_pseudo(&self) -> bool {
        self.path.starts_with('[')
    }
}

/// Where a native breakpoint is placed.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
pub enum Site {
    /// Entry of a named function. Stays pending until the symbol is loaded.
    #[display("{_0}")]
    Symbol(String),
    /// An exact instruction address.
    #[display("*{_0:#x}")]
    Address(Address),
}

/// Why the debuggee stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// One or more breakpoints were hit; their conditions held.
    Breakpoint(Vec<BreakpointId>),
    /// One or more hardware watchpoints saw a write.
    Watchpoint(Vec<BreakpointId>),
    /// The debuggee received a signal.
    Signal(String),
    /// Execution reached the start or the end of recorded history.
    EndOfHistory,
    /// The debuggee exited with the given code.
    Exited(i32),
    /// The user interrupted the resume.
    Interrupted,
}

/// A stop, as reported by [`Target::resume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopEvent {
    /// Why execution stopped.
    pub reason: StopReason,
}

impl StopEvent {
    /// Breakpoints responsible for the stop.
    pub fn breakpoints(&self) -> &[BreakpointId] {
        match &self.reason {
            StopReason::Breakpoint(ids) => ids,
            _ => &[],
        }
    }

    /// Watchpoints responsible for the stop.
    pub fn watchpoints(&self) -> &[BreakpointId] {
        match &self.reason {
            StopReason::Watchpoint(ids) => ids,
            _ => &[],
        }
    }
}

/// Errors reported by the native debugger.
#[derive(Debug, Error)]
pub enum TargetError {
    /// Memory could not be read or written
    #[error("cannot access memory at {addr:#x} ({len} bytes)")]
    Memory {
        /// First address of the access
        addr: Address,
        /// Length of the access
        len: usize,
    },

    /// A breakpoint id the target does not know
    #[error("no breakpoint {0}")]
    UnknownBreakpoint(BreakpointId),

    /// A hardware watchpoint could not be armed
    #[error("cannot watch {addr:#x}: {reason}")]
    WatchpointUnavailable {
        /// Watched address
        addr: Address,
        /// Why the target refused
        reason: String,
    },

    /// The operation was interrupted by the user
    #[error("interrupted")]
    Interrupted,

    /// Any other backend failure
    #[error("debugger backend error: {0}")]
    Backend(String),
}

/// Result alias for [`Target`] operations.
pub type TargetResult<T> = Result<T, TargetError>;

/// Operations the engine needs from a native record/replay debugger.
///
/// Every method acts on the currently selected thread. Breakpoint conditions
/// are passed structurally; a backend may render them with
/// [`Condition::render`] for a native condition evaluator or evaluate them
/// in-process with [`Condition::matches`].
pub trait Target {
    /// Current execution mode.
    fn execution_mode(&self) -> ExecutionMode;

    /// Address of a symbol, if it is currently loaded.
    fn lookup_symbol(&self, name: &str) -> Option<Address>;

    /// Read `len` bytes of debuggee memory.
    fn read_memory(&self, addr: Address, len: usize) -> TargetResult<Vec<u8>>;

    /// Overwrite debuggee memory.
    fn write_memory(&mut self, addr: Address, data: &[u8]) -> TargetResult<()>;

    /// Read the general purpose registers.
    fn read_registers(&self) -> TargetResult<Registers>;

    /// Overwrite the general purpose registers.
    fn write_registers(&mut self, registers: &Registers) -> TargetResult<()>;

    /// Current memory mappings of the debuggee.
    fn memory_maps(&self) -> TargetResult<Vec<MemoryMap>>;

    /// Place a breakpoint, optionally conditional.
    fn insert_breakpoint(
        &mut self,
        site: &Site,
        condition: Option<&Condition>,
    ) -> TargetResult<BreakpointId>;

    /// Arm a hardware write watchpoint on `len` bytes at `addr`.
    fn insert_watchpoint(&mut self, addr: Address, len: u64) -> TargetResult<BreakpointId>;

    /// Delete a breakpoint or watchpoint.
    fn remove_breakpoint(&mut self, id: BreakpointId) -> TargetResult<()>;

    /// Enable or disable a breakpoint or watchpoint without deleting it.
    fn set_breakpoint_enabled(&mut self, id: BreakpointId, enabled: bool) -> TargetResult<()>;

    /// Every breakpoint and watchpoint that is currently enabled.
    fn enabled_breakpoints(&self) -> Vec<BreakpointId>;

    /// How many times a breakpoint has stopped execution since it was placed.
    fn hit_count(&self, id: BreakpointId) -> TargetResult<u64>;

    /// Resume and block until the next stop.
    fn resume(&mut self, direction: Direction) -> TargetResult<StopEvent>;

    /// Jump to an end of recorded history.
    fn go_to_boundary(&mut self, boundary: Boundary) -> TargetResult<()>;
}
