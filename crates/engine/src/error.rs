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


use revdb_common::DumpKind;
use thiserror::Error;

use crate::{Address, ExecutionMode, TargetError, WatchParseError};

/// Errors raised by the navigation engine.
///
/// User errors carry a message meant to be shown as is. Invariant violations
/// (such as [`EngineError::CallFailed`]) abort the operation without retrying.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The native debugger failed
    #[error(transparent)]
    Target(#[from] TargetError),

    /// Navigation needs recorded history
    #[error("Source-level debugging needs a recording. {}", .0.description())]
    BadExecutionMode(ExecutionMode),

    /// The debuggee does not look like the interpreter
    #[error("The debuggee is not an interpreter that can be instrumented.")]
    NotInterpreter,

    /// The interpreter has not finished initializing
    #[error(
        "The interpreter is not initialized yet. Continue until initialization has finished and try again."
    )]
    NotInitialized,

    /// The runtime instrumentation is not loaded at the current position
    #[error("The runtime instrumentation is required but is not loaded in the debuggee.")]
    NotInstrumented,

    /// The session has not been activated
    #[error("Source-level debugging is not enabled. Record with instrumentation first.")]
    Inactive,

    /// The session is already active
    #[error("Source-level debugging is already enabled.")]
    AlreadyActive,

    /// A stop subscription that does not belong to this session
    #[error("stop subscription {0} does not belong to this session")]
    SubscriptionMismatch(u64),

    /// No interpreter frame is executing
    #[error("No interpreter frame is executing here.")]
    NoFrame,

    /// The user interrupted a resume
    #[error("Interrupted.")]
    Interrupted,

    /// A debuggee call did not run to its return point exactly once
    #[error("Call to {function:#x} failed: the return breakpoint was hit {hits} times")]
    CallFailed {
        /// Called function
        function: Address,
        /// Hit count of the return breakpoint
        hits: u64,
    },

    /// Debuggee calls take at most six integer arguments
    #[error("Only 0-6 arguments are supported in debuggee calls, got {0}")]
    TooManyArguments(usize),

    /// A function the engine needs to call is not loaded
    #[error("Cannot find symbol `{0}` in the debuggee")]
    SymbolNotFound(String),

    /// No executable mapping has a zero-filled tail large enough for the trampoline
    #[error("Cannot find {0} bytes of unused executable memory to inject a call")]
    NoInjectionSpace(usize),

    /// Strings injected into the debuggee cannot contain NUL
    #[error("Cannot inject a string containing a NUL byte")]
    InteriorNul,

    /// The runtime library path is not configured
    #[error("The runtime library path is not configured (runtime.library_path)")]
    RuntimeLibraryMissing,

    /// The startup script could not be opened inside the debuggee
    #[error("Failed to open the startup script {0} in the debuggee")]
    StartupOpenFailed(String),

    /// A dump hand-off failed on the debugger side
    #[error("Failed to read the {kind} dump: {reason}")]
    Dump {
        /// Which dump was requested
        kind: DumpKind,
        /// What went wrong
        reason: String,
    },

    /// The runtime reported an error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Unsupported watch expression
    #[error(transparent)]
    WatchParse(#[from] WatchParseError),

    /// Removing a watch that does not exist
    #[error("No watchpoint number {0}.")]
    NoSuchWatch(usize),

    /// Other engine errors
    #[error("other error: {0}")]
    Other(eyre::Report),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(err.into())
    }
}
