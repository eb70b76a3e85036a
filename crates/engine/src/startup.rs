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


//! Interpreter status and runtime injection.
//!
//! Injection runs a generated startup script inside the recorded interpreter.
//! The script imports the runtime library as an extension module and starts
//! it; a failure is printed by the script and never takes the program down.

use std::{fmt::Display, io::Write, path::Path};

use tracing::{debug, info};

use crate::{
    call::settle, call_symbol, with_breakpoints_suspended, with_injected_string, EngineError,
    EngineResult, ExecutionMode, Session, StopSubscription, Target,
};

/// Where the debuggee stands with respect to source-level debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterStatus {
    /// Not recording or replaying
    BadMode(ExecutionMode),
    /// None of the interpreter's entry points exist
    NotInterpreter,
    /// The interpreter has not finished initializing
    NeedsInitialization,
    /// The interpreter can be instrumented
    ReadyToRecord,
    /// The runtime is loaded
    InstrumentationLoaded,
}

impl Display for InterpreterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadMode(mode) => write!(f, "{}", EngineError::BadExecutionMode(*mode)),
            Self::NotInterpreter => write!(f, "{}", EngineError::NotInterpreter),
            Self::NeedsInitialization => write!(f, "{}", EngineError::NotInitialized),
            Self::ReadyToRecord => write!(f, "Ready to record with instrumentation."),
            Self::InstrumentationLoaded => write!(f, "The runtime instrumentation is loaded."),
        }
    }
}

/// Python module name of the runtime library: its file name up to the first dot.
fn module_name(library: &Path) -> String {
    library
        .file_name()
        .map(|name| name.to_string_lossy())
        .and_then(|name| name.split('.').next().map(str::to_string))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "revdb_runtime".to_string())
}

/// Render the script that loads and starts the runtime found at `library`.
pub fn render_startup_script(library: &Path) -> String {
    let path = library.to_string_lossy();
    // JSON string literals are valid Python string literals.
    let path_literal = serde_json::Value::String(path.into_owned()).to_string();
    let name_literal = serde_json::Value::String(module_name(library)).to_string();

    format!(
        r#"# Generated by revdb. Loads the tracing runtime into this interpreter.
import importlib.util
import os


def _revdb_start(name, path):
    if not os.path.exists(path):
        raise FileNotFoundError(f"runtime library not found: {{path}}")
    spec = importlib.util.spec_from_file_location(name, path)
    if spec is None or spec.loader is None:
        raise ImportError(f"cannot load the runtime library from {{path}}")
    module = importlib.util.module_from_spec(spec)
    spec.loader.exec_module(module)
    module.start()


try:
    _revdb_start({name_literal}, {path_literal})
except Exception as exc:
    print(f"revdb: failed to start the runtime: {{exc}}")
"#
    )
}

impl<T: Target> Session<T> {
    /// Inspect the debuggee. Calls the interpreter's initialization check
    /// when the runtime is not loaded yet.
    pub fn status(&mut self) -> EngineResult<InterpreterStatus> {
        match self.check_interpreter() {
            Ok(()) => {}
            Err(EngineError::BadExecutionMode(mode)) => return Ok(InterpreterStatus::BadMode(mode)),
            Err(EngineError::NotInterpreter) => return Ok(InterpreterStatus::NotInterpreter),
            Err(err) => return Err(err),
        }
        if self.instrumentation_present() {
            return Ok(InterpreterStatus::InstrumentationLoaded);
        }

        let is_initialized = &self.config.interpreter.is_initialized;
        if self.target.lookup_symbol(is_initialized).is_none() {
            return Ok(InterpreterStatus::NeedsInitialization);
        }
        let initialized = call_symbol(&mut self.target, is_initialized, &[])?;
        debug!(initialized, "queried interpreter initialization");
        Ok(if initialized == 0 {
            InterpreterStatus::NeedsInitialization
        } else {
            InterpreterStatus::ReadyToRecord
        })
    }

    /// Load the runtime into the interpreter (unless it is already there) and
    /// enable source-level debugging.
    pub fn record(&mut self) -> EngineResult<StopSubscription> {
        if self.is_active() {
            return Err(EngineError::AlreadyActive);
        }
        match self.status()? {
            InterpreterStatus::BadMode(mode) => return Err(EngineError::BadExecutionMode(mode)),
            InterpreterStatus::NotInterpreter => return Err(EngineError::NotInterpreter),
            InterpreterStatus::NeedsInitialization => return Err(EngineError::NotInitialized),
            InterpreterStatus::InstrumentationLoaded => {}
            InterpreterStatus::ReadyToRecord => self.inject_runtime()?,
        }
        self.activate()
    }

    fn inject_runtime(&mut self) -> EngineResult<()> {
        let library =
            self.config.runtime.library_path.clone().ok_or(EngineError::RuntimeLibraryMissing)?;
        let mut script = tempfile::Builder::new().prefix("revdb-startup-").suffix(".py").tempfile()?;
        script.write_all(render_startup_script(&library).as_bytes())?;
        script.flush()?;
        let path = script.path().to_string_lossy().into_owned();
        info!(library = %library.display(), script = %path, "injecting the runtime");

        let functions = &self.config.interpreter;
        with_breakpoints_suspended(&mut self.target, |target| {
            with_injected_string(target, functions, &path, |target, path_ptr| {
                with_injected_string(target, functions, "rb", |target, mode_ptr| {
                    let lock = call_symbol(target, &functions.lock_ensure, &[])?;
                    let ran = call_symbol(target, &functions.fopen, &[path_ptr, mode_ptr])
                        .and_then(|handle| {
                            if handle == 0 {
                                return Err(EngineError::StartupOpenFailed(path.clone()));
                            }
                            call_symbol(target, &functions.run_file, &[handle, path_ptr, 1])
                        });
                    let released =
                        call_symbol(target, &functions.lock_release, &[lock]).map(|_| ());
                    settle(ran, released)
                })
            })
        })?;

        if !self.instrumentation_present() {
            return Err(EngineError::Runtime(
                "the startup script ran but the runtime did not load".to_string(),
            ));
        }
        Ok(())
    }
}
