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


//! Request/response exchange with the runtime's interaction entry points.
//!
//! Each request calls one `<prefix>_interact_*` function inside the debuggee
//! with the path of a fresh temporary file. The runtime writes a complete
//! response to that file before returning, and the engine reads it once the
//! call is over. One request yields exactly one full snapshot.

use std::{fmt::Display, fs};

use revdb_common::{
    types::{Backtrace, LocalList},
    DumpKind, InterpreterConfig, RuntimeSymbols,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    call_function, with_injected_string, ChainResponse, EngineError, EngineResult, Target,
    WatchChain, WatchStep,
};

/// Prefix marking a failed evaluation.
pub const EVAL_ERROR_PREFIX: &str = "error:";

/// A single request to the runtime.
#[derive(Debug, Clone, Copy)]
pub enum RuntimeRequest<'a> {
    /// Backtrace of the current thread
    Backtrace,
    /// Locals of the current frame
    Locals,
    /// Evaluate an expression in the current frame
    Eval(&'a str),
    /// Resolve the storage addresses of a watch chain
    WatchChain(&'a [WatchStep]),
}

impl RuntimeRequest<'_> {
    /// Which entry point serves the request.
    pub fn kind(&self) -> DumpKind {
        match self {
            Self::Backtrace => DumpKind::Backtrace,
            Self::Locals => DumpKind::Locals,
            Self::Eval(_) => DumpKind::Eval,
            Self::WatchChain(_) => DumpKind::WatchChain,
        }
    }
}

/// Result of evaluating an expression in the debuggee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// The value, as rendered by the interpreter
    Value(String),
    /// The interpreter's error message
    Error(String),
}

impl Evaluation {
    /// Interpret the runtime's textual answer.
    pub fn parse(text: &str) -> Self {
        match text.strip_prefix(EVAL_ERROR_PREFIX) {
            Some(message) => Self::Error(message.trim().to_string()),
            None => Self::Value(text.to_string()),
        }
    }

    /// The value, if the evaluation succeeded.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Value(value) => Some(value),
            Self::Error(_) => None,
        }
    }
}

impl Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            Self::Error(message) => write!(f, "{EVAL_ERROR_PREFIX} {message}"),
        }
    }
}

/// Talks to the runtime through debuggee calls.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeChannel<'a> {
    symbols: &'a RuntimeSymbols,
    functions: &'a InterpreterConfig,
}

impl<'a> RuntimeChannel<'a> {
    /// Channel to the runtime exporting `symbols`, allocating through `functions`.
    pub fn new(symbols: &'a RuntimeSymbols, functions: &'a InterpreterConfig) -> Self {
        Self { symbols, functions }
    }

    /// Send one request and return the raw response text.
    pub fn request<T: Target>(
        &self,
        target: &mut T,
        request: RuntimeRequest<'_>,
    ) -> EngineResult<String> {
        let kind = request.kind();
        let entry = self.symbols.dump(kind);
        let function = target.lookup_symbol(&entry).ok_or(EngineError::NotInstrumented)?;

        let file = tempfile::Builder::new().prefix("revdb-").suffix(".out").tempfile()?;
        let path = file.path().to_string_lossy().into_owned();
        debug!(%entry, %path, "requesting runtime dump");

        let functions = self.functions;
        with_injected_string(target, functions, &path, |target, path_ptr| match request {
            RuntimeRequest::Backtrace | RuntimeRequest::Locals => {
                call_function(target, function, &[path_ptr])
            }
            RuntimeRequest::Eval(expr) => {
                with_injected_string(target, functions, expr, |target, expr_ptr| {
                    call_function(target, function, &[path_ptr, expr_ptr])
                })
            }
            RuntimeRequest::WatchChain(steps) => {
                let json = serde_json::to_string(steps)
                    .map_err(|e| EngineError::Dump { kind, reason: e.to_string() })?;
                with_injected_string(target, functions, &json, |target, steps_ptr| {
                    call_function(target, function, &[path_ptr, steps_ptr])
                })
            }
        })?;

        fs::read_to_string(file.path())
            .map_err(|e| EngineError::Dump { kind, reason: e.to_string() })
    }

    fn request_json<T: Target, M: DeserializeOwned>(
        &self,
        target: &mut T,
        request: RuntimeRequest<'_>,
    ) -> EngineResult<M> {
        let kind = request.kind();
        let content = self.request(target, request)?;
        serde_json::from_str(&content).map_err(|e| EngineError::Dump { kind, reason: e.to_string() })
    }

    /// Backtrace of the current thread.
    pub fn backtrace<T: Target>(&self, target: &mut T) -> EngineResult<Backtrace> {
        self.request_json(target, RuntimeRequest::Backtrace)
    }

    /// Locals of the current frame.
    pub fn locals<T: Target>(&self, target: &mut T) -> EngineResult<LocalList> {
        self.request_json(target, RuntimeRequest::Locals)
    }

    /// Evaluate an expression in the current frame.
    pub fn evaluate<T: Target>(&self, target: &mut T, expr: &str) -> EngineResult<Evaluation> {
        Ok(Evaluation::parse(&self.request(target, RuntimeRequest::Eval(expr))?))
    }

    /// Resolve every link of a watch chain in the current frame.
    pub fn resolve_chain<T: Target>(
        &self,
        target: &mut T,
        steps: &[WatchStep],
    ) -> EngineResult<WatchChain> {
        let response: ChainResponse = self.request_json(target, RuntimeRequest::WatchChain(steps))?;
        WatchChain::from_response(steps, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_parse() {
        assert_eq!(Evaluation::parse("[1, 2]"), Evaluation::Value("[1, 2]".into()));
        assert_eq!(
            Evaluation::parse("error: NameError: name 'y' is not defined"),
            Evaluation::Error("NameError: name 'y' is not defined".into())
        );
        assert_eq!(Evaluation::parse("error:x").value(), None);
        assert_eq!(Evaluation::Error("boom".into()).to_string(), "error: boom");
    }

    #[test]
    fn test_request_kinds() {
        assert_eq!(RuntimeRequest::Backtrace.kind(), DumpKind::Backtrace);
        assert_eq!(RuntimeRequest::Eval("x").kind(), DumpKind::Eval);
        assert_eq!(RuntimeRequest::WatchChain(&[]).kind(), DumpKind::WatchChain);
    }
}
