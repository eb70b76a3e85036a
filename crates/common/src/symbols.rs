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

//! Symbol names exported by the injected runtime.
//!
//! Every symbol is derived from a single prefix so that a differently named
//! runtime build can be targeted through configuration alone.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Default prefix of every runtime symbol.
pub const DEFAULT_SYMBOL_PREFIX: &str = "s_revdb";

/// The four interpreter events the runtime reports through empty hook functions.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookKind {
    /// A new source line is about to execute.
    #[display("line")]
    Line,
    /// A frame was entered.
    #[display("call")]
    Call,
    /// A frame is returning.
    #[display("return")]
    Return,
    /// An exception was raised or is propagating.
    #[display("exception")]
    Exception,
}

/// Runtime entry points that write a structured record to a file.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DumpKind {
    /// Backtrace of the current thread, most recent frame first.
    #[display("backtrace")]
    Backtrace,
    /// Locals of the current frame.
    #[display("locals")]
    Locals,
    /// Evaluation of an expression in the current frame.
    #[display("eval")]
    Eval,
    /// Storage addresses of every link of a watch chain.
    #[display("watch chain")]
    WatchChain,
}

/// Resolves runtime symbol names from a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSymbols {
    prefix: String,
}

impl Default for RuntimeSymbols {
    fn default() -> Self {
        Self::new(DEFAULT_SYMBOL_PREFIX)
    }
}

impl RuntimeSymbols {
    /// Create symbol naming for the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// The prefix itself.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The global state structure. Its presence means the runtime is loaded.
    pub fn state(&self) -> &str {
        &self.prefix
    }

    /// The empty function called for the given hook event.
    pub fn hook(&self, kind: HookKind) -> String {
        let suffix = match kind {
            HookKind::Line => "line",
            HookKind::Call => "call",
            HookKind::Return => "ret",
            HookKind::Exception => "exception",
        };
        format!("{}_trace_{suffix}", self.prefix)
    }

    /// The entry point serving the given dump request.
    pub fn dump(&self, kind: DumpKind) -> String {
        let suffix = match kind {
            DumpKind::Backtrace => "backtrace_json",
            DumpKind::Locals => "locals_json",
            DumpKind::Eval => "eval",
            DumpKind::WatchChain => "watch_chain",
        };
        format!("{}_interact_{suffix}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_symbols() {
        let symbols = RuntimeSymbols::default();
        assert_eq!(symbols.state(), "s_revdb");
        assert_eq!(symbols.hook(HookKind::Line), "s_revdb_trace_line");
        assert_eq!(symbols.hook(HookKind::Call), "s_revdb_trace_call");
        assert_eq!(symbols.hook(HookKind::Return), "s_revdb_trace_ret");
        assert_eq!(symbols.hook(HookKind::Exception), "s_revdb_trace_exception");
    }

    #[test]
    fn test_dump_symbols() {
        let symbols = RuntimeSymbols::new("rt");
        assert_eq!(symbols.dump(DumpKind::Backtrace), "rt_interact_backtrace_json");
        assert_eq!(symbols.dump(DumpKind::Locals), "rt_interact_locals_json");
        assert_eq!(symbols.dump(DumpKind::Eval), "rt_interact_eval");
        assert_eq!(symbols.dump(DumpKind::WatchChain), "rt_interact_watch_chain");
    }
}
