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


//! User-visible breakpoints.
//!
//! Every breakpoint is a native breakpoint on the line hook, guarded by a
//! hash-based condition computed once at creation. The hash comparison is only
//! a pre-filter: a hit is confirmed by comparing the decoded strings before it
//! is reported.

use std::fmt::Display;

use revdb_common::types::{BreakpointSpec, InterpreterState};
use tracing::{debug, warn};

use crate::{BreakpointId, Condition, EngineResult, Site, Target};

/// Compile the standing condition of a breakpoint.
pub fn compile_condition(spec: &BreakpointSpec) -> Condition {
    match spec {
        BreakpointSpec::FileLine { file, line } => Condition::file_line(file, *line),
        BreakpointSpec::Function { name } => Condition::function_entry(name),
    }
}

/// Exact check of a hit against the decoded state.
pub fn confirm_hit(spec: &BreakpointSpec, state: &InterpreterState) -> bool {
    match spec {
        BreakpointSpec::FileLine { file, line } => {
            state.current_file.ends_with(file.as_str()) && state.current_line == *line
        }
        BreakpointSpec::Function { name } => state.current_func == *name && state.first_line,
    }
}

/// A breakpoint set by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserBreakpoint {
    index: usize,
    spec: BreakpointSpec,
    condition: Condition,
    native: BreakpointId,
}

impl UserBreakpoint {
    /// User-visible number.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Where the breakpoint stops.
    pub fn spec(&self) -> &BreakpointSpec {
        &self.spec
    }

    /// The compiled condition.
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Message printed when the breakpoint is set.
    pub fn set_message(&self) -> String {
        format!("Breakpoint {} at {}", self.index, self.spec)
    }

    /// Message printed when the breakpoint stops execution.
    pub fn hit_message(&self, state: &InterpreterState) -> String {
        format!("Breakpoint {}, {} () at {}", self.index, state.current_func, state.position())
    }
}

impl Display for UserBreakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.index, self.spec)
    }
}

/// Registry of user breakpoints, in creation order.
///
/// Indices start at 1 and are never reused within a session.
#[derive(Debug, Clone)]
pub struct BreakpointRegistry {
    next_index: usize,
    entries: Vec<UserBreakpoint>,
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self { next_index: 1, entries: Vec::new() }
    }
}

impl BreakpointRegistry {
    /// Compile `spec`, place it on `line_hook` and register it.
    pub fn add<T: Target>(
        &mut self,
        target: &mut T,
        line_hook: &str,
        spec: BreakpointSpec,
    ) -> EngineResult<&UserBreakpoint> {
        let condition = compile_condition(&spec);
        let native = target.insert_breakpoint(&Site::Symbol(line_hook.to_string()), Some(&condition))?;
        let breakpoint = UserBreakpoint { index: self.next_index, spec, condition, native };
        self.next_index += 1;
        debug!(index = breakpoint.index, spec = %breakpoint.spec, %native, "added breakpoint");

        self.entries.push(breakpoint);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// All breakpoints, in creation order.
    pub fn list(&self) -> &[UserBreakpoint] {
        &self.entries
    }

    /// The listing shown to the user.
    pub fn list_message(&self) -> String {
        if self.entries.is_empty() {
            return "No breakpoints.".to_string();
        }
        self.entries.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
    }

    /// Look a breakpoint up by user index.
    pub fn get(&self, index: usize) -> Option<&UserBreakpoint> {
        self.entries.iter().find(|bp| bp.index == index)
    }

    /// Look a breakpoint up by native id.
    pub fn by_native(&self, id: BreakpointId) -> Option<&UserBreakpoint> {
        self.entries.iter().find(|bp| bp.native == id)
    }

    /// Whether the native id belongs to a user breakpoint.
    pub fn owns(&self, id: BreakpointId) -> bool {
        self.by_native(id).is_some()
    }

    /// Delete breakpoint `index`, or every breakpoint when `index` is 0.
    ///
    /// Never fails: an empty registry or an unknown index is reported in the
    /// returned message and nothing changes.
    pub fn delete<T: Target>(&mut self, target: &mut T, index: usize) -> String {
        if self.entries.is_empty() {
            return "No breakpoints.".to_string();
        }
        if index == 0 {
            let count = self.entries.len();
            self.remove_all(target);
            return format!("Deleted {count} breakpoints.");
        }
        let Some(position) = self.entries.iter().position(|bp| bp.index == index) else {
            return format!("No breakpoint (number {index}).");
        };
        let breakpoint = self.entries.remove(position);
        remove_native(target, &breakpoint);
        format!("Deleted breakpoint {index}.")
    }

    /// Delete every breakpoint.
    pub fn remove_all<T: Target>(&mut self, target: &mut T) {
        for breakpoint in self.entries.drain(..) {
            remove_native(target, &breakpoint);
        }
    }
}

fn remove_native<T: Target>(target: &mut T, breakpoint: &UserBreakpoint) {
    if let Err(err) = target.remove_breakpoint(breakpoint.native) {
        warn!(index = breakpoint.index, error = %err, "failed to remove native breakpoint");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revdb_common::{
        simple_hash,
        types::{FrameId, StateField},
    };

    fn state(file: &str, func: &str, line: u64, first_line: bool) -> InterpreterState {
        InterpreterState {
            current_frame: Some(FrameId(1)),
            current_file: file.into(),
            current_file_id: simple_hash(file),
            current_func: func.into(),
            current_func_id: simple_hash(func),
            current_line: line,
            first_line,
            ..Default::default()
        }
    }

    #[test]
    fn test_compile_condition_per_variant() {
        let file_line = compile_condition(&BreakpointSpec::file_line("/abs/path/app.py", 10));
        assert_eq!(file_line.clauses().len(), 2);
        assert_eq!(file_line.clauses()[0].field, StateField::CurrentLine);

        let function = compile_condition(&BreakpointSpec::function("main"));
        assert_eq!(function.clauses()[0].field, StateField::CurrentFuncId);
        assert_eq!(function.clauses()[1].field, StateField::FirstLine);
    }

    #[test]
    fn test_confirm_file_line_uses_suffix_and_line() {
        let spec = BreakpointSpec::file_line("/abs/path/app.py", 10);
        assert!(confirm_hit(&spec, &state("/abs/path/app.py", "main", 10, false)));
        assert!(!confirm_hit(&spec, &state("/abs/path/app.py", "main", 11, false)));
        assert!(!confirm_hit(&spec, &state("/abs/path/lib.py", "main", 10, false)));
    }

    #[test]
    fn test_confirm_rejects_hash_collision() {
        // Same hash fields as a real hit, different decoded strings.
        let spec = BreakpointSpec::file_line("/abs/path/app.py", 10);
        let mut collided = state("/abs/path/app.py", "main", 10, false);
        collided.current_file = "/elsewhere/other.py".into();
        assert!(compile_condition(&spec).matches(&collided));
        assert!(!confirm_hit(&spec, &collided));
    }

    #[test]
    fn test_confirm_function_entry() {
        let spec = BreakpointSpec::function("main");
        assert!(confirm_hit(&spec, &state("/a.py", "main", 3, true)));
        assert!(!confirm_hit(&spec, &state("/a.py", "main", 4, false)));
        assert!(!confirm_hit(&spec, &state("/a.py", "domain", 3, true)));
    }

    #[test]
    fn test_messages() {
        let bp = UserBreakpoint {
            index: 2,
            spec: BreakpointSpec::file_line("/abs/path/app.py", 10),
            condition: Condition::always(),
            native: BreakpointId(9),
        };
        assert_eq!(bp.set_message(), "Breakpoint 2 at /abs/path/app.py:10");
        assert_eq!(
            bp.hit_message(&state("/abs/path/app.py", "loop", 10, false)),
            "Breakpoint 2, loop () at /abs/path/app.py:10"
        );
        assert_eq!(bp.to_string(), "2: /abs/path/app.py:10");
    }

    #[test]
    fn test_empty_registry_listing() {
        assert_eq!(BreakpointRegistry::default().list_message(), "No breakpoints.");
    }
}
