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


//! Condition compiler.
//!
//! Navigation intents become conjunctions of `field == value` clauses over the
//! runtime state structure. Strings never appear in a condition: file names,
//! function names and exception types are compared through their
//! [`simple_hash`], which the runtime stores next to every string it exposes.

use std::fmt::Display;

use itertools::Itertools;
use revdb_common::{
    simple_hash,
    types::{ExceptionOrigin, FrameId, InterpreterState, StateField},
};
use serde::{Deserialize, Serialize};

/// A single `field == value` equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Clause {
    /// Field of the state structure
    pub field: StateField,
    /// Expected integer value (a hash for string fields' `_id` companions)
    pub value: u64,
}

impl Clause {
    /// Create a clause.
    pub fn new(field: StateField, value: u64) -> Self {
        Self { field, value }
    }
}

/// A conjunction of [`Clause`]s. The empty condition always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    /// Condition that always holds.
    pub fn always() -> Self {
        Self::default()
    }

    /// Add `field == value`.
    pub fn and(mut self, field: StateField, value: u64) -> Self {
        self.clauses.push(Clause::new(field, value));
        self
    }

    /// The clauses, in the order they were added.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Hook events that happen in `frame`.
    pub fn stay_in_frame(frame: FrameId) -> Self {
        Self::always().and(StateField::CurrentFrame, frame.0)
    }

    /// Exceptions raised in the frame reporting them, optionally of one exact type.
    pub fn raised_exception(type_filter: Option<&str>) -> Self {
        let condition = Self::always().and(StateField::ExceptionOrigin, ExceptionOrigin::RaisedHere.raw());
        match type_filter {
            Some(name) => condition.and(StateField::ExceptionTypeId, simple_hash(name)),
            None => condition,
        }
    }

    /// A given line of a given file.
    pub fn file_line(file: &str, line: u64) -> Self {
        Self::always()
            .and(StateField::CurrentLine, line)
            .and(StateField::CurrentFileId, simple_hash(file))
    }

    /// The first line executed by a call to the named function.
    pub fn function_entry(name: &str) -> Self {
        Self::always().and(StateField::CurrentFuncId, simple_hash(name)).and(StateField::FirstLine, 1)
    }

    /// Evaluate against field values supplied by `read`. A field that cannot be
    /// read fails the condition.
    pub fn evaluate_with(&self, mut read: impl FnMut(StateField) -> Option<u64>) -> bool {
        self.clauses.iter().all(|clause| read(clause.field) == Some(clause.value))
    }

    /// Evaluate against a decoded state snapshot.
    pub fn matches(&self, state: &InterpreterState) -> bool {
        self.evaluate_with(|field| state.field_value(field))
    }

    /// Render the condition for a native condition evaluator, reading the
    /// fields of the structure named `state_symbol`.
    pub fn render(&self, state_symbol: &str) -> String {
        if self.clauses.is_empty() {
            return "1".to_string();
        }
        self.clauses
            .iter()
            .map(|clause| format!("{state_symbol}.{} == {}", clause.field, clause.value))
            .join(" && ")
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render("state"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at(file: &str, func: &str, line: u64) -> InterpreterState {
        InterpreterState {
            current_frame: Some(FrameId(0x7f00)),
            current_file: file.to_string(),
            current_file_id: simple_hash(file),
            current_func: func.to_string(),
            current_func_id: simple_hash(func),
            current_line: line,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_condition_always_holds() {
        assert!(Condition::always().matches(&InterpreterState::default()));
        assert_eq!(Condition::always().render("s_revdb"), "1");
    }

    #[test]
    fn test_file_line_render() {
        let condition = Condition::file_line("/abs/path/app.py", 10);
        assert_eq!(
            condition.render("s_revdb"),
            format!(
                "s_revdb.current_line == 10 && s_revdb.current_file_id == {}",
                simple_hash("/abs/path/app.py")
            )
        );
    }

    #[test]
    fn test_file_line_matches() {
        let condition = Condition::file_line("/abs/path/app.py", 10);
        assert!(condition.matches(&state_at("/abs/path/app.py", "main", 10)));
        assert!(!condition.matches(&state_at("/abs/path/app.py", "main", 11)));
        assert!(!condition.matches(&state_at("/abs/path/other.py", "main", 10)));
    }

    #[test]
    fn test_function_entry_requires_first_line() {
        let condition = Condition::function_entry("main");
        let mut state = state_at("/abs/path/app.py", "main", 3);
        assert!(!condition.matches(&state));
        state.first_line = true;
        assert!(condition.matches(&state));
    }

    #[test]
    fn test_frame_conditions() {
        let frame = FrameId(0x7f00);
        let state = state_at("/a.py", "f", 1);
        assert!(Condition::stay_in_frame(frame).matches(&state));
        assert!(!Condition::stay_in_frame(FrameId(0x1)).matches(&state));
    }

    #[test]
    fn test_raised_exception_filter() {
        let mut state = state_at("/a.py", "f", 4);
        state.exception_type = Some("KeyError".to_string());
        state.exception_type_id = simple_hash("KeyError");
        state.exception_origin = ExceptionOrigin::RaisedHere;

        assert!(Condition::raised_exception(None).matches(&state));
        assert!(Condition::raised_exception(Some("KeyError")).matches(&state));
        assert!(!Condition::raised_exception(Some("ValueError")).matches(&state));

        state.exception_origin = ExceptionOrigin::Propagated;
        assert!(!Condition::raised_exception(Some("KeyError")).matches(&state));
    }

    #[test]
    fn test_unreadable_field_fails() {
        let condition = Condition::always().and(StateField::CurrentLine, 3);
        assert!(!condition.evaluate_with(|_| None));
        assert!(condition.evaluate_with(|_| Some(3)));
    }
}
