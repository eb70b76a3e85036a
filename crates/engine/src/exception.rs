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


//! Exception search.

use revdb_common::HookKind;
use tracing::debug;

use crate::{Boundary, Condition, Direction, EngineResult, Session, StopReport, Target};

impl<T: Target> Session<T> {
    /// Run to the next (or previous) exception raised in the frame reporting
    /// it, optionally of exactly the named type.
    ///
    /// Propagation of an exception through outer frames does not count as a
    /// new exception. Subclasses are not matched.
    pub fn go_to_exception(
        &mut self,
        direction: Direction,
        type_filter: Option<&str>,
    ) -> EngineResult<StopReport> {
        self.require_active()?;
        self.begin_report();

        if !self.instrumentation_present() {
            debug!("instrumentation not loaded yet, going to the first line");
            self.go_to_first_line(Boundary::Start)?;
        }

        let placements = [(HookKind::Exception, Condition::raised_exception(type_filter))];
        let (event, hits) = self.with_suspended(|session| {
            session.with_internal_breakpoints(&placements, |session| session.resume(direction))
        })?;

        let mut notes = Vec::new();
        if hits[0] {
            let state = self.bridge.read_state(&self.target)?;
            let name = state.exception_type.as_deref().unwrap_or("<unknown>");
            debug!(exception = %name, position = %state.position(), "found exception");
            notes.push(format!("Hit exception of type {name}"));
        } else {
            debug!(filter = ?type_filter, "no matching exception");
            notes.push("No matching exception found.".to_string());
        }
        self.complete(event, direction, notes)
    }
}
