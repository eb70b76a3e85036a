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


//! Source-level navigation.
//!
//! Every operation is a small program of internal breakpoints on the runtime
//! hooks. The breakpoints are conditioned on the frame captured before the
//! operation starts and are deleted on every exit path.

use derive_more::Display;
use revdb_common::HookKind;
use tracing::debug;

use crate::{Boundary, Condition, Direction, EngineResult, Session, StopEvent, StopReport, Target};

/// A navigation command.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum NavigationRequest {
    /// Stop at the next line, entering calls
    #[display("step")]
    Step,
    /// Stop at the previous line, entering calls
    #[display("reverse-step")]
    ReverseStep,
    /// Stop at the next line of this frame, or right after it returns
    #[display("next")]
    Next,
    /// Stop at the previous line of this frame, or right before it was entered
    #[display("reverse-next")]
    ReverseNext,
    /// Run until this frame returns
    #[display("finish")]
    Finish,
    /// Run backward until this frame was entered
    #[display("reverse-finish")]
    ReverseFinish,
    /// First instrumented line of the recording
    #[display("go-to-start")]
    GoToStart,
    /// Last instrumented line of the recording
    #[display("go-to-end")]
    GoToEnd,
    /// Next exception raised, optionally of one type
    #[display("exception-next")]
    ExceptionNext(Option<String>),
    /// Previous exception raised, optionally of one type
    #[display("exception-prev")]
    ExceptionPrev(Option<String>),
    /// Run forward to a user breakpoint or watch change
    #[display("continue")]
    Continue,
    /// Run backward to a user breakpoint or watch change
    #[display("reverse-continue")]
    ReverseContinue,
}

fn boundary_hook(direction: Direction) -> HookKind {
    match direction {
        Direction::Forward => HookKind::Return,
        Direction::Reverse => HookKind::Call,
    }
}

impl<T: Target> Session<T> {
    /// Run a navigation command.
    pub fn navigate(&mut self, request: &NavigationRequest) -> EngineResult<StopReport> {
        debug!(%request, "navigating");
        match request {
            NavigationRequest::Step => self.step(Direction::Forward),
            NavigationRequest::ReverseStep => self.step(Direction::Reverse),
            NavigationRequest::Next => self.next(Direction::Forward),
            NavigationRequest::ReverseNext => self.next(Direction::Reverse),
            NavigationRequest::Finish => self.finish(Direction::Forward),
            NavigationRequest::ReverseFinish => self.finish(Direction::Reverse),
            NavigationRequest::GoToStart => self.go_to_start(),
            NavigationRequest::GoToEnd => self.go_to_end(),
            NavigationRequest::ExceptionNext(filter) => {
                self.go_to_exception(Direction::Forward, filter.as_deref())
            }
            NavigationRequest::ExceptionPrev(filter) => {
                self.go_to_exception(Direction::Reverse, filter.as_deref())
            }
            NavigationRequest::Continue => self.continue_execution(Direction::Forward),
            NavigationRequest::ReverseContinue => self.continue_execution(Direction::Reverse),
        }
    }

    /// Stop at the very next (or previous) line event, in any frame.
    pub fn step(&mut self, direction: Direction) -> EngineResult<StopReport> {
        self.require_instrumented()?;
        self.begin_report();
        let event = self.step_once(direction)?;
        self.complete(event, direction, Vec::new())
    }

    /// Stop at the next (or previous) line of the current frame, or on the
    /// line right after (before) the frame's boundary.
    pub fn next(&mut self, direction: Direction) -> EngineResult<StopReport> {
        self.require_instrumented()?;
        let frame = self.current_frame()?;
        self.begin_report();

        let placements = [
            (HookKind::Line, Condition::stay_in_frame(frame)),
            (boundary_hook(direction), Condition::stay_in_frame(frame)),
        ];
        let (event, hits) =
            self.with_internal_breakpoints(&placements, |session| session.resume(direction))?;

        // An in-frame line wins over the boundary.
        let event = if !hits[0] && hits[1] {
            debug!(%frame, "left the frame, stepping to the next line");
            self.step_once(direction)?
        } else {
            event
        };
        self.complete(event, direction, Vec::new())
    }

    /// Run until the current frame returns (or, backward, until it was
    /// entered) and stop on the first line past that boundary.
    pub fn finish(&mut self, direction: Direction) -> EngineResult<StopReport> {
        self.require_instrumented()?;
        let frame = self.current_frame()?;
        self.begin_report();

        let placements = [(boundary_hook(direction), Condition::stay_in_frame(frame))];
        let (event, hits) =
            self.with_internal_breakpoints(&placements, |session| session.resume(direction))?;

        let event = if hits[0] {
            debug!(%frame, "reached the frame boundary, stepping once");
            self.step_once(direction)?
        } else {
            event
        };
        self.complete(event, direction, Vec::new())
    }

    /// Jump to the start of the recording and run to the first line event.
    pub fn go_to_start(&mut self) -> EngineResult<StopReport> {
        self.require_active()?;
        self.begin_report();
        let event = self.go_to_first_line(Boundary::Start)?;
        self.complete(event, Direction::Forward, Vec::new())
    }

    /// Jump to the end of the recording and run backward to the last line event.
    pub fn go_to_end(&mut self) -> EngineResult<StopReport> {
        self.require_active()?;
        self.begin_report();
        let event = self.go_to_first_line(Boundary::End)?;
        self.complete(event, Direction::Reverse, Vec::new())
    }

    pub(crate) fn step_once(&mut self, direction: Direction) -> EngineResult<StopEvent> {
        let placements = [(HookKind::Line, Condition::always())];
        let (event, _) =
            self.with_internal_breakpoints(&placements, |session| session.resume(direction))?;
        Ok(event)
    }

    /// Jump to `boundary`, then run toward the other end until the first line
    /// event. User breakpoints and watches stay quiet throughout.
    pub(crate) fn go_to_first_line(&mut self, boundary: Boundary) -> EngineResult<StopEvent> {
        let direction = match boundary {
            Boundary::Start => Direction::Forward,
            Boundary::End => Direction::Reverse,
        };
        self.with_suspended(|session| {
            debug!(%boundary, "jumping to the boundary of the recording");
            session.target.go_to_boundary(boundary)?;
            session.invalidate();
            session.step_once(direction)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_hooks() {
        assert_eq!(boundary_hook(Direction::Forward), HookKind::Return);
        assert_eq!(boundary_hook(Direction::Reverse), HookKind::Call);
    }

    #[test]
    fn test_request_names() {
        assert_eq!(NavigationRequest::ReverseNext.to_string(), "reverse-next");
        assert_eq!(NavigationRequest::ExceptionNext(Some("KeyError".into())).to_string(), "exception-next");
    }
}
