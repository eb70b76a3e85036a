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


//! The debugging session.
//!
//! A [`Session`] owns the target together with everything that used to be
//! process-wide state in a debugger extension: the active flag, the user
//! breakpoints, the watch list and the per-stop caches. Every operation goes
//! through it.

use std::fmt::Display;

use revdb_common::{
    types::{Backtrace, BreakpointSpec, Frame, FrameId, InterpreterState, LocalList, StateField},
    HookKind, RevdbConfig, RuntimeSymbols,
};
use tracing::{debug, info, trace, warn};

use crate::{
    call::settle, confirm_hit, BreakpointId, BreakpointRegistry, Condition, Direction, EngineError,
    EngineResult, Evaluation, RuntimeChannel, Site, StateBridge, StopEvent, StopReason,
    SuspendedBreakpoints, Target, TargetError, WatchChange, WatchList,
};

/// Proof that a session was activated. Handing it back is the only way to
/// deactivate the session.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "the subscription is needed to deactivate the session"]
pub struct StopSubscription {
    id: u64,
}

impl StopSubscription {
    /// Identifier of the subscription.
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Default)]
struct StateCache {
    backtrace: Option<Backtrace>,
    locals: Option<LocalList>,
}

impl StateCache {
    fn clear(&mut self) {
        self.backtrace = None;
        self.locals = None;
    }
}

/// Messages collected across the resumes of one operation.
#[derive(Debug, Default)]
struct PendingReport {
    hits: Vec<String>,
    changes: Vec<WatchChange>,
}

/// What a navigation or continue operation ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    /// Direction of the last resume
    pub direction: Direction,
    /// Why the target stopped
    pub reason: StopReason,
    /// Messages of the navigation itself
    pub notes: Vec<String>,
    /// Confirmed user breakpoint hits, in the order they happened
    pub breakpoint_hits: Vec<String>,
    /// Watched values that changed
    pub watch_changes: Vec<WatchChange>,
    /// Innermost interpreter frame at the stop, if instrumentation is loaded
    pub location: Option<Frame>,
}

impl StopReport {
    /// Every message of the report, in display order.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = self.notes.clone();
        messages.extend(self.breakpoint_hits.iter().cloned());
        messages.extend(self.watch_changes.iter().map(ToString::to_string));
        if let Some(reason) = describe_reason(&self.reason, self.direction) {
            messages.push(reason);
        }
        match &self.location {
            Some(frame) => messages.push(frame.to_string().trim_start().to_string()),
            None => messages.push("No frame.".to_string()),
        }
        messages
    }

    /// Whether execution ran into an end of the recorded history.
    pub fn reached_end_of_history(&self) -> bool {
        self.reason == StopReason::EndOfHistory
    }
}

impl Display for StopReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.messages().join("\n"))
    }
}

fn describe_reason(reason: &StopReason, direction: Direction) -> Option<String> {
    match reason {
        StopReason::EndOfHistory => Some(match direction {
            Direction::Forward => "Reached the end of the recorded history.".to_string(),
            Direction::Reverse => "Reached the start of the recorded history.".to_string(),
        }),
        StopReason::Exited(code) => Some(format!("The program exited with code {code}.")),
        StopReason::Signal(name) => Some(format!("The program received signal {name}.")),
        StopReason::Breakpoint(_) | StopReason::Watchpoint(_) | StopReason::Interrupted => None,
    }
}

/// Source-level debugging session over a record/replay target.
#[derive(Debug)]
pub struct Session<T> {
    pub(crate) target: T,
    pub(crate) config: RevdbConfig,
    pub(crate) symbols: RuntimeSymbols,
    pub(crate) bridge: StateBridge,
    pub(crate) breakpoints: BreakpointRegistry,
    pub(crate) watches: WatchList,
    cache: StateCache,
    subscription: Option<u64>,
    subscriptions_issued: u64,
    pending: PendingReport,
}

impl<T: Target> Session<T> {
    /// Create an inactive session.
    pub fn new(target: T, config: RevdbConfig) -> Self {
        let symbols = RuntimeSymbols::new(config.runtime.symbol_prefix.clone());
        Self {
            target,
            bridge: StateBridge::new(symbols.clone()),
            symbols,
            config,
            breakpoints: BreakpointRegistry::default(),
            watches: WatchList::default(),
            cache: StateCache::default(),
            subscription: None,
            subscriptions_issued: 0,
            pending: PendingReport::default(),
        }
    }

    /// The target.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Mutable access to the target.
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Configuration in use.
    pub fn config(&self) -> &RevdbConfig {
        &self.config
    }

    /// Runtime symbol naming in use.
    pub fn symbols(&self) -> &RuntimeSymbols {
        &self.symbols
    }

    /// Whether source-level debugging is enabled.
    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Whether the runtime is loaded at the current position.
    pub fn instrumentation_present(&self) -> bool {
        self.bridge.instrumentation_present(&self.target)
    }

    /// Enable source-level debugging on a target that already carries the
    /// runtime in its recording.
    pub fn activate(&mut self) -> EngineResult<StopSubscription> {
        if self.subscription.is_some() {
            return Err(EngineError::AlreadyActive);
        }
        self.check_interpreter()?;

        self.subscriptions_issued += 1;
        let id = self.subscriptions_issued;
        self.subscription = Some(id);
        self.cache.clear();
        info!(subscription = id, "source-level debugging enabled");
        Ok(StopSubscription { id })
    }

    /// Disable source-level debugging: delete every user breakpoint and watch
    /// and drop the caches.
    pub fn deactivate(&mut self, subscription: StopSubscription) -> EngineResult<()> {
        if self.subscription != Some(subscription.id) {
            return Err(EngineError::SubscriptionMismatch(subscription.id));
        }
        self.breakpoints.remove_all(&mut self.target);
        self.watches.remove_all(&mut self.target);
        self.cache.clear();
        self.subscription = None;
        info!(subscription = subscription.id, "source-level debugging disabled");
        Ok(())
    }

    pub(crate) fn check_interpreter(&self) -> EngineResult<()> {
        let mode = self.target.execution_mode();
        if !mode.is_recording_or_replaying() {
            return Err(EngineError::BadExecutionMode(mode));
        }
        let is_interpreter = self
            .config
            .interpreter
            .entry_symbols
            .iter()
            .any(|symbol| self.target.lookup_symbol(symbol).is_some());
        if !is_interpreter {
            return Err(EngineError::NotInterpreter);
        }
        Ok(())
    }

    pub(crate) fn require_active(&self) -> EngineResult<()> {
        if self.subscription.is_none() {
            return Err(EngineError::Inactive);
        }
        Ok(())
    }

    pub(crate) fn require_instrumented(&self) -> EngineResult<()> {
        self.require_active()?;
        if !self.instrumentation_present() {
            return Err(EngineError::NotInstrumented);
        }
        Ok(())
    }

    /// Decoded state structure at the current position.
    pub fn state(&self) -> EngineResult<InterpreterState> {
        self.require_instrumented()?;
        self.bridge.read_state(&self.target)
    }

    pub(crate) fn current_frame(&self) -> EngineResult<FrameId> {
        self.require_instrumented()?;
        let raw = self.bridge.read_field(&self.target, StateField::CurrentFrame)?;
        FrameId::from_raw(raw).ok_or(EngineError::NoFrame)
    }

    /// Set a breakpoint and return the confirmation message.
    pub fn add_breakpoint(&mut self, spec: BreakpointSpec) -> EngineResult<String> {
        self.require_active()?;
        let line_hook = self.symbols.hook(HookKind::Line);
        let breakpoint = self.breakpoints.add(&mut self.target, &line_hook, spec)?;
        Ok(breakpoint.set_message())
    }

    /// Delete breakpoint `index` (0 deletes all) and return the outcome message.
    pub fn delete_breakpoint(&mut self, index: usize) -> EngineResult<String> {
        self.require_active()?;
        Ok(self.breakpoints.delete(&mut self.target, index))
    }

    /// The breakpoint listing.
    pub fn list_breakpoints(&self) -> String {
        self.breakpoints.list_message()
    }

    /// The user breakpoints.
    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.breakpoints
    }

    /// Backtrace at the current position, cached until the next stop.
    pub fn backtrace(&mut self) -> EngineResult<Backtrace> {
        self.require_instrumented()?;
        if let Some(backtrace) = &self.cache.backtrace {
            return Ok(backtrace.clone());
        }
        let channel = RuntimeChannel::new(&self.symbols, &self.config.interpreter);
        let backtrace = channel.backtrace(&mut self.target)?;
        self.cache.backtrace = Some(backtrace.clone());
        Ok(backtrace)
    }

    /// Locals of the current frame, cached until the next stop.
    pub fn locals(&mut self) -> EngineResult<LocalList> {
        self.require_instrumented()?;
        if let Some(locals) = &self.cache.locals {
            return Ok(locals.clone());
        }
        let channel = RuntimeChannel::new(&self.symbols, &self.config.interpreter);
        let locals = channel.locals(&mut self.target)?;
        self.cache.locals = Some(locals.clone());
        Ok(locals)
    }

    /// Evaluate an expression in the current frame.
    pub fn evaluate(&mut self, expr: &str) -> EngineResult<Evaluation> {
        self.require_instrumented()?;
        RuntimeChannel::new(&self.symbols, &self.config.interpreter).evaluate(&mut self.target, expr)
    }

    /// Resume honouring only user breakpoints and watches.
    pub fn continue_execution(&mut self, direction: Direction) -> EngineResult<StopReport> {
        self.require_active()?;
        self.begin_report();
        let event = self.resume(direction)?;
        self.complete(event, direction, Vec::new())
    }

    pub(crate) fn begin_report(&mut self) {
        self.pending = PendingReport::default();
    }

    /// Resume until a stop that matters to the user.
    ///
    /// User breakpoint hits are confirmed against the decoded state; a stop
    /// caused only by rejected hits resumes again. A stop caused only by
    /// watchpoints drains the watches and resumes again if no watched value
    /// changed.
    pub(crate) fn resume(&mut self, direction: Direction) -> EngineResult<StopEvent> {
        loop {
            debug!(%direction, "resuming");
            let event = self.target.resume(direction).map_err(|err| match err {
                TargetError::Interrupted => EngineError::Interrupted,
                other => other.into(),
            })?;
            self.on_stop(&event);
            if event.reason == StopReason::Interrupted {
                return Err(EngineError::Interrupted);
            }

            let user: Vec<BreakpointId> =
                event.breakpoints().iter().copied().filter(|id| self.breakpoints.owns(*id)).collect();
            let confirmed = self.confirm_user_hits(&user)?;
            if !user.is_empty() && confirmed == 0 && user.len() == event.breakpoints().len() {
                continue;
            }

            if let StopReason::Watchpoint(_) = event.reason {
                let changes = self.drain_watches();
                if changes.is_empty() {
                    debug!("watched values unchanged");
                    continue;
                }
                self.pending.changes.extend(changes);
            }
            return Ok(event);
        }
    }

    /// Stop handler. Runs right after every resume and never calls into the
    /// debuggee.
    fn on_stop(&mut self, event: &StopEvent) {
        trace!(reason = ?event.reason, "stopped");
        self.cache.clear();
        let fired = self.watches.mark_fired(event.watchpoints());
        if fired > 0 {
            trace!(fired, "watch mailboxes filled");
        }
    }

    fn confirm_user_hits(&mut self, user: &[BreakpointId]) -> EngineResult<usize> {
        if user.is_empty() {
            return Ok(0);
        }
        let state = self.bridge.read_state(&self.target)?;
        let mut confirmed = 0;
        for id in user {
            let Some(breakpoint) = self.breakpoints.by_native(*id) else { continue };
            if confirm_hit(breakpoint.spec(), &state) {
                self.pending.hits.push(breakpoint.hit_message(&state));
                confirmed += 1;
            } else {
                warn!(
                    index = breakpoint.index(),
                    position = %state.position(),
                    "rejected breakpoint hit on a hash collision"
                );
            }
        }
        Ok(confirmed)
    }

    /// Assemble the report of the operation that just stopped.
    pub(crate) fn complete(
        &mut self,
        event: StopEvent,
        direction: Direction,
        notes: Vec<String>,
    ) -> EngineResult<StopReport> {
        let mut watch_changes = std::mem::take(&mut self.pending.changes);
        watch_changes.extend(self.drain_watches());
        let breakpoint_hits = std::mem::take(&mut self.pending.hits);

        let location = if self.instrumentation_present() {
            match self.backtrace() {
                Ok(backtrace) => backtrace.innermost().cloned(),
                Err(err) => {
                    warn!(error = %err, "cannot read the current location");
                    None
                }
            }
        } else {
            None
        };

        Ok(StopReport {
            direction,
            reason: event.reason,
            notes,
            breakpoint_hits,
            watch_changes,
            location,
        })
    }

    /// Run `f` with every breakpoint and watchpoint disabled.
    pub(crate) fn with_suspended<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let suspended = SuspendedBreakpoints::suspend(&mut self.target)?;
        let result = f(self);
        let restored = suspended.restore(&mut self.target);
        settle(result, restored)
    }

    /// Place internal breakpoints, run `f`, then delete them on every path.
    ///
    /// Returns the result of `f` and, per placement, whether that breakpoint
    /// was hit.
    pub(crate) fn with_internal_breakpoints<R>(
        &mut self,
        placements: &[(HookKind, Condition)],
        f: impl FnOnce(&mut Self) -> EngineResult<R>,
    ) -> EngineResult<(R, Vec<bool>)> {
        let mut ids = Vec::with_capacity(placements.len());
        for (hook, condition) in placements {
            let site = Site::Symbol(self.symbols.hook(*hook));
            let condition = (!condition.clauses().is_empty()).then_some(condition);
            match self.target.insert_breakpoint(&site, condition) {
                Ok(id) => {
                    debug!(%site, %id, conditional = condition.is_some(), "placed internal breakpoint");
                    ids.push(id);
                }
                Err(err) => {
                    if let Err(remove_err) = self.remove_internal(&ids) {
                        warn!(error = %remove_err, "failed to remove internal breakpoints");
                    }
                    return Err(err.into());
                }
            }
        }

        let result = f(self);
        let hits: Result<Vec<bool>, TargetError> =
            ids.iter().map(|id| self.target.hit_count(*id).map(|count| count > 0)).collect();
        let removed = self.remove_internal(&ids);
        let value = settle(result, removed)?;
        Ok((value, hits?))
    }

    fn remove_internal(&mut self, ids: &[BreakpointId]) -> EngineResult<()> {
        let mut first_error = None;
        for id in ids {
            if let Err(err) = self.target.remove_breakpoint(*id) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), |err| Err(err.into()))
    }

    /// Drop everything derived from the current position after a jump that
    /// did not go through [`Session::resume`].
    pub(crate) fn invalidate(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn frame() -> Frame {
        Frame {
            frame_no: 0,
            func_name: "main".into(),
            file_name: PathBuf::from("/abs/path/app.py"),
            line: 10,
        }
    }

    #[test]
    fn test_report_messages_order() {
        let report = StopReport {
            direction: Direction::Forward,
            reason: StopReason::Breakpoint(vec![BreakpointId(1)]),
            notes: vec!["Hit exception of type ValueError".into()],
            breakpoint_hits: vec!["Breakpoint 1, main () at /abs/path/app.py:10".into()],
            watch_changes: vec![],
            location: Some(frame()),
        };
        let messages = report.messages();
        assert_eq!(messages[0], "Hit exception of type ValueError");
        assert_eq!(messages[1], "Breakpoint 1, main () at /abs/path/app.py:10");
        assert_eq!(messages.len(), 3);
        assert!(messages[2].starts_with("#0"));
    }

    #[test]
    fn test_report_end_of_history() {
        let report = StopReport {
            direction: Direction::Reverse,
            reason: StopReason::EndOfHistory,
            notes: vec![],
            breakpoint_hits: vec![],
            watch_changes: vec![],
            location: None,
        };
        assert!(report.reached_end_of_history());
        assert_eq!(report.to_string(), "Reached the start of the recorded history.\nNo frame.");
    }
}
