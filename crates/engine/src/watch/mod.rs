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


//! Watch expressions.
//!
//! A watch tracks a value reached from a local through a chain of
//! name/attribute/subscript steps. Every link of the chain is covered by
//! hardware watchpoints. A firing watchpoint only fills the watch's one-slot
//! mailbox; the value is re-evaluated and the chain re-resolved later, once
//! the stop has been fully handled.

mod chain;
mod parser;

pub use chain::*;
pub use parser::*;

use std::fmt::Display;

use tracing::{debug, warn};

use crate::{BreakpointId, EngineError, EngineResult, RuntimeChannel, Session, Target};

/// A watched expression.
#[derive(Debug, Clone)]
pub struct Watch {
    index: usize,
    expr: String,
    steps: Vec<WatchStep>,
    chain: WatchChain,
    value: Option<String>,
    pending: bool,
    armed: Vec<BreakpointId>,
}

impl Watch {
    /// User-visible number.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The expression as entered.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Parsed steps.
    pub fn steps(&self) -> &[WatchStep] {
        &self.steps
    }

    /// The most recently resolved chain.
    pub fn chain(&self) -> &WatchChain {
        &self.chain
    }

    /// Last known textual value.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Whether a watchpoint fired and the watch has not been drained yet.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Hardware watchpoints currently armed for this watch.
    pub fn armed(&self) -> &[BreakpointId] {
        &self.armed
    }
}

impl Display for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}: {} = {}", self.index, self.expr, self.value.as_deref().unwrap_or("<unavailable>"))
    }
}

/// A change of a watched value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchChange {
    /// Watch number
    pub index: usize,
    /// Watched expression
    pub expr: String,
    /// Value before the change, if it was known
    pub old: Option<String>,
    /// Value after the change
    pub new: String,
}

impl Display for WatchChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Watchpoint {}: {}\n  Old value: {}\n  New value: {}",
            self.index,
            self.expr,
            self.old.as_deref().unwrap_or("<unavailable>"),
            self.new
        )
    }
}

/// The watches of a session.
#[derive(Debug, Clone)]
pub struct WatchList {
    next_index: usize,
    watches: Vec<Watch>,
}

impl Default for WatchList {
    fn default() -> Self {
        Self { next_index: 1, watches: Vec::new() }
    }
}

impl WatchList {
    /// Every watch, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Watch> {
        self.watches.iter()
    }

    /// Number of watches.
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    /// Whether there is no watch.
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Look a watch up by number.
    pub fn get(&self, index: usize) -> Option<&Watch> {
        self.watches.iter().find(|watch| watch.index == index)
    }

    /// Whether any mailbox is full.
    pub fn has_pending(&self) -> bool {
        self.watches.iter().any(|watch| watch.pending)
    }

    /// Fill the mailbox of every watch owning one of the fired watchpoints.
    /// Returns how many mailboxes were filled.
    pub(crate) fn mark_fired(&mut self, fired: &[BreakpointId]) -> usize {
        let mut count = 0;
        for watch in &mut self.watches {
            if watch.armed.iter().any(|id| fired.contains(id)) {
                watch.pending = true;
                count += 1;
            }
        }
        count
    }

    pub(crate) fn remove_all<T: Target>(&mut self, target: &mut T) {
        for mut watch in self.watches.drain(..) {
            disarm(target, &mut watch);
        }
    }
}

fn arm<T: Target>(target: &mut T, width: u64, watch: &mut Watch) {
    for addr in watch.chain.watched_addresses() {
        match target.insert_watchpoint(addr, width) {
            Ok(id) => watch.armed.push(id),
            Err(err) => {
                warn!(index = watch.index, addr = format_args!("{addr:#x}"), error = %err, "skipping watch address")
            }
        }
    }
    debug!(index = watch.index, armed = watch.armed.len(), "armed watch");
}

fn disarm<T: Target>(target: &mut T, watch: &mut Watch) {
    for id in watch.armed.drain(..) {
        if let Err(err) = target.remove_breakpoint(id) {
            debug!(index = watch.index, %id, error = %err, "watchpoint already gone");
        }
    }
}

impl<T: Target> Session<T> {
    /// Watch an expression and return the confirmation message.
    pub fn add_watch(&mut self, expr: &str) -> EngineResult<String> {
        self.require_instrumented()?;
        let steps = parse_watch_expression(expr)?;

        let channel = RuntimeChannel::new(&self.symbols, &self.config.interpreter);
        let chain = channel.resolve_chain(&mut self.target, &steps)?;
        let value = channel.evaluate(&mut self.target, expr)?.value().map(str::to_string);

        let index = self.watches.next_index;
        self.watches.next_index += 1;
        let mut watch = Watch {
            index,
            expr: expr.trim().to_string(),
            steps,
            chain,
            value,
            pending: false,
            armed: Vec::new(),
        };
        arm(&mut self.target, self.config.watch.width, &mut watch);

        let message = format!("Watchpoint {index}: {}", watch.expr);
        self.watches.watches.push(watch);
        Ok(message)
    }

    /// Remove watch `index`, or every watch when `index` is 0.
    pub fn remove_watch(&mut self, index: usize) -> EngineResult<String> {
        self.require_active()?;
        if index == 0 {
            if self.watches.is_empty() {
                return Ok("No watchpoints.".to_string());
            }
            let count = self.watches.len();
            self.watches.remove_all(&mut self.target);
            return Ok(format!("Deleted {count} watchpoints."));
        }

        let position = self
            .watches
            .watches
            .iter()
            .position(|watch| watch.index == index)
            .ok_or(EngineError::NoSuchWatch(index))?;
        let mut watch = self.watches.watches.remove(position);
        disarm(&mut self.target, &mut watch);
        Ok(format!("Deleted watchpoint {index}."))
    }

    /// The watch listing.
    pub fn list_watches(&self) -> String {
        if self.watches.is_empty() {
            return "No watchpoints.".to_string();
        }
        self.watches.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
    }

    /// The watches of this session.
    pub fn watches(&self) -> &WatchList {
        &self.watches
    }

    /// Empty every full mailbox: evaluate the expression again, resolve and
    /// arm its chain again, and report the watches whose textual value
    /// changed. A watch that cannot be evaluated keeps its previous value and
    /// is no longer pending. Never runs inside the stop handler.
    pub(crate) fn drain_watches(&mut self) -> Vec<WatchChange> {
        if !self.watches.has_pending() {
            return Vec::new();
        }
        let channel = RuntimeChannel::new(&self.symbols, &self.config.interpreter);
        let width = self.config.watch.width;

        let mut changes = Vec::new();
        for watch in self.watches.watches.iter_mut().filter(|watch| watch.pending) {
            watch.pending = false;
            let current = match channel.evaluate(&mut self.target, &watch.expr) {
                Ok(current) => current,
                Err(err) => {
                    warn!(index = watch.index, error = %err, "failed to re-evaluate watch");
                    continue;
                }
            };

            match channel.resolve_chain(&mut self.target, &watch.steps) {
                Ok(chain) => {
                    disarm(&mut self.target, watch);
                    watch.chain = chain;
                    arm(&mut self.target, width, watch);
                }
                Err(err) => debug!(index = watch.index, error = %err, "keeping the previous chain"),
            }

            let Some(new) = current.value() else { continue };
            if watch.value.as_deref() != Some(new) {
                changes.push(WatchChange {
                    index: watch.index,
                    expr: watch.expr.clone(),
                    old: watch.value.replace(new.to_string()),
                    new: new.to_string(),
                });
            }
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watch(index: usize, armed: Vec<BreakpointId>) -> Watch {
        Watch {
            index,
            expr: "a.b[0]".into(),
            steps: parse_watch_expression("a.b[0]").unwrap(),
            chain: WatchChain::default(),
            value: Some("1".into()),
            pending: false,
            armed,
        }
    }

    #[test]
    fn test_mailbox_fills_only_owners() {
        let mut list = WatchList::default();
        list.watches.push(watch(1, vec![BreakpointId(3), BreakpointId(4)]));
        list.watches.push(watch(2, vec![BreakpointId(5)]));

        assert_eq!(list.mark_fired(&[BreakpointId(4)]), 1);
        assert!(list.get(1).unwrap().is_pending());
        assert!(!list.get(2).unwrap().is_pending());
        assert!(list.has_pending());
        assert_eq!(list.mark_fired(&[]), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(watch(1, vec![]).to_string(), "  1: a.b[0] = 1");
        let change = WatchChange { index: 1, expr: "a.b[0]".into(), old: Some("1".into()), new: "2".into() };
        assert_eq!(change.to_string(), "Watchpoint 1: a.b[0]\n  Old value: 1\n  New value: 2");
    }
}
