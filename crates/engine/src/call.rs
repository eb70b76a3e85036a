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


//! Synchronous calls into the debuggee.
//!
//! A call writes a tiny trampoline (`call rax; nop`) into the zero-filled tail
//! of an executable mapping, loads the argument registers, points the program
//! counter at the trampoline and resumes until a breakpoint placed on the
//! `nop` (the return address) is hit. Memory, registers and the enabled state
//! of every breakpoint are restored on all exit paths.
//!
//! While recording, the call itself becomes part of the recorded history.

use revdb_common::InterpreterConfig;
use tracing::{debug, trace, warn};

use crate::{
    Address, BreakpointId, Direction, EngineError, EngineResult, Register, Registers, Site,
    StopReason, Target,
};

/// `call rax` followed by a `nop` that receives the breakpoint on return.
pub const TRAMPOLINE: [u8; 3] = [0xff, 0xd0, 0x90];

/// Offset of the return address (the `nop`) inside [`TRAMPOLINE`].
pub const RETURN_OFFSET: u64 = 2;

/// Size of the System V red zone below the stack pointer.
const RED_ZONE: u64 = 128;

/// Combine the outcome of an operation with the outcome of its cleanup. The
/// operation's error wins; a cleanup error only surfaces when the operation
/// itself succeeded.
pub(crate) fn settle<R>(result: EngineResult<R>, cleanup: EngineResult<()>) -> EngineResult<R> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(cleanup_err)) => {
            warn!(error = %cleanup_err, "cleanup failed after an earlier error");
            Err(err)
        }
    }
}

/// Breakpoints and watchpoints disabled for the duration of an operation.
#[derive(Debug)]
#[must_use = "suspended breakpoints must be restored"]
pub struct SuspendedBreakpoints {
    ids: Vec<BreakpointId>,
}

impl SuspendedBreakpoints {
    /// Disable everything that is currently enabled.
    pub fn suspend<T: Target>(target: &mut T) -> EngineResult<Self> {
        let mut suspended = Self { ids: Vec::new() };
        for id in target.enabled_breakpoints() {
            if let Err(err) = target.set_breakpoint_enabled(id, false) {
                if let Err(restore_err) = suspended.restore(target) {
                    warn!(error = %restore_err, "failed to restore breakpoints after a failed suspend");
                }
                return Err(err.into());
            }
            suspended.ids.push(id);
        }
        trace!(count = suspended.ids.len(), "suspended breakpoints");
        Ok(suspended)
    }

    /// Re-enable what [`SuspendedBreakpoints::suspend`] disabled. Every id is
    /// attempted; the first failure is reported.
    pub fn restore<T: Target>(self, target: &mut T) -> EngineResult<()> {
        let mut first_error = None;
        for id in self.ids {
            if let Err(err) = target.set_breakpoint_enabled(id, true) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), |err| Err(err.into()))
    }
}

/// Run `f` with every breakpoint and watchpoint disabled.
pub fn with_breakpoints_suspended<T: Target, R>(
    target: &mut T,
    f: impl FnOnce(&mut T) -> EngineResult<R>,
) -> EngineResult<R> {
    let suspended = SuspendedBreakpoints::suspend(target)?;
    let result = f(target);
    let restored = suspended.restore(target);
    settle(result, restored)
}

/// Run `f` and restore every general purpose register afterwards.
pub fn with_saved_registers<T: Target, R>(
    target: &mut T,
    f: impl FnOnce(&mut T, &Registers) -> EngineResult<R>,
) -> EngineResult<R> {
    let saved = target.read_registers()?;
    let result = f(target, &saved);
    trace!(rip = saved[Register::Rip], "restoring registers");
    let restored = target.write_registers(&saved).map_err(EngineError::from);
    settle(result, restored)
}

/// Run `f` with `data` written at `addr`, restoring the original bytes afterwards.
pub fn with_temporary_memory<T: Target, R>(
    target: &mut T,
    addr: Address,
    data: &[u8],
    f: impl FnOnce(&mut T) -> EngineResult<R>,
) -> EngineResult<R> {
    let original = target.read_memory(addr, data.len())?;
    target.write_memory(addr, data)?;
    let result = f(target);
    let restored = target.write_memory(addr, &original).map_err(EngineError::from);
    settle(result, restored)
}

/// Find `len` unused bytes of executable memory.
///
/// Looks at the tail of every executable, file-backed mapping and returns the
/// first one that is entirely zero.
pub fn find_injection_site<T: Target>(target: &T, len: usize) -> EngineResult<Address> {
    for map in target.memory_maps()? {
        if !map.executable || map.is_pseudo() || map.len() < len as u64 {
            continue;
        }
        let candidate = map.end - len as u64;
        match target.read_memory(candidate, len) {
            Ok(bytes) if bytes.iter().all(|b| *b == 0) => {
                trace!(addr = candidate, path = %map.path, "found injection site");
                return Ok(candidate);
            }
            Ok(_) => {}
            Err(err) => debug!(path = %map.path, error = %err, "cannot read mapping tail"),
        }
    }
    Err(EngineError::NoInjectionSpace(len))
}

/// Call the function at `function` with up to six integer arguments and
/// return the value left in `rax`.
///
/// The trampoline's return breakpoint must be hit exactly once; anything else
/// means the debuggee did not run the call as a single unit and the call
/// fails with [`EngineError::CallFailed`].
pub fn call_function<T: Target>(
    target: &mut T,
    function: Address,
    args: &[u64],
) -> EngineResult<u64> {
    if args.len() > Register::ARGUMENTS.len() {
        return Err(EngineError::TooManyArguments(args.len()));
    }
    debug!(function = format_args!("{function:#x}"), ?args, "calling into the debuggee");

    let site = find_injection_site(target, TRAMPOLINE.len())?;
    with_temporary_memory(target, site, &TRAMPOLINE, |target| {
        with_saved_registers(target, |target, saved| {
            with_breakpoints_suspended(target, |target| {
                let mut regs = *saved;
                for (reg, arg) in Register::ARGUMENTS.iter().zip(args) {
                    regs[*reg] = *arg;
                }
                regs[Register::Rax] = function;
                regs[Register::Rsp] = saved[Register::Rsp].wrapping_sub(RED_ZONE) & !0xf;
                regs[Register::Rip] = site;
                target.write_registers(&regs)?;

                let bp = target.insert_breakpoint(&Site::Address(site + RETURN_OFFSET), None)?;
                let outcome = run_to_return(target, function, bp);
                let removed = target.remove_breakpoint(bp).map_err(EngineError::from);
                settle(outcome, removed)
            })
        })
    })
}

fn run_to_return<T: Target>(
    target: &mut T,
    function: Address,
    bp: BreakpointId,
) -> EngineResult<u64> {
    let event = target.resume(Direction::Forward)?;
    if event.reason == StopReason::Interrupted {
        return Err(EngineError::Interrupted);
    }
    let hits = target.hit_count(bp)?;
    if hits != 1 {
        return Err(EngineError::CallFailed { function, hits });
    }
    let value = target.read_registers()?[Register::RETURN_VALUE];
    trace!(function = format_args!("{function:#x}"), value, "debuggee call returned");
    Ok(value)
}

/// Call a function by symbol name.
pub fn call_symbol<T: Target>(target: &mut T, name: &str, args: &[u64]) -> EngineResult<u64> {
    let function =
        target.lookup_symbol(name).ok_or_else(|| EngineError::SymbolNotFound(name.to_string()))?;
    call_function(target, function, args)
}

/// Copy `data` into freshly allocated debuggee memory as a NUL-terminated
/// string, run `f` with its address, then free it.
pub fn with_injected_string<T: Target, R>(
    target: &mut T,
    functions: &InterpreterConfig,
    data: &str,
    f: impl FnOnce(&mut T, Address) -> EngineResult<R>,
) -> EngineResult<R> {
    if data.as_bytes().contains(&0) {
        return Err(EngineError::InteriorNul);
    }
    trace!(?data, "injecting string");

    let mut bytes = data.as_bytes().to_vec();
    bytes.push(0);
    let ptr = call_symbol(target, &functions.malloc, &[bytes.len() as u64])?;
    if ptr == 0 {
        return Err(EngineError::Other(eyre::eyre!("malloc({}) returned NULL", bytes.len())));
    }

    let result =
        target.write_memory(ptr, &bytes).map_err(EngineError::from).and_then(|_| f(target, ptr));
    let freed = call_symbol(target, &functions.free, &[ptr]).map(|_| ());
    settle(result, freed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trampoline_shape() {
        // call rax
        assert_eq!(&TRAMPOLINE[..2], &[0xff, 0xd0]);
        // the return address lands on the nop
        assert_eq!(TRAMPOLINE[RETURN_OFFSET as usize], 0x90);
    }

    #[test]
    fn test_settle_prefers_operation_error() {
        let ok: EngineResult<u8> = settle(Ok(1), Ok(()));
        assert_eq!(ok.unwrap(), 1);

        let cleanup_failed = settle(Ok(1), Err(EngineError::Interrupted));
        assert!(matches!(cleanup_failed, Err(EngineError::Interrupted)));

        let both: EngineResult<u8> =
            settle(Err(EngineError::NoFrame), Err(EngineError::Interrupted));
        assert!(matches!(both, Err(EngineError::NoFrame)));
    }
}
