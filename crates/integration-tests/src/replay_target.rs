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


//! An in-memory record/replay debuggee.
//!
//! [`ReplayTarget`] replays a [`Program`] forward and backward. It evaluates
//! breakpoint conditions against the state of every hook event, fires
//! hardware watchpoints on stores, and runs a small set of native functions
//! (libc, interpreter entry points and the runtime's interaction entry points)
//! when the program counter is pointed at a call trampoline.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use revdb_common::{
    types::{Backtrace, FrameId, Local, LocalList},
    DumpKind, HookKind, InterpreterConfig, RuntimeSymbols,
};
use revdb_engine::{
    parse_watch_expression, Address, Boundary, BreakpointId, ChainResponse, Condition, Direction,
    ExecutionMode, MemoryMap, Register, Registers, Site, StopEvent, StopReason, Target,
    TargetError, TargetResult, WatchStep, EVAL_ERROR_PREFIX, RETURN_OFFSET, TRAMPOLINE,
};
use tracing::{debug, trace};

use crate::{
    heap::{repr, walk},
    memory::{
        Memory, MALLOC_BASE, MALLOC_SIZE, NATIVE_BASE, STACK_BASE, STACK_SIZE, STATE_ADDR,
        TEXT_BASE, TEXT_ENTRY,
    },
    program::{Event, HookEvent, Program},
};

/// Debug registers available for hardware watchpoints.
pub const DEFAULT_WATCHPOINT_LIMIT: usize = 4;

/// Path of the runtime library the simulated interpreter can load.
pub const RUNTIME_LIBRARY: &str = "/opt/revdb/revdb_runtime.cpython-312-x86_64-linux-gnu.so";

const HOOK_BASE: Address = TEXT_BASE + 0x300;
const FIRST_FILE_HANDLE: u64 = 0x5000;
const CLOBBER: u64 = 0xdead_0000;

/// Functions the simulated process can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Native {
    /// libc `malloc`
    Malloc,
    /// libc `free`
    Free,
    /// libc `fopen`
    Fopen,
    /// Interpreter: run a script from a `FILE*`
    RunFile,
    /// Interpreter: acquire the interpreter lock
    LockEnsure,
    /// Interpreter: release the interpreter lock
    LockRelease,
    /// Interpreter: initialization check
    IsInitialized,
    /// Runtime: interaction entry point
    Interact(DumpKind),
}

impl Native {
    const ALL: [Self; 11] = [
        Self::Malloc,
        Self::Free,
        Self::Fopen,
        Self::RunFile,
        Self::LockEnsure,
        Self::LockRelease,
        Self::IsInitialized,
        Self::Interact(DumpKind::Backtrace),
        Self::Interact(DumpKind::Locals),
        Self::Interact(DumpKind::Eval),
        Self::Interact(DumpKind::WatchChain),
    ];

    fn address(self) -> Address {
        let index = Self::ALL.iter().position(|native| *native == self).unwrap_or_default();
        NATIVE_BASE + 0x10 * index as u64
    }

    fn from_address(addr: Address) -> Option<Self> {
        Self::ALL.iter().copied().find(|native| native.address() == addr)
    }

    fn is_runtime(self) -> bool {
        matches!(self, Self::Interact(_))
    }
}

#[derive(Debug, Clone)]
enum Placement {
    Site { site: Site, condition: Option<Condition> },
    Watch { addr: Address, len: u64 },
}

#[derive(Debug, Clone)]
struct NativeBreakpoint {
    placement: Placement,
    enabled: bool,
    hits: u64,
}

/// A simulated record/replay debugger attached to a simulated interpreter.
#[derive(Debug)]
pub struct ReplayTarget {
    program: Program,
    memory: Memory,
    registers: Registers,
    mode: ExecutionMode,
    symbols: RuntimeSymbols,
    functions: InterpreterConfig,
    runtime_library: PathBuf,
    interpreter: bool,
    initialized: bool,

    executed: usize,
    at_event: bool,
    undo: Vec<Option<(Address, Vec<u8>)>>,
    injected_at: Option<usize>,

    breakpoints: BTreeMap<BreakpointId, NativeBreakpoint>,
    next_breakpoint: u64,
    watchpoint_limit: usize,

    allocations: BTreeMap<Address, usize>,
    malloc_next: Address,
    open_files: HashMap<u64, PathBuf>,
    next_handle: u64,
    lock_depth: u64,
    calls: Vec<String>,
    faulting: HashSet<String>,
    interrupt_pending: bool,
    edit_budget: Option<usize>,
}

impl ReplayTarget {
    /// Replay `program` with default symbol names.
    pub fn new(program: Program) -> Self {
        let mut registers = Registers::default();
        for (i, reg) in Register::ALL.iter().enumerate() {
            registers[*reg] = 0x1111_0000 + i as u64;
        }
        // Mid-function: the stack is 8 bytes off 16-byte alignment.
        registers[Register::Rsp] = STACK_BASE + STACK_SIZE as u64 - 0x88;
        registers[Register::Rip] = TEXT_ENTRY;
        registers[Register::Eflags] = 0x246;

        Self {
            memory: program.memory.clone(),
            program,
            registers,
            mode: ExecutionMode::Replaying,
            symbols: RuntimeSymbols::default(),
            functions: InterpreterConfig::default(),
            runtime_library: PathBuf::from(RUNTIME_LIBRARY),
            interpreter: true,
            initialized: true,
            executed: 0,
            at_event: false,
            undo: Vec::new(),
            injected_at: None,
            breakpoints: BTreeMap::new(),
            next_breakpoint: 1,
            watchpoint_limit: DEFAULT_WATCHPOINT_LIMIT,
            allocations: BTreeMap::new(),
            malloc_next: MALLOC_BASE,
            open_files: HashMap::new(),
            next_handle: FIRST_FILE_HANDLE,
            lock_depth: 0,
            calls: Vec::new(),
            faulting: HashSet::new(),
            interrupt_pending: false,
            edit_budget: None,
        }
    }

    /// Use a different execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use a different runtime symbol prefix.
    pub fn with_symbol_prefix(mut self, prefix: &str) -> Self {
        self.symbols = RuntimeSymbols::new(prefix);
        self
    }

    /// Make the interpreter report that it is not initialized.
    pub fn uninitialized(mut self) -> Self {
        self.initialized = false;
        self
    }

    /// Drop every interpreter symbol: the process is some other program.
    pub fn not_an_interpreter(mut self) -> Self {
        self.interpreter = false;
        self
    }

    /// Number of hardware watchpoints available.
    pub fn with_watchpoint_limit(mut self, limit: usize) -> Self {
        self.watchpoint_limit = limit;
        self
    }

    /// Make calls to the named native function crash.
    pub fn fault_on(&mut self, symbol: &str) {
        self.faulting.insert(symbol.to_string());
    }

    /// Report the next resume as interrupted by the user.
    pub fn interrupt_next_resume(&mut self) {
        self.interrupt_pending = true;
    }

    /// Allow `count` more breakpoint edits (insert, remove, enable or
    /// disable). Every edit after that fails.
    pub fn fail_breakpoint_edits_after(&mut self, count: usize) {
        self.edit_budget = Some(count);
    }

    fn edit_breakpoints(&mut self) -> TargetResult<()> {
        match &mut self.edit_budget {
            Some(0) => Err(TargetError::Backend("breakpoint table unavailable".to_string())),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Names of the native functions called so far, in order.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Memory handed out by `malloc` and not freed yet.
    pub fn live_allocations(&self) -> usize {
        self.allocations.len()
    }

    /// Number of breakpoints and watchpoints that exist.
    pub fn breakpoint_count(&self) -> usize {
        self.breakpoints.len()
    }

    /// Number of hardware watchpoints that exist.
    pub fn watchpoint_count(&self) -> usize {
        self.breakpoints
            .values()
            .filter(|bp| matches!(bp.placement, Placement::Watch { .. }))
            .count()
    }

    /// How many events of the history have executed.
    pub fn position(&self) -> usize {
        self.executed
    }

    /// Whether the interpreter lock is held by a debuggee call.
    pub fn lock_held(&self) -> bool {
        self.lock_depth > 0
    }

    fn runtime_loaded_at(&self, position: usize) -> bool {
        self.injected_at.is_some_and(|at| position >= at)
            || self.program.events[..position.min(self.program.events.len())]
                .iter()
                .any(|event| matches!(event, Event::LoadRuntime))
    }

    fn runtime_loaded(&self) -> bool {
        self.runtime_loaded_at(self.executed)
    }

    fn native_symbol(&self, native: Native) -> String {
        match native {
            Native::Malloc => self.functions.malloc.clone(),
            Native::Free => self.functions.free.clone(),
            Native::Fopen => self.functions.fopen.clone(),
            Native::RunFile => self.functions.run_file.clone(),
            Native::LockEnsure => self.functions.lock_ensure.clone(),
            Native::LockRelease => self.functions.lock_release.clone(),
            Native::IsInitialized => self.functions.is_initialized.clone(),
            Native::Interact(kind) => self.symbols.dump(kind),
        }
    }

    fn native_available(&self, native: Native) -> bool {
        match native {
            Native::Malloc | Native::Free | Native::Fopen => true,
            _ if native.is_runtime() => self.runtime_loaded(),
            _ => self.interpreter,
        }
    }

    /// The last hook event that has executed with the runtime loaded.
    fn current_hook(&self) -> Option<&HookEvent> {
        (0..self.executed).rev().find_map(|index| match &self.program.events[index] {
            Event::Hook(hook) if self.runtime_loaded_at(index) => Some(hook),
            _ => None,
        })
    }

    fn allocate_id(&mut self, placement: Placement) -> BreakpointId {
        let id = BreakpointId(self.next_breakpoint);
        self.next_breakpoint += 1;
        self.breakpoints.insert(id, NativeBreakpoint { placement, enabled: true, hits: 0 });
        id
    }

    fn breakpoint_mut(&mut self, id: BreakpointId) -> TargetResult<&mut NativeBreakpoint> {
        self.breakpoints.get_mut(&id).ok_or(TargetError::UnknownBreakpoint(id))
    }

    /// Breakpoints triggered by event `index`, with their hit counts bumped.
    fn hook_hits(&mut self, index: usize) -> Vec<BreakpointId> {
        let Event::Hook(hook) = &self.program.events[index] else { return Vec::new() };
        if !self.runtime_loaded_at(index) {
            return Vec::new();
        }
        let hook_symbol = self.symbols.hook(hook.kind);
        let state = &hook.state;

        let mut hits = Vec::new();
        for (id, bp) in self.breakpoints.iter_mut() {
            let Placement::Site { site: Site::Symbol(name), condition } = &bp.placement else {
                continue;
            };
            if bp.enabled
                && *name == hook_symbol
                && condition.as_ref().is_none_or(|condition| condition.matches(state))
            {
                bp.hits += 1;
                hits.push(*id);
            }
        }
        hits
    }

    /// Watchpoints covering a store to `addr`, with their hit counts bumped.
    fn store_hits(&mut self, addr: Address) -> Vec<BreakpointId> {
        let mut hits = Vec::new();
        for (id, bp) in self.breakpoints.iter_mut() {
            let Placement::Watch { addr: watched, len } = bp.placement else { continue };
            if bp.enabled && addr < watched + len && watched < addr + 8 {
                bp.hits += 1;
                hits.push(*id);
            }
        }
        hits
    }

    fn apply(&mut self, index: usize) -> TargetResult<()> {
        let undo = match &self.program.events[index] {
            Event::Hook(hook) => {
                let image = hook.image.clone();
                let old = self.memory.read(STATE_ADDR, image.len())?;
                self.memory.write(STATE_ADDR, &image)?;
                Some((STATE_ADDR, old))
            }
            Event::Store { addr, value } => {
                let (addr, value) = (*addr, *value);
                let old = self.memory.read(addr, 8)?;
                self.memory.write_u64(addr, value)?;
                Some((addr, old))
            }
            Event::LoadRuntime => None,
        };
        self.undo.push(undo);
        self.executed += 1;
        Ok(())
    }

    fn unapply(&mut self) -> TargetResult<()> {
        if let Some(Some((addr, old))) = self.undo.pop() {
            self.memory.write(addr, &old)?;
        }
        self.executed -= 1;
        Ok(())
    }

    fn run_forward(&mut self) -> TargetResult<StopReason> {
        loop {
            if self.executed == self.program.events.len() {
                self.at_event = false;
                return Ok(StopReason::EndOfHistory);
            }
            let index = self.executed;
            self.apply(index)?;

            let hits = self.hook_hits(index);
            if !hits.is_empty() {
                self.at_event = true;
                return Ok(StopReason::Breakpoint(hits));
            }
            if let Event::Store { addr, .. } = self.program.events[index] {
                let hits = self.store_hits(addr);
                if !hits.is_empty() {
                    self.at_event = true;
                    return Ok(StopReason::Watchpoint(hits));
                }
            }
        }
    }

    fn run_reverse(&mut self) -> TargetResult<StopReason> {
        let mut leaving_stop = self.at_event;
        loop {
            if self.executed == 0 {
                self.at_event = false;
                return Ok(StopReason::EndOfHistory);
            }
            let index = self.executed - 1;
            if !leaving_stop {
                let hits = self.hook_hits(index);
                if !hits.is_empty() {
                    self.at_event = true;
                    return Ok(StopReason::Breakpoint(hits));
                }
            }

            self.unapply()?;
            let store = match self.program.events[index] {
                Event::Store { addr, .. } if !leaving_stop => Some(addr),
                _ => None,
            };
            if let Some(addr) = store {
                let hits = self.store_hits(addr);
                if !hits.is_empty() {
                    self.at_event = false;
                    return Ok(StopReason::Watchpoint(hits));
                }
            }
            leaving_stop = false;
        }
    }

    fn at_trampoline(&self) -> bool {
        let rip = self.registers[Register::Rip];
        self.memory.read(rip, TRAMPOLINE.len()).is_ok_and(|bytes| bytes == TRAMPOLINE)
    }

    /// Execute `call rax` at the program counter and stop on the return address.
    fn run_call(&mut self) -> TargetResult<StopReason> {
        let site = self.registers[Register::Rip];
        let function = self.registers[Register::Rax];
        let Some(native) = Native::from_address(function).filter(|n| self.native_available(*n))
        else {
            debug!(function = format_args!("{function:#x}"), "call to unmapped function");
            return Ok(StopReason::Signal("SIGSEGV".to_string()));
        };
        let name = self.native_symbol(native);
        self.calls.push(name.clone());

        if self.registers[Register::Rsp] % 16 != 0 {
            debug!(%name, "call with a misaligned stack");
            return Ok(StopReason::Signal("SIGSEGV".to_string()));
        }
        if self.faulting.contains(&name) {
            return Ok(StopReason::Signal("SIGSEGV".to_string()));
        }

        let args: Vec<u64> = Register::ARGUMENTS.iter().map(|reg| self.registers[*reg]).collect();
        let result = match self.invoke(native, &args) {
            Ok(value) => value,
            Err(message) => {
                debug!(%name, %message, "native function aborted");
                return Ok(StopReason::Signal("SIGABRT".to_string()));
            }
        };
        trace!(%name, ?args, result, "native call");

        for (i, reg) in [
            Register::Rcx,
            Register::Rdx,
            Register::Rsi,
            Register::Rdi,
            Register::R8,
            Register::R9,
            Register::R10,
            Register::R11,
        ]
        .into_iter()
        .enumerate()
        {
            self.registers[reg] = CLOBBER + i as u64;
        }
        self.registers[Register::Rax] = result;
        let return_address = site + RETURN_OFFSET;
        self.registers[Register::Rip] = return_address;

        let mut hits = Vec::new();
        for (id, bp) in self.breakpoints.iter_mut() {
            if let Placement::Site { site: Site::Address(addr), .. } = bp.placement {
                if bp.enabled && addr == return_address {
                    bp.hits += 1;
                    hits.push(*id);
                }
            }
        }
        if hits.is_empty() {
            return Ok(StopReason::Signal("SIGILL".to_string()));
        }
        Ok(StopReason::Breakpoint(hits))
    }

    fn invoke(&mut self, native: Native, args: &[u64]) -> Result<u64, String> {
        match native {
            Native::Malloc => {
                let size = args[0] as usize;
                let addr = self.malloc_next;
                let end = addr + size.max(1) as u64;
                if end > MALLOC_BASE + MALLOC_SIZE as u64 {
                    return Ok(0);
                }
                self.malloc_next = (end + 15) & !15;
                self.allocations.insert(addr, size);
                Ok(addr)
            }
            Native::Free => {
                if args[0] != 0 && self.allocations.remove(&args[0]).is_none() {
                    return Err(format!("free(): invalid pointer {:#x}", args[0]));
                }
                Ok(0)
            }
            Native::Fopen => {
                let path = self.c_string(args[0])?;
                let mode = self.c_string(args[1])?;
                if mode != "rb" || !Path::new(&path).is_file() {
                    return Ok(0);
                }
                let handle = self.next_handle;
                self.next_handle += 1;
                self.open_files.insert(handle, PathBuf::from(path));
                Ok(handle)
            }
            Native::RunFile => {
                let path = self.open_files.get(&args[0]).cloned().ok_or("bad FILE*")?;
                if args[2] != 0 {
                    self.open_files.remove(&args[0]);
                }
                if self.lock_depth == 0 {
                    return Err("interpreter lock not held".to_string());
                }
                let script = fs::read_to_string(&path).map_err(|e| e.to_string())?;
                Ok(self.run_startup_script(&script))
            }
            Native::LockEnsure => {
                self.lock_depth += 1;
                Ok(self.lock_depth)
            }
            Native::LockRelease => {
                if self.lock_depth == 0 || args[0] != self.lock_depth {
                    return Err("unbalanced interpreter lock release".to_string());
                }
                self.lock_depth -= 1;
                Ok(0)
            }
            Native::IsInitialized => Ok(u64::from(self.initialized)),
            Native::Interact(kind) => {
                let path = self.c_string(args[0])?;
                let content = match kind {
                    DumpKind::Backtrace => self.backtrace_json(),
                    DumpKind::Locals => self.locals_json()?,
                    DumpKind::Eval => {
                        let expr = self.c_string(args[1])?;
                        self.evaluate(&expr)?
                    }
                    DumpKind::WatchChain => {
                        let steps = self.c_string(args[1])?;
                        self.resolve_chain(&steps)?
                    }
                };
                fs::write(&path, content).map_err(|e| e.to_string())?;
                Ok(0)
            }
        }
    }

    /// What the generated startup script does when the interpreter runs it.
    fn run_startup_script(&mut self, script: &str) -> u64 {
        let library = self.runtime_library.to_string_lossy();
        let loads_library = script.contains(&format!("\"{library}\"")) && script.contains("module.start()");
        if !loads_library {
            debug!("startup script does not load the runtime");
            return u64::MAX;
        }
        self.injected_at = Some(self.executed);
        debug!(position = self.executed, "runtime injected");
        0
    }

    fn c_string(&self, addr: Address) -> Result<String, String> {
        self.memory.read_c_string(addr).map_err(|e| e.to_string())
    }

    fn current_frame_locals(&self) -> Option<(FrameId, &crate::program::FrameLocals)> {
        let frame = self.current_hook()?.state.current_frame?;
        self.program.frames.get(&frame).map(|locals| (frame, locals))
    }

    fn backtrace_json(&self) -> String {
        let backtrace = Backtrace {
            frames: self.current_hook().map(|hook| hook.stack.clone()).unwrap_or_default(),
        };
        serde_json::to_string(&backtrace).unwrap_or_else(|_| "[]".to_string())
    }

    fn locals_json(&self) -> Result<String, String> {
        let mut locals = LocalList::default();
        if let Some((_, frame)) = self.current_frame_locals() {
            for name in &frame.names {
                let Some(slot) = frame.slot(name) else { continue };
                let obj = self.memory.read_u64(slot).map_err(|e| e.to_string())?;
                if obj == 0 {
                    continue;
                }
                let value = repr(&self.memory, obj).map_err(|e| e.to_string())?;
                locals.locals.push(Local { name: name.clone(), value });
            }
        }
        serde_json::to_string(&locals).map_err(|e| e.to_string())
    }

    fn walk_steps(
        &self,
        steps: &[WatchStep],
    ) -> Result<Result<(Vec<revdb_engine::LinkAddresses>, Address), String>, String> {
        let Some((_, frame)) = self.current_frame_locals() else {
            return Ok(Err("RuntimeError: no frame is executing".to_string()));
        };
        walk(&self.memory, |name| frame.slot(name), steps).map_err(|e| e.to_string())
    }

    fn evaluate(&self, expr: &str) -> Result<String, String> {
        let steps = match parse_watch_expression(expr) {
            Ok(steps) => steps,
            Err(err) => return Ok(format!("{EVAL_ERROR_PREFIX} SyntaxError: {err}")),
        };
        Ok(match self.walk_steps(&steps)? {
            Ok((_, obj)) => repr(&self.memory, obj).map_err(|e| e.to_string())?,
            Err(message) => format!("{EVAL_ERROR_PREFIX} {message}"),
        })
    }

    fn resolve_chain(&self, steps_json: &str) -> Result<String, String> {
        let steps: Vec<WatchStep> = serde_json::from_str(steps_json).map_err(|e| e.to_string())?;
        let response = match self.walk_steps(&steps)? {
            Ok((links, _)) => ChainResponse { links, error: None },
            Err(message) => ChainResponse { links: Vec::new(), error: Some(message) },
        };
        serde_json::to_string(&response).map_err(|e| e.to_string())
    }
}

impl Target for ReplayTarget {
    fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    fn lookup_symbol(&self, name: &str) -> Option<Address> {
        if let Some(native) = Native::ALL.iter().copied().find(|n| self.native_symbol(*n) == name) {
            return self.native_available(native).then(|| native.address());
        }
        if self.interpreter && self.functions.entry_symbols.iter().any(|entry| entry == name) {
            return Some(TEXT_ENTRY);
        }
        if !self.runtime_loaded() {
            return None;
        }
        if name == self.symbols.state() {
            return Some(STATE_ADDR);
        }
        [HookKind::Line, HookKind::Call, HookKind::Return, HookKind::Exception]
            .into_iter()
            .enumerate()
            .find(|(_, kind)| self.symbols.hook(*kind) == name)
            .map(|(i, _)| HOOK_BASE + 0x10 * i as u64)
    }

    fn read_memory(&self, addr: Address, len: usize) -> TargetResult<Vec<u8>> {
        self.memory.read(addr, len)
    }

    fn write_memory(&mut self, addr: Address, data: &[u8]) -> TargetResult<()> {
        trace!(addr = format_args!("{addr:#x}"), len = data.len(), "write memory");
        self.memory.write(addr, data)
    }

    fn read_registers(&self) -> TargetResult<Registers> {
        Ok(self.registers)
    }

    fn write_registers(&mut self, registers: &Registers) -> TargetResult<()> {
        self.registers = *registers;
        Ok(())
    }

    fn memory_maps(&self) -> TargetResult<Vec<MemoryMap>> {
        Ok(self.memory.maps())
    }

    fn insert_breakpoint(
        &mut self,
        site: &Site,
        condition: Option<&Condition>,
    ) -> TargetResult<BreakpointId> {
        self.edit_breakpoints()?;
        let id = self.allocate_id(Placement::Site { site: site.clone(), condition: condition.cloned() });
        trace!(%id, %site, "breakpoint inserted");
        Ok(id)
    }

    fn insert_watchpoint(&mut self, addr: Address, len: u64) -> TargetResult<BreakpointId> {
        self.edit_breakpoints()?;
        if self.watchpoint_count() >= self.watchpoint_limit {
            return Err(TargetError::WatchpointUnavailable {
                addr,
                reason: "no debug register left".to_string(),
            });
        }
        let id = self.allocate_id(Placement::Watch { addr, len });
        trace!(%id, addr = format_args!("{addr:#x}"), len, "watchpoint inserted");
        Ok(id)
    }

    fn remove_breakpoint(&mut self, id: BreakpointId) -> TargetResult<()> {
        self.edit_breakpoints()?;
        self.breakpoints.remove(&id).map(|_| ()).ok_or(TargetError::UnknownBreakpoint(id))
    }

    fn set_breakpoint_enabled(&mut self, id: BreakpointId, enabled: bool) -> TargetResult<()> {
        self.edit_breakpoints()?;
        self.breakpoint_mut(id)?.enabled = enabled;
        Ok(())
    }

    fn enabled_breakpoints(&self) -> Vec<BreakpointId> {
        self.breakpoints.iter().filter(|(_, bp)| bp.enabled).map(|(id, _)| *id).collect()
    }

    fn hit_count(&self, id: BreakpointId) -> TargetResult<u64> {
        self.breakpoints.get(&id).map(|bp| bp.hits).ok_or(TargetError::UnknownBreakpoint(id))
    }

    fn resume(&mut self, direction: Direction) -> TargetResult<StopEvent> {
        if self.interrupt_pending {
            self.interrupt_pending = false;
            return Ok(StopEvent { reason: StopReason::Interrupted });
        }
        let reason = match direction {
            Direction::Forward if self.at_trampoline() => self.run_call()?,
            Direction::Forward => self.run_forward()?,
            Direction::Reverse => self.run_reverse()?,
        };
        trace!(%direction, position = self.executed, ?reason, "stopped");
        Ok(StopEvent { reason })
    }

    fn go_to_boundary(&mut self, boundary: Boundary) -> TargetResult<()> {
        match boundary {
            Boundary::Start => {
                while self.executed > 0 {
                    self.unapply()?;
                }
            }
            Boundary::End => {
                while self.executed < self.program.events.len() {
                    self.apply(self.executed)?;
                }
            }
        }
        self.at_event = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ProgramBuilder;
    use revdb_common::types::StateField;

    fn program() -> Program {
        let mut p = ProgramBuilder::new();
        p.load_runtime();
        p.call("<module>", "/abs/path/app.py", 1);
        p.line(1).line(2).line(3).ret();
        p.build()
    }

    #[test]
    fn test_runtime_symbols_appear_with_the_runtime() {
        let mut target = ReplayTarget::new(program());
        assert!(target.lookup_symbol("s_revdb").is_none());
        assert!(target.lookup_symbol("Py_BytesMain").is_some());
        target.go_to_boundary(Boundary::End).unwrap();
        assert_eq!(target.lookup_symbol("s_revdb"), Some(STATE_ADDR));
        assert!(target.lookup_symbol("s_revdb_trace_line").is_some());
        assert!(target.lookup_symbol("s_revdb_interact_eval").is_some());
    }

    #[test]
    fn test_conditional_breakpoint_forward_and_reverse() {
        let mut target = ReplayTarget::new(program());
        let condition = Condition::always().and(StateField::CurrentLine, 2);
        let id = target
            .insert_breakpoint(&Site::Symbol("s_revdb_trace_line".into()), Some(&condition))
            .unwrap();

        let stop = target.resume(Direction::Forward).unwrap();
        assert_eq!(stop.reason, StopReason::Breakpoint(vec![id]));
        assert_eq!(target.resume(Direction::Forward).unwrap().reason, StopReason::EndOfHistory);
        let stop = target.resume(Direction::Reverse).unwrap();
        assert_eq!(stop.reason, StopReason::Breakpoint(vec![id]));
        assert_eq!(target.hit_count(id).unwrap(), 2);
        assert_eq!(target.resume(Direction::Reverse).unwrap().reason, StopReason::EndOfHistory);
    }

    #[test]
    fn test_watchpoint_limit() {
        let mut target = ReplayTarget::new(program()).with_watchpoint_limit(2);
        let first = target.insert_watchpoint(0x1000_0000, 8).unwrap();
        target.insert_watchpoint(0x1000_0000, 8).unwrap();
        assert!(matches!(
            target.insert_watchpoint(0x1000_0010, 8),
            Err(TargetError::WatchpointUnavailable { .. })
        ));
        target.remove_breakpoint(first).unwrap();
        target.insert_watchpoint(0x1000_0010, 8).unwrap();
        assert_eq!(target.watchpoint_count(), 2);
    }
}
