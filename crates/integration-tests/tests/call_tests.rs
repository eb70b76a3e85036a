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


//! Calling functions inside the debuggee through the injected trampoline

use revdb_common::InterpreterConfig;
use revdb_engine::{
    call_function, call_symbol, find_injection_site, with_injected_string, EngineError, Register,
    Target, TRAMPOLINE,
};
use revdb_integration_tests::{
    memory::{TEXT_BASE, TEXT_SIZE},
    program::ProgramBuilder,
    replay_target::ReplayTarget,
    test_utils::init,
};

fn target() -> ReplayTarget {
    let mut p = ProgramBuilder::new();
    p.call("main", "/abs/path/app.py", 1);
    p.line(1).ret();
    ReplayTarget::new(p.build())
}

#[test]
fn test_injection_site_skips_pseudo_mappings() {
    init::init_test_environment();
    let target = target();
    let site = find_injection_site(&target, TRAMPOLINE.len()).unwrap();
    assert_eq!(site, TEXT_BASE + TEXT_SIZE as u64 - TRAMPOLINE.len() as u64);
}

#[test]
fn test_injected_string_round_trip() {
    init::init_test_environment();
    let mut target = target();
    let functions = InterpreterConfig::default();
    let site = find_injection_site(&target, TRAMPOLINE.len()).unwrap();
    let registers = target.read_registers().unwrap();

    let seen = with_injected_string(&mut target, &functions, "hello", |target, ptr| {
        let bytes = target.read_memory(ptr, 6)?;
        Ok(bytes)
    })
    .unwrap();
    assert_eq!(seen, b"hello\0");

    assert_eq!(target.calls(), ["malloc", "free"]);
    assert_eq!(target.live_allocations(), 0);
    assert_eq!(target.read_registers().unwrap(), registers);
    assert_eq!(target.read_memory(site, TRAMPOLINE.len()).unwrap(), vec![0u8; TRAMPOLINE.len()]);
    assert_eq!(target.breakpoint_count(), 0);
}

#[test]
fn test_return_value_and_alignment() {
    init::init_test_environment();
    let mut target = target();
    let registers = target.read_registers().unwrap();
    // The stopped thread's stack is misaligned; the call realigns it.
    assert_ne!(registers[Register::Rsp] % 16, 0);

    let initialized = call_symbol(&mut target, "Py_IsInitialized", &[]).unwrap();
    assert_eq!(initialized, 1);
    assert_eq!(target.read_registers().unwrap(), registers);
}

#[test]
fn test_user_breakpoints_do_not_disturb_calls() {
    init::init_test_environment();
    let mut target = target();
    let id = target
        .insert_breakpoint(&revdb_engine::Site::Symbol("s_revdb_trace_line".into()), None)
        .unwrap();

    call_symbol(&mut target, "Py_IsInitialized", &[]).unwrap();
    assert_eq!(target.enabled_breakpoints(), vec![id]);
    assert_eq!(target.hit_count(id).unwrap(), 0);
}

#[test]
fn test_crash_is_a_failed_call() {
    init::init_test_environment();
    let mut target = target();
    target.fault_on("malloc");
    let registers = target.read_registers().unwrap();
    let malloc = target.lookup_symbol("malloc").unwrap();

    match call_symbol(&mut target, "malloc", &[16]) {
        Err(EngineError::CallFailed { function, hits }) => {
            assert_eq!(function, malloc);
            assert_eq!(hits, 0);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    // Everything is restored even though the call failed.
    assert_eq!(target.read_registers().unwrap(), registers);
    assert_eq!(target.breakpoint_count(), 0);
}

#[test]
fn test_unmapped_function_fails() {
    init::init_test_environment();
    let mut target = target();
    let err = call_function(&mut target, 0xdead_beef, &[]).unwrap_err();
    assert!(matches!(err, EngineError::CallFailed { function: 0xdead_beef, hits: 0 }));
}

#[test]
fn test_argument_limit() {
    init::init_test_environment();
    let mut target = target();
    let malloc = target.lookup_symbol("malloc").unwrap();
    let err = call_function(&mut target, malloc, &[0; 7]).unwrap_err();
    assert!(matches!(err, EngineError::TooManyArguments(7)));
    assert_eq!(err.to_string(), "Only 0-6 arguments are supported in debuggee calls, got 7");
    assert!(target.calls().is_empty());
}

#[test]
fn test_interrupted_call() {
    init::init_test_environment();
    let mut target = target();
    let registers = target.read_registers().unwrap();
    target.interrupt_next_resume();
    let err = call_symbol(&mut target, "Py_IsInitialized", &[]).unwrap_err();
    assert!(matches!(err, EngineError::Interrupted));
    assert_eq!(target.read_registers().unwrap(), registers);
}

#[test]
fn test_missing_symbol_and_interior_nul() {
    init::init_test_environment();
    let mut target = target().not_an_interpreter();
    assert!(matches!(
        call_symbol(&mut target, "Py_IsInitialized", &[]),
        Err(EngineError::SymbolNotFound(name)) if name == "Py_IsInitialized"
    ));

    let functions = InterpreterConfig::default();
    let err = with_injected_string(&mut target, &functions, "a\0b", |_, _| Ok(())).unwrap_err();
    assert!(matches!(err, EngineError::InteriorNul));
    assert!(target.calls().is_empty());
}
