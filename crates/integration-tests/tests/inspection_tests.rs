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


//! Inspecting the interpreter at a stop: state, backtrace, locals and evaluation

use revdb_common::types::{ExceptionOrigin, FrameId, StateField};
use revdb_engine::{Direction, EngineError, Evaluation, Target, TargetError};
use revdb_integration_tests::{
    memory::{DATA_BASE, DATA_SIZE, STATE_ADDR},
    program::{Program, ProgramBuilder},
    test_utils::{init, session::active_session},
};

const APP: &str = "/abs/path/app.py";
const LIB: &str = "/abs/path/lib.py";

fn program() -> (Program, FrameId) {
    let mut p = ProgramBuilder::new();
    let count = p.int(3);
    let greeting = p.str("hi");
    let items = p.list(&[count, greeting]);
    let config = p.dict(&[("mode", greeting)]);

    p.load_runtime();
    p.call("main", APP, 1);
    p.line(1).bind("count", count).bind("greeting", greeting);
    p.line(2).bind("items", items).bind("config", config);
    let helper = p.call("helper", LIB, 7);
    p.line(8).raise("ValueError").ret();
    p.line(3).ret();
    (p.build(), helper)
}

#[test]
fn test_state_at_a_line() {
    init::init_test_environment();
    let (program, helper) = program();
    let (mut session, _subscription) = active_session(program);
    session.go_to_start().unwrap();
    session.next(Direction::Forward).unwrap();
    session.step(Direction::Forward).unwrap();

    let state = session.state().unwrap();
    assert_eq!(state.current_frame, Some(helper));
    assert_eq!(state.current_func, "helper");
    assert_eq!(state.current_file, LIB);
    assert_eq!(state.current_line, 8);
    assert!(state.first_line);
    assert_eq!(state.exception_type, None);
    assert_eq!(state.to_string(), format!("helper () at {LIB}:8"));

    session.go_to_exception(Direction::Forward, None).unwrap();
    let state = session.state().unwrap();
    assert_eq!(state.exception_type.as_deref(), Some("ValueError"));
    assert_eq!(state.exception_origin, ExceptionOrigin::RaisedHere);
}

#[test]
fn test_state_string_at_the_end_of_its_mapping() {
    init::init_test_environment();
    let (program, _) = program();
    let (mut session, _subscription) = active_session(program);
    session.go_to_start().unwrap();

    let tail = DATA_BASE + DATA_SIZE as u64 - 8;
    let func_slot = STATE_ADDR + StateField::CurrentFunc.offset();
    session.target_mut().write_memory(tail, b"tailfn\0").unwrap();
    session.target_mut().write_memory(func_slot, &tail.to_le_bytes()).unwrap();

    let state = session.state().unwrap();
    assert_eq!(state.current_func, "tailfn");
    assert_eq!(state.current_file, APP);

    // Without a terminator the string runs off the mapping.
    session.target_mut().write_memory(tail, b"tailfunc").unwrap();
    assert!(matches!(
        session.state(),
        Err(EngineError::Target(TargetError::Memory { .. }))
    ));
}

#[test]
fn test_backtrace() {
    init::init_test_environment();
    let (program, _) = program();
    let (mut session, _subscription) = active_session(program);
    session.go_to_start().unwrap();
    session.next(Direction::Forward).unwrap();
    session.step(Direction::Forward).unwrap();

    let backtrace = session.backtrace().unwrap();
    assert_eq!(
        backtrace.to_string(),
        format!(
            "Traceback (most recent call first):\n  #0 File \"{LIB}\", line 8, in helper\n  #1 File \"{APP}\", line 2, in main"
        )
    );
}

#[test]
fn test_locals_and_cache() {
    init::init_test_environment();
    let (program, _) = program();
    let (mut session, _subscription) = active_session(program);
    session.go_to_start().unwrap();
    session.next(Direction::Forward).unwrap();

    let locals = session.locals().unwrap();
    assert_eq!(locals.to_string(), "Locals:\n count = 3\n greeting = 'hi'");

    // Served from the cache until the next stop.
    let calls = session.target().calls().len();
    assert_eq!(session.locals().unwrap(), locals);
    assert_eq!(session.target().calls().len(), calls);

    session.next(Direction::Forward).unwrap();
    let locals = session.locals().unwrap();
    assert_eq!(locals.len(), 4);
    assert_eq!(locals.get("items").unwrap().value, "[3, 'hi']");
    assert_eq!(locals.get("config").unwrap().value, "{'mode': 'hi'}");
}

#[test]
fn test_locals_of_a_fresh_frame() {
    init::init_test_environment();
    let (program, _) = program();
    let (mut session, _subscription) = active_session(program);
    session.go_to_start().unwrap();
    session.next(Direction::Forward).unwrap();
    session.step(Direction::Forward).unwrap();
    assert_eq!(session.locals().unwrap().to_string(), "No locals.");
}

#[test]
fn test_evaluate() {
    init::init_test_environment();
    let (program, _) = program();
    let (mut session, _subscription) = active_session(program);
    session.go_to_start().unwrap();
    session.next(Direction::Forward).unwrap();
    session.next(Direction::Forward).unwrap();

    assert_eq!(session.evaluate("items[-1]").unwrap(), Evaluation::Value("'hi'".into()));
    assert_eq!(session.evaluate("config['mode']").unwrap().to_string(), "'hi'");
    assert_eq!(
        session.evaluate("missing").unwrap(),
        Evaluation::Error("NameError: name 'missing' is not defined".into())
    );
    assert_eq!(
        session.evaluate("count.real").unwrap().to_string(),
        "error: AttributeError: 'int' object has no attribute 'real'"
    );
    assert_eq!(
        session.evaluate("items[5]").unwrap(),
        Evaluation::Error("IndexError: list index out of range".into())
    );
}

#[test]
fn test_inspection_needs_the_runtime() {
    init::init_test_environment();
    let (program, _) = program();
    let (mut session, _subscription) = active_session(program);
    assert!(matches!(session.backtrace(), Err(EngineError::NotInstrumented)));
    assert!(matches!(session.locals(), Err(EngineError::NotInstrumented)));
    assert!(matches!(session.evaluate("count"), Err(EngineError::NotInstrumented)));
}
