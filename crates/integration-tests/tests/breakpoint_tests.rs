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


//! User breakpoints: hits in both directions, hash collisions and bookkeeping

use revdb_common::types::BreakpointSpec;
use revdb_engine::{Direction, EngineError, StopReason, TargetError};
use revdb_integration_tests::{
    program::{Program, ProgramBuilder},
    test_utils::{
        init,
        logging::with_error_capture,
        session::{active_session, location, session},
    },
};

const APP: &str = "/abs/path/app.py";

/// `main` runs line 1, loops twice over lines 10 and 11 calling `helper` from
/// line 11, then runs line 12.
fn loop_program() -> Program {
    let mut p = ProgramBuilder::new();
    p.load_runtime();
    p.call("main", APP, 1);
    p.line(1);
    for _ in 0..2 {
        p.line(10).line(11);
        p.call("helper", APP, 20);
        p.line(21).ret();
    }
    p.line(12).ret();
    p.build()
}

fn line_10() -> BreakpointSpec {
    BreakpointSpec::file_line(APP, 10)
}

#[test]
fn test_breakpoint_hits_forward_and_backward() {
    init::init_test_environment();
    let (mut session, _subscription) = active_session(loop_program());
    assert_eq!(session.add_breakpoint(line_10()).unwrap(), format!("Breakpoint 1 at {APP}:10"));

    let hit = format!("Breakpoint 1, main () at {APP}:10");
    for _ in 0..2 {
        let report = session.continue_execution(Direction::Forward).unwrap();
        assert_eq!(report.breakpoint_hits, vec![hit.clone()]);
        assert_eq!(location(&report), Some(("main".to_string(), 10)));
    }

    let report = session.continue_execution(Direction::Forward).unwrap();
    assert!(report.reached_end_of_history());
    assert!(report.breakpoint_hits.is_empty());

    let report = session.continue_execution(Direction::Reverse).unwrap();
    assert_eq!(report.breakpoint_hits, vec![hit]);
    assert_eq!(report.direction, Direction::Reverse);
}

#[test]
fn test_function_breakpoint_stops_on_first_line() {
    init::init_test_environment();
    let (mut session, _subscription) = active_session(loop_program());
    assert_eq!(
        session.add_breakpoint("helper".parse().unwrap()).unwrap(),
        "Breakpoint 1 at helper ()"
    );

    let report = session.continue_execution(Direction::Forward).unwrap();
    assert_eq!(report.breakpoint_hits, vec![format!("Breakpoint 1, helper () at {APP}:21")]);
    let report = session.continue_execution(Direction::Forward).unwrap();
    assert_eq!(report.breakpoint_hits.len(), 1);
    let report = session.continue_execution(Direction::Forward).unwrap();
    assert_eq!(report.reason, StopReason::EndOfHistory);
}

#[test]
fn test_hash_collision_is_skipped() {
    init::init_test_environment();
    let mut p = ProgramBuilder::new();
    p.load_runtime();
    p.call("main", APP, 1);
    p.line(1).line(10);
    // Same line and file hash, different file.
    p.forge(|state| state.current_file = "/abs/path/other.py".to_string());
    p.line(2).line(10).line(3).ret();
    let (mut session, _subscription) = active_session(p.build());
    session.add_breakpoint(line_10()).unwrap();

    let (report, capture) =
        with_error_capture(|| session.continue_execution(Direction::Forward).unwrap());
    assert_eq!(report.breakpoint_hits, vec![format!("Breakpoint 1, main () at {APP}:10")]);
    assert_eq!(session.state().unwrap().current_file, APP);
    assert!(capture
        .warnings()
        .iter()
        .any(|message| message.contains("rejected breakpoint hit on a hash collision")));
    assert!(!capture.has_errors());
}

#[test]
fn test_duplicate_breakpoints_both_report() {
    init::init_test_environment();
    let (mut session, _subscription) = active_session(loop_program());
    session.add_breakpoint(line_10()).unwrap();
    session.add_breakpoint(line_10()).unwrap();

    let report = session.continue_execution(Direction::Forward).unwrap();
    assert_eq!(
        report.breakpoint_hits,
        vec![
            format!("Breakpoint 1, main () at {APP}:10"),
            format!("Breakpoint 2, main () at {APP}:10"),
        ]
    );

    assert_eq!(session.delete_breakpoint(1).unwrap(), "Deleted breakpoint 1.");
    let report = session.continue_execution(Direction::Forward).unwrap();
    assert_eq!(report.breakpoint_hits, vec![format!("Breakpoint 2, main () at {APP}:10")]);
}

#[test]
fn test_breakpoint_listing_and_deletion() {
    init::init_test_environment();
    let (mut session, _subscription) = active_session(loop_program());
    assert_eq!(session.list_breakpoints(), "No breakpoints.");
    assert_eq!(session.delete_breakpoint(0).unwrap(), "No breakpoints.");

    session.add_breakpoint(line_10()).unwrap();
    session.add_breakpoint(BreakpointSpec::function("helper")).unwrap();
    session.add_breakpoint(BreakpointSpec::file_line(APP, 12)).unwrap();
    assert_eq!(
        session.list_breakpoints(),
        format!("1: {APP}:10\n2: helper ()\n3: {APP}:12")
    );

    assert_eq!(session.delete_breakpoint(2).unwrap(), "Deleted breakpoint 2.");
    assert_eq!(session.delete_breakpoint(2).unwrap(), "No breakpoint (number 2).");
    assert_eq!(session.list_breakpoints(), format!("1: {APP}:10\n3: {APP}:12"));

    // Numbers are never reused.
    assert_eq!(session.add_breakpoint(line_10()).unwrap(), format!("Breakpoint 4 at {APP}:10"));

    assert_eq!(session.delete_breakpoint(0).unwrap(), "Deleted 3 breakpoints.");
    assert_eq!(session.target().breakpoint_count(), 0);
}

#[test]
fn test_navigation_reports_user_breakpoints() {
    init::init_test_environment();
    let (mut session, _subscription) = active_session(loop_program());
    session.go_to_start().unwrap();
    session.add_breakpoint(BreakpointSpec::function("helper")).unwrap();

    // `next` over the call from line 11 stops inside `helper` on the user breakpoint.
    session.next(Direction::Forward).unwrap();
    let report = session.next(Direction::Forward).unwrap();
    assert_eq!(location(&report), Some(("main".to_string(), 11)));
    let report = session.next(Direction::Forward).unwrap();
    assert_eq!(report.breakpoint_hits, vec![format!("Breakpoint 1, helper () at {APP}:21")]);
    assert_eq!(location(&report), Some(("helper".to_string(), 21)));
}

#[test]
fn test_deactivate_removes_everything() {
    init::init_test_environment();
    let (mut session, subscription) = active_session(loop_program());
    session.add_breakpoint(line_10()).unwrap();
    session.continue_execution(Direction::Forward).unwrap();
    session.add_watch("nothing").unwrap_err();

    session.deactivate(subscription).unwrap();
    assert!(!session.is_active());
    assert_eq!(session.target().breakpoint_count(), 0);
    assert!(matches!(session.add_breakpoint(line_10()), Err(EngineError::Inactive)));
}

#[test]
fn test_subscription_lifecycle() {
    init::init_test_environment();
    let mut first = session(loop_program());
    let mut second = session(loop_program());
    let subscription = first.activate().unwrap();
    let other = second.activate().unwrap();

    assert!(matches!(first.activate(), Err(EngineError::AlreadyActive)));
    // Both sessions issue their first token; only the issuing session accepts it.
    assert_eq!(subscription.id(), other.id());
    first.deactivate(subscription).unwrap();
    assert!(matches!(first.deactivate(other), Err(EngineError::SubscriptionMismatch(1))));
}

#[test]
fn test_failed_internal_cleanup_is_logged() {
    init::init_test_environment();
    let (mut session, _subscription) = active_session(loop_program());
    session.go_to_start().unwrap();
    // `next` places two breakpoints: the first lands, the second and the
    // cleanup of the first fail.
    session.target_mut().fail_breakpoint_edits_after(1);

    let (result, capture) = with_error_capture(|| session.next(Direction::Forward));
    assert!(matches!(result, Err(EngineError::Target(TargetError::Backend(_)))));
    assert!(capture
        .warnings()
        .iter()
        .any(|message| message.contains("failed to remove internal breakpoints")));
}

#[test]
fn test_failed_restore_after_suspend_is_logged() {
    init::init_test_environment();
    let (mut session, _subscription) = active_session(loop_program());
    session.go_to_start().unwrap();
    session.add_breakpoint(line_10()).unwrap();
    session.add_breakpoint(line_10()).unwrap();
    // Disabling the first user breakpoint works, the second and the
    // re-enable of the first fail.
    session.target_mut().fail_breakpoint_edits_after(1);

    let (result, capture) =
        with_error_capture(|| session.go_to_exception(Direction::Forward, None));
    assert!(matches!(result, Err(EngineError::Target(TargetError::Backend(_)))));
    assert!(capture
        .warnings()
        .iter()
        .any(|message| message.contains("failed to restore breakpoints after a failed suspend")));
}
