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


//! End-to-end tests of the `revdb` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use revdb_common::{ensure_test_logging, simple_hash};
use tempfile::TempDir;
use tracing::info;

fn revdb(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("revdb").unwrap();
    cmd.env_remove("REVDB_SYMBOL_PREFIX")
        .arg("--config")
        .arg(config_dir.path().join("revdb.toml"));
    cmd
}

#[test]
fn test_help_command() {
    ensure_test_logging(None);
    info!("Testing CLI help command");

    let mut cmd = Command::cargo_bin("revdb").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reversible Interpreter Debugger"));
}

#[test]
fn test_version_command() {
    ensure_test_logging(None);
    let mut cmd = Command::cargo_bin("revdb").unwrap();
    cmd.arg("--version").assert().success().stdout(predicate::str::contains("revdb"));
}

#[test]
fn test_missing_subcommand() {
    ensure_test_logging(None);
    let mut cmd = Command::cargo_bin("revdb").unwrap();
    cmd.assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_hash_command() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    revdb(&dir)
        .args(["hash", "--hex", "a", "foobar"])
        .assert()
        .success()
        .stdout("0xaf63dc4c8601ec8c  a\n0x85944171f73967e8  foobar\n");
}

#[test]
fn test_hash_requires_a_value() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    revdb(&dir).arg("hash").assert().failure();
}

#[test]
fn test_condition_command() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    let expected = format!(
        "break s_revdb_trace_line if s_revdb.current_line == 7 && s_revdb.current_file_id == {}\n",
        simple_hash("/srv/app.py")
    );
    revdb(&dir).args(["condition", "/srv/app.py:7"]).assert().success().stdout(expected);
}

#[test]
fn test_condition_with_prefix_override() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    revdb(&dir)
        .args(["--symbol-prefix", "rt", "condition", "main"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("break rt_trace_line if rt.current_func_id == "));
}

#[test]
fn test_condition_rejects_bad_location() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    revdb(&dir)
        .args(["condition", "/srv/app.py:zero"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid line number"));
}

#[test]
fn test_exception_command() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    revdb(&dir)
        .args(["exception", "ValueError"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "s_revdb.exception_origin == 1 && s_revdb.exception_type_id == {}",
            simple_hash("ValueError")
        )));
}

#[test]
fn test_startup_script_from_config() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("revdb.toml"),
        "[runtime]\nlibrary_path = \"/opt/revdb/revdb_runtime.so\"\n",
    )
    .unwrap();

    revdb(&dir)
        .arg("startup-script")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"/opt/revdb/revdb_runtime.so\""))
        .stdout(predicate::str::contains("module.start()"));
}

#[test]
fn test_startup_script_without_library() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("revdb.toml"), "").unwrap();

    revdb(&dir)
        .arg("startup-script")
        .assert()
        .failure()
        .stderr(predicate::str::contains("runtime.library_path"));
}

#[test]
fn test_parse_watch_command() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    revdb(&dir)
        .args(["parse-watch", "a.b[0]"])
        .assert()
        .success()
        .stdout("a.b[0]\n  0: name a\n  1: attribute b\n  2: index 0\n");
}

#[test]
fn test_parse_watch_rejects_unsupported_syntax() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    revdb(&dir)
        .args(["parse-watch", "a[1:2]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported slice"));
}

#[test]
fn test_config_init_and_show() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("revdb.toml");

    revdb(&dir).args(["config", "init"]).assert().success();
    assert!(path.exists());

    revdb(&dir).args(["config", "init"]).assert().failure().stderr(predicate::str::contains("--force"));
    revdb(&dir).args(["config", "init", "--force"]).assert().success();

    revdb(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("symbol_prefix = \"s_revdb\""))
        .stdout(predicate::str::contains("lock_ensure = \"PyGILState_Ensure\""));
}

#[test]
fn test_config_file_must_exist_when_given() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    revdb(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn test_symbols_command() {
    ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("revdb.toml"), "[runtime]\nsymbol_prefix = \"rt\"\n").unwrap();

    revdb(&dir)
        .arg("symbols")
        .assert()
        .success()
        .stdout(predicate::str::contains("rt_trace_exception"))
        .stdout(predicate::str::contains("rt_interact_locals_json"));
}
