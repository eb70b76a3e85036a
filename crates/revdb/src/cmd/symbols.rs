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


//! Runtime symbols command

use revdb_common::{DumpKind, HookKind, RevdbConfig, RuntimeSymbols};

/// Every symbol the engine resolves in the debuggee, with its role.
pub fn list_symbols(config: &RevdbConfig) -> String {
    let symbols = RuntimeSymbols::new(&config.runtime.symbol_prefix);

    let mut lines = vec![format!("{:<40} state structure", symbols.state())];
    for kind in [HookKind::Line, HookKind::Call, HookKind::Return, HookKind::Exception] {
        lines.push(format!("{:<40} {kind} hook", symbols.hook(kind)));
    }
    for kind in [DumpKind::Backtrace, DumpKind::Locals, DumpKind::Eval, DumpKind::WatchChain] {
        lines.push(format!("{:<40} {kind} dump", symbols.dump(kind)));
    }

    let interpreter = &config.interpreter;
    for (name, role) in [
        (&interpreter.is_initialized, "initialization check"),
        (&interpreter.lock_ensure, "lock acquire"),
        (&interpreter.lock_release, "lock release"),
        (&interpreter.run_file, "script runner"),
        (&interpreter.fopen, "file open"),
        (&interpreter.malloc, "allocation"),
        (&interpreter.free, "deallocation"),
    ] {
        lines.push(format!("{name:<40} {role}"));
    }
    lines.join("\n")
}
