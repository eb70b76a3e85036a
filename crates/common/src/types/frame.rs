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


use std::{fmt::Display, path::PathBuf};

use serde::{Deserialize, Serialize};

/// A single frame of an interpreter backtrace, as dumped by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Position in the backtrace, 0 being the innermost frame.
    pub frame_no: u64,
    /// Name of the function executing in this frame.
    pub func_name: String,
    /// Source file of the function.
    pub file_name: PathBuf,
    /// Line currently executing in this frame.
    pub line: u64,
}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "  #{} File \"{}\", line {}, in {}",
            self.frame_no,
            self.file_name.display(),
            self.line,
            self.func_name
        )
    }
}

/// Backtrace of the interpreter thread, most recent frame first.
///
/// Serialized as a plain list of frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Backtrace {
    /// Frames, innermost first.
    pub frames: Vec<Frame>,
}

impl Backtrace {
    /// The innermost frame, if any.
    pub fn innermost(&self) -> Option<&Frame> {
        self.frames.first()
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether there is no frame at all.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Display for Backtrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No traceback available.");
        }
        write!(f, "Traceback (most recent call first):")?;
        for frame in &self.frames {
            write!(f, "\n{frame}")?;
        }
        Ok(())
    }
}

/// A local variable with its pre-formatted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Local {
    /// Variable name.
    pub name: String,
    /// Value as rendered by the interpreter.
    pub value: String,
}

impl Display for Local {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}

/// Locals of the current frame, serialized as a plain list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalList {
    /// Variables in the order the interpreter lists them.
    pub locals: Vec<Local>,
}

impl LocalList {
    /// Look a variable up by name.
    pub fn get(&self, name: &str) -> Option<&Local> {
        self.locals.iter().find(|local| local.name == name)
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.locals.len()
    }

    /// Whether the frame has no variables.
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }
}

impl Display for LocalList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No locals.");
        }
        write!(f, "Locals:")?;
        for local in &self.locals {
            write!(f, "\n {local}")?;
        }
        Ok(())
    }
}
