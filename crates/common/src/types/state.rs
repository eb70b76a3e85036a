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

use std::fmt::Display;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Identity of an interpreter frame (the runtime stores the frame object pointer).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[display("{_0:#x}")]
pub struct FrameId(pub u64);

impl FrameId {
    /// Decode a raw frame slot, where zero means "no frame".
    pub fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }
}

/// Where the exception reported at the exception hook comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionOrigin {
    /// No exception at this event.
    #[default]
    None,
    /// The exception was raised in the current frame.
    RaisedHere,
    /// The exception is propagating out of a callee.
    Propagated,
}

impl ExceptionOrigin {
    /// The value stored in the runtime structure.
    pub fn raw(self) -> u64 {
        match self {
            Self::None => 0,
            Self::RaisedHere => 1,
            Self::Propagated => 2,
        }
    }

    /// Decode the stored value. Unknown values are treated as "propagated".
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            0 => Self::None,
            1 => Self::RaisedHere,
            _ => Self::Propagated,
        }
    }
}

/// Fields of the runtime state structure, in layout order.
///
/// Every field occupies one 8-byte little-endian slot. String fields hold a
/// pointer to a NUL-terminated UTF-8 string.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateField {
    /// Frame currently executing.
    #[display("current_frame")]
    CurrentFrame,
    /// Source file of the current frame (string).
    #[display("current_file")]
    CurrentFile,
    /// Hash of `current_file`.
    #[display("current_file_id")]
    CurrentFileId,
    /// Function of the current frame (string).
    #[display("current_func")]
    CurrentFunc,
    /// Hash of `current_func`.
    #[display("current_func_id")]
    CurrentFuncId,
    /// Current source line.
    #[display("current_line")]
    CurrentLine,
    /// Frame that most recently returned.
    #[display("returned_from")]
    ReturnedFrom,
    /// Name of the current exception type (string).
    #[display("exception_type")]
    ExceptionType,
    /// Hash of `exception_type`.
    #[display("exception_type_id")]
    ExceptionTypeId,
    /// Encoded [`ExceptionOrigin`].
    #[display("exception_origin")]
    ExceptionOrigin,
    /// Non-zero until the first line of a freshly entered frame has executed.
    #[display("first_line")]
    FirstLine,
}

impl StateField {
    /// Size of one slot of the structure.
    pub const SLOT_SIZE: usize = 8;

    /// Every field in layout order.
    pub const ALL: [Self; 11] = [
        Self::CurrentFrame,
        Self::CurrentFile,
        Self::CurrentFileId,
        Self::CurrentFunc,
        Self::CurrentFuncId,
        Self::CurrentLine,
        Self::ReturnedFrom,
        Self::ExceptionType,
        Self::ExceptionTypeId,
        Self::ExceptionOrigin,
        Self::FirstLine,
    ];

    /// Total size of the structure in bytes.
    pub const STRUCT_SIZE: usize = Self::ALL.len() * Self::SLOT_SIZE;

    /// Byte offset of the field from the start of the structure.
    pub fn offset(self) -> u64 {
        let index = Self::ALL.iter().position(|field| *field == self).unwrap_or_default();
        (index * Self::SLOT_SIZE) as u64
    }

    /// Whether the slot holds a pointer to a string rather than a plain integer.
    pub fn is_string(self) -> bool {
        matches!(self, Self::CurrentFile | Self::CurrentFunc | Self::ExceptionType)
    }
}

/// Snapshot of the runtime state structure.
///
/// The values are only meaningful while the debuggee is stopped inside one of
/// the runtime hooks. At any other stop they describe the most recent hook
/// event, which may be stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterState {
    /// Frame currently executing, if any.
    pub current_frame: Option<FrameId>,
    /// Source file of the current frame.
    pub current_file: String,
    /// Hash of `current_file` as stored by the runtime.
    pub current_file_id: u64,
    /// Function of the current frame.
    pub current_func: String,
    /// Hash of `current_func` as stored by the runtime.
    pub current_func_id: u64,
    /// Current source line.
    pub current_line: u64,
    /// Frame that most recently returned.
    pub returned_from: Option<FrameId>,
    /// Name of the current exception type.
    pub exception_type: Option<String>,
    /// Hash of the exception type name.
    pub exception_type_id: u64,
    /// Origin of the current exception.
    pub exception_origin: ExceptionOrigin,
    /// Whether the first line of the current frame has not run yet.
    pub first_line: bool,
}

impl InterpreterState {
    /// Whether the interpreter has reported any frame yet.
    pub fn has_started(&self) -> bool {
        self.current_frame.is_some() || !self.current_file.is_empty()
    }

    /// Integer value of a non-string field, as a native condition would see it.
    pub fn field_value(&self, field: StateField) -> Option<u64> {
        let value = match field {
            StateField::CurrentFrame => self.current_frame.map(|f| f.0).unwrap_or_default(),
            StateField::CurrentFileId => self.current_file_id,
            StateField::CurrentFuncId => self.current_func_id,
            StateField::CurrentLine => self.current_line,
            StateField::ReturnedFrom => self.returned_from.map(|f| f.0).unwrap_or_default(),
            StateField::ExceptionTypeId => self.exception_type_id,
            StateField::ExceptionOrigin => self.exception_origin.raw(),
            StateField::FirstLine => u64::from(self.first_line),
            StateField::CurrentFile | StateField::CurrentFunc | StateField::ExceptionType => {
                return None
            }
        };
        Some(value)
    }

    /// `file:line` of the current position.
    pub fn position(&self) -> String {
        format!("{}:{}", self.current_file, self.current_line)
    }
}

impl Display for InterpreterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} () at {}", self.current_func, self.position())
    }
}
