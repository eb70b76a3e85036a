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


//! Read path into the runtime state structure.

use revdb_common::{
    types::{ExceptionOrigin, FrameId, InterpreterState, StateField},
    RuntimeSymbols,
};
use tracing::trace;

use crate::{Address, EngineError, EngineResult, Target};

/// Longest string the bridge follows before giving up on a terminator.
const MAX_STRING_LEN: usize = 4096;
const STRING_CHUNK: usize = 64;
/// Granularity of memory mappings.
const PAGE_SIZE: u64 = 0x1000;

/// Reads the runtime state structure through symbol lookup and memory access.
#[derive(Debug, Clone)]
pub struct StateBridge {
    symbols: RuntimeSymbols,
}

impl StateBridge {
    /// Bridge for the runtime exporting `symbols`.
    pub fn new(symbols: RuntimeSymbols) -> Self {
        Self { symbols }
    }

    /// Symbol naming in use.
    pub fn symbols(&self) -> &RuntimeSymbols {
        &self.symbols
    }

    /// Whether the runtime is loaded at the current position.
    pub fn instrumentation_present<T: Target>(&self, target: &T) -> bool {
        self.state_address(target).is_some()
    }

    /// Address of the state structure, if loaded.
    pub fn state_address<T: Target>(&self, target: &T) -> Option<Address> {
        target.lookup_symbol(self.symbols.state())
    }

    /// Decode the whole structure.
    ///
    /// Before the interpreter has reported any event the structure is all
    /// zeroes, which decodes to a state without a frame (see
    /// [`InterpreterState::has_started`]) rather than an error.
    pub fn read_state<T: Target>(&self, target: &T) -> EngineResult<InterpreterState> {
        let base = self.state_address(target).ok_or(EngineError::NotInstrumented)?;
        let raw = target.read_memory(base, StateField::STRUCT_SIZE)?;
        let slot = |field: StateField| decode_slot(&raw, field.offset() as usize);

        let state = InterpreterState {
            current_frame: FrameId::from_raw(slot(StateField::CurrentFrame)),
            current_file: self.read_c_string(target, slot(StateField::CurrentFile))?.unwrap_or_default(),
            current_file_id: slot(StateField::CurrentFileId),
            current_func: self.read_c_string(target, slot(StateField::CurrentFunc))?.unwrap_or_default(),
            current_func_id: slot(StateField::CurrentFuncId),
            current_line: slot(StateField::CurrentLine),
            returned_from: FrameId::from_raw(slot(StateField::ReturnedFrom)),
            exception_type: self.read_c_string(target, slot(StateField::ExceptionType))?,
            exception_type_id: slot(StateField::ExceptionTypeId),
            exception_origin: ExceptionOrigin::from_raw(slot(StateField::ExceptionOrigin)),
            first_line: slot(StateField::FirstLine) != 0,
        };
        trace!(?state, "read interpreter state");
        Ok(state)
    }

    /// Read one integer field.
    pub fn read_field<T: Target>(&self, target: &T, field: StateField) -> EngineResult<u64> {
        let base = self.state_address(target).ok_or(EngineError::NotInstrumented)?;
        let raw = target.read_memory(base + field.offset(), StateField::SLOT_SIZE)?;
        Ok(decode_slot(&raw, 0))
    }

    /// Follow a `const char *`. A null pointer reads as `None`.
    pub fn read_c_string<T: Target>(&self, target: &T, ptr: Address) -> EngineResult<Option<String>> {
        if ptr == 0 {
            return Ok(None);
        }
        let mut bytes = Vec::new();
        while bytes.len() < MAX_STRING_LEN {
            let chunk = read_string_chunk(target, ptr + bytes.len() as u64)?;
            if let Some(end) = chunk.iter().position(|b| *b == 0) {
                bytes.extend_from_slice(&chunk[..end]);
                return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

/// Read the next chunk of a string. A string may end just before the end of
/// its mapping, so a failed full-size read is retried up to the page boundary.
fn read_string_chunk<T: Target>(target: &T, addr: Address) -> EngineResult<Vec<u8>> {
    match target.read_memory(addr, STRING_CHUNK) {
        Ok(chunk) => Ok(chunk),
        Err(err) => {
            let to_page_end = (PAGE_SIZE - addr % PAGE_SIZE) as usize;
            if to_page_end >= STRING_CHUNK {
                return Err(err.into());
            }
            trace!(addr, len = to_page_end, "string chunk crosses a page boundary");
            Ok(target.read_memory(addr, to_page_end)?)
        }
    }
}

/// Little-endian `u64` at `offset`; missing bytes read as zero.
fn decode_slot(raw: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; StateField::SLOT_SIZE];
    for (dst, src) in bytes.iter_mut().zip(raw.iter().skip(offset)) {
        *dst = *src;
    }
    u64::from_le_bytes(bytes)
}
