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


//! Address space of the simulated debuggee.
//!
//! A handful of fixed regions stand in for the mappings of a real interpreter
//! process: a pseudo mapping, the interpreter's text, a data segment holding
//! the runtime state structure and interned strings, an object heap, a malloc
//! arena and a stack.

use revdb_engine::{Address, MemoryMap, TargetError, TargetResult};

/// A pseudo executable mapping, never used for call injection.
pub const VDSO_BASE: Address = 0x7fff_f7fc_0000;
/// The interpreter's executable text.
pub const TEXT_BASE: Address = 0x0040_0000;
/// Size of the text mapping.
pub const TEXT_SIZE: usize = 0x1000;
/// Program counter while the interpreter runs normally.
pub const TEXT_ENTRY: Address = TEXT_BASE + 0x10;
/// First native function of the text mapping.
pub const NATIVE_BASE: Address = TEXT_BASE + 0x100;
/// Data segment.
pub const DATA_BASE: Address = 0x0060_0000;
/// The runtime's state structure.
pub const STATE_ADDR: Address = DATA_BASE;
/// Interned strings start here.
pub const STRING_BASE: Address = DATA_BASE + 0x100;
/// Size of the data segment.
pub const DATA_SIZE: usize = 0x1_0000;
/// Interpreter object heap.
pub const HEAP_BASE: Address = 0x1000_0000;
/// Size of the object heap.
pub const HEAP_SIZE: usize = 0x1_0000;
/// Arena served by the native `malloc`.
pub const MALLOC_BASE: Address = 0x2000_0000;
/// Size of the malloc arena.
pub const MALLOC_SIZE: usize = 0x1_0000;
/// Lowest stack address.
pub const STACK_BASE: Address = 0x7ffe_0000_0000;
/// Size of the stack.
pub const STACK_SIZE: usize = 0x1_0000;

#[derive(Debug, Clone)]
struct Region {
    map: MemoryMap,
    bytes: Vec<u8>,
}

/// Byte-addressable memory made of disjoint regions.
#[derive(Debug, Clone)]
pub struct Memory {
    regions: Vec<Region>,
}

impl Default for Memory {
    fn default() -> Self {
        let region = |start: Address, size: usize, path: &str, writable, executable, fill: u8| Region {
            map: MemoryMap {
                start,
                end: start + size as u64,
                path: path.to_string(),
                readable: true,
                writable,
                executable,
            },
            bytes: vec![fill; size],
        };

        let mut text = region(TEXT_BASE, TEXT_SIZE, "/usr/bin/python3.12", false, true, 0);
        // `ret` for every native function slot; the tail stays zero.
        for byte in &mut text.bytes[0x100..0x400] {
            *byte = 0xc3;
        }

        Self {
            regions: vec![
                region(VDSO_BASE, 0x1000, "[vdso]", false, true, 0),
                text,
                region(DATA_BASE, DATA_SIZE, "/usr/bin/python3.12", true, false, 0),
                region(HEAP_BASE, HEAP_SIZE, "[heap]", true, false, 0),
                region(MALLOC_BASE, MALLOC_SIZE, "", true, false, 0),
                region(STACK_BASE, STACK_SIZE, "[stack]", true, false, 0),
            ],
        }
    }
}

impl Memory {
    /// The mappings, in address order of creation.
    pub fn maps(&self) -> Vec<MemoryMap> {
        self.regions.iter().map(|region| region.map.clone()).collect()
    }

    fn locate(&self, addr: Address, len: usize) -> TargetResult<(usize, usize)> {
        self.regions
            .iter()
            .position(|region| addr >= region.map.start && addr + len as u64 <= region.map.end)
            .map(|index| (index, (addr - self.regions[index].map.start) as usize))
            .ok_or(TargetError::Memory { addr, len })
    }

    /// Read `len` bytes.
    pub fn read(&self, addr: Address, len: usize) -> TargetResult<Vec<u8>> {
        let (index, offset) = self.locate(addr, len)?;
        Ok(self.regions[index].bytes[offset..offset + len].to_vec())
    }

    /// Overwrite bytes.
    pub fn write(&mut self, addr: Address, data: &[u8]) -> TargetResult<()> {
        let (index, offset) = self.locate(addr, data.len())?;
        self.regions[index].bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read a little-endian `u64`.
    pub fn read_u64(&self, addr: Address) -> TargetResult<u64> {
        let bytes = self.read(addr, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Write a little-endian `u64`.
    pub fn write_u64(&mut self, addr: Address, value: u64) -> TargetResult<()> {
        self.write(addr, &value.to_le_bytes())
    }

    /// Read a NUL-terminated string.
    pub fn read_c_string(&self, addr: Address) -> TargetResult<String> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.read(addr + bytes.len() as u64, 1)?[0];
            if byte == 0 {
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
            bytes.push(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_round_trip() {
        let mut memory = Memory::default();
        memory.write_u64(HEAP_BASE + 8, 0x1122_3344).unwrap();
        assert_eq!(memory.read_u64(HEAP_BASE + 8).unwrap(), 0x1122_3344);
        memory.write(MALLOC_BASE, b"hello\0").unwrap();
        assert_eq!(memory.read_c_string(MALLOC_BASE).unwrap(), "hello");
    }

    #[test]
    fn test_out_of_bounds_access_fails() {
        let memory = Memory::default();
        assert!(matches!(memory.read(0x10, 1), Err(TargetError::Memory { addr: 0x10, len: 1 })));
        // Accesses may not straddle the end of a region.
        assert!(memory.read(TEXT_BASE + TEXT_SIZE as u64 - 2, 4).is_err());
    }

    #[test]
    fn test_text_tail_is_free() {
        let memory = Memory::default();
        let tail = memory.read(TEXT_BASE + TEXT_SIZE as u64 - 3, 3).unwrap();
        assert_eq!(tail, vec![0, 0, 0]);
        let maps = memory.maps();
        assert!(maps[0].is_pseudo());
        assert!(maps[1].executable && !maps[1].is_pseudo());
    }
}
