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


//! Recorded programs for the simulated debuggee.
//!
//! A [`Program`] is the complete recorded history of one interpreter run: a
//! timeline of runtime hook events and memory stores, plus the initial memory
//! image. [`ProgramBuilder`] writes one the way the interpreter would have
//! executed it.

use std::{collections::HashMap, path::PathBuf};

use revdb_common::{
    simple_hash,
    types::{ExceptionOrigin, Frame, FrameId, InterpreterState, StateField},
    HookKind,
};
use revdb_engine::Address;

use crate::{
    heap::{attr_slot, item_slot, HeapWriter},
    memory::{Memory, DATA_BASE, DATA_SIZE, HEAP_BASE, HEAP_SIZE, STRING_BASE},
};

/// Local variable slots reserved for every frame.
pub const LOCALS_PER_FRAME: usize = 16;

const FRAME_ID_BASE: u64 = 0x7f00_0000_1000;

/// One hook call made by the runtime.
#[derive(Debug, Clone)]
pub struct HookEvent {
    /// Which hook was called
    pub kind: HookKind,
    /// State structure contents at the call
    pub state: InterpreterState,
    /// Raw bytes of the state structure
    pub image: Vec<u8>,
    /// Interpreter stack, innermost frame first
    pub stack: Vec<Frame>,
}

/// A step of the recorded history.
#[derive(Debug, Clone)]
pub enum Event {
    /// The runtime's hook was called
    Hook(HookEvent),
    /// The program stored a pointer-sized value
    Store {
        /// Destination
        addr: Address,
        /// New value
        value: u64,
    },
    /// The runtime library was loaded by the program itself
    LoadRuntime,
}

/// Local variables of one frame.
#[derive(Debug, Clone)]
pub struct FrameLocals {
    /// Slot table in the heap
    pub table: Address,
    /// Variable names, in slot order
    pub names: Vec<String>,
}

impl FrameLocals {
    /// Slot of a variable.
    pub fn slot(&self, name: &str) -> Option<Address> {
        self.names.iter().position(|n| n == name).map(|i| self.table + 8 * i as u64)
    }
}

/// A complete recorded history.
#[derive(Debug, Clone)]
pub struct Program {
    /// Events in execution order
    pub events: Vec<Event>,
    /// Memory before the first event
    pub memory: Memory,
    /// Locals of every frame that ever existed
    pub frames: HashMap<FrameId, FrameLocals>,
}

#[derive(Debug, Clone)]
struct ActiveFrame {
    id: FrameId,
    func: String,
    file: String,
    line: u64,
    first_line: bool,
}

/// Writes a [`Program`] event by event.
#[derive(Debug)]
pub struct ProgramBuilder {
    events: Vec<Event>,
    memory: Memory,
    heap: HeapWriter,
    strings: HashMap<String, Address>,
    next_string: Address,
    frames: HashMap<FrameId, FrameLocals>,
    stack: Vec<ActiveFrame>,
    frames_created: u64,
    returned_from: Option<FrameId>,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    /// An empty history.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            memory: Memory::default(),
            heap: HeapWriter::new(HEAP_BASE, HEAP_BASE + HEAP_SIZE as u64),
            strings: HashMap::new(),
            next_string: STRING_BASE,
            frames: HashMap::new(),
            stack: Vec::new(),
            frames_created: 0,
            returned_from: None,
        }
    }

    /// Number of events so far.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The program loads the runtime itself.
    pub fn load_runtime(&mut self) -> &mut Self {
        self.events.push(Event::LoadRuntime);
        self
    }

    /// Enter `func`, defined at `file:line`.
    pub fn call(&mut self, func: &str, file: &str, line: u64) -> FrameId {
        self.frames_created += 1;
        let id = FrameId(FRAME_ID_BASE + 0x100 * self.frames_created);
        let table = self.heap.alloc(8 * LOCALS_PER_FRAME);
        self.frames.insert(id, FrameLocals { table, names: Vec::new() });
        self.stack.push(ActiveFrame {
            id,
            func: func.to_string(),
            file: file.to_string(),
            line,
            first_line: true,
        });
        self.hook(HookKind::Call, None);
        id
    }

    /// Execute `line` in the current frame.
    pub fn line(&mut self, line: u64) -> &mut Self {
        let frame = self.top();
        frame.line = line;
        self.hook(HookKind::Line, None);
        self.top().first_line = false;
        self
    }

    /// Return from the current frame.
    pub fn ret(&mut self) -> &mut Self {
        self.top().first_line = false;
        self.hook(HookKind::Return, None);
        let frame = self.stack.pop().expect("a frame to return from");
        self.returned_from = Some(frame.id);
        self
    }

    /// Raise an exception of type `name` in the current frame.
    pub fn raise(&mut self, name: &str) -> &mut Self {
        self.hook(HookKind::Exception, Some((name, ExceptionOrigin::RaisedHere)))
    }

    /// An exception of type `name` propagates into the current frame.
    pub fn propagate(&mut self, name: &str) -> &mut Self {
        self.hook(HookKind::Exception, Some((name, ExceptionOrigin::Propagated)))
    }

    /// Rewrite the state of the last hook event, keeping its strings.
    pub fn forge(&mut self, edit: impl FnOnce(&mut InterpreterState)) -> &mut Self {
        let Some(Event::Hook(event)) =
            self.events.iter_mut().rev().find(|event| matches!(event, Event::Hook(_)))
        else {
            panic!("no hook event to forge");
        };
        edit(&mut event.state);
        let state = event.state.clone();
        let image = self.image(&state);
        if let Some(Event::Hook(event)) =
            self.events.iter_mut().rev().find(|event| matches!(event, Event::Hook(_)))
        {
            event.image = image;
        }
        self
    }

    /// Allocate an int.
    pub fn int(&mut self, value: i64) -> Address {
        self.heap.int(&mut self.memory, value)
    }

    /// Allocate a str.
    pub fn str(&mut self, text: &str) -> Address {
        let bytes = self.intern(text);
        self.heap.str(&mut self.memory, bytes, text.len())
    }

    /// Allocate a list.
    pub fn list(&mut self, items: &[Address]) -> Address {
        self.heap.list(&mut self.memory, items)
    }

    /// Allocate a dict with string keys.
    pub fn dict(&mut self, entries: &[(&str, Address)]) -> Address {
        let entries: Vec<_> = entries.iter().map(|(key, value)| (self.str(key), *value)).collect();
        self.heap.dict(&mut self.memory, &entries)
    }

    /// Allocate an instance with the given attributes.
    pub fn object(&mut self, attrs: &[(&str, Address)]) -> Address {
        let dict = self.dict(attrs);
        self.heap.object(&mut self.memory, dict)
    }

    /// Bind a local of the current frame.
    pub fn bind(&mut self, name: &str, value: Address) -> &mut Self {
        let id = self.top().id;
        let locals = self.frames.get_mut(&id).expect("frame locals");
        if !locals.names.iter().any(|n| n == name) {
            assert!(locals.names.len() < LOCALS_PER_FRAME, "too many locals");
            locals.names.push(name.to_string());
        }
        let slot = locals.slot(name).expect("just bound");
        self.store(slot, value)
    }

    /// Assign `obj.name = value`. The attribute must exist initially.
    pub fn set_attr(&mut self, obj: Address, name: &str, value: Address) -> &mut Self {
        let slot = attr_slot(&self.memory, obj, name).ok().flatten().expect("existing attribute");
        self.store(slot, value)
    }

    /// Assign `list[index] = value`.
    pub fn set_item(&mut self, list: Address, index: i64, value: Address) -> &mut Self {
        let slot = item_slot(&self.memory, list, index).ok().flatten().expect("index in range");
        self.store(slot, value)
    }

    /// Store a raw value.
    pub fn store(&mut self, addr: Address, value: u64) -> &mut Self {
        self.events.push(Event::Store { addr, value });
        self
    }

    /// Finish the history.
    pub fn build(self) -> Program {
        Program { events: self.events, memory: self.memory, frames: self.frames }
    }

    fn top(&mut self) -> &mut ActiveFrame {
        self.stack.last_mut().expect("an active frame")
    }

    fn intern(&mut self, text: &str) -> Address {
        if let Some(addr) = self.strings.get(text) {
            return *addr;
        }
        let addr = self.next_string;
        assert!(
            addr + text.len() as u64 + 1 <= DATA_BASE + DATA_SIZE as u64,
            "string area exhausted"
        );
        self.memory.write(addr, text.as_bytes()).expect("data segment is mapped");
        self.memory.write(addr + text.len() as u64, &[0]).expect("data segment is mapped");
        self.next_string = (addr + text.len() as u64 + 8) & !7;
        self.strings.insert(text.to_string(), addr);
        addr
    }

    fn hook(&mut self, kind: HookKind, exception: Option<(&str, ExceptionOrigin)>) -> &mut Self {
        let frame = self.stack.last().cloned().expect("hook events need a frame");
        let (exception_type, exception_type_id, exception_origin) = match exception {
            Some((name, origin)) => (Some(name.to_string()), simple_hash(name), origin),
            None => (None, 0, ExceptionOrigin::None),
        };
        let state = InterpreterState {
            current_frame: Some(frame.id),
            current_file_id: simple_hash(&frame.file),
            current_file: frame.file.clone(),
            current_func_id: simple_hash(&frame.func),
            current_func: frame.func.clone(),
            current_line: frame.line,
            returned_from: self.returned_from,
            exception_type,
            exception_type_id,
            exception_origin,
            first_line: frame.first_line,
        };
        let stack = self
            .stack
            .iter()
            .rev()
            .enumerate()
            .map(|(frame_no, frame)| Frame {
                frame_no: frame_no as u64,
                func_name: frame.func.clone(),
                file_name: PathBuf::from(&frame.file),
                line: frame.line,
            })
            .collect();
        let image = self.image(&state);
        self.events.push(Event::Hook(HookEvent { kind, state, image, stack }));
        self
    }

    /// Encode a state the way the runtime lays it out in memory.
    fn image(&mut self, state: &InterpreterState) -> Vec<u8> {
        let file = self.intern(&state.current_file);
        let func = self.intern(&state.current_func);
        let exception = state.exception_type.as_deref().map(|name| self.intern(name)).unwrap_or(0);

        let mut image = vec![0u8; StateField::STRUCT_SIZE];
        for field in StateField::ALL {
            let value = match field {
                StateField::CurrentFile => file,
                StateField::CurrentFunc => func,
                StateField::ExceptionType => exception,
                other => state.field_value(other).unwrap_or_default(),
            };
            let offset = field.offset() as usize;
            image[offset..offset + StateField::SLOT_SIZE].copy_from_slice(&value.to_le_bytes());
        }
        image
    }
}
