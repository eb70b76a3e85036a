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


//! Interpreter objects living in the simulated heap.
//!
//! Every object starts with a tag slot. Containers keep their elements in a
//! separately allocated array reached through a pointer slot, so replacing
//! that pointer moves every element at once.
//!
//! | tag | layout |
//! |-----|--------|
//! | int | `[tag, value]` |
//! | str | `[tag, bytes_ptr, len]` |
//! | list | `[tag, items_ptr, len]`, items are object pointers |
//! | object | `[tag, dict_ptr]` |
//! | dict | `[tag, entries_ptr, len]`, entries are `(key str, value)` pointer pairs |

use revdb_engine::{Address, LinkAddresses, TargetResult, WatchStep};

use crate::memory::Memory;

const TAG_INT: u64 = 1;
const TAG_STR: u64 = 2;
const TAG_LIST: u64 = 3;
const TAG_OBJECT: u64 = 4;
const TAG_DICT: u64 = 5;

const MAX_REPR_DEPTH: usize = 8;

/// Bump allocator writing objects into a memory image.
#[derive(Debug)]
pub struct HeapWriter {
    next: Address,
    end: Address,
}

impl HeapWriter {
    /// Allocate within `[start, end)`.
    pub fn new(start: Address, end: Address) -> Self {
        Self { next: start, end }
    }

    /// Reserve `size` zeroed bytes, 8-byte aligned.
    pub fn alloc(&mut self, size: usize) -> Address {
        let addr = self.next;
        self.next = (self.next + size.max(8) as u64 + 7) & !7;
        assert!(self.next <= self.end, "simulated heap exhausted");
        addr
    }

    fn slots(&mut self, memory: &mut Memory, values: &[u64]) -> Address {
        let addr = self.alloc(values.len() * 8);
        for (i, value) in values.iter().enumerate() {
            memory.write_u64(addr + 8 * i as u64, *value).expect("heap is mapped");
        }
        addr
    }

    /// Allocate an int.
    pub fn int(&mut self, memory: &mut Memory, value: i64) -> Address {
        self.slots(memory, &[TAG_INT, value as u64])
    }

    /// Allocate a str whose bytes live at `bytes`.
    pub fn str(&mut self, memory: &mut Memory, bytes: Address, len: usize) -> Address {
        self.slots(memory, &[TAG_STR, bytes, len as u64])
    }

    /// Allocate a list.
    pub fn list(&mut self, memory: &mut Memory, items: &[Address]) -> Address {
        let array = self.slots(memory, items);
        self.slots(memory, &[TAG_LIST, array, items.len() as u64])
    }

    /// Allocate a dict with str keys (given as str objects).
    pub fn dict(&mut self, memory: &mut Memory, entries: &[(Address, Address)]) -> Address {
        let flat: Vec<u64> = entries.iter().flat_map(|(key, value)| [*key, *value]).collect();
        let array = self.slots(memory, &flat);
        self.slots(memory, &[TAG_DICT, array, entries.len() as u64])
    }

    /// Allocate an instance whose attributes live in `dict`.
    pub fn object(&mut self, memory: &mut Memory, dict: Address) -> Address {
        self.slots(memory, &[TAG_OBJECT, dict])
    }
}

/// A failed lookup, rendered like the interpreter's exception.
pub type LookupResult<T> = Result<T, String>;

fn type_name(memory: &Memory, obj: Address) -> TargetResult<&'static str> {
    Ok(match memory.read_u64(obj)? {
        TAG_INT => "int",
        TAG_STR => "str",
        TAG_LIST => "list",
        TAG_OBJECT => "object",
        TAG_DICT => "dict",
        _ => "unknown",
    })
}

fn str_value(memory: &Memory, obj: Address) -> TargetResult<String> {
    let bytes = memory.read(memory.read_u64(obj + 8)?, memory.read_u64(obj + 16)? as usize)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Slot holding the value of `key` in a dict.
fn dict_slot(memory: &Memory, dict: Address, key: &str) -> TargetResult<Option<Address>> {
    let entries = memory.read_u64(dict + 8)?;
    let len = memory.read_u64(dict + 16)?;
    for i in 0..len {
        let entry = entries + 16 * i;
        if str_value(memory, memory.read_u64(entry)?)? == key {
            return Ok(Some(entry + 8));
        }
    }
    Ok(None)
}

/// Slot of attribute `name` of an instance.
pub fn attr_slot(memory: &Memory, obj: Address, name: &str) -> TargetResult<Option<Address>> {
    if memory.read_u64(obj)? != TAG_OBJECT {
        return Ok(None);
    }
    dict_slot(memory, memory.read_u64(obj + 8)?, name)
}

/// Slot of element `index` of a list, negative indices counting from the end.
pub fn item_slot(memory: &Memory, list: Address, index: i64) -> TargetResult<Option<Address>> {
    if memory.read_u64(list)? != TAG_LIST {
        return Ok(None);
    }
    let len = memory.read_u64(list + 16)? as i64;
    let index = if index < 0 { index + len } else { index };
    if !(0..len).contains(&index) {
        return Ok(None);
    }
    Ok(Some(memory.read_u64(list + 8)? + 8 * index as u64))
}

/// `repr()` of an object.
pub fn repr(memory: &Memory, obj: Address) -> TargetResult<String> {
    repr_at_depth(memory, obj, 0)
}

fn repr_at_depth(memory: &Memory, obj: Address, depth: usize) -> TargetResult<String> {
    if depth > MAX_REPR_DEPTH {
        return Ok("...".to_string());
    }
    Ok(match memory.read_u64(obj)? {
        TAG_INT => (memory.read_u64(obj + 8)? as i64).to_string(),
        TAG_STR => format!("'{}'", str_value(memory, obj)?),
        TAG_LIST => {
            let items = memory.read_u64(obj + 8)?;
            let len = memory.read_u64(obj + 16)?;
            let parts = (0..len)
                .map(|i| repr_at_depth(memory, memory.read_u64(items + 8 * i)?, depth + 1))
                .collect::<TargetResult<Vec<_>>>()?;
            format!("[{}]", parts.join(", "))
        }
        TAG_DICT => {
            let entries = memory.read_u64(obj + 8)?;
            let len = memory.read_u64(obj + 16)?;
            let parts = (0..len)
                .map(|i| {
                    let entry = entries + 16 * i;
                    Ok(format!(
                        "{}: {}",
                        repr_at_depth(memory, memory.read_u64(entry)?, depth + 1)?,
                        repr_at_depth(memory, memory.read_u64(entry + 8)?, depth + 1)?
                    ))
                })
                .collect::<TargetResult<Vec<_>>>()?;
            format!("{{{}}}", parts.join(", "))
        }
        TAG_OBJECT => format!("<object at {obj:#x}>"),
        _ => format!("<unknown at {obj:#x}>"),
    })
}

/// Walk a chain of steps starting from the locals table `lookup`.
///
/// Returns the addresses of every link and the object the chain ends on.
pub fn walk(
    memory: &Memory,
    lookup: impl Fn(&str) -> Option<Address>,
    steps: &[WatchStep],
) -> TargetResult<LookupResult<(Vec<LinkAddresses>, Address)>> {
    let mut links = Vec::with_capacity(steps.len());
    let mut current: Option<Address> = None;

    for step in steps {
        let (storage, guard) = match (step, current) {
            (WatchStep::Name { name }, _) => {
                let Some(slot) = lookup(name).filter(|slot| memory.read_u64(*slot).unwrap_or(0) != 0)
                else {
                    return Ok(Err(format!("NameError: name '{name}' is not defined")));
                };
                (slot, None)
            }
            (WatchStep::Attr { name }, Some(obj)) => match attr_slot(memory, obj, name)? {
                Some(slot) => (slot, Some(memory.read_u64(obj + 8)? + 8)),
                None => {
                    return Ok(Err(format!(
                        "AttributeError: '{}' object has no attribute '{name}'",
                        type_name(memory, obj)?
                    )))
                }
            },
            (WatchStep::Index { index }, Some(obj)) => match memory.read_u64(obj)? {
                TAG_LIST => match item_slot(memory, obj, *index)? {
                    Some(slot) => (slot, Some(obj + 8)),
                    None => return Ok(Err("IndexError: list index out of range".to_string())),
                },
                _ => {
                    return Ok(Err(format!(
                        "TypeError: '{}' object is not subscriptable",
                        type_name(memory, obj)?
                    )))
                }
            },
            (WatchStep::Key { key }, Some(obj)) => match memory.read_u64(obj)? {
                TAG_DICT => match dict_slot(memory, obj, key)? {
                    Some(slot) => (slot, Some(obj + 8)),
                    None => return Ok(Err(format!("KeyError: '{key}'"))),
                },
                _ => {
                    return Ok(Err(format!(
                        "TypeError: '{}' object is not subscriptable",
                        type_name(memory, obj)?
                    )))
                }
            },
            (_, None) => return Ok(Err("SyntaxError: expression must start with a name".to_string())),
        };
        links.push(LinkAddresses { storage_addr: Some(storage), guard_addr: guard });
        current = Some(memory.read_u64(storage)?);
    }

    match current {
        Some(obj) => Ok(Ok((links, obj))),
        None => Ok(Err("SyntaxError: empty expression".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{HEAP_BASE, HEAP_SIZE, STRING_BASE};

    fn key(heap: &mut HeapWriter, memory: &mut Memory, at: Address, text: &str) -> Address {
        memory.write(at, text.as_bytes()).unwrap();
        heap.str(memory, at, text.len())
    }

    #[test]
    fn test_repr_and_walk() {
        let mut memory = Memory::default();
        let mut heap = HeapWriter::new(HEAP_BASE, HEAP_BASE + HEAP_SIZE as u64);
        let one = heap.int(&mut memory, 1);
        let two = heap.int(&mut memory, -2);
        let list = heap.list(&mut memory, &[one, two]);
        let b = key(&mut heap, &mut memory, STRING_BASE, "b");
        let dict = heap.dict(&mut memory, &[(b, list)]);
        let obj = heap.object(&mut memory, dict);
        let local = heap.alloc(8);
        memory.write_u64(local, obj).unwrap();

        assert_eq!(repr(&memory, list).unwrap(), "[1, -2]");
        assert_eq!(repr(&memory, dict).unwrap(), "{'b': [1, -2]}");

        let steps = revdb_engine::parse_watch_expression("a.b[-1]").unwrap();
        let lookup = |name: &str| (name == "a").then_some(local);
        let (links, value) = walk(&memory, lookup, &steps).unwrap().unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].storage_addr, Some(local));
        assert_eq!(links[2].guard_addr, Some(list + 8));
        assert_eq!(repr(&memory, value).unwrap(), "-2");

        let missing = revdb_engine::parse_watch_expression("a.c").unwrap();
        assert_eq!(
            walk(&memory, lookup, &missing).unwrap().unwrap_err(),
            "AttributeError: 'object' object has no attribute 'c'"
        );
        let unbound = revdb_engine::parse_watch_expression("z").unwrap();
        assert!(walk(&memory, lookup, &unbound).unwrap().unwrap_err().starts_with("NameError"));
    }
}
