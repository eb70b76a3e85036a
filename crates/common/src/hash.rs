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

//! Non-cryptographic string hash shared with the injected runtime.
//!
//! Native breakpoint conditions cannot compare strings, so the runtime stores a
//! 64-bit hash next to every string it exposes (file name, function name,
//! exception type) and conditions compare against the hash computed here. The
//! two sides must agree bit for bit.

/// Initial hash value.
pub const HASH_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// Multiplier applied after every byte.
pub const HASH_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash a string (or raw bytes) the same way the injected runtime does.
///
/// For every byte: `h = (h ^ byte) * prime (mod 2^64)`. Strings are hashed as
/// their UTF-8 byte sequence.
pub fn simple_hash(data: impl AsRef<[u8]>) -> u64 {
    data.as_ref()
        .iter()
        .fold(HASH_OFFSET_BASIS, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(HASH_PRIME))
}
