/*
 * Copyright (c) 2026 COFS contributors
 *
 * Permission is hereby granted, free of charge, to any person obtaining a
 * copy of this software and associated documentation files (the
 * "Software"), to deal in the Software without restriction, including
 * without limitation the rights to use, copy, modify, merge, publish,
 * distribute, sublicense, and/or sell copies of the Software, and to
 * permit persons to whom the Software is furnished to do so, subject to
 * the following conditions:
 *
 * The above copyright notice and this permission notice shall be included
 * in all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
 * OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
 * MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN
 * NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
 * DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR
 * OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE
 * USE OR OTHER DEALINGS IN THE SOFTWARE.
 */

//! Open file-handle to inode-number table.
//!
//! Grounded on the reference implementation's `lookup_file_handle`/
//! `cache_file_handle`/`drop_file_handle` (`layer2.h`), which the original
//! backs with a process-wide associative map; here it's a plain
//! `HashMap` owned by the mounted `FileSystem` handle.

use std::collections::HashMap;

use crate::params::MISSING;

/// Maps host-supplied file-handle IDs (FUSE's `fh`) to the inode number
/// they were opened against.
#[derive(Debug, Default)]
pub struct HandleTable {
	table: HashMap<u64, u64>,
}

impl HandleTable {
	pub fn new() -> Self {
		Self { table: HashMap::new() }
	}

	/// Looks up the inode cached under `fhid`, or [`MISSING`] if there is
	/// no such handle.
	pub fn lookup(&self, fhid: u64) -> u64 {
		self.table.get(&fhid).copied().unwrap_or(MISSING)
	}

	/// Associates `fhid` with `inum`, overwriting any previous entry.
	pub fn insert(&mut self, fhid: u64, inum: u64) {
		self.table.insert(fhid, inum);
	}

	/// Drops `fhid` from the table.
	pub fn remove(&mut self, fhid: u64) {
		self.table.remove(&fhid);
	}

	pub fn len(&self) -> usize {
		self.table.len()
	}

	pub fn is_empty(&self) -> bool {
		self.table.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn insert_then_lookup_round_trips() {
		let mut t = HandleTable::new();
		t.insert(42, 7);
		assert_eq!(t.lookup(42), 7);
		assert_eq!(t.lookup(99), MISSING);
	}

	#[test]
	fn remove_drops_the_entry() {
		let mut t = HandleTable::new();
		t.insert(1, 2);
		t.remove(1);
		assert_eq!(t.lookup(1), MISSING);
		assert!(t.is_empty());
	}
}
