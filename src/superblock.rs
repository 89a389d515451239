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

//! The filesystem superblock: block 0 of every COFS volume.
//!
//! Mirrors the reference implementation's `cofs_superblock`/`sblock_incore`
//! and `update_superblock`, adapted so the in-core copy lives inside the
//! `FileSystem` handle rather than a process-wide global (see DESIGN.md for
//! the rationale).

use static_assertions::const_assert_eq;

use crate::block_device::BlockDevice;
use crate::error::Result;
use crate::params::BLOCK_SIZE;

/// Block number the superblock always occupies.
pub const SUPERBLOCK_BLOCK: u64 = 0;

/// The on-disk superblock. Occupies exactly one block; the remainder past
/// its named fields is reserved padding, matching the original's
/// block-aligned layout.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
	/// Number of blocks devoted to the i-list.
	pub ilist_size: u64,
	/// Total number of blocks in the volume, including this one.
	pub n_blocks: u64,
	/// Head of the free data-block list.
	pub flist_head: u64,
	/// Inode number of the root directory.
	pub root_dir: u64,
	/// Advisory count of free data blocks, refreshed as blocks are
	/// allocated and released. Not authoritative; `fsck` recomputes it.
	pub free_blocks: u64,
	/// Advisory count of free inodes.
	pub free_inodes: u64,
	_reserved: [u8; BLOCK_SIZE - 6 * core::mem::size_of::<u64>()],
}

const_assert_eq!(core::mem::size_of::<Superblock>(), BLOCK_SIZE);

impl Superblock {
	/// Builds a fresh superblock for a freshly formatted volume.
	pub fn new(ilist_size: u64, n_blocks: u64, flist_head: u64, root_dir: u64) -> Self {
		Self {
			ilist_size,
			n_blocks,
			flist_head,
			root_dir,
			free_blocks: 0,
			free_inodes: 0,
			_reserved: [0u8; BLOCK_SIZE - 6 * core::mem::size_of::<u64>()],
		}
	}

	/// Reads the superblock from block 0 of `dev`.
	pub fn read(dev: &dyn BlockDevice) -> Result<Self> {
		unsafe { dev.read_struct(SUPERBLOCK_BLOCK * BLOCK_SIZE as u64) }
	}

	/// Writes this superblock back to block 0 of `dev`. Mirrors
	/// `update_superblock`.
	pub fn write(&self, dev: &mut dyn BlockDevice) -> Result<()> {
		dev.write_struct(SUPERBLOCK_BLOCK * BLOCK_SIZE as u64, self)
	}

	/// Size of a block, in bytes. Exposed for `statfs`-style callers.
	pub fn block_size(&self) -> u64 {
		BLOCK_SIZE as u64
	}

	/// Total number of blocks in the volume.
	pub fn total_blocks(&self) -> u64 {
		self.n_blocks
	}

	/// Advisory free-block count.
	pub fn free_blocks(&self) -> u64 {
		self.free_blocks
	}

	/// Advisory free-inode count.
	pub fn free_inodes(&self) -> u64 {
		self.free_inodes
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block_device::AnonDevice;

	#[test]
	fn size_is_one_block() {
		assert_eq!(core::mem::size_of::<Superblock>(), BLOCK_SIZE);
	}

	#[test]
	fn round_trips_through_a_device() {
		let mut dev = AnonDevice::new(BLOCK_SIZE as u64 * 4).unwrap();
		let sb = Superblock::new(1, 4, 2, 1);
		sb.write(&mut dev).unwrap();
		let back = Superblock::read(&dev).unwrap();
		assert_eq!(back.ilist_size, 1);
		assert_eq!(back.n_blocks, 4);
		assert_eq!(back.flist_head, 2);
		assert_eq!(back.root_dir, 1);
	}
}
