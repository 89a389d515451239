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

//! The i-list: the fixed-size array of inodes stored right after the
//! superblock.
//!
//! Ported from the reference implementation's `cofs_inode_functions.c`.
//! The single-inode-block cache that implementation keeps in a file-local
//! static lives here as a field of [`IList`], owned by the mounted
//! `FileSystem` handle instead.

use crate::block_device::BlockDevice;
use crate::error::Result;
use crate::inode::Inode;
use crate::params::{BLOCK_SIZE, INODES_PER_BLOCK, MISSING};
use crate::superblock::Superblock;

/// Block number of the first i-list block; the i-list immediately follows
/// the single superblock block.
pub const ILIST_START_BLOCK: u64 = 1;

/// Cache and cursor over the on-disk i-list.
pub struct IList {
	cached_block: Option<u64>,
	cache: [Inode; INODES_PER_BLOCK],
}

impl IList {
	/// Lays out `ilist_size` blocks of freshly numbered, free inodes.
	/// Called only by `mkfs`.
	pub fn create(dev: &mut dyn BlockDevice, ilist_size: u64) -> Result<()> {
		let mut block = [Inode::free(); INODES_PER_BLOCK];
		for iblock_num in 0..ilist_size {
			for (i, ino) in block.iter_mut().enumerate() {
				*ino = Inode::free();
				ino.inum = iblock_num * INODES_PER_BLOCK as u64 + i as u64;
			}
			write_block(dev, iblock_num + ILIST_START_BLOCK, &block)?;
		}
		Ok(())
	}

	/// Mounts an i-list with an empty (uncached) cursor.
	pub fn init() -> Self {
		Self {
			cached_block: None,
			cache: [Inode::free(); INODES_PER_BLOCK],
		}
	}

	fn ensure_cached(&mut self, dev: &dyn BlockDevice, block_index: u64) -> Result<()> {
		if self.cached_block != Some(block_index) {
			self.cache = read_block(dev, block_index)?;
			self.cached_block = Some(block_index);
		}
		Ok(())
	}

	/// Allocates the first free inode, scanning from the currently
	/// cached block onward (wrapping to the start of the i-list), and
	/// returns its inode number, or [`MISSING`] if the i-list is full.
	pub fn allocate(&mut self, dev: &mut dyn BlockDevice, sb: &mut Superblock) -> Result<u64> {
		if let Some(cached) = self.cached_block {
			if let Some(i) = self.cache.iter().position(|ino| ino.is_free()) {
				self.cache[i].in_use = 1;
				write_block(dev, cached, &self.cache)?;
				sb.free_inodes = sb.free_inodes.saturating_sub(1);
				return Ok(self.cache[i].inum);
			}
		}

		for block_index in ILIST_START_BLOCK..=sb.ilist_size {
			self.cache = read_block(dev, block_index)?;
			self.cached_block = Some(block_index);
			if let Some(i) = self.cache.iter().position(|ino| ino.is_free()) {
				self.cache[i].in_use = 1;
				write_block(dev, block_index, &self.cache)?;
				sb.free_inodes = sb.free_inodes.saturating_sub(1);
				return Ok(self.cache[i].inum);
			}
		}

		Ok(MISSING)
	}

	/// Frees the inode at `index`, zeroing it on disk apart from its
	/// inode number.
	pub fn free(&mut self, dev: &mut dyn BlockDevice, sb: &mut Superblock, index: u64) -> Result<()> {
		let (block_index, in_block) = locate(index);
		self.ensure_cached(dev, block_index)?;
		self.cache[in_block] = Inode::free();
		self.cache[in_block].inum = index;
		write_block(dev, block_index, &self.cache)?;
		sb.free_inodes += 1;
		Ok(())
	}

	/// Reads the inode at `index`.
	pub fn read(&mut self, dev: &dyn BlockDevice, index: u64) -> Result<Inode> {
		let (block_index, in_block) = locate(index);
		self.ensure_cached(dev, block_index)?;
		Ok(self.cache[in_block])
	}

	/// Writes `inode` back to its slot at `index`.
	pub fn write(&mut self, dev: &mut dyn BlockDevice, index: u64, inode: &Inode) -> Result<()> {
		let (block_index, in_block) = locate(index);
		self.ensure_cached(dev, block_index)?;
		self.cache[in_block] = *inode;
		write_block(dev, block_index, &self.cache)
	}
}

fn locate(index: u64) -> (u64, usize) {
	let block_index = index / INODES_PER_BLOCK as u64 + ILIST_START_BLOCK;
	let in_block = (index % INODES_PER_BLOCK as u64) as usize;
	(block_index, in_block)
}

fn read_block(dev: &dyn BlockDevice, block_index: u64) -> Result<[Inode; INODES_PER_BLOCK]> {
	let mut raw = [0u8; BLOCK_SIZE];
	dev.read(block_index, &mut raw)?;
	let mut out = [Inode::free(); INODES_PER_BLOCK];
	let src = unsafe {
		core::slice::from_raw_parts(raw.as_ptr() as *const Inode, INODES_PER_BLOCK)
	};
	out.copy_from_slice(src);
	Ok(out)
}

fn write_block(dev: &mut dyn BlockDevice, block_index: u64, block: &[Inode; INODES_PER_BLOCK]) -> Result<()> {
	let raw = unsafe {
		core::slice::from_raw_parts(block.as_ptr() as *const u8, BLOCK_SIZE)
	};
	dev.write(block_index, raw)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block_device::AnonDevice;
	use crate::inode::InodeType;

	#[test]
	fn allocate_then_free_recycles_slot() {
		let ilist_size = 2u64;
		let mut dev = AnonDevice::new((ilist_size + 1) * BLOCK_SIZE as u64).unwrap();
		IList::create(&mut dev, ilist_size).unwrap();
		let mut sb = Superblock::new(ilist_size, ilist_size + 1, 0, 0);
		sb.free_inodes = ilist_size * INODES_PER_BLOCK as u64;
		let mut il = IList::init();

		let a = il.allocate(&mut dev, &mut sb).unwrap();
		let b = il.allocate(&mut dev, &mut sb).unwrap();
		assert_ne!(a, b);

		il.free(&mut dev, &mut sb, a).unwrap();
		let ino = il.read(&dev, a).unwrap();
		assert!(ino.is_free());
		assert_eq!(ino.inum, a);
	}

	#[test]
	fn write_then_read_round_trips() {
		let ilist_size = 1u64;
		let mut dev = AnonDevice::new((ilist_size + 1) * BLOCK_SIZE as u64).unwrap();
		IList::create(&mut dev, ilist_size).unwrap();
		let mut il = IList::init();
		let mut ino = Inode::new(3, InodeType::File, 42, 7, crate::inode::Permissions::OWNER_R);
		ino.n_bytes = 12345;
		il.write(&mut dev, 3, &ino).unwrap();
		let back = il.read(&dev, 3).unwrap();
		assert_eq!(back.n_bytes, 12345);
		assert_eq!(back.uid, 42);
	}

	#[test]
	fn exhausted_ilist_returns_missing() {
		let ilist_size = 1u64;
		let mut dev = AnonDevice::new((ilist_size + 1) * BLOCK_SIZE as u64).unwrap();
		IList::create(&mut dev, ilist_size).unwrap();
		let mut sb = Superblock::new(ilist_size, ilist_size + 1, 0, 0);
		let mut il = IList::init();
		for _ in 0..INODES_PER_BLOCK {
			assert_ne!(il.allocate(&mut dev, &mut sb).unwrap(), MISSING);
		}
		assert_eq!(il.allocate(&mut dev, &mut sb).unwrap(), MISSING);
	}
}
