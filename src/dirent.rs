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

//! Directory entries and directory-block operations.
//!
//! Grounded on the reference implementation's `cofs_directories.c`. The
//! original keeps its single-block directory-entry cache as a file-local
//! static (`block_cache`/`cached_idx`); here it's [`DirCache`], owned by
//! the mounted `FileSystem` handle. Unlike the original, inode-refcount
//! bookkeeping for a removed entry's target is left to the caller (see
//! `fs.rs`), since that requires the i-list, which this module does not
//! otherwise need.

use crate::block_device::BlockDevice;
use crate::blocktree::{alloc_new_datablock, for_each_datablock};
use crate::error::{Error, Result};
use crate::freelist::FreeList;
use crate::inode::{Inode, InodeType};
use crate::params::{BLOCK_SIZE, DIRENTRIES_PER_BLOCK, DIRENT_SIZE, MAX_BASENAME, MISSING};
use crate::superblock::Superblock;

/// One directory entry: a nul-padded base name plus the inode it names.
/// An all-zero `base_name[0]` marks the slot unused.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
	base_name: [u8; MAX_BASENAME],
	pub inum: u64,
}

static_assertions::const_assert_eq!(core::mem::size_of::<DirEntry>(), DIRENT_SIZE);

impl DirEntry {
	fn empty() -> Self {
		Self {
			base_name: [0u8; MAX_BASENAME],
			inum: 0,
		}
	}

	pub fn is_used(&self) -> bool {
		self.base_name[0] != 0
	}

	pub fn name(&self) -> &[u8] {
		let len = self.base_name.iter().position(|&b| b == 0).unwrap_or(self.base_name.len());
		&self.base_name[..len]
	}

	fn set_name(&mut self, name: &[u8]) -> Result<()> {
		if name.len() + 1 > MAX_BASENAME {
			return Err(Error::NameTooLong);
		}
		self.base_name = [0u8; MAX_BASENAME];
		self.base_name[..name.len()].copy_from_slice(name);
		Ok(())
	}
}

type DirBlock = [DirEntry; DIRENTRIES_PER_BLOCK];

fn empty_dirblock() -> DirBlock {
	[DirEntry::empty(); DIRENTRIES_PER_BLOCK]
}

fn read_dirblock(dev: &dyn BlockDevice, bnum: u64) -> Result<DirBlock> {
	let mut raw = [0u8; BLOCK_SIZE];
	dev.read(bnum, &mut raw)?;
	let mut out = empty_dirblock();
	let src = unsafe { core::slice::from_raw_parts(raw.as_ptr() as *const DirEntry, DIRENTRIES_PER_BLOCK) };
	out.copy_from_slice(src);
	Ok(out)
}

fn write_dirblock(dev: &mut dyn BlockDevice, bnum: u64, block: &DirBlock) -> Result<()> {
	let raw = unsafe { core::slice::from_raw_parts(block.as_ptr() as *const u8, BLOCK_SIZE) };
	dev.write(bnum, raw)
}

/// Single-block cache over the directory currently being searched/edited.
pub struct DirCache {
	cached_block: Option<u64>,
	cache: DirBlock,
}

impl DirCache {
	pub fn new() -> Self {
		Self {
			cached_block: None,
			cache: empty_dirblock(),
		}
	}

	fn load(&mut self, dev: &dyn BlockDevice, bnum: u64) -> Result<()> {
		if self.cached_block != Some(bnum) {
			self.cache = read_dirblock(dev, bnum)?;
			self.cached_block = Some(bnum);
		}
		Ok(())
	}

	/// Finds the first unused directory-entry slot, allocating a new
	/// data block for `dir` if every existing block is full.
	fn get_next_unused(&mut self, dev: &mut dyn BlockDevice, freelist: &mut FreeList, sb: &mut Superblock, dir: &mut Inode) -> Result<usize> {
		let mut found: Option<(u64, usize)> = None;
		for_each_datablock(dev, dir, 0, true, |blk| {
			let block = read_dirblock(dev, blk)?;
			if let Some(i) = block.iter().position(|e| !e.is_used()) {
				found = Some((blk, i));
				Ok(false)
			} else {
				Ok(true)
			}
		})?;

		if let Some((blk, i)) = found {
			self.load(dev, blk)?;
			return Ok(i);
		}

		let block = alloc_new_datablock(dev, freelist, sb, dir)?;
		dir.n_bytes += BLOCK_SIZE as u64;
		self.cache = empty_dirblock();
		self.cached_block = Some(block);
		Ok(0)
	}

	/// Appends `name` -> `inum` to `dir`, allocating a new directory
	/// block if none has room. Updates `dir`'s mtime/ctime and entry
	/// count; the caller still owns writing `dir` back to the i-list.
	pub fn add_entry(
		&mut self,
		dev: &mut dyn BlockDevice,
		freelist: &mut FreeList,
		sb: &mut Superblock,
		dir: &mut Inode,
		name: &[u8],
		inum: u64,
	) -> Result<()> {
		let slot = self.get_next_unused(dev, freelist, sb, dir)?;
		self.cache[slot].set_name(name)?;
		self.cache[slot].inum = inum;
		let bnum = self.cached_block.expect("loaded by get_next_unused");
		write_dirblock(dev, bnum, &self.cache)?;

		dir.num_direntries += 1;
		dir.update_mtime();
		dir.update_ctime();
		Ok(())
	}

	/// Populates a freshly allocated directory inode with `.`/`..`
	/// entries and bumps both inodes' link counts, matching
	/// `Dir_create`. The caller persists both inodes afterward.
	pub fn create_dir(
		&mut self,
		dev: &mut dyn BlockDevice,
		freelist: &mut FreeList,
		sb: &mut Superblock,
		dir: &mut Inode,
		parent: &mut Inode,
	) -> Result<()> {
		dir.num_direntries = 0;
		dir.in_use = 1;
		dir.set_file_type(InodeType::Dir);

		self.add_entry(dev, freelist, sb, dir, b".", dir.inum)?;
		self.add_entry(dev, freelist, sb, dir, b"..", parent.inum)?;

		parent.refcount += 1;
		dir.refcount += 1;
		Ok(())
	}

	/// Looks up `name` in `dir`, returning its inode number, or
	/// [`Error::NotFound`] if `dir` has no such entry.
	pub fn lookup(&mut self, dev: &dyn BlockDevice, dir: &Inode, name: &[u8]) -> Result<u64> {
		let mut found = MISSING;
		let mut remaining = dir.num_direntries;
		for_each_datablock(dev, dir, 0, true, |blk| {
			self.load(dev, blk)?;
			for entry in self.cache.iter() {
				if entry.is_used() && entry.name() == name {
					found = entry.inum;
					return Ok(false);
				}
				if entry.is_used() {
					remaining = remaining.saturating_sub(1);
				}
			}
			Ok(remaining > 0)
		})?;

		if found == MISSING {
			Err(Error::NotFound(String::from_utf8_lossy(name).into_owned()))
		} else {
			Ok(found)
		}
	}

	/// Removes `name` from `dir`, returning the inode number it pointed
	/// to. Leaves decrementing that inode's refcount (and any resulting
	/// deallocation) to the caller, which has access to the i-list.
	pub fn remove_entry(&mut self, dev: &mut dyn BlockDevice, dir: &mut Inode, name: &[u8]) -> Result<u64> {
		let mut found = MISSING;
		let mut target_block = None;
		let mut target_slot = 0usize;
		for_each_datablock(dev, dir, 0, true, |blk| {
			self.load(dev, blk)?;
			if let Some(i) = self.cache.iter().position(|e| e.is_used() && e.name() == name) {
				found = self.cache[i].inum;
				target_block = Some(blk);
				target_slot = i;
				return Ok(false);
			}
			Ok(true)
		})?;

		let (blk, slot) = match (target_block, found) {
			(Some(b), f) if f != MISSING => (b, target_slot),
			_ => return Err(Error::NotFound(String::from_utf8_lossy(name).into_owned())),
		};

		self.load(dev, blk)?;
		self.cache[slot] = DirEntry::empty();
		write_dirblock(dev, blk, &self.cache)?;

		dir.n_bytes = dir.n_bytes.saturating_sub(DIRENT_SIZE as u64);
		dir.num_direntries = dir.num_direntries.saturating_sub(1);
		dir.update_mtime();
		dir.update_ctime();

		Ok(found)
	}

	/// Lists every used entry in `dir` as `(name, inum)` pairs, in
	/// on-disk order. Used by `readdir`.
	pub fn list(&mut self, dev: &dyn BlockDevice, dir: &Inode) -> Result<Vec<(Vec<u8>, u64)>> {
		let mut out = Vec::with_capacity(dir.num_direntries as usize);
		for_each_datablock(dev, dir, 0, false, |blk| {
			self.load(dev, blk)?;
			for entry in self.cache.iter() {
				if entry.is_used() {
					out.push((entry.name().to_vec(), entry.inum));
				}
			}
			Ok(true)
		})?;
		Ok(out)
	}
}

impl Default for DirCache {
	fn default() -> Self {
		Self::new()
	}
}

/// Builds the raw bytes of a freshly allocated directory's first data
/// block, pre-populated with `.` and `..` both pointing at `root_inum`.
/// Used only by `mkfs` to seed the root directory, which (unlike every
/// other directory) has no parent to link from and so cannot go through
/// [`DirCache::create_dir`].
pub fn root_block(root_inum: u64) -> [u8; BLOCK_SIZE] {
	let mut block = empty_dirblock();
	block[0].set_name(b".").expect(". fits in a base name");
	block[0].inum = root_inum;
	block[1].set_name(b"..").expect(".. fits in a base name");
	block[1].inum = root_inum;

	let mut out = [0u8; BLOCK_SIZE];
	let raw = unsafe { core::slice::from_raw_parts(block.as_ptr() as *const u8, BLOCK_SIZE) };
	out.copy_from_slice(raw);
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block_device::AnonDevice;
	use crate::params::DIRENTRIES_PER_BLOCK;

	fn setup(n_blocks: u64, ilist_size: u64) -> (AnonDevice, Superblock, FreeList) {
		let mut dev = AnonDevice::new(n_blocks * BLOCK_SIZE as u64).unwrap();
		let head = ilist_size + 1;
		let n_data_blocks = n_blocks - head;
		FreeList::create(&mut dev, n_data_blocks, head, n_blocks).unwrap();
		let mut sb = Superblock::new(ilist_size, n_blocks, head, 0);
		sb.free_blocks = n_data_blocks;
		let fl = FreeList::init(&dev, head).unwrap();
		(dev, sb, fl)
	}

	#[test]
	fn create_dir_adds_dot_and_dotdot() {
		let (mut dev, mut sb, mut fl) = setup(40, 2);
		let mut cache = DirCache::new();
		let mut root = Inode::new(1, InodeType::Dir, 0, 0, crate::inode::Permissions::empty());
		let mut dir = Inode::new(2, InodeType::Dir, 0, 0, crate::inode::Permissions::empty());
		cache.create_dir(&mut dev, &mut fl, &mut sb, &mut dir, &mut root).unwrap();

		assert_eq!(cache.lookup(&dev, &dir, b".").unwrap(), 2);
		assert_eq!(cache.lookup(&dev, &dir, b"..").unwrap(), 1);
		assert_eq!(root.refcount, 2);
		assert_eq!(dir.refcount, 2);
	}

	#[test]
	fn lookup_missing_entry_fails() {
		let (dev, _sb, _fl) = setup(40, 2);
		let mut cache = DirCache::new();
		let dir = Inode::new(2, InodeType::Dir, 0, 0, crate::inode::Permissions::empty());
		assert!(matches!(cache.lookup(&dev, &dir, b"nope"), Err(Error::NotFound(_))));
	}

	#[test]
	fn add_entry_spills_into_a_second_block_past_threshold() {
		let (mut dev, mut sb, mut fl) = setup(40, 2);
		let mut cache = DirCache::new();
		let mut dir = Inode::new(2, InodeType::Dir, 0, 0, crate::inode::Permissions::empty());
		for i in 0..(DIRENTRIES_PER_BLOCK + 1) {
			let name = format!("f{i}");
			cache
				.add_entry(&mut dev, &mut fl, &mut sb, &mut dir, name.as_bytes(), 100 + i as u64)
				.unwrap();
		}
		assert_eq!(dir.num_direntries, (DIRENTRIES_PER_BLOCK + 1) as u64);
		assert_eq!(dir.direct()[1] != 0, true);
	}

	#[test]
	fn remove_entry_frees_the_slot() {
		let (mut dev, mut sb, mut fl) = setup(40, 2);
		let mut cache = DirCache::new();
		let mut dir = Inode::new(2, InodeType::Dir, 0, 0, crate::inode::Permissions::empty());
		cache.add_entry(&mut dev, &mut fl, &mut sb, &mut dir, b"foo", 55).unwrap();
		let removed = cache.remove_entry(&mut dev, &mut dir, b"foo").unwrap();
		assert_eq!(removed, 55);
		assert!(matches!(cache.lookup(&dev, &dir, b"foo"), Err(Error::NotFound(_))));
		assert_eq!(dir.num_direntries, 0);
	}
}
