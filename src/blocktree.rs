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

//! The block-reference tree: direct/1-indirect/2-indirect/3-indirect
//! addressing of a file's or directory's data blocks.
//!
//! Grounded on the reference implementation's `cofs_datablocks.c`. That
//! implementation hand-unrolls one function per indirection level
//! (`__alloc_1indirect`, `__alloc_2indirect`, `__alloc_3indirect`,
//! `foreach_1indirect_block`, ...); here each family collapses into a
//! single function parametrized by depth, since all four levels share one
//! shape once the depth is a value instead of a name.

use crate::block_device::BlockDevice;
use crate::error::{Error, Result};
use crate::freelist::FreeList;
use crate::inode::Inode;
use crate::params::{BLOCK_SIZE, N_DIRECT, N_INDIRECT1, N_INDIRECT2, N_INDIRECT3, NONE_REF, REFS_PER_INDIRECT};
use crate::superblock::Superblock;

const REFS: usize = REFS_PER_INDIRECT as usize;

fn read_refs_block(dev: &dyn BlockDevice, bnum: u64) -> Result<[u64; REFS]> {
	let mut raw = [0u8; BLOCK_SIZE];
	dev.read(bnum, &mut raw)?;
	let mut out = [0u64; REFS];
	let src = unsafe { core::slice::from_raw_parts(raw.as_ptr() as *const u64, REFS) };
	out.copy_from_slice(src);
	Ok(out)
}

fn write_refs_block(dev: &mut dyn BlockDevice, bnum: u64, refs: &[u64; REFS]) -> Result<()> {
	let raw = unsafe { core::slice::from_raw_parts(refs.as_ptr() as *const u8, BLOCK_SIZE) };
	dev.write(bnum, raw)
}

/// Calls `visit(block_number)` on every data block an inode owns, in file
/// order, starting at `start_block`. If `stop_on_false` is set, stops as
/// soon as `visit` returns `Ok(false)`. Returns whether every call
/// returned `true` (vacuously `true` if none were made).
///
/// Symlinks store their target inline and never populate any of these
/// slots, so they contribute nothing to the walk.
pub fn for_each_datablock(
	dev: &dyn BlockDevice,
	inode: &Inode,
	start_block: u64,
	stop_on_false: bool,
	mut visit: impl FnMut(u64) -> Result<bool>,
) -> Result<bool> {
	if inode.is_symlink() {
		return Ok(true);
	}

	let mut curr = 0u64;
	let mut ok = true;

	ok = walk_level(dev, inode.direct(), 0, &mut curr, start_block, stop_on_false, &mut visit)? && ok;
	if stop_on_false && !ok {
		return Ok(false);
	}
	ok = walk_level(dev, inode.indirect1(), 1, &mut curr, start_block, stop_on_false, &mut visit)? && ok;
	if stop_on_false && !ok {
		return Ok(false);
	}
	ok = walk_level(dev, inode.indirect2(), 2, &mut curr, start_block, stop_on_false, &mut visit)? && ok;
	if stop_on_false && !ok {
		return Ok(false);
	}
	ok = walk_level(dev, inode.indirect3(), 3, &mut curr, start_block, stop_on_false, &mut visit)? && ok;
	Ok(ok)
}

/// `refs` holds references one level of indirection above leaf data
/// blocks when `depth == 0` (i.e. its entries ARE leaf data blocks), or
/// pointers to blocks whose own content is `depth - 1` otherwise.
fn walk_level(
	dev: &dyn BlockDevice,
	refs: &[u64],
	depth: u32,
	curr: &mut u64,
	start_block: u64,
	stop_on_false: bool,
	visit: &mut impl FnMut(u64) -> Result<bool>,
) -> Result<bool> {
	let mut ok = true;
	for &r in refs {
		if r == 0 {
			return Ok(ok);
		}
		if depth == 0 {
			if *curr >= start_block {
				ok = visit(r)? && ok;
			}
			*curr += 1;
		} else {
			let child = read_refs_block(dev, r)?;
			ok = walk_level(dev, &child, depth - 1, curr, start_block, stop_on_false, visit)? && ok;
		}
		if stop_on_false && !ok {
			return Ok(false);
		}
	}
	Ok(ok)
}

/// Like [`for_each_datablock`], but threads a mutable device handle
/// through to `visit` instead of letting it capture one, so callers that
/// need to write each block as they walk it (see `file_io::write`) don't
/// have to alias `dev` between the walk and the closure.
pub fn for_each_datablock_mut(
	dev: &mut dyn BlockDevice,
	inode: &Inode,
	start_block: u64,
	stop_on_false: bool,
	mut visit: impl FnMut(&mut dyn BlockDevice, u64) -> Result<bool>,
) -> Result<bool> {
	if inode.is_symlink() {
		return Ok(true);
	}

	let mut curr = 0u64;
	let mut ok = true;

	ok = walk_level_mut(dev, inode.direct(), 0, &mut curr, start_block, stop_on_false, &mut visit)? && ok;
	if stop_on_false && !ok {
		return Ok(false);
	}
	ok = walk_level_mut(dev, inode.indirect1(), 1, &mut curr, start_block, stop_on_false, &mut visit)? && ok;
	if stop_on_false && !ok {
		return Ok(false);
	}
	ok = walk_level_mut(dev, inode.indirect2(), 2, &mut curr, start_block, stop_on_false, &mut visit)? && ok;
	if stop_on_false && !ok {
		return Ok(false);
	}
	ok = walk_level_mut(dev, inode.indirect3(), 3, &mut curr, start_block, stop_on_false, &mut visit)? && ok;
	Ok(ok)
}

fn walk_level_mut(
	dev: &mut dyn BlockDevice,
	refs: &[u64],
	depth: u32,
	curr: &mut u64,
	start_block: u64,
	stop_on_false: bool,
	visit: &mut impl FnMut(&mut dyn BlockDevice, u64) -> Result<bool>,
) -> Result<bool> {
	let mut ok = true;
	for &r in refs {
		if r == 0 {
			return Ok(ok);
		}
		if depth == 0 {
			if *curr >= start_block {
				ok = visit(dev, r)? && ok;
			}
			*curr += 1;
		} else {
			let child = read_refs_block(dev, r)?;
			ok = walk_level_mut(dev, &child, depth - 1, curr, start_block, stop_on_false, visit)? && ok;
		}
		if stop_on_false && !ok {
			return Ok(false);
		}
	}
	Ok(ok)
}

fn alloc_direct(dev: &mut dyn BlockDevice, freelist: &mut FreeList, sb: &mut Superblock, blocks: &mut [u64]) -> Result<u64> {
	let block = freelist.pop(dev, sb)?;
	if block == NONE_REF {
		return Ok(NONE_REF);
	}
	match blocks.iter().position(|&b| b == 0) {
		Some(slot) => {
			blocks[slot] = block;
			Ok(block)
		}
		None => {
			freelist.append(dev, sb, block)?;
			Ok(NONE_REF)
		}
	}
}

/// Allocates one new data block somewhere within `blocks` (a top-level
/// indirect field holding pointers whose content has `depth - 1` further
/// levels of indirection), given that `my_blocks` data blocks already
/// exist within this field's subtree. Returns the allocated block's
/// number, or [`NONE_REF`] if the free list or this subtree is exhausted.
fn alloc_level(
	dev: &mut dyn BlockDevice,
	freelist: &mut FreeList,
	sb: &mut Superblock,
	blocks: &mut [u64],
	depth: u32,
	my_blocks: u64,
) -> Result<u64> {
	if depth == 0 {
		return alloc_direct(dev, freelist, sb, blocks);
	}

	let capacity = REFS_PER_INDIRECT.pow(depth);
	let which_slot = (my_blocks / capacity) as usize;
	if which_slot >= blocks.len() {
		return Ok(NONE_REF);
	}
	let remainder = my_blocks % capacity;

	let mut child = [0u64; REFS];
	let target;
	let mut cleanup_new = false;
	if remainder == 0 {
		target = freelist.pop(dev, sb)?;
		if target == NONE_REF {
			return Ok(NONE_REF);
		}
		blocks[which_slot] = target;
		cleanup_new = true;
	} else {
		target = blocks[which_slot];
		child = read_refs_block(dev, target)?;
	}

	let result = alloc_level(dev, freelist, sb, &mut child, depth - 1, remainder)?;
	if result != NONE_REF {
		write_refs_block(dev, target, &child)?;
	} else if cleanup_new {
		blocks[which_slot] = 0;
		freelist.append(dev, sb, target)?;
	}
	Ok(result)
}

/// Grows `inode` by one data block, updating its block-reference tree and
/// `n_blocks`. Does not write `inode` back to the i-list; the caller owns
/// that (see `file_io`).
pub fn alloc_new_datablock(
	dev: &mut dyn BlockDevice,
	freelist: &mut FreeList,
	sb: &mut Superblock,
	inode: &mut Inode,
) -> Result<u64> {
	let n = inode.n_blocks;
	let direct_cap = N_DIRECT as u64;
	let ind1_cap = direct_cap + N_INDIRECT1 as u64 * REFS_PER_INDIRECT;
	let ind2_cap = ind1_cap + N_INDIRECT2 as u64 * REFS_PER_INDIRECT * REFS_PER_INDIRECT;
	let ind3_cap = ind2_cap + N_INDIRECT3 as u64 * REFS_PER_INDIRECT * REFS_PER_INDIRECT * REFS_PER_INDIRECT;

	let result = if n < direct_cap {
		alloc_direct(dev, freelist, sb, inode.direct_mut())?
	} else if n < ind1_cap {
		alloc_level(dev, freelist, sb, inode.indirect1_mut(), 1, n - direct_cap)?
	} else if n < ind2_cap {
		alloc_level(dev, freelist, sb, inode.indirect2_mut(), 2, n - ind1_cap)?
	} else if n < ind3_cap {
		alloc_level(dev, freelist, sb, inode.indirect3_mut(), 3, n - ind2_cap)?
	} else {
		return Err(Error::FileTooBig);
	};

	if result == NONE_REF {
		return Err(Error::NoSpace);
	}
	inode.n_blocks += 1;
	Ok(result)
}

/// The block number of the last data block belonging to `inode`, or
/// [`NONE_REF`] if it owns none.
pub fn get_last_datablock(dev: &dyn BlockDevice, inode: &Inode) -> Result<u64> {
	let mut last = NONE_REF;
	for_each_datablock(dev, inode, 0, false, |b| {
		last = b;
		Ok(true)
	})?;
	Ok(last)
}

fn release_direct(dev: &mut dyn BlockDevice, freelist: &mut FreeList, sb: &mut Superblock, blocks: &mut [u64], start: u64, pos: &mut u64) -> Result<()> {
	for slot in blocks.iter_mut() {
		if *slot == 0 {
			break;
		}
		if *pos >= start {
			freelist.append(dev, sb, *slot)?;
			*slot = 0;
		}
		*pos += 1;
	}
	Ok(())
}

fn release_level(
	dev: &mut dyn BlockDevice,
	freelist: &mut FreeList,
	sb: &mut Superblock,
	blocks: &mut [u64; REFS],
	depth: u32,
	start: u64,
	pos: &mut u64,
) -> Result<bool> {
	let fully_released = *pos >= start;
	for slot in blocks.iter_mut() {
		let cur = *slot;
		if cur == 0 {
			break;
		}
		if depth == 0 {
			if *pos >= start {
				freelist.append(dev, sb, cur)?;
				*slot = 0;
			}
			*pos += 1;
		} else {
			let mut child = read_refs_block(dev, cur)?;
			let freed = release_level(dev, freelist, sb, &mut child, depth - 1, start, pos)?;
			if freed {
				freelist.append(dev, sb, cur)?;
				*slot = 0;
			} else {
				write_refs_block(dev, cur, &child)?;
			}
		}
	}
	Ok(fully_released)
}

fn release_indirect_field(
	dev: &mut dyn BlockDevice,
	freelist: &mut FreeList,
	sb: &mut Superblock,
	blocks: &mut [u64],
	content_depth: u32,
	start: u64,
	pos: &mut u64,
) -> Result<()> {
	for slot in blocks.iter_mut() {
		let cur = *slot;
		if cur == 0 {
			break;
		}
		let mut child = read_refs_block(dev, cur)?;
		let freed = release_level(dev, freelist, sb, &mut child, content_depth, start, pos)?;
		if freed {
			freelist.append(dev, sb, cur)?;
			*slot = 0;
		} else {
			write_refs_block(dev, cur, &child)?;
		}
	}
	Ok(())
}

/// Releases every data block past `start` (a count of blocks, not bytes)
/// back to the free list, updating `inode.n_blocks`. `start == 0`
/// releases everything.
pub fn release_datablocks(
	dev: &mut dyn BlockDevice,
	freelist: &mut FreeList,
	sb: &mut Superblock,
	inode: &mut Inode,
	start: u64,
) -> Result<()> {
	let mut pos = 0u64;

	release_direct(dev, freelist, sb, inode.direct_mut(), start, &mut pos)?;
	release_indirect_field(dev, freelist, sb, inode.indirect1_mut(), 0, start, &mut pos)?;
	release_indirect_field(dev, freelist, sb, inode.indirect2_mut(), 1, start, &mut pos)?;
	release_indirect_field(dev, freelist, sb, inode.indirect3_mut(), 2, start, &mut pos)?;

	inode.n_blocks = start;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block_device::AnonDevice;
	use crate::inode::InodeType;

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
	fn allocates_direct_blocks_before_indirect() {
		let (mut dev, mut sb, mut fl) = setup(64, 2);
		let mut ino = Inode::new(5, InodeType::File, 0, 0, crate::inode::Permissions::empty());
		for _ in 0..N_DIRECT {
			alloc_new_datablock(&mut dev, &mut fl, &mut sb, &mut ino).unwrap();
		}
		assert!(ino.direct().iter().all(|&b| b != 0));
		assert_eq!(ino.n_blocks, N_DIRECT as u64);

		// the next allocation must go to indirect1
		alloc_new_datablock(&mut dev, &mut fl, &mut sb, &mut ino).unwrap();
		assert_ne!(ino.indirect1()[0], 0);
	}

	#[test]
	fn walk_visits_every_allocated_block_in_order() {
		let (mut dev, mut sb, mut fl) = setup(64, 2);
		let mut ino = Inode::new(5, InodeType::File, 0, 0, crate::inode::Permissions::empty());
		let mut allocated = Vec::new();
		for _ in 0..20 {
			let b = alloc_new_datablock(&mut dev, &mut fl, &mut sb, &mut ino).unwrap();
			allocated.push(b);
		}
		let mut seen = Vec::new();
		for_each_datablock(&dev, &ino, 0, false, |b| {
			seen.push(b);
			Ok(true)
		})
		.unwrap();
		assert_eq!(seen, allocated);
	}

	#[test]
	fn release_returns_blocks_past_start() {
		let (mut dev, mut sb, mut fl) = setup(64, 2);
		let mut ino = Inode::new(5, InodeType::File, 0, 0, crate::inode::Permissions::empty());
		for _ in 0..20 {
			alloc_new_datablock(&mut dev, &mut fl, &mut sb, &mut ino).unwrap();
		}
		release_datablocks(&mut dev, &mut fl, &mut sb, &mut ino, 5).unwrap();
		assert_eq!(ino.n_blocks, 5);
		let mut seen = Vec::new();
		for_each_datablock(&dev, &ino, 0, false, |b| {
			seen.push(b);
			Ok(true)
		})
		.unwrap();
		assert_eq!(seen.len(), 5);
	}

	#[test]
	fn for_each_datablock_mut_lets_visitor_write_as_it_walks() {
		let (mut dev, mut sb, mut fl) = setup(64, 2);
		let mut ino = Inode::new(5, InodeType::File, 0, 0, crate::inode::Permissions::empty());
		for _ in 0..4 {
			alloc_new_datablock(&mut dev, &mut fl, &mut sb, &mut ino).unwrap();
		}

		let mut visited = 0u64;
		for_each_datablock_mut(&mut dev, &ino, 0, false, |dev, blk| {
			let buf = [0xABu8; BLOCK_SIZE];
			dev.write(blk, &buf)?;
			visited += 1;
			Ok(true)
		})
		.unwrap();
		assert_eq!(visited, 4);

		let mut back = [0u8; BLOCK_SIZE];
		for_each_datablock(&dev, &ino, 0, false, |blk| {
			dev.read(blk, &mut back)?;
			assert!(back.iter().all(|&b| b == 0xAB));
			Ok(true)
		})
		.unwrap();
	}

	#[test]
	fn full_release_empties_the_tree() {
		let (mut dev, mut sb, mut fl) = setup(64, 2);
		let mut ino = Inode::new(5, InodeType::File, 0, 0, crate::inode::Permissions::empty());
		for _ in 0..20 {
			alloc_new_datablock(&mut dev, &mut fl, &mut sb, &mut ino).unwrap();
		}
		release_datablocks(&mut dev, &mut fl, &mut sb, &mut ino, 0).unwrap();
		assert_eq!(ino.n_blocks, 0);
		assert!(ino.direct().iter().all(|&b| b == 0));
		assert_eq!(get_last_datablock(&dev, &ino).unwrap(), NONE_REF);
	}
}
