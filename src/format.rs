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

//! `mkfs`: lays out a fresh superblock, i-list, free list, and root
//! directory on a blank device.
//!
//! Grounded on the reference implementation's `cofs_mkfs.c` (`mkfs`),
//! which derives the i-list size as a fixed fraction of the device and
//! statically allocates inode 0 for the root directory. This core instead
//! allocates the root inode through the ordinary i-list allocator, since
//! nothing here requires inode 0 specifically.

use log::info;

use crate::block_device::BlockDevice;
use crate::dirent;
use crate::error::{Error, Result};
use crate::freelist::FreeList;
use crate::ilist::IList;
use crate::inode::{Inode, InodeType, Permissions};
use crate::params::{BLOCK_SIZE, ILIST_FRACTION, INODES_PER_BLOCK, MISSING, NONE_REF};
use crate::superblock::Superblock;

const ALL_RWX: u16 = 0o777;

/// Formats `dev` as a fresh COFS volume owned by `uid`/`gid`, returning
/// the superblock that `FileSystem::mount` would subsequently read back.
/// Mirrors `mkfs`.
pub fn mkfs(dev: &mut dyn BlockDevice, uid: u32, gid: u32) -> Result<Superblock> {
	let n_blocks = dev.block_count();
	if n_blocks < 4 {
		return Err(Error::NoSpace);
	}

	let ilist_size = n_blocks / ILIST_FRACTION;
	let head = ilist_size + 1;
	let n_data_blocks = n_blocks - (1 + ilist_size);

	let mut sb = Superblock::new(ilist_size, n_blocks, head, 0);
	sb.free_blocks = n_data_blocks;
	sb.free_inodes = ilist_size * INODES_PER_BLOCK as u64;
	sb.write(dev)?;
	info!("mkfs: wrote superblock ({n_blocks} blocks total, {ilist_size} i-list blocks)");

	IList::create(dev, ilist_size)?;
	info!("mkfs: wrote i-list ({} inodes)", sb.free_inodes);

	FreeList::create(dev, n_data_blocks, head, n_blocks)?;
	info!("mkfs: initialized free block list starting at block {head}");

	let mut ilist = IList::init();
	let mut freelist = FreeList::init(dev, head)?;

	let root_inum = ilist.allocate(dev, &mut sb)?;
	if root_inum == MISSING {
		return Err(Error::NoSpace);
	}

	let root_data = freelist.pop(dev, &mut sb)?;
	if root_data == NONE_REF {
		return Err(Error::NoSpace);
	}
	dev.write(root_data, &dirent::root_block(root_inum))?;

	let mut root = Inode::new(root_inum, InodeType::Dir, uid, gid, Permissions::from_bits_truncate(ALL_RWX));
	root.refcount = 2;
	root.n_blocks = 1;
	root.n_bytes = BLOCK_SIZE as u64;
	root.num_direntries = 2;
	root.direct_mut()[0] = root_data;
	ilist.write(dev, root_inum, &root)?;

	sb.root_dir = root_inum;
	sb.write(dev)?;
	info!("mkfs: root directory is inode {root_inum}, data block {root_data}");

	Ok(sb)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block_device::AnonDevice;
	use crate::dirent::DirCache;

	#[test]
	fn formats_a_volume_with_a_readable_root_directory() {
		let mut dev = AnonDevice::new(BLOCK_SIZE as u64 * 64).unwrap();
		let sb = mkfs(&mut dev, 1000, 1000).unwrap();

		assert_eq!(sb.n_blocks, 64);
		assert_eq!(sb.ilist_size, 64 / ILIST_FRACTION);

		let mut ilist = IList::init();
		let root = ilist.read(&dev, sb.root_dir).unwrap();
		assert!(root.is_dir());
		assert_eq!(root.num_direntries, 2);
		assert_eq!(root.uid, 1000);

		let mut dircache = DirCache::new();
		assert_eq!(dircache.lookup(&dev, &root, b".").unwrap(), sb.root_dir);
		assert_eq!(dircache.lookup(&dev, &root, b"..").unwrap(), sb.root_dir);
	}

	#[test]
	fn rejects_a_volume_too_small_to_hold_anything() {
		let mut dev = AnonDevice::new(BLOCK_SIZE as u64 * 2).unwrap();
		assert!(matches!(mkfs(&mut dev, 0, 0), Err(Error::NoSpace)));
	}
}
