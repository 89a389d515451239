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

//! Filesystem consistency checker.
//!
//! Grounded on the reference implementation's `cofs_fsck.c`
//! (`__fsck_check_fs_params`, `__fsck_check_ilist`, `__fsck_check_inode`),
//! which walks the i-list checking every inode's block-reference tree for
//! in-range, non-overlapping references, then separately checks the free
//! list via `FreeList_fsck`. This core returns its findings as a
//! [`FsckReport`] instead of only printing them, so callers (including
//! tests) can assert on `intact` without scraping stdout.

use std::collections::HashSet;

use log::warn;

use crate::block_device::BlockDevice;
use crate::blocktree::for_each_datablock;
use crate::error::Result;
use crate::freelist::FreeList;
use crate::ilist::{IList, ILIST_START_BLOCK};
use crate::params::{INODES_PER_BLOCK, SYMLINK_MAX_LEN};
use crate::superblock::Superblock;

/// Result of [`check`]: whether the volume is internally consistent, plus
/// one human-readable string per discrepancy found.
#[derive(Debug, Default)]
pub struct FsckReport {
	pub intact: bool,
	pub issues: Vec<String>,
}

impl FsckReport {
	fn fail(&mut self, issue: String) {
		warn!("fsck: {issue}");
		self.intact = false;
		self.issues.push(issue);
	}
}

/// Walks the whole volume: superblock self-consistency, every in-use
/// inode's block-reference tree, and the free list. Mirrors
/// `fsck_in_mem`/`fsck_on_dev` combined into one backing-agnostic check.
pub fn check(dev: &dyn BlockDevice, sb: &Superblock) -> Result<FsckReport> {
	let mut report = FsckReport { intact: true, issues: Vec::new() };

	let data_start = ILIST_START_BLOCK + sb.ilist_size;
	if sb.n_blocks <= data_start {
		report.fail(format!(
			"superblock claims {} total blocks but the i-list alone needs {}",
			sb.n_blocks, data_start
		));
		return Ok(report);
	}

	let mut ilist = IList::init();
	let mut in_use_blocks: HashSet<u64> = HashSet::new();
	let total_inodes = sb.ilist_size * INODES_PER_BLOCK as u64;

	for inum in 0..total_inodes {
		let inode = ilist.read(dev, inum)?;
		if inode.is_free() {
			continue;
		}

		if inode.is_symlink() {
			if inode.n_bytes as usize > SYMLINK_MAX_LEN {
				report.fail(format!("inode {inum} claims a symlink target longer than {SYMLINK_MAX_LEN} bytes"));
			}
			continue;
		}

		let mut inode_issue = None;
		for_each_datablock(dev, &inode, 0, false, |blk| {
			if blk < data_start || blk >= sb.n_blocks {
				inode_issue = Some(format!("inode {inum} references out-of-range block {blk}"));
			} else if !in_use_blocks.insert(blk) {
				inode_issue = Some(format!("block {blk} is referenced by more than one inode"));
			}
			Ok(true)
		})?;
		if let Some(issue) = inode_issue {
			report.fail(issue);
		}
	}

	let total_data_blocks = sb.n_blocks - data_start;
	let mut free_blocks: Vec<u64> = (data_start..sb.n_blocks).filter(|b| !in_use_blocks.contains(b)).collect();
	debug_assert_eq!(free_blocks.len() as u64, total_data_blocks - in_use_blocks.len() as u64);

	let flist_report = FreeList::fsck(dev, sb.flist_head, &mut free_blocks)?;
	if !flist_report.intact {
		report.intact = false;
		for issue in flist_report.issues {
			warn!("fsck: {issue}");
			report.issues.push(issue);
		}
	}

	Ok(report)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block_device::AnonDevice;
	use crate::format::mkfs;
	use crate::params::BLOCK_SIZE;

	#[test]
	fn a_freshly_formatted_volume_is_intact() {
		let mut dev = AnonDevice::new(BLOCK_SIZE as u64 * 64).unwrap();
		let sb = mkfs(&mut dev, 0, 0).unwrap();
		let report = check(&dev, &sb).unwrap();
		assert!(report.intact, "issues: {:?}", report.issues);
	}

	#[test]
	fn a_stomped_data_block_reference_is_caught() {
		let mut dev = AnonDevice::new(BLOCK_SIZE as u64 * 64).unwrap();
		let sb = mkfs(&mut dev, 0, 0).unwrap();

		let mut ilist = IList::init();
		let mut root = ilist.read(&dev, sb.root_dir).unwrap();
		root.direct_mut()[1] = 3; // inside the i-list, not the data region
		root.n_blocks = 2;
		ilist.write(&mut dev, sb.root_dir, &root).unwrap();

		let report = check(&dev, &sb).unwrap();
		assert!(!report.intact);
	}
}
