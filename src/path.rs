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

//! Pathname resolution: `/a/b/c` -> inode number.
//!
//! Grounded on the reference implementation's `layer2.c` (`namei`,
//! `namei_parent`). The original reaches into a process-wide in-core
//! superblock and i-list; here that state is threaded through explicitly
//! since it lives in the mounted `FileSystem` instead.

use crate::block_device::BlockDevice;
use crate::dirent::DirCache;
use crate::error::{Error, Result};
use crate::ilist::IList;
use crate::superblock::Superblock;

/// Resolves an absolute pathname to the inode number it names. Mirrors
/// `namei`.
pub fn namei(
	dev: &mut dyn BlockDevice,
	ilist: &mut IList,
	dircache: &mut DirCache,
	sb: &Superblock,
	pathname: &str,
) -> Result<u64> {
	if pathname == "/" {
		return Ok(sb.root_dir);
	}

	let parent = namei_parent(dev, ilist, dircache, sb, pathname)?;
	let inode = ilist.read(dev, parent)?;
	if !inode.is_dir() {
		return Err(Error::NotADirectory(dirname(pathname.trim_end_matches('/')).to_string()));
	}
	dircache.lookup(dev, &inode, basename(pathname).as_bytes())
}

/// Resolves the parent directory of `pathname` (which must include its
/// own basename) to an inode number. Mirrors `namei_parent`: walks every
/// path component but the last, bumping each traversed directory's atime
/// along the way, same as the original (noted there as expensive, but
/// kept).
pub fn namei_parent(
	dev: &mut dyn BlockDevice,
	ilist: &mut IList,
	dircache: &mut DirCache,
	sb: &Superblock,
	pathname: &str,
) -> Result<u64> {
	if pathname == "/" {
		return Ok(sb.root_dir);
	}

	let mut inum = sb.root_dir;
	let mut inode = ilist.read(dev, inum)?;

	let trimmed = pathname.trim_start_matches('/');
	let parent_path = dirname(trimmed);

	for component in parent_path.split('/').filter(|c| !c.is_empty()) {
		if !inode.is_dir() {
			return Err(Error::NotADirectory(component.to_string()));
		}

		inum = dircache.lookup(dev, &inode, component.as_bytes())?;
		inode = ilist.read(dev, inum)?;

		inode.update_atime();
		ilist.write(dev, inum, &inode)?;
	}

	Ok(inum)
}

/// The final `/`-separated component of `path`.
pub fn basename(path: &str) -> &str {
	let trimmed = path.trim_end_matches('/');
	match trimmed.rfind('/') {
		Some(idx) => &trimmed[idx + 1..],
		None => trimmed,
	}
}

/// Everything before the final `/`-separated component of `path`.
fn dirname(path: &str) -> &str {
	match path.rfind('/') {
		Some(idx) => &path[..idx],
		None => "",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn basename_strips_leading_components() {
		assert_eq!(basename("/a/b/c"), "c");
		assert_eq!(basename("/a"), "a");
		assert_eq!(basename("a/b/"), "b");
	}

	#[test]
	fn dirname_keeps_leading_components() {
		assert_eq!(dirname("a/b/c"), "a/b");
		assert_eq!(dirname("file"), "");
	}
}
