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

//! Filesystem geometry constants.
//!
//! Mirrors `cofs_parameters.h`/`cofs_data_structures.h` from the reference
//! implementation this core is grounded on (see DESIGN.md).

/// Size of a block, in bytes.
pub const BLOCK_SIZE: usize = 4096;

/// Size of an on-disk inode record, in bytes.
pub const INODE_SIZE: usize = 256;

/// Size of a directory entry, in bytes.
pub const DIRENT_SIZE: usize = 256;

/// Number of direct block references per inode.
pub const N_DIRECT: usize = 12;
/// Number of single-indirect block references per inode.
pub const N_INDIRECT1: usize = 3;
/// Number of double-indirect block references per inode.
pub const N_INDIRECT2: usize = 1;
/// Number of triple-indirect block references per inode.
pub const N_INDIRECT3: usize = 1;

/// Fraction of total blocks devoted to the i-list at format time.
pub const ILIST_FRACTION: u64 = 10;

/// Number of inodes per i-list block.
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// Number of directory entries per data block.
pub const DIRENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;

/// Number of block references that fit in one indirect block.
pub const REFS_PER_INDIRECT: u64 = (BLOCK_SIZE / core::mem::size_of::<u64>()) as u64;

/// Number of block references a single free-list block can hold, besides
/// its `next` pointer.
pub const FREELIST_ENTRIES_PER_BLOCK: u64 = REFS_PER_INDIRECT - 1;

/// Maximum number of data blocks a single inode can address.
pub const MAX_FILEBLOCKS: u64 = N_DIRECT as u64
	+ N_INDIRECT1 as u64 * REFS_PER_INDIRECT
	+ N_INDIRECT2 as u64 * REFS_PER_INDIRECT * REFS_PER_INDIRECT
	+ N_INDIRECT3 as u64 * REFS_PER_INDIRECT * REFS_PER_INDIRECT * REFS_PER_INDIRECT;

/// Maximum file size in bytes.
pub const MAX_FILESIZE: u64 = MAX_FILEBLOCKS * BLOCK_SIZE as u64;

/// Maximum length of a directory entry's base name, including the nul
/// terminator budget (`D - sizeof(ref)`).
pub const MAX_BASENAME: usize = DIRENT_SIZE - core::mem::size_of::<u64>();

/// Sentinel inode/block reference meaning "absent" (everywhere except the
/// superblock's own block, which is reference `0` by definition).
pub const NONE_REF: u64 = 0;

/// Sentinel returned by allocation routines when the resource is
/// exhausted.
pub const MISSING: u64 = u64::MAX;

/// Maximum inline symlink target length, in bytes.
///
/// The reference implementation split this budget between a small inline
/// buffer and spillover into the inode's direct/indirect block slots. This
/// core resolves that design's open question by never spilling: the whole
/// block-reference union (all direct and indirect slots, unused by a
/// symlink inode) is reinterpreted as one flat inline buffer instead.
pub const SYMLINK_MAX_LEN: usize =
	(N_DIRECT + N_INDIRECT1 + N_INDIRECT2 + N_INDIRECT3) * core::mem::size_of::<u64>();
