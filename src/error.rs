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

//! Error kinds surfaced by the core, and their mapping to negated POSIX
//! codes for the host interface.

use thiserror::Error;

/// Result alias used throughout the core.
pub type Result<T> = core::result::Result<T, Error>;

/// A core operation failure.
///
/// Each variant corresponds to one row of the error table in the
/// filesystem's design: a block-device/mount failure, a path-resolution
/// failure, a directory-shape violation, or a resource-exhaustion
/// condition. Variants carry just enough context to produce a useful
/// message; the numeric code a host expects is recovered with
/// [`Error::errno`].
#[derive(Debug, Error)]
pub enum Error {
	/// A block-device read/write targeted an out-of-range block, or the
	/// backing could not be mapped.
	#[error("I/O error on block {0}")]
	Io(u64),
	/// A path component was not found.
	#[error("no such file or directory: {0:?}")]
	NotFound(String),
	/// An intermediate path component is not a directory.
	#[error("not a directory: {0:?}")]
	NotADirectory(String),
	/// A file-only operation targeted a directory.
	#[error("is a directory")]
	IsADirectory,
	/// `rmdir` (or overwrite-by-rename) targeted a non-empty directory.
	#[error("directory not empty")]
	NotEmpty,
	/// A directory entry name exceeded `B_max - 1` bytes.
	#[error("name too long")]
	NameTooLong,
	/// The i-list or free list is exhausted.
	#[error("no space left on device")]
	NoSpace,
	/// A write's end offset would exceed `MAX_FILESIZE`.
	#[error("file too large")]
	FileTooBig,
	/// An in-core buffer allocation failed.
	#[error("out of memory")]
	OutOfMemory,
	/// A caller-supplied buffer pointer was absent.
	#[error("bad address")]
	Fault,
	/// An operation was attempted against an inode of the wrong kind,
	/// e.g. `readlink` on a non-symlink.
	#[error("invalid argument")]
	InvalidArgument,
	/// The caller's uid/gid does not satisfy the inode's permission bits.
	#[error("permission denied")]
	PermissionDenied,
}

impl Error {
	/// The negated POSIX errno a host interface should return for this
	/// failure.
	pub fn errno(&self) -> i32 {
		let code = match self {
			Error::Io(_) => libc::EIO,
			Error::NotFound(_) => libc::ENOENT,
			Error::NotADirectory(_) => libc::ENOTDIR,
			Error::IsADirectory => libc::EISDIR,
			Error::NotEmpty => libc::ENOTEMPTY,
			Error::NameTooLong => libc::ENAMETOOLONG,
			Error::NoSpace => libc::ENOSPC,
			Error::FileTooBig => libc::EFBIG,
			Error::OutOfMemory => libc::ENOMEM,
			Error::Fault => libc::EFAULT,
			Error::InvalidArgument => libc::EINVAL,
			Error::PermissionDenied => libc::EACCES,
		};
		-code
	}
}
