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

//! Layer 0: fixed-size block I/O over a memory-mapped backing.
//!
//! Grounded on the reference implementation's `layer0_mapBlkdev`/
//! `layer0_readBlock`/`layer0_writeBlock`, which mmap either a real block
//! device file or an anonymous region and do plain `memcpy` in and out of
//! it. The generic `read_struct`/`write_struct` helpers mirror that
//! implementation's `read<T>`/`write<T>` casts in the ext2 reference
//! module this core otherwise follows.

use std::fs::{File, OpenOptions};
use std::mem::{size_of, MaybeUninit};
use std::path::Path;
use std::slice;

use memmap2::MmapMut;

use crate::error::{Error, Result};
use crate::params::BLOCK_SIZE;

/// A fixed-size block I/O device.
///
/// All reads and writes are block-aligned and exactly `BLOCK_SIZE` bytes;
/// no partial-block I/O is exposed to higher layers.
pub trait BlockDevice {
	/// Total number of blocks the device can address.
	fn block_count(&self) -> u64;

	/// Reads block `bnum` into `buf`, which must be exactly `BLOCK_SIZE`
	/// bytes.
	fn read(&self, bnum: u64, buf: &mut [u8]) -> Result<()>;

	/// Writes `buf` (exactly `BLOCK_SIZE` bytes) to block `bnum`.
	fn write(&mut self, bnum: u64, buf: &[u8]) -> Result<()>;

	/// Flushes any buffered writes to the backing storage.
	fn flush(&mut self) -> Result<()>;

	/// Reads `T` out of block-relative byte offset `offset`.
	///
	/// # Safety
	///
	/// The caller must ensure the bytes at `offset` represent a valid
	/// `T`; this is a raw transmute, same as the reference
	/// implementation's `read<T>`.
	unsafe fn read_struct<T: Copy>(&self, byte_offset: u64) -> Result<T> {
		let bnum = byte_offset / BLOCK_SIZE as u64;
		let in_block = (byte_offset % BLOCK_SIZE as u64) as usize;
		let mut block = [0u8; BLOCK_SIZE];
		self.read(bnum, &mut block)?;
		let size = size_of::<T>();
		let mut obj = MaybeUninit::<T>::uninit();
		let dst = slice::from_raw_parts_mut(obj.as_mut_ptr() as *mut u8, size);
		dst.copy_from_slice(&block[in_block..in_block + size]);
		Ok(obj.assume_init())
	}

	/// Writes `obj` at block-relative byte offset `offset`.
	fn write_struct<T: Copy>(&mut self, byte_offset: u64, obj: &T) -> Result<()> {
		let bnum = byte_offset / BLOCK_SIZE as u64;
		let in_block = (byte_offset % BLOCK_SIZE as u64) as usize;
		let size = size_of::<T>();
		let mut block = [0u8; BLOCK_SIZE];
		self.read(bnum, &mut block)?;
		let src = unsafe { slice::from_raw_parts(obj as *const T as *const u8, size) };
		block[in_block..in_block + size].copy_from_slice(src);
		self.write(bnum, &block)
	}
}

fn check_buf(buf: &[u8]) -> Result<()> {
	if buf.len() != BLOCK_SIZE {
		return Err(Error::Fault);
	}
	Ok(())
}

/// A block device backed by a memory-mapped file or block-special device.
pub struct MmapDevice {
	mmap: MmapMut,
	n_blocks: u64,
	_file: File,
}

impl MmapDevice {
	/// Maps the device or regular file at `path`. The size must already
	/// be a multiple of `BLOCK_SIZE`; this does not create or resize the
	/// backing.
	pub fn open(path: &Path) -> Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.open(path)
			.map_err(|_| Error::Io(0))?;
		let size = map_size(&file)?;
		if size % BLOCK_SIZE as u64 != 0 {
			return Err(Error::Io(0));
		}
		let mmap = unsafe { MmapMut::map_mut(&file).map_err(|_| Error::Io(0))? };
		Ok(Self {
			mmap,
			n_blocks: size / BLOCK_SIZE as u64,
			_file: file,
		})
	}

	/// Creates (or truncates) a regular file of `size` bytes at `path`
	/// and maps it. Used by `mkfs.cofs` when formatting a file-backed
	/// filesystem rather than a real block device.
	pub fn create(path: &Path, size: u64) -> Result<Self> {
		if size % BLOCK_SIZE as u64 != 0 {
			return Err(Error::Io(0));
		}
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(path)
			.map_err(|_| Error::Io(0))?;
		file.set_len(size).map_err(|_| Error::Io(0))?;
		let mmap = unsafe { MmapMut::map_mut(&file).map_err(|_| Error::Io(0))? };
		Ok(Self {
			mmap,
			n_blocks: size / BLOCK_SIZE as u64,
			_file: file,
		})
	}

	/// Maps an existing block device or file and reports its byte size.
	/// Mirrors `layer0_mapBlkdev`.
	pub fn map_blkdev(path: &Path) -> Result<(Self, u64)> {
		let dev = Self::open(path)?;
		let size = dev.n_blocks * BLOCK_SIZE as u64;
		Ok((dev, size))
	}
}

#[cfg(unix)]
fn map_size(file: &File) -> Result<u64> {
	use std::os::unix::fs::FileTypeExt;
	let meta = file.metadata().map_err(|_| Error::Io(0))?;
	if meta.file_type().is_block_device() {
		block_device_size(file)
	} else {
		Ok(meta.len())
	}
}

#[cfg(not(unix))]
fn map_size(file: &File) -> Result<u64> {
	file.metadata().map(|m| m.len()).map_err(|_| Error::Io(0))
}

#[cfg(target_os = "linux")]
fn block_device_size(file: &File) -> Result<u64> {
	use std::os::unix::io::AsRawFd;
	const BLKGETSIZE64: u64 = 0x80081272;
	let mut size: u64 = 0;
	let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut size as *mut u64) };
	if ret != 0 {
		return Err(Error::Io(0));
	}
	Ok(size)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn block_device_size(file: &File) -> Result<u64> {
	file.metadata().map(|m| m.len()).map_err(|_| Error::Io(0))
}

impl BlockDevice for MmapDevice {
	fn block_count(&self) -> u64 {
		self.n_blocks
	}

	fn read(&self, bnum: u64, buf: &mut [u8]) -> Result<()> {
		check_buf(buf)?;
		if bnum >= self.n_blocks {
			return Err(Error::Io(bnum));
		}
		let off = (bnum as usize) * BLOCK_SIZE;
		buf.copy_from_slice(&self.mmap[off..off + BLOCK_SIZE]);
		Ok(())
	}

	fn write(&mut self, bnum: u64, buf: &[u8]) -> Result<()> {
		check_buf(buf)?;
		if bnum >= self.n_blocks {
			return Err(Error::Io(bnum));
		}
		let off = (bnum as usize) * BLOCK_SIZE;
		self.mmap[off..off + BLOCK_SIZE].copy_from_slice(buf);
		Ok(())
	}

	fn flush(&mut self) -> Result<()> {
		self.mmap.flush().map_err(|_| Error::Io(0))
	}
}

/// A block device backed by anonymous memory, for `-m <size>` style
/// invocations and for tests. Mirrors the reference implementation's
/// `__init_use_mem`, which `mmap`s `MAP_ANON` rather than opening a file.
pub struct AnonDevice {
	data: Vec<u8>,
	n_blocks: u64,
}

impl AnonDevice {
	/// Allocates a zero-filled anonymous device of `size` bytes. `size`
	/// must be a multiple of `BLOCK_SIZE`.
	pub fn new(size: u64) -> Result<Self> {
		if size % BLOCK_SIZE as u64 != 0 {
			return Err(Error::Io(0));
		}
		Ok(Self {
			data: vec![0u8; size as usize],
			n_blocks: size / BLOCK_SIZE as u64,
		})
	}
}

impl BlockDevice for AnonDevice {
	fn block_count(&self) -> u64 {
		self.n_blocks
	}

	fn read(&self, bnum: u64, buf: &mut [u8]) -> Result<()> {
		check_buf(buf)?;
		if bnum >= self.n_blocks {
			return Err(Error::Io(bnum));
		}
		let off = (bnum as usize) * BLOCK_SIZE;
		buf.copy_from_slice(&self.data[off..off + BLOCK_SIZE]);
		Ok(())
	}

	fn write(&mut self, bnum: u64, buf: &[u8]) -> Result<()> {
		check_buf(buf)?;
		if bnum >= self.n_blocks {
			return Err(Error::Io(bnum));
		}
		let off = (bnum as usize) * BLOCK_SIZE;
		self.data[off..off + BLOCK_SIZE].copy_from_slice(buf);
		Ok(())
	}

	fn flush(&mut self) -> Result<()> {
		Ok(())
	}
}
