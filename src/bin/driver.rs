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

//! `cofs-driver`: a FUSE front end that mounts a COFS volume as a real
//! directory tree via `fuser`.
//!
//! The core (`cofs::fs::FileSystem`) is addressed by pathname, the same
//! shape as the reference implementation's `cofs_syscalls.c`. FUSE's
//! `Filesystem` trait instead addresses everything by a kernel-assigned
//! `ino` plus a parent/name pair, so this binary is the one place that
//! bridges the two: it uses the `_in`/`_ino` methods on `FileSystem`
//! (`mkdir_in`, `unlink_in`, `getattr_ino`, ...) rather than rebuilding
//! paths from `ino` chains.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use fuser::{
	FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
	ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use log::{error, warn};

use cofs::block_device::MmapDevice;
use cofs::error::Error;
use cofs::fs::{Attr, FileSystem};
use cofs::inode::{InodeType, Timestamp};
use cofs::params::BLOCK_SIZE;

/// How long the kernel may cache attribute/entry lookups before asking
/// again. COFS has no other writer while mounted, so a modest TTL is
/// safe.
const TTL: Duration = Duration::from_secs(1);

fn timestamp_to_systemtime(t: Timestamp) -> SystemTime {
	if t.sec >= 0 {
		UNIX_EPOCH + Duration::new(t.sec as u64, t.nsec.max(0) as u32)
	} else {
		UNIX_EPOCH - Duration::new((-t.sec) as u64, 0)
	}
}

fn systemtime_to_timestamp(t: SystemTime) -> Timestamp {
	match t.duration_since(UNIX_EPOCH) {
		Ok(d) => Timestamp { sec: d.as_secs() as i64, nsec: d.subsec_nanos() as i64 },
		Err(e) => Timestamp { sec: -(e.duration().as_secs() as i64), nsec: 0 },
	}
}

fn file_type_of(kind: InodeType) -> FileType {
	match kind {
		InodeType::File => FileType::RegularFile,
		InodeType::Dir => FileType::Directory,
		InodeType::Symlink => FileType::Symlink,
		InodeType::Special => FileType::CharDevice,
	}
}

/// Bridges COFS's own `u64` inode numbers to FUSE's `ino` space, which
/// reserves `1` for the mount root regardless of what the volume's own
/// root directory happens to be numbered.
struct InoMap {
	root: u64,
}

impl InoMap {
	fn to_fuse(&self, inum: u64) -> u64 {
		if inum == self.root {
			fuser::FUSE_ROOT_ID
		} else {
			inum + 1
		}
	}

	fn to_cofs(&self, ino: u64) -> u64 {
		if ino == fuser::FUSE_ROOT_ID {
			self.root
		} else {
			ino - 1
		}
	}
}

struct Driver {
	fs: FileSystem<MmapDevice>,
	ino_map: InoMap,
}

impl Driver {
	fn attr_to_fuse(&self, attr: Attr) -> FileAttr {
		FileAttr {
			ino: self.ino_map.to_fuse(attr.inum),
			size: attr.n_bytes,
			blocks: attr.n_blocks,
			atime: timestamp_to_systemtime(attr.atime),
			mtime: timestamp_to_systemtime(attr.mtime),
			ctime: timestamp_to_systemtime(attr.ctime),
			crtime: timestamp_to_systemtime(attr.ctime),
			kind: file_type_of(attr.kind),
			perm: attr.mode,
			nlink: attr.refcount as u32,
			uid: attr.uid,
			gid: attr.gid,
			rdev: ((attr.device_numbers.0 as u32) << 8) | (attr.device_numbers.1 as u32 & 0xff),
			blksize: BLOCK_SIZE as u32,
			flags: 0,
		}
	}

	fn reply_err(err: &Error) -> i32 {
		-err.errno()
	}
}

impl Filesystem for Driver {
	fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
		let parent = self.ino_map.to_cofs(parent);
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.lookup_child(parent, name.as_bytes()) {
			Ok(inum) => match self.fs.getattr_ino(inum) {
				Ok(attr) => reply.entry(&TTL, &self.attr_to_fuse(attr), 0),
				Err(e) => reply.error(Self::reply_err(&e)),
			},
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
		let inum = self.ino_map.to_cofs(ino);
		match self.fs.getattr_ino(inum) {
			Ok(attr) => reply.attr(&TTL, &self.attr_to_fuse(attr)),
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn setattr(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		mode: Option<u32>,
		uid: Option<u32>,
		gid: Option<u32>,
		size: Option<u64>,
		atime: Option<TimeOrNow>,
		mtime: Option<TimeOrNow>,
		_ctime: Option<SystemTime>,
		_fh: Option<u64>,
		_crtime: Option<SystemTime>,
		_chgtime: Option<SystemTime>,
		_bkuptime: Option<SystemTime>,
		_flags: Option<u32>,
		reply: ReplyAttr,
	) {
		let inum = self.ino_map.to_cofs(ino);

		if let Some(mode) = mode {
			if let Err(e) = self.fs.chmod_ino(inum, mode as u16) {
				reply.error(Self::reply_err(&e));
				return;
			}
		}
		if uid.is_some() || gid.is_some() {
			if let Err(e) = self.fs.chown_ino(inum, uid, gid) {
				reply.error(Self::reply_err(&e));
				return;
			}
		}
		if let Some(size) = size {
			if let Err(e) = self.fs.truncate_ino(inum, size) {
				reply.error(Self::reply_err(&e));
				return;
			}
		}
		if atime.is_some() || mtime.is_some() {
			let atime = atime.map(|t| match t {
				TimeOrNow::SpecificTime(t) => systemtime_to_timestamp(t),
				TimeOrNow::Now => systemtime_to_timestamp(SystemTime::now()),
			});
			let mtime = mtime.map(|t| match t {
				TimeOrNow::SpecificTime(t) => systemtime_to_timestamp(t),
				TimeOrNow::Now => systemtime_to_timestamp(SystemTime::now()),
			});
			if let Err(e) = self.fs.utimens_ino(inum, atime, mtime) {
				reply.error(Self::reply_err(&e));
				return;
			}
		}

		match self.fs.getattr_ino(inum) {
			Ok(attr) => reply.attr(&TTL, &self.attr_to_fuse(attr)),
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
		let inum = self.ino_map.to_cofs(ino);
		match self.fs.readlink_ino(inum) {
			Ok(target) => reply.data(&target),
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	fn mkdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
		let parent = self.ino_map.to_cofs(parent);
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.mkdir_in(parent, name.as_bytes(), mode as u16, req.uid(), req.gid()) {
			Ok(inum) => match self.fs.getattr_ino(inum) {
				Ok(attr) => reply.entry(&TTL, &self.attr_to_fuse(attr), 0),
				Err(e) => reply.error(Self::reply_err(&e)),
			},
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	fn mknod(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, rdev: u32, reply: ReplyEntry) {
		let parent = self.ino_map.to_cofs(parent);
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		let kind = match mode & libc::S_IFMT {
			libc::S_IFDIR => InodeType::Dir,
			libc::S_IFLNK => InodeType::Symlink,
			libc::S_IFCHR | libc::S_IFBLK => InodeType::Special,
			_ => InodeType::File,
		};
		let rdev_pair = if kind == InodeType::Special { Some(((rdev >> 8) as u64, (rdev & 0xff) as u64)) } else { None };
		match self.fs.mknod_in(parent, name.as_bytes(), kind, mode as u16, req.uid(), req.gid(), rdev_pair) {
			Ok(inum) => match self.fs.getattr_ino(inum) {
				Ok(attr) => reply.entry(&TTL, &self.attr_to_fuse(attr), 0),
				Err(e) => reply.error(Self::reply_err(&e)),
			},
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	fn create(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, _flags: i32, reply: ReplyCreate) {
		let parent_cofs = self.ino_map.to_cofs(parent);
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		let inum = match self.fs.mknod_in(parent_cofs, name.as_bytes(), InodeType::File, mode as u16, req.uid(), req.gid(), None) {
			Ok(inum) => inum,
			Err(e) => {
				reply.error(Self::reply_err(&e));
				return;
			}
		};
		let fh = match self.fs.open_ino(inum, req.uid(), req.gid(), true) {
			Ok(fh) => fh,
			Err(e) => {
				reply.error(Self::reply_err(&e));
				return;
			}
		};
		match self.fs.getattr_ino(inum) {
			Ok(attr) => reply.created(&TTL, &self.attr_to_fuse(attr), 0, fh, 0),
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let parent = self.ino_map.to_cofs(parent);
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.unlink_in(parent, name.as_bytes(), req.uid(), req.gid()) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let parent = self.ino_map.to_cofs(parent);
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.rmdir_in(parent, name.as_bytes(), req.uid(), req.gid()) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	fn symlink(&mut self, req: &Request<'_>, parent: u64, link_name: &OsStr, target: &Path, reply: ReplyEntry) {
		let parent = self.ino_map.to_cofs(parent);
		let (Some(link_name), Some(target)) = (link_name.to_str(), target.to_str()) else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.symlink_in(parent, link_name.as_bytes(), target.as_bytes(), req.uid(), req.gid()) {
			Ok(inum) => match self.fs.getattr_ino(inum) {
				Ok(attr) => reply.entry(&TTL, &self.attr_to_fuse(attr), 0),
				Err(e) => reply.error(Self::reply_err(&e)),
			},
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	fn rename(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, newparent: u64, newname: &OsStr, _flags: u32, reply: ReplyEmpty) {
		let parent = self.ino_map.to_cofs(parent);
		let newparent = self.ino_map.to_cofs(newparent);
		let (Some(name), Some(newname)) = (name.to_str(), newname.to_str()) else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.rename_in(parent, name.as_bytes(), newparent, newname.as_bytes(), req.uid(), req.gid()) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
		let inum = self.ino_map.to_cofs(ino);
		let for_write = flags & (libc::O_WRONLY | libc::O_RDWR) != 0;
		match self.fs.open_ino(inum, req.uid(), req.gid(), for_write) {
			Ok(fh) => reply.opened(fh, 0),
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	fn opendir(&mut self, req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
		let inum = self.ino_map.to_cofs(ino);
		match self.fs.open_ino(inum, req.uid(), req.gid(), false) {
			Ok(fh) => reply.opened(fh, 0),
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn read(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, offset: i64, size: u32, _flags: i32, _lock_owner: Option<u64>, reply: ReplyData) {
		let mut buf = vec![0u8; size as usize];
		match self.fs.read(fh, offset as u64, &mut buf) {
			Ok(n) => reply.data(&buf[..n]),
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn write(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, offset: i64, data: &[u8], _write_flags: u32, _flags: i32, _lock_owner: Option<u64>, reply: ReplyWrite) {
		match self.fs.write(fh, offset as u64, data) {
			Ok(n) => reply.written(n as u32),
			Err(e) => reply.error(Self::reply_err(&e)),
		}
	}

	fn release(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, _lock_owner: Option<u64>, _flush: bool, reply: ReplyEmpty) {
		self.fs.release(fh);
		reply.ok();
	}

	fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
		self.fs.release(fh);
		reply.ok();
	}

	fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
		let inum = self.ino_map.to_cofs(ino);
		let entries = match self.fs.readdir_ino(inum) {
			Ok(e) => e,
			Err(e) => {
				reply.error(Self::reply_err(&e));
				return;
			}
		};

		for (i, (name, child_inum)) in entries.into_iter().enumerate().skip(offset as usize) {
			let kind = match self.fs.getattr_ino(child_inum) {
				Ok(attr) => file_type_of(attr.kind),
				Err(_) => FileType::RegularFile,
			};
			let name = String::from_utf8_lossy(&name).into_owned();
			if reply.add(self.ino_map.to_fuse(child_inum), (i + 1) as i64, kind, name) {
				break;
			}
		}
		reply.ok();
	}

	fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
		let stats = self.fs.stats();
		reply.statfs(
			stats.total_blocks,
			stats.free_blocks,
			stats.free_blocks,
			stats.total_inodes,
			stats.free_inodes,
			stats.block_size as u32,
			cofs::params::MAX_BASENAME as u32,
			stats.block_size as u32,
		);
	}
}

#[derive(Parser)]
#[command(name = "cofs-driver", about = "Mount a COFS volume over FUSE")]
struct Args {
	/// Device or regular file holding a formatted COFS volume.
	device: PathBuf,
	/// Directory to mount the volume at.
	mountpoint: PathBuf,
	/// Allow other users to access the mount.
	#[arg(long)]
	allow_other: bool,
}

fn main() -> ExitCode {
	env_logger::init();
	let args = Args::parse();

	let dev = match MmapDevice::open(&args.device) {
		Ok(d) => d,
		Err(e) => {
			error!("cofs-driver: unable to open '{}': {e}", args.device.display());
			return ExitCode::FAILURE;
		}
	};

	let fs = match FileSystem::mount(dev) {
		Ok(fs) => fs,
		Err(e) => {
			error!("cofs-driver: '{}' does not look like a COFS volume: {e}", args.device.display());
			return ExitCode::FAILURE;
		}
	};
	let root = fs.root_inum();

	let mut options = vec![MountOption::FSName("cofs".to_string()), MountOption::DefaultPermissions];
	if args.allow_other {
		options.push(MountOption::AllowOther);
	}

	let driver = Driver { fs, ino_map: InoMap { root } };
	if let Err(e) = fuser::mount2(driver, &args.mountpoint, &options) {
		error!("cofs-driver: mount failed: {e}");
		warn!("is '{}' a valid, empty mountpoint?", args.mountpoint.display());
		return ExitCode::FAILURE;
	}
	ExitCode::SUCCESS
}
