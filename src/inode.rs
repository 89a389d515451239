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

//! The on-disk inode record and its permission/type helpers.
//!
//! Layout and fields are grounded on the reference implementation's
//! `cofs_inode`/`inode_permissions` (`cofs_data_structures.h`); the
//! permission checks mirror its `check_{read,write,exec}_permission`
//! (`layer2.c`). Rather than a C union over four inode subtypes, the block
//! reference slots are flattened into named arrays and reinterpreted by
//! `kind`, matching this core's reference ext2 module's approach of plain
//! named fields rather than unsafe unions.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

use crate::error::{Error, Result};
use crate::params::{
	INODE_SIZE, N_DIRECT, N_INDIRECT1, N_INDIRECT2, N_INDIRECT3, NONE_REF, SYMLINK_MAX_LEN,
};

/// A POSIX-style timestamp (seconds + nanoseconds since the epoch).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamp {
	pub sec: i64,
	pub nsec: i64,
}

impl Timestamp {
	/// The current wall-clock time.
	pub fn now() -> Self {
		let d = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.unwrap_or_default();
		Self {
			sec: d.as_secs() as i64,
			nsec: d.subsec_nanos() as i64,
		}
	}
}

/// The four inode types COFS supports, matching `INODE_TYPE_{FILE,DIR,SPEC,SYML}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InodeType {
	File = 0b00,
	Dir = 0b01,
	Special = 0b10,
	Symlink = 0b11,
}

impl InodeType {
	pub fn from_u8(v: u8) -> Self {
		match v & 0b11 {
			0b00 => InodeType::File,
			0b01 => InodeType::Dir,
			0b10 => InodeType::Special,
			_ => InodeType::Symlink,
		}
	}
}

bitflags! {
	/// Unix-style rwx permission bits, plus setuid/setgid/sticky.
	///
	/// Symlinks always report `0o777` regardless of the stored value,
	/// matching the original's note that symlink permissions are
	/// meaningless: the target's permissions are what's enforced.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct Permissions: u16 {
		const WORLD_X = 0o001;
		const WORLD_W = 0o002;
		const WORLD_R = 0o004;
		const GROUP_X = 0o010;
		const GROUP_W = 0o020;
		const GROUP_R = 0o040;
		const OWNER_X = 0o100;
		const OWNER_W = 0o200;
		const OWNER_R = 0o400;
		const STICKY  = 0o1000;
		const SETGID  = 0o2000;
		const SETUID  = 0o4000;
	}
}

impl Permissions {
	pub fn as_mode(&self) -> u16 {
		self.bits()
	}
}

/// The on-disk inode record. Exactly `INODE_SIZE` bytes.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Inode {
	pub in_use: u8,
	kind: u8,
	permissions: u16,
	pub uid: u32,
	pub gid: u32,
	_pad0: [u8; 4],
	pub atim: Timestamp,
	pub mtim: Timestamp,
	pub ctim: Timestamp,
	pub btim: Timestamp,
	pub n_bytes: u64,
	pub n_blocks: u64,
	pub refcount: u64,
	pub inum: u64,
	pub num_direntries: u64,
	/// Block-reference slots for FILE/DIR inodes, or a flat byte buffer
	/// for SYML inodes. Use [`Inode::direct`]/[`Inode::symlink_bytes`]
	/// rather than these fields directly.
	direct: [u64; N_DIRECT],
	indirect1: [u64; N_INDIRECT1],
	indirect2: [u64; N_INDIRECT2],
	indirect3: [u64; N_INDIRECT3],
}

const_assert_eq!(core::mem::size_of::<Inode>(), INODE_SIZE);

impl Inode {
	/// Builds a fresh, in-use inode of the given type, owned by
	/// `uid`/`gid` with the given permission bits, timestamped now.
	pub fn new(inum: u64, kind: InodeType, uid: u32, gid: u32, permissions: Permissions) -> Self {
		let now = Timestamp::now();
		Self {
			in_use: 1,
			kind: kind as u8,
			permissions: permissions.bits(),
			uid,
			gid,
			_pad0: [0; 4],
			atim: now,
			mtim: now,
			ctim: now,
			btim: now,
			n_bytes: 0,
			n_blocks: 0,
			refcount: 1,
			inum,
			num_direntries: 0,
			direct: [NONE_REF; N_DIRECT],
			indirect1: [NONE_REF; N_INDIRECT1],
			indirect2: [NONE_REF; N_INDIRECT2],
			indirect3: [NONE_REF; N_INDIRECT3],
		}
	}

	/// A zeroed, free (`in_use == 0`) inode, as written by `mkfs` for
	/// every slot in the i-list beyond the ones it populates.
	pub fn free() -> Self {
		Self {
			in_use: 0,
			kind: 0,
			permissions: 0,
			uid: 0,
			gid: 0,
			_pad0: [0; 4],
			atim: Timestamp::default(),
			mtim: Timestamp::default(),
			ctim: Timestamp::default(),
			btim: Timestamp::default(),
			n_bytes: 0,
			n_blocks: 0,
			refcount: 0,
			inum: 0,
			num_direntries: 0,
			direct: [NONE_REF; N_DIRECT],
			indirect1: [NONE_REF; N_INDIRECT1],
			indirect2: [NONE_REF; N_INDIRECT2],
			indirect3: [NONE_REF; N_INDIRECT3],
		}
	}

	pub fn is_free(&self) -> bool {
		self.in_use == 0
	}

	pub fn file_type(&self) -> InodeType {
		InodeType::from_u8(self.kind)
	}

	pub fn set_file_type(&mut self, kind: InodeType) {
		self.kind = kind as u8;
	}

	pub fn is_dir(&self) -> bool {
		self.file_type() == InodeType::Dir
	}

	pub fn is_file(&self) -> bool {
		self.file_type() == InodeType::File
	}

	pub fn is_symlink(&self) -> bool {
		self.file_type() == InodeType::Symlink
	}

	pub fn is_special(&self) -> bool {
		self.file_type() == InodeType::Special
	}

	/// The permission bits. Symlinks always report `0o777`, matching
	/// the original's note that a symlink's own permissions are
	/// meaningless.
	pub fn permissions(&self) -> Permissions {
		if self.is_symlink() {
			Permissions::from_bits_truncate(0o777)
		} else {
			Permissions::from_bits_truncate(self.permissions)
		}
	}

	pub fn set_permissions(&mut self, perms: Permissions) {
		self.permissions = perms.bits();
	}

	pub fn can_read(&self, uid: u32, gid: u32) -> bool {
		let p = self.permissions();
		(uid == self.uid && p.contains(Permissions::OWNER_R))
			|| (gid == self.gid && p.contains(Permissions::GROUP_R))
			|| p.contains(Permissions::WORLD_R)
	}

	pub fn can_write(&self, uid: u32, gid: u32) -> bool {
		let p = self.permissions();
		(uid == self.uid && p.contains(Permissions::OWNER_W))
			|| (gid == self.gid && p.contains(Permissions::GROUP_W))
			|| p.contains(Permissions::WORLD_W)
	}

	pub fn can_execute(&self, uid: u32, gid: u32) -> bool {
		let p = self.permissions();
		(uid == self.uid && p.contains(Permissions::OWNER_X))
			|| (gid == self.gid && p.contains(Permissions::GROUP_X))
			|| p.contains(Permissions::WORLD_X)
	}

	pub fn update_atime(&mut self) {
		self.atim = Timestamp::now();
	}

	pub fn update_mtime(&mut self) {
		self.mtim = Timestamp::now();
	}

	pub fn update_ctime(&mut self) {
		self.ctim = Timestamp::now();
	}

	/// Direct block-reference slots. Valid for FILE and DIR inodes.
	pub fn direct(&self) -> &[u64; N_DIRECT] {
		&self.direct
	}

	pub fn direct_mut(&mut self) -> &mut [u64; N_DIRECT] {
		&mut self.direct
	}

	pub fn indirect1(&self) -> &[u64; N_INDIRECT1] {
		&self.indirect1
	}

	pub fn indirect1_mut(&mut self) -> &mut [u64; N_INDIRECT1] {
		&mut self.indirect1
	}

	pub fn indirect2(&self) -> &[u64; N_INDIRECT2] {
		&self.indirect2
	}

	pub fn indirect2_mut(&mut self) -> &mut [u64; N_INDIRECT2] {
		&mut self.indirect2
	}

	pub fn indirect3(&self) -> &[u64; N_INDIRECT3] {
		&self.indirect3
	}

	pub fn indirect3_mut(&mut self) -> &mut [u64; N_INDIRECT3] {
		&mut self.indirect3
	}

	/// Device major/minor for SPECIAL inodes, stored in the first two
	/// direct slots (unused by a device inode otherwise).
	pub fn device_numbers(&self) -> (u64, u64) {
		(self.direct[0], self.direct[1])
	}

	pub fn set_device_numbers(&mut self, major: u64, minor: u64) {
		self.direct[0] = major;
		self.direct[1] = minor;
	}

	/// The full `direct`+`indirect1`+`indirect2`+`indirect3` slot range
	/// reinterpreted as one flat byte buffer, for SYML inodes. The
	/// layout is contiguous and has no interior padding (all slots are
	/// `u64`), so this reinterpretation is sound.
	fn symlink_buf(&self) -> &[u8; SYMLINK_MAX_LEN] {
		let ptr = self.direct.as_ptr() as *const [u8; SYMLINK_MAX_LEN];
		unsafe { &*ptr }
	}

	fn symlink_buf_mut(&mut self) -> &mut [u8; SYMLINK_MAX_LEN] {
		let ptr = self.direct.as_mut_ptr() as *mut [u8; SYMLINK_MAX_LEN];
		unsafe { &mut *ptr }
	}

	/// Reads a symlink's target path. `n_bytes` holds the target's
	/// length, matching how regular file inodes track their data size.
	pub fn symlink_target(&self) -> &[u8] {
		&self.symlink_buf()[..self.n_bytes as usize]
	}

	/// Sets a symlink's target path. Fails with [`Error::NameTooLong`]
	/// if it exceeds [`SYMLINK_MAX_LEN`](crate::params::SYMLINK_MAX_LEN).
	pub fn set_symlink_target(&mut self, target: &[u8]) -> Result<()> {
		if target.len() > SYMLINK_MAX_LEN {
			return Err(Error::NameTooLong);
		}
		let buf = self.symlink_buf_mut();
		buf[..target.len()].copy_from_slice(target);
		buf[target.len()..].fill(0);
		self.n_bytes = target.len() as u64;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn size_matches_inode_size() {
		assert_eq!(core::mem::size_of::<Inode>(), INODE_SIZE);
	}

	#[test]
	fn permission_checks_follow_owner_group_world() {
		let mut ino = Inode::new(1, InodeType::File, 100, 200, Permissions::OWNER_R);
		assert!(ino.can_read(100, 200));
		assert!(!ino.can_read(101, 200));
		ino.set_permissions(Permissions::GROUP_W);
		assert!(ino.can_write(101, 200));
		assert!(!ino.can_write(101, 201));
	}

	#[test]
	fn symlinks_always_report_full_permissions() {
		let ino = Inode::new(1, InodeType::Symlink, 0, 0, Permissions::empty());
		assert_eq!(ino.permissions().bits(), 0o777);
	}

	#[test]
	fn symlink_target_round_trips() {
		let mut ino = Inode::new(1, InodeType::Symlink, 0, 0, Permissions::empty());
		ino.set_symlink_target(b"../other/file").unwrap();
		assert_eq!(ino.symlink_target(), b"../other/file");
	}

	#[test]
	fn oversized_symlink_target_is_rejected() {
		let mut ino = Inode::new(1, InodeType::Symlink, 0, 0, Permissions::empty());
		let too_long = vec![b'a'; SYMLINK_MAX_LEN + 1];
		assert!(matches!(
			ino.set_symlink_target(&too_long),
			Err(Error::NameTooLong)
		));
	}
}
