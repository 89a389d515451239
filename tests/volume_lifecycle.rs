//! End-to-end exercises against a real file-backed volume: format, use,
//! unmount, remount, and check. Everything in `src/*.rs`'s own `#[cfg(test)]`
//! modules works against `AnonDevice`; these instead go through `tempfile`
//! and `MmapDevice` to exercise the on-disk layout exactly as `mkfs.cofs`/
//! `fsck.cofs`/`cofs-driver` would see it.

use cofs::block_device::{BlockDevice, MmapDevice};
use cofs::error::Error;
use cofs::format::mkfs;
use cofs::fs::FileSystem;
use cofs::fsck::check;
use cofs::inode::InodeType;
use cofs::params::{BLOCK_SIZE, DIRENTRIES_PER_BLOCK};
use cofs::superblock::Superblock;

fn blank_file(n_blocks: u64) -> tempfile::NamedTempFile {
	let file = tempfile::NamedTempFile::new().expect("create temp file");
	file.as_file().set_len(n_blocks * BLOCK_SIZE as u64).expect("size temp file");
	file
}

#[test]
fn format_mount_and_fsck_a_file_backed_volume() {
	let file = blank_file(128);

	let mut dev = MmapDevice::open(file.path()).unwrap();
	mkfs(&mut dev, 1000, 1000).unwrap();
	dev.flush().unwrap();

	let dev = MmapDevice::open(file.path()).unwrap();
	let sb = Superblock::read(&dev).unwrap();
	let report = check(&dev, &sb).unwrap();
	assert!(report.intact, "issues: {:?}", report.issues);
}

#[test]
fn state_survives_unmount_and_remount() {
	let file = blank_file(128);
	let dev = MmapDevice::open(file.path()).unwrap();
	let mut fs = FileSystem::format_and_mount(dev, 1000, 1000).unwrap();

	fs.mkdir("/etc", 0o755, 1000, 1000).unwrap();
	fs.mknod("/etc/passwd", InodeType::File, 0o644, 1000, 1000, None).unwrap();
	let fh = fs.open("/etc/passwd", 1000, 1000, true).unwrap();
	fs.write(fh, 0, b"root:x:0:0::/root:/bin/sh\n").unwrap();
	fs.release(fh);
	let dev = fs.unmount().unwrap();

	let mut fs = FileSystem::mount(dev).unwrap();
	let attr = fs.getattr("/etc/passwd").unwrap();
	assert_eq!(attr.n_bytes, 26);

	let fh = fs.open("/etc/passwd", 1000, 1000, false).unwrap();
	let mut buf = [0u8; 26];
	fs.read(fh, 0, &mut buf).unwrap();
	assert_eq!(&buf, b"root:x:0:0::/root:/bin/sh\n");
	fs.release(fh);

	let dev = fs.unmount().unwrap();
	let sb = Superblock::read(&dev).unwrap();
	let report = check(&dev, &sb).unwrap();
	assert!(report.intact, "issues: {:?}", report.issues);
}

#[test]
fn a_directory_spanning_many_entries_still_round_trips_after_remount() {
	let file = blank_file(256);
	let dev = MmapDevice::open(file.path()).unwrap();
	let mut fs = FileSystem::format_and_mount(dev, 0, 0).unwrap();

	fs.mkdir("/many", 0o755, 0, 0).unwrap();
	let n = DIRENTRIES_PER_BLOCK * 2 + 5;
	for i in 0..n {
		fs.mknod(&format!("/many/f{i}"), InodeType::File, 0o644, 0, 0, None).unwrap();
	}

	let dev = fs.unmount().unwrap();
	let mut fs = FileSystem::mount(dev).unwrap();
	let entries = fs.readdir("/many").unwrap();
	// every created file, plus "." and "..".
	assert_eq!(entries.len(), n + 2);
	for i in 0..n {
		assert!(fs.lookup(&format!("/many/f{i}")).is_ok());
	}
}

#[test]
fn mkdir_mknod_unlink_rmdir_restore_the_parents_entry_count() {
	let file = blank_file(64);
	let dev = MmapDevice::open(file.path()).unwrap();
	let mut fs = FileSystem::format_and_mount(dev, 0, 0).unwrap();

	let before = fs.getattr("/").unwrap().n_bytes;

	fs.mkdir("/tmp", 0o777, 0, 0).unwrap();
	fs.mknod("/tmp/a", InodeType::File, 0o644, 0, 0, None).unwrap();
	fs.mknod("/tmp/b", InodeType::File, 0o644, 0, 0, None).unwrap();
	assert_eq!(fs.readdir("/tmp").unwrap().len(), 4);

	fs.unlink("/tmp/a", 0, 0).unwrap();
	fs.unlink("/tmp/b", 0, 0).unwrap();
	assert_eq!(fs.readdir("/tmp").unwrap().len(), 2);

	fs.rmdir("/tmp", 0, 0).unwrap();
	assert!(matches!(fs.lookup("/tmp"), Err(Error::NotFound(_))));
	assert_eq!(fs.getattr("/").unwrap().n_bytes, before);
}

#[test]
fn rename_across_directories_updates_both_parents() {
	let file = blank_file(64);
	let dev = MmapDevice::open(file.path()).unwrap();
	let mut fs = FileSystem::format_and_mount(dev, 0, 0).unwrap();

	fs.mkdir("/a", 0o755, 0, 0).unwrap();
	fs.mkdir("/b", 0o755, 0, 0).unwrap();
	fs.mkdir("/a/sub", 0o755, 0, 0).unwrap();

	fs.rename("/a/sub", "/b/moved", 0, 0).unwrap();
	assert!(matches!(fs.lookup("/a/sub"), Err(Error::NotFound(_))));
	let moved = fs.lookup("/b/moved").unwrap();
	assert_eq!(fs.lookup("/b/moved/..").unwrap(), fs.lookup("/b").unwrap());
	assert_eq!(fs.lookup("/b/moved/.").unwrap(), moved);
}

#[test]
fn formatting_too_small_a_file_is_rejected() {
	let file = blank_file(1);
	let mut dev = MmapDevice::open(file.path()).unwrap();
	assert!(matches!(mkfs(&mut dev, 0, 0), Err(Error::NoSpace)));
}
