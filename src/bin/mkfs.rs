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

//! `mkfs.cofs`: formats a block device or regular file as a fresh COFS
//! volume.
//!
//! Grounded on the reference implementation's `cofs_mkfs.c` CLI, which
//! takes `-o <owner>` / `-g <group>` plus a device path, defaulting to
//! the caller's own uid/gid.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use cofs::block_device::{AnonDevice, MmapDevice};
use cofs::format::mkfs;
use cofs::params::BLOCK_SIZE;

#[derive(Parser)]
#[command(name = "mkfs.cofs", about = "Format a device or file as a COFS volume")]
struct Args {
	/// Device or regular file to format.
	device: Option<PathBuf>,

	/// Owning uid for the root directory (defaults to the caller's).
	#[arg(short = 'o', long)]
	owner: Option<u32>,

	/// Owning gid for the root directory (defaults to the caller's).
	#[arg(short = 'g', long)]
	group: Option<u32>,

	/// Create `device` as a new regular file of this size (bytes) instead
	/// of formatting an existing one.
	#[arg(long, value_name = "BYTES")]
	create: Option<u64>,

	/// Format a volume entirely in memory, of this size (bytes), and
	/// report its stats without writing anything to disk. Mutually
	/// exclusive with `device`; useful for a quick smoke test.
	#[arg(short = 'm', long = "mem", value_name = "BYTES", conflicts_with = "device")]
	mem: Option<u64>,
}

fn main() -> ExitCode {
	env_logger::init();
	let args = Args::parse();

	let uid = args.owner.unwrap_or_else(|| unsafe { libc::getuid() });
	let gid = args.group.unwrap_or_else(|| unsafe { libc::getgid() });

	if let Some(size) = args.mem {
		let rounded = size.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64;
		let mut dev = match AnonDevice::new(rounded) {
			Ok(d) => d,
			Err(e) => {
				eprintln!("mkfs.cofs: could not allocate {rounded} bytes in memory: {e}");
				return ExitCode::FAILURE;
			}
		};
		return match mkfs(&mut dev, uid, gid) {
			Ok(sb) => {
				println!("formatted an in-memory volume: {} blocks, root directory is inode {}", sb.n_blocks, sb.root_dir);
				ExitCode::SUCCESS
			}
			Err(e) => {
				eprintln!("mkfs.cofs: {e}");
				ExitCode::FAILURE
			}
		};
	}

	let Some(device) = args.device else {
		eprintln!("Usage: mkfs.cofs [-o <uid>] [-g <gid>] <device path>");
		return ExitCode::FAILURE;
	};

	let mut dev = if let Some(size) = args.create {
		match MmapDevice::create(&device, size) {
			Ok(d) => d,
			Err(e) => {
				eprintln!("mkfs.cofs: unable to create '{}': {e}", device.display());
				return ExitCode::FAILURE;
			}
		}
	} else {
		match MmapDevice::open(&device) {
			Ok(d) => d,
			Err(e) => {
				eprintln!("mkfs.cofs: unable to open block device '{}': {e}", device.display());
				return ExitCode::FAILURE;
			}
		}
	};

	match mkfs(&mut dev, uid, gid) {
		Ok(sb) => {
			println!("{}: {} blocks, root directory is inode {}", device.display(), sb.n_blocks, sb.root_dir);
			ExitCode::SUCCESS
		}
		Err(e) => {
			eprintln!("mkfs.cofs failed for '{}': {e}", device.display());
			ExitCode::FAILURE
		}
	}
}
