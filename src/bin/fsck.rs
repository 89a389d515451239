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

//! `fsck.cofs`: checks a COFS volume for consistency, printing any
//! discrepancies and exiting non-zero if the volume is not intact.
//!
//! Grounded on the reference implementation's `cofs_fsck.c` CLI
//! (`fsck_on_dev`/`fsck_in_mem`).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use cofs::block_device::MmapDevice;
use cofs::fsck::check;
use cofs::superblock::Superblock;

#[derive(Parser)]
#[command(name = "fsck.cofs", about = "Check a COFS volume for consistency")]
struct Args {
	/// Device or regular file to check.
	#[arg(short = 'b', long = "device")]
	device: PathBuf,
}

fn main() -> ExitCode {
	env_logger::init();
	let args = Args::parse();

	let dev = match MmapDevice::open(&args.device) {
		Ok(d) => d,
		Err(e) => {
			eprintln!("fsck.cofs: unable to open '{}': {e}", args.device.display());
			return ExitCode::FAILURE;
		}
	};

	let sb = match Superblock::read(&dev) {
		Ok(sb) => sb,
		Err(e) => {
			eprintln!("fsck.cofs: '{}' does not look like a COFS volume: {e}", args.device.display());
			return ExitCode::FAILURE;
		}
	};

	let report = match check(&dev, &sb) {
		Ok(r) => r,
		Err(e) => {
			eprintln!("fsck.cofs: check aborted: {e}");
			return ExitCode::FAILURE;
		}
	};

	if report.intact {
		println!("{}: clean", args.device.display());
		ExitCode::SUCCESS
	} else {
		for issue in &report.issues {
			println!("{}: {issue}", args.device.display());
		}
		println!("{}: {} issue(s) found", args.device.display(), report.issues.len());
		ExitCode::FAILURE
	}
}
