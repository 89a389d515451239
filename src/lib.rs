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

//! A Unix V7-style on-disk filesystem: a singly-linked free-block list, a
//! fixed-size i-list, and a four-level direct/indirect block-reference
//! tree per inode, wrapped in a mountable [`fs::FileSystem`] handle.
//!
//! Module layout mirrors the reference implementation's layering:
//! block I/O ([`block_device`]) underlies the superblock, i-list, and
//! free-list records, which [`blocktree`] and [`file_io`] build byte-range
//! I/O on top of, which [`dirent`] and [`path`] build directory and
//! pathname resolution on top of, which [`fs`] ties into one mounted
//! handle. [`format`] and [`fsck`] are the two volume-wide tools that sit
//! beside a mount rather than inside one.

pub mod block_device;
pub mod blocktree;
pub mod dirent;
pub mod error;
pub mod file_io;
pub mod format;
pub mod freelist;
pub mod fs;
pub mod fsck;
pub mod handle_table;
pub mod ilist;
pub mod inode;
pub mod params;
pub mod path;
pub mod superblock;

pub use error::{Error, Result};
pub use fs::FileSystem;
