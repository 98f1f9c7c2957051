//! Shared test utilities for integration tests
//!
//! Fixture text is the classic numbered log: one line per number with
//! its hex form and the number modulo 256.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use assert_fs::prelude::*;
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};

/// Expected content of line `i`, without the terminator.
pub fn numbered_line(i: u64) -> String
{
    format!("Line {i} - Hex {i:x} - Mod {}", i & 0xff)
}

/// Lines 1..=n, each terminated by '\n'.
pub fn numbered_lines(n: u64) -> Vec<u8>
{
    let mut out = Vec::new();
    for i in 1..=n
    {
        out.extend_from_slice(numbered_line(i).as_bytes());
        out.push(b'\n');
    }
    out
}

pub fn gzip(data: &[u8]) -> Vec<u8>
{
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data)
        .expect("compress");
    enc.finish()
        .expect("finish gzip")
}

pub fn zlib(data: &[u8]) -> Vec<u8>
{
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data)
        .expect("compress");
    enc.finish()
        .expect("finish zlib")
}

/// Write `bytes` as `name` into `dir` and return the path.
pub fn write_file(
    dir: &assert_fs::TempDir,
    name: &str,
    bytes: &[u8],
) -> PathBuf
{
    let child = dir.child(name);
    child
        .write_binary(bytes)
        .expect("write fixture");
    child
        .path()
        .to_path_buf()
}

/// A temp dir holding `numbered.gz` with `n` numbered lines.
pub fn numbered_fixture(n: u64) -> (assert_fs::TempDir, PathBuf)
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let path = write_file(&tmp, "numbered.gz", &gzip(&numbered_lines(n)));
    (tmp, path)
}
