//! Content hashing used for resume decisions and integrity checks

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::error::Result;

// Read granularity while hashing; files are never loaded whole
const HASH_BUF_SIZE: usize = 64 * 1024;

/// SHA-256 of `data` as lowercase hex.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// SHA-256 of at most `limit` bytes pulled from `reader` (all of it when `None`).
pub fn hash_reader<R: Read>(reader: &mut R, limit: Option<u64>) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    let mut remaining = limit.unwrap_or(u64::MAX);
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = match reader.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of a whole file.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut f = File::open(path)?;
    hash_reader(&mut f, None)
}

/// SHA-256 of the byte range `[0, end)` of a file, clamped to its length.
pub fn hash_prefix(path: &Path, end: u64) -> Result<String> {
    let mut f = File::open(path)?;
    hash_reader(&mut f, Some(end))
}
