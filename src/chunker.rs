//! Fixed-size chunking of a file for streaming.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::checksum;
use crate::error::Result;

/// A block of file bytes and its position in the current transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based, counted from the offset the iteration started at.
    pub index: u64,
    pub data: Vec<u8>,
}

/// Source of chunks for one file.
///
/// Holds only the path: every call to [`ChunkSource::chunks`] reopens the file,
/// so a retried transfer never observes a half-consumed iterator.
#[derive(Debug, Clone)]
pub struct ChunkSource {
    path: PathBuf,
    chunk_size: usize,
}

impl ChunkSource {
    /// # Panics
    /// If `chunk_size` is zero.
    pub fn new(path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            path: path.into(),
            chunk_size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Current size of the underlying file.
    pub fn len(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Number of chunks needed to send the file from `start` to its end.
    pub fn chunk_count(&self, start: u64) -> Result<u64> {
        Ok(chunks_for(self.len()?, start, self.chunk_size))
    }

    /// Lazily read the file from `start` in `chunk_size` blocks.
    pub fn chunks(&self, start: u64) -> Result<Chunks> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(start))?;
        Ok(Chunks {
            file,
            chunk_size: self.chunk_size,
            next_index: 0,
            done: false,
        })
    }

    pub fn full_hash(&self) -> Result<String> {
        checksum::hash_file(&self.path)
    }

    /// Hash of bytes `[0, end)`.
    pub fn partial_hash(&self, end: u64) -> Result<String> {
        checksum::hash_prefix(&self.path, end)
    }
}

/// `ceil((len - start) / chunk_size)`, or 0 once `start` reaches the end.
pub fn chunks_for(len: u64, start: u64, chunk_size: usize) -> u64 {
    if start >= len {
        return 0;
    }
    let remaining = len - start;
    let size = chunk_size as u64;
    remaining / size + u64::from(remaining % size != 0)
}

/// Iterator returned by [`ChunkSource::chunks`].
pub struct Chunks {
    file: File,
    chunk_size: usize,
    next_index: u64,
    done: bool,
}

impl Chunks {
    // Fill a whole block unless EOF comes first; only the last chunk is short.
    fn fill(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

impl Iterator for Chunks {
    type Item = std::io::Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fill() {
            Ok(data) if data.is_empty() => {
                self.done = true;
                None
            }
            Ok(data) => {
                if data.len() < self.chunk_size {
                    self.done = true;
                }
                let index = self.next_index;
                self.next_index += 1;
                Some(Ok(Chunk { index, data }))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
