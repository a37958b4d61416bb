//! Fixed-layout packets exchanged during negotiation and listing.
//!
//! All integers are big-endian, text fields are UTF-8 padded with NUL bytes to
//! their field width, and there is no alignment padding between fields:
//!
//! ```text
//! RequestPacket      filename[128] | filesize u64 | filehash[64]                  = 200 bytes
//! PreTransferPacket  exists u8 | continuation u8 | number_of_chunks u64 | filehash[64] = 74 bytes
//! FileEntry          filename[128] | filesize u64 | is_dir u8                     = 137 bytes
//! ```

use crate::error::{Result, ShareError};
use crate::protocol::field;

/// A packet with a fixed on-the-wire size.
pub trait WirePacket: Sized {
    const SIZE: usize;

    fn encode(&self) -> Result<Vec<u8>>;

    /// Decode from the first `SIZE` bytes of `data`; extra bytes are ignored.
    fn decode(data: &[u8]) -> Result<Self>;
}

/// What the requesting side asks for and what it already holds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestPacket {
    pub filename: String,
    /// Size of the local copy, 0 if there is none.
    pub filesize: u64,
    /// SHA-256 hex of the local copy, empty if there is none.
    pub filehash: String,
}

impl RequestPacket {
    /// Request for a file the sender holds no copy of.
    pub fn fresh(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            filesize: 0,
            filehash: String::new(),
        }
    }
}

/// Answer to a [`RequestPacket`]: existence, resumability and the transfer plan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreTransferPacket {
    pub exists: bool,
    /// Resume from the requester's current size instead of restarting.
    pub continuation: bool,
    pub number_of_chunks: u64,
    /// SHA-256 hex of the complete file, empty if it does not exist.
    pub filehash: String,
}

impl PreTransferPacket {
    pub fn absent() -> Self {
        Self::default()
    }
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub filename: String,
    pub filesize: u64,
    pub is_dir: bool,
}

impl WirePacket for RequestPacket {
    const SIZE: usize = field::FILENAME + 8 + field::FILEHASH;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        put_text(&mut buf, "filename", &self.filename, field::FILENAME)?;
        buf.extend_from_slice(&self.filesize.to_be_bytes());
        put_text(&mut buf, "filehash", &self.filehash, field::FILEHASH)?;
        Ok(buf)
    }

    fn decode(data: &[u8]) -> Result<Self> {
        let data = require_len::<Self>("RequestPacket", data)?;
        let (name, rest) = data.split_at(field::FILENAME);
        let (size, hash) = rest.split_at(8);
        Ok(Self {
            filename: take_text("filename", name)?,
            filesize: take_u64(size),
            filehash: take_text("filehash", hash)?,
        })
    }
}

impl WirePacket for PreTransferPacket {
    const SIZE: usize = 1 + 1 + 8 + field::FILEHASH;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.push(self.exists as u8);
        buf.push(self.continuation as u8);
        buf.extend_from_slice(&self.number_of_chunks.to_be_bytes());
        put_text(&mut buf, "filehash", &self.filehash, field::FILEHASH)?;
        Ok(buf)
    }

    fn decode(data: &[u8]) -> Result<Self> {
        let data = require_len::<Self>("PreTransferPacket", data)?;
        Ok(Self {
            exists: take_bool("exists", data[0])?,
            continuation: take_bool("continuation", data[1])?,
            number_of_chunks: take_u64(&data[2..10]),
            filehash: take_text("filehash", &data[10..])?,
        })
    }
}

impl WirePacket for FileEntry {
    const SIZE: usize = field::FILENAME + 8 + 1;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        put_text(&mut buf, "filename", &self.filename, field::FILENAME)?;
        buf.extend_from_slice(&self.filesize.to_be_bytes());
        buf.push(self.is_dir as u8);
        Ok(buf)
    }

    fn decode(data: &[u8]) -> Result<Self> {
        let data = require_len::<Self>("FileEntry", data)?;
        let (name, rest) = data.split_at(field::FILENAME);
        Ok(Self {
            filename: take_text("filename", name)?,
            filesize: take_u64(&rest[..8]),
            is_dir: take_bool("is_dir", rest[8])?,
        })
    }
}

fn require_len<'a, P: WirePacket>(what: &str, data: &'a [u8]) -> Result<&'a [u8]> {
    if data.len() < P::SIZE {
        return Err(ShareError::MalformedPacket(format!(
            "{} needs {} bytes, got {}",
            what,
            P::SIZE,
            data.len()
        )));
    }
    Ok(&data[..P::SIZE])
}

fn put_text(buf: &mut Vec<u8>, name: &'static str, text: &str, width: usize) -> Result<()> {
    let bytes = text.as_bytes();
    if bytes.len() > width {
        return Err(ShareError::FieldTooLong {
            field: name,
            len: bytes.len(),
            max: width,
        });
    }
    buf.extend_from_slice(bytes);
    buf.resize(buf.len() + (width - bytes.len()), 0);
    Ok(())
}

// A field without a NUL terminator fills its whole width.
fn take_text(name: &str, raw: &[u8]) -> Result<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8(raw[..end].to_vec())
        .map_err(|e| ShareError::MalformedPacket(format!("{} is not UTF-8: {}", name, e)))
}

fn take_bool(name: &str, byte: u8) -> Result<bool> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ShareError::MalformedPacket(format!(
            "{} must be 0 or 1, got {}",
            name, other
        ))),
    }
}

fn take_u64(raw: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&raw[..8]);
    u64::from_be_bytes(bytes)
}
