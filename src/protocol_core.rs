//! Shared protocol I/O used by both the serving and the requesting side.
//!
//! Everything here works on plain `Read`/`Write` so handlers can be driven
//! over a `TcpStream` in production and over in-memory buffers in tests.

use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use crate::error::{Result, ShareError};
use crate::packet::WirePacket;
use crate::protocol::{sentinel, CODE_LEN, RECV_BUFFER_SIZE};

/// Encode and send one packet.
pub fn write_packet<W: Write + ?Sized, P: WirePacket>(w: &mut W, packet: &P) -> Result<()> {
    let bytes = packet.encode()?;
    w.write_all(&bytes)?;
    w.flush()?;
    Ok(())
}

/// Receive exactly one packet.
pub fn read_packet<R: Read + ?Sized, P: WirePacket>(r: &mut R) -> Result<P> {
    let mut buf = vec![0u8; P::SIZE];
    r.read_exact(&mut buf)?;
    P::decode(&buf)
}

/// Receive a packet, or `None` when the peer sent `marker` and closed.
///
/// A packet may legitimately begin with the same three bytes as the marker
/// (a file named `EOF...`), so the marker only counts when the peer hangs
/// up right after it.
pub fn read_packet_or_marker<R: Read + ?Sized, P: WirePacket>(
    r: &mut R,
    marker: &[u8; 3],
) -> Result<Option<P>> {
    let mut buf = vec![0u8; P::SIZE];
    r.read_exact(&mut buf[..CODE_LEN])?;
    if &buf[..CODE_LEN] == marker {
        match r.read_exact(&mut buf[CODE_LEN..]) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
    } else {
        r.read_exact(&mut buf[CODE_LEN..])?;
    }
    P::decode(&buf).map(Some)
}

pub fn write_sentinel<W: Write + ?Sized>(w: &mut W, s: &[u8; 3]) -> Result<()> {
    w.write_all(s)?;
    w.flush()?;
    Ok(())
}

pub fn read_sentinel<R: Read + ?Sized>(r: &mut R) -> Result<[u8; 3]> {
    let mut buf = [0u8; 3];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Wait for the peer's acknowledgment.
pub fn expect_ack<R: Read + ?Sized>(r: &mut R) -> Result<()> {
    let got = read_sentinel(r)?;
    if &got == sentinel::ACK {
        Ok(())
    } else if &got == sentinel::ERR {
        Err(ShareError::PeerRejected)
    } else {
        Err(ShareError::UnexpectedSentinel(got))
    }
}

/// Read the command code that opens every connection.
pub fn read_code<R: Read + ?Sized>(r: &mut R) -> Result<[u8; CODE_LEN]> {
    let mut code = [0u8; CODE_LEN];
    r.read_exact(&mut code)?;
    Ok(code)
}

/// Receive an unframed payload with a single read.
///
/// The sender always waits for a reply after such a payload, so whatever
/// the first read returns is the whole message.
pub fn read_message<R: Read + ?Sized>(r: &mut R) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let n = loop {
        match r.read(&mut buf) {
            Ok(n) => break n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    };
    buf.truncate(n);
    Ok(buf)
}

/// Receive an unframed payload terminated by the peer closing the connection.
pub fn read_to_close<R: Read + ?Sized>(r: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Create parent directory if needed
pub fn ensure_parent_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{FileEntry, RequestPacket};
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_packet_over_stream() {
        let req = RequestPacket::fresh("a/b.txt");
        let mut wire = Vec::new();
        write_packet(&mut wire, &req).unwrap();
        assert_eq!(wire.len(), 200);
        let back: RequestPacket = read_packet(&mut Cursor::new(wire)).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_truncated_packet_is_io_error() {
        let mut cur = Cursor::new(vec![0u8; 50]);
        let res: Result<RequestPacket> = read_packet(&mut cur);
        assert!(matches!(res, Err(ShareError::Io(_))));
    }

    #[test]
    fn test_marker_then_close_ends_stream() {
        let mut cur = Cursor::new(sentinel::EOF.to_vec());
        let res: Option<FileEntry> = read_packet_or_marker(&mut cur, sentinel::EOF).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn test_entry_starting_with_marker_bytes_is_not_confused() {
        let entry = FileEntry {
            filename: "EOF-notes.md".to_string(),
            filesize: 12,
            is_dir: false,
        };
        let mut wire = Vec::new();
        write_packet(&mut wire, &entry).unwrap();
        let res: Option<FileEntry> =
            read_packet_or_marker(&mut Cursor::new(wire), sentinel::EOF).unwrap();
        assert_eq!(res, Some(entry));
    }

    #[test]
    fn test_expect_ack_variants() {
        assert!(expect_ack(&mut Cursor::new(b"ACK".to_vec())).is_ok());
        assert!(matches!(
            expect_ack(&mut Cursor::new(b"ERR".to_vec())),
            Err(ShareError::PeerRejected)
        ));
        assert!(matches!(
            expect_ack(&mut Cursor::new(b"EOF".to_vec())),
            Err(ShareError::UnexpectedSentinel(s)) if &s == b"EOF"
        ));
        assert!(matches!(
            expect_ack(&mut Cursor::new(b"A".to_vec())),
            Err(ShareError::Io(_))
        ));
    }

    #[test]
    fn test_read_message_single_read() {
        let mut cur = Cursor::new(b"uploads/new.bin".to_vec());
        assert_eq!(read_message(&mut cur).unwrap(), b"uploads/new.bin");
        assert!(read_message(&mut cur).unwrap().is_empty());
    }

    #[test]
    fn test_ensure_parent_exists() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("new").join("nested").join("file.txt");

        assert!(!file_path.parent().unwrap().exists());
        ensure_parent_exists(&file_path).unwrap();
        assert!(file_path.parent().unwrap().is_dir());

        // Bare file names have no parent to create
        ensure_parent_exists(Path::new("plain.txt")).unwrap();
    }
}
