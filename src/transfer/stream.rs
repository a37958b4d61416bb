//! Chunk streaming with one chunk in flight.
//!
//! The sender writes a chunk and blocks until the receiver answers `ACK`
//! (continue) or `ERR` (abort). Full chunks are exactly `chunk_size` bytes;
//! the final one may be shorter, so the sender half-closes its write side
//! after it and the receiver reads that chunk up to `chunk_size` or EOF.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};

use tracing::trace;

use crate::chunker::Chunks;
use crate::error::{Result, ShareError};
use crate::progress::TransferProgress;
use crate::protocol::sentinel;
use crate::protocol_core::{expect_ack, write_sentinel};

/// A bidirectional byte stream whose write half can be closed on its own.
pub trait Channel: Read + Write {
    fn close_write(&mut self) -> std::io::Result<()>;
}

impl Channel for TcpStream {
    fn close_write(&mut self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// Stream at most `count` chunks, waiting for an acknowledgment after each.
///
/// Returns the number of bytes sent. The write half is closed afterwards,
/// so nothing else may be sent on this channel.
pub fn send_chunks<C, P>(
    channel: &mut C,
    chunks: Chunks,
    count: u64,
    progress: &mut P,
) -> Result<u64>
where
    C: Channel + ?Sized,
    P: TransferProgress + ?Sized,
{
    let mut sent = 0u64;
    let mut closed = false;
    let mut chunks = chunks.take(count as usize).peekable();
    while let Some(chunk) = chunks.next() {
        let chunk = chunk?;
        channel.write_all(&chunk.data)?;
        channel.flush()?;
        // The receiver reads the final chunk up to EOF, so close before its ACK.
        // A source that shrank since planning ends early; its short chunk is final too.
        if chunks.peek().is_none() {
            channel.close_write()?;
            closed = true;
        }
        expect_ack(channel)?;
        sent += chunk.data.len() as u64;
        progress.advance(chunk.data.len() as u64);
        trace!(index = chunk.index, len = chunk.data.len(), "chunk acknowledged");
    }
    if !closed {
        channel.close_write()?;
    }
    Ok(sent)
}

/// Receive `count` chunks into `out`, acknowledging each after it is written.
///
/// A local write failure is reported to the sender with `ERR` before the
/// error is returned. Returns the number of bytes written.
pub fn receive_chunks<C, W, P>(
    channel: &mut C,
    out: &mut W,
    count: u64,
    chunk_size: usize,
    progress: &mut P,
) -> Result<u64>
where
    C: Channel + ?Sized,
    W: Write + ?Sized,
    P: TransferProgress + ?Sized,
{
    let mut buf = vec![0u8; chunk_size];
    let mut written = 0u64;
    for index in 0..count {
        let n = if index + 1 == count {
            read_final_chunk(channel, &mut buf)?
        } else {
            channel.read_exact(&mut buf)?;
            buf.len()
        };
        if n == 0 {
            return Err(ShareError::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("sender closed before chunk {} of {}", index + 1, count),
            )));
        }
        if let Err(e) = out.write_all(&buf[..n]).and_then(|_| out.flush()) {
            let _ = write_sentinel(channel, sentinel::ERR);
            return Err(e.into());
        }
        write_sentinel(channel, sentinel::ACK)?;
        written += n as u64;
        progress.advance(n as u64);
        trace!(index, len = n, "chunk stored");
    }
    Ok(written)
}

// Read until the buffer is full or the sender half-closes.
fn read_final_chunk<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkSource;
    use crate::progress::Silent;
    use std::fs;
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[derive(Default)]
    struct Counting {
        bytes: u64,
        calls: u64,
    }

    impl TransferProgress for Counting {
        fn advance(&mut self, bytes: u64) {
            self.bytes += bytes;
            self.calls += 1;
        }
    }

    #[test]
    fn test_stream_reassembles_file() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("src.bin");
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 241) as u8).collect();
        fs::write(&p, &data).unwrap();
        let src = ChunkSource::new(&p, 1024);
        let count = src.chunk_count(0).unwrap();

        let (mut tx, mut rx) = socket_pair();
        let sender = thread::spawn(move || {
            let chunks = src.chunks(0).unwrap();
            send_chunks(&mut tx, chunks, count, &mut Silent).unwrap()
        });

        let mut out = Vec::new();
        let mut progress = Counting::default();
        let got = receive_chunks(&mut rx, &mut out, count, 1024, &mut progress).unwrap();

        assert_eq!(sender.join().unwrap(), 5000);
        assert_eq!(got, 5000);
        assert_eq!(out, data);
        assert_eq!(progress.calls, 5);
        assert_eq!(progress.bytes, 5000);
    }

    #[test]
    fn test_exact_multiple_final_chunk() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("even.bin");
        fs::write(&p, vec![9u8; 2048]).unwrap();
        let src = ChunkSource::new(&p, 1024);

        let (mut tx, mut rx) = socket_pair();
        let sender = thread::spawn(move || {
            send_chunks(&mut tx, src.chunks(0).unwrap(), 2, &mut Silent).unwrap()
        });
        let mut out = Vec::new();
        receive_chunks(&mut rx, &mut out, 2, 1024, &mut Silent).unwrap();
        sender.join().unwrap();
        assert_eq!(out.len(), 2048);
    }

    #[test]
    fn test_source_shorter_than_planned_fails_instead_of_hanging() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("shrunk.bin");
        fs::write(&p, vec![4u8; 1500]).unwrap();
        let src = ChunkSource::new(&p, 1024);

        // Planned for 3 chunks, the file only holds 2.
        let (mut tx, mut rx) = socket_pair();
        let sender =
            thread::spawn(move || send_chunks(&mut tx, src.chunks(0).unwrap(), 3, &mut Silent));

        let mut out = Vec::new();
        let err = receive_chunks(&mut rx, &mut out, 3, 1024, &mut Silent).unwrap_err();
        assert!(matches!(err, ShareError::Io(ref e) if e.kind() == ErrorKind::UnexpectedEof));
        assert_eq!(out.len(), 1024);
        drop(rx);

        assert!(sender.join().unwrap().is_err());
    }

    #[test]
    fn test_sender_stops_on_err() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("src.bin");
        fs::write(&p, vec![1u8; 3000]).unwrap();
        let src = ChunkSource::new(&p, 1024);

        let (mut tx, mut rx) = socket_pair();
        let sender =
            thread::spawn(move || send_chunks(&mut tx, src.chunks(0).unwrap(), 3, &mut Silent));

        let mut buf = vec![0u8; 1024];
        rx.read_exact(&mut buf).unwrap();
        write_sentinel(&mut rx, sentinel::ERR).unwrap();

        assert!(matches!(sender.join().unwrap(), Err(ShareError::PeerRejected)));
    }

    #[test]
    fn test_receiver_reports_early_close() {
        let (mut tx, mut rx) = socket_pair();
        tx.close_write().unwrap();
        let mut out = Vec::new();
        let err = receive_chunks(&mut rx, &mut out, 1, 1024, &mut Silent).unwrap_err();
        assert!(matches!(err, ShareError::Io(e) if e.kind() == ErrorKind::UnexpectedEof));
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::Other, "disk full"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_receiver_write_failure_sends_err() {
        let (mut tx, mut rx) = socket_pair();
        let receiver = thread::spawn(move || {
            receive_chunks(&mut rx, &mut FailingWriter, 1, 1024, &mut Silent)
        });
        tx.write_all(b"short final chunk").unwrap();
        tx.close_write().unwrap();

        let mut answer = [0u8; 3];
        tx.read_exact(&mut answer).unwrap();
        assert_eq!(&answer, sentinel::ERR);
        assert!(receiver.join().unwrap().is_err());
    }
}
