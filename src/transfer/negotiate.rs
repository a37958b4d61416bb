//! Pre-transfer negotiation: describing a local copy and deciding whether a
//! transfer may resume from it.

use std::path::Path;

use crate::checksum;
use crate::chunker::ChunkSource;
use crate::error::Result;
use crate::packet::{PreTransferPacket, RequestPacket};

/// Describe the copy of `name` held at `path`.
///
/// A missing or empty file is reported as "no local copy".
pub fn describe_local(path: &Path, name: &str) -> Result<RequestPacket> {
    match std::fs::metadata(path) {
        Ok(md) if md.is_file() && md.len() > 0 => Ok(RequestPacket {
            filename: name.to_string(),
            filesize: md.len(),
            filehash: checksum::hash_file(path)?,
        }),
        _ => Ok(RequestPacket::fresh(name)),
    }
}

/// Plan the transfer of `source` to a peer that holds `request`.
///
/// The peer's prefix is trusted only when it is non-empty, no longer than the
/// source, and hashes identically to the source's first `filesize` bytes.
pub fn plan_transfer(source: &ChunkSource, request: &RequestPacket) -> Result<PreTransferPacket> {
    if !source.path().is_file() {
        return Ok(PreTransferPacket::absent());
    }
    let len = source.len()?;
    let continuation = request.filesize > 0
        && request.filesize <= len
        && source
            .partial_hash(request.filesize)?
            .eq_ignore_ascii_case(&request.filehash);
    let start = if continuation { request.filesize } else { 0 };
    Ok(PreTransferPacket {
        exists: true,
        continuation,
        number_of_chunks: source.chunk_count(start)?,
        filehash: source.full_hash()?,
    })
}

/// Byte offset at which chunks start flowing under `plan`.
pub fn resume_offset(plan: &PreTransferPacket, request: &RequestPacket) -> u64 {
    if plan.continuation {
        request.filesize
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::hash_bytes;
    use std::fs;
    use tempfile::TempDir;

    fn remote_with(dir: &TempDir, data: &[u8]) -> ChunkSource {
        let p = dir.path().join("remote.bin");
        fs::write(&p, data).unwrap();
        ChunkSource::new(p, 1024)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    #[test]
    fn test_missing_source_is_absent() {
        let src = ChunkSource::new("/no/such/file", 1024);
        let plan = plan_transfer(&src, &RequestPacket::fresh("file")).unwrap();
        assert_eq!(plan, PreTransferPacket::absent());
    }

    #[test]
    fn test_directory_source_is_absent() {
        let dir = TempDir::new().unwrap();
        let src = ChunkSource::new(dir.path(), 1024);
        assert!(!plan_transfer(&src, &RequestPacket::fresh("d")).unwrap().exists);
    }

    #[test]
    fn test_fresh_request_plans_full_transfer() {
        let dir = TempDir::new().unwrap();
        let data = b"twenty-seven bytes of text!";
        let src = remote_with(&dir, data);
        let plan = plan_transfer(&src, &RequestPacket::fresh("report.txt")).unwrap();

        assert!(plan.exists);
        assert!(!plan.continuation);
        assert_eq!(plan.number_of_chunks, 1);
        assert_eq!(plan.filehash, hash_bytes(data));
    }

    #[test]
    fn test_matching_prefix_resumes_at_its_length() {
        let dir = TempDir::new().unwrap();
        let data = pattern(2500);
        let src = remote_with(&dir, &data);
        let req = RequestPacket {
            filename: "big".into(),
            filesize: 1024,
            filehash: hash_bytes(&data[..1024]),
        };
        let plan = plan_transfer(&src, &req).unwrap();

        assert!(plan.continuation);
        assert_eq!(plan.number_of_chunks, 2);
        assert_eq!(resume_offset(&plan, &req), 1024);
    }

    #[test]
    fn test_mismatching_prefix_restarts() {
        let dir = TempDir::new().unwrap();
        let data = pattern(2500);
        let src = remote_with(&dir, &data);
        let mut prefix = data[..1024].to_vec();
        prefix[500] ^= 0xff;
        let req = RequestPacket {
            filename: "big".into(),
            filesize: 1024,
            filehash: hash_bytes(&prefix),
        };
        let plan = plan_transfer(&src, &req).unwrap();

        assert!(plan.exists);
        assert!(!plan.continuation);
        assert_eq!(plan.number_of_chunks, 3);
        assert_eq!(resume_offset(&plan, &req), 0);
    }

    #[test]
    fn test_longer_local_copy_restarts() {
        let dir = TempDir::new().unwrap();
        let data = pattern(100);
        let src = remote_with(&dir, &data);
        let mut longer = data.clone();
        longer.extend_from_slice(b"tail");
        let req = RequestPacket {
            filename: "f".into(),
            filesize: longer.len() as u64,
            filehash: hash_bytes(&longer),
        };
        assert!(!plan_transfer(&src, &req).unwrap().continuation);
    }

    #[test]
    fn test_complete_local_copy_needs_no_chunks() {
        let dir = TempDir::new().unwrap();
        let data = pattern(3000);
        let src = remote_with(&dir, &data);
        let req = RequestPacket {
            filename: "f".into(),
            filesize: 3000,
            filehash: hash_bytes(&data),
        };
        let plan = plan_transfer(&src, &req).unwrap();
        assert!(plan.continuation);
        assert_eq!(plan.number_of_chunks, 0);
    }

    #[test]
    fn test_describe_local() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("local.bin");

        assert_eq!(describe_local(&p, "x").unwrap(), RequestPacket::fresh("x"));

        fs::write(&p, b"").unwrap();
        assert_eq!(describe_local(&p, "x").unwrap().filesize, 0);

        fs::write(&p, b"partial").unwrap();
        let d = describe_local(&p, "x").unwrap();
        assert_eq!(d.filesize, 7);
        assert_eq!(d.filehash, hash_bytes(b"partial"));

        assert_eq!(describe_local(dir.path(), "x").unwrap().filesize, 0);
    }
}
