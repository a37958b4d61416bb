//! GET: the requester downloads a file, resuming a verified local prefix.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::negotiate::{describe_local, plan_transfer, resume_offset};
use super::stream::{receive_chunks, send_chunks, Channel};
use super::TransferSummary;
use crate::checksum;
use crate::chunker::ChunkSource;
use crate::client::ClientHooks;
use crate::error::{Result, ShareError};
use crate::packet::{PreTransferPacket, RequestPacket};
use crate::progress::Silent;
use crate::protocol::{sentinel, CHUNK_SIZE};
use crate::protocol_core::{ensure_parent_exists, read_packet, read_sentinel, write_packet, write_sentinel};

/// How a GET ended for the requesting side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    /// The peer has no such file.
    NotFound,
    /// The local copy did not match and overwriting it was declined.
    Declined,
    Completed(TransferSummary),
}

/// How a GET ended for the serving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServedGet {
    NotFound(PathBuf),
    Declined(PathBuf),
    Sent {
        path: PathBuf,
        resumed_from: u64,
        chunks: u64,
        bytes: u64,
    },
}

/// Where a download of `remote` into `local` lands: inside `local` when it is
/// a directory, at `local` otherwise.
pub fn output_path(remote: &str, local: &Path) -> PathBuf {
    if local.is_dir() {
        let name = Path::new(remote)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| remote.into());
        local.join(name)
    } else {
        local.to_path_buf()
    }
}

/// Serve one GET request for files under `workdir`.
///
/// `on_start` is called with the resolved path and resume offset right
/// before the first chunk is sent.
pub fn serve_get<C, F>(channel: &mut C, workdir: &Path, on_start: F) -> Result<ServedGet>
where
    C: Channel + ?Sized,
    F: FnOnce(&Path, u64),
{
    let request: RequestPacket = read_packet(channel)?;
    debug!(?request, "GET request");
    let path = workdir.join(&request.filename);
    let source = ChunkSource::new(&path, CHUNK_SIZE);
    let plan = plan_transfer(&source, &request)?;
    write_packet(channel, &plan)?;
    debug!(?plan, "GET plan sent");

    if !plan.exists {
        info!(path = %path.display(), "requested file does not exist");
        return Ok(ServedGet::NotFound(path));
    }
    if !plan.continuation && request.filesize > 0 {
        // The requester's copy is about to be replaced; it must agree first.
        let answer = read_sentinel(channel)?;
        if &answer != sentinel::ACK {
            info!(path = %path.display(), "requester declined overwrite");
            return Ok(ServedGet::Declined(path));
        }
    }

    let start = resume_offset(&plan, &request);
    on_start(&path, start);
    let bytes = send_chunks(channel, source.chunks(start)?, plan.number_of_chunks, &mut Silent)?;
    Ok(ServedGet::Sent {
        path,
        resumed_from: start,
        chunks: plan.number_of_chunks,
        bytes,
    })
}

/// Download `remote` from the peer on `channel` into `local`.
pub fn fetch<C, H>(channel: &mut C, remote: &str, local: &Path, hooks: &mut H) -> Result<GetOutcome>
where
    C: Channel + ?Sized,
    H: ClientHooks + ?Sized,
{
    let output = output_path(remote, local);
    let request = describe_local(&output, remote)?;
    write_packet(channel, &request)?;
    let plan: PreTransferPacket = read_packet(channel)?;
    debug!(?plan, "GET plan received");

    if !plan.exists {
        return Ok(GetOutcome::NotFound);
    }
    if request.filesize > 0 && !plan.continuation {
        if !hooks.confirm_overwrite(&output) {
            write_sentinel(channel, sentinel::ERR)?;
            return Ok(GetOutcome::Declined);
        }
        write_sentinel(channel, sentinel::ACK)?;
    }

    let start = resume_offset(&plan, &request);
    ensure_parent_exists(&output)?;
    let mut file = if plan.continuation {
        OpenOptions::new().create(true).append(true).open(&output)?
    } else {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&output)?
    };

    hooks.begin(remote, plan.number_of_chunks, start);
    let bytes = receive_chunks(channel, &mut file, plan.number_of_chunks, CHUNK_SIZE, hooks)?;
    hooks.finish();
    drop(file);

    let actual = checksum::hash_file(&output)?;
    let verified = actual.eq_ignore_ascii_case(&plan.filehash);
    if !verified {
        warn!(path = %output.display(), "downloaded file failed integrity check");
    }
    Ok(GetOutcome::Completed(TransferSummary {
        path: output,
        resumed_from: start,
        chunks: plan.number_of_chunks,
        bytes,
        expected_hash: plan.filehash,
        actual_hash: Some(actual),
        verified,
    }))
}

impl GetOutcome {
    /// Collapse the outcome into an error for callers that only want success.
    pub fn into_result(self, remote: &str) -> Result<TransferSummary> {
        match self {
            GetOutcome::NotFound => Err(ShareError::FileNotFound(remote.into())),
            GetOutcome::Declined => Err(ShareError::ResumeRejected),
            GetOutcome::Completed(summary) => {
                summary.integrity()?;
                Ok(summary)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_output_path_into_directory() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            output_path("remote/dir/report.txt", dir.path()),
            dir.path().join("report.txt")
        );
        let file = dir.path().join("renamed.txt");
        assert_eq!(output_path("report.txt", &file), file);
    }

    #[test]
    fn test_into_result_maps_outcomes() {
        assert!(matches!(
            GetOutcome::NotFound.into_result("x"),
            Err(ShareError::FileNotFound(_))
        ));
        assert!(matches!(
            GetOutcome::Declined.into_result("x"),
            Err(ShareError::ResumeRejected)
        ));
        let bad = TransferSummary {
            path: "x".into(),
            resumed_from: 0,
            chunks: 1,
            bytes: 3,
            expected_hash: "aa".into(),
            actual_hash: Some("bb".into()),
            verified: false,
        };
        assert!(matches!(
            GetOutcome::Completed(bad).into_result("x"),
            Err(ShareError::IntegrityMismatch { .. })
        ));
    }
}
