//! PUT: the requester uploads a file. Roles of GET are swapped: the serving
//! side describes its copy of the destination and the uploader decides
//! whether to resume.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::negotiate::{describe_local, plan_transfer, resume_offset};
use super::stream::{receive_chunks, send_chunks, Channel};
use super::TransferSummary;
use crate::checksum;
use crate::chunker::ChunkSource;
use crate::client::ClientHooks;
use crate::error::{Result, ShareError};
use crate::lock::UploadLock;
use crate::packet::{PreTransferPacket, RequestPacket};
use crate::progress::Silent;
use crate::protocol::{field, sentinel, CHUNK_SIZE};
use crate::protocol_core::{
    read_message, read_packet, read_packet_or_marker, read_sentinel,
    write_packet, write_sentinel,
};

/// How a PUT ended for the uploading side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The peer would not take the upload (locked, directory, bad path).
    Refused,
    Completed(TransferSummary),
}

/// How a PUT ended for the serving side.
#[derive(Debug)]
pub enum ServedPut {
    Refused { path: PathBuf, reason: ShareError },
    Received(TransferSummary),
}

/// Serve one upload into `workdir`.
///
/// The destination is locked for the whole exchange and unlocked on every
/// exit path. `on_start` is called with the destination and resume offset
/// before the first chunk arrives.
pub fn serve_put<C, F>(channel: &mut C, workdir: &Path, on_start: F) -> Result<ServedPut>
where
    C: Channel + ?Sized,
    F: FnOnce(&Path, u64),
{
    let raw = read_message(channel)?;
    let name = match parse_destination(&raw) {
        Ok(name) => name,
        Err(reason) => {
            write_sentinel(channel, sentinel::ERR)?;
            return Ok(ServedPut::Refused {
                path: PathBuf::from(String::from_utf8_lossy(&raw).into_owned()),
                reason,
            });
        }
    };
    let dest = workdir.join(&name);
    info!(dest = %dest.display(), "upload requested");

    let lock = match lock_destination(&dest) {
        Ok(lock) => lock,
        Err(reason) => {
            warn!(dest = %dest.display(), "upload refused: {}", reason);
            write_sentinel(channel, sentinel::ERR)?;
            return Ok(ServedPut::Refused { path: dest, reason });
        }
    };

    let outcome = receive_upload(channel, &dest, &name, on_start);
    if let Err(e) = lock.release() {
        warn!(dest = %dest.display(), "failed to release upload lock: {}", e);
    }
    outcome.map(ServedPut::Received)
}

// The marker lives next to the destination, so its directory has to exist
// before the lock can be taken. Directories created here are removed again
// when the lock is refused.
fn lock_destination(dest: &Path) -> Result<UploadLock> {
    let created = create_parents(dest)?;
    UploadLock::acquire(dest).map_err(|e| {
        remove_created(&created);
        e
    })
}

/// Create the missing ancestors of `dest`, returning those this call made,
/// outermost first.
fn create_parents(dest: &Path) -> Result<Vec<PathBuf>> {
    let mut missing = Vec::new();
    let mut dir = dest.parent();
    while let Some(d) = dir {
        if d.as_os_str().is_empty() || d.exists() {
            break;
        }
        missing.push(d.to_path_buf());
        dir = d.parent();
    }

    let mut created = Vec::new();
    for d in missing.into_iter().rev() {
        match fs::create_dir(&d) {
            Ok(()) => created.push(d),
            // Another upload made it first; it is not ours to remove.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => {
                remove_created(&created);
                return Err(e.into());
            }
        }
    }
    Ok(created)
}

// Only empty directories go, so one another upload has started using stays.
fn remove_created(created: &[PathBuf]) {
    for d in created.iter().rev() {
        if let Err(e) = fs::remove_dir(d) {
            debug!(dir = %d.display(), "left created directory in place: {}", e);
        }
    }
}

fn parse_destination(raw: &[u8]) -> Result<String> {
    let name = std::str::from_utf8(raw)
        .map_err(|e| ShareError::MalformedPacket(format!("destination is not UTF-8: {}", e)))?
        .trim_end_matches('\0')
        .to_string();
    if name.is_empty() {
        return Err(ShareError::MalformedPacket("empty upload destination".into()));
    }
    if name.len() > field::FILENAME {
        return Err(ShareError::FieldTooLong {
            field: "filename",
            len: name.len(),
            max: field::FILENAME,
        });
    }
    Ok(name)
}

fn receive_upload<C, F>(channel: &mut C, dest: &Path, name: &str, on_start: F) -> Result<TransferSummary>
where
    C: Channel + ?Sized,
    F: FnOnce(&Path, u64),
{
    let state = describe_local(dest, name)?;
    write_packet(channel, &state)?;
    let plan: PreTransferPacket = read_packet(channel)?;
    debug!(?plan, "PUT plan received");

    let start = resume_offset(&plan, &state);
    let mut file = if plan.continuation && state.filesize > 0 {
        OpenOptions::new().append(true).open(dest)?
    } else {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(dest)?
    };

    on_start(dest, start);
    let bytes = receive_chunks(channel, &mut file, plan.number_of_chunks, CHUNK_SIZE, &mut Silent)?;
    drop(file);

    let actual = checksum::hash_file(dest)?;
    let verified = actual.eq_ignore_ascii_case(&plan.filehash);
    if verified {
        write_sentinel(channel, sentinel::ACK)?;
    } else {
        warn!(dest = %dest.display(), "uploaded file failed integrity check");
        write_sentinel(channel, sentinel::ERR)?;
    }
    Ok(TransferSummary {
        path: dest.to_path_buf(),
        resumed_from: start,
        chunks: plan.number_of_chunks,
        bytes,
        expected_hash: plan.filehash,
        actual_hash: Some(actual),
        verified,
    })
}

/// Upload `local` to `remote` on the peer at the other end of `channel`.
pub fn upload<C, H>(channel: &mut C, local: &Path, remote: &str, hooks: &mut H) -> Result<PutOutcome>
where
    C: Channel + ?Sized,
    H: ClientHooks + ?Sized,
{
    if !local.is_file() {
        return Err(ShareError::FileNotFound(local.to_path_buf()));
    }
    channel.write_all(remote.as_bytes())?;
    channel.flush()?;

    let state: RequestPacket = match read_packet_or_marker(channel, sentinel::ERR)? {
        Some(state) => state,
        None => return Ok(PutOutcome::Refused),
    };
    debug!(?state, "peer holds");

    let source = ChunkSource::new(local, CHUNK_SIZE);
    let plan = plan_transfer(&source, &state)?;
    write_packet(channel, &plan)?;

    let start = resume_offset(&plan, &state);
    hooks.begin(remote, plan.number_of_chunks, start);
    let bytes = send_chunks(channel, source.chunks(start)?, plan.number_of_chunks, hooks)?;
    hooks.finish();

    let verdict = read_sentinel(channel)?;
    let verified = &verdict == sentinel::ACK;
    if !verified && &verdict != sentinel::ERR {
        return Err(ShareError::UnexpectedSentinel(verdict));
    }
    Ok(PutOutcome::Completed(TransferSummary {
        path: local.to_path_buf(),
        resumed_from: start,
        chunks: plan.number_of_chunks,
        bytes,
        expected_hash: plan.filehash,
        actual_hash: None,
        verified,
    }))
}

impl PutOutcome {
    pub fn into_result(self, remote: &str) -> Result<TransferSummary> {
        match self {
            PutOutcome::Refused => Err(ShareError::LockContention(remote.into())),
            PutOutcome::Completed(summary) => {
                summary.integrity()?;
                Ok(summary)
            }
        }
    }
}
