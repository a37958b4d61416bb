//! Directory commands: LST, CWD, MKD and PWD.
//!
//! Server halves operate on a [`ServerContext`] working directory; client
//! halves run over any [`Channel`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, ShareError};
use crate::fs_enum::list_directory;
use crate::packet::FileEntry;
use crate::protocol::sentinel;
use crate::protocol_core::{
    expect_ack, read_message, read_packet_or_marker, read_sentinel, read_to_close, write_packet,
    write_sentinel,
};
use crate::server::ServerContext;
use crate::transfer::get::GetOutcome;
use crate::transfer::put::PutOutcome;
use crate::transfer::Channel;

/// What a client-side command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Get(GetOutcome),
    Put(PutOutcome),
    Listing(Vec<FileEntry>),
    ChangedDirectory { dir: String, accepted: bool },
    MadeDirectory { dir: String, accepted: bool },
    WorkingDirectory(String),
}

/// Stream the working directory listing, one acknowledged entry at a time.
pub fn serve_list<C: Channel + ?Sized>(channel: &mut C, ctx: &ServerContext) -> Result<usize> {
    let workdir = ctx.workdir();
    let entries = list_directory(&workdir)?;
    debug!(dir = %workdir.display(), count = entries.len(), "listing");
    for entry in &entries {
        write_packet(channel, entry)?;
        expect_ack(channel)?;
    }
    write_sentinel(channel, sentinel::EOF)?;
    Ok(entries.len())
}

pub fn list<C: Channel + ?Sized>(channel: &mut C) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    while let Some(entry) = read_packet_or_marker::<_, FileEntry>(channel, sentinel::EOF)? {
        entries.push(entry);
        write_sentinel(channel, sentinel::ACK)?;
    }
    Ok(entries)
}

/// Change the server's working directory. Replies `ACK` or `ERR`.
pub fn serve_change_dir<C: Channel + ?Sized>(channel: &mut C, ctx: &ServerContext) -> Result<bool> {
    let raw = read_message(channel)?;
    let target = match requested_path(&raw) {
        Ok(p) => ctx.workdir().join(p),
        Err(e) => return reply(channel, Err(e)),
    };
    info!(dir = %target.display(), "change directory requested");
    let outcome = fs::canonicalize(&target)
        .map_err(ShareError::from)
        .and_then(|dir| {
            if dir.is_dir() {
                ctx.set_workdir(dir);
                Ok(())
            } else {
                Err(ShareError::FileNotFound(target.clone()))
            }
        });
    reply(channel, outcome)
}

/// Create one directory relative to the working directory. Replies `ACK` or `ERR`.
pub fn serve_make_dir<C: Channel + ?Sized>(channel: &mut C, ctx: &ServerContext) -> Result<bool> {
    let raw = read_message(channel)?;
    let target = match requested_path(&raw) {
        Ok(p) => ctx.workdir().join(p),
        Err(e) => return reply(channel, Err(e)),
    };
    info!(dir = %target.display(), "make directory requested");
    reply(channel, fs::create_dir(&target).map_err(ShareError::from))
}

/// Send the working directory and let the connection close.
pub fn serve_pwd<C: Channel + ?Sized>(channel: &mut C, ctx: &ServerContext) -> Result<PathBuf> {
    let workdir = ctx.workdir();
    channel.write_all(workdir.to_string_lossy().as_bytes())?;
    channel.flush()?;
    channel.close_write()?;
    Ok(workdir)
}

pub fn change_dir<C: Channel + ?Sized>(channel: &mut C, dir: &str) -> Result<bool> {
    send_path(channel, dir)
}

pub fn make_dir<C: Channel + ?Sized>(channel: &mut C, dir: &str) -> Result<bool> {
    send_path(channel, dir)
}

pub fn pwd<C: Channel + ?Sized>(channel: &mut C) -> Result<String> {
    let raw = read_to_close(channel)?;
    String::from_utf8(raw)
        .map_err(|e| ShareError::MalformedPacket(format!("working directory is not UTF-8: {}", e)))
}

fn requested_path(raw: &[u8]) -> Result<&Path> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| ShareError::MalformedPacket(format!("path is not UTF-8: {}", e)))?
        .trim_end_matches('\0');
    if text.is_empty() {
        return Err(ShareError::MalformedPacket("empty path".into()));
    }
    Ok(Path::new(text))
}

fn reply<C: Channel + ?Sized>(channel: &mut C, outcome: Result<()>) -> Result<bool> {
    match outcome {
        Ok(()) => {
            write_sentinel(channel, sentinel::ACK)?;
            Ok(true)
        }
        Err(e) => {
            warn!("directory request refused: {}", e);
            write_sentinel(channel, sentinel::ERR)?;
            Ok(false)
        }
    }
}

fn send_path<C: Channel + ?Sized>(channel: &mut C, dir: &str) -> Result<bool> {
    if dir.is_empty() {
        return Err(ShareError::MalformedPacket("empty path".into()));
    }
    channel.write_all(dir.as_bytes())?;
    channel.flush()?;
    let answer = read_sentinel(channel)?;
    if &answer == sentinel::ACK {
        Ok(true)
    } else if &answer == sentinel::ERR {
        Ok(false)
    } else {
        Err(ShareError::UnexpectedSentinel(answer))
    }
}
