//! Resumable GET/PUT transfer engine.
//!
//! Both directions share one shape: the side that lacks the file describes
//! what it holds ([`RequestPacket`](crate::packet::RequestPacket)), the side
//! that has the file answers with a plan
//! ([`PreTransferPacket`](crate::packet::PreTransferPacket)), then chunks flow
//! one at a time, each acknowledged before the next is sent.

pub mod get;
pub mod negotiate;
pub mod put;
pub mod stream;

use std::path::PathBuf;

use crate::error::{Result, ShareError};

pub use stream::Channel;

/// What a finished GET or PUT did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    /// File written by this side, or read when uploading.
    pub path: PathBuf,
    /// Byte offset the transfer resumed at, 0 for a full transfer.
    pub resumed_from: u64,
    pub chunks: u64,
    pub bytes: u64,
    /// Announced hash of the complete file.
    pub expected_hash: String,
    /// Hash actually found after the transfer, when this side computed it.
    pub actual_hash: Option<String>,
    pub verified: bool,
}

impl TransferSummary {
    pub fn resumed(&self) -> bool {
        self.resumed_from > 0
    }

    /// Turn a failed integrity check into an error. The written bytes are kept.
    pub fn integrity(&self) -> Result<()> {
        if self.verified {
            return Ok(());
        }
        Err(ShareError::IntegrityMismatch {
            expected: self.expected_hash.clone(),
            actual: self
                .actual_hash
                .clone()
                .unwrap_or_else(|| "<rejected by peer>".to_string()),
        })
    }
}
