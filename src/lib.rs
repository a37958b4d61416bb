//! p2pshare library
//!
//! Peer-to-peer file sharing over plain TCP: a fixed-layout binary protocol
//! with resumable, SHA-256 verified GET/PUT transfers and a handful of
//! directory commands.

pub mod checksum;
pub mod chunker;
pub mod cli;
pub mod client;
pub mod commands;
pub mod error;
pub mod fs_enum;
pub mod lock;
pub mod logger;
pub mod logging;
pub mod packet;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod registry;
pub mod server;
pub mod transfer;

pub use client::{AutoApprove, AutoDecline, BarHooks, Client, ClientHooks};
pub use commands::CommandOutcome;
pub use error::{Result, ShareError};
pub use registry::{Command, Registry};
pub use server::{Server, ServerConfig, ServerContext, StopHandle};
