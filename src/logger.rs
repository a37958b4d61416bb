use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;

use parking_lot::Mutex;

/// Record of what the server did for each transfer request.
pub trait Logger: Send + Sync {
    fn get_started(&self, _peer: &SocketAddr, _path: &Path, _resumed_from: u64) {}
    fn put_started(&self, _peer: &SocketAddr, _path: &Path, _resumed_from: u64) {}
    fn get_done(&self, _peer: &SocketAddr, _path: &Path, _bytes: u64) {}
    fn put_done(&self, _peer: &SocketAddr, _path: &Path, _bytes: u64, _verified: bool) {}
    fn refused(&self, _peer: &SocketAddr, _path: &Path, _reason: &str) {}
    fn error(&self, _peer: &SocketAddr, _context: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Appends one timestamped line per event to a file.
pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn get_started(&self, peer: &SocketAddr, path: &Path, resumed_from: u64) {
        self.line(&format!(
            "GET peer={} path={} offset={}",
            peer,
            path.display(),
            resumed_from
        ));
    }
    fn put_started(&self, peer: &SocketAddr, path: &Path, resumed_from: u64) {
        self.line(&format!(
            "PUT peer={} path={} offset={}",
            peer,
            path.display(),
            resumed_from
        ));
    }
    fn get_done(&self, peer: &SocketAddr, path: &Path, bytes: u64) {
        self.line(&format!(
            "SENT peer={} path={} bytes={}",
            peer,
            path.display(),
            bytes
        ));
    }
    fn put_done(&self, peer: &SocketAddr, path: &Path, bytes: u64, verified: bool) {
        self.line(&format!(
            "RECEIVED peer={} path={} bytes={} verified={}",
            peer,
            path.display(),
            bytes,
            verified
        ));
    }
    fn refused(&self, peer: &SocketAddr, path: &Path, reason: &str) {
        self.line(&format!(
            "REFUSED peer={} path={} reason={}",
            peer,
            path.display(),
            reason
        ));
    }
    fn error(&self, peer: &SocketAddr, context: &str, msg: &str) {
        self.line(&format!("ERROR peer={} ctx={} msg={}", peer, context, msg));
    }
}
