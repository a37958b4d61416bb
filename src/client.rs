//! Requesting side: connects to a peer and drives one command per connection.

use std::io::{self, BufRead, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::commands::{self, CommandOutcome};
use crate::packet::FileEntry;
use crate::progress::{ChunkBar, TransferProgress};
use crate::protocol::timeouts;
use crate::registry::{Command, Registry};
use crate::transfer::get::{self, GetOutcome};
use crate::transfer::put::{self, PutOutcome};

/// Callbacks a transfer makes into whoever started it.
pub trait ClientHooks: TransferProgress {
    /// The local copy does not match the peer's file. Return `true` to replace it.
    fn confirm_overwrite(&mut self, _local: &Path) -> bool {
        true
    }
}

/// Approves every overwrite and reports nothing.
pub struct AutoApprove;
impl TransferProgress for AutoApprove {}
impl ClientHooks for AutoApprove {}

/// Declines every overwrite and reports nothing.
pub struct AutoDecline;
impl TransferProgress for AutoDecline {}
impl ClientHooks for AutoDecline {
    fn confirm_overwrite(&mut self, _local: &Path) -> bool {
        false
    }
}

/// Terminal hooks: a chunk progress bar and a y/n prompt on stdin.
pub struct BarHooks {
    bar: ChunkBar,
    assume_yes: bool,
}

impl BarHooks {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            bar: ChunkBar::new(),
            assume_yes,
        }
    }
}

impl TransferProgress for BarHooks {
    fn begin(&mut self, label: &str, total_chunks: u64, resumed_from: u64) {
        self.bar.begin(label, total_chunks, resumed_from);
    }
    fn advance(&mut self, bytes: u64) {
        self.bar.advance(bytes);
    }
    fn finish(&mut self) {
        self.bar.finish();
    }
}

impl ClientHooks for BarHooks {
    fn confirm_overwrite(&mut self, local: &Path) -> bool {
        if self.assume_yes {
            return true;
        }
        print!(
            "{} does not match the peer's file. Overwrite? [Y/n] ",
            local.display()
        );
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "" | "y" | "yes"),
        }
    }
}

/// A peer to send commands to.
#[derive(Debug, Clone)]
pub struct Client {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl Client {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_millis(timeouts::CONNECT_MS),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Open a connection and announce `command`.
    pub fn connect(&self, command: Command) -> Result<TcpStream> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("resolve {}:{}", self.host, self.port))?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(mut stream) => {
                    stream.set_nodelay(true).ok();
                    stream
                        .write_all(command.code())
                        .with_context(|| format!("send {} command", command.name()))?;
                    debug!(%addr, command = command.name(), "connected");
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(e).with_context(|| format!("connect {}:{}", self.host, self.port)),
            None => anyhow::bail!("no addresses for {}:{}", self.host, self.port),
        }
    }

    /// Run the command registered as `name` with its CLI-style arguments.
    pub fn execute(
        &self,
        registry: &Registry,
        name: &str,
        args: &[String],
        hooks: &mut dyn ClientHooks,
    ) -> Result<CommandOutcome> {
        let command = registry.resolve(Some(name), None)?;
        command.check_args(args)?;
        let mut stream = self.connect(command)?;
        command.execute_client(&mut stream, args, hooks)
    }

    pub fn get(&self, remote: &str, local: &Path, hooks: &mut dyn ClientHooks) -> Result<GetOutcome> {
        let mut stream = self.connect(Command::Get)?;
        Ok(get::fetch(&mut stream, remote, local, hooks)?)
    }

    pub fn put(&self, local: &Path, remote: &str, hooks: &mut dyn ClientHooks) -> Result<PutOutcome> {
        let mut stream = self.connect(Command::Put)?;
        Ok(put::upload(&mut stream, local, remote, hooks)?)
    }

    pub fn list(&self) -> Result<Vec<FileEntry>> {
        let mut stream = self.connect(Command::List)?;
        Ok(commands::list(&mut stream)?)
    }

    /// Returns whether the peer accepted the new directory.
    pub fn change_dir(&self, dir: &str) -> Result<bool> {
        let mut stream = self.connect(Command::ChangeDirectory)?;
        Ok(commands::change_dir(&mut stream, dir)?)
    }

    /// Returns whether the peer created the directory.
    pub fn make_dir(&self, dir: &str) -> Result<bool> {
        let mut stream = self.connect(Command::MakeDirectory)?;
        Ok(commands::make_dir(&mut stream, dir)?)
    }

    pub fn pwd(&self) -> Result<String> {
        let mut stream = self.connect(Command::PrintWorkingDirectory)?;
        Ok(commands::pwd(&mut stream)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_auto_hooks() {
        assert!(AutoApprove.confirm_overwrite(Path::new("a")));
        assert!(!AutoDecline.confirm_overwrite(Path::new("a")));
        assert!(BarHooks::new(true).confirm_overwrite(Path::new("a")));
    }

    #[test]
    fn test_connect_sends_code() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = Client::new("127.0.0.1", port);

        let _stream = client.connect(Command::PrintWorkingDirectory).unwrap();
        let (mut server_side, _) = listener.accept().unwrap();
        let mut code = [0u8; 3];
        std::io::Read::read_exact(&mut server_side, &mut code).unwrap();
        assert_eq!(&code, b"PWD");
    }

    #[test]
    fn test_unknown_command_fails_before_connecting() {
        let registry = Registry::builtin();
        // Nothing listens on port 1; resolution must fail first.
        let err = Client::new("127.0.0.1", 1)
            .execute(&registry, "frobnicate", &[], &mut AutoApprove)
            .unwrap_err();
        assert!(err.to_string().contains("unknown command"));
    }
}
