//! Command table: user-facing name <-> 3-byte wire code <-> [`Command`].

use std::collections::BTreeMap;
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::client::ClientHooks;
use crate::commands::{self, CommandOutcome};
use crate::error::ShareError;
use crate::protocol::{code, CODE_LEN};
use crate::server::ServerContext;
use crate::transfer::get::{self, ServedGet};
use crate::transfer::put::{self, ServedPut};

/// Every command a peer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Get,
    Put,
    List,
    ChangeDirectory,
    MakeDirectory,
    PrintWorkingDirectory,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Get,
        Command::Put,
        Command::List,
        Command::ChangeDirectory,
        Command::MakeDirectory,
        Command::PrintWorkingDirectory,
    ];

    pub fn code(self) -> &'static [u8; CODE_LEN] {
        match self {
            Command::Get => code::GET,
            Command::Put => code::PUT,
            Command::List => code::LIST,
            Command::ChangeDirectory => code::CHANGE_DIR,
            Command::MakeDirectory => code::MAKE_DIR,
            Command::PrintWorkingDirectory => code::PRINT_DIR,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Get => "get",
            Command::Put => "put",
            Command::List => "ls",
            Command::ChangeDirectory => "cd",
            Command::MakeDirectory => "mkdir",
            Command::PrintWorkingDirectory => "pwd",
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            Command::Get => "get <remote> [local]",
            Command::Put => "put <local> [remote]",
            Command::List => "ls",
            Command::ChangeDirectory => "cd <dir>",
            Command::MakeDirectory => "mkdir <dir>",
            Command::PrintWorkingDirectory => "pwd",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Command::Get => "Download a file from the peer, resuming a matching partial copy.",
            Command::Put => "Upload a file to the peer, resuming a matching partial copy.",
            Command::List => "List files in the peer's working directory.",
            Command::ChangeDirectory => "Change the peer's working directory.",
            Command::MakeDirectory => "Create a directory on the peer.",
            Command::PrintWorkingDirectory => "Print the peer's working directory.",
        }
    }

    fn arity(self) -> (usize, usize) {
        match self {
            Command::Get | Command::Put => (1, 2),
            Command::ChangeDirectory | Command::MakeDirectory => (1, 1),
            Command::List | Command::PrintWorkingDirectory => (0, 0),
        }
    }

    /// Reject argument lists the client half could not run with.
    pub fn check_args(self, args: &[String]) -> Result<()> {
        let (min, max) = self.arity();
        if args.len() < min || args.len() > max {
            anyhow::bail!("usage: {}", self.usage());
        }
        Ok(())
    }

    /// Serve this command on a connection whose code has already been read.
    pub fn execute_server(self, stream: &mut TcpStream, peer: SocketAddr, ctx: &ServerContext) -> Result<()> {
        let logger = ctx.logger();
        match self {
            Command::Get => {
                let served = get::serve_get(stream, &ctx.workdir(), |path, offset| {
                    logger.get_started(&peer, path, offset)
                })
                .context("serve GET")?;
                match served {
                    ServedGet::Sent { path, bytes, chunks, .. } => {
                        info!(%peer, path = %path.display(), chunks, bytes, "file sent");
                        logger.get_done(&peer, &path, bytes);
                    }
                    ServedGet::NotFound(path) => logger.refused(&peer, &path, "not found"),
                    ServedGet::Declined(path) => logger.refused(&peer, &path, "overwrite declined"),
                }
            }
            Command::Put => {
                let served = put::serve_put(stream, &ctx.workdir(), |path, offset| {
                    logger.put_started(&peer, path, offset)
                })
                .context("serve PUT")?;
                match served {
                    ServedPut::Received(summary) => {
                        info!(
                            %peer,
                            path = %summary.path.display(),
                            bytes = summary.bytes,
                            verified = summary.verified,
                            "file received"
                        );
                        logger.put_done(&peer, &summary.path, summary.bytes, summary.verified);
                    }
                    ServedPut::Refused { path, reason } => {
                        logger.refused(&peer, &path, &reason.to_string());
                    }
                }
            }
            Command::List => {
                let count = commands::serve_list(stream, ctx).context("serve LST")?;
                info!(%peer, count, "listing sent");
            }
            Command::ChangeDirectory => {
                if !commands::serve_change_dir(stream, ctx).context("serve CWD")? {
                    warn!(%peer, "change directory refused");
                }
            }
            Command::MakeDirectory => {
                if !commands::serve_make_dir(stream, ctx).context("serve MKD")? {
                    warn!(%peer, "make directory refused");
                }
            }
            Command::PrintWorkingDirectory => {
                commands::serve_pwd(stream, ctx).context("serve PWD")?;
            }
        }
        Ok(())
    }

    /// Run the requesting half on a connection that has already announced this command.
    pub fn execute_client(
        self,
        stream: &mut TcpStream,
        args: &[String],
        hooks: &mut dyn ClientHooks,
    ) -> Result<CommandOutcome> {
        self.check_args(args)?;
        let outcome = match self {
            Command::Get => {
                let remote = &args[0];
                let local = args.get(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
                CommandOutcome::Get(get::fetch(stream, remote, &local, hooks)?)
            }
            Command::Put => {
                let local = Path::new(&args[0]);
                let remote = match args.get(1) {
                    Some(r) => r.clone(),
                    None => local
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .with_context(|| format!("no file name in {}", local.display()))?,
                };
                CommandOutcome::Put(put::upload(stream, local, &remote, hooks)?)
            }
            Command::List => CommandOutcome::Listing(commands::list(stream)?),
            Command::ChangeDirectory => CommandOutcome::ChangedDirectory {
                accepted: commands::change_dir(stream, &args[0])?,
                dir: args[0].clone(),
            },
            Command::MakeDirectory => CommandOutcome::MadeDirectory {
                accepted: commands::make_dir(stream, &args[0])?,
                dir: args[0].clone(),
            },
            Command::PrintWorkingDirectory => CommandOutcome::WorkingDirectory(commands::pwd(stream)?),
        };
        Ok(outcome)
    }
}

/// Name and code lookup for the commands a peer supports.
#[derive(Debug, Default)]
pub struct Registry {
    by_name: BTreeMap<String, Command>,
    by_code: BTreeMap<[u8; CODE_LEN], Command>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in command bound to its standard name and code.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for command in Command::ALL {
            let registered = registry.register(command.code(), command.name(), command);
            debug_assert!(
                registered.is_ok(),
                "built-in {} clashes with another built-in: {:?}",
                command.name(),
                registered
            );
        }
        registry
    }

    pub fn register(&mut self, code: &[u8], name: &str, command: Command) -> Result<(), ShareError> {
        let code: [u8; CODE_LEN] = code
            .try_into()
            .map_err(|_| ShareError::InvalidCodeLength(code.len()))?;
        if self.by_name.contains_key(name) {
            return Err(ShareError::DuplicateCommand(name.to_string()));
        }
        if self.by_code.contains_key(&code) {
            return Err(ShareError::DuplicateCommand(
                String::from_utf8_lossy(&code).into_owned(),
            ));
        }
        self.by_name.insert(name.to_string(), command);
        self.by_code.insert(code, command);
        Ok(())
    }

    /// Look a command up by exactly one of `name` or `code`.
    pub fn resolve(&self, name: Option<&str>, code: Option<&[u8]>) -> Result<Command, ShareError> {
        match (name, code) {
            (Some(name), None) => self
                .by_name
                .get(name)
                .copied()
                .ok_or_else(|| ShareError::UnknownCommand(name.to_string())),
            (None, Some(code)) => self
                .by_code
                .get(code)
                .copied()
                .ok_or_else(|| ShareError::UnknownCommand(String::from_utf8_lossy(code).into_owned())),
            _ => Err(ShareError::AmbiguousSelector),
        }
    }

    /// `(name, command)` pairs sorted by name.
    pub fn commands(&self) -> impl Iterator<Item = (&str, Command)> + '_ {
        self.by_name.iter().map(|(name, command)| (name.as_str(), *command))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
