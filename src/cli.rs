//! Command-line surface of the p2pshare binary

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::protocol::DEFAULT_PORT;

#[derive(Debug, Parser)]
#[command(
    name = "p2pshare",
    author,
    version,
    about = "Peer-to-peer file sharing over TCP with resumable, hash-verified transfers"
)]
pub struct Cli {
    /// Increase diagnostic output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Start a file sharing server
    Start(ServeOpts),

    /// Download a file from a peer
    Get {
        /// File name on the peer
        remote: String,
        /// Local file or directory to write into
        #[arg(default_value = ".")]
        local: PathBuf,
        /// Overwrite a mismatching local copy without asking
        #[arg(short, long)]
        yes: bool,
        #[command(flatten)]
        peer: PeerOpts,
    },

    /// Upload a file to a peer
    Put {
        /// Local file to send
        local: PathBuf,
        /// Destination on the peer (defaults to the local file name)
        remote: Option<String>,
        #[command(flatten)]
        peer: PeerOpts,
    },

    /// List the peer's working directory
    Ls {
        #[command(flatten)]
        peer: PeerOpts,
    },

    /// Change the peer's working directory
    Cd {
        dir: String,
        #[command(flatten)]
        peer: PeerOpts,
    },

    /// Create a directory on the peer
    Mkdir {
        dir: String,
        #[command(flatten)]
        peer: PeerOpts,
    },

    /// Print the peer's working directory
    Pwd {
        #[command(flatten)]
        peer: PeerOpts,
    },

    /// Interactive shell against one peer
    Shell {
        #[command(flatten)]
        peer: PeerOpts,
    },

    /// List the protocol commands a peer understands
    Commands,
}

/// Server options
#[derive(Clone, Debug, Args)]
pub struct ServeOpts {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Initial working directory to serve
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Append transfer events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

/// Which peer a client command talks to
#[derive(Clone, Debug, Args)]
pub struct PeerOpts {
    /// Peer host name or address
    #[arg(short = 'H', long)]
    pub host: String,

    /// Peer port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl CliCommand {
    /// Registry name and arguments of a one-shot client command.
    pub fn as_request(&self) -> Option<(&'static str, Vec<String>, &PeerOpts)> {
        let request = match self {
            CliCommand::Get { remote, local, peer, .. } => (
                "get",
                vec![remote.clone(), local.to_string_lossy().into_owned()],
                peer,
            ),
            CliCommand::Put { local, remote, peer } => {
                let mut args = vec![local.to_string_lossy().into_owned()];
                args.extend(remote.clone());
                ("put", args, peer)
            }
            CliCommand::Ls { peer } => ("ls", Vec::new(), peer),
            CliCommand::Cd { dir, peer } => ("cd", vec![dir.clone()], peer),
            CliCommand::Mkdir { dir, peer } => ("mkdir", vec![dir.clone()], peer),
            CliCommand::Pwd { peer } => ("pwd", Vec::new(), peer),
            CliCommand::Start(_) | CliCommand::Shell { .. } | CliCommand::Commands => return None,
        };
        Some(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_defaults() {
        let cli = Cli::try_parse_from(["p2pshare", "start"]).unwrap();
        match cli.command {
            CliCommand::Start(opts) => {
                assert_eq!(opts.port, 12345);
                assert_eq!(opts.bind, "0.0.0.0");
                assert!(opts.log_file.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_get_maps_to_request() {
        let cli =
            Cli::try_parse_from(["p2pshare", "-vv", "get", "report.txt", "-H", "10.0.0.2"]).unwrap();
        assert_eq!(cli.verbose, 2);
        let (name, args, peer) = cli.command.as_request().unwrap();
        assert_eq!(name, "get");
        assert_eq!(args, vec!["report.txt".to_string(), ".".to_string()]);
        assert_eq!(peer.host, "10.0.0.2");
        assert_eq!(peer.port, 12345);
    }

    #[test]
    fn test_put_without_remote() {
        let cli = Cli::try_parse_from(["p2pshare", "put", "out.bin", "--host", "h", "-p", "9"]).unwrap();
        let (name, args, peer) = cli.command.as_request().unwrap();
        assert_eq!(name, "put");
        assert_eq!(args, vec!["out.bin".to_string()]);
        assert_eq!(peer.port, 9);
    }

    #[test]
    fn test_client_commands_need_host() {
        assert!(Cli::try_parse_from(["p2pshare", "ls"]).is_err());
        assert!(Cli::try_parse_from(["p2pshare", "commands"]).unwrap().command.as_request().is_none());
    }
}
