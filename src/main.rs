//! p2pshare - share files between peers over TCP
//!
//! One binary plays both roles: `start` serves a working directory, every
//! other subcommand talks to a running peer.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;

use p2pshare::cli::{Cli, CliCommand, PeerOpts, ServeOpts};
use p2pshare::logger::{Logger, NoopLogger, TextLogger};
use p2pshare::logging::init_tracing;
use p2pshare::transfer::get::GetOutcome;
use p2pshare::transfer::put::PutOutcome;
use p2pshare::transfer::TransferSummary;
use p2pshare::{
    BarHooks, Client, CommandOutcome, Registry, Server, ServerConfig, ServerContext, ShareError,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let registry = Arc::new(Registry::builtin());

    match &cli.command {
        CliCommand::Start(opts) => server_main(opts, registry),
        CliCommand::Shell { peer } => {
            exit_on_interrupt()?;
            shell_main(peer, &registry)
        }
        CliCommand::Commands => {
            print_commands(&registry);
            Ok(())
        }
        command => {
            exit_on_interrupt()?;
            let Some((name, args, peer)) = command.as_request() else {
                anyhow::bail!("not a client command");
            };
            let assume_yes = matches!(command, CliCommand::Get { yes: true, .. });
            let client = Client::new(peer.host.clone(), peer.port);
            let outcome = client.execute(&registry, name, &args, &mut BarHooks::new(assume_yes))?;
            report(&outcome)
        }
    }
}

fn exit_on_interrupt() -> Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // 128 + SIGINT
        std::process::exit(130);
    })
    .context("install Ctrl-C handler")
}

fn server_main(opts: &ServeOpts, registry: Arc<Registry>) -> Result<()> {
    if !opts.root.is_dir() {
        anyhow::bail!("root is not a directory: {}", opts.root.display());
    }
    let root = std::fs::canonicalize(&opts.root)
        .with_context(|| format!("canonicalize root {}", opts.root.display()))?;

    // Choose logger once; NoopLogger costs nothing per transfer
    let logger: Arc<dyn Logger> = match &opts.log_file {
        Some(path) => Arc::new(
            TextLogger::new(path).with_context(|| format!("open log file {}", path.display()))?,
        ),
        None => Arc::new(NoopLogger),
    };

    let config = ServerConfig {
        bind: opts.bind.clone(),
        port: opts.port,
        ..ServerConfig::default()
    };
    let context = Arc::new(ServerContext::new(root.clone(), logger));
    let server = Server::bind(&config, registry, context)?;

    let stop = server.stop_handle();
    ctrlc::set_handler(move || stop.stop()).context("install termination handler")?;

    println!("Starting p2pshare server:");
    println!("  Root: {}", root.display());
    println!("  Listening on: {}", server.local_addr()?);
    server.run()
}

fn shell_main(peer: &PeerOpts, registry: &Registry) -> Result<()> {
    let client = Client::new(peer.host.clone(), peer.port);
    let prompt = format!("{}:{}> ", client.host(), client.port());
    let mut line = String::new();

    loop {
        print!("{}", prompt);
        io::stdout().flush()?;
        // Read line by line so overwrite prompts can take stdin in between.
        line.clear();
        if io::stdin().read_line(&mut line)? == 0 {
            println!();
            break;
        }
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let command = command.to_ascii_lowercase();
        let args: Vec<String> = words.map(str::to_string).collect();

        match command.as_str() {
            "help" => {
                println!("Available commands:");
                print_commands(registry);
            }
            "exit" | "quit" => {
                println!("Exiting shell.");
                break;
            }
            name => match client
                .execute(registry, name, &args, &mut BarHooks::new(false))
                .and_then(|outcome| report(&outcome))
            {
                Ok(()) => {}
                Err(e) if matches!(e.downcast_ref::<ShareError>(), Some(ShareError::UnknownCommand(_))) => {
                    println!("Unknown command: {}. Type 'help' for a list of commands.", name);
                }
                Err(e) => println!("Error executing command '{}': {:#}", name, e),
            },
        }
    }
    Ok(())
}

fn print_commands(registry: &Registry) {
    for (name, command) in registry.commands() {
        println!(
            "  {:<6} [{}] {:<22} {}",
            name,
            String::from_utf8_lossy(command.code()),
            command.usage(),
            command.help()
        );
    }
}

fn report(outcome: &CommandOutcome) -> Result<()> {
    match outcome {
        CommandOutcome::Get(GetOutcome::NotFound) => anyhow::bail!("file does not exist on the peer"),
        CommandOutcome::Get(GetOutcome::Declined) => {
            println!("Download aborted; local file left untouched.");
        }
        CommandOutcome::Get(GetOutcome::Completed(summary)) => report_transfer("downloaded", summary)?,
        CommandOutcome::Put(PutOutcome::Refused) => {
            anyhow::bail!("peer refused the upload (destination busy or invalid)")
        }
        CommandOutcome::Put(PutOutcome::Completed(summary)) => report_transfer("uploaded", summary)?,
        CommandOutcome::Listing(entries) => {
            println!("Files on peer:");
            for entry in entries {
                let marker = if entry.is_dir { "/" } else { "" };
                println!("  {}{} -- {}B", entry.filename, marker, entry.filesize);
            }
        }
        CommandOutcome::ChangedDirectory { dir, accepted } => {
            if !accepted {
                anyhow::bail!("peer could not change its working directory to {}", dir);
            }
            println!("Peer changed its working directory to {}.", dir);
        }
        CommandOutcome::MadeDirectory { dir, accepted } => {
            if !accepted {
                anyhow::bail!("peer could not create the directory {}", dir);
            }
            println!("Peer created the directory {}.", dir);
        }
        CommandOutcome::WorkingDirectory(dir) => {
            println!("Peer working directory:");
            println!("{}", dir);
        }
    }
    Ok(())
}

fn report_transfer(verb: &str, summary: &TransferSummary) -> Result<()> {
    if summary.resumed() {
        println!("Resumed at byte {}.", summary.resumed_from);
    }
    summary
        .integrity()
        .with_context(|| format!("{} {} but it failed the integrity check", verb, summary.path.display()))?;
    println!(
        "{} {} ({} bytes in {} chunks)",
        capitalize(verb),
        summary.path.display(),
        summary.bytes,
        summary.chunks
    );
    Ok(())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
