//! Connection acceptor: one OS thread per connection, cooperative shutdown.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::logger::Logger;
use crate::protocol::{sentinel, timeouts, DEFAULT_PORT};
use crate::protocol_core::{read_code, write_sentinel};
use crate::registry::Registry;

/// Where and how to listen.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// How often the accept loop rechecks the stop flag.
    pub accept_poll: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            accept_poll: Duration::from_millis(timeouts::ACCEPT_POLL_MS),
        }
    }
}

/// State shared by every connection handler of one server.
pub struct ServerContext {
    workdir: RwLock<PathBuf>,
    logger: Arc<dyn Logger>,
}

impl ServerContext {
    pub fn new(workdir: PathBuf, logger: Arc<dyn Logger>) -> Self {
        Self {
            workdir: RwLock::new(workdir),
            logger,
        }
    }

    /// The directory GET, PUT, LST and PWD resolve against.
    pub fn workdir(&self) -> PathBuf {
        self.workdir.read().clone()
    }

    pub fn set_workdir(&self, dir: PathBuf) {
        info!(dir = %dir.display(), "working directory changed");
        *self.workdir.write() = dir;
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }
}

/// Clears the run flag of a [`Server`]. Cloneable and idempotent.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("server stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

/// A bound, not yet running server.
pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
    context: Arc<ServerContext>,
    running: Arc<AtomicBool>,
    accept_poll: Duration,
}

impl Server {
    pub fn bind(config: &ServerConfig, registry: Arc<Registry>, context: Arc<ServerContext>) -> Result<Self> {
        let addr = format!("{}:{}", config.bind, config.port);
        let listener = TcpListener::bind(&addr).with_context(|| format!("bind {}", addr))?;
        listener
            .set_nonblocking(true)
            .context("set listener non-blocking")?;
        Ok(Self {
            listener,
            registry,
            context,
            running: Arc::new(AtomicBool::new(true)),
            accept_poll: config.accept_poll,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Accept connections until stopped. The listener is closed on return;
    /// handlers already running are left to finish on their own.
    pub fn run(self) -> Result<()> {
        let local = self.local_addr().context("listener address")?;
        info!(
            addr = %local,
            workdir = %self.context.workdir().display(),
            "p2pshare listening"
        );

        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!(%peer, "connection accepted");
                    let registry = Arc::clone(&self.registry);
                    let context = Arc::clone(&self.context);
                    let spawned = thread::Builder::new()
                        .name(format!("conn-{}", peer))
                        .spawn(move || {
                            if let Err(e) = handle_connection(stream, peer, &registry, &context) {
                                error!(%peer, "connection failed: {:#}", e);
                                context.logger().error(&peer, "connection", &format!("{:#}", e));
                            }
                        });
                    if let Err(e) = spawned {
                        error!(%peer, "could not spawn handler thread: {}", e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(self.accept_poll),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("accept error: {}", e);
                    thread::sleep(self.accept_poll);
                }
            }
        }

        info!(addr = %local, "server stopped");
        Ok(())
    }
}

fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    registry: &Registry,
    context: &ServerContext,
) -> Result<()> {
    // Accepted sockets may inherit the listener's non-blocking mode.
    stream.set_nonblocking(false).context("set stream blocking")?;
    stream.set_nodelay(true).ok();

    let code = read_code(&mut stream).context("read command code")?;
    let command = match registry.resolve(None, Some(&code)) {
        Ok(command) => command,
        Err(e) => {
            warn!(%peer, "{}", e);
            write_sentinel(&mut stream, sentinel::ERR)?;
            return Ok(());
        }
    };
    debug!(%peer, command = command.name(), "dispatching");
    command.execute_server(&mut stream, peer, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoopLogger;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn test_server(dir: &TempDir) -> Server {
        let config = ServerConfig {
            bind: "127.0.0.1".into(),
            port: 0,
            accept_poll: Duration::from_millis(20),
        };
        let context = Arc::new(ServerContext::new(dir.path().to_path_buf(), Arc::new(NoopLogger)));
        Server::bind(&config, Arc::new(Registry::builtin()), context).unwrap()
    }

    #[test]
    fn test_unknown_code_gets_err() {
        let dir = TempDir::new().unwrap();
        let server = test_server(&dir);
        let addr = server.local_addr().unwrap();
        let stop = server.stop_handle();
        let handle = thread::spawn(move || server.run());

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"NOP").unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).unwrap();
        assert_eq!(reply, b"ERR");

        stop.stop();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_stop_is_idempotent_and_closes_listener() {
        let dir = TempDir::new().unwrap();
        let server = test_server(&dir);
        let addr = server.local_addr().unwrap();
        let stop = server.stop_handle();
        let handle = thread::spawn(move || server.run());

        stop.stop();
        stop.stop();
        assert!(stop.is_stopped());
        handle.join().unwrap().unwrap();
        assert!(TcpStream::connect(addr).is_err());
    }

    #[test]
    fn test_bind_conflict_is_fatal() {
        let dir = TempDir::new().unwrap();
        let first = test_server(&dir);
        let config = ServerConfig {
            bind: "127.0.0.1".into(),
            port: first.local_addr().unwrap().port(),
            ..ServerConfig::default()
        };
        let context = Arc::new(ServerContext::new(dir.path().to_path_buf(), Arc::new(NoopLogger)));
        assert!(Server::bind(&config, Arc::new(Registry::builtin()), context).is_err());
    }

    #[test]
    fn test_workdir_is_shared() {
        let ctx = ServerContext::new(PathBuf::from("/srv/a"), Arc::new(NoopLogger));
        ctx.set_workdir(PathBuf::from("/srv/b"));
        assert_eq!(ctx.workdir(), PathBuf::from("/srv/b"));
    }
}
