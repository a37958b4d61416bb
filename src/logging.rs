//! Diagnostic output setup.

use tracing_subscriber::EnvFilter;

/// Default filter for a `-v` count: warnings only, then info, debug, trace.
pub fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the stderr subscriber. `RUST_LOG` takes precedence over `verbosity`:
///
/// ```bash
/// RUST_LOG=p2pshare::transfer=debug p2pshare get report.txt --host 10.0.0.2
/// ```
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
