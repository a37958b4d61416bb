//! Transfer progress reporting
//!
//! The engine reports chunk-level progress through [`TransferProgress`];
//! the CLI plugs in an `indicatif` bar, servers and tests stay [`Silent`].

use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

pub trait TransferProgress {
    fn begin(&mut self, _label: &str, _total_chunks: u64, _resumed_from: u64) {}
    /// One chunk of `bytes` bytes was acknowledged.
    fn advance(&mut self, _bytes: u64) {}
    fn finish(&mut self) {}
}

/// Reports nothing.
pub struct Silent;
impl TransferProgress for Silent {}

/// Chunk progress bar for interactive transfers.
pub struct ChunkBar {
    bar: Option<ProgressBar>,
    bytes: u64,
    start_time: Instant,
}

impl ChunkBar {
    pub fn new() -> Self {
        Self {
            bar: None,
            bytes: 0,
            start_time: Instant::now(),
        }
    }
}

impl Default for ChunkBar {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferProgress for ChunkBar {
    fn begin(&mut self, label: &str, total_chunks: u64, resumed_from: u64) {
        let bar = ProgressBar::new(total_chunks);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix} [{bar:30.cyan/blue}] {pos}/{len} chunks {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(label.to_string());
        if resumed_from > 0 {
            bar.set_message(format!("(resuming at byte {})", resumed_from));
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        self.bytes = 0;
        self.start_time = Instant::now();
        self.bar = Some(bar);
    }

    fn advance(&mut self, bytes: u64) {
        self.bytes += bytes;
        if let Some(bar) = &self.bar {
            bar.inc(1);
            let secs = self.start_time.elapsed().as_secs_f64();
            if secs > 0.1 {
                bar.set_message(format!("{:.1} KB/s", self.bytes as f64 / secs / 1024.0));
            }
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message(format!("{} bytes", self.bytes));
        }
    }
}
