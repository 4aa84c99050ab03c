// Operation metrics module
//
// Lightweight counters for config edits and download jobs

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-wide operation metrics
///
/// Uses atomic operations for thread-safe tracking without locks. The config
/// mutator and the download supervisor both record into a shared
/// `Arc<Metrics>`; the CLI logs a summary on exit.
#[derive(Debug)]
pub struct Metrics {
    /// Config edits that rewrote the file
    config_writes: AtomicU64,

    /// Config edits that found nothing to change
    config_noops: AtomicU64,

    downloads_started: AtomicU64,
    downloads_completed: AtomicU64,
    downloads_failed: AtomicU64,
    downloads_cancelled: AtomicU64,

    /// Total time spent in finished downloads, in milliseconds
    total_download_time_ms: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            config_writes: AtomicU64::new(0),
            config_noops: AtomicU64::new(0),
            downloads_started: AtomicU64::new(0),
            downloads_completed: AtomicU64::new(0),
            downloads_failed: AtomicU64::new(0),
            downloads_cancelled: AtomicU64::new(0),
            total_download_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_config_write(&self) {
        self.config_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_config_noop(&self) {
        self.config_noops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_download_started(&self) {
        self.downloads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_download_completed(&self, duration: Duration) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
        self.record_download_time(duration);
    }

    pub fn record_download_failed(&self, duration: Duration) {
        self.downloads_failed.fetch_add(1, Ordering::Relaxed);
        self.record_download_time(duration);
    }

    pub fn record_download_cancelled(&self) {
        self.downloads_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    fn record_download_time(&self, duration: Duration) {
        self.total_download_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn config_writes(&self) -> u64 {
        self.config_writes.load(Ordering::Relaxed)
    }

    pub fn config_noops(&self) -> u64 {
        self.config_noops.load(Ordering::Relaxed)
    }

    pub fn downloads_started(&self) -> u64 {
        self.downloads_started.load(Ordering::Relaxed)
    }

    pub fn downloads_completed(&self) -> u64 {
        self.downloads_completed.load(Ordering::Relaxed)
    }

    pub fn downloads_failed(&self) -> u64 {
        self.downloads_failed.load(Ordering::Relaxed)
    }

    pub fn downloads_cancelled(&self) -> u64 {
        self.downloads_cancelled.load(Ordering::Relaxed)
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average duration of finished (completed or failed) downloads in milliseconds
    pub fn avg_download_time_ms(&self) -> f64 {
        let total = self.total_download_time_ms.load(Ordering::Relaxed);
        let count = self.downloads_completed() + self.downloads_failed();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Config edits: {} written, {} unchanged",
            self.config_writes(),
            self.config_noops()
        );
        tracing::info!(
            "Downloads: {} started, {} completed, {} failed, {} cancelled (avg: {:.0}ms)",
            self.downloads_started(),
            self.downloads_completed(),
            self.downloads_failed(),
            self.downloads_cancelled(),
            self.avg_download_time_ms()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
