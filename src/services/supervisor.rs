use super::completion::{
    self, COMPLETE_MESSAGE, ContentScan, EMPTY_DOWNLOAD_ERROR, Verdict, has_auth_error,
    scan_content_dir,
};
use super::progress::{LineKind, ProgressParser, progress_message};
use super::runner::{ProcessRunner, RunningProcess, ensure_executable};
use crate::host::HostEnvironment;
use crate::metrics::Metrics;
use crate::models::{DEFAULT_MAX_DOWNLOADS, DownloadJob, JobStatus, StartResponse};
use crate::state::{JobEvent, JobStateManager};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::fs;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};

/// File name of the downloader binary, bundled or custom.
#[cfg(windows)]
pub const DOWNLOADER_BINARY: &str = "DepotDownloaderMod.exe";
#[cfg(not(windows))]
pub const DOWNLOADER_BINARY: &str = "DepotDownloaderMod";

/// Errors raised while starting or running a download
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Download already in progress.")]
    AlreadyRunning,

    #[error("Executable not found: {0}")]
    ExecutableNotFound(Utf8PathBuf),

    #[error("Failed to run downloader: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to create dir {path}: {source}")]
    TargetDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Content scan failed: {0}")]
    Scan(String),
}

/// What to download and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub app_id: u32,

    /// Published file id of the Workshop item
    pub content_id: u64,

    pub target_dir: Utf8PathBuf,
}

impl DownloadRequest {
    pub fn new(app_id: u32, content_id: u64, target_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            app_id,
            content_id,
            target_dir: target_dir.into(),
        }
    }

    /// Request targeting Steam's own Workshop content directory.
    pub fn for_workshop(steam_root: &Utf8Path, app_id: u32, content_id: u64) -> Self {
        Self::new(
            app_id,
            content_id,
            workshop_content_dir(steam_root, app_id, content_id),
        )
    }
}

/// `<steam_root>/steamapps/workshop/content/<app_id>/<content_id>`
pub fn workshop_content_dir(steam_root: &Utf8Path, app_id: u32, content_id: u64) -> Utf8PathBuf {
    steam_root
        .join("steamapps")
        .join("workshop")
        .join("content")
        .join(app_id.to_string())
        .join(content_id.to_string())
}

/// Downloader command line for a request.
pub fn build_download_args(request: &DownloadRequest, max_downloads: u32) -> Vec<String> {
    vec![
        "-app".to_string(),
        request.app_id.to_string(),
        "-pubfile".to_string(),
        request.content_id.to_string(),
        "-dir".to_string(),
        request.target_dir.to_string(),
        "-max-downloads".to_string(),
        max_downloads.to_string(),
    ]
}

/// Where the resolved downloader came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloaderSource {
    Custom,
    Bundled,
}

impl fmt::Display for DownloaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloaderSource::Custom => f.write_str("Custom (Config)"),
            DownloaderSource::Bundled => f.write_str("Local"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDownloader {
    pub path: Utf8PathBuf,
    pub source: DownloaderSource,
}

/// Finds the downloader executable.
///
/// A configured custom path wins when it points at the binary itself or at a
/// directory containing [`DOWNLOADER_BINARY`]. Otherwise the copy bundled in
/// the plugin's `backend/` directory is used.
#[derive(Debug, Clone)]
pub struct DownloaderLocator {
    custom_path: Option<Utf8PathBuf>,
    bundled_dir: Utf8PathBuf,
}

impl DownloaderLocator {
    pub fn new(custom_path: Option<Utf8PathBuf>, bundled_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            custom_path,
            bundled_dir: bundled_dir.into(),
        }
    }

    pub fn for_plugin(plugin_dir: &Utf8Path, custom_path: Option<Utf8PathBuf>) -> Self {
        Self::new(custom_path, plugin_dir.join("backend"))
    }

    /// Locator for the copy bundled with the plugin the host reports.
    pub fn for_host(host: &dyn HostEnvironment, custom_path: Option<Utf8PathBuf>) -> Self {
        Self::for_plugin(&host.plugin_dir(), custom_path)
    }

    pub fn bundled_path(&self) -> Utf8PathBuf {
        self.bundled_dir.join(DOWNLOADER_BINARY)
    }

    pub fn resolve(&self) -> Result<ResolvedDownloader, DownloadError> {
        if let Some(custom) = &self.custom_path {
            let candidate = if custom.is_dir() {
                Some(custom.join(DOWNLOADER_BINARY))
            } else if custom.is_file() {
                Some(custom.clone())
            } else {
                None
            };

            if let Some(path) = candidate.filter(|p| p.is_file()) {
                return Ok(ResolvedDownloader {
                    path,
                    source: DownloaderSource::Custom,
                });
            }
            tracing::warn!(
                "Custom downloader path {} has no {}, falling back to bundled copy",
                custom,
                DOWNLOADER_BINARY
            );
        }

        let bundled = self.bundled_path();
        if bundled.is_file() {
            Ok(ResolvedDownloader {
                path: bundled,
                source: DownloaderSource::Bundled,
            })
        } else {
            Err(DownloadError::ExecutableNotFound(bundled))
        }
    }
}

struct ActiveJob {
    job_id: u64,
    cancel_tx: watch::Sender<bool>,
}

/// Everything the background task needs, detached from the supervisor.
#[derive(Clone)]
struct JobContext {
    state: JobStateManager,
    locator: DownloaderLocator,
    host: Arc<dyn HostEnvironment>,
    metrics: Option<Arc<Metrics>>,
    parser: Arc<ProgressParser>,
    max_downloads: u32,
}

enum JobEnd {
    Exited(Verdict),
    Cancelled,
}

/// Runs at most one Workshop download at a time.
///
/// [`start`](Self::start) returns as soon as the job is registered; the
/// downloader runs on a task spawned on the runtime handed to
/// [`new`](Self::new). Callers follow progress through
/// [`status`](Self::status) or [`subscribe`](Self::subscribe).
///
/// The child process is owned by that task. [`cancel`](Self::cancel) flips
/// the record to `Cancelled` and signals the task over a watch channel; the
/// task then kills the process.
pub struct DownloadSupervisor {
    ctx: JobContext,
    runtime: Handle,
    active: Mutex<Option<ActiveJob>>,
}

impl DownloadSupervisor {
    pub fn new(
        state: JobStateManager,
        locator: DownloaderLocator,
        host: Arc<dyn HostEnvironment>,
        runtime: Handle,
    ) -> Self {
        Self {
            ctx: JobContext {
                state,
                locator,
                host,
                metrics: None,
                parser: Arc::new(ProgressParser::new()),
                max_downloads: DEFAULT_MAX_DOWNLOADS,
            },
            runtime,
            active: Mutex::new(None),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.ctx.metrics = Some(metrics);
        self
    }

    /// Parallelism hint passed as `-max-downloads`.
    pub fn with_max_downloads(mut self, max_downloads: u32) -> Self {
        self.ctx.max_downloads = max_downloads.max(1);
        self
    }

    /// Register a new job and launch the downloader in the background.
    ///
    /// Only [`DownloadError::AlreadyRunning`] and
    /// [`DownloadError::TargetDir`] are returned here. A missing executable or
    /// a failed spawn shows up later as a `Failed` job status.
    pub fn start(&self, request: DownloadRequest) -> Result<StartResponse, DownloadError> {
        if self.ctx.state.is_downloading() {
            return Err(DownloadError::AlreadyRunning);
        }

        fs::create_dir_all(&request.target_dir).map_err(|source| DownloadError::TargetDir {
            path: request.target_dir.clone(),
            source,
        })?;

        // Held across begin_job so a concurrent cancel() sees the new sender.
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let job_id = self.ctx.state.begin_job(request.target_dir.clone())?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        *active = Some(ActiveJob { job_id, cancel_tx });
        drop(active);

        if let Some(metrics) = &self.ctx.metrics {
            metrics.record_download_started();
        }
        tracing::info!(
            "Starting Workshop download {} for app {} into {}",
            request.content_id,
            request.app_id,
            request.target_dir
        );

        let ctx = self.ctx.clone();
        self.runtime
            .spawn(async move { run_job(ctx, job_id, request, cancel_rx).await });

        Ok(StartResponse { started: true })
    }

    /// Cancel the running job, if any.
    ///
    /// # Returns
    /// `true` if a job was cancelled; cancelling nothing is not an error
    pub fn cancel(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(job_id) = self.ctx.state.cancel_job() else {
            tracing::debug!("Cancel requested with no download running");
            return false;
        };

        if let Some(active) = active.as_ref() {
            if active.job_id == job_id {
                let _ = active.cancel_tx.send(true);
            }
        }
        drop(active);

        if let Some(metrics) = &self.ctx.metrics {
            metrics.record_download_cancelled();
        }
        tracing::info!("Download job {} cancelled", job_id);
        true
    }

    /// Snapshot of the job record.
    pub fn status(&self) -> DownloadJob {
        self.ctx.state.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.ctx.state.subscribe()
    }

    pub fn state(&self) -> &JobStateManager {
        &self.ctx.state
    }
}

async fn run_job(
    ctx: JobContext,
    job_id: u64,
    request: DownloadRequest,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let started = Instant::now();

    let end = consume(&ctx, job_id, &request, &mut cancel_rx).await;
    let elapsed = started.elapsed();

    let Some((status, message, error)) = final_record(end) else {
        return;
    };

    if !ctx.state.finish_job(job_id, status, message.clone(), error) {
        tracing::debug!("Job {} already left Downloading, dropping {}", job_id, status);
        return;
    }

    if status == JobStatus::Done {
        tracing::info!(
            "Download complete in {:.2}s: {}",
            elapsed.as_secs_f32(),
            request.target_dir
        );
        if let Some(metrics) = &ctx.metrics {
            metrics.record_download_completed(elapsed);
        }
        if let Err(e) = ctx.host.reveal_directory(&request.target_dir) {
            tracing::warn!("Failed to open {}: {:#}", request.target_dir, e);
        }
    } else {
        tracing::error!("Download failed: {}", message);
        if let Some(metrics) = &ctx.metrics {
            metrics.record_download_failed(elapsed);
        }
    }
}

/// Status, message and error detail a finished job is recorded with.
/// `None` for a cancelled job, whose record `cancel` already wrote.
fn final_record(
    end: Result<JobEnd, DownloadError>,
) -> Option<(JobStatus, String, Option<String>)> {
    let record = match end {
        Ok(JobEnd::Cancelled) => return None,
        Ok(JobEnd::Exited(Verdict::Done)) => (JobStatus::Done, COMPLETE_MESSAGE.to_string(), None),
        Ok(JobEnd::Exited(verdict @ Verdict::LoginRequired)) => (
            JobStatus::Failed,
            verdict.message().to_string(),
            Some(EMPTY_DOWNLOAD_ERROR.to_string()),
        ),
        Ok(JobEnd::Exited(Verdict::Failed(message))) => (JobStatus::Failed, message, None),
        Err(e @ DownloadError::ExecutableNotFound(_)) => (JobStatus::Failed, e.to_string(), None),
        Err(e) => (JobStatus::Failed, format!("Internal Error: {}", e), None),
    };
    Some(record)
}

async fn consume(
    ctx: &JobContext,
    job_id: u64,
    request: &DownloadRequest,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<JobEnd, DownloadError> {
    let resolved = ctx.locator.resolve()?;
    if let Err(e) = ensure_executable(&resolved.path) {
        tracing::warn!("Failed to mark {} executable: {}", resolved.path, e);
    }

    // A job cancelled before this point no longer owns the record.
    let still_running = ctx.state.update_job(job_id, |job| {
        job.message = format!("Starting download ({})...", resolved.source);
    });
    if !still_running || *cancel_rx.borrow() {
        return Ok(JobEnd::Cancelled);
    }

    let args = build_download_args(request, ctx.max_downloads);
    let mut process =
        ProcessRunner::spawn(&resolved.path, &args).map_err(DownloadError::Spawn)?;
    tracing::info!(
        "Downloader started ({}), pid {:?}",
        resolved.source,
        process.id()
    );

    let mut log = Vec::new();
    let mut last_info_line: Option<String> = None;
    let mut cancel_open = true;

    loop {
        tokio::select! {
            changed = cancel_rx.changed(), if cancel_open => {
                if changed.is_err() {
                    cancel_open = false;
                } else if *cancel_rx.borrow_and_update() {
                    return kill(process).await;
                }
            }
            line = process.next_line() => {
                let Some(line) = line else { break };
                record_line(ctx, job_id, &line, &mut last_info_line);
                log.push(line.to_lowercase());
            }
        }
    }

    // Output can close before the process exits; cancel must still reach it.
    let exit_code = loop {
        tokio::select! {
            changed = cancel_rx.changed(), if cancel_open => {
                if changed.is_err() {
                    cancel_open = false;
                } else if *cancel_rx.borrow_and_update() {
                    return kill(process).await;
                }
            }
            status = process.wait() => break status.map_err(DownloadError::Spawn)?,
        }
    };
    tracing::info!("Downloader exited with code {}", exit_code);

    let target = request.target_dir.clone();
    let scan = join_scan(tokio::task::spawn_blocking(move || scan_content_dir(&target))).await?;
    let auth_error = has_auth_error(&log);

    Ok(JobEnd::Exited(completion::evaluate(
        exit_code,
        scan,
        auth_error,
        last_info_line.as_deref(),
    )))
}

fn record_line(ctx: &JobContext, job_id: u64, line: &str, last_info_line: &mut Option<String>) {
    match ctx.parser.classify(line) {
        Some(LineKind::Progress(progress)) => {
            ctx.state.update_job(job_id, |job| {
                job.progress = progress;
                job.message = progress_message(progress);
            });
        }
        Some(LineKind::Info(text)) => {
            tracing::debug!("downloader: {}", text);
            ctx.state.update_job(job_id, |job| job.message = text.clone());
            *last_info_line = Some(text);
        }
        None => {}
    }
}

async fn join_scan(
    handle: tokio::task::JoinHandle<ContentScan>,
) -> Result<ContentScan, DownloadError> {
    handle.await.map_err(|e| {
        tracing::error!("Content scan task failed: {}", e);
        DownloadError::Scan(e.to_string())
    })
}

async fn kill(mut process: RunningProcess) -> Result<JobEnd, DownloadError> {
    if let Err(e) = process.kill().await {
        tracing::warn!("Failed to kill downloader: {}", e);
    }
    Ok(JobEnd::Cancelled)
}
