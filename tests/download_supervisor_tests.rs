//! End-to-end tests for DownloadSupervisor driving a fake downloader
//!
//! The fake is a shell script installed as the bundled `DepotDownloaderMod`;
//! it receives the real argument list (`-app A -pubfile P -dir D
//! -max-downloads N`, so the target directory is `$6`).
//!
//! These tests verify:
//! - The success heuristic (exit code, directory scan, auth-error scan)
//! - Progress parsing into the job record
//! - Single-flight starts and forceful cancellation
//! - Executable resolution and the argument contract
#![cfg(unix)]

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use slstools::models::LOGIN_REQUIRED;
use slstools::services::DOWNLOADER_BINARY;
use slstools::services::completion::EMPTY_DOWNLOAD_ERROR;
use slstools::{
    DownloadError, DownloadJob, DownloadRequest, DownloadSupervisor, DownloaderLocator,
    HostEnvironment, JobEvent, JobStateManager, JobStatus, Metrics,
};
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::runtime::Handle;
use tokio::time::{sleep, timeout};

// Fake downloaders are written and executed by these tests; running them one
// at a time keeps a concurrent fork from holding a script open for writing.
static DOWNLOADER_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

#[derive(Default)]
struct RecordingHost {
    plugin_dir: Utf8PathBuf,
    revealed: Mutex<Vec<Utf8PathBuf>>,
}

impl RecordingHost {
    fn revealed(&self) -> Vec<Utf8PathBuf> {
        self.revealed.lock().unwrap().clone()
    }
}

impl HostEnvironment for RecordingHost {
    fn plugin_dir(&self) -> Utf8PathBuf {
        self.plugin_dir.clone()
    }

    fn data_dir(&self) -> Utf8PathBuf {
        self.plugin_dir.join("data")
    }

    fn reveal_directory(&self, dir: &Utf8Path) -> Result<()> {
        self.revealed.lock().unwrap().push(dir.to_path_buf());
        Ok(())
    }
}

struct Fixture {
    _temp_dir: TempDir,
    root: Utf8PathBuf,
    host: Arc<RecordingHost>,
    metrics: Arc<Metrics>,
    supervisor: DownloadSupervisor,
}

impl Fixture {
    /// Install `body` as the bundled downloader and build a supervisor.
    fn with_script(body: &str) -> Self {
        Self::build(Some(body), None)
    }

    fn build(bundled: Option<&str>, custom_path: Option<Utf8PathBuf>) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let plugin_dir = root.join("plugin");
        fs::create_dir_all(plugin_dir.join("backend")).unwrap();

        if let Some(body) = bundled {
            write_script(&plugin_dir.join("backend").join(DOWNLOADER_BINARY), body);
        }

        let host = Arc::new(RecordingHost {
            plugin_dir: plugin_dir.clone(),
            ..RecordingHost::default()
        });
        let metrics = Arc::new(Metrics::new());
        let supervisor = DownloadSupervisor::new(
            JobStateManager::new(),
            DownloaderLocator::for_plugin(&plugin_dir, custom_path),
            host.clone(),
            Handle::current(),
        )
        .with_metrics(metrics.clone());

        Self {
            _temp_dir: temp_dir,
            root,
            host,
            metrics,
            supervisor,
        }
    }

    fn request(&self) -> DownloadRequest {
        DownloadRequest::for_workshop(&self.root.join("steam"), 4000, 2834567120)
    }

    async fn run_to_end(&self) -> DownloadJob {
        let response = self.supervisor.start(self.request()).unwrap();
        assert!(response.started);
        wait_for_terminal(&self.supervisor).await
    }
}

/// Written without the execute bit; the supervisor has to add it.
fn write_script(path: &Utf8Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
}

async fn wait_for_terminal(supervisor: &DownloadSupervisor) -> DownloadJob {
    timeout(Duration::from_secs(10), async {
        loop {
            let job = supervisor.status();
            if job.status.is_terminal() {
                return job;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("download did not finish")
}

async fn wait_for_message(supervisor: &DownloadSupervisor, message: &str) {
    timeout(Duration::from_secs(10), async {
        while supervisor.status().message != message {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("message never appeared")
}

#[tokio::test]
async fn test_successful_download() {
    let _lock = DOWNLOADER_LOCK.lock().await;
    let fixture = Fixture::with_script(
        r#"echo "Downloading depot 4000"
echo " 42.50% steamapps/content/map.bsp"
printf 'payload' > "$6/map.bsp"
echo "Total downloaded: 7 bytes"
exit 0"#,
    );

    let job = fixture.run_to_end().await;

    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.progress, 100.0);
    assert_eq!(job.message, "Download Complete!");
    assert_eq!(job.error, None);
    assert_eq!(fixture.host.revealed(), vec![fixture.request().target_dir]);
    assert_eq!(fixture.metrics.downloads_completed(), 1);
}

#[tokio::test]
async fn test_empty_directory_requires_login() {
    let _lock = DOWNLOADER_LOCK.lock().await;
    let fixture = Fixture::with_script(
        r#"mkdir -p "$6/.DepotDownloader"
printf 'x' > "$6/.DepotDownloader/depot.config"
echo "Download finished"
exit 0"#,
    );

    let job = fixture.run_to_end().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.message, LOGIN_REQUIRED);
    assert_eq!(job.error.as_deref(), Some(EMPTY_DOWNLOAD_ERROR));
    assert!(job.requires_login());
    assert!(fixture.host.revealed().is_empty());
}

#[tokio::test]
async fn test_auth_error_overrides_clean_exit() {
    let _lock = DOWNLOADER_LOCK.lock().await;
    let fixture = Fixture::with_script(
        r#"printf 'payload' > "$6/readme.txt"
echo "Access Denied to depot 4001" 1>&2
exit 0"#,
    );

    let job = fixture.run_to_end().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.message, LOGIN_REQUIRED);
    assert_eq!(fixture.metrics.downloads_failed(), 1);
}

#[tokio::test]
async fn test_failure_reports_last_output_line() {
    let _lock = DOWNLOADER_LOCK.lock().await;
    let fixture = Fixture::with_script(
        r#"echo "Connecting to Steam3..."
echo " 10.00%"
echo "Connection timed out"
exit 3"#,
    );

    let job = fixture.run_to_end().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.message, "Error: Connection timed out");
    assert_eq!(job.progress, 10.0);
}

#[tokio::test]
async fn test_progress_is_observable_while_running() {
    let _lock = DOWNLOADER_LOCK.lock().await;
    let fixture = Fixture::with_script(
        r#"echo " 42.50%"
exec sleep 30"#,
    );

    fixture.supervisor.start(fixture.request()).unwrap();
    wait_for_message(&fixture.supervisor, "Downloading: 42.50%").await;

    let job = fixture.supervisor.status();
    assert_eq!(job.status, JobStatus::Downloading);
    assert_eq!(job.progress, 42.5);

    assert!(fixture.supervisor.cancel());
}

#[tokio::test]
async fn test_start_while_running_is_rejected() {
    let _lock = DOWNLOADER_LOCK.lock().await;
    let fixture = Fixture::with_script(
        r#"echo "working"
exec sleep 30"#,
    );

    fixture.supervisor.start(fixture.request()).unwrap();
    wait_for_message(&fixture.supervisor, "working").await;

    let other = DownloadRequest::new(4000, 1, fixture.root.join("other"));
    let err = fixture.supervisor.start(other).unwrap_err();

    assert!(matches!(err, DownloadError::AlreadyRunning));
    let job = fixture.supervisor.status();
    assert_eq!(job.path, fixture.request().target_dir);
    assert_eq!(job.status, JobStatus::Downloading);

    fixture.supervisor.cancel();
}

#[tokio::test]
async fn test_cancel_kills_and_stays_cancelled() {
    let _lock = DOWNLOADER_LOCK.lock().await;
    let fixture = Fixture::with_script(
        r#"echo "started"
sleep 30
printf 'late' > "$6/late.bin""#,
    );
    let mut events = fixture.supervisor.subscribe();

    fixture.supervisor.start(fixture.request()).unwrap();
    wait_for_message(&fixture.supervisor, "started").await;

    assert!(fixture.supervisor.cancel());
    assert_eq!(fixture.supervisor.status().status, JobStatus::Cancelled);

    sleep(Duration::from_millis(300)).await;
    let job = fixture.supervisor.status();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.message, "Cancelled by user.");
    assert!(!fixture.request().target_dir.join("late.bin").exists());
    assert_eq!(fixture.metrics.downloads_cancelled(), 1);

    let mut saw_cancelled = false;
    while let Ok(event) = events.try_recv() {
        if let JobEvent::Finished { status, .. } = event {
            saw_cancelled = status == JobStatus::Cancelled;
        }
    }
    assert!(saw_cancelled);

    // A cancelled job no longer blocks a new start.
    assert!(fixture.supervisor.start(fixture.request()).is_ok());
    fixture.supervisor.cancel();
}

#[tokio::test]
async fn test_cancel_kills_downloader_after_output_closes() {
    let _lock = DOWNLOADER_LOCK.lock().await;
    let fixture = Fixture::with_script(
        r#"echo "started"
exec >/dev/null 2>&1
sleep 2
printf 'late' > "$6/late.bin""#,
    );

    fixture.supervisor.start(fixture.request()).unwrap();
    wait_for_message(&fixture.supervisor, "started").await;
    // Let the output streams reach EOF while the process keeps running.
    sleep(Duration::from_millis(500)).await;
    assert_eq!(fixture.supervisor.status().status, JobStatus::Downloading);

    assert!(fixture.supervisor.cancel());

    sleep(Duration::from_millis(2500)).await;
    assert!(!fixture.request().target_dir.join("late.bin").exists());
    assert_eq!(fixture.supervisor.status().status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_missing_executable_fails_job() {
    let _lock = DOWNLOADER_LOCK.lock().await;
    let fixture = Fixture::build(None, None);

    let job = fixture.run_to_end().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.message.starts_with("Executable not found: "));
    assert!(job.message.contains("backend"));
}

#[tokio::test]
async fn test_argument_contract_and_custom_tool_dir() {
    let _lock = DOWNLOADER_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let custom_dir = Utf8PathBuf::try_from(temp_dir.path().join("tools")).unwrap();
    fs::create_dir_all(&custom_dir).unwrap();
    write_script(
        &custom_dir.join(DOWNLOADER_BINARY),
        r#"echo "$@" > "$6/args.txt"
exit 0"#,
    );

    let fixture = Fixture::build(Some("exit 1"), Some(custom_dir));
    let job = fixture.run_to_end().await;

    assert_eq!(job.status, JobStatus::Done);
    let target = fixture.request().target_dir;
    let args = fs::read_to_string(target.join("args.txt")).unwrap();
    assert_eq!(
        args.trim(),
        format!("-app 4000 -pubfile 2834567120 -dir {} -max-downloads 8", target)
    );
}
