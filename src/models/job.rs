use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Message reported when the downloader gave nothing usable back because the
/// item needs a logged-in (owning) account.
pub const LOGIN_REQUIRED: &str = "LOGIN_REQUIRED";

/// Lifecycle of the single Workshop download job.
///
/// `Idle` only exists before the first job; a new start moves straight from
/// any finished state into `Downloading`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Downloading,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether the job has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Downloading => "downloading",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable record of the download job.
///
/// This is what pollers see. The child process belongs to the task consuming
/// its output and never appears here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadJob {
    pub status: JobStatus,

    /// Percentage in `[0, 100]`
    pub progress: f32,

    pub message: String,

    /// Target directory of the download
    pub path: Utf8PathBuf,

    /// Extra failure detail, shown next to the [`LOGIN_REQUIRED`] sentinel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadJob {
    /// Fresh record for a job that is about to start.
    pub fn starting(path: Utf8PathBuf) -> Self {
        Self {
            status: JobStatus::Downloading,
            progress: 0.0,
            message: "Initializing...".to_string(),
            path,
            error: None,
        }
    }

    pub fn is_downloading(&self) -> bool {
        self.status == JobStatus::Downloading
    }

    pub fn requires_login(&self) -> bool {
        self.status == JobStatus::Failed && self.message == LOGIN_REQUIRED
    }
}

/// Reply to a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    pub started: bool,
}
