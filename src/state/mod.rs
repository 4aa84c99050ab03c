// Job state module
//
// Owns the single download job record behind a lock and broadcasts change
// events to anyone following the job.

use crate::models::{DownloadJob, JobStatus};
use crate::services::DownloadError;
use camino::Utf8PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Message recorded when a running job is cancelled.
pub const CANCELLED_MESSAGE: &str = "Cancelled by user.";

/// Change events emitted when the job record is modified
#[derive(Clone, Debug, PartialEq)]
pub enum JobEvent {
    /// A new job replaced the previous record
    Started { job_id: u64, path: Utf8PathBuf },

    ProgressUpdated { progress: f32 },

    MessageChanged { message: String },

    /// The job left `Downloading`
    Finished { job_id: u64, status: JobStatus },
}

#[derive(Debug, Clone, Default)]
struct JobRecord {
    /// Zero until the first job starts
    job_id: u64,
    job: DownloadJob,
}

/// Thread-safe owner of the download job record
///
/// Every write happens under one `RwLock` write guard and every read clones a
/// full snapshot, so pollers never see a status from one update next to a
/// message from another.
///
/// Writers identify themselves by job id. Updates from a task whose job has
/// been replaced or has already left `Downloading` are dropped; this is what
/// keeps a cancelled task that is still draining output from overwriting
/// `Cancelled` or a newer job.
pub struct JobStateManager {
    record: Arc<RwLock<JobRecord>>,
    events_tx: broadcast::Sender<JobEvent>,
}

impl JobStateManager {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(100);
        Self {
            record: Arc::new(RwLock::new(JobRecord::default())),
            events_tx,
        }
    }

    /// Clone of the current job record
    pub fn snapshot(&self) -> DownloadJob {
        self.record.read().unwrap().job.clone()
    }

    /// Execute a function with read access to the job record
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&DownloadJob) -> R,
    {
        let record = self.record.read().unwrap();
        f(&record.job)
    }

    /// Id of the most recent job (0 if none ever started)
    pub fn current_job_id(&self) -> u64 {
        self.record.read().unwrap().job_id
    }

    pub fn is_downloading(&self) -> bool {
        self.read(|job| job.is_downloading())
    }

    /// Replace the record with a fresh `Downloading` job.
    ///
    /// Fails with [`DownloadError::AlreadyRunning`] and leaves the record
    /// untouched if a job is in flight. The check and the reset happen under
    /// the same write lock.
    pub fn begin_job(&self, path: Utf8PathBuf) -> Result<u64, DownloadError> {
        let mut record = self.record.write().unwrap();
        if record.job.is_downloading() {
            return Err(DownloadError::AlreadyRunning);
        }

        record.job_id += 1;
        record.job = DownloadJob::starting(path.clone());
        let job_id = record.job_id;
        drop(record);

        tracing::info!("Job {} started: {}", job_id, path);
        let _ = self.events_tx.send(JobEvent::Started { job_id, path });
        Ok(job_id)
    }

    /// Apply `update_fn` to the record if it still belongs to `job_id` and is
    /// `Downloading`.
    ///
    /// # Returns
    /// `false` if the update was dropped as stale
    pub fn update_job<F>(&self, job_id: u64, update_fn: F) -> bool
    where
        F: FnOnce(&mut DownloadJob),
    {
        let mut record = self.record.write().unwrap();
        if record.job_id != job_id || !record.job.is_downloading() {
            return false;
        }

        let old = record.job.clone();
        update_fn(&mut record.job);
        let changes = detect_changes(job_id, &old, &record.job);
        drop(record);

        for change in changes {
            let _ = self.events_tx.send(change);
        }
        true
    }

    /// Move a running job to its final state.
    pub fn finish_job(
        &self,
        job_id: u64,
        status: JobStatus,
        message: impl Into<String>,
        error: Option<String>,
    ) -> bool {
        let message = message.into();
        self.update_job(job_id, |job| {
            job.status = status;
            job.message = message;
            job.error = error;
            if status == JobStatus::Done {
                job.progress = 100.0;
            }
        })
    }

    /// Flip a running job to `Cancelled`.
    ///
    /// # Returns
    /// The id of the cancelled job, or `None` if nothing was running
    pub fn cancel_job(&self) -> Option<u64> {
        let job_id = self.current_job_id();
        self.finish_job(job_id, JobStatus::Cancelled, CANCELLED_MESSAGE, None)
            .then_some(job_id)
    }

    /// Subscribe to job events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events_tx.subscribe()
    }
}

fn detect_changes(job_id: u64, old: &DownloadJob, new: &DownloadJob) -> Vec<JobEvent> {
    let mut changes = Vec::new();

    if old.progress != new.progress {
        changes.push(JobEvent::ProgressUpdated {
            progress: new.progress,
        });
    }

    if old.message != new.message {
        changes.push(JobEvent::MessageChanged {
            message: new.message.clone(),
        });
    }

    if old.status != new.status && new.status.is_terminal() {
        changes.push(JobEvent::Finished {
            job_id,
            status: new.status,
        });
    }

    changes
}

impl Default for JobStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for JobStateManager {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
            events_tx: self.events_tx.clone(),
        }
    }
}
