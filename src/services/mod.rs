//! Services module - Workshop download supervision.
//!
//! The services drive the external `DepotDownloaderMod` tool and decide what
//! its run actually produced. They have no UI dependencies; callers talk to
//! [`DownloadSupervisor`] and poll its status.
//!
//! # Components
//!
//! - [`ProcessRunner`]: spawns the downloader with stdout and stderr merged
//!   into one line stream, and no console window on Windows
//! - [`ProgressParser`]: tells `NN.NN%` progress lines apart from
//!   informational output
//! - [`completion`]: the post-exit verdict. Exit code, a scan of the target
//!   directory and a scan of the output for auth refusals all count, because
//!   the downloader can exit `0` after fetching nothing
//! - [`DownloadSupervisor`]: owns the single job, its background task and
//!   cancellation
//!
//! # Usage Example
//!
//! ```ignore
//! use slstools::services::{DownloadRequest, DownloadSupervisor, DownloaderLocator};
//!
//! let supervisor = DownloadSupervisor::new(
//!     JobStateManager::new(),
//!     DownloaderLocator::for_plugin(&plugin_dir, settings.custom_tool_path()),
//!     host,
//!     runtime.handle().clone(),
//! );
//!
//! supervisor.start(DownloadRequest::for_workshop(&steam_root, 4000, 2834567120))?;
//! let job = supervisor.status();
//! ```

pub mod completion;
pub mod progress;
pub mod runner;
pub mod supervisor;

pub use completion::{ContentScan, Verdict};
pub use progress::{LineKind, ProgressParser};
pub use runner::{ProcessRunner, RunningProcess};
pub use supervisor::{
    DOWNLOADER_BINARY, DownloadError, DownloadRequest, DownloadSupervisor, DownloaderLocator,
    DownloaderSource, ResolvedDownloader, build_download_args, workshop_content_dir,
};
