//! Data models shared across the crate.
//!
//! - [`UserConfig`] / [`ToolSettings`]: the tool's own settings, loaded from
//!   `settings.yaml` by [`ConfigManager`](crate::config::ConfigManager)
//! - [`DownloadJob`] / [`JobStatus`]: the observable record of the Workshop
//!   download job, owned by [`JobStateManager`](crate::state::JobStateManager)
//! - [`OperationResult`]: the `{success, message?, error?}` reply of config
//!   operations
//!
//! All of them are serializable so callers can hand them straight to a front
//! end as JSON.

pub mod config;
pub mod job;
pub mod outcome;

pub use config::{DEFAULT_MAX_DOWNLOADS, ToolSettings, UserConfig};
pub use job::{DownloadJob, JobStatus, LOGIN_REQUIRED, StartResponse};
pub use outcome::OperationResult;
