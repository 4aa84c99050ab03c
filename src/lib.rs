// slstools - SLSsteam config editing and Workshop download supervision
//
// This is the library crate containing the config mutator, the download
// supervisor and their supporting types. The binary crate (main.rs) provides
// the command-line entry point.

pub mod cli;
pub mod config;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod slsconfig;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use host::{DesktopHost, HostEnvironment};
pub use metrics::Metrics;
pub use models::{DownloadJob, JobStatus, OperationResult, ToolSettings, UserConfig};
pub use services::{DownloadError, DownloadRequest, DownloadSupervisor, DownloaderLocator};
pub use slsconfig::{ConfigError, ConfigMutator, MutationOutcome, TokenStore};
pub use state::{JobEvent, JobStateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
