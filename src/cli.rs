//! Command-line interface.
//!
//! Every command prints one JSON document on stdout. Config commands print
//! the `{success, message?, error?}` shape; queries add their own fields.

use crate::config::ConfigManager;
use crate::host::{DesktopHost, HostEnvironment};
use crate::logging::LOG_DIR_NAME;
use crate::metrics::Metrics;
use crate::models::{JobStatus, OperationResult, ToolSettings};
use crate::services::{DownloadRequest, DownloadSupervisor, DownloaderLocator};
use crate::slsconfig::{
    ConfigError, ConfigMutator, DlcEntry, MutationOutcome, NOTIFY_INIT, PLAY_NOT_OWNED_GAMES,
    SAFE_MODE, TokenStore,
};
use crate::state::JobStateManager;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// How often `workshop download` polls the job status.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// slstools - SLSsteam config editing and Workshop downloads
#[derive(Parser, Debug)]
#[command(
    name = "slstools",
    version,
    about = "Edit the SLSsteam config and download Workshop items",
    long_about = "Idempotent edits of the SLSsteam config.yaml (fake app ids, access tokens, DLC lists, \
override flags) and supervised Workshop downloads through DepotDownloaderMod."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments available to all subcommands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// SLSsteam config.yaml to edit (default: <config dir>/SLSsteam/config.yaml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Directory for settings and logs
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<Utf8PathBuf>,

    /// Plugin directory holding backend/DepotDownloaderMod and appaccesstokens.json
    #[arg(long, global = true, value_name = "DIR")]
    pub plugin_dir: Option<Utf8PathBuf>,

    /// Debug logging, also echoed to stderr
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Map an app id to the Spacewar app id (480)
    FakeAppId {
        #[command(subcommand)]
        action: EntryAction,
    },

    /// Manage access tokens from appaccesstokens.json
    Token {
        #[command(subcommand)]
        action: EntryAction,
    },

    /// Manage DLC lists
    Dlc {
        #[command(subcommand)]
        action: DlcAction,
    },

    /// Allow launching games the account does not own
    PlayNotOwned {
        #[arg(value_enum)]
        state: Toggle,
    },

    SafeMode {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Show override flags and the SLSsteam version
    Flags,

    /// Workshop downloads
    Workshop {
        #[command(subcommand)]
        action: WorkshopAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum EntryAction {
    Add { app_id: u32 },
    Remove { app_id: u32 },
    Status { app_id: u32 },
}

#[derive(Subcommand, Debug, Clone)]
pub enum DlcAction {
    /// Add a DLC block; each DLC is given as `<id>=<name>`
    Add {
        app_id: u32,
        #[arg(value_parser = parse_dlc, required = true)]
        dlcs: Vec<DlcEntry>,
    },
    Remove {
        app_id: u32,
    },
    Status {
        app_id: u32,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::On
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum WorkshopAction {
    /// Download an item and wait for it; Ctrl-C cancels
    Download(DownloadArgs),

    /// Show or set the custom DepotDownloaderMod location
    ToolPath {
        /// New path; an empty string clears it
        path: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    pub app_id: u32,

    /// Published file id of the item
    pub pubfile_id: u64,

    /// Download into this directory
    #[arg(long, value_name = "DIR", conflicts_with = "steam_root", required_unless_present = "steam_root")]
    pub dir: Option<Utf8PathBuf>,

    /// Download into <ROOT>/steamapps/workshop/content/<app>/<pubfile>
    #[arg(long, value_name = "ROOT")]
    pub steam_root: Option<Utf8PathBuf>,
}

impl DownloadArgs {
    pub fn request(&self) -> Option<DownloadRequest> {
        match (&self.dir, &self.steam_root) {
            (Some(dir), _) => Some(DownloadRequest::new(self.app_id, self.pubfile_id, dir.clone())),
            (None, Some(root)) => Some(DownloadRequest::for_workshop(
                root,
                self.app_id,
                self.pubfile_id,
            )),
            (None, None) => None,
        }
    }
}

fn parse_dlc(value: &str) -> Result<DlcEntry, String> {
    let (id, name) = value
        .split_once('=')
        .ok_or_else(|| format!("expected <id>=<name>, got {:?}", value))?;
    let id = id
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid DLC id {:?}: {}", id, e))?;
    Ok(DlcEntry::new(id, name.trim()))
}

/// Result of a command: the JSON to print and whether it succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub body: Value,
    pub success: bool,
}

impl CommandOutput {
    fn query(body: Value) -> Self {
        Self {
            body,
            success: true,
        }
    }
}

impl From<OperationResult> for CommandOutput {
    fn from(result: OperationResult) -> Self {
        let success = result.success;
        let body = serde_json::to_value(&result).unwrap_or_else(|e| json!({
            "success": false,
            "error": e.to_string(),
        }));
        Self { body, success }
    }
}

impl From<Result<MutationOutcome, ConfigError>> for CommandOutput {
    fn from(result: Result<MutationOutcome, ConfigError>) -> Self {
        OperationResult::from(result).into()
    }
}

/// `<data dir>/slstools`, or `./slstools-data` when the platform has none.
pub fn default_data_dir() -> Utf8PathBuf {
    dirs::data_dir()
        .and_then(|dir| Utf8PathBuf::try_from(dir).ok())
        .map(|dir| dir.join("slstools"))
        .unwrap_or_else(|| Utf8PathBuf::from("slstools-data"))
}

/// Directory containing the running executable.
pub fn default_plugin_dir() -> Result<Utf8PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    let exe = Utf8PathBuf::try_from(exe).context("Executable path is not UTF-8")?;
    Ok(exe
        .parent()
        .map(Utf8Path::to_path_buf)
        .unwrap_or_else(|| Utf8PathBuf::from(".")))
}

/// Everything a command needs, resolved from the global arguments.
pub struct CommandContext {
    pub config_manager: ConfigManager,
    pub settings: ToolSettings,
    pub sls_config: Utf8PathBuf,
    pub host: Arc<dyn HostEnvironment>,
    pub mutator: ConfigMutator,
    pub metrics: Arc<Metrics>,
}

impl CommandContext {
    pub fn from_args(global: &GlobalArgs, metrics: Arc<Metrics>) -> Result<Self> {
        let data_dir = global.data_dir.clone().unwrap_or_else(default_data_dir);
        let config_manager = ConfigManager::new(&data_dir)?;
        let settings = config_manager.load_settings()?;

        let sls_config = match &global.config {
            Some(path) => path.clone(),
            None => config_manager.sls_config_path(&settings)?,
        };
        let plugin_dir = match &global.plugin_dir {
            Some(dir) => dir.clone(),
            None => default_plugin_dir()?,
        };

        tracing::debug!(
            "SLSsteam config: {}, plugin dir: {}, data dir: {}",
            sls_config,
            plugin_dir,
            data_dir
        );

        Ok(Self {
            config_manager,
            settings,
            sls_config,
            host: Arc::new(DesktopHost::new(plugin_dir, data_dir)),
            mutator: ConfigMutator::with_metrics(metrics.clone()),
            metrics,
        })
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        self.host.data_dir().join(LOG_DIR_NAME)
    }

    fn token_store(&self) -> Result<TokenStore, ConfigError> {
        let plugin_dir = self.host.plugin_dir();
        match self
            .config_manager
            .token_database_path(&self.settings, &plugin_dir)
        {
            Some(path) => TokenStore::load(&path),
            None => TokenStore::load_for_plugin(&plugin_dir),
        }
    }

    fn exists_query(&self, app_id: u32, exists: Result<bool, ConfigError>) -> CommandOutput {
        match exists {
            Ok(exists) => CommandOutput::query(json!({
                "success": true,
                "appid": app_id,
                "exists": exists,
            })),
            Err(e) => OperationResult::failure(e.to_string()).into(),
        }
    }
}

/// Run every command except `workshop download`.
pub fn run_command(ctx: &CommandContext, command: &Commands) -> CommandOutput {
    let path = ctx.sls_config.as_path();
    let mutator = &ctx.mutator;

    match command {
        Commands::FakeAppId { action } => match *action {
            EntryAction::Add { app_id } => mutator.add_fake_app_id(path, app_id).into(),
            EntryAction::Remove { app_id } => mutator.remove_fake_app_id(path, app_id).into(),
            EntryAction::Status { app_id } => {
                ctx.exists_query(app_id, mutator.has_fake_app_id(path, app_id))
            }
        },

        Commands::Token { action } => match *action {
            EntryAction::Add { app_id } => ctx
                .token_store()
                .and_then(|store| mutator.add_token(path, app_id, &store))
                .into(),
            EntryAction::Remove { app_id } => mutator.remove_token(path, app_id).into(),
            EntryAction::Status { app_id } => {
                ctx.exists_query(app_id, mutator.has_token(path, app_id))
            }
        },

        Commands::Dlc { action } => match action {
            DlcAction::Add { app_id, dlcs } => mutator.add_dlc_block(path, *app_id, dlcs).into(),
            DlcAction::Remove { app_id } => mutator.remove_dlc_block(path, *app_id).into(),
            DlcAction::Status { app_id } => {
                ctx.exists_query(*app_id, mutator.has_dlc_block(path, *app_id))
            }
        },

        Commands::PlayNotOwned { state } => mutator
            .set_play_not_owned_games(path, state.enabled())
            .into(),

        Commands::SafeMode { state } => mutator.set_safe_mode(path, state.enabled()).into(),

        Commands::Flags => flags(ctx),

        Commands::Workshop {
            action: WorkshopAction::ToolPath { path: new_path },
        } => tool_path(ctx, new_path.as_deref()),

        Commands::Workshop {
            action: WorkshopAction::Download(_),
        } => OperationResult::failure("workshop download needs the async runtime").into(),
    }
}

fn flags(ctx: &CommandContext) -> CommandOutput {
    let path = ctx.sls_config.as_path();
    let read = || -> Result<Value, ConfigError> {
        Ok(json!({
            "success": true,
            "config": path.as_str(),
            "exists": ctx.mutator.config_exists(path),
            "version": ctx.mutator.sls_version(path)?,
            PLAY_NOT_OWNED_GAMES: ctx.mutator.read_flag(path, PLAY_NOT_OWNED_GAMES)?,
            NOTIFY_INIT: ctx.mutator.read_flag(path, NOTIFY_INIT)?,
            SAFE_MODE: ctx.mutator.read_flag(path, SAFE_MODE)?,
        }))
    };

    match read() {
        Ok(body) => CommandOutput::query(body),
        Err(e) => OperationResult::failure(e.to_string()).into(),
    }
}

fn tool_path(ctx: &CommandContext, new_path: Option<&str>) -> CommandOutput {
    let result = match new_path {
        Some(path) => ctx
            .config_manager
            .save_workshop_tool_path(path)
            .map(|()| path.trim().to_string()),
        None => ctx.config_manager.load_workshop_tool_path(),
    };

    match result {
        Ok(path) => CommandOutput::query(json!({ "success": true, "path": path })),
        Err(e) => OperationResult::from(e).into(),
    }
}

/// Start a download, follow it until it leaves `Downloading`, and report the
/// final job record. Ctrl-C cancels the job.
pub async fn run_workshop_download(
    ctx: &CommandContext,
    args: &DownloadArgs,
    runtime: Handle,
) -> CommandOutput {
    let Some(request) = args.request() else {
        return OperationResult::failure("Either --dir or --steam-root is required").into();
    };

    let supervisor = DownloadSupervisor::new(
        JobStateManager::new(),
        DownloaderLocator::for_host(ctx.host.as_ref(), ctx.settings.custom_tool_path()),
        ctx.host.clone(),
        runtime,
    )
    .with_metrics(ctx.metrics.clone())
    .with_max_downloads(ctx.settings.max_downloads);

    if let Err(e) = supervisor.start(request) {
        return OperationResult::failure(e.to_string()).into();
    }

    let mut interval = tokio::time::interval(POLL_INTERVAL);
    let mut last_message = String::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let job = supervisor.status();
                if job.message != last_message {
                    eprintln!("[{:>6.2}%] {}", job.progress, job.message);
                    last_message = job.message.clone();
                }
                if job.status.is_terminal() {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                }
                supervisor.cancel();
                break;
            }
        }
    }

    let job = supervisor.status();
    let success = job.status == JobStatus::Done;
    let body = serde_json::to_value(&job).unwrap_or_else(|e| json!({ "error": e.to_string() }));
    CommandOutput { body, success }
}
