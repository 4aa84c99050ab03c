//! slstools - SLSsteam config editing and Workshop downloads
//!
//! Main entry point for the command-line tool.
//!
//! # Execution Flow
//!
//! 1. Parse arguments (clap)
//! 2. Resolve the data directory, settings and SLSsteam config path
//! 3. Initialize logging → `<data_dir>/logs/slstools.<date>`
//! 4. Create the tokio runtime used for the downloader process
//! 5. Run the command and print its JSON result on stdout
//! 6. Log a metrics summary and shut the runtime down
//!
//! The process exits with status 1 when the command reports failure.

use anyhow::Result;
use clap::Parser;
use slstools::cli::{self, Cli, CommandContext, Commands, WorkshopAction};
use slstools::logging::{self, LOG_PREFIX};
use slstools::{APP_NAME, Metrics, VERSION};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    let metrics = Arc::new(Metrics::new());
    let ctx = CommandContext::from_args(&args.global, metrics.clone())?;

    let debug_mode = args.global.debug || ctx.settings.debug_mode;
    let _log_guard =
        logging::setup_logging_with_console(&ctx.log_dir(), LOG_PREFIX, debug_mode, args.global.debug)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("slstools-worker")
        .build()?;

    let output = match &args.command {
        Commands::Workshop {
            action: WorkshopAction::Download(download),
        } => {
            let handle = runtime.handle().clone();
            runtime.block_on(cli::run_workshop_download(&ctx, download, handle))
        }
        command => cli::run_command(&ctx, command),
    };

    println!("{}", serde_json::to_string_pretty(&output.body)?);

    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Shutdown complete");

    Ok(if output.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
