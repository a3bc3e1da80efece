mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use std::process::ExitCode;
use tracing::{info, warn};
use transferbox::config::Config;
use transferbox::jobs::TransferRequest;
use transferbox::observability::init_tracing;
use transferbox::{ChannelSink, DownloadRequest, JobEvent, TransferEvent, TransferService, UploadRequest};

/// The CLI runs a single job under this id
const CLI_JOB_ID: i32 = 1;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    init_tracing(&config.logging.filter);

    let request: TransferRequest = match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Download(args) => DownloadRequest::builder()
            .from_url(args.url)
            .to_path(args.path)
            .headers(cli::headers_map(args.headers))
            .maybe_progress_interval_ms(args.progress_interval)
            .maybe_progress_divider(args.progress_divider)
            .build()
            .into(),
        Commands::Upload(args) => UploadRequest::builder()
            .to_url(args.url)
            .maybe_method(args.method)
            .headers(cli::headers_map(args.headers))
            .fields(args.fields)
            .files(args.files)
            .binary_stream_only(args.binary)
            .build()
            .into(),
    };

    let (sink, mut events) = ChannelSink::new();
    let service = TransferService::new(config, sink)?;
    service.registry().submit(CLI_JOB_ID, request)?;

    let mut interrupted = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                warn!(job_id = CLI_JOB_ID, "Interrupted, cancelling job");
                service.registry().cancel(CLI_JOB_ID);
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event)?;
                if event.event.is_terminal() {
                    info!(metrics = ?service.metrics(), "Job finished");
                    let failed = matches!(event.event, TransferEvent::Error { .. });
                    return Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS });
                }
            }
        }
    }

    Ok(ExitCode::FAILURE)
}

fn print_event(event: &JobEvent) -> Result<(), serde_json::Error> {
    let line = serde_json::to_string(event)?;
    println!("{line}");
    Ok(())
}
