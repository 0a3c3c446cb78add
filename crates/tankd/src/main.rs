//! tankd - Tank gauge field agent
//!
//! Polls a Veeder-Root automatic tank gauge, batches the decoded readings
//! and uploads them to the ingestion API.
//!
//! Usage:
//!   tankd [OPTIONS]
//!
//! Options:
//!   -c, --config <path>  Configuration file (default: tankd.toml)
//!       --json           Emit logs as JSON lines
//!
//! The configuration file is read again every time the agent restarts.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tank_client::IngestClient;
use tank_uplink::{BatchPipeline, PackageStore};
use tank_veeder::{create_transport, PollingSession};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AgentConfig;

/// Pause before restarting the agent after a failure
const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Parsed command-line arguments
struct Args {
    /// Agent config file (TOML)
    config_path: PathBuf,
    /// Log as JSON instead of human-readable text
    json_logs: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut result = Args {
        config_path: PathBuf::from("tankd.toml"),
        json_logs: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    result.config_path = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    eprintln!("Missing argument for --config");
                    i += 1;
                }
            }
            "--json" => {
                result.json_logs = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                i += 1;
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"tankd - Tank gauge field agent

Usage: tankd [OPTIONS]

Options:
  -c, --config <path>  Configuration file (default: tankd.toml)
      --json           Emit logs as JSON lines
  -h, --help           Print this help message

Log filtering follows RUST_LOG, e.g. RUST_LOG=tank_veeder=debug
"#
    );
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "tankd=info,tank_veeder=info,tank_uplink=info,tank_client=info".into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();
    init_logging(args.json_logs);

    tracing::info!("Starting tankd (tank gauge agent)");

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            on_signal.cancel();
        }
    });

    loop {
        tracing::info!("Loading config from: {}", args.config_path.display());
        let result = match AgentConfig::load(&args.config_path) {
            Ok(config) => run_agent(&config, shutdown.child_token()).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => break,
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "Agent failed");
            }
        }

        if shutdown.is_cancelled() {
            break;
        }
        tracing::info!("Restarting agent in {:?}", RESTART_DELAY);
        tokio::select! {
            _ = tokio::time::sleep(RESTART_DELAY) => {}
            () = shutdown.cancelled() => break,
        }
    }

    tracing::info!("tankd stopped");
    Ok(())
}

/// Run one agent instance until `cancel` fires
async fn run_agent(config: &AgentConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let store = PackageStore::new(&config.uplink.storage_dir);
    store.init().await?;
    let leftover = store.pending().await?;
    if !leftover.is_empty() {
        tracing::warn!(
            count = leftover.len(),
            dir = %store.dir().display(),
            "Pending packages from a previous run are not resent"
        );
    }

    let client = Arc::new(IngestClient::from_config(&config.api)?);
    tracing::info!(api = %client.base_url(), "Uploading to ingestion API");

    let transport = create_transport(&config.device.transport, cancel.clone())?;
    let session = PollingSession::new(
        config.device.clone(),
        (&config.polling).into(),
        transport,
        cancel.clone(),
    )?;

    let pipeline = BatchPipeline::spawn(&config.uplink, store, client, cancel.clone());

    session
        .run(|tick| {
            tracing::info!(
                elapsed = ?tick.elapsed,
                measurements = tick.measurements.len(),
                transfers = tick.transfers.len(),
                "Tick complete"
            );
            pipeline.submit(tick.measurements, tick.transfers);
        })
        .await;

    let summary = pipeline.shutdown().await;
    tracing::info!(
        delivered = summary.delivered,
        dead_lettered = summary.dead_lettered,
        cancelled = summary.cancelled,
        "Pipeline stopped"
    );
    Ok(())
}
