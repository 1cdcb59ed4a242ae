//! Callflow engine daemon
//!
//! Wires the engine to an in-process store and exits nonzero when the
//! control-plane connection is lost for good; the supervisor restarts us.
//! The control-plane transport is deployment-specific and is provided by
//! the embedding build; this binary runs the engine against whatever
//! transport feeds its event channel.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;

use callflow_call_engine::prelude::*;
use callflow_infra_common::logging::{parse_log_level, setup_logging, LoggingConfig};

#[derive(Debug, Parser)]
#[command(name = "callflowd", about = "Callflow call orchestration daemon")]
struct Args {
    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The subscriber may not be installed yet, so plain stderr
            eprintln!("callflowd: fatal: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = parse_log_level(&args.log_level).context("invalid --log-level")?;
    let mut logging = LoggingConfig::new(level, "callflowd");
    if args.json_logs {
        logging = logging.with_json();
    }
    setup_logging(&logging).context("logging setup failed")?;

    let config = EngineConfig::from_env().context("engine configuration")?;
    tracing::info!(
        "Origination window {:?} (+{:?} guard), lock TTL {:?}",
        config.origination_timeout,
        config.ring_guard,
        config.lock_ttl
    );

    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let (event_tx, event_rx) = mpsc::channel::<ControlEvent>(1024);
    let control = connect_control_plane(&config, event_tx).await?;

    let server = CallEngineServer::builder()
        .with_config(config)
        .with_store(store)
        .with_control_plane(control)
        .build()?;

    server.run(event_rx).await?;
    Ok(())
}

/// Resolve the deployment's control-plane transport
///
/// The engine is transport-agnostic; deployments link a transport crate
/// that dials the PBX, feeds `event_tx`, and returns the command half.
async fn connect_control_plane(
    _config: &EngineConfig,
    _event_tx: mpsc::Sender<ControlEvent>,
) -> anyhow::Result<Arc<dyn ControlPlane>> {
    anyhow::bail!("no control-plane transport linked into this build")
}
