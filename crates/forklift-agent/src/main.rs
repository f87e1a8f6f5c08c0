//! forklift-agent binary

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;

use forklift_agent::{
    after_startup_delay, ControllerClient, Reconciler, DEFAULT_INTERVAL, DEFAULT_STARTUP_DELAY,
};
use forklift_common::kube_utils::create_client;
use forklift_common::telemetry::{init_tracing, LogFormat};
use forklift_common::{
    resolve_identity, shutdown_signal, KubePodApi, OsPodEnv, DEFAULT_AGENT_CONTAINER,
    DEFAULT_CONTROLLER_ADDR,
};
use forklift_runtime::{runtime_for, NsenterExec, RuntimeOptions, DEFAULT_COMMAND_TIMEOUT};

/// Imports images declared by the forklift controller into this node's runtime
#[derive(Parser, Debug)]
#[command(name = "forklift-agent", version, about, long_about = None)]
struct Cli {
    /// Base URL of the controller service
    #[arg(long, env = "FORKLIFT_CONTROLLER_SERVICE_ADDR", default_value = DEFAULT_CONTROLLER_ADDR)]
    controller_service_addr: String,

    /// Seconds to wait before contacting the cluster API
    #[arg(long, env = "FORKLIFT_WAIT_FOR_READY", default_value_t = DEFAULT_STARTUP_DELAY.as_secs())]
    wait_for_ready: u64,

    /// Seconds between ticks
    #[arg(long, env = "FORKLIFT_INTERVAL", default_value_t = DEFAULT_INTERVAL.as_secs())]
    interval: u64,

    /// Directory for downloaded archives (defaults to the temp dir)
    #[arg(long, env = "FORKLIFT_DOWNLOAD_DIR")]
    download_dir: Option<PathBuf>,

    /// Name of this container in the agent pod
    #[arg(long, env = "FORKLIFT_CONTAINER_NAME", default_value = DEFAULT_AGENT_CONTAINER)]
    container_name: String,

    /// Timeout for a single runtime command, in seconds
    #[arg(long, env = "FORKLIFT_COMMAND_TIMEOUT_SECS", default_value_t = DEFAULT_COMMAND_TIMEOUT.as_secs())]
    command_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(LogFormat::from_env())?;

    let identity = after_startup_delay(Duration::from_secs(cli.wait_for_ready), async {
        let client = create_client()
            .await
            .context("failed to create kubernetes client")?;
        let pods = KubePodApi::new(client);
        resolve_identity(&pods, &OsPodEnv::default(), &cli.container_name)
            .await
            .context("failed to resolve runtime identity")
    })
    .await?;

    let exec = Arc::new(NsenterExec::new(Some(Duration::from_secs(
        cli.command_timeout_secs,
    ))));
    let runtime = runtime_for(&identity, exec, &RuntimeOptions::default())?;
    let source = Arc::new(ControllerClient::new(&cli.controller_service_addr)?);

    let download_dir = cli.download_dir.unwrap_or_else(std::env::temp_dir);
    tokio::fs::create_dir_all(&download_dir)
        .await
        .with_context(|| format!("failed to create download dir {}", download_dir.display()))?;
    // Runtime adapters address this path from the host side
    let download_dir = std::path::absolute(&download_dir)?;

    info!(
        runtime = %identity.kind,
        controller = %source.base_url(),
        download_dir = %download_dir.display(),
        "Starting forklift agent"
    );

    let reconciler = Reconciler::new(runtime, source, download_dir);
    tokio::select! {
        _ = reconciler.run(Duration::from_secs(cli.interval)) => {}
        _ = shutdown_signal() => {}
    }

    info!("Agent stopped");
    Ok(())
}
