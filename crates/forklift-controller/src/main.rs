//! forklift-controller binary

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;

use forklift_common::kube_utils::create_client;
use forklift_common::telemetry::{init_tracing, LogFormat};
use forklift_common::{
    resolve_identity, shutdown_signal, Config, KubePodApi, OsPodEnv, DEFAULT_CONFIG_PATH,
    DEFAULT_CONTROLLER_CONTAINER,
};
use forklift_controller::{parse_listen_addr, serve, ControllerContext};
use forklift_runtime::{runtime_for, NsenterExec, RuntimeOptions, DEFAULT_COMMAND_TIMEOUT};

/// Serves archives of the images active workloads use to node agents
#[derive(Parser, Debug)]
#[command(name = "forklift-controller", version, about, long_about = None)]
struct Cli {
    /// Namespace config file
    #[arg(long, env = "FORKLIFT_CONFIG_FILE_PATH", default_value = DEFAULT_CONFIG_PATH)]
    config_file_path: PathBuf,

    /// Address to listen on (`:80` means all interfaces)
    #[arg(long, env = "FORKLIFT_LISTEN_ADDR", default_value = ":80")]
    listen_addr: String,

    /// Directory holding export archives (defaults to the temp dir)
    #[arg(long, env = "FORKLIFT_EXPORT_DIR")]
    export_dir: Option<PathBuf>,

    /// Name of this container in the controller pod
    #[arg(long, env = "FORKLIFT_CONTAINER_NAME", default_value = DEFAULT_CONTROLLER_CONTAINER)]
    container_name: String,

    /// Timeout for a single runtime command, in seconds
    #[arg(long, env = "FORKLIFT_COMMAND_TIMEOUT_SECS", default_value_t = DEFAULT_COMMAND_TIMEOUT.as_secs())]
    command_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(LogFormat::from_env())?;

    let addr = parse_listen_addr(&cli.listen_addr)
        .with_context(|| format!("invalid listen address {:?}", cli.listen_addr))?;
    let config = Arc::new(Config::load(&cli.config_file_path)?);

    let client = create_client()
        .await
        .context("failed to create kubernetes client")?;
    let pods = Arc::new(KubePodApi::new(client));

    let identity = resolve_identity(pods.as_ref(), &OsPodEnv::default(), &cli.container_name)
        .await
        .context("failed to resolve runtime identity")?;
    let exec = Arc::new(NsenterExec::new(Some(Duration::from_secs(
        cli.command_timeout_secs,
    ))));
    let runtime = runtime_for(&identity, exec, &RuntimeOptions::default())?;

    let export_dir = cli.export_dir.unwrap_or_else(std::env::temp_dir);
    tokio::fs::create_dir_all(&export_dir)
        .await
        .with_context(|| format!("failed to create export dir {}", export_dir.display()))?;
    // Runtime adapters address this path from the host side
    let export_dir = std::path::absolute(&export_dir)?;

    info!(
        runtime = %identity.kind,
        export_dir = %export_dir.display(),
        "Starting forklift controller"
    );

    let ctx = Arc::new(ControllerContext::new(config, pods, runtime, export_dir));
    serve(ctx, addr, shutdown_signal()).await?;

    info!("Controller stopped");
    Ok(())
}
