use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use orion::kdf::SecretKey;
use tokio::task::LocalSet;

use corral::auth::{Acls, CredentialStore};
use corral::common::setup::setup_logging;
use corral::master::start::{AgentDef, MasterConfig, master_start};

#[derive(Parser)]
#[command(version, about = "Cluster resource manager master")]
struct Opts {
    /// Cluster definition file (JSON list of agents with their resources)
    #[arg(long)]
    agents: PathBuf,

    /// Operator credentials file (JSON list of {principal, secret})
    #[arg(long)]
    credentials: PathBuf,

    /// Access-control rules file; permissive defaults when not given
    #[arg(long)]
    acls: Option<PathBuf>,

    /// Hex-encoded 32-byte key protecting scheduler connections;
    /// plaintext connections when not given
    #[arg(long)]
    secret_key_file: Option<PathBuf>,

    /// Port of the operator HTTP endpoints
    #[arg(long, default_value = "7070")]
    http_port: u16,

    /// Port schedulers connect to
    #[arg(long, default_value = "7071")]
    scheduler_port: u16,

    /// Cadence of the periodic allocation pass
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    allocation_interval: Duration,

    #[arg(long, short)]
    verbose: bool,
}

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value)
}

fn load_secret_key(path: &PathBuf) -> anyhow::Result<Arc<SecretKey>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read secret key file {}", path.display()))?;
    let bytes = hex::decode(data.trim()).context("Secret key file is not valid hex")?;
    let key = SecretKey::from_slice(&bytes).context("Secret key has invalid length")?;
    Ok(Arc::new(key))
}

fn load_config(opts: &Opts) -> anyhow::Result<MasterConfig> {
    let agents: Vec<AgentDef> = serde_json::from_str(
        &std::fs::read_to_string(&opts.agents)
            .with_context(|| format!("Cannot read cluster definition {}", opts.agents.display()))?,
    )
    .context("Invalid cluster definition")?;
    let credentials =
        CredentialStore::load(&opts.credentials).context("Cannot load credentials")?;
    let acls = match &opts.acls {
        Some(path) => Acls::load(path).context("Cannot load ACLs")?,
        None => Acls::default(),
    };
    let secret_key = opts
        .secret_key_file
        .as_ref()
        .map(load_secret_key)
        .transpose()?;

    Ok(MasterConfig {
        http_listen: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), opts.http_port),
        scheduler_listen: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), opts.scheduler_port),
        secret_key,
        allocation_interval: opts.allocation_interval,
        credentials,
        acls,
        agents,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    setup_logging(opts.verbose);
    let config = load_config(&opts)?;

    let local_set = LocalSet::new();
    local_set
        .run_until(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Master interrupted, shutting down");
                    Ok(())
                }
                r = master_start(config) => r.map_err(|e| anyhow::anyhow!("{e}")),
            }
        })
        .await
}
