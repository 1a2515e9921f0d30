//! sfkit study node daemon (sfkit-node).
//!
//! Runs on every VM of a secure GWAS study. Each node works out its role
//! from its hostname, runs local setup, opens its readiness listener, waits
//! until every peer's listener answers, then launches the data sharing and
//! GWAS phases with role-dependent delays.
//!
//! Usage:
//!   sfkit-node [OPTIONS]

mod config;
mod node;

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};

use sfkit_proto::constants::READINESS_PORT;
use sfkit_proto::defaults::*;

use crate::config::{load_deployment, node_identity, DeploymentFile, NodeConfig};
use crate::node::Node;

/// sfkit study node daemon
#[derive(Parser, Debug)]
#[command(name = "sfkit-node", version, about = "sfkit study node daemon")]
pub(crate) struct Args {
    /// Deployment file (YAML) with setup steps, phase programs and publisher
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Node identity used to derive the role (default: OS hostname)
    #[arg(long)]
    identity: Option<String>,

    /// Use this role instead of deriving it from the identity
    #[arg(short = 'r', long)]
    role: Option<u16>,

    /// Number of nodes in the study
    #[arg(short = 'n', long)]
    cluster_size: Option<usize>,

    /// Peer host template; {role} is replaced by the role index
    #[arg(long)]
    host_template: Option<String>,

    /// Explicit peer address, in role order. Can be specified multiple times.
    #[arg(long = "addr", value_name = "HOST[:PORT]")]
    addrs: Vec<String>,

    /// Readiness port
    #[arg(short = 'p', long, default_value_t = READINESS_PORT)]
    port: u16,

    /// Listen address for the readiness listener
    #[arg(short = 'b', long, default_value = DEFAULT_BIND_ADDR)]
    bind_addr: String,

    /// Per-attempt probe timeout in seconds
    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT_SECS)]
    probe_timeout: u64,

    /// Seconds between probe attempts to a peer that is not ready
    #[arg(long, default_value_t = DEFAULT_PROBE_RETRY_SECS)]
    retry_interval: u64,

    /// Give up waiting for peers after this many seconds (default: never)
    #[arg(long)]
    max_wait: Option<u64>,

    /// Seconds of Phase 1 stagger per role index
    #[arg(long, default_value_t = DEFAULT_PHASE1_STAGGER_SECS)]
    stagger: u64,

    /// Fixed seconds of cooldown before Phase 2
    #[arg(long, default_value_t = DEFAULT_COOLDOWN_BASE_SECS)]
    cooldown_base: u64,

    /// Extra cooldown seconds per role index
    #[arg(long, default_value_t = DEFAULT_COOLDOWN_STEP_SECS)]
    cooldown_step: u64,

    /// Phase 1 (data sharing) program
    #[arg(long)]
    phase1_program: Option<String>,

    /// Phase 2 (GWAS) program
    #[arg(long)]
    phase2_program: Option<String>,

    /// Parameter file template; {role} is replaced by the role index
    #[arg(long)]
    param_file: Option<String>,

    /// Shared data directory passed to Phase 1 by the last role
    #[arg(long)]
    data_dir: Option<String>,

    /// Working directory for both phases
    #[arg(short = 'w', long)]
    workdir: Option<PathBuf>,

    /// Study title, used as the checkpoint message prefix
    #[arg(long)]
    study: Option<String>,

    /// Pub/Sub topic for checkpoints (default: log only)
    #[arg(long)]
    topic: Option<String>,

    /// Skip the setup steps of the deployment file
    #[arg(long)]
    skip_setup: bool,

    /// Run the deployment file's validation command, report its count and exit
    #[arg(long)]
    validate: bool,

    /// Exit once the phases finish instead of serving readiness until Ctrl-C
    #[arg(long)]
    exit_on_complete: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("sfkit-node v{} starting", env!("CARGO_PKG_VERSION"));

    // ---------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------
    let file = match &args.config {
        Some(path) => match load_deployment(path).await {
            Ok(f) => f,
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        },
        None => DeploymentFile::default(),
    };

    let identity = match node_identity(args.identity.as_deref(), args.role, hostname::get()) {
        Ok(id) => id,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let config = match NodeConfig::build(&args, file, identity) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    // ---------------------------------------------------------------
    // Validation mode
    // ---------------------------------------------------------------
    if config.validate.is_some() {
        let node = Node::new(config);
        match node.validate().await {
            Ok(count) => info!("validation reported {}", count),
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // ---------------------------------------------------------------
    // Bootstrap sequence
    // ---------------------------------------------------------------
    let node = Node::new(config);
    let completed = tokio::select! {
        result = node.run() => match result {
            Ok(c) => c,
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("SIGINT received before the study sequence finished");
            std::process::exit(1);
        }
    };

    if !args.exit_on_complete {
        info!("sequence complete ({}), serving readiness until Ctrl-C", completed.state);
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to wait for Ctrl-C: {}", e);
        }
        info!("SIGINT received, shutting down");
    }

    completed.listener.shutdown().await;
    info!("sfkit-node stopped");
}
