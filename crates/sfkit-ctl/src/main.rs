//! sfkit operator tool (sfkit-ctl).
//!
//! Inspects the readiness of a study cluster from any machine that can
//! reach the nodes.
//!
//! # Usage
//!
//! ```text
//! sfkit-ctl [OPTIONS] <COMMAND>
//!
//! Commands:
//!   status    Probe every role once and show what it reports
//!   resolve   Show the role and address an identity maps to
//!
//! Options:
//!   -n, --cluster-size <N>        Number of nodes [default: 4]
//!       --host-template <T>       Host template [default: 10.0.{role}.10]
//!       --addr <HOST[:PORT]>      Explicit address, in role order
//!   -p, --port <PORT>             Readiness port [default: 8055]
//! ```

mod status;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sfkit_proto::constants::{DEFAULT_CLUSTER_SIZE, READINESS_PORT};
use sfkit_proto::defaults::{DEFAULT_HOST_TEMPLATE, DEFAULT_PROBE_TIMEOUT_SECS};
use sfkit_proto::role::{NodeAddr, RoleAddressTable};
use sfkit_proto::{resolve_role, BootResult};

/// sfkit cluster readiness tool.
#[derive(Parser)]
#[command(name = "sfkit-ctl", version, about = "sfkit cluster readiness tool")]
struct Cli {
    /// Number of nodes in the study
    #[arg(short = 'n', long, default_value_t = DEFAULT_CLUSTER_SIZE)]
    cluster_size: usize,

    /// Host template; {role} is replaced by the role index
    #[arg(long, default_value = DEFAULT_HOST_TEMPLATE)]
    host_template: String,

    /// Explicit node address, in role order. Overrides the template.
    #[arg(long = "addr", value_name = "HOST[:PORT]")]
    addrs: Vec<String>,

    /// Readiness port
    #[arg(short = 'p', long, default_value_t = READINESS_PORT)]
    port: u16,

    /// Enable verbose/debug logging
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every role once and show what it reports
    Status {
        /// Probe timeout in seconds
        #[arg(short = 't', long, default_value_t = DEFAULT_PROBE_TIMEOUT_SECS)]
        timeout: u64,
    },
    /// Show the role and address an identity maps to
    Resolve {
        /// Hostname or instance name
        identity: String,
    },
}

impl Cli {
    fn table(&self) -> BootResult<RoleAddressTable> {
        if self.addrs.is_empty() {
            RoleAddressTable::from_template(&self.host_template, self.port, self.cluster_size)
        } else {
            let entries = self
                .addrs
                .iter()
                .map(|a| NodeAddr::parse(a, self.port))
                .collect::<BootResult<Vec<_>>>()?;
            RoleAddressTable::from_addrs(entries)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let table = match cli.table() {
        Ok(t) => t,
        Err(e) => exit_error(&e.to_string()),
    };

    match cli.command {
        Commands::Status { timeout } => {
            status::run(&table, std::time::Duration::from_secs(timeout)).await;
        }
        Commands::Resolve { identity } => match resolve_role(&identity, table.size()) {
            Ok(role) => {
                let special = if table.is_special(role) {
                    " (data holder, Phase 1 only)"
                } else {
                    ""
                };
                match table.address(role) {
                    Some(addr) => println!("role {} at {}{}", role, addr, special),
                    None => println!("role {}{}", role, special),
                }
            }
            Err(e) => exit_error(&e.to_string()),
        },
    }
}

/// Print an error message and exit with code 1.
fn exit_error(msg: &str) -> ! {
    eprintln!("Error: {}", msg);
    std::process::exit(1);
}
