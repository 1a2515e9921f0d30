//! Deployment file loading and node configuration.
//!
//! A deployment file is an optional YAML document shared by every node of
//! one study. Command-line flags override anything it sets.
//!
//! ```yaml
//! study: my_study
//! cluster_size: 4
//! host_template: "10.0.{role}.10"
//! setup:
//!   - checkpoint: done_installing_dependencies
//!     program: sudo
//!     args: [apt-get, install, -y, g++, make, libgmp-dev]
//! phase1:
//!   program: bin/DataSharingClient
//! phase2:
//!   program: bin/GwasClient
//! working_dir: /home/sfkit/secure-gwas/code
//! publisher:
//!   topic: sfkit-study
//! validate:
//!   program: wc
//!   args: [-l, /home/sfkit/data/pos.txt]
//! ```

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;
use sfkit_core::{BarrierPolicy, LaunchPlan, PhaseCommand, SetupStep, ValidateStep};
use sfkit_proto::constants::{DEFAULT_CLUSTER_SIZE, ROLE_PLACEHOLDER};
use sfkit_proto::role::{NodeAddr, RoleAddressTable};
use sfkit_proto::{resolve_role, BootError, BootResult, Role};
use tracing::{debug, error, warn};

use crate::Args;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploymentFile {
    pub study: Option<String>,
    pub cluster_size: Option<usize>,
    pub host_template: Option<String>,
    /// Explicit addresses indexed by role, `host` or `host:port`.
    pub addrs: Vec<String>,
    pub setup: Vec<SetupStep>,
    pub phase1: Option<PhaseFile>,
    pub phase2: Option<PhaseFile>,
    pub param_file_template: Option<String>,
    pub data_dir: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub publisher: Option<PublisherFile>,
    /// Data validation command, run instead of the study with `--validate`.
    pub validate: Option<ValidateStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseFile {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl From<PhaseFile> for PhaseCommand {
    fn from(p: PhaseFile) -> Self {
        PhaseCommand {
            program: p.program,
            args: p.args,
        }
    }
}

/// Where checkpoints go. `topic` selects the gcloud publisher; `program`
/// selects a custom command whose args may contain `{message}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublisherFile {
    pub topic: Option<String>,
    pub program: Option<String>,
    pub args: Vec<String>,
}

pub fn parse_deployment(text: &str, origin: &Path) -> BootResult<DeploymentFile> {
    serde_yaml::from_str(text).map_err(|e| BootError::Config {
        message: format!("failed to parse deployment file '{}': {}", origin.display(), e),
    })
}

pub async fn load_deployment(path: &Path) -> BootResult<DeploymentFile> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        error!("failed to read deployment file {}: {}", path.display(), e);
        BootError::Config {
            message: format!("cannot read '{}': {}", path.display(), e),
        }
    })?;
    let file = parse_deployment(&text, path)?;
    debug!(
        "loaded deployment file {} ({} setup steps)",
        path.display(),
        file.setup.len()
    );
    Ok(file)
}

/// Identity used for role resolution and checkpoint messages.
///
/// An explicit `--identity` wins, then the OS hostname. Without either,
/// a given `--role` yields `node{role}` so that checkpoint messages keep
/// a role-bearing hostname field.
pub fn node_identity(
    explicit: Option<&str>,
    role: Option<u16>,
    hostname: io::Result<OsString>,
) -> BootResult<String> {
    if let Some(id) = explicit {
        return Ok(id.to_string());
    }
    let host = hostname.map(|h| h.to_string_lossy().trim().to_string());
    match (host, role) {
        (Ok(h), _) if !h.is_empty() => Ok(h),
        (Ok(_), Some(r)) => {
            warn!("hostname is empty, using node{} as identity", r);
            Ok(format!("node{}", r))
        }
        (Err(e), Some(r)) => {
            warn!("cannot read hostname ({}), using node{} as identity", e, r);
            Ok(format!("node{}", r))
        }
        (Ok(_), None) => Err(BootError::Resolution {
            identity: String::new(),
            reason: "hostname is empty and no --role given".to_string(),
        }),
        (Err(e), None) => Err(BootError::Resolution {
            identity: String::new(),
            reason: format!("cannot read hostname and no --role given: {}", e),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherChoice {
    Log,
    Gcloud { topic: String },
    Command { program: String, args: Vec<String> },
}

/// Everything a node needs to run, after merging flags over the file.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub identity: String,
    pub role: Role,
    pub table: RoleAddressTable,
    pub bind_addr: String,
    pub study: String,
    pub setup: Vec<SetupStep>,
    pub policy: BarrierPolicy,
    pub plan: LaunchPlan,
    pub publisher: PublisherChoice,
    /// Set in validation mode: count the data, report, and stop.
    pub validate: Option<ValidateStep>,
}

impl NodeConfig {
    pub fn special(&self) -> bool {
        self.table.is_special(self.role)
    }

    /// This node's own readiness address.
    pub fn listen_port(&self) -> BootResult<u16> {
        self.table
            .address(self.role)
            .map(|a| a.port)
            .ok_or_else(|| BootError::Config {
                message: format!("role {} has no address", self.role),
            })
    }

    pub fn build(args: &Args, file: DeploymentFile, identity: String) -> BootResult<Self> {
        let cluster_size = args
            .cluster_size
            .or(file.cluster_size)
            .unwrap_or(DEFAULT_CLUSTER_SIZE);

        let addrs = if args.addrs.is_empty() {
            file.addrs
        } else {
            args.addrs.clone()
        };
        let table = if addrs.is_empty() {
            let template = args
                .host_template
                .clone()
                .or(file.host_template)
                .unwrap_or_else(|| sfkit_proto::defaults::DEFAULT_HOST_TEMPLATE.to_string());
            RoleAddressTable::from_template(&template, args.port, cluster_size)?
        } else {
            let entries = addrs
                .iter()
                .map(|a| NodeAddr::parse(a, args.port))
                .collect::<BootResult<Vec<_>>>()?;
            RoleAddressTable::from_addrs(entries)?
        };

        let role = match args.role {
            Some(r) => {
                let role = Role(r);
                if !table.contains(role) {
                    return Err(BootError::Resolution {
                        identity: identity.clone(),
                        reason: format!(
                            "role {} is outside a cluster of {} nodes",
                            r,
                            table.size()
                        ),
                    });
                }
                role
            }
            None => resolve_role(&identity, table.size())?,
        };

        let mut plan = LaunchPlan::default();
        if let Some(p) = file.phase1 {
            plan.phase1 = p.into();
        }
        if let Some(p) = file.phase2 {
            plan.phase2 = p.into();
        }
        if let Some(program) = &args.phase1_program {
            plan.phase1.program = program.clone();
        }
        if let Some(program) = &args.phase2_program {
            plan.phase2.program = program.clone();
        }
        if let Some(t) = args.param_file.clone().or(file.param_file_template) {
            if !t.contains(ROLE_PLACEHOLDER) {
                return Err(BootError::Config {
                    message: format!("parameter file template '{}' has no {} placeholder", t, ROLE_PLACEHOLDER),
                });
            }
            plan.param_file_template = t;
        }
        if let Some(d) = args.data_dir.clone().or(file.data_dir) {
            plan.data_dir = d;
        }
        plan.working_dir = args.workdir.clone().or(file.working_dir);
        plan.stagger = Duration::from_secs(args.stagger);
        plan.cooldown_base = Duration::from_secs(args.cooldown_base);
        plan.cooldown_step = Duration::from_secs(args.cooldown_step);
        plan.check_delays(table.size())?;

        let policy = BarrierPolicy {
            probe_timeout: Duration::from_secs(args.probe_timeout),
            retry_interval: Duration::from_secs(args.retry_interval),
            max_wait: args.max_wait.map(Duration::from_secs),
        };
        if policy.probe_timeout.is_zero() {
            return Err(BootError::Config {
                message: "probe timeout must be at least one second".to_string(),
            });
        }
        if let Some(d) = policy.max_wait {
            if Instant::now().checked_add(d).is_none() {
                return Err(BootError::Config {
                    message: format!("max wait of {}s is out of range", d.as_secs()),
                });
            }
        }

        let file_publisher = file.publisher.unwrap_or_default();
        let publisher = match (args.topic.clone().or(file_publisher.topic), file_publisher.program) {
            (Some(topic), _) => PublisherChoice::Gcloud { topic },
            (None, Some(program)) => PublisherChoice::Command {
                program,
                args: file_publisher.args,
            },
            (None, None) => PublisherChoice::Log,
        };

        let study = args
            .study
            .clone()
            .or(file.study)
            .unwrap_or_else(|| "sfkit".to_string());

        let setup = if args.skip_setup { Vec::new() } else { file.setup };

        let validate = if args.validate {
            match file.validate {
                Some(step) => Some(step),
                None => {
                    return Err(BootError::Config {
                        message: "--validate needs a validate section in the deployment file"
                            .to_string(),
                    })
                }
            }
        } else {
            None
        };

        Ok(Self {
            identity,
            role,
            table,
            bind_addr: args.bind_addr.clone(),
            study,
            setup,
            policy,
            plan,
            publisher,
            validate,
        })
    }
}
