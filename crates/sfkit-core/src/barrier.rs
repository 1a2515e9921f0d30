//! Readiness barrier.
//!
//! Before any computation starts, every node must see every other node's
//! readiness listener accept a connection. Each peer is probed by its own
//! task: connect with a bounded timeout, and on failure sleep the retry
//! interval and try again. A confirmed peer is never probed again.
//!
//! Probing is unbounded unless the policy sets `max_wait`. Only transient
//! failures (see [`BootError::is_fatal`]) are retried; anything else ends
//! the wait.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sfkit_proto::defaults::{DEFAULT_PROBE_RETRY_SECS, DEFAULT_PROBE_TIMEOUT_SECS};
use sfkit_proto::role::NodeAddr;
use sfkit_proto::{BootError, BootResult, Role};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::net::connect_with_timeout;

/// One readiness check against a peer.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Succeeds once the peer's listener accepts a connection.
    async fn probe(&self, addr: &NodeAddr, timeout: Duration) -> BootResult<()>;
}

/// Probes by opening (and immediately dropping) a TCP connection.
#[derive(Debug, Default, Clone)]
pub struct TcpProbe;

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, addr: &NodeAddr, timeout: Duration) -> BootResult<()> {
        let _stream = connect_with_timeout(addr, timeout).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierPolicy {
    /// Bound on a single connect attempt.
    pub probe_timeout: Duration,
    /// Pause after a failed attempt.
    pub retry_interval: Duration,
    /// Give up after this long. `None` waits forever.
    pub max_wait: Option<Duration>,
}

impl Default for BarrierPolicy {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            retry_interval: Duration::from_secs(DEFAULT_PROBE_RETRY_SECS),
            max_wait: None,
        }
    }
}

/// Set of peers this node has confirmed ready.
///
/// Membership only grows, and the order of confirmations is irrelevant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessBarrier {
    expected: BTreeSet<Role>,
    confirmed: BTreeSet<Role>,
}

impl ReadinessBarrier {
    pub fn new(expected: impl IntoIterator<Item = Role>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
            confirmed: BTreeSet::new(),
        }
    }

    /// Record a confirmation. Returns false for duplicates and unknown roles.
    pub fn confirm(&mut self, role: Role) -> bool {
        self.expected.contains(&role) && self.confirmed.insert(role)
    }

    pub fn is_satisfied(&self) -> bool {
        self.confirmed.len() == self.expected.len()
    }

    pub fn confirmed(&self) -> &BTreeSet<Role> {
        &self.confirmed
    }

    /// Roles still unconfirmed, in role order.
    pub fn pending(&self) -> Vec<Role> {
        self.expected.difference(&self.confirmed).copied().collect()
    }
}

/// Probe every peer until all of them have answered.
pub async fn await_all(
    peers: Vec<(Role, NodeAddr)>,
    probe: Arc<dyn Probe>,
    policy: &BarrierPolicy,
) -> BootResult<ReadinessBarrier> {
    let mut barrier = ReadinessBarrier::new(peers.iter().map(|(r, _)| *r));
    let total = peers.len();
    let deadline = match policy.max_wait {
        Some(d) => Some(Instant::now().checked_add(d).ok_or_else(|| BootError::Config {
            message: format!("max wait of {}s is out of range", d.as_secs()),
        })?),
        None => None,
    };

    let mut set = JoinSet::new();
    for (role, addr) in peers {
        let probe = probe.clone();
        let policy = policy.clone();
        set.spawn(probe_until_ready(role, addr, probe, policy));
    }

    while !barrier.is_satisfied() {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(next) => next,
                Err(_) => {
                    set.abort_all();
                    return Err(BootError::BarrierTimeout {
                        pending: barrier.pending(),
                    });
                }
            },
            None => set.join_next().await,
        };

        match next {
            Some(Ok(Ok(role))) => {
                if barrier.confirm(role) {
                    info!(
                        "role {} is ready ({}/{} peers)",
                        role,
                        barrier.confirmed().len(),
                        total
                    );
                }
            }
            Some(Ok(Err(e))) => {
                set.abort_all();
                return Err(e);
            }
            Some(Err(e)) => {
                error!("probe task failed: {}", e);
            }
            None => {
                return Err(BootError::BarrierAborted {
                    pending: barrier.pending(),
                });
            }
        }
    }

    Ok(barrier)
}

async fn probe_until_ready(
    role: Role,
    addr: NodeAddr,
    probe: Arc<dyn Probe>,
    policy: BarrierPolicy,
) -> BootResult<Role> {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(
            policy.probe_timeout,
            probe.probe(&addr, policy.probe_timeout),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(BootError::ProbeTimeout {
                addr: addr.to_string(),
            }),
        };

        match result {
            Ok(()) => {
                debug!("role {} at {} answered on attempt {}", role, addr, attempt);
                return Ok(role);
            }
            Err(e) if e.is_fatal() => {
                error!("role {} at {}: {}", role, addr, e);
                return Err(e);
            }
            Err(e) => {
                info!(
                    "role {} at {} not ready ({}), retrying in {}s",
                    role,
                    addr,
                    e,
                    policy.retry_interval.as_secs()
                );
                tokio::time::sleep(policy.retry_interval).await;
            }
        }
    }
}
