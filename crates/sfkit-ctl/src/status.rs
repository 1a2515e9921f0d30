//! `sfkit-ctl status`: one probe per role, printed as a table.

use std::time::Duration;

use sfkit_core::net::query_readiness;
use sfkit_proto::role::{NodeAddr, RoleAddressTable};
use sfkit_proto::{BootResult, ReadinessReply, Role};
use tabled::{Table, Tabled};
use tokio::task::JoinSet;
use tracing::debug;

// ---------------------------------------------------------------------------
// Table display types
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Reachable")]
    reachable: String,
    #[tabled(rename = "State")]
    state: String,
}

/// Result of probing one role.
#[derive(Debug)]
struct Observation {
    role: Role,
    addr: NodeAddr,
    result: BootResult<Option<ReadinessReply>>,
}

impl Observation {
    fn row(&self, special: bool) -> StatusRow {
        let role = if special {
            format!("{} *", self.role)
        } else {
            self.role.to_string()
        };
        let (reachable, state) = match &self.result {
            Ok(Some(reply)) if reply.role != self.role => (
                "yes".to_string(),
                format!("{} (claims role {})", reply.state, reply.role),
            ),
            Ok(Some(reply)) => ("yes".to_string(), reply.state.to_string()),
            Ok(None) => ("yes".to_string(), "-".to_string()),
            Err(e) => ("no".to_string(), e.to_string()),
        };
        StatusRow {
            role,
            address: self.addr.to_string(),
            reachable,
            state,
        }
    }
}

async fn observe_all(table: &RoleAddressTable, timeout: Duration) -> Vec<Observation> {
    let mut set = JoinSet::new();
    for (role, addr) in table.iter() {
        let addr = addr.clone();
        set.spawn(async move {
            let result = query_readiness(&addr, timeout).await;
            Observation { role, addr, result }
        });
    }

    let mut out = Vec::with_capacity(table.size());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(obs) => out.push(obs),
            Err(e) => debug!("probe task failed: {}", e),
        }
    }
    out.sort_by_key(|o| o.role);
    out
}

pub async fn run(table: &RoleAddressTable, timeout: Duration) {
    let observations = observe_all(table, timeout).await;
    let rows: Vec<StatusRow> = observations
        .iter()
        .map(|o| o.row(table.is_special(o.role)))
        .collect();

    println!("{}", Table::new(&rows));
    println!();

    let ready = observations.iter().filter(|o| o.result.is_ok()).count();
    println!("{}/{} node(s) reachable (* = data holder)", ready, table.size());
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfkit_core::ReadinessListener;
    use sfkit_proto::PhaseState;
    use tokio::sync::watch;

    #[tokio::test]
    async fn test_observes_live_and_dead_nodes() {
        let (_tx, rx) = watch::channel(PhaseState::CoolingDown);
        let listener = ReadinessListener::bind("127.0.0.1", 0, Role(0), rx)
            .await
            .unwrap();
        let handle = listener.spawn().unwrap();
        let live = handle.local_addr.port();

        let dead = {
            let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let table = RoleAddressTable::from_addrs(vec![
            NodeAddr::new("127.0.0.1", live),
            NodeAddr::new("127.0.0.1", dead),
        ])
        .unwrap();

        let obs = observe_all(&table, Duration::from_secs(2)).await;
        assert_eq!(obs.len(), 2);

        let row = obs[0].row(false);
        assert_eq!(row.reachable, "yes");
        assert_eq!(row.state, "cooling down");

        let row = obs[1].row(true);
        assert_eq!(row.role, "1 *");
        assert_eq!(row.reachable, "no");

        handle.shutdown().await;
    }
}
