//! Role identity and the static role-to-address table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{MAX_CLUSTER_SIZE, ROLE_PLACEHOLDER};
use crate::error::{BootError, BootResult};

/// Position of a node in the fixed total order of the study cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Role(pub u16);

impl Role {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derive the role of this node from its identity.
///
/// The role is the run of decimal digits at the end of the identity, so
/// `sfkit-study-secure-gwas2` resolves to role 2. Pure and deterministic.
pub fn resolve_role(identity: &str, cluster_size: usize) -> BootResult<Role> {
    let fail = |reason: &str| BootError::Resolution {
        identity: identity.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = identity.trim();
    if trimmed.is_empty() {
        return Err(fail("identity is empty"));
    }

    let digits_start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .ok_or_else(|| fail("no trailing role digits"))?;

    let index: usize = trimmed[digits_start..]
        .parse()
        .map_err(|_| fail("role index out of range"))?;

    if index >= cluster_size {
        return Err(fail(&format!(
            "role {} is outside a cluster of {} nodes",
            index, cluster_size
        )));
    }

    Ok(Role(index as u16))
}

/// Substitute the role index into a `{role}` template.
pub fn render_role_template(template: &str, role: Role) -> String {
    template.replace(ROLE_PLACEHOLDER, &role.to_string())
}

/// Network address of one node's readiness listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    pub fn parse(s: &str, default_port: u16) -> BootResult<Self> {
        let bad = || BootError::Config {
            message: format!("invalid node address '{}'", s),
        };
        let s = s.trim();
        if s.is_empty() {
            return Err(bad());
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(bad)?;
            let port = match tail.strip_prefix(':') {
                Some(p) => p.parse().map_err(|_| bad())?,
                None if tail.is_empty() => default_port,
                None => return Err(bad()),
            };
            return Ok(Self::new(host, port));
        }

        match s.split_once(':') {
            Some((host, port)) if !port.contains(':') => {
                let port = port.parse().map_err(|_| bad())?;
                Ok(Self::new(host, port))
            }
            // Plain host, or bare IPv6 without brackets.
            _ => Ok(Self::new(s, default_port)),
        }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Ordered (role, address) pairs shared by every node of a deployment.
///
/// The table is configuration: every node builds the same one from the
/// same template or address list, so membership is agreed without any
/// exchange between nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAddressTable {
    entries: Vec<NodeAddr>,
}

impl RoleAddressTable {
    /// Build a table from an explicit address list, indexed by role.
    pub fn from_addrs(entries: Vec<NodeAddr>) -> BootResult<Self> {
        if entries.len() < 2 {
            return Err(BootError::Config {
                message: format!("a study needs at least 2 nodes, got {}", entries.len()),
            });
        }
        if entries.len() > MAX_CLUSTER_SIZE {
            return Err(BootError::Config {
                message: format!(
                    "cluster size {} exceeds the maximum of {}",
                    entries.len(),
                    MAX_CLUSTER_SIZE
                ),
            });
        }
        for (i, a) in entries.iter().enumerate() {
            if entries[..i].contains(a) {
                return Err(BootError::Config {
                    message: format!("address {} is assigned to more than one role", a),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Build a table from a host template such as `10.0.{role}.10`.
    pub fn from_template(template: &str, port: u16, cluster_size: usize) -> BootResult<Self> {
        if !template.contains(ROLE_PLACEHOLDER) {
            return Err(BootError::Config {
                message: format!("host template '{}' has no {} placeholder", template, ROLE_PLACEHOLDER),
            });
        }
        let entries = (0..cluster_size)
            .map(|i| NodeAddr::new(render_role_template(template, Role(i as u16)), port))
            .collect();
        Self::from_addrs(entries)
    }

    /// Number of nodes in the study.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, role: Role) -> bool {
        role.index() < self.entries.len()
    }

    pub fn address(&self, role: Role) -> Option<&NodeAddr> {
        self.entries.get(role.index())
    }

    /// The last-indexed role, which runs only the data sharing phase.
    pub fn special_role(&self) -> Role {
        Role((self.entries.len() - 1) as u16)
    }

    pub fn is_special(&self, role: Role) -> bool {
        role == self.special_role()
    }

    /// All roles with their addresses, in role order.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &NodeAddr)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, a)| (Role(i as u16), a))
    }

    /// Every role except `this`, in role order.
    pub fn peers(&self, this: Role) -> Vec<(Role, NodeAddr)> {
        self.iter()
            .filter(|(r, _)| *r != this)
            .map(|(r, a)| (r, a.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_trailing_digit() {
        assert_eq!(resolve_role("sfkit-study-secure-gwas0", 4).unwrap(), Role(0));
        assert_eq!(resolve_role("sfkit-study-secure-gwas3", 4).unwrap(), Role(3));
        assert_eq!(resolve_role("  node2\n", 4).unwrap(), Role(2));
    }

    #[test]
    fn test_resolve_multi_digit() {
        assert_eq!(resolve_role("worker12", 16).unwrap(), Role(12));
        assert_eq!(resolve_role("vm-007", 8).unwrap(), Role(7));
    }

    #[test]
    fn test_resolve_failures() {
        assert!(matches!(
            resolve_role("", 4),
            Err(BootError::Resolution { .. })
        ));
        assert!(matches!(
            resolve_role("secure-gwas", 4),
            Err(BootError::Resolution { .. })
        ));
        assert!(matches!(
            resolve_role("secure-gwas4", 4),
            Err(BootError::Resolution { .. })
        ));
        assert!(matches!(
            resolve_role("host99999999999999999999999", 4),
            Err(BootError::Resolution { .. })
        ));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(resolve_role("gwas1", 4), resolve_role("gwas1", 4));
        }
    }

    #[test]
    fn test_table_from_template() {
        let table = RoleAddressTable::from_template("10.0.{role}.10", 8055, 4).unwrap();
        assert_eq!(table.size(), 4);
        assert_eq!(table.address(Role(2)).unwrap().to_string(), "10.0.2.10:8055");
        assert_eq!(table.special_role(), Role(3));
        assert!(table.is_special(Role(3)));
        assert!(!table.is_special(Role(0)));
        assert!(!table.contains(Role(4)));
    }

    #[test]
    fn test_table_peers_excludes_self() {
        let table = RoleAddressTable::from_template("10.0.{role}.10", 8055, 4).unwrap();
        let peers: Vec<Role> = table.peers(Role(1)).into_iter().map(|(r, _)| r).collect();
        assert_eq!(peers, vec![Role(0), Role(2), Role(3)]);
    }

    #[test]
    fn test_table_rejects_bad_input() {
        assert!(RoleAddressTable::from_template("10.0.0.10", 8055, 4).is_err());
        assert!(RoleAddressTable::from_template("10.0.{role}.10", 8055, 1).is_err());

        let dup = vec![NodeAddr::new("10.0.0.1", 8055), NodeAddr::new("10.0.0.1", 8055)];
        assert!(RoleAddressTable::from_addrs(dup).is_err());
    }

    #[test]
    fn test_parse_node_addr() {
        assert_eq!(NodeAddr::parse("10.0.1.10", 8055).unwrap(), NodeAddr::new("10.0.1.10", 8055));
        assert_eq!(NodeAddr::parse("h:9", 8055).unwrap(), NodeAddr::new("h", 9));
        assert_eq!(NodeAddr::parse("[::1]:9", 8055).unwrap(), NodeAddr::new("::1", 9));
        assert_eq!(NodeAddr::parse("[::1]", 8055).unwrap(), NodeAddr::new("::1", 8055));
        assert_eq!(NodeAddr::parse("fe80::1", 8055).unwrap(), NodeAddr::new("fe80::1", 8055));
        assert!(NodeAddr::parse("h:port", 8055).is_err());
        assert!(NodeAddr::parse("[::1]x", 8055).is_err());
        assert!(NodeAddr::parse("", 8055).is_err());
    }

    #[test]
    fn test_ipv6_display() {
        let addr = NodeAddr::new("::1", 8055);
        assert_eq!(addr.to_string(), "[::1]:8055");
    }
}
