//! Protocol and deployment constants.

/// Well-known port every node's readiness listener binds to.
pub const READINESS_PORT: u16 = 8055;

/// Number of nodes in a standard study deployment.
pub const DEFAULT_CLUSTER_SIZE: usize = 4;

/// Upper bound on the cluster size accepted by the address table.
pub const MAX_CLUSTER_SIZE: usize = 256;

/// Placeholder substituted with the role index in address and path templates.
pub const ROLE_PLACEHOLDER: &str = "{role}";

/// Maximum encoded size of a readiness reply frame (bytes).
pub const MAX_READINESS_REPLY_SIZE: u32 = 4096;
