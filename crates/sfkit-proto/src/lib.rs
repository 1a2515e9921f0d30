//! # sfkit-proto
//!
//! Shared types, constants and error definitions for the sfkit node
//! bootstrap: roles and the role address table, progress checkpoints,
//! the phase state machine and the readiness reply exchanged between
//! nodes.

pub mod checkpoint;
pub mod constants;
pub mod defaults;
pub mod error;
pub mod phase;
pub mod readiness;
pub mod role;

// Re-export commonly used types at the crate root
pub use checkpoint::Checkpoint;
pub use error::{BootError, BootResult, PublishError};
pub use phase::{Phase, PhaseState};
pub use readiness::ReadinessReply;
pub use role::{resolve_role, Role, RoleAddressTable};
