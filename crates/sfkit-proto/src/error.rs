//! Error types for the node bootstrap.
//!
//! [`BootError`] covers everything that can stop a node from taking part
//! in a study. Checkpoint delivery failures use the separate
//! [`PublishError`], which callers log and swallow.

use crate::phase::Phase;
use crate::role::Role;

/// Unified error type for bootstrap operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootError {
    #[error("cannot resolve role from identity '{identity}': {reason}")]
    Resolution { identity: String, reason: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("failed to bind readiness listener on {addr}: {message}")]
    Bind { addr: String, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("probe of {addr} timed out")]
    ProbeTimeout { addr: String },

    #[error("readiness barrier timed out waiting for roles {}", describe_roles(.pending))]
    BarrierTimeout { pending: Vec<Role> },

    #[error("readiness probing stopped before roles {} answered", describe_roles(.pending))]
    BarrierAborted { pending: Vec<Role> },

    #[error("failed to start {what}: {message}")]
    Spawn { what: String, message: String },

    #[error("setup step '{step}' failed with {}", describe_exit(.code))]
    SetupFailure { step: String, code: Option<i32> },

    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("{phase} process failed with {}", describe_exit(.code))]
    PhaseProcessFailure { phase: Phase, code: Option<i32> },

    #[error("invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::phase::PhaseState,
        to: crate::phase::PhaseState,
    },

    #[error("malformed readiness reply")]
    BadReply,
}

impl BootError {
    /// Whether this error ends the node's participation.
    ///
    /// Probe-level failures are retried by the barrier and never surface
    /// to the operator on their own.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BootError::Network(_) | BootError::ProbeTimeout { .. } | BootError::BadReply
        )
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "termination by signal".to_string(),
    }
}

fn describe_roles(roles: &[Role]) -> String {
    roles
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for bootstrap operations.
pub type BootResult<T> = Result<T, BootError>;

impl From<std::io::Error> for BootError {
    fn from(e: std::io::Error) -> Self {
        BootError::Network(e.to_string())
    }
}

/// Failure to deliver a checkpoint to the progress service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("publisher unavailable: {0}")]
    Unavailable(String),

    #[error("publish command exited with {}", describe_exit(.0))]
    Rejected(Option<i32>),
}
