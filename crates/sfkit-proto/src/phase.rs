//! Computation phases and the per-node phase state machine.
//!
//! A node runs Phase 1 (data sharing) and, unless it holds the special
//! role, Phase 2 (GWAS). The state is owned by the local launcher and
//! only ever read elsewhere.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BootError, BootResult};

/// One of the two external computation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Phase 1: secret-share the local data with the other parties.
    DataSharing,
    /// Phase 2: the joint association study.
    Gwas,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::DataSharing => f.write_str("data sharing"),
            Phase::Gwas => f.write_str("GWAS"),
        }
    }
}

/// Launch progress of the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PhaseState {
    #[default]
    NotStarted,
    Phase1Running,
    Phase1Done,
    CoolingDown,
    Phase2Running,
    Phase2Done,
    Failed,
}

impl PhaseState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: PhaseState) -> bool {
        use PhaseState::*;
        matches!(
            (self, next),
            (NotStarted, Phase1Running)
                | (Phase1Running, Phase1Done)
                | (Phase1Running, Failed)
                | (Phase1Done, CoolingDown)
                | (CoolingDown, Phase2Running)
                | (Phase2Running, Phase2Done)
                | (Phase2Running, Failed)
        )
    }

    /// Validated transition.
    pub fn transition(self, next: PhaseState) -> BootResult<PhaseState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(BootError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PhaseState::NotStarted => "not started",
            PhaseState::Phase1Running => "data sharing running",
            PhaseState::Phase1Done => "data sharing done",
            PhaseState::CoolingDown => "cooling down",
            PhaseState::Phase2Running => "GWAS running",
            PhaseState::Phase2Done => "GWAS done",
            PhaseState::Failed => "failed",
        }
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
