//! Progress checkpoints reported to the study tracking service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named progress event. Sent once per occurrence, best effort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Checkpoint {
    DoneInstallingDependencies,
    DoneInstallingNtl,
    DoneCompilingGwas,
    AllVmsAreReady,
    DataSharingCompleted,
    GwasCompleted,
    /// Deployment-defined setup step.
    Custom(String),
}

impl Checkpoint {
    /// Wire name understood by the tracking service.
    pub fn name(&self) -> &str {
        match self {
            Self::DoneInstallingDependencies => "done_installing_dependencies",
            Self::DoneInstallingNtl => "done_installing_NTL",
            Self::DoneCompilingGwas => "done_compiling_gwas",
            Self::AllVmsAreReady => "all_vms_are_ready",
            Self::DataSharingCompleted => "DataSharing_completed",
            Self::GwasCompleted => "GWAS_completed",
            Self::Custom(name) => name,
        }
    }

    /// Result of a data validation run. The tracking service treats a
    /// purely numeric checkpoint as a validation report.
    pub fn validation(count: u64) -> Self {
        Self::Custom(count.to_string())
    }

    /// Parse a wire name; unknown names become [`Checkpoint::Custom`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "done_installing_dependencies" => Self::DoneInstallingDependencies,
            "done_installing_NTL" => Self::DoneInstallingNtl,
            "done_compiling_gwas" => Self::DoneCompilingGwas,
            "all_vms_are_ready" => Self::AllVmsAreReady,
            "DataSharing_completed" => Self::DataSharingCompleted,
            "GWAS_completed" => Self::GwasCompleted,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
