//! Tunable operational defaults for the node bootstrap.
//!
//! Protocol-level constants (ports, cluster limits, frame sizes) remain
//! in [`crate::constants`]. This module centralizes the configurable
//! defaults that can be overridden via CLI flags or the deployment file.

// ─── Addressing ─────────────────────────────────────────────────────────────

/// Default host template; `{role}` is replaced by the role index.
pub const DEFAULT_HOST_TEMPLATE: &str = "10.0.{role}.10";

/// Default bind address for the readiness listener.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

// ─── Readiness Barrier ──────────────────────────────────────────────────────

/// Per-attempt connect timeout when probing a peer (seconds).
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Sleep between failed probe attempts (seconds).
pub const DEFAULT_PROBE_RETRY_SECS: u64 = 30;

// ─── Phase Launcher ─────────────────────────────────────────────────────────

/// Per-role startup stagger before Phase 1 (seconds, multiplied by role).
pub const DEFAULT_PHASE1_STAGGER_SECS: u64 = 5;

/// Fixed part of the cooldown between Phase 1 and Phase 2 (seconds).
pub const DEFAULT_COOLDOWN_BASE_SECS: u64 = 120;

/// Per-role part of the cooldown between Phase 1 and Phase 2 (seconds).
pub const DEFAULT_COOLDOWN_STEP_SECS: u64 = 15;

/// Default Phase 1 (data sharing) program.
pub const DEFAULT_PHASE1_PROGRAM: &str = "bin/DataSharingClient";

/// Default Phase 2 (GWAS) program.
pub const DEFAULT_PHASE2_PROGRAM: &str = "bin/GwasClient";

/// Default per-role parameter file template.
pub const DEFAULT_PARAM_FILE_TEMPLATE: &str = "../par/test.par.{role}.toml";

/// Default shared data directory passed to Phase 1 by the special role.
pub const DEFAULT_DATA_DIR: &str = "../data/";

// ─── Progress Reporter ──────────────────────────────────────────────────────

/// Default program used to publish checkpoints.
pub const DEFAULT_PUBLISH_PROGRAM: &str = "gcloud";

/// Upper bound on a single checkpoint publish (seconds).
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 30;
