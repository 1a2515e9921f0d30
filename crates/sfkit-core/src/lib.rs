//! # sfkit-core
//!
//! Coordination core for sfkit study nodes. Provides async networking,
//! the readiness listener and barrier, the phased launcher for the
//! external computation processes, local setup steps, data validation
//! and best-effort progress reporting.

pub mod barrier;
pub mod launcher;
pub mod listener;
pub mod net;
pub mod process;
pub mod reporter;
pub mod setup;
pub mod validate;

pub use barrier::{await_all, BarrierPolicy, Probe, ReadinessBarrier, TcpProbe};
pub use launcher::{LaunchPlan, PhaseCommand, PhaseLauncher};
pub use listener::{ListenerHandle, ReadinessListener};
pub use process::{CapturedOutput, CommandSpec, ProcessRunner, SystemRunner};
pub use reporter::{CommandPublisher, LogPublisher, Publisher, Reporter};
pub use setup::{run_setup, SetupStep};
pub use validate::{run_validation, ValidateStep};
