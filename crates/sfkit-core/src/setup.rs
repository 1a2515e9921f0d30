//! Local setup steps run before the node announces readiness.

use serde::Deserialize;
use sfkit_proto::{BootError, BootResult, Checkpoint};
use tracing::{error, info};

use crate::process::{CommandSpec, ProcessRunner};
use crate::reporter::Reporter;

/// One prerequisite command, e.g. installing dependencies or compiling
/// the computation binaries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SetupStep {
    /// Checkpoint published when the step succeeds.
    pub checkpoint: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl SetupStep {
    fn command(&self) -> CommandSpec {
        CommandSpec::new(self.program.clone()).args(self.args.iter().cloned())
    }
}

/// Run each step in order, stopping at the first failure.
pub async fn run_setup(
    steps: &[SetupStep],
    runner: &dyn ProcessRunner,
    reporter: &Reporter,
) -> BootResult<()> {
    if steps.is_empty() {
        info!("no setup steps configured");
        return Ok(());
    }

    for (i, step) in steps.iter().enumerate() {
        let spec = step.command();
        info!("setup {}/{}: {}", i + 1, steps.len(), spec.display());

        let code = runner.run(&spec).await?;
        if code != Some(0) {
            let err = BootError::SetupFailure {
                step: step.checkpoint.clone(),
                code,
            };
            error!("{}", err);
            return Err(err);
        }

        reporter
            .checkpoint(Checkpoint::from_name(&step.checkpoint))
            .await;
    }
    Ok(())
}
