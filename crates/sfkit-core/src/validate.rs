//! Data validation mode.
//!
//! Instead of joining the computation, a validating node runs one
//! command that inspects its local data and prints a count (typically
//! the number of rows), then reports that count as a bare numeric
//! checkpoint. The tracking service compares it with what the
//! participant declared.

use serde::Deserialize;
use sfkit_proto::{BootError, BootResult, Checkpoint};
use tracing::{error, info};

use crate::process::{CommandSpec, ProcessRunner};
use crate::reporter::Reporter;

/// The counting command, from the `validate:` deployment section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidateStep {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ValidateStep {
    fn command(&self) -> CommandSpec {
        CommandSpec::new(self.program.clone()).args(self.args.iter().cloned())
    }
}

/// Last non-empty line of the output, as an unsigned integer.
fn parse_count(stdout: &str) -> BootResult<u64> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .ok_or_else(|| BootError::Validation {
            message: "command printed nothing".into(),
        })?;
    // `wc -l file` prints "<count> <file>".
    let field = line.split_whitespace().next().unwrap_or(line);
    field.parse().map_err(|_| BootError::Validation {
        message: format!("expected a count, got {:?}", line),
    })
}

/// Run the validation command and publish its count.
pub async fn run_validation(
    step: &ValidateStep,
    runner: &dyn ProcessRunner,
    reporter: &Reporter,
) -> BootResult<u64> {
    let spec = step.command();
    info!("validating data: {}", spec.display());

    let out = runner.capture(&spec).await?;
    if out.code != Some(0) {
        let err = BootError::Validation {
            message: match out.code {
                Some(code) => format!("{} exited with status {}", step.program, code),
                None => format!("{} was killed by a signal", step.program),
            },
        };
        error!("{}", err);
        return Err(err);
    }

    let count = parse_count(&out.stdout).map_err(|e| {
        error!("{}", e);
        e
    })?;
    info!("validation count: {}", count);
    reporter.checkpoint(Checkpoint::validation(count)).await;
    Ok(count)
}
